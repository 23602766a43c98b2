use serde::ser::{Serialize, SerializeTuple, Serializer};
use std::fmt;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViolationKind {
    Overspeeding,
    NoHelmet,
    NoSeatbelt,
}

impl ViolationKind {
    pub fn label(self) -> &'static str {
        match self {
            ViolationKind::Overspeeding => "Overspeeding",
            ViolationKind::NoHelmet => "No Helmet",
            ViolationKind::NoSeatbelt => "No Seatbelt",
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A recorded rule breach. Serializes as `["<type>", "<timestamp>"]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViolationEvent {
    pub kind: ViolationKind,
    /// Local wall-clock time, `%Y-%m-%d %H:%M:%S`.
    pub timestamp: String,
}

impl ViolationEvent {
    pub fn new<S: Into<String>>(kind: ViolationKind, timestamp: S) -> Self {
        Self {
            kind,
            timestamp: timestamp.into(),
        }
    }
}

impl Serialize for ViolationEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tup = serializer.serialize_tuple(2)?;
        tup.serialize_element(self.kind.label())?;
        tup.serialize_element(&self.timestamp)?;
        tup.end()
    }
}

/// Append-only, chronologically ordered record of one stream's violations.
#[derive(Debug, Default, Clone)]
pub struct ViolationLog {
    events: Vec<ViolationEvent>,
}

impl ViolationLog {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn push(&mut self, event: ViolationEvent) {
        self.events.push(event);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &ViolationEvent> {
        self.events.iter()
    }

    #[inline]
    pub fn as_slice(&self) -> &[ViolationEvent] {
        &self.events
    }

    pub fn count(&self, kind: ViolationKind) -> usize {
        self.events.iter().filter(|e| e.kind == kind).count()
    }

    /// Body of the violations polling endpoint.
    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(&self.events)?)
    }

    pub fn into_vec(self) -> Vec<ViolationEvent> {
        self.events
    }
}
