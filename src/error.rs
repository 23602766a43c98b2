use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Io Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config Error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Json Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Shape Error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Detector Error: {0}")]
    Detector(String),

    #[error("Malformed detection: {0}")]
    MalformedDetection(String),

    #[error("Sink Error: {0}")]
    Sink(String),

    #[error("Consumer Error: {0}")]
    Consumer(String),

    #[cfg(feature = "opencv")]
    #[error("OpenCV Error: {0}")]
    OpenCv(#[from] opencv::Error),
}
