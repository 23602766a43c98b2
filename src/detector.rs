use std::collections::BTreeMap;

use ndarray::prelude::*;

use crate::bbox::BBox;
use crate::detection::Detection;
use crate::error::Error;

/// Locates objects in one frame.
pub trait Detector<I: ?Sized> {
    fn detect(&mut self, image: &I) -> Result<Vec<Detection>, Error>;
}

impl<I: ?Sized, F> Detector<I> for F
where
    F: FnMut(&I) -> Result<Vec<Detection>, Error>,
{
    #[inline]
    fn detect(&mut self, image: &I) -> Result<Vec<Detection>, Error> {
        self(image)
    }
}

pub struct YoloDetectorConfig {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub classes: Vec<i32>,
}

impl YoloDetectorConfig {
    pub fn new(confidence_threshold: f32, classes: Vec<i32>) -> Self {
        Self {
            confidence_threshold,
            iou_threshold: 0.45,
            classes,
        }
    }
}

/// Turns the raw output of an anchor-free YOLO head into detections.
///
/// The expected layout is `[4 + num_classes, num_candidates]`: center x,
/// center y, width and height in model input pixels, followed by one score
/// per class.
pub struct YoloDecoder {
    config: YoloDetectorConfig,
}

impl YoloDecoder {
    pub fn new(config: YoloDetectorConfig) -> Self {
        Self { config }
    }

    #[inline]
    pub fn config(&self) -> &YoloDetectorConfig {
        &self.config
    }

    /// `scale` maps model input pixels onto frame pixels.
    pub fn decode(&self, preds: ArrayView2<'_, f32>, scale: (f32, f32)) -> Result<Vec<Detection>, Error> {
        let (attrs, ncandidates) = preds.dim();
        if attrs < 5 {
            return Err(Error::Detector(format!(
                "prediction tensor has {} rows, expected at least 5",
                attrs
            )));
        }

        let (sx, sy) = scale;
        // The bounding boxes grouped by class index.
        let mut bboxes: BTreeMap<i32, Vec<Detection>> = BTreeMap::new();

        for index in 0..ncandidates {
            let candidate = preds.index_axis(Axis(1), index);
            let scores = candidate.slice(s![4..]);

            let mut class_index = -1;
            let mut confidence = 0.0;

            for (idx, val) in scores.iter().copied().enumerate() {
                if val > confidence {
                    class_index = idx as i32;
                    confidence = val;
                }
            }

            if class_index < 0 || confidence <= self.config.confidence_threshold {
                continue;
            }

            if !self.config.classes.contains(&class_index) {
                continue;
            }

            let bbox = BBox::xywh(
                candidate[0] * sx,
                candidate[1] * sy,
                candidate[2] * sx,
                candidate[3] * sy,
            )
            .as_ltrb();

            bboxes
                .entry(class_index)
                .or_default()
                .push(Detection::new(class_index, confidence.min(1.0), bbox));
        }

        let mut results = Vec::new();

        for (_, mut dets) in bboxes {
            if dets.len() == 1 {
                results.append(&mut dets);
                continue;
            }

            let keep = self.non_maximum_supression(&mut dets);

            results.extend(
                dets.into_iter()
                    .zip(keep)
                    .filter_map(|(det, keep)| if keep { Some(det) } else { None }),
            );
        }

        Ok(results)
    }

    /// Sorts `dets` by confidence and flags the ones that survive.
    fn non_maximum_supression(&self, dets: &mut [Detection]) -> Vec<bool> {
        dets.sort_unstable_by(|a, b| b.confidence.total_cmp(&a.confidence));

        let mut keep = vec![true; dets.len()];
        for idx in 0..dets.len() {
            if !keep[idx] {
                continue;
            }

            for other in idx + 1..dets.len() {
                if keep[other] && dets[idx].iou(&dets[other]) > self.config.iou_threshold {
                    keep[other] = false;
                }
            }
        }

        keep
    }
}

#[cfg(feature = "opencv")]
pub use cv::OnnxDetector;

#[cfg(feature = "opencv")]
mod cv {
    use super::*;
    use crate::config::DetectorConfig;
    use opencv::{core, dnn, prelude::*};
    use std::path::Path;

    /// YOLO ONNX model run through the OpenCV DNN module.
    pub struct OnnxDetector {
        net: dnn::Net,
        input: core::Size,
        decoder: YoloDecoder,
    }

    impl OnnxDetector {
        pub fn new(model: &Path, config: &DetectorConfig, classes: Vec<i32>) -> Result<Self, Error> {
            let net = dnn::read_net_from_onnx(&model.to_string_lossy())?;
            log::info!(
                "loaded detector model {} ({}x{} input)",
                model.display(),
                config.input_width,
                config.input_height
            );

            let mut yolo = YoloDetectorConfig::new(config.confidence_threshold, classes);
            yolo.iou_threshold = config.iou_threshold;

            Ok(Self {
                net,
                input: core::Size::new(config.input_width as i32, config.input_height as i32),
                decoder: YoloDecoder::new(yolo),
            })
        }
    }

    impl Detector<core::Mat> for OnnxDetector {
        fn detect(&mut self, image: &core::Mat) -> Result<Vec<Detection>, Error> {
            let blob = dnn::blob_from_image(
                image,
                1.0 / 255.0,
                self.input,
                core::Scalar::default(),
                true,
                false,
                core::CV_32F,
            )?;

            self.net.set_input(&blob, "", 1.0, core::Scalar::default())?;
            let out = self.net.forward_single("")?;

            let shape: Vec<usize> = out.mat_size().iter().map(|&d| d as usize).collect();
            let data = out.data_typed::<f32>()?;
            let preds = ArrayViewD::from_shape(IxDyn(&shape), data)?.into_dimensionality::<Ix3>()?;

            let scale = (
                image.cols() as f32 / self.input.width as f32,
                image.rows() as f32 / self.input.height as f32,
            );

            self.decoder.decode(preds.index_axis(Axis(0), 0), scale)
        }
    }
}
