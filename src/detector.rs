use crate::bounding::{bounding_box, Rectangle};
use crate::config::DetectorConfig;
use crate::error::{Error, ImageRole, Result};
use crate::keypoint::ExtractionResult;
use crate::matching::{match_features, Match, MatchConfig};
use crate::Orb;
use image::{DynamicImage, GrayImage};
use log::*;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Label attached to every detection.
pub const MATCH_LABEL: &str = "match";

/// The reference image was found in a query image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    /// Box around every query keypoint that matched the reference.
    pub bounding_box: Rectangle,
    /// Always 1.0, the detector does not grade its answers.
    pub confidence: f32,
    pub label: String,
}

/// Features of the reference image, extracted once when the detector is built.
#[derive(Debug, Clone)]
pub struct ReferenceFeatures {
    path: Option<PathBuf>,
    features: ExtractionResult,
}

impl ReferenceFeatures {
    /// The file the reference was loaded from, if it came from a file.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn features(&self) -> &ExtractionResult {
        &self.features
    }
}

/// Looks for one reference image in query images.
///
/// The reference features never change after construction, so `detect` takes
/// `&self` and a detector may be shared between threads without locking.
#[derive(Debug, Clone)]
pub struct FeatureMatchDetector {
    orb: Orb,
    reference: ReferenceFeatures,
    matching: MatchConfig,
    min_matches: usize,
}

impl FeatureMatchDetector {
    /// Load and extract the reference image named by `config`.
    pub fn new(config: &DetectorConfig) -> Result<Self> {
        config.validate()?;
        let path = &config.reference_image_path;
        let image = image::open(path).map_err(|source| Error::ReferenceLoad {
            path: path.clone(),
            source,
        })?;
        info!("Loaded reference image {}", path.display());
        Self::build(&image.to_luma8(), Some(path.clone()), config)
    }

    /// Use an already decoded reference image. `config.reference_image_path` is
    /// validated but not read.
    pub fn from_reference_image(image: &GrayImage, config: &DetectorConfig) -> Result<Self> {
        config.validate()?;
        Self::build(image, None, config)
    }

    fn build(image: &GrayImage, path: Option<PathBuf>, config: &DetectorConfig) -> Result<Self> {
        let orb = Orb::new(config.extractor)?;
        let features = orb.extract(image).map_err(|source| Error::Extraction {
            role: ImageRole::Reference,
            source,
        })?;
        if features.is_empty() {
            warn!("Reference image has no features, nothing will ever be detected");
        }
        info!(
            "Detector ready with {} reference features, max match distance {}",
            features.len(),
            config.max_match_distance()
        );
        Ok(Self {
            orb,
            reference: ReferenceFeatures { path, features },
            matching: config.match_config(),
            min_matches: config.min_matches,
        })
    }

    pub fn reference(&self) -> &ReferenceFeatures {
        &self.reference
    }

    pub fn extractor(&self) -> &Orb {
        &self.orb
    }

    pub fn match_config(&self) -> MatchConfig {
        self.matching
    }

    /// Cross-checked matches between the reference and an already extracted query.
    pub fn matches(&self, query: &ExtractionResult) -> Vec<Match> {
        match_features(&self.reference.features, query, self.matching)
    }

    /// Look for the reference in a query image.
    ///
    /// Returns at most one detection, bounding every query keypoint that
    /// matched. An empty vector means the reference was not found.
    pub fn detect(&self, query: &GrayImage) -> Result<Vec<Detection>> {
        let features = self.orb.extract(query).map_err(|source| Error::Extraction {
            role: ImageRole::Query,
            source,
        })?;
        let matches = self.matches(&features);
        if matches.len() < self.min_matches {
            debug!(
                "{} matches, {} needed for a detection",
                matches.len(),
                self.min_matches
            );
            return Ok(vec![]);
        }
        Ok(bounding_box(&matches, features.keypoints())
            .map(|bounding_box| Detection {
                bounding_box,
                confidence: 1.0,
                label: MATCH_LABEL.to_owned(),
            })
            .into_iter()
            .collect())
    }

    /// Convert any decoded image to grayscale and run [`detect`](Self::detect).
    pub fn detect_dynamic(&self, query: &DynamicImage) -> Result<Vec<Detection>> {
        self.detect(&query.to_luma8())
    }

    /// Decode the image at `path` and run [`detect`](Self::detect).
    pub fn detect_path(&self, path: impl AsRef<Path>) -> Result<Vec<Detection>> {
        let path = path.as_ref();
        let image = image::open(path).map_err(|source| Error::QueryLoad {
            path: path.to_owned(),
            source,
        })?;
        self.detect_dynamic(&image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ExtractError;
    use image::Luma;
    use rand::{Rng, SeedableRng};
    use rand_pcg::Pcg64;

    fn blocks(width: u32, height: u32, seed: u64) -> GrayImage {
        let mut rng = Pcg64::seed_from_u64(seed);
        let cols = (width + 7) / 8;
        let shades: Vec<u8> = (0..cols * ((height + 7) / 8)).map(|_| rng.gen()).collect();
        GrayImage::from_fn(width, height, |x, y| {
            Luma([shades[((y / 8) * cols + x / 8) as usize]])
        })
    }

    fn detector() -> FeatureMatchDetector {
        FeatureMatchDetector::from_reference_image(
            &blocks(160, 160, 1),
            &DetectorConfig::new("reference.png"),
        )
        .unwrap()
    }

    #[test]
    fn finds_reference_in_itself() {
        let detector = detector();
        let reference = blocks(160, 160, 1);
        let detections = detector.detect(&reference).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].confidence, 1.0);
        assert_eq!(detections[0].label, "match");
        assert!(detector.reference().path().is_none());
    }

    #[test]
    fn flat_query_detects_nothing() {
        let query = GrayImage::from_pixel(160, 160, Luma([90]));
        assert!(detector().detect(&query).unwrap().is_empty());
    }

    #[test]
    fn small_query_fails_but_detector_survives() {
        let detector = detector();
        match detector.detect(&GrayImage::new(10, 10)) {
            Err(Error::Extraction {
                role: ImageRole::Query,
                source: ExtractError::ImageTooSmall { .. },
            }) => {}
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(detector.detect(&blocks(160, 160, 1)).unwrap().len(), 1);
    }

    #[test]
    fn small_reference_fails_construction() {
        let result = FeatureMatchDetector::from_reference_image(
            &GrayImage::new(20, 20),
            &DetectorConfig::new("reference.png"),
        );
        assert!(matches!(
            result,
            Err(Error::Extraction {
                role: ImageRole::Reference,
                ..
            })
        ));
    }

    #[test]
    fn min_matches_suppresses_weak_detections() {
        let mut config = DetectorConfig::new("reference.png");
        config.min_matches = 100_000;
        let detector =
            FeatureMatchDetector::from_reference_image(&blocks(160, 160, 1), &config).unwrap();
        assert!(detector.detect(&blocks(160, 160, 1)).unwrap().is_empty());
    }

    #[test]
    fn concurrent_queries_agree() {
        let detector = detector();
        let query = blocks(160, 160, 1);
        let expected = detector.detect(&query).unwrap();
        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| scope.spawn(|| detector.detect(&query).unwrap()))
                .collect();
            for handle in handles {
                assert_eq!(handle.join().unwrap(), expected);
            }
        });
    }
}
