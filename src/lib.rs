//! Detect whether a single reference image appears in query images.
//!
//! Keypoints are found with a segment-test corner detector over an image
//! pyramid, oriented by their intensity centroid and described with rotated
//! binary pixel comparisons. Query descriptors are matched to the reference by
//! Hamming distance with a mutual nearest neighbor check, and the matched query
//! keypoints are reduced to one bounding box.
//!
//! ```no_run
//! use feature_match_detector::{DetectorConfig, FeatureMatchDetector};
//!
//! let config = DetectorConfig::from_path("detector.json")?;
//! let detector = FeatureMatchDetector::new(&config)?;
//! let query = image::open("query.png").unwrap().to_luma8();
//! for detection in detector.detect(&query)? {
//!     println!("{} at {:?}", detection.label, detection.bounding_box);
//! }
//! # Ok::<(), feature_match_detector::Error>(())
//! ```

pub mod bounding;
pub mod brief;
pub mod config;
pub mod detector;
pub mod error;
pub mod fast;
pub mod image;
pub mod keypoint;
pub mod matching;
pub mod orientation;
pub mod pyramid;

pub use crate::bounding::{bounding_box, Point, Rectangle};
pub use crate::brief::{Descriptor, SamplingPattern, MAX_DESCRIPTOR_BITS};
pub use crate::config::DetectorConfig;
pub use crate::detector::{Detection, FeatureMatchDetector, ReferenceFeatures};
pub use crate::error::{Error, ExtractError, ImageRole, Result};
pub use crate::keypoint::{ExtractionResult, KeyPoint};
pub use crate::matching::{match_descriptors, match_features, Match, MatchConfig};

use crate::brief::Pattern;
use crate::image::{gaussian_blur, GrayFloatImage};
use crate::pyramid::Layer;
use ::image::{DynamicImage, GrayImage};
use log::*;
use serde::{Deserialize, Serialize};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Largest accepted descriptor patch side.
pub const MAX_PATCH_SIZE: u32 = 512;

/// Contains the configuration parameters of the keypoint extractor.
///
/// The defaults give 512 bit oriented descriptors over a 4 layer pyramid.
/// `fast_threshold` is the parameter most worth tuning: lower values find more
/// keypoints in low contrast images.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrbConfig {
    /// Number of pyramid layers, including the full resolution image.
    pub num_layers: usize,

    /// Each pyramid layer is this many times smaller than the previous one.
    pub downscale_factor: u32,

    /// Intensity difference a circle pixel needs to count as brighter or darker.
    pub fast_threshold: u8,

    /// Contiguous circle pixels (out of 16) required for a corner.
    pub fast_arc_length: usize,

    /// Side of the square non-maximum suppression window, at most `patch_size`.
    pub nms_window: usize,

    /// Compute a dominant orientation per keypoint.
    pub oriented: bool,

    /// Radius of the disc used for the orientation, at most `patch_size`.
    pub orientation_radius: u32,

    /// Length of the descriptor in bits (at most 512).
    pub descriptor_bits: usize,

    /// Distribution of the comparison pairs.
    pub sampling: SamplingPattern,

    /// Side of the square patch the comparison pairs are drawn from, at most [`MAX_PATCH_SIZE`].
    pub patch_size: u32,

    /// Rotate the comparison pairs by the keypoint orientation.
    pub rotate_samples: bool,

    /// Sigma of the Gaussian applied before sampling, 0 to disable.
    pub smoothing_sigma: f32,
}

impl Default for OrbConfig {
    fn default() -> Self {
        Self {
            num_layers: 4,
            downscale_factor: 2,
            fast_threshold: 20,
            fast_arc_length: 9,
            nms_window: 7,
            oriented: true,
            orientation_radius: 16,
            descriptor_bits: 512,
            sampling: SamplingPattern::GaussianAroundFirst,
            patch_size: 48,
            rotate_samples: true,
            smoothing_sigma: 2.0,
        }
    }
}

impl OrbConfig {
    /// Check every option is in range.
    pub fn validate(&self) -> Result<()> {
        let fail = |reason: String| Err(Error::invalid_config(reason));
        if self.num_layers == 0 {
            return fail("num_layers must be at least 1".into());
        }
        if self.downscale_factor < 2 {
            return fail(format!(
                "downscale_factor must be at least 2, got {}",
                self.downscale_factor
            ));
        }
        if !(1..=16).contains(&self.fast_arc_length) {
            return fail(format!(
                "fast_arc_length must be between 1 and 16, got {}",
                self.fast_arc_length
            ));
        }
        if !(1..=MAX_DESCRIPTOR_BITS).contains(&self.descriptor_bits) {
            return fail(format!(
                "descriptor_bits must be between 1 and {}, got {}",
                MAX_DESCRIPTOR_BITS, self.descriptor_bits
            ));
        }
        if !(2..=MAX_PATCH_SIZE).contains(&self.patch_size) {
            return fail(format!(
                "patch_size must be between 2 and {}, got {}",
                MAX_PATCH_SIZE, self.patch_size
            ));
        }
        // Both neighborhoods are bounded by the patch so the border stays small.
        if !(1..=self.patch_size).contains(&self.orientation_radius) {
            return fail(format!(
                "orientation_radius must be between 1 and patch_size ({}), got {}",
                self.patch_size, self.orientation_radius
            ));
        }
        if self.nms_window > self.patch_size as usize {
            return fail(format!(
                "nms_window must be at most patch_size ({}), got {}",
                self.patch_size, self.nms_window
            ));
        }
        if !self.smoothing_sigma.is_finite() || self.smoothing_sigma < 0.0 {
            return fail(format!(
                "smoothing_sigma must be a non-negative number, got {}",
                self.smoothing_sigma
            ));
        }
        Ok(())
    }
}

/// The keypoint extractor.
///
/// Holds a validated [`OrbConfig`] and the comparison pattern derived from it.
/// Extraction is a pure function of the image and the configuration, so one
/// extractor can be shared between threads.
#[derive(Debug, Clone)]
pub struct Orb {
    config: OrbConfig,
    pattern: Pattern,
    disc: Vec<(i32, i32)>,
}

impl Default for Orb {
    fn default() -> Self {
        Self::with_valid_config(OrbConfig::default())
    }
}

impl Orb {
    pub fn new(config: OrbConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_valid_config(config))
    }

    fn with_valid_config(config: OrbConfig) -> Self {
        Self {
            pattern: Pattern::generate(config.sampling, config.descriptor_bits, config.patch_size),
            disc: orientation::disc(config.orientation_radius),
            config,
        }
    }

    pub fn config(&self) -> &OrbConfig {
        &self.config
    }

    /// Keypoints closer than this to a layer edge are never reported.
    pub fn border(&self) -> u32 {
        let orientation = if self.config.oriented {
            self.config.orientation_radius
        } else {
            0
        };
        self.pattern
            .radius()
            .max(orientation)
            .max(fast::CIRCLE_RADIUS)
    }

    /// Smallest width and height an image must have.
    pub fn minimum_size(&self) -> u32 {
        self.config.patch_size
    }

    /// Extract keypoints and descriptors from a grayscale image.
    ///
    /// Keypoints come out layer by layer, each layer in scan order. An image
    /// large enough to be accepted may still produce no keypoints at all.
    pub fn extract(&self, image: &GrayImage) -> std::result::Result<ExtractionResult, ExtractError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(ExtractError::EmptyImage);
        }
        let minimum = self.minimum_size();
        if width < minimum || height < minimum {
            return Err(ExtractError::ImageTooSmall {
                width,
                height,
                minimum,
            });
        }
        let layers = pyramid::build(
            image,
            self.config.num_layers,
            self.config.downscale_factor,
            minimum,
        );
        let mut keypoints = vec![];
        let mut descriptors = vec![];
        for layer in &layers {
            let (layer_keypoints, layer_descriptors) = self.extract_layer(layer);
            debug!(
                "Layer {} ({}x{}) produced {} keypoints.",
                layer.level,
                layer.image.width(),
                layer.image.height(),
                layer_keypoints.len()
            );
            keypoints.extend(layer_keypoints);
            descriptors.extend(layer_descriptors);
        }
        info!(
            "Extracted {} features from {} layers of a {}x{} image",
            keypoints.len(),
            layers.len(),
            width,
            height
        );
        Ok(ExtractionResult::new(
            keypoints,
            descriptors,
            self.config.descriptor_bits,
        ))
    }

    /// Convert any decoded image to grayscale and extract from it.
    pub fn extract_dynamic(
        &self,
        image: &DynamicImage,
    ) -> std::result::Result<ExtractionResult, ExtractError> {
        self.extract(&image.to_luma8())
    }

    fn extract_layer(&self, layer: &Layer) -> (Vec<KeyPoint>, Vec<Descriptor>) {
        let (width, height) = layer.image.dimensions();
        let (corners, scores) = fast::detect(
            &layer.image,
            self.config.fast_threshold,
            self.config.fast_arc_length,
            self.border(),
        );
        let corners =
            fast::non_maximum_suppression(corners, &scores, width, height, self.config.nms_window);
        if corners.is_empty() {
            return (vec![], vec![]);
        }
        let smoothed = gaussian_blur(
            &GrayFloatImage::from_gray(&layer.image),
            self.config.smoothing_sigma,
        );
        trace!("Smoothing layer {} finished.", layer.level);
        let describe = |corner: &fast::Corner| {
            let angle = if self.config.oriented {
                orientation::intensity_centroid(&layer.image, corner.x, corner.y, &self.disc)
            } else {
                0.0
            };
            // center of the tile the layer pixel was averaged from
            let offset = (layer.scale - 1) / 2;
            let keypoint = KeyPoint {
                x: corner.x * layer.scale + offset,
                y: corner.y * layer.scale + offset,
                angle,
                layer: layer.level,
                response: corner.score,
            };
            let rotation = self.config.rotate_samples.then(|| angle);
            let descriptor = self
                .pattern
                .describe(&smoothed, corner.x, corner.y, rotation);
            (keypoint, descriptor)
        };
        #[cfg(not(feature = "rayon"))]
        {
            corners.iter().map(describe).unzip()
        }
        #[cfg(feature = "rayon")]
        {
            corners.par_iter().map(describe).unzip()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::image::Luma;
    use rand::{Rng, SeedableRng};
    use rand_pcg::Pcg64;

    /// Random 8x8 blocks of gray, which gives plenty of corners.
    fn blocks(width: u32, height: u32, seed: u64) -> GrayImage {
        let mut rng = Pcg64::seed_from_u64(seed);
        let cols = (width + 7) / 8;
        let rows = (height + 7) / 8;
        let shades: Vec<u8> = (0..cols * rows).map(|_| rng.gen()).collect();
        GrayImage::from_fn(width, height, |x, y| {
            Luma([shades[((y / 8) * cols + x / 8) as usize]])
        })
    }

    #[test]
    fn default_config_is_valid() {
        assert!(OrbConfig::default().validate().is_ok());
        assert_eq!(Orb::default().border(), 34);
    }

    #[test]
    fn rejects_bad_options() {
        let bad = [
            OrbConfig {
                num_layers: 0,
                ..Default::default()
            },
            OrbConfig {
                downscale_factor: 1,
                ..Default::default()
            },
            OrbConfig {
                fast_arc_length: 17,
                ..Default::default()
            },
            OrbConfig {
                descriptor_bits: 513,
                ..Default::default()
            },
            OrbConfig {
                patch_size: 1,
                ..Default::default()
            },
            OrbConfig {
                smoothing_sigma: f32::NAN,
                ..Default::default()
            },
            OrbConfig {
                patch_size: MAX_PATCH_SIZE + 1,
                ..Default::default()
            },
            OrbConfig {
                orientation_radius: 2_200_000_000,
                ..Default::default()
            },
            OrbConfig {
                orientation_radius: 49,
                ..Default::default()
            },
            OrbConfig {
                nms_window: usize::MAX,
                ..Default::default()
            },
            OrbConfig {
                nms_window: 49,
                ..Default::default()
            },
        ];
        for config in bad {
            assert!(
                matches!(Orb::new(config), Err(Error::InvalidConfig { .. })),
                "{:?} should be rejected",
                config
            );
        }
    }

    #[test]
    fn rejects_empty_and_tiny_images() {
        let orb = Orb::default();
        assert_eq!(
            orb.extract(&GrayImage::new(0, 0)).unwrap_err(),
            ExtractError::EmptyImage
        );
        assert_eq!(
            orb.extract(&GrayImage::new(47, 100)).unwrap_err(),
            ExtractError::ImageTooSmall {
                width: 47,
                height: 100,
                minimum: 48
            }
        );
        // exactly the patch size is accepted, even if nothing fits inside the border
        assert!(orb.extract(&GrayImage::new(48, 48)).unwrap().is_empty());
    }

    #[test]
    fn extraction_is_deterministic() {
        let image = blocks(200, 160, 7);
        let orb = Orb::default();
        let a = orb.extract(&image).unwrap();
        let b = orb.extract(&image).unwrap();
        assert!(!a.is_empty());
        assert_eq!(a.keypoints(), b.keypoints());
        for (da, db) in a.descriptors().iter().zip(b.descriptors()) {
            assert_eq!(da.distance(db), 0);
        }
    }

    #[test]
    fn keypoints_ordered_by_layer_then_scan() {
        let image = blocks(320, 240, 3);
        let result = Orb::default().extract(&image).unwrap();
        assert_eq!(result.keypoints().len(), result.descriptors().len());
        for pair in result.keypoints().windows(2) {
            let (a, b) = (pair[0], pair[1]);
            assert!(a.layer <= b.layer);
            if a.layer == b.layer {
                assert!((a.y, a.x) < (b.y, b.x));
            }
        }
        assert!(result.keypoints().iter().any(|kp| kp.layer > 0));
    }

    #[test]
    fn keypoints_respect_border() {
        let image = blocks(200, 160, 11);
        let orb = Orb::default();
        let border = orb.border();
        for kp in orb.extract(&image).unwrap().keypoints() {
            let scale = 2u32.pow(kp.layer as u32);
            let (x, y) = (kp.x / scale, kp.y / scale);
            let (w, h) = (200 / scale, 160 / scale);
            assert!(x >= border && y >= border);
            assert!(x < w - border && y < h - border);
        }
    }

    #[test]
    fn coarse_keypoints_sit_at_tile_centers() {
        let result = Orb::default().extract(&blocks(320, 240, 3)).unwrap();
        let mut coarse = 0;
        for kp in result.keypoints() {
            let scale = 2u32.pow(kp.layer as u32);
            assert_eq!(kp.x % scale, (scale - 1) / 2);
            assert_eq!(kp.y % scale, (scale - 1) / 2);
            coarse += usize::from(kp.layer > 0);
        }
        assert!(coarse > 0);
    }

    #[test]
    fn largest_neighborhoods_extract_without_overflow() {
        let orb = Orb::new(OrbConfig {
            orientation_radius: 48,
            nms_window: 48,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(orb.border(), 48);
        assert!(orb.extract(&blocks(96, 96, 2)).unwrap().is_empty());
        assert!(!orb.extract(&blocks(160, 160, 2)).unwrap().is_empty());
    }

    #[cfg(feature = "rayon")]
    #[test]
    fn thread_count_does_not_change_order() {
        let image = blocks(320, 240, 13);
        let extract_with = |threads: usize| {
            rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .unwrap()
                .install(|| Orb::default().extract(&image).unwrap())
        };
        let single = extract_with(1);
        let many = extract_with(4);
        assert!(!single.is_empty());
        assert_eq!(single.keypoints(), many.keypoints());
        for (a, b) in single.descriptors().iter().zip(many.descriptors()) {
            assert_eq!(a.distance(b), 0);
        }
    }

    #[test]
    fn short_descriptors_leave_high_bits_clear() {
        let orb = Orb::new(OrbConfig {
            descriptor_bits: 128,
            ..Default::default()
        })
        .unwrap();
        let result = orb.extract(&blocks(160, 160, 5)).unwrap();
        assert!(!result.is_empty());
        assert_eq!(result.descriptor_bits(), 128);
        for descriptor in result.descriptors() {
            assert!(descriptor.bytes().iter().skip(16).all(|&byte| byte == 0));
        }
    }

    #[test]
    fn unoriented_keypoints_have_zero_angle() {
        let orb = Orb::new(OrbConfig {
            oriented: false,
            ..Default::default()
        })
        .unwrap();
        let result = orb.extract(&blocks(160, 160, 9)).unwrap();
        assert!(result.keypoints().iter().all(|kp| kp.angle == 0.0));
    }
}
