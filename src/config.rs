use crate::error::{Error, Result};
use crate::matching::MatchConfig;
use crate::OrbConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Maximum Hamming distance used when the configuration leaves it unset.
pub const DEFAULT_MAX_MATCH_DISTANCE: u32 = 50;

/// The settings of a [`FeatureMatchDetector`](crate::FeatureMatchDetector).
///
/// Usually read from JSON, where everything but `reference_image_path` may be
/// left out:
///
/// ```json
/// {
///     "reference_image_path": "logo.png",
///     "max_match_distance": 40,
///     "extractor": { "fast_threshold": 15 }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// The image to look for.
    pub reference_image_path: PathBuf,
    /// The threshold distance above which a match is discarded
    #[serde(default)]
    pub max_match_distance: Option<u32>,
    /// Matches needed before anything is reported
    #[serde(default = "default_min_matches")]
    pub min_matches: usize,
    #[serde(default)]
    pub extractor: OrbConfig,
}

fn default_min_matches() -> usize {
    1
}

impl DetectorConfig {
    /// A configuration with default settings for the given reference image.
    pub fn new(reference_image_path: impl Into<PathBuf>) -> Self {
        Self {
            reference_image_path: reference_image_path.into(),
            max_match_distance: None,
            min_matches: default_min_matches(),
            extractor: OrbConfig::default(),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::invalid_config(format!("unable to parse JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| {
            Error::invalid_config(format!("unable to open {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_reader(std::io::BufReader::new(file)).map_err(|e| {
            Error::invalid_config(format!("unable to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// The configured maximum match distance, or [`DEFAULT_MAX_MATCH_DISTANCE`]
    /// when it is unset or 0.
    pub fn max_match_distance(&self) -> u32 {
        match self.max_match_distance {
            None | Some(0) => DEFAULT_MAX_MATCH_DISTANCE,
            Some(distance) => distance,
        }
    }

    /// The matcher settings used against the reference. Cross-checking is always on.
    pub fn match_config(&self) -> MatchConfig {
        MatchConfig {
            max_distance: self.max_match_distance(),
            cross_check: true,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.reference_image_path.as_os_str().is_empty() {
            return Err(Error::invalid_config("reference_image_path is empty"));
        }
        if self.min_matches == 0 {
            return Err(Error::invalid_config("min_matches must be at least 1"));
        }
        self.extractor.validate()?;
        if let Some(distance) = self.max_match_distance {
            if distance as usize > self.extractor.descriptor_bits {
                return Err(Error::invalid_config(format!(
                    "max_match_distance {} exceeds the descriptor length of {} bits",
                    distance, self.extractor.descriptor_bits
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn minimal_json_uses_defaults() {
        let config = DetectorConfig::from_json_str(r#"{"reference_image_path": "ref.png"}"#)
            .unwrap();
        assert_eq!(config, DetectorConfig::new("ref.png"));
        assert_eq!(config.max_match_distance(), DEFAULT_MAX_MATCH_DISTANCE);
        assert_eq!(config.min_matches, 1);
        assert!(config.match_config().cross_check);
    }

    #[test]
    fn zero_distance_means_default() {
        let config = DetectorConfig::from_json_str(
            r#"{"reference_image_path": "ref.png", "max_match_distance": 0}"#,
        )
        .unwrap();
        assert_eq!(config.max_match_distance(), DEFAULT_MAX_MATCH_DISTANCE);
        assert_eq!(config.match_config().max_distance, DEFAULT_MAX_MATCH_DISTANCE);
    }

    #[test]
    fn partial_extractor_settings() {
        let config = DetectorConfig::from_json_str(
            r#"{
                "reference_image_path": "ref.png",
                "extractor": {"fast_threshold": 12, "sampling": "uniform"}
            }"#,
        )
        .unwrap();
        assert_eq!(config.extractor.fast_threshold, 12);
        assert_eq!(config.extractor.sampling, crate::SamplingPattern::Uniform);
        assert_eq!(config.extractor.num_layers, OrbConfig::default().num_layers);
    }

    #[test]
    fn invalid_settings_are_rejected() {
        for json in [
            r#"{}"#,
            r#"{"reference_image_path": ""}"#,
            r#"{"reference_image_path": "ref.png", "min_matches": 0}"#,
            r#"{"reference_image_path": "ref.png", "max_match_distance": 600}"#,
            r#"{"reference_image_path": "ref.png", "max_match_distance": -1}"#,
            r#"{"reference_image_path": "ref.png", "extractor": {"descriptor_bits": 128}, "max_match_distance": 200}"#,
            r#"{"reference_image_path": "ref.png", "extractor": {"num_layers": 0}}"#,
            r#"not json"#,
        ] {
            assert!(
                matches!(
                    DetectorConfig::from_json_str(json),
                    Err(Error::InvalidConfig { .. })
                ),
                "{} should be rejected",
                json
            );
        }
    }

    #[test]
    fn reads_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"reference_image_path": "ref.png", "max_match_distance": 30, "min_matches": 4}}"#
        )
        .unwrap();
        let config = DetectorConfig::from_path(file.path()).unwrap();
        assert_eq!(config.max_match_distance(), 30);
        assert_eq!(config.min_matches, 4);
    }

    #[test]
    fn missing_config_file_is_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            DetectorConfig::from_path(dir.path().join("missing.json")),
            Err(Error::InvalidConfig { .. })
        ));
    }

    #[test]
    fn serializes_back_to_json() {
        let mut config = DetectorConfig::new("ref.png");
        config.max_match_distance = Some(20);
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(DetectorConfig::from_json_str(&json).unwrap(), config);
    }
}
