use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Reasons the keypoint extractor refuses an input image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("image has no pixels")]
    EmptyImage,
    #[error("image of {width}x{height} is smaller than the {minimum}x{minimum} descriptor patch")]
    ImageTooSmall {
        width: u32,
        height: u32,
        minimum: u32,
    },
}

/// Which image of a detection a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageRole {
    Reference,
    Query,
}

impl fmt::Display for ImageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageRole::Reference => write!(f, "reference"),
            ImageRole::Query => write!(f, "query"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
    #[error("unable to load reference image {}", path.display())]
    ReferenceLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("unable to load query image {}", path.display())]
    QueryLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("feature extraction failed on the {role} image")]
    Extraction {
        role: ImageRole,
        #[source]
        source: ExtractError,
    },
}

impl Error {
    pub(crate) fn invalid_config(reason: impl Into<String>) -> Self {
        Error::InvalidConfig {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
