use std::{fmt, path::PathBuf};

use crate::config::Mode;

#[derive(Debug)]
pub struct InvalidRange {
    pub(crate) min: f32,
    pub(crate) max: f32,
    pub(crate) value: f32,
    pub(crate) name: &'static str,
}

impl fmt::Display for InvalidRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "parameter '{}' - value '{}' is outside the range of {}-{}",
            self.name, self.value, self.min, self.max
        )
    }
}

#[derive(Debug)]
pub enum Error {
    /// An error in the image library occurred, eg failed to decode an input
    Image(image::ImageError),
    /// Io is notoriously error free with no problems, but we cover it just in case!
    Io(std::io::Error),
    /// The configuration file could not be parsed
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },
    /// A configuration parameter had an invalid range specified
    InvalidRange(InvalidRange),
    /// The compute device string was not understood, or the device is not
    /// available in this build
    UnknownDevice(String),
    /// The session was configured for a mode this crate can't run
    UnsupportedMode(Mode),
    /// `test` was called on a session that wasn't built in test mode
    NoTestDataset,
    /// No generator checkpoint exists at any of the searched locations
    CheckpointMissing(PathBuf),
    /// A checkpoint exists but couldn't be read, or didn't match the network
    CheckpointLoad {
        path: PathBuf,
        source: candle_core::Error,
    },
    /// The generator was run before its weights were loaded
    GeneratorNotLoaded,
    /// A sample from the test file list couldn't be decoded
    SampleDecode {
        path: PathBuf,
        source: image::ImageError,
    },
    /// A sample name has no extension to split debug file names from
    InvalidSampleName(String),
    /// The forward pass, or a tensor conversion around it, failed
    Inference(candle_core::Error),
    /// A result image couldn't be written
    OutputWrite {
        path: PathBuf,
        source: image::ImageError,
    },
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Image(err) => Some(err),
            Self::Io(err) => Some(err),
            Self::ConfigParse { source, .. } => Some(source),
            Self::CheckpointLoad { source, .. } | Self::Inference(source) => Some(source),
            Self::SampleDecode { source, .. } | Self::OutputWrite { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image(ie) => write!(f, "{}", ie),
            Self::Io(io) => write!(f, "{}", io),
            Self::ConfigParse { path, source } => {
                write!(f, "failed to parse config '{}': {}", path.display(), source)
            }
            Self::InvalidRange(ir) => write!(f, "{}", ir),
            Self::UnknownDevice(dev) => write!(f, "{}", dev),
            Self::UnsupportedMode(mode) => {
                write!(f, "mode '{}' is not supported by this harness", mode)
            }
            Self::NoTestDataset => write!(
                f,
                "no test dataset available, the session must be built with MODE = 2"
            ),
            Self::CheckpointMissing(path) => write!(
                f,
                "no generator checkpoint found in '{}'",
                path.display()
            ),
            Self::CheckpointLoad { path, source } => write!(
                f,
                "failed to load generator checkpoint '{}': {}",
                path.display(),
                source
            ),
            Self::GeneratorNotLoaded => {
                write!(f, "the generator must be loaded before running inference")
            }
            Self::SampleDecode { path, source } => {
                write!(f, "failed to decode sample '{}': {}", path.display(), source)
            }
            Self::InvalidSampleName(name) => write!(
                f,
                "sample name '{}' must have the form <stem>.<extension>",
                name
            ),
            Self::Inference(err) => write!(f, "inference failed: {}", err),
            Self::OutputWrite { path, source } => {
                write!(f, "failed to write '{}': {}", path.display(), source)
            }
        }
    }
}

impl From<image::ImageError> for Error {
    fn from(ie: image::ImageError) -> Self {
        Self::Image(ie)
    }
}

impl From<std::io::Error> for Error {
    fn from(io: std::io::Error) -> Self {
        Self::Io(io)
    }
}

impl From<candle_core::Error> for Error {
    fn from(ce: candle_core::Error) -> Self {
        Self::Inference(ce)
    }
}
