//! Settings for a [`Session`](crate::Session).
//!
//! The configuration is read from a `config.toml` stored next to the
//! generator checkpoint. Keys use the upper case names of the original
//! checkpoint layout, eg.
//!
//! ```toml
//! MODE = 2
//! DEVICE = "cuda:0"
//! TEST_FLIST = "./flist/test.flist"
//! KM = 3
//! SIGMA = 2.0
//! INPUT_SIZE = 256
//! DEBUG = 1
//! ```
use crate::{errors::InvalidRange, Error};
use candle_core::Device;
use serde::Deserialize;
use std::{
    fmt,
    path::{Path, PathBuf},
};

/// Name of the configuration file looked up by [`Config::load`]
pub const CONFIG_FILE: &str = "config.toml";

/// Edge values at or below this become 0 in `draw`, everything above 255
pub const DEFAULT_EDGE_THRESHOLD: u8 = 69;

const MAX_INPUT_SIZE: u32 = 4096;
const MAX_SIGMA: f32 = 64.0;

/// What a session is built to do.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(from = "u8")]
pub enum Mode {
    /// `MODE = 1`
    Train,
    /// `MODE = 2`, batch evaluation over `TEST_FLIST`
    Test,
    /// Any other value, single-shot synthesis through `Session::draw`
    Draw,
}

impl From<u8> for Mode {
    fn from(v: u8) -> Self {
        match v {
            1 => Self::Train,
            2 => Self::Test,
            _ => Self::Draw,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Train => write!(f, "train"),
            Self::Test => write!(f, "test"),
            Self::Draw => write!(f, "draw"),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", default)]
pub struct Config {
    pub mode: Mode,
    /// `cpu`, `cuda`, `gpu` or `cuda:N`
    pub device: String,
    /// Seeds the k-means initialisation used to build colour domains
    pub seed: u64,
    pub test_flist: PathBuf,
    /// Checkpoint directory, also the root of the default results directory
    pub path: PathBuf,
    /// Overrides the default results directory when set
    pub results: Option<PathBuf>,
    /// Non-zero enables dumping of the network inputs next to each result
    pub debug: Option<u32>,
    /// Number of colours in a colour domain
    pub km: u32,
    /// Gaussian sigma applied before edge detection
    pub sigma: f32,
    /// Square size samples are resized to, 0 keeps test samples as they are
    pub input_size: u32,
    pub residual_blocks: usize,
    pub edge_threshold: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::Test,
            device: "cpu".to_owned(),
            seed: 10,
            test_flist: PathBuf::from("./flist/test.flist"),
            path: PathBuf::from("./checkpoints"),
            results: None,
            debug: None,
            km: 3,
            sigma: 2.0,
            input_size: 256,
            residual_blocks: 8,
            edge_threshold: DEFAULT_EDGE_THRESHOLD,
        }
    }
}

impl Config {
    /// Parses a TOML configuration file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;

        toml::from_str(&text).map_err(|source| Error::ConfigParse {
            path: path.to_owned(),
            source,
        })
    }

    /// Loads `config.toml` from a checkpoint directory, falling back to the
    /// defaults if there isn't one. `PATH` always points at `dir`.
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self, Error> {
        let dir = dir.as_ref();
        let file = dir.join(CONFIG_FILE);

        let mut config = if file.exists() {
            Self::from_path(&file)?
        } else {
            tracing::warn!(
                "'{}' not found, using the default configuration",
                file.display()
            );
            Self::default()
        };

        config.path = dir.to_owned();
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.km == 0 {
            return Err(Error::InvalidRange(InvalidRange {
                min: 1.0,
                max: 256.0,
                value: self.km as f32,
                name: "KM",
            }));
        }

        if !(0.0..=MAX_SIGMA).contains(&self.sigma) {
            return Err(Error::InvalidRange(InvalidRange {
                min: 0.0,
                max: MAX_SIGMA,
                value: self.sigma,
                name: "SIGMA",
            }));
        }

        if self.input_size > MAX_INPUT_SIZE {
            return Err(Error::InvalidRange(InvalidRange {
                min: 0.0,
                max: MAX_INPUT_SIZE as f32,
                value: self.input_size as f32,
                name: "INPUT_SIZE",
            }));
        }

        if self.residual_blocks == 0 {
            return Err(Error::InvalidRange(InvalidRange {
                min: 1.0,
                max: 64.0,
                value: self.residual_blocks as f32,
                name: "RESIDUAL_BLOCKS",
            }));
        }

        Ok(())
    }

    pub fn debug(&self) -> bool {
        matches!(self.debug, Some(v) if v != 0)
    }

    /// Where `Session::test` writes its outputs
    pub fn results_path(&self) -> PathBuf {
        match &self.results {
            Some(results) => results.clone(),
            None => self
                .path
                .join("results")
                .join(format!("km_{}_sigma_{}", self.km, self.sigma)),
        }
    }

    /// Resolves `DEVICE` to a compute device
    pub fn device(&self) -> Result<Device, Error> {
        parse_device(&self.device)
    }
}

fn cuda_device(ordinal: usize) -> Result<Device, Error> {
    Device::new_cuda(ordinal).map_err(|e| {
        Error::UnknownDevice(format!(
            "failed to create CUDA device {} ({}), is the `cuda` feature enabled?",
            ordinal, e
        ))
    })
}

pub fn parse_device(device: &str) -> Result<Device, Error> {
    let device = device.trim().to_lowercase();
    match device.as_str() {
        "cpu" => Ok(Device::Cpu),
        "cuda" | "gpu" => cuda_device(0),
        s if s.starts_with("cuda:") => {
            let ordinal = s["cuda:".len()..].parse::<usize>().map_err(|_| {
                Error::UnknownDevice(format!("invalid CUDA device ordinal in '{}'", s))
            })?;
            cuda_device(ordinal)
        }
        other => Err(Error::UnknownDevice(format!(
            "unknown device '{}', use 'cpu', 'cuda' or 'cuda:N'",
            other
        ))),
    }
}
