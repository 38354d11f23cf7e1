use crate::*;
use candle_core::{Device, IndexOp, Tensor};
use image::imageops::FilterType;
use std::path::{Path, PathBuf};

/// Inference session.
///
/// A session owns the configuration and the generator, and drives either a
/// batch evaluation over the test file list with [`Session::test`], or a
/// single interactive synthesis with [`Session::draw`].
///
/// # Example
/// ```no_run
/// let config = pi_rec::Config::load("checkpoints").expect("failed to load config");
///
/// let mut session = pi_rec::Session::builder(config)
///     .build()
///     .expect("failed to build session");
///
/// session.load().expect("failed to load the generator");
/// let report = session.test().expect("test run failed");
/// println!("wrote {} images", report.written.len());
/// ```
pub struct Session {
    config: Config,
    device: Device,
    generator: Box<dyn Generator>,
    test_dataset: Option<Dataset>,
    results_path: PathBuf,
    debug: bool,
    progress: Option<Box<dyn TestProgress>>,
}

/// The files written by [`Session::test`]
#[derive(Debug, Default)]
pub struct TestReport {
    /// Number of samples processed
    pub samples: usize,
    /// Every file written, primary outputs and debug images alike
    pub written: Vec<PathBuf>,
}

/// The `_input`, `_edge` and `_color_domain` paths for a sample, always
/// saved as PNG
fn debug_paths(dir: &Path, name: &str) -> Result<[PathBuf; 3], Error> {
    let (stem, _) = split_extension(name)?;

    Ok([
        dir.join(format!("{}_input.png", stem)),
        dir.join(format!("{}_edge.png", stem)),
        dir.join(format!("{}_color_domain.png", stem)),
    ])
}

impl Session {
    /// Creates a new session builder from a configuration.
    pub fn builder(config: Config) -> SessionBuilder {
        SessionBuilder::new(config)
    }

    /// The configuration the session was built from
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The device every tensor is placed on before the forward pass
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// The directory `test` writes to
    pub fn results_path(&self) -> &Path {
        &self.results_path
    }

    /// Loads the generator weights. Both `test` and `draw` fail until this
    /// has succeeded.
    pub fn load(&mut self) -> Result<(), Error> {
        self.generator.load()
    }

    /// Runs the generator over every sample of the test file list, in order,
    /// saving each result under the results directory with the sample's
    /// own name.
    ///
    /// With debug enabled the post-processed network inputs are saved too.
    /// The first failure aborts the run.
    pub fn test(&mut self) -> Result<TestReport, Error> {
        self.generator.set_mode(ModelMode::Eval);

        let dataset = self.test_dataset.as_ref().ok_or(Error::NoTestDataset)?;
        std::fs::create_dir_all(&self.results_path)?;

        let total = dataset.len();
        let mut report = TestReport::default();

        for (index, item) in dataset.iter().enumerate() {
            let (name, sample) = item?;

            // Resolve the debug names up front so a bad name fails before
            // anything is written for this sample
            let debug_outputs = if self.debug {
                Some(debug_paths(&self.results_path, &name)?)
            } else {
                None
            };

            let [images, _gray, edges, color_domain] = self.place([
                &sample.image,
                &sample.gray,
                &sample.edge,
                &sample.color_domain,
            ])?;

            let outputs = self
                .generator
                .forward(Some(&images), &edges, &color_domain)?;
            let outputs = output_align(&images, &outputs)?;

            let output = self.postprocess(&outputs)?.i(0)?;
            let path = self.results_path.join(&name);
            tracing::info!("{} {}", index + 1, name);

            imsave(&output, &path)?;
            report.written.push(path);

            if let Some([input_path, edge_path, color_domain_path]) = debug_outputs {
                imsave(&self.postprocess(&images)?.i(0)?, &input_path)?;
                imsave(&self.postprocess(&edges)?.i(0)?, &edge_path)?;
                imsave(&self.postprocess(&color_domain)?.i(0)?, &color_domain_path)?;

                report
                    .written
                    .extend([input_path, edge_path, color_domain_path]);
            }

            report.samples += 1;

            if let Some(progress) = self.progress.as_mut() {
                progress.update(ProgressUpdate {
                    index: index + 1,
                    total,
                    name: &name,
                });
            }
        }

        if let Some(progress) = self.progress.as_mut() {
            progress.finish();
        }

        tracing::info!("End test....");
        Ok(report)
    }

    /// Synthesizes an image from a colour domain and an edge map.
    ///
    /// Both inputs are resized to `INPUT_SIZE` x `INPUT_SIZE` with a Lanczos
    /// filter, and the edge map is binarized so values at or below
    /// `EDGE_THRESHOLD` become 0 and everything else 255.
    pub fn draw<'a, C, E>(&mut self, color_domain: C, edge: E) -> Result<image::RgbImage, Error>
    where
        C: Into<ImageSource<'a>>,
        E: Into<ImageSource<'a>>,
    {
        self.generator.set_mode(ModelMode::Eval);

        let size = self.config.input_size;
        if size == 0 {
            return Err(Error::InvalidRange(errors::InvalidRange {
                min: 1.0,
                max: 4096.0,
                value: 0.0,
                name: "INPUT_SIZE",
            }));
        }
        let dims = Dims::square(size);

        let color_domain = load_dynamic_image(color_domain.into())?.to_rgb8();
        let color_domain = utils::resize(&color_domain, dims, FilterType::Lanczos3);

        let edge = load_dynamic_image(edge.into())?.to_luma8();
        let mut edge = utils::resize(&edge, dims, FilterType::Lanczos3);
        binarize_edge(&mut edge, self.config.edge_threshold);

        let [color_domain, edge] = self.place([&to_tensor(&color_domain)?, &to_tensor(&edge)?])?;

        if self.debug {
            tracing::debug!(
                "color domain size is {:?}, edges size is {:?}",
                color_domain.dims(),
                edge.dims()
            );
        }

        let outputs = self.generator.forward(None, &edge, &color_domain)?;
        let outputs = output_align(&color_domain, &outputs)?;
        let output = self.postprocess(&outputs)?.i(0)?;

        Ok(to_image(&output)?.to_rgb8())
    }

    /// Scales a `[N, C, H, W]` tensor from [0, 1] to [0, 255] and moves the
    /// channels last, see [`utils::postprocess`]
    pub fn postprocess(&self, img: &Tensor) -> Result<Tensor, Error> {
        utils::postprocess(img)
    }

    /// Moves tensors to the session's compute device
    pub fn place<const N: usize>(&self, tensors: [&Tensor; N]) -> Result<[Tensor; N], Error> {
        utils::place(tensors, &self.device)
    }
}

/// Builds a session from a configuration, calling `build` validates the
/// configuration and prepares the test dataset when `MODE = 2`.
pub struct SessionBuilder {
    config: Config,
    generator: Option<Box<dyn Generator>>,
    progress: Option<Box<dyn TestProgress>>,
}

impl SessionBuilder {
    /// Creates a new `SessionBuilder`, can also be created via
    /// `Session::builder()`
    pub fn new(config: Config) -> Self {
        Self {
            config,
            generator: None,
            progress: None,
        }
    }

    /// Replaces the default [`PiRecGenerator`]
    pub fn generator<G: Generator + 'static>(mut self, generator: G) -> Self {
        self.generator = Some(Box::new(generator));
        self
    }

    /// Receives an update after every sample processed by `test`
    pub fn progress<P: TestProgress + 'static>(mut self, progress: P) -> Self {
        self.progress = Some(Box::new(progress));
        self
    }

    /// Creates a `Session`, or returns an error if the configuration is
    /// invalid or asks for something this crate can't do.
    pub fn build(self) -> Result<Session, Error> {
        self.config.validate()?;

        if self.config.mode == Mode::Train {
            return Err(Error::UnsupportedMode(Mode::Train));
        }

        let device = self.config.device()?;

        let generator = match self.generator {
            Some(generator) => generator,
            None => Box::new(PiRecGenerator::new(&self.config, device.clone())),
        };

        let test_dataset = if self.config.mode == Mode::Test {
            Some(Dataset::new(&self.config, &self.config.test_flist)?)
        } else {
            None
        };

        Ok(Session {
            results_path: self.config.results_path(),
            debug: self.config.debug(),
            config: self.config,
            device,
            generator,
            test_dataset,
            progress: self.progress,
        })
    }
}

/// Progress of a test run, sent after each sample is saved
pub struct ProgressUpdate<'a> {
    /// Number of samples finished so far
    pub index: usize,
    /// Number of samples in the run
    pub total: usize,
    /// Name of the sample just finished
    pub name: &'a str,
}

/// Allows a test run to update external callers with its progress
pub trait TestProgress {
    fn update(&mut self, info: ProgressUpdate<'_>);

    /// Called once after the last sample
    fn finish(&mut self) {}
}

impl<G> TestProgress for G
where
    G: FnMut(ProgressUpdate<'_>) + Send,
{
    fn update(&mut self, info: ProgressUpdate<'_>) {
        self(info)
    }
}
