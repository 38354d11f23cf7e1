use pi_rec as pr;
use pr::{
    candle_core::Tensor,
    image::{DynamicImage, GrayImage, ImageBuffer, Luma, Rgb, RgbImage},
    Config, Error, Generator, Mode, ModelMode, Session,
};
use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

/// Stands in for the trained network by echoing the colour domain back,
/// optionally a few pixels short to exercise output alignment
struct Echo {
    loaded: bool,
    mode: ModelMode,
    shrink: usize,
    /// Whether a full image was passed, and the edges, for every call
    calls: Arc<Mutex<Vec<(bool, Tensor)>>>,
}

impl Echo {
    fn new() -> Self {
        Self {
            loaded: false,
            mode: ModelMode::Train,
            shrink: 0,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn shrinking(shrink: usize) -> Self {
        Self {
            shrink,
            ..Self::new()
        }
    }
}

impl Generator for Echo {
    fn load(&mut self) -> Result<(), Error> {
        self.loaded = true;
        Ok(())
    }

    fn set_mode(&mut self, mode: ModelMode) {
        self.mode = mode;
    }

    fn mode(&self) -> ModelMode {
        self.mode
    }

    fn forward(
        &self,
        images: Option<&Tensor>,
        edges: &Tensor,
        color_domain: &Tensor,
    ) -> Result<Tensor, Error> {
        if !self.loaded {
            return Err(Error::GeneratorNotLoaded);
        }

        self.calls
            .lock()
            .unwrap()
            .push((images.is_some(), edges.clone()));

        assert_eq!(self.mode, ModelMode::Eval);

        let (_, _, height, width) = color_domain.dims4()?;
        Ok(color_domain
            .narrow(2, 0, height - self.shrink)?
            .narrow(3, 0, width - self.shrink)?)
    }
}

fn sample_image(width: u32, height: u32) -> RgbImage {
    ImageBuffer::from_fn(width, height, |x, y| {
        if x < width / 2 {
            Rgb([200, 40 + (y % 4) as u8, 30])
        } else {
            Rgb([20, 90, 180 + (x % 4) as u8])
        }
    })
}

fn test_config(root: &Path, flist: PathBuf) -> Config {
    Config {
        mode: Mode::Test,
        path: root.to_owned(),
        test_flist: flist,
        input_size: 32,
        ..Config::default()
    }
}

#[test]
fn one_output_per_sample() {
    let dir = tempfile::tempdir().unwrap();
    let images = dir.path().join("images");
    std::fs::create_dir(&images).unwrap();

    sample_image(40, 30).save(images.join("b.png")).unwrap();
    sample_image(32, 32).save(images.join("a.jpg")).unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let progress_seen = seen.clone();

    let mut session = Session::builder(test_config(dir.path(), images))
        .generator(Echo::shrinking(2))
        .progress(move |update: pr::ProgressUpdate<'_>| {
            progress_seen
                .lock()
                .unwrap()
                .push((update.index, update.total, update.name.to_owned()));
        })
        .build()
        .unwrap();

    session.load().unwrap();
    let report = session.test().unwrap();

    let results = dir.path().join("results").join("km_3_sigma_2");
    assert_eq!(session.results_path(), results);
    assert_eq!(session.config().km, 3);
    assert!(session.device().is_cpu());
    assert_eq!(report.samples, 2);
    assert_eq!(
        report.written,
        vec![results.join("a.jpg"), results.join("b.png")]
    );

    // the shrunk output is padded back to the input size
    for written in &report.written {
        let img = pr::image::open(written).unwrap();
        assert_eq!((img.width(), img.height()), (32, 32));
    }

    assert_eq!(
        *seen.lock().unwrap(),
        vec![(1, 2, "a.jpg".to_owned()), (2, 2, "b.png".to_owned())]
    );
}

#[test]
fn debug_saves_network_inputs() {
    let dir = tempfile::tempdir().unwrap();
    let sample = dir.path().join("0001.jpg");
    sample_image(48, 48).save(&sample).unwrap();

    let flist = dir.path().join("test.flist");
    std::fs::write(&flist, format!("{}\n", sample.display())).unwrap();

    let config = Config {
        debug: Some(1),
        ..test_config(dir.path(), flist)
    };

    let mut session = Session::builder(config)
        .generator(Echo::new())
        .build()
        .unwrap();
    session.load().unwrap();
    let report = session.test().unwrap();

    let results = dir.path().join("results").join("km_3_sigma_2");
    for name in &[
        "0001.jpg",
        "0001_input.png",
        "0001_edge.png",
        "0001_color_domain.png",
    ] {
        let path = results.join(name);
        assert!(path.exists(), "{} is missing", path.display());
        assert!(report.written.contains(&path));
    }

    let edge = pr::image::open(results.join("0001_edge.png")).unwrap();
    assert!(matches!(edge, DynamicImage::ImageLuma8(_)));
}

fn extensionless_sample(dir: &Path) -> PathBuf {
    let sample = dir.join("0002");
    sample_image(32, 32)
        .save_with_format(&sample, pr::image::ImageFormat::Png)
        .unwrap();

    let flist = dir.join("test.flist");
    std::fs::write(&flist, format!("{}\n", sample.display())).unwrap();
    flist
}

#[test]
fn debug_rejects_names_without_extension() {
    let dir = tempfile::tempdir().unwrap();
    let flist = extensionless_sample(dir.path());

    let config = Config {
        debug: Some(1),
        ..test_config(dir.path(), flist)
    };

    let mut session = Session::builder(config)
        .generator(Echo::new())
        .build()
        .unwrap();
    session.load().unwrap();

    match session.test() {
        Err(Error::InvalidSampleName(name)) => assert_eq!(name, "0002"),
        other => panic!("unexpected result {:?}", other.map(|r| r.written)),
    }

    assert!(!session.results_path().join("0002").exists());
}

#[test]
fn names_without_extension_are_saved_as_png() {
    let dir = tempfile::tempdir().unwrap();
    let flist = extensionless_sample(dir.path());

    let mut session = Session::builder(test_config(dir.path(), flist))
        .generator(Echo::new())
        .build()
        .unwrap();
    session.load().unwrap();
    session.test().unwrap();

    let output = session.results_path().join("0002");
    let format = pr::image::ImageReader::open(&output)
        .unwrap()
        .with_guessed_format()
        .unwrap()
        .format();
    assert_eq!(format, Some(pr::image::ImageFormat::Png));
}

#[test]
fn empty_file_list_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let flist = dir.path().join("empty.flist");
    std::fs::write(&flist, "\n").unwrap();

    let mut session = Session::builder(test_config(dir.path(), flist))
        .generator(Echo::new())
        .build()
        .unwrap();
    session.load().unwrap();

    let report = session.test().unwrap();
    assert_eq!(report.samples, 0);
    assert!(report.written.is_empty());
}

#[test]
fn test_requires_test_mode() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        mode: Mode::Draw,
        ..test_config(dir.path(), dir.path().join("missing.flist"))
    };

    let mut session = Session::builder(config)
        .generator(Echo::new())
        .build()
        .unwrap();
    session.load().unwrap();

    assert!(matches!(session.test(), Err(Error::NoTestDataset)));
}

#[test]
fn training_is_unsupported() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        mode: Mode::Train,
        ..test_config(dir.path(), dir.path().join("missing.flist"))
    };

    assert!(matches!(
        Session::builder(config).generator(Echo::new()).build(),
        Err(Error::UnsupportedMode(Mode::Train))
    ));
}

#[test]
fn generator_must_be_loaded() {
    let dir = tempfile::tempdir().unwrap();
    let sample = dir.path().join("0001.png");
    sample_image(32, 32).save(&sample).unwrap();

    let mut session = Session::builder(test_config(dir.path(), sample))
        .generator(Echo::new())
        .build()
        .unwrap();

    assert!(matches!(session.test(), Err(Error::GeneratorNotLoaded)));
}

#[test]
fn default_generator_needs_a_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        mode: Mode::Draw,
        ..test_config(dir.path(), dir.path().join("missing.flist"))
    };

    let mut session = Session::builder(config).build().unwrap();
    assert!(matches!(session.load(), Err(Error::CheckpointMissing(_))));
}

#[test]
fn draw_is_input_size_square() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        mode: Mode::Draw,
        ..test_config(dir.path(), dir.path().join("missing.flist"))
    };

    let mut session = Session::builder(config)
        .generator(Echo::new())
        .build()
        .unwrap();
    session.load().unwrap();

    let color_domain = RgbImage::from_pixel(50, 40, Rgb([200, 100, 50]));
    let edge = GrayImage::from_fn(50, 40, |x, _| Luma([if x == 25 { 255 } else { 0 }]));

    let generated = session.draw(color_domain, edge).unwrap();
    assert_eq!(generated.dimensions(), (32, 32));

    for pixel in generated.pixels() {
        for (actual, expected) in pixel.0.iter().zip(&[200u8, 100, 50]) {
            assert!((i16::from(*actual) - i16::from(*expected)).abs() <= 1);
        }
    }
}

#[test]
fn draw_rejects_zero_input_size() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        mode: Mode::Draw,
        input_size: 0,
        ..test_config(dir.path(), dir.path().join("missing.flist"))
    };

    let mut session = Session::builder(config)
        .generator(Echo::new())
        .build()
        .unwrap();
    session.load().unwrap();

    let color_domain = RgbImage::from_pixel(8, 8, Rgb([1, 2, 3]));
    let edge = GrayImage::new(8, 8);
    assert!(matches!(
        session.draw(color_domain, edge),
        Err(Error::InvalidRange(_))
    ));
}

fn draw_config(root: &Path, input_size: u32) -> Config {
    Config {
        mode: Mode::Draw,
        input_size,
        ..test_config(root, root.join("missing.flist"))
    }
}

#[test]
fn draw_output_is_aligned_to_input_size() {
    let dir = tempfile::tempdir().unwrap();

    let mut session = Session::builder(draw_config(dir.path(), 30))
        .generator(Echo::shrinking(2))
        .build()
        .unwrap();
    session.load().unwrap();

    let color_domain = RgbImage::from_pixel(40, 40, Rgb([10, 20, 30]));
    let edge = GrayImage::new(40, 40);

    let generated = session.draw(color_domain, edge).unwrap();
    assert_eq!(generated.dimensions(), (30, 30));
}

#[test]
fn draw_binarizes_edges_before_synthesis() {
    let dir = tempfile::tempdir().unwrap();

    let echo = Echo::new();
    let calls = echo.calls.clone();

    let mut session = Session::builder(draw_config(dir.path(), 16))
        .generator(echo)
        .build()
        .unwrap();
    session.load().unwrap();

    // Already at INPUT_SIZE so the resize keeps the values, the left half
    // sits on the threshold and the right half just above it
    let color_domain = RgbImage::from_pixel(16, 16, Rgb([10, 20, 30]));
    let edge = GrayImage::from_fn(16, 16, |x, _| Luma([if x < 8 { 69 } else { 70 }]));

    session.draw(color_domain, edge).unwrap();

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 1);

    let (had_image, edges) = &calls[0];
    assert!(!had_image);
    assert_eq!(edges.dims(), &[1, 1, 16, 16]);

    let rows = edges.squeeze(0).unwrap().squeeze(0).unwrap().to_vec2::<f32>().unwrap();
    for row in rows {
        for (x, v) in row.into_iter().enumerate() {
            let expected = if x < 8 { 0.0 } else { 1.0 };
            assert!((v - expected).abs() < 1e-6, "{} at column {}", v, x);
        }
    }
}
