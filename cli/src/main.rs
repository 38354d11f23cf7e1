mod progress;

use progress::ProgressBarReporter;
use structopt::StructOpt;

use pi_rec::{image::ImageFormat, Config, Error, Mode, Session};
use std::{io::Write, path::PathBuf};

#[derive(StructOpt)]
#[structopt(rename_all = "kebab-case")]
struct Test {
    /// A file list, a directory of images or a single image to evaluate.
    /// Overrides `TEST_FLIST` from the configuration
    #[structopt(long, parse(from_os_str))]
    input: Option<PathBuf>,
    /// The directory results are written to. Defaults to
    /// `<path>/results/km_<KM>_sigma_<SIGMA>`
    #[structopt(long, parse(from_os_str))]
    output: Option<PathBuf>,
    /// Disables the progress bar
    #[structopt(long)]
    no_progress: bool,
}

#[derive(StructOpt)]
#[structopt(rename_all = "kebab-case")]
struct Draw {
    /// The colour domain image, a coarse map of flat colour regions
    #[structopt(long, parse(from_os_str))]
    color_domain: PathBuf,
    /// The edge map, bright pixels are treated as edges
    #[structopt(long, parse(from_os_str))]
    edge: PathBuf,
    /// The path to save the generated image to, the file extension of the path
    /// determines the image format used. You may use `-` for stdout, which
    /// is always written as PNG.
    #[structopt(long = "out", short, parse(from_os_str))]
    output_path: PathBuf,
}

#[derive(StructOpt)]
enum Subcommand {
    /// Reconstructs every image of the test file list
    #[structopt(name = "test")]
    Test(Test),
    /// Synthesizes a single image from a colour domain and an edge map
    #[structopt(name = "draw")]
    Draw(Draw),
}

#[derive(StructOpt)]
#[structopt(
    name = "pi-rec",
    about = "Reconstructs images from edge maps and colour domains",
    rename_all = "kebab-case"
)]
struct Opt {
    /// The checkpoint directory, holding `config.toml` and the generator
    /// weights
    #[structopt(long, default_value = "./checkpoints", parse(from_os_str))]
    path: PathBuf,
    /// The compute device, one of `cpu`, `cuda` or `cuda:N`. Overrides
    /// `DEVICE` from the configuration
    #[structopt(long)]
    device: Option<String>,
    /// Also saves the network inputs of every test sample, and logs the input
    /// sizes when drawing
    #[structopt(long)]
    debug: bool,
    #[structopt(subcommand)]
    cmd: Subcommand,
}

fn main() {
    if let Err(e) = real_main() {
        if atty::is(atty::Stream::Stderr) {
            eprintln!("\x1b[31merror\x1b[0m: {}", e);
        } else {
            eprintln!("error: {}", e);
        }

        std::process::exit(1);
    }
}

fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // Logs go to stderr so `draw -o -` can stream the image over stdout
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn real_main() -> Result<(), Error> {
    let args = Opt::from_args();
    init_logging();

    let mut config = Config::load(&args.path)?;

    if let Some(device) = args.device {
        config.device = device;
    }

    if args.debug {
        config.debug = Some(1);
    }

    match args.cmd {
        Subcommand::Test(test) => {
            config.mode = Mode::Test;

            if let Some(input) = test.input {
                config.test_flist = input;
            }

            if let Some(output) = test.output {
                config.results = Some(output);
            }

            let mut sb = Session::builder(config);
            if !test.no_progress {
                sb = sb.progress(ProgressBarReporter::new());
            }

            let mut session = sb.build()?;
            session.load()?;

            let report = session.test()?;
            tracing::info!(
                "wrote {} file(s) for {} sample(s) to '{}'",
                report.written.len(),
                report.samples,
                session.results_path().display()
            );
        }
        Subcommand::Draw(draw) => {
            config.mode = Mode::Draw;

            let mut session = Session::builder(config).build()?;
            session.load()?;

            let generated = session.draw(&draw.color_domain, &draw.edge)?;

            if draw.output_path.to_str() == Some("-") {
                let mut buffer = std::io::Cursor::new(Vec::new());
                generated.write_to(&mut buffer, ImageFormat::Png)?;

                let out = std::io::stdout();
                let mut out = out.lock();
                out.write_all(buffer.get_ref())?;
                out.flush()?;
            } else {
                generated
                    .save(&draw.output_path)
                    .map_err(|source| Error::OutputWrite {
                        path: draw.output_path.clone(),
                        source,
                    })?;
            }
        }
    }

    Ok(())
}
