use pi_rec as pr;

fn main() -> Result<(), pr::Error> {
    let mut config = pr::Config::load("checkpoints")?;
    config.mode = pr::Mode::Test;
    config.test_flist = "imgs".into();
    config.debug = Some(1);

    let mut session = pr::Session::builder(config)
        .progress(|update: pr::ProgressUpdate<'_>| {
            println!("[{}/{}] {}", update.index, update.total, update.name);
        })
        .build()?;

    session.load()?;
    let report = session.test()?;

    println!(
        "wrote {} file(s) to '{}'",
        report.written.len(),
        session.results_path().display()
    );
    Ok(())
}
