use pi_rec as pr;

fn main() -> Result<(), pr::Error> {
    // `config.toml` and `G_Model_gen.safetensors` are read from here
    let mut config = pr::Config::load("checkpoints")?;
    config.mode = pr::Mode::Draw;

    let mut session = pr::Session::builder(config).build()?;
    session.load()?;

    let generated = session.draw(&"imgs/color_domain.png", &"imgs/edge.png")?;

    generated
        .save("out/01.png")
        .map_err(|source| pr::Error::OutputWrite {
            path: "out/01.png".into(),
            source,
        })
}
