use engine::Engine;

fn main() {
    pretty_env_logger::init();

    let engine = match Engine::new() {
        Ok(engine) => engine,
        Err(err) => {
            log::error!("initialization failed: {err:#}");
            std::process::exit(1);
        }
    };

    if let Err(err) = engine.run() {
        log::error!("event loop failed: {err:#}");
        std::process::exit(1);
    }
}
