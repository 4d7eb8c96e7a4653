//! Triangle demo application
//!
//! Opens a window, bootstraps the presentation pipeline and draws a single
//! triangle until the window is closed (or Escape is pressed).
//!
//! Usage: `triangle_app [config.toml|config.ron]`

use std::process::ExitCode;

use vk_present::prelude::*;

fn load_config() -> Result<BootstrapConfig, ConfigError> {
    match std::env::args().nth(1) {
        Some(path) => BootstrapConfig::load_from_file(&path),
        None => Ok(BootstrapConfig::default()),
    }
}

fn main() -> ExitCode {
    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            logging::init(log::LevelFilter::Info);
            log::error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    logging::init(logging::level_from_str(&config.log_level));
    log::info!("Starting {}", config.application_name);

    let mut window = match Window::new(&config.window) {
        Ok(window) => window,
        Err(e) => {
            log::error!("Window creation failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut renderer = match VulkanRenderer::new(&mut window, &config) {
        Ok(renderer) => renderer,
        Err(e) => {
            log::error!("Failed to initialize renderer: {e}");
            return ExitCode::FAILURE;
        }
    };

    let stats = renderer.run(&mut window);
    log::info!("Rendered {} frames ({} dropped)", stats.total(), stats.dropped);

    if let Err(e) = renderer.shutdown() {
        log::error!("Shutdown did not complete cleanly: {e}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
