use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use skyrunner::renderer::{GpuState, WinitWindow};
use skyrunner::{EngineError, GameConfig, GameLoop, CONFIG_FILE_NAME};

/// Exit status for startup failures
const EXIT_FATAL: u8 = 1;
/// Exit status for any other error that reached `main`
const EXIT_ERROR: u8 = 2;

fn run() -> Result<()> {
    let config = GameConfig::load_or_default(Path::new(CONFIG_FILE_NAME));

    let window = WinitWindow::new(&config.window).context("Failed to create window")?;
    let graphics = GpuState::new(window.handle(), config.assets.textures_dir(), config.window.vsync)
        .context("Failed to initialize GPU")?;

    let mut game_loop = GameLoop::new(config, window, graphics).context("Failed to initialize game")?;
    let stats = game_loop.run();
    log::info!(
        "Rendered {} frames, {} logic passes, {} slow frames",
        stats.frames_rendered,
        stats.updates_run,
        stats.slow_frames
    );
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("Starting Skyrunner...");

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let status = exit_status(&e);
            if status == EXIT_FATAL {
                log::error!("Skyrunner could not start: {:#}", e);
            } else {
                log::error!("Skyrunner failed: {:#}", e);
            }
            ExitCode::from(status)
        }
    }
}

fn exit_status(error: &anyhow::Error) -> u8 {
    let fatal = error
        .chain()
        .find_map(|cause| cause.downcast_ref::<EngineError>())
        .map_or(false, EngineError::is_fatal);
    if fatal {
        EXIT_FATAL
    } else {
        EXIT_ERROR
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skyrunner::error::initialization_error;

    #[test]
    fn test_initialization_failure_exits_with_fatal_status() {
        let error = anyhow::Error::new(initialization_error("surface", "no adapter")).context("Failed to initialize GPU");
        assert_eq!(exit_status(&error), EXIT_FATAL);
    }

    #[test]
    fn test_other_errors_exit_with_error_status() {
        let error = anyhow::Error::new(EngineError::InvalidAnimation {
            name: "player_jump".to_string(),
        })
        .context("Failed to initialize game");
        assert_eq!(exit_status(&error), EXIT_ERROR);
        assert_eq!(exit_status(&anyhow::anyhow!("plain failure")), EXIT_ERROR);
    }
}
