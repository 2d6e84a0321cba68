use std::process::ExitCode;

use lifxd::Config;
use simplelog::{ColorChoice, Config as LogConfig, TermLogger, TerminalMode};

/// Exit codes consumed by the outer program (spec §6): 0 clean, 1 setup
/// failure (bind/listen), 2 invalid configuration.
const EXIT_SETUP_FAILURE: u8 = 1;
const EXIT_INVALID_CONFIG: u8 = 2;

fn load_config() -> anyhow::Result<Config> {
	match std::env::args().nth(1) {
		Some(path) => {
			let text = std::fs::read_to_string(&path)?;
			Ok(Config::from_toml(&text)?)
		}
		None => Ok(Config::default()),
	}
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
	let config = match load_config() {
		Ok(config) => config,
		Err(e) => {
			eprintln!("invalid configuration: {}", e);
			return ExitCode::from(EXIT_INVALID_CONFIG);
		}
	};

	TermLogger::init(config.verbosity.to_level_filter(), LogConfig::default(), TerminalMode::Mixed, ColorChoice::Auto)
		.expect("logger can only be initialized once");

	let (core, _handle) = match lifxd::Core::init(config).await {
		Ok(pair) => pair,
		Err(e) => {
			log::error!("setup failure: {}", e);
			return ExitCode::from(EXIT_SETUP_FAILURE);
		}
	};

	core.run().await
}
