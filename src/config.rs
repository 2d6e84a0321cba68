use serde::Deserialize;

/// Configuration surface enumerated in the control-plane spec: everything an
/// outer program (CLI/daemonizer/JSON-RPC front end) may hand to
/// [crate::core::Core::init].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
	pub verbosity: Verbosity,
	pub active_discovery_interval_ms: u64,
	pub passive_discovery_interval_ms: u64,
	pub device_timeout_ms: u64,
	pub watchdog_interval_ms: u64,
	pub refresh_period_ms: u64,
	pub force_refresh_ms: u64,
	pub query_timeout_ms: u64,
	pub tag_label_timeout_ms: u64,
	pub max_packets_per_sec: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
	Debug,
	Info,
	Warning,
	Error,
}

impl Default for Verbosity {
	fn default() -> Verbosity {
		Verbosity::Info
	}
}

impl Verbosity {
	pub fn to_level_filter(self) -> log::LevelFilter {
		match self {
			Verbosity::Debug => log::LevelFilter::Debug,
			Verbosity::Info => log::LevelFilter::Info,
			Verbosity::Warning => log::LevelFilter::Warn,
			Verbosity::Error => log::LevelFilter::Error,
		}
	}
}

impl Default for Config {
	fn default() -> Config {
		Config {
			verbosity: Verbosity::Info,
			active_discovery_interval_ms: 2_000,
			passive_discovery_interval_ms: 60_000,
			device_timeout_ms: 30_000,
			watchdog_interval_ms: 5_000,
			refresh_period_ms: 1_000,
			force_refresh_ms: 5_000,
			query_timeout_ms: 2_000,
			tag_label_timeout_ms: 5_000,
			max_packets_per_sec: 50,
		}
	}
}

/// Error produced while parsing or validating a [Config]. Maps to exit code
/// 2 at the outer-program boundary.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("invalid configuration: {0}")]
	Toml(#[from] toml::de::Error),
}

impl Config {
	/// Parses a TOML document. The `verbosity` field must already be one of
	/// the four documented levels; `serde`'s enum deserialization rejects
	/// anything else at parse time rather than silently falling back to a
	/// default, closing the open question in spec §9 about implicit
	/// verbosity range checks in the original implementation.
	pub fn from_toml(text: &str) -> Result<Config, ConfigError> {
		let config: Config = toml::from_str(text)?;
		config.validate()?;
		Ok(config)
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_match_spec_constants() {
		let config = Config::default();
		assert_eq!(config.active_discovery_interval_ms, 2_000);
		assert_eq!(config.passive_discovery_interval_ms, 60_000);
		assert_eq!(config.device_timeout_ms, 30_000);
	}

	#[test]
	fn rejects_unknown_verbosity_at_parse_time() {
		let err = Config::from_toml("verbosity = \"chatty\"\n").unwrap_err();
		assert!(matches!(err, ConfigError::Toml(_)));
	}

	#[test]
	fn accepts_partial_overrides() {
		let config = Config::from_toml("verbosity = \"debug\"\nrefresh_period_ms = 500\n").unwrap();
		assert_eq!(config.verbosity, Verbosity::Debug);
		assert_eq!(config.refresh_period_ms, 500);
		assert_eq!(config.watchdog_interval_ms, 5_000);
	}
}
