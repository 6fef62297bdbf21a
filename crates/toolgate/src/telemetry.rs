use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_FILTER: &str = "info";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
	#[default]
	Plain,
	Json,
}

fn env_filter() -> EnvFilter {
	EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber. Logs go to stderr so stdout stays free for
/// responses. Fails if a global subscriber is already set.
pub fn init(format: LogFormat) -> anyhow::Result<()> {
	let registry = tracing_subscriber::registry().with(env_filter());
	match format {
		LogFormat::Plain => registry
			.with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
			.try_init()?,
		LogFormat::Json => registry
			.with(
				tracing_subscriber::fmt::layer()
					.json()
					.with_current_span(true)
					.with_writer(std::io::stderr),
			)
			.try_init()?,
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_log_format_deserialization() {
		let format: LogFormat = serde_yaml::from_str("json").unwrap();
		assert_eq!(format, LogFormat::Json);
		assert_eq!(LogFormat::default(), LogFormat::Plain);
	}

	#[test]
	fn test_second_init_fails() {
		// Whichever call wins, at most one can install the global subscriber
		let first = init(LogFormat::Plain);
		let second = init(LogFormat::Json);
		assert!(first.is_err() || second.is_err());
	}
}
