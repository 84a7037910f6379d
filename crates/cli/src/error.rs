use thiserror::Error;

/// Input problems caught by the CLI before the engine runs.
#[derive(Debug, Error)]
pub enum CliError {
	#[error("unrecognized business hours descriptor: {0:?}")]
	InvalidHours(String),

	#[error("invalid time {0:?}: expected YYYY-MM-DDTHH:MM")]
	InvalidTime(String),

	#[error("eligibilityEndpoint is not configured")]
	MissingEndpoint,
}
