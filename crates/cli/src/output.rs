//! Result envelope and rendering.

use clap::ValueEnum;
use memberchat::ChatError;
use serde::Serialize;

use crate::error::CliError;

/// Output format for command results.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
	/// Human-readable text
	#[default]
	Text,
	/// JSON envelope
	Json,
}

impl std::fmt::Display for OutputFormat {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			OutputFormat::Text => write!(f, "text"),
			OutputFormat::Json => write!(f, "json"),
		}
	}
}

/// Envelope printed for every command in JSON mode.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult<T: Serialize> {
	pub ok: bool,
	pub command: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub data: Option<T>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<CommandError>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandError {
	pub code: ErrorCode,
	pub message: String,
}

/// Error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
	InvalidInput,
	InvalidHours,
	ConfigError,
	EligibilityFailed,
	NotEligible,
	BootstrapUnavailable,
	ScriptFailed,
	InternalError,
}

impl ErrorCode {
	pub fn for_error(err: &anyhow::Error) -> Self {
		if let Some(err) = err.downcast_ref::<CliError>() {
			return match err {
				CliError::InvalidHours(_) => ErrorCode::InvalidHours,
				CliError::InvalidTime(_) => ErrorCode::InvalidInput,
				CliError::MissingEndpoint => ErrorCode::ConfigError,
			};
		}
		match err.downcast_ref::<ChatError>() {
			Some(ChatError::Config(_) | ChatError::ConfigRead { .. } | ChatError::Json(_)) => ErrorCode::ConfigError,
			Some(ChatError::EligibilityFetch(_)) => ErrorCode::EligibilityFailed,
			Some(ChatError::Ineligible { .. }) => ErrorCode::NotEligible,
			Some(ChatError::BootstrapUnavailable { .. }) => ErrorCode::BootstrapUnavailable,
			Some(ChatError::ScriptLoad(_) | ChatError::ScriptLoadTimeout { .. }) => ErrorCode::ScriptFailed,
			_ => ErrorCode::InternalError,
		}
	}
}

/// Plain-text rendering of a command payload.
pub trait TextOutput {
	fn to_text(&self) -> String;
}

pub fn print_success<T: Serialize + TextOutput>(command: &str, data: T, format: OutputFormat) -> anyhow::Result<()> {
	match format {
		OutputFormat::Text => println!("{}", data.to_text()),
		OutputFormat::Json => {
			let result = CommandResult {
				ok: true,
				command: command.to_string(),
				data: Some(data),
				error: None,
			};
			println!("{}", serde_json::to_string_pretty(&result)?);
		}
	}
	Ok(())
}

/// Prints a failure envelope in JSON mode; text mode leaves reporting to
/// the log line emitted by `main`.
pub fn print_failure(command: &str, err: &anyhow::Error, format: OutputFormat) {
	if format != OutputFormat::Json {
		return;
	}
	let result: CommandResult<()> = CommandResult {
		ok: false,
		command: command.to_string(),
		data: None,
		error: Some(CommandError {
			code: ErrorCode::for_error(err),
			message: format!("{err:#}"),
		}),
	};
	match serde_json::to_string_pretty(&result) {
		Ok(json) => println!("{json}"),
		Err(e) => eprintln!("error: {err:#} (failed to encode envelope: {e})"),
	}
}
