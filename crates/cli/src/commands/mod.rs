//! Subcommand implementations.

use chrono::NaiveDateTime;
use memberchat::{Clock, SystemClock};

use crate::cli::Commands;
use crate::error::CliError;
use crate::output::{OutputFormat, print_failure, print_success};

pub mod check;
pub mod hours;
pub mod resolve;

/// Runs `command`, printing its result in `format`.
pub async fn dispatch(command: Commands, format: OutputFormat) -> anyhow::Result<()> {
	let (name, outcome) = match command {
		Commands::Hours { raw, at } => ("hours", hours::run(&raw, at.as_deref()).and_then(|report| print_success("hours", report, format))),
		Commands::Resolve {
			hours,
			plan_disabled,
			cloud,
			at,
		} => (
			"resolve",
			resolve::run(&hours, !plan_disabled, cloud, at.as_deref()).and_then(|report| print_success("resolve", report, format)),
		),
		Commands::Check { plan, member, config } => (
			"check",
			match check::run(&plan, member, config.as_deref()).await {
				Ok(report) => print_success("check", report, format),
				Err(err) => Err(err),
			},
		),
	};

	if let Err(err) = &outcome {
		print_failure(name, err, format);
	}
	outcome
}

/// Parses `--at`, defaulting to the system wall clock.
pub fn parse_at(at: Option<&str>) -> Result<NaiveDateTime, CliError> {
	match at {
		Some(value) => NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M").map_err(|_| CliError::InvalidTime(value.to_string())),
		None => Ok(SystemClock.now()),
	}
}

#[cfg(test)]
mod tests {
	use chrono::{Datelike, Timelike, Weekday};

	use super::*;

	#[test]
	fn parses_minute_precision_times() {
		let at = parse_at(Some("2024-03-04T17:05")).unwrap();
		assert_eq!(at.weekday(), Weekday::Mon);
		assert_eq!((at.hour(), at.minute()), (17, 5));
	}

	#[test]
	fn rejects_other_shapes() {
		for bad in ["2024-03-04", "17:05", "2024-03-04 17:05", "monday"] {
			assert!(matches!(parse_at(Some(bad)), Err(CliError::InvalidTime(_))), "{bad}");
		}
	}
}
