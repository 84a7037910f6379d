//! `mchat hours`: parse and evaluate a business-hours descriptor.

use chrono::NaiveDateTime;
use memberchat::BusinessHoursSpec;
use serde::Serialize;
use tracing::debug;

use super::parse_at;
use crate::error::CliError;
use crate::output::TextOutput;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HoursReport {
	pub raw: String,
	pub spec: BusinessHoursSpec,
	pub description: String,
	pub at: NaiveDateTime,
	pub open: bool,
}

impl TextOutput for HoursReport {
	fn to_text(&self) -> String {
		let state = if self.open { "open" } else { "closed" };
		format!("{}\n{} at {}", self.description, state, self.at.format("%A %Y-%m-%d %H:%M"))
	}
}

pub fn run(raw: &str, at: Option<&str>) -> anyhow::Result<HoursReport> {
	let at = parse_at(at)?;
	let spec = BusinessHoursSpec::parse(raw).ok_or_else(|| CliError::InvalidHours(raw.to_string()))?;
	debug!(target = "mchat", %spec, %at, "evaluating business hours");
	Ok(HoursReport {
		raw: raw.to_string(),
		description: spec.describe(),
		open: spec.is_open(at),
		spec,
		at,
	})
}
