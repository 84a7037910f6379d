//! `mchat resolve`: offline eligibility verdict.

use chrono::NaiveDateTime;
use memberchat::eligibility::resolve_at;
use memberchat::{BusinessHoursSpec, EligibilityVerdict, PlanFlags};
use serde::Serialize;

use super::parse_at;
use crate::output::TextOutput;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveReport {
	pub flags: PlanFlags,
	pub hours: String,
	pub at: NaiveDateTime,
	pub verdict: EligibilityVerdict,
}

impl TextOutput for ResolveReport {
	fn to_text(&self) -> String {
		let verdict = &self.verdict;
		let mut text = if verdict.is_eligible {
			format!("eligible ({} chat)", verdict.chat_mode)
		} else {
			format!("not eligible: {}", verdict.reason.map_or("unknown", |reason| reason.as_str()))
		};
		if let Some(hours) = &verdict.hours_display {
			text.push_str(&format!("\nhours: {hours}"));
		}
		text
	}
}

/// Unparseable hours are not an error here: they resolve to a
/// `hours-unavailable` verdict.
pub fn run(hours: &str, chat_enabled: bool, cloud: bool, at: Option<&str>) -> anyhow::Result<ResolveReport> {
	let at = parse_at(at)?;
	let flags = PlanFlags {
		chat_enabled_for_plan: chat_enabled,
		cloud_chat_flag: cloud,
	};
	let spec = BusinessHoursSpec::parse(hours);
	Ok(ResolveReport {
		flags,
		hours: hours.to_string(),
		at,
		verdict: resolve_at(flags, spec.as_ref(), at),
	})
}
