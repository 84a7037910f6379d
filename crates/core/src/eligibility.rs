//! Eligibility verdicts.
//!
//! Combines plan-level flags with the plan's business hours into a single
//! yes/no answer. Unparseable hours fail closed: chat is not offered when
//! the portal cannot tell whether agents are staffed.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::NaiveDateTime;
use memberchat_protocol::{ChatMode, EligibilityResponse};
use parking_lot::RwLock;
use serde::Serialize;

use crate::clock::Clock;
use crate::hours::BusinessHoursSpec;

/// Plan-level inputs to a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanFlags {
	pub chat_enabled_for_plan: bool,
	pub cloud_chat_flag: bool,
}

/// Why a verdict is negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum VerdictReason {
	PlanIneligible,
	OutsideHours,
	HoursUnavailable,
}

impl VerdictReason {
	pub fn as_str(self) -> &'static str {
		match self {
			VerdictReason::PlanIneligible => "plan-ineligible",
			VerdictReason::OutsideHours => "outside-hours",
			VerdictReason::HoursUnavailable => "hours-unavailable",
		}
	}
}

impl fmt::Display for VerdictReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Resolved answer to "can this member chat right now".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EligibilityVerdict {
	pub is_eligible: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub reason: Option<VerdictReason>,
	pub chat_mode: ChatMode,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub hours_display: Option<String>,
}

impl EligibilityVerdict {
	fn denied(reason: VerdictReason, chat_mode: ChatMode, hours_display: Option<String>) -> Self {
		Self {
			is_eligible: false,
			reason: Some(reason),
			chat_mode,
			hours_display,
		}
	}
}

fn chat_mode(flags: PlanFlags) -> ChatMode {
	if flags.cloud_chat_flag { ChatMode::Cloud } else { ChatMode::Legacy }
}

/// Resolves a verdict at a fixed instant.
pub fn resolve_at(flags: PlanFlags, hours: Option<&BusinessHoursSpec>, now: NaiveDateTime) -> EligibilityVerdict {
	let mode = chat_mode(flags);
	if !flags.chat_enabled_for_plan {
		return EligibilityVerdict::denied(VerdictReason::PlanIneligible, mode, None);
	}
	let Some(hours) = hours else {
		return EligibilityVerdict::denied(VerdictReason::HoursUnavailable, mode, None);
	};
	if !hours.is_open(now) {
		return EligibilityVerdict::denied(VerdictReason::OutsideHours, mode, Some(hours.describe()));
	}
	EligibilityVerdict {
		is_eligible: true,
		reason: None,
		chat_mode: mode,
		hours_display: Some(hours.describe()),
	}
}

/// Verdict service bound to a clock.
#[derive(Debug, Clone)]
pub struct EligibilityResolver {
	clock: Arc<dyn Clock>,
}

impl EligibilityResolver {
	pub fn new(clock: Arc<dyn Clock>) -> Self {
		Self { clock }
	}

	pub fn resolve(&self, flags: PlanFlags, hours: Option<&BusinessHoursSpec>) -> EligibilityVerdict {
		resolve_at(flags, hours, self.clock.now())
	}

	/// Resolves against a plan profile, parsing its raw hours.
	pub fn resolve_profile(&self, profile: &PlanProfile) -> EligibilityVerdict {
		let hours = BusinessHoursSpec::parse(&profile.business_hours);
		self.resolve(profile.flags, hours.as_ref())
	}
}

/// Eligibility inputs known for one plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanProfile {
	pub flags: PlanFlags,
	/// Raw descriptor as delivered by the eligibility service.
	pub business_hours: String,
}

impl PlanProfile {
	/// Builds a profile from a service response, falling back to
	/// `default_cloud_chat` when the response does not choose a mode.
	pub fn from_response(response: &EligibilityResponse, default_cloud_chat: bool) -> Self {
		Self {
			flags: PlanFlags {
				chat_enabled_for_plan: response.is_eligible,
				cloud_chat_flag: response.cloud_chat.unwrap_or(default_cloud_chat),
			},
			business_hours: response.business_hours.clone(),
		}
	}
}

/// Lookup of per-plan eligibility inputs.
pub trait PlanDirectory: Send + Sync {
	fn profile(&self, plan_id: &str) -> Option<PlanProfile>;
}

/// In-memory [`PlanDirectory`] fed by eligibility fetches.
#[derive(Debug, Default)]
pub struct PlanBook {
	plans: RwLock<HashMap<String, PlanProfile>>,
}

impl PlanBook {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert(&self, plan_id: impl Into<String>, profile: PlanProfile) {
		self.plans.write().insert(plan_id.into(), profile);
	}

	pub fn remove(&self, plan_id: &str) -> Option<PlanProfile> {
		self.plans.write().remove(plan_id)
	}

	pub fn clear(&self) {
		self.plans.write().clear();
	}
}

impl PlanDirectory for PlanBook {
	fn profile(&self, plan_id: &str) -> Option<PlanProfile> {
		self.plans.read().get(plan_id).cloned()
	}
}
