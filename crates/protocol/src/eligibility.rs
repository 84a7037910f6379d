//! Eligibility query request/response shapes.

use serde::{Deserialize, Serialize};

/// Identity an eligibility query is keyed by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EligibilityRequest {
	/// Insurance plan the member is currently viewing.
	pub plan_id: String,
	/// Member identifier, when the portal exposes one.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub member_id: Option<String>,
}

impl EligibilityRequest {
	pub fn new(plan_id: impl Into<String>) -> Self {
		Self {
			plan_id: plan_id.into(),
			member_id: None,
		}
	}

	pub fn with_member(mut self, member_id: impl Into<String>) -> Self {
		self.member_id = Some(member_id.into());
		self
	}
}

/// Response returned by the eligibility service.
///
/// ```json
/// {
///   "isEligible": true,
///   "businessHours": "Mon-Fri: 8:00 AM - 5:00 PM ET",
///   "cloudChat": true
/// }
/// ```
///
/// `businessHours` uses either the free-text or the compact grammar
/// understood by the hours evaluator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EligibilityResponse {
	/// Plan-level chat enablement.
	pub is_eligible: bool,
	/// Free-form reason supplied by the service when not eligible.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub reason: Option<String>,
	/// Raw business-hours descriptor.
	#[serde(default)]
	pub business_hours: String,
	/// Whether the plan is routed to the cloud chat product. Absent means
	/// "use the configured default".
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cloud_chat: Option<bool>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn response_tolerates_missing_optional_fields() {
		let json = r#"{"isEligible": false}"#;
		let response: EligibilityResponse = serde_json::from_str(json).unwrap();
		assert!(!response.is_eligible);
		assert!(response.reason.is_none());
		assert!(response.business_hours.is_empty());
		assert!(response.cloud_chat.is_none());
	}

	#[test]
	fn request_serializes_camel_case_and_skips_missing_member() {
		let value = serde_json::to_value(EligibilityRequest::new("PLAN-7")).unwrap();
		assert_eq!(value, serde_json::json!({ "planId": "PLAN-7" }));

		let value = serde_json::to_value(EligibilityRequest::new("PLAN-7").with_member("M-1")).unwrap();
		assert_eq!(value["memberId"], "M-1");
	}
}
