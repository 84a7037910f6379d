//! `mchat check`: live eligibility query and script probe.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use memberchat::{BootstrapSequencer, BootstrapSnapshot, ChatConfig, EligibilityResolver, EligibilityVerdict, PlanBook, SystemClock};
use memberchat_protocol::EligibilityRequest;
use memberchat_runtime::{Bootstrapper, HttpEligibilitySource, HttpScriptLoader};
use serde::Serialize;
use tracing::info;

use crate::error::CliError;
use crate::output::TextOutput;

const ELIGIBILITY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckReport {
	pub plan_id: String,
	pub verdict: EligibilityVerdict,
	/// `None` when the script loaded or was not attempted.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub script_error: Option<String>,
	pub script_attempted: bool,
	pub snapshot: BootstrapSnapshot,
}

impl TextOutput for CheckReport {
	fn to_text(&self) -> String {
		let mut lines = Vec::new();
		if self.verdict.is_eligible {
			lines.push(format!("plan {}: eligible ({} chat)", self.plan_id, self.verdict.chat_mode));
		} else {
			let reason = self.verdict.reason.map_or("unknown", |reason| reason.as_str());
			lines.push(format!("plan {}: not eligible ({reason})", self.plan_id));
		}
		if let Some(hours) = &self.verdict.hours_display {
			lines.push(format!("hours: {hours}"));
		}
		match (&self.script_error, self.script_attempted) {
			(Some(err), _) => lines.push(format!("script: failed after {} attempt(s): {err}", self.snapshot.script.attempts)),
			(None, true) => lines.push("script: loaded".to_string()),
			(None, false) => lines.push("script: not attempted".to_string()),
		}
		lines.join("\n")
	}
}

pub async fn run(plan_id: &str, member_id: Option<String>, config_path: Option<&Path>) -> anyhow::Result<CheckReport> {
	let config = ChatConfig::load_or_default(config_path)?;
	let endpoint = config.eligibility_endpoint.clone().ok_or(CliError::MissingEndpoint)?;

	let clock = Arc::new(SystemClock);
	let sequencer = Arc::new(BootstrapSequencer::new(clock.clone(), config.policy()));
	let source = HttpEligibilitySource::new(endpoint, ELIGIBILITY_TIMEOUT)?;
	let loader = HttpScriptLoader::new(config.policy().script_timeout)?;
	let bootstrapper = Bootstrapper::new(
		Arc::clone(&sequencer),
		EligibilityResolver::new(clock),
		Arc::new(PlanBook::new()),
		Arc::new(source),
		Arc::new(loader),
		&config,
	);

	let mut request = EligibilityRequest::new(plan_id);
	if let Some(member_id) = member_id {
		request = request.with_member(member_id);
	}
	let verdict = bootstrapper.refresh_eligibility(&request).await?;

	let script_attempted = verdict.is_eligible && config.widget_script_url.is_some();
	let script_error = if script_attempted {
		bootstrapper.load_script().await.err().map(|err| err.to_string())
	} else {
		None
	};

	info!(target = "mchat", plan_id, eligible = verdict.is_eligible, script_attempted, "check complete");
	Ok(CheckReport {
		plan_id: plan_id.to_string(),
		verdict,
		script_error,
		script_attempted,
		snapshot: sequencer.snapshot(),
	})
}

#[cfg(test)]
mod tests {
	use std::io::Write;

	use memberchat::ChatError;

	use super::*;

	#[tokio::test]
	async fn endpoint_is_required() {
		let err = run("PLAN-1", None, None).await.unwrap_err();
		assert!(matches!(err.downcast_ref::<CliError>(), Some(CliError::MissingEndpoint)));
	}

	#[tokio::test]
	async fn invalid_config_is_rejected_before_any_request() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		write!(file, r#"{{"eligibilityEndpoint":"http://127.0.0.1:9/eligibility","maxScriptAttempts":0}}"#).unwrap();
		let err = run("PLAN-1", None, Some(file.path())).await.unwrap_err();
		assert!(matches!(err.downcast_ref::<ChatError>(), Some(ChatError::Config(_))));
	}

	#[tokio::test]
	async fn unreachable_endpoint_is_an_eligibility_failure() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		write!(file, r#"{{"eligibilityEndpoint":"http://127.0.0.1:9/eligibility"}}"#).unwrap();
		let err = run("PLAN-1", Some("M-42".into()), Some(file.path())).await.unwrap_err();
		assert!(matches!(err.downcast_ref::<ChatError>(), Some(ChatError::EligibilityFetch(_))));
	}
}
