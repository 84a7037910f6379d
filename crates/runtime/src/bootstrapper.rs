//! Async driver for the bootstrap sequencer.
//!
//! The sequencer decides; this module performs the I/O. Eligibility
//! fetches are single-flight: a caller that finds one in flight waits on
//! the sequencer's revision channel and re-evaluates once it settles.
//! Script attempts run on their own task so a timeout only stops the
//! wait, never the load; a late result is applied or dropped by ticket.

use std::sync::Arc;

use memberchat::bootstrap::FetchTicket;
use memberchat::{
	BootstrapSequencer, ChatConfig, ChatError, ChatMode, EligibilityResolver, EligibilityVerdict, PlanBook, PlanDirectory, PlanProfile, Readiness, Result,
};
use memberchat_protocol::EligibilityRequest;
use tracing::{debug, info, warn};

use crate::script::ScriptLoader;
use crate::source::EligibilitySource;

/// Reports a fetch as failed if its future is dropped before finishing.
struct FetchGuard<'a> {
	sequencer: &'a BootstrapSequencer,
	ticket: FetchTicket,
	armed: bool,
}

impl Drop for FetchGuard<'_> {
	fn drop(&mut self) {
		if self.armed {
			debug!(target = "mchat.runtime", "eligibility fetch cancelled");
			self.sequencer.record_eligibility_failure(self.ticket);
		}
	}
}

/// Drives eligibility fetches and script loading.
pub struct Bootstrapper {
	sequencer: Arc<BootstrapSequencer>,
	resolver: EligibilityResolver,
	plans: Arc<PlanBook>,
	source: Arc<dyn EligibilitySource>,
	loader: Arc<dyn ScriptLoader>,
	script_url: String,
	default_cloud_chat: bool,
}

impl Bootstrapper {
	/// Script loading fails with [`ChatError::Config`] when `config` names no
	/// widget script URL.
	pub fn new(
		sequencer: Arc<BootstrapSequencer>,
		resolver: EligibilityResolver,
		plans: Arc<PlanBook>,
		source: Arc<dyn EligibilitySource>,
		loader: Arc<dyn ScriptLoader>,
		config: &ChatConfig,
	) -> Self {
		Self {
			sequencer,
			resolver,
			plans,
			source,
			loader,
			script_url: config.widget_script_url.clone().unwrap_or_default(),
			default_cloud_chat: config.cloud_chat,
		}
	}

	pub fn sequencer(&self) -> &Arc<BootstrapSequencer> {
		&self.sequencer
	}

	pub fn plans(&self) -> &Arc<PlanBook> {
		&self.plans
	}

	/// Returns a fresh verdict for `request.plan_id`, fetching only when
	/// the cached one is missing, expired or for another plan.
	pub async fn refresh_eligibility(&self, request: &EligibilityRequest) -> Result<EligibilityVerdict> {
		let plan_id = request.plan_id.as_str();
		loop {
			let mut revisions = self.sequencer.subscribe();
			if let Some(ticket) = self.sequencer.begin_eligibility_fetch(plan_id) {
				return self.fetch(ticket, request).await;
			}

			let snapshot = self.sequencer.snapshot().eligibility;
			if !snapshot.is_fetching {
				if let Some(profile) = self.plans.profile(plan_id) {
					return Ok(self.resolver.resolve_profile(&profile));
				}
				return Ok(EligibilityVerdict {
					is_eligible: snapshot.is_eligible,
					reason: None,
					chat_mode: snapshot.chat_mode,
					hours_display: None,
				});
			}

			debug!(target = "mchat.runtime", plan_id, "waiting for in-flight eligibility fetch");
			if revisions.changed().await.is_err() {
				return Err(ChatError::BootstrapPending);
			}
		}
	}

	async fn fetch(&self, ticket: FetchTicket, request: &EligibilityRequest) -> Result<EligibilityVerdict> {
		let mut guard = FetchGuard {
			sequencer: &self.sequencer,
			ticket,
			armed: true,
		};
		let result = self.source.fetch(request).await;
		guard.armed = false;

		let response = match result {
			Ok(response) => response,
			Err(err) => {
				warn!(target = "mchat.runtime", plan_id = %request.plan_id, error = %err, "eligibility fetch failed");
				self.sequencer.record_eligibility_failure(ticket);
				return Err(err);
			}
		};

		if let Some(reason) = response.reason.as_deref() {
			debug!(target = "mchat.runtime", plan_id = %request.plan_id, reason, "eligibility service reason");
		}
		let profile = PlanProfile::from_response(&response, self.default_cloud_chat);
		let verdict = self.resolver.resolve_profile(&profile);
		self.plans.insert(request.plan_id.clone(), profile);
		if !self.sequencer.record_eligibility_result(ticket, &verdict).is_applied() {
			debug!(target = "mchat.runtime", plan_id = %request.plan_id, "eligibility result superseded");
		}
		Ok(verdict)
	}

	/// Loads the widget script, retrying up to the policy's attempt cap.
	///
	/// Returns once the script is loaded. Fails with
	/// [`ChatError::BootstrapUnavailable`] after the final failed attempt and
	/// with [`ChatError::Ineligible`] or [`ChatError::BootstrapPending`] when
	/// eligibility does not allow loading.
	pub async fn load_script(&self) -> Result<()> {
		if self.script_url.is_empty() {
			return Err(ChatError::Config("widgetScriptUrl is not configured".to_string()));
		}
		let timeout = self.sequencer.policy().script_timeout;

		loop {
			let mut revisions = self.sequencer.subscribe();
			let snapshot = self.sequencer.snapshot();
			if snapshot.script.is_complete {
				return Ok(());
			}
			if self.sequencer.is_script_failed() {
				return Err(ChatError::BootstrapUnavailable {
					attempts: snapshot.script.attempts,
				});
			}

			let Some(ticket) = self.sequencer.begin_script_load() else {
				if snapshot.script.is_loading {
					if revisions.changed().await.is_err() {
						return Err(ChatError::BootstrapPending);
					}
					continue;
				}
				return Err(match snapshot.readiness {
					Readiness::Ineligible => ChatError::Ineligible {
						reason: "eligibility check declined chat".to_string(),
					},
					_ => ChatError::BootstrapPending,
				});
			};

			info!(target = "mchat.runtime", attempt = ticket.attempt(), url = %self.script_url, "loading widget script");
			let signal = self.loader.inject(&self.script_url);
			let sequencer = Arc::clone(&self.sequencer);
			let attempt = tokio::spawn(async move {
				let outcome = signal.wait().await;
				let applied = sequencer.mark_script_load_complete(ticket, outcome.is_ok());
				(outcome, applied)
			});

			match tokio::time::timeout(timeout, attempt).await {
				Ok(Ok((Ok(()), _))) => {}
				Ok(Ok((Err(err), _))) => {
					warn!(target = "mchat.runtime", attempt = ticket.attempt(), error = %err, "widget script attempt failed");
				}
				Ok(Err(join_err)) => {
					warn!(target = "mchat.runtime", attempt = ticket.attempt(), error = %join_err, "widget script task aborted");
					self.sequencer.mark_script_load_complete(ticket, false);
				}
				Err(_) => {
					let err = ChatError::ScriptLoadTimeout {
						timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
					};
					warn!(target = "mchat.runtime", attempt = ticket.attempt(), error = %err, "widget script attempt abandoned");
					self.sequencer.abandon_script_load(ticket);
				}
			}
		}
	}

	/// Refreshes eligibility if due, loads the script if needed, and
	/// returns the chat mode once a session may be opened.
	pub async fn ensure_ready(&self, request: &EligibilityRequest) -> Result<ChatMode> {
		let verdict = self.refresh_eligibility(request).await?;
		if !verdict.is_eligible {
			let reason = verdict.reason.map_or("ineligible", |reason| reason.as_str());
			return Err(ChatError::Ineligible { reason: reason.to_string() });
		}
		self.load_script().await?;
		self.sequencer.check_ready_for(&request.plan_id)
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use chrono::NaiveDate;
	use memberchat::{BootstrapPolicy, ManualClock, VerdictReason};
	use memberchat_protocol::EligibilityResponse;

	use super::*;
	use crate::script::{ScriptBehavior, ScriptedLoader};
	use crate::source::StaticEligibilitySource;

	fn response(eligible: bool, hours: &str) -> EligibilityResponse {
		EligibilityResponse {
			is_eligible: eligible,
			reason: None,
			business_hours: hours.to_string(),
			cloud_chat: Some(true),
		}
	}

	fn config(timeout_ms: u64) -> ChatConfig {
		ChatConfig {
			script_timeout_ms: timeout_ms,
			widget_script_url: Some("https://cdn.example/widget.js".to_string()),
			..ChatConfig::default()
		}
	}

	fn bootstrapper(source: StaticEligibilitySource, loader: ScriptedLoader, config: &ChatConfig) -> Bootstrapper {
		let wall = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap().and_hms_opt(10, 0, 0).unwrap();
		let clock = Arc::new(ManualClock::new(wall));
		let policy: BootstrapPolicy = config.policy();
		Bootstrapper::new(
			Arc::new(BootstrapSequencer::new(clock.clone(), policy)),
			EligibilityResolver::new(clock),
			Arc::new(PlanBook::new()),
			Arc::new(source),
			Arc::new(loader),
			config,
		)
	}

	#[tokio::test]
	async fn concurrent_refreshes_share_one_fetch() {
		let source = StaticEligibilitySource::new().with_plan("GOLD", response(true, "24/7")).with_delay(Duration::from_millis(20));
		let b = bootstrapper(source.clone(), ScriptedLoader::default(), &config(1_000));
		let request = EligibilityRequest::new("GOLD");

		let (first, second, third) = tokio::join!(b.refresh_eligibility(&request), b.refresh_eligibility(&request), b.refresh_eligibility(&request));
		assert!(first.unwrap().is_eligible);
		assert!(second.unwrap().is_eligible);
		assert!(third.unwrap().is_eligible);
		assert_eq!(source.calls(), 1);

		// Fresh within TTL.
		b.refresh_eligibility(&request).await.unwrap();
		assert_eq!(source.calls(), 1);
		assert!(b.plans().profile("GOLD").is_some());
	}

	#[tokio::test]
	async fn other_plan_triggers_new_fetch() {
		let source = StaticEligibilitySource::new().with_plan("GOLD", response(true, "24/7")).with_plan("SILVER", response(false, "24/7"));
		let b = bootstrapper(source.clone(), ScriptedLoader::default(), &config(1_000));

		b.refresh_eligibility(&EligibilityRequest::new("GOLD")).await.unwrap();
		let verdict = b.refresh_eligibility(&EligibilityRequest::new("SILVER")).await.unwrap();
		assert_eq!(verdict.reason, Some(VerdictReason::PlanIneligible));
		assert_eq!(source.calls(), 2);
	}

	#[tokio::test]
	async fn failed_fetch_leaves_refresh_due() {
		let source = StaticEligibilitySource::new().with_plan("GOLD", response(true, "24/7"));
		source.set_failure(Some("503"));
		let b = bootstrapper(source.clone(), ScriptedLoader::default(), &config(1_000));

		assert!(b.refresh_eligibility(&EligibilityRequest::new("GOLD")).await.is_err());
		assert!(b.sequencer().should_refresh_eligibility());

		source.set_failure(None);
		assert!(b.refresh_eligibility(&EligibilityRequest::new("GOLD")).await.unwrap().is_eligible);
	}

	#[tokio::test]
	async fn cancelled_fetch_releases_in_flight_flag() {
		let source = StaticEligibilitySource::new().with_plan("GOLD", response(true, "24/7")).with_delay(Duration::from_secs(5));
		let b = bootstrapper(source, ScriptedLoader::default(), &config(1_000));

		let request = EligibilityRequest::new("GOLD");
		let cancelled = tokio::time::timeout(Duration::from_millis(10), b.refresh_eligibility(&request)).await;
		assert!(cancelled.is_err());
		assert!(!b.sequencer().snapshot().eligibility.is_fetching);
	}

	#[tokio::test]
	async fn script_waits_for_eligibility() {
		let b = bootstrapper(StaticEligibilitySource::new(), ScriptedLoader::default(), &config(1_000));
		assert!(matches!(b.load_script().await, Err(ChatError::BootstrapPending)));

		b.refresh_eligibility(&EligibilityRequest::new("TIN")).await.unwrap();
		assert!(matches!(b.load_script().await, Err(ChatError::Ineligible { .. })));
	}

	#[tokio::test]
	async fn script_retries_then_loads() {
		let source = StaticEligibilitySource::new().with_plan("GOLD", response(true, "24/7"));
		let loader = ScriptedLoader::new([ScriptBehavior::Fail("blocked".into())]);
		let b = bootstrapper(source, loader.clone(), &config(1_000));

		let mode = b.ensure_ready(&EligibilityRequest::new("GOLD")).await.unwrap();
		assert_eq!(mode, ChatMode::Cloud);
		assert_eq!(loader.injected().len(), 2);
		assert_eq!(b.sequencer().snapshot().script.attempts, 2);
	}

	#[tokio::test]
	async fn script_failure_becomes_sticky_after_cap() {
		let source = StaticEligibilitySource::new().with_plan("GOLD", response(true, "24/7"));
		let loader = ScriptedLoader::new([
			ScriptBehavior::Fail("a".into()),
			ScriptBehavior::Fail("b".into()),
			ScriptBehavior::Fail("c".into()),
		]);
		let b = bootstrapper(source, loader.clone(), &config(1_000));

		let err = b.ensure_ready(&EligibilityRequest::new("GOLD")).await.unwrap_err();
		assert!(matches!(err, ChatError::BootstrapUnavailable { attempts: 3 }));
		assert!(matches!(b.load_script().await, Err(ChatError::BootstrapUnavailable { .. })));
		assert_eq!(loader.injected().len(), 3);
	}

	#[tokio::test]
	async fn timed_out_attempt_is_retried_and_late_result_dropped() {
		let source = StaticEligibilitySource::new().with_plan("GOLD", response(true, "24/7"));
		let loader = ScriptedLoader::new([ScriptBehavior::Hang]);
		let b = bootstrapper(source, loader.clone(), &config(30));

		b.ensure_ready(&EligibilityRequest::new("GOLD")).await.unwrap();
		assert_eq!(loader.injected().len(), 2);

		loader.release_hung();
		tokio::task::yield_now().await;
		let script = b.sequencer().snapshot().script;
		assert!(script.is_complete);
		assert_eq!(script.attempts, 2);
	}

	#[tokio::test]
	async fn missing_script_url_is_a_config_error() {
		let source = StaticEligibilitySource::new().with_plan("GOLD", response(true, "24/7"));
		let b = bootstrapper(source, ScriptedLoader::default(), &ChatConfig::default());
		b.refresh_eligibility(&EligibilityRequest::new("GOLD")).await.unwrap();
		assert!(matches!(b.load_script().await, Err(ChatError::Config(_))));
	}
}
