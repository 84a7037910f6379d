//! Single-flight bootstrap bookkeeping for the chat widget.
//!
//! The sequencer tracks three independent records:
//!
//! 1. eligibility: the remote check deciding whether chat may be offered
//! 2. script: loading of the vendor widget script
//! 3. dom: link enhancement bookkeeping
//!
//! It performs no I/O. Drivers ask it what to do next
//! ([`BootstrapSequencer::begin_eligibility_fetch`],
//! [`BootstrapSequencer::begin_script_load`]), perform the work, and report
//! back with the ticket they were handed. Tickets carry the generation and
//! attempt they belong to, so a late result from an abandoned or reset
//! operation is dropped instead of overwriting newer state.
//!
//! # Ordering
//!
//! A script attempt is only offered once eligibility completed with a
//! positive verdict. Opening a session additionally requires the script to
//! be loaded (see [`BootstrapSequencer::check_ready`]).

use std::sync::Arc;
use std::time::{Duration, Instant};

use memberchat_protocol::ChatMode;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::BootstrapPolicy;
use crate::eligibility::EligibilityVerdict;
use crate::error::{ChatError, Result};

/// Handle for one eligibility fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
	generation: u64,
	seq: u64,
}

/// Handle for one script load attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket {
	generation: u64,
	attempt: u32,
}

impl LoadTicket {
	pub fn attempt(&self) -> u32 {
		self.attempt
	}
}

/// Outcome of reporting a result with a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
	Applied,
	/// The ticket was superseded or the state was reset; nothing changed.
	Stale,
}

impl Applied {
	pub fn is_applied(self) -> bool {
		self == Applied::Applied
	}
}

#[derive(Debug, Clone, Default)]
struct EligibilityRecord {
	is_fetching: bool,
	is_complete: bool,
	is_eligible: bool,
	chat_mode: ChatMode,
	last_fetch_at: Option<Instant>,
	subject: Option<String>,
	seq: u64,
}

#[derive(Debug, Clone, Default)]
struct ScriptRecord {
	is_loading: bool,
	is_complete: bool,
	attempts: u32,
	last_attempt_at: Option<Instant>,
}

#[derive(Debug, Clone, Default)]
struct DomRecord {
	enhanced: bool,
	enhanced_count: usize,
	last_update_at: Option<Instant>,
}

#[derive(Debug, Default)]
struct BootstrapState {
	generation: u64,
	eligibility: EligibilityRecord,
	script: ScriptRecord,
	dom: DomRecord,
}

/// Derived lifecycle phase of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordPhase {
	Uninitialized,
	InFlight,
	/// A script attempt failed and another one is allowed.
	Retrying,
	Complete,
	Failed,
}

/// Aggregate answer to "can a session be opened".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum Readiness {
	Pending,
	Ready {
		#[serde(rename = "chatMode")]
		chat_mode: ChatMode,
	},
	Ineligible,
	Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EligibilitySnapshot {
	pub phase: RecordPhase,
	pub is_fetching: bool,
	pub is_complete: bool,
	pub is_eligible: bool,
	pub chat_mode: ChatMode,
	pub last_fetch_age_ms: Option<u64>,
	pub subject: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptSnapshot {
	pub phase: RecordPhase,
	pub is_loading: bool,
	pub is_complete: bool,
	pub attempts: u32,
	pub last_attempt_age_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomSnapshot {
	pub enhanced: bool,
	pub enhanced_count: usize,
	pub last_update_age_ms: Option<u64>,
}

/// Point-in-time view of all records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapSnapshot {
	pub generation: u64,
	pub readiness: Readiness,
	pub eligibility: EligibilitySnapshot,
	pub script: ScriptSnapshot,
	pub dom: DomSnapshot,
}

/// Coordinator over the bootstrap records.
///
/// Shared by `Arc` between the session controller, the link enhancer and
/// the async driver. All mutation goes through the methods below.
#[derive(Debug)]
pub struct BootstrapSequencer {
	clock: Arc<dyn Clock>,
	policy: BootstrapPolicy,
	state: Mutex<BootstrapState>,
	revision: watch::Sender<u64>,
}

impl BootstrapSequencer {
	pub fn new(clock: Arc<dyn Clock>, policy: BootstrapPolicy) -> Self {
		let (revision, _) = watch::channel(0);
		Self {
			clock,
			policy,
			state: Mutex::new(BootstrapState::default()),
			revision,
		}
	}

	pub fn policy(&self) -> BootstrapPolicy {
		self.policy
	}

	/// Receiver that ticks after every state change.
	pub fn subscribe(&self) -> watch::Receiver<u64> {
		self.revision.subscribe()
	}

	fn publish(&self) {
		self.revision.send_modify(|rev| *rev = rev.wrapping_add(1));
	}

	fn elapsed_since(&self, at: Instant) -> Duration {
		self.clock.monotonic_now().saturating_duration_since(at)
	}

	fn eligibility_expired(&self, record: &EligibilityRecord) -> bool {
		match record.last_fetch_at {
			Some(at) => self.elapsed_since(at) > self.policy.eligibility_ttl,
			None => true,
		}
	}

	fn needs_refresh(&self, record: &EligibilityRecord) -> bool {
		!record.is_fetching && (!record.is_complete || self.eligibility_expired(record))
	}

	/// True when eligibility never completed or its TTL has lapsed, and no
	/// fetch is in flight.
	pub fn should_refresh_eligibility(&self) -> bool {
		self.needs_refresh(&self.state.lock().eligibility)
	}

	/// Like [`Self::should_refresh_eligibility`], but also true when the
	/// last fetch was issued for a different plan.
	pub fn should_refresh_eligibility_for(&self, plan_id: &str) -> bool {
		let state = self.state.lock();
		let record = &state.eligibility;
		!record.is_fetching && (self.needs_refresh(record) || record.subject.as_deref() != Some(plan_id))
	}

	/// Marks a fetch as started.
	///
	/// Callers must not start a fetch while another is in flight. Doing so
	/// is a caller bug: debug builds panic, release builds log it and the
	/// earlier ticket goes stale.
	pub fn mark_eligibility_fetch_started(&self, plan_id: &str) -> FetchTicket {
		let ticket = {
			let mut state = self.state.lock();
			debug_assert!(!state.eligibility.is_fetching, "eligibility fetch already in flight");
			if state.eligibility.is_fetching {
				warn!(target = "mchat.bootstrap", plan_id, "eligibility fetch started while another is in flight");
			}
			start_fetch(&mut state, plan_id)
		};
		self.publish();
		ticket
	}

	/// Atomically checks whether a fetch for `plan_id` is due and marks it
	/// started. `None` when a fetch is in flight or the cached verdict is
	/// still fresh for that plan.
	pub fn begin_eligibility_fetch(&self, plan_id: &str) -> Option<FetchTicket> {
		let ticket = {
			let mut state = self.state.lock();
			let record = &state.eligibility;
			let due = !record.is_fetching && (self.needs_refresh(record) || record.subject.as_deref() != Some(plan_id));
			if !due {
				return None;
			}
			start_fetch(&mut state, plan_id)
		};
		self.publish();
		Some(ticket)
	}

	/// Stores a fetched verdict.
	pub fn record_eligibility_result(&self, ticket: FetchTicket, verdict: &EligibilityVerdict) -> Applied {
		let applied = {
			let mut state = self.state.lock();
			if !fetch_is_current(&state, ticket) {
				debug!(target = "mchat.bootstrap", "dropping stale eligibility result");
				return Applied::Stale;
			}
			let now = self.clock.monotonic_now();
			let record = &mut state.eligibility;
			record.is_fetching = false;
			record.is_complete = true;
			record.is_eligible = verdict.is_eligible;
			record.chat_mode = verdict.chat_mode;
			record.last_fetch_at = Some(now);
			info!(
				target = "mchat.bootstrap",
				eligible = verdict.is_eligible,
				reason = ?verdict.reason,
				chat_mode = %verdict.chat_mode,
				"eligibility recorded"
			);
			Applied::Applied
		};
		self.publish();
		applied
	}

	/// Clears the in-flight flag after a failed fetch. The record stays
	/// incomplete so the next refresh check asks for another fetch.
	pub fn record_eligibility_failure(&self, ticket: FetchTicket) -> Applied {
		let applied = {
			let mut state = self.state.lock();
			if !fetch_is_current(&state, ticket) {
				return Applied::Stale;
			}
			state.eligibility.is_fetching = false;
			Applied::Applied
		};
		self.publish();
		applied
	}

	fn script_allowed(&self, state: &BootstrapState) -> bool {
		let (script, eligibility) = (&state.script, &state.eligibility);
		!script.is_complete && !script.is_loading && eligibility.is_complete && eligibility.is_eligible && script.attempts < self.policy.max_script_attempts
	}

	/// True only when eligibility completed positively and the script is
	/// neither loaded, loading, nor out of attempts.
	pub fn should_load_script(&self) -> bool {
		self.script_allowed(&self.state.lock())
	}

	/// Marks a script attempt as started.
	pub fn mark_script_load_started(&self) -> LoadTicket {
		let ticket = {
			let mut state = self.state.lock();
			debug_assert!(!state.script.is_loading, "script load already in flight");
			start_load(&mut state, self.clock.monotonic_now())
		};
		self.publish();
		ticket
	}

	/// Atomic check-and-start for a script attempt.
	pub fn begin_script_load(&self) -> Option<LoadTicket> {
		let ticket = {
			let mut state = self.state.lock();
			if !self.script_allowed(&state) {
				return None;
			}
			start_load(&mut state, self.clock.monotonic_now())
		};
		self.publish();
		Some(ticket)
	}

	/// Reports the outcome of a script attempt.
	///
	/// Results for an attempt that was superseded, after a reset, or after
	/// the script already loaded are dropped.
	pub fn mark_script_load_complete(&self, ticket: LoadTicket, success: bool) -> Applied {
		let applied = {
			let mut state = self.state.lock();
			let script = &state.script;
			if ticket.generation != state.generation || ticket.attempt != script.attempts || script.is_complete {
				debug!(target = "mchat.bootstrap", attempt = ticket.attempt, success, "dropping stale script result");
				return Applied::Stale;
			}
			// The final attempt was abandoned: the failure is terminal until reset.
			if self.script_sticky_failed(script) {
				debug!(target = "mchat.bootstrap", attempt = ticket.attempt, success, "dropping script result after terminal failure");
				return Applied::Stale;
			}
			let max = self.policy.max_script_attempts;
			let script = &mut state.script;
			script.is_loading = false;
			script.is_complete = success;
			if success {
				info!(target = "mchat.bootstrap", attempt = ticket.attempt, "widget script loaded");
			} else if script.attempts >= max {
				warn!(target = "mchat.bootstrap", attempts = script.attempts, "widget script failed; giving up until reset");
			} else {
				warn!(target = "mchat.bootstrap", attempt = ticket.attempt, max, "widget script failed; retry allowed");
			}
			Applied::Applied
		};
		self.publish();
		applied
	}

	/// True when an attempt has been loading longer than the timeout.
	pub fn has_timed_out(&self) -> bool {
		let state = self.state.lock();
		self.load_timed_out(&state.script)
	}

	fn load_timed_out(&self, script: &ScriptRecord) -> bool {
		script.is_loading && script.last_attempt_at.is_some_and(|at| self.elapsed_since(at) > self.policy.script_timeout)
	}

	/// Stops waiting for a timed-out attempt so another may begin. The
	/// original load keeps running; if it reports before a newer attempt
	/// starts its result still applies.
	pub fn abandon_timed_out_load(&self) -> bool {
		let abandoned = {
			let mut state = self.state.lock();
			if !self.load_timed_out(&state.script) {
				return false;
			}
			state.script.is_loading = false;
			warn!(target = "mchat.bootstrap", attempt = state.script.attempts, "widget script load timed out");
			true
		};
		self.publish();
		abandoned
	}

	/// Stops waiting for the attempt behind `ticket` after a driver-side
	/// timer fired. Same late-result rules as
	/// [`Self::abandon_timed_out_load`].
	pub fn abandon_script_load(&self, ticket: LoadTicket) -> Applied {
		{
			let mut state = self.state.lock();
			if ticket.generation != state.generation || ticket.attempt != state.script.attempts || !state.script.is_loading {
				return Applied::Stale;
			}
			state.script.is_loading = false;
			warn!(target = "mchat.bootstrap", attempt = ticket.attempt, "widget script load timed out");
		}
		self.publish();
		Applied::Applied
	}

	/// True once script loading failed on its final attempt.
	pub fn is_script_failed(&self) -> bool {
		let state = self.state.lock();
		self.script_sticky_failed(&state.script)
	}

	fn script_sticky_failed(&self, script: &ScriptRecord) -> bool {
		!script.is_complete && !script.is_loading && script.attempts >= self.policy.max_script_attempts
	}

	/// Records newly enhanced trigger links.
	pub fn mark_dom_enhanced(&self, count: usize) {
		{
			let mut state = self.state.lock();
			let now = self.clock.monotonic_now();
			let dom = &mut state.dom;
			dom.enhanced |= count > 0;
			dom.enhanced_count += count;
			dom.last_update_at = Some(now);
		}
		self.publish();
	}

	/// Returns every record to uninitialized and invalidates all tickets.
	///
	/// Only call this when nothing is in flight: test teardown or a
	/// deliberate forced reinitialization.
	pub fn reset(&self) {
		{
			let mut state = self.state.lock();
			let generation = state.generation + 1;
			*state = BootstrapState {
				generation,
				..BootstrapState::default()
			};
		}
		info!(target = "mchat.bootstrap", "bootstrap state reset");
		self.publish();
	}

	fn readiness_of(&self, state: &BootstrapState) -> Readiness {
		let (eligibility, script) = (&state.eligibility, &state.script);
		if self.script_sticky_failed(script) {
			Readiness::Unavailable
		} else if eligibility.is_complete && !eligibility.is_eligible {
			Readiness::Ineligible
		} else if eligibility.is_complete && script.is_complete {
			Readiness::Ready {
				chat_mode: eligibility.chat_mode,
			}
		} else {
			Readiness::Pending
		}
	}

	pub fn readiness(&self) -> Readiness {
		self.readiness_of(&self.state.lock())
	}

	/// Gate used before opening a session: eligibility complete, positive
	/// and within TTL, and the script loaded.
	pub fn check_ready(&self) -> Result<ChatMode> {
		self.ready_for(&self.state.lock(), None)
	}

	/// Like [`Self::check_ready`], but the fresh verdict must also have
	/// been fetched for `plan_id`.
	pub fn check_ready_for(&self, plan_id: &str) -> Result<ChatMode> {
		self.ready_for(&self.state.lock(), Some(plan_id))
	}

	fn ready_for(&self, state: &BootstrapState, plan_id: Option<&str>) -> Result<ChatMode> {
		let (eligibility, script) = (&state.eligibility, &state.script);
		if self.script_sticky_failed(script) {
			return Err(ChatError::BootstrapUnavailable { attempts: script.attempts });
		}
		if !eligibility.is_complete || self.eligibility_expired(eligibility) {
			return Err(ChatError::BootstrapPending);
		}
		if let Some(plan_id) = plan_id {
			if eligibility.subject.as_deref() != Some(plan_id) {
				debug!(target = "mchat.bootstrap", plan_id, subject = ?eligibility.subject, "eligibility was fetched for another plan");
				return Err(ChatError::BootstrapPending);
			}
		}
		if !eligibility.is_eligible {
			return Err(ChatError::Ineligible {
				reason: "eligibility check declined chat".to_string(),
			});
		}
		if !script.is_complete {
			return Err(ChatError::BootstrapPending);
		}
		Ok(eligibility.chat_mode)
	}

	pub fn snapshot(&self) -> BootstrapSnapshot {
		let state = self.state.lock();
		let age = |at: Option<Instant>| at.map(|at| u64::try_from(self.elapsed_since(at).as_millis()).unwrap_or(u64::MAX));
		let (eligibility, script, dom) = (&state.eligibility, &state.script, &state.dom);

		let eligibility_phase = if eligibility.is_fetching {
			RecordPhase::InFlight
		} else if eligibility.is_complete {
			RecordPhase::Complete
		} else if eligibility.seq > 0 {
			RecordPhase::Failed
		} else {
			RecordPhase::Uninitialized
		};
		let script_phase = if script.is_loading {
			RecordPhase::InFlight
		} else if script.is_complete {
			RecordPhase::Complete
		} else if self.script_sticky_failed(script) {
			RecordPhase::Failed
		} else if script.attempts > 0 {
			RecordPhase::Retrying
		} else {
			RecordPhase::Uninitialized
		};

		BootstrapSnapshot {
			generation: state.generation,
			readiness: self.readiness_of(&state),
			eligibility: EligibilitySnapshot {
				phase: eligibility_phase,
				is_fetching: eligibility.is_fetching,
				is_complete: eligibility.is_complete,
				is_eligible: eligibility.is_eligible,
				chat_mode: eligibility.chat_mode,
				last_fetch_age_ms: age(eligibility.last_fetch_at),
				subject: eligibility.subject.clone(),
			},
			script: ScriptSnapshot {
				phase: script_phase,
				is_loading: script.is_loading,
				is_complete: script.is_complete,
				attempts: script.attempts,
				last_attempt_age_ms: age(script.last_attempt_at),
			},
			dom: DomSnapshot {
				enhanced: dom.enhanced,
				enhanced_count: dom.enhanced_count,
				last_update_age_ms: age(dom.last_update_at),
			},
		}
	}
}

fn start_fetch(state: &mut BootstrapState, plan_id: &str) -> FetchTicket {
	let record = &mut state.eligibility;
	record.seq += 1;
	record.is_fetching = true;
	record.is_complete = false;
	record.subject = Some(plan_id.to_string());
	debug!(target = "mchat.bootstrap", plan_id, seq = record.seq, "eligibility fetch started");
	FetchTicket {
		generation: state.generation,
		seq: record.seq,
	}
}

fn fetch_is_current(state: &BootstrapState, ticket: FetchTicket) -> bool {
	ticket.generation == state.generation && ticket.seq == state.eligibility.seq && state.eligibility.is_fetching
}

fn start_load(state: &mut BootstrapState, now: Instant) -> LoadTicket {
	let script = &mut state.script;
	script.attempts += 1;
	script.is_loading = true;
	script.last_attempt_at = Some(now);
	debug!(target = "mchat.bootstrap", attempt = script.attempts, "widget script load started");
	LoadTicket {
		generation: state.generation,
		attempt: script.attempts,
	}
}
