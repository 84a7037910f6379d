//! Chat session lifecycle.
//!
//! A session moves `Closed -> Open -> Locked -> Ended`. `Open` means the
//! widget was asked to start and the backend handshake is pending;
//! `Locked` means the handshake succeeded and the portal's plan switcher
//! is disabled so the conversation cannot silently change plans.
//!
//! Collaborator callbacks and widget commands are issued after the state
//! lock is released, so they may call back into the controller. Lock
//! callbacks are delivered under a reentrant transition lock, so the
//! switcher sees them in the order the phases changed.

use std::sync::Arc;

use memberchat_protocol::widget::{COMMAND_END_SESSION, COMMAND_START_SESSION, StartSessionPayload};
use memberchat_protocol::ChatMode;
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::bootstrap::BootstrapSequencer;
use crate::eligibility::{EligibilityResolver, PlanDirectory};
use crate::error::{ChatError, Result};
use crate::links::OpenChat;
use crate::widget::WidgetBus;

/// Portal-side plan switcher the controller locks while a session runs.
pub trait PlanSwitcher: Send + Sync {
	fn on_lock_plan_switcher(&self, locked: bool);

	/// Hands control back to the portal to pick another plan.
	fn on_open_plan_switcher(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
	#[default]
	Closed,
	/// Start requested; waiting for the handshake.
	Open,
	/// Handshake confirmed. Transient: entering it locks immediately.
	Active,
	/// Active with the plan switcher disabled.
	Locked,
	/// Closed after a bound session.
	Ended,
}

impl SessionPhase {
	pub fn is_closed(self) -> bool {
		matches!(self, SessionPhase::Closed | SessionPhase::Ended)
	}

	pub fn is_active(self) -> bool {
		matches!(self, SessionPhase::Active | SessionPhase::Locked)
	}
}

/// Observable session state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
	pub phase: SessionPhase,
	pub bound_plan_id: Option<String>,
	pub lock_reason: Option<String>,
	pub last_error: Option<String>,
}

/// Answer to a plan switch request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanSwitchDecision {
	/// No session; the switch may proceed.
	Allowed,
	/// The session is already on the requested plan.
	AlreadyBound,
	/// Another plan's session must be ended first.
	ConfirmationRequired { current: String, requested: String },
}

/// Whether an event changed the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
	Applied,
	Ignored,
}

impl Transition {
	pub fn is_applied(self) -> bool {
		self == Transition::Applied
	}
}

#[derive(Debug, Default)]
struct Inner {
	state: SessionState,
	/// Plan of an `Open` session that has not been confirmed yet.
	pending_plan_id: Option<String>,
	chat_mode: ChatMode,
}

impl Inner {
	fn session_plan(&self) -> Option<&str> {
		self.state.bound_plan_id.as_deref().or(self.pending_plan_id.as_deref())
	}
}

/// Who ended a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseOrigin {
	/// The portal or member; the widget must be told.
	Portal,
	/// The widget itself reported the end.
	Widget,
}

/// Owns [`SessionState`] and drives the widget and plan switcher.
pub struct SessionLifecycleController {
	sequencer: Arc<BootstrapSequencer>,
	resolver: EligibilityResolver,
	plans: Arc<dyn PlanDirectory>,
	bus: Arc<dyn WidgetBus>,
	switcher: Arc<dyn PlanSwitcher>,
	inner: Mutex<Inner>,
	/// Held across a lock-changing transition and its callback.
	transitions: ReentrantMutex<()>,
	current_plan: RwLock<Option<String>>,
}

impl SessionLifecycleController {
	pub fn new(
		sequencer: Arc<BootstrapSequencer>,
		resolver: EligibilityResolver,
		plans: Arc<dyn PlanDirectory>,
		bus: Arc<dyn WidgetBus>,
		switcher: Arc<dyn PlanSwitcher>,
	) -> Self {
		Self {
			sequencer,
			resolver,
			plans,
			bus,
			switcher,
			inner: Mutex::new(Inner::default()),
			transitions: ReentrantMutex::new(()),
			current_plan: RwLock::new(None),
		}
	}

	pub fn state(&self) -> SessionState {
		self.inner.lock().state.clone()
	}

	pub fn phase(&self) -> SessionPhase {
		self.inner.lock().state.phase
	}

	/// Chat mode chosen when the current session was opened.
	pub fn chat_mode(&self) -> ChatMode {
		self.inner.lock().chat_mode
	}

	/// Sets the plan the member is currently viewing. Link clicks open chat
	/// for this plan.
	pub fn set_current_plan(&self, plan_id: Option<String>) {
		*self.current_plan.write() = plan_id;
	}

	pub fn current_plan(&self) -> Option<String> {
		self.current_plan.read().clone()
	}

	/// Opens a session for `plan_id`. Requires a loaded script and an
	/// eligibility verdict fetched for `plan_id` within the TTL.
	///
	/// Reopening the plan of a live session is a no-op. Opening another
	/// plan while a session is live fails with
	/// [`ChatError::PlanSwitchRequiresConfirmation`].
	pub fn open(&self, plan_id: &str) -> Result<()> {
		if self.check_live_session(plan_id)? {
			return Ok(());
		}

		let chat_mode = match self.admit(plan_id) {
			Ok(mode) => mode,
			Err(err) => {
				warn!(target = "mchat.session", plan_id, error = %err, "chat session refused");
				self.inner.lock().state.last_error = Some(err.to_string());
				return Err(err);
			}
		};

		{
			let mut inner = self.inner.lock();
			if let Some(current) = inner.session_plan() {
				// Lost a race with a concurrent open.
				if current == plan_id {
					return Ok(());
				}
				return Err(ChatError::PlanSwitchRequiresConfirmation {
					current: current.to_string(),
					requested: plan_id.to_string(),
				});
			}
			inner.state.phase = SessionPhase::Open;
			inner.state.last_error = None;
			inner.pending_plan_id = Some(plan_id.to_string());
			inner.chat_mode = chat_mode;
		}

		let payload = StartSessionPayload {
			plan_id: plan_id.to_string(),
			chat_mode,
		};
		let sent = serde_json::to_value(&payload).map_err(ChatError::from).and_then(|payload| self.bus.command(COMMAND_START_SESSION, payload));
		if let Err(err) = sent {
			warn!(target = "mchat.session", plan_id, error = %err, "start-session command failed");
			let mut inner = self.inner.lock();
			if inner.state.phase == SessionPhase::Open && inner.pending_plan_id.as_deref() == Some(plan_id) {
				inner.state.phase = SessionPhase::Closed;
				inner.pending_plan_id = None;
				inner.state.last_error = Some(err.to_string());
			}
			return Err(err);
		}

		info!(target = "mchat.session", plan_id, %chat_mode, "chat session opened");
		Ok(())
	}

	/// Returns `Ok(true)` when `plan_id` already has a live session.
	fn check_live_session(&self, plan_id: &str) -> Result<bool> {
		let inner = self.inner.lock();
		match inner.session_plan() {
			Some(current) if current == plan_id => {
				debug!(target = "mchat.session", plan_id, "open ignored: session already live");
				Ok(true)
			}
			Some(current) => Err(ChatError::PlanSwitchRequiresConfirmation {
				current: current.to_string(),
				requested: plan_id.to_string(),
			}),
			None => Ok(false),
		}
	}

	fn admit(&self, plan_id: &str) -> Result<ChatMode> {
		self.sequencer.check_ready_for(plan_id)?;
		let profile = self.plans.profile(plan_id).ok_or_else(|| ChatError::UnknownPlan(plan_id.to_string()))?;
		let verdict = self.resolver.resolve_profile(&profile);
		if !verdict.is_eligible {
			let reason = verdict.reason.map_or("ineligible", |reason| reason.as_str());
			return Err(ChatError::Ineligible { reason: reason.to_string() });
		}
		Ok(verdict.chat_mode)
	}

	/// Handshake succeeded: binds the plan and locks the switcher.
	pub fn confirm_active(&self) -> Transition {
		let _transition = self.transitions.lock();
		let plan_id = {
			let mut inner = self.inner.lock();
			match inner.state.phase {
				SessionPhase::Open => {}
				phase => {
					debug!(target = "mchat.session", ?phase, "handshake confirmation ignored");
					return Transition::Ignored;
				}
			}
			let plan_id = inner.pending_plan_id.take();
			// Entering Active locks immediately.
			inner.state.phase = SessionPhase::Locked;
			inner.state.bound_plan_id = plan_id.clone();
			inner.state.lock_reason = Some(match &plan_id {
				Some(plan) => format!("chat session active for plan {plan}"),
				None => "chat session active".to_string(),
			});
			plan_id
		};

		self.switcher.on_lock_plan_switcher(true);
		info!(target = "mchat.session", plan_id = plan_id.as_deref().unwrap_or_default(), "chat session active; plan switcher locked");
		Transition::Applied
	}

	/// Decides whether the member may move to `new_plan_id` without losing
	/// a live conversation.
	pub fn request_plan_switch(&self, new_plan_id: &str) -> PlanSwitchDecision {
		let inner = self.inner.lock();
		match inner.session_plan() {
			None => PlanSwitchDecision::Allowed,
			Some(current) if current == new_plan_id => PlanSwitchDecision::AlreadyBound,
			Some(current) => PlanSwitchDecision::ConfirmationRequired {
				current: current.to_string(),
				requested: new_plan_id.to_string(),
			},
		}
	}

	/// Member confirmed the switch: ends the session, then reopens the
	/// plan switcher.
	pub fn confirm_plan_switch(&self) {
		self.close();
		self.switcher.on_open_plan_switcher();
	}

	/// Ends the session from any phase and tells the widget.
	pub fn close(&self) -> Transition {
		self.close_from(CloseOrigin::Portal)
	}

	/// The widget reported that the session ended.
	pub fn on_session_ended(&self) -> Transition {
		self.close_from(CloseOrigin::Widget)
	}

	fn close_from(&self, origin: CloseOrigin) -> Transition {
		let _transition = self.transitions.lock();
		let (was_live, was_locked, plan_id) = {
			let mut inner = self.inner.lock();
			let phase = inner.state.phase;
			let was_live = !phase.is_closed();
			let was_locked = phase.is_active();
			let plan_id = inner.session_plan().map(str::to_string);
			if was_live {
				inner.state.phase = if inner.state.bound_plan_id.is_some() { SessionPhase::Ended } else { SessionPhase::Closed };
			}
			inner.state.bound_plan_id = None;
			inner.state.lock_reason = None;
			inner.pending_plan_id = None;
			(was_live, was_locked, plan_id)
		};

		if was_locked {
			self.switcher.on_lock_plan_switcher(false);
		}
		if was_live && origin == CloseOrigin::Portal {
			if let Err(err) = self.bus.command(COMMAND_END_SESSION, serde_json::Value::Null) {
				warn!(target = "mchat.session", error = %err, "end-session command failed");
			}
		}
		if was_live {
			info!(target = "mchat.session", plan_id = plan_id.as_deref().unwrap_or_default(), ?origin, "chat session closed");
			Transition::Applied
		} else {
			Transition::Ignored
		}
	}

	/// Backend rejected the session start. Only meaningful while `Open`.
	pub fn on_handshake_failure(&self, message: &str) -> Transition {
		let mut inner = self.inner.lock();
		if inner.state.phase != SessionPhase::Open {
			debug!(target = "mchat.session", phase = ?inner.state.phase, "handshake failure ignored");
			return Transition::Ignored;
		}
		let err = ChatError::SessionHandshake(message.to_string());
		warn!(target = "mchat.session", plan_id = inner.pending_plan_id.as_deref().unwrap_or_default(), error = %err, "chat session handshake failed");
		inner.state.phase = SessionPhase::Closed;
		inner.state.last_error = Some(err.to_string());
		inner.pending_plan_id = None;
		Transition::Applied
	}
}

impl OpenChat for SessionLifecycleController {
	fn open_chat(&self) {
		let Some(plan_id) = self.current_plan() else {
			warn!(target = "mchat.session", "chat link clicked with no plan selected");
			return;
		};
		if let Err(err) = self.open(&plan_id) {
			debug!(target = "mchat.session", plan_id, error = %err, "chat link did not open a session");
		}
	}
}

#[cfg(test)]
mod tests {
	use chrono::NaiveDate;

	use super::*;
	use crate::clock::ManualClock;
	use crate::config::BootstrapPolicy;
	use crate::eligibility::{PlanBook, PlanFlags, PlanProfile};
	use crate::widget::FakeWidgetBus;

	#[derive(Default)]
	struct RecordingSwitcher {
		locks: Mutex<Vec<bool>>,
		opened: Mutex<usize>,
	}

	impl PlanSwitcher for RecordingSwitcher {
		fn on_lock_plan_switcher(&self, locked: bool) {
			self.locks.lock().push(locked);
		}

		fn on_open_plan_switcher(&self) {
			*self.opened.lock() += 1;
		}
	}

	struct Harness {
		clock: Arc<ManualClock>,
		sequencer: Arc<BootstrapSequencer>,
		plans: Arc<PlanBook>,
		bus: FakeWidgetBus,
		switcher: Arc<RecordingSwitcher>,
		controller: SessionLifecycleController,
	}

	fn profile(enabled: bool, hours: &str) -> PlanProfile {
		PlanProfile {
			flags: PlanFlags {
				chat_enabled_for_plan: enabled,
				cloud_chat_flag: true,
			},
			business_hours: hours.to_string(),
		}
	}

	fn harness() -> Harness {
		// Monday 10:00.
		let wall = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap().and_hms_opt(10, 0, 0).unwrap();
		let clock = Arc::new(ManualClock::new(wall));
		let sequencer = Arc::new(BootstrapSequencer::new(clock.clone(), BootstrapPolicy::default()));
		let plans = Arc::new(PlanBook::new());
		plans.insert("A", profile(true, "M_F_8_17"));
		plans.insert("B", profile(true, "24/7"));
		let bus = FakeWidgetBus::new();
		let switcher = Arc::new(RecordingSwitcher::default());
		let controller = SessionLifecycleController::new(
			sequencer.clone(),
			EligibilityResolver::new(clock.clone()),
			plans.clone(),
			Arc::new(bus.clone()),
			switcher.clone(),
		);
		Harness {
			clock,
			sequencer,
			plans,
			bus,
			switcher,
			controller,
		}
	}

	fn refresh_for(h: &Harness, plan_id: &str, eligible: bool) {
		let resolver = EligibilityResolver::new(h.clock.clone());
		let verdict = resolver.resolve_profile(&profile(eligible, "24/7"));
		let ticket = h.sequencer.mark_eligibility_fetch_started(plan_id);
		h.sequencer.record_eligibility_result(ticket, &verdict);
	}

	fn make_ready(h: &Harness, eligible: bool) {
		refresh_for(h, "A", eligible);
		if eligible {
			let load = h.sequencer.mark_script_load_started();
			h.sequencer.mark_script_load_complete(load, true);
		}
	}

	fn locks(h: &Harness) -> Vec<bool> {
		h.switcher.locks.lock().clone()
	}

	#[test]
	fn open_before_bootstrap_is_pending() {
		let h = harness();
		assert!(matches!(h.controller.open("A"), Err(ChatError::BootstrapPending)));
		assert_eq!(h.controller.phase(), SessionPhase::Closed);
		assert!(h.bus.commands().is_empty());
	}

	#[test]
	fn ineligible_bootstrap_keeps_session_closed() {
		let h = harness();
		make_ready(&h, false);

		let err = h.controller.open("A").unwrap_err();
		assert!(matches!(err, ChatError::Ineligible { .. }));
		let state = h.controller.state();
		assert_eq!(state.phase, SessionPhase::Closed);
		assert!(state.last_error.is_some());
		assert!(locks(&h).is_empty());
		assert!(h.bus.commands().is_empty());
	}

	#[test]
	fn plan_outside_hours_is_refused() {
		let h = harness();
		make_ready(&h, true);
		h.clock.set_wall(NaiveDate::from_ymd_opt(2024, 3, 4).unwrap().and_hms_opt(18, 0, 0).unwrap());

		let err = h.controller.open("A").unwrap_err();
		assert!(matches!(err, ChatError::Ineligible { ref reason } if reason == "outside-hours"), "{err}");
		assert_eq!(h.controller.phase(), SessionPhase::Closed);
	}

	#[test]
	fn verdict_for_another_plan_does_not_admit() {
		let h = harness();
		// B's profile is an hour old; only A was fetched recently.
		h.clock.advance(std::time::Duration::from_secs(3600));
		make_ready(&h, true);

		assert!(matches!(h.controller.open("B"), Err(ChatError::BootstrapPending)));
		let state = h.controller.state();
		assert_eq!(state.phase, SessionPhase::Closed);
		assert!(state.last_error.is_some());
		assert!(h.bus.commands().is_empty());

		refresh_for(&h, "B", true);
		h.controller.open("B").unwrap();
		assert_eq!(h.controller.phase(), SessionPhase::Open);
	}

	#[test]
	fn unknown_plan_is_refused() {
		let h = harness();
		make_ready(&h, true);
		assert!(matches!(h.controller.open("Z"), Err(ChatError::UnknownPlan(plan)) if plan == "Z"));
	}

	#[test]
	fn open_sends_start_session_with_mode() {
		let h = harness();
		make_ready(&h, true);

		h.controller.open("A").unwrap();
		assert_eq!(h.controller.phase(), SessionPhase::Open);
		let commands = h.bus.commands();
		assert_eq!(commands.len(), 1);
		assert_eq!(commands[0].0, COMMAND_START_SESSION);
		let payload: StartSessionPayload = serde_json::from_value(commands[0].1.clone()).unwrap();
		assert_eq!(payload.plan_id, "A");
		assert_eq!(payload.chat_mode, ChatMode::Cloud);
	}

	#[test]
	fn full_lifecycle_locks_and_unlocks_once() {
		let h = harness();
		make_ready(&h, true);

		h.controller.open("A").unwrap();
		assert!(h.controller.confirm_active().is_applied());
		let state = h.controller.state();
		assert_eq!(state.phase, SessionPhase::Locked);
		assert_eq!(state.bound_plan_id.as_deref(), Some("A"));
		assert!(state.lock_reason.is_some());

		// Redundant handshake.
		assert!(!h.controller.confirm_active().is_applied());
		assert_eq!(locks(&h), vec![true]);

		assert!(h.controller.close().is_applied());
		assert_eq!(locks(&h), vec![true, false]);
		let state = h.controller.state();
		assert_eq!(state.phase, SessionPhase::Ended);
		assert!(state.bound_plan_id.is_none());
		assert!(state.lock_reason.is_none());
		assert_eq!(h.bus.command_names(), vec![COMMAND_START_SESSION.to_string(), COMMAND_END_SESSION.to_string()]);

		assert!(!h.controller.close().is_applied());
		assert_eq!(locks(&h), vec![true, false]);
	}

	#[test]
	fn plan_switch_while_locked_requires_confirmation() {
		let h = harness();
		make_ready(&h, true);
		h.controller.open("A").unwrap();
		h.controller.confirm_active();

		assert_eq!(
			h.controller.request_plan_switch("B"),
			PlanSwitchDecision::ConfirmationRequired {
				current: "A".into(),
				requested: "B".into(),
			}
		);
		assert_eq!(h.controller.request_plan_switch("A"), PlanSwitchDecision::AlreadyBound);
		assert!(matches!(h.controller.open("B"), Err(ChatError::PlanSwitchRequiresConfirmation { .. })));
		// Nothing changed.
		assert_eq!(h.controller.state().bound_plan_id.as_deref(), Some("A"));
		assert_eq!(locks(&h), vec![true]);

		h.controller.confirm_plan_switch();
		assert_eq!(locks(&h), vec![true, false]);
		assert_eq!(*h.switcher.opened.lock(), 1);
		assert_eq!(h.controller.request_plan_switch("B"), PlanSwitchDecision::Allowed);
		refresh_for(&h, "B", true);
		h.controller.open("B").unwrap();
	}

	#[test]
	fn open_phase_also_guards_plan_switch() {
		let h = harness();
		make_ready(&h, true);
		h.controller.open("A").unwrap();

		assert!(matches!(h.controller.request_plan_switch("B"), PlanSwitchDecision::ConfirmationRequired { .. }));
		h.controller.open("A").unwrap();
		assert_eq!(h.bus.commands().len(), 1, "same-plan reopen is a no-op");
	}

	#[test]
	fn handshake_failure_only_applies_when_open() {
		let h = harness();
		make_ready(&h, true);
		assert!(!h.controller.on_handshake_failure("early").is_applied());

		h.controller.open("A").unwrap();
		assert!(h.controller.on_handshake_failure("backend rejected").is_applied());
		let state = h.controller.state();
		assert_eq!(state.phase, SessionPhase::Closed);
		assert!(state.last_error.unwrap().contains("backend rejected"));
		assert!(locks(&h).is_empty());

		// Affordance stays usable.
		h.controller.open("A").unwrap();
		h.controller.confirm_active();
		assert!(!h.controller.on_handshake_failure("late").is_applied());
		assert_eq!(h.controller.phase(), SessionPhase::Locked);
	}

	#[test]
	fn widget_initiated_end_does_not_echo_command() {
		let h = harness();
		make_ready(&h, true);
		h.controller.open("A").unwrap();
		h.controller.confirm_active();

		assert!(h.controller.on_session_ended().is_applied());
		assert_eq!(h.bus.command_names(), vec![COMMAND_START_SESSION.to_string()]);
		assert_eq!(locks(&h), vec![true, false]);
	}

	#[test]
	fn closing_unconfirmed_session_unlocks_nothing() {
		let h = harness();
		make_ready(&h, true);
		h.controller.open("A").unwrap();

		assert!(h.controller.close().is_applied());
		assert_eq!(h.controller.phase(), SessionPhase::Closed);
		assert!(locks(&h).is_empty());
	}

	#[test]
	fn failed_start_command_reverts_to_closed() {
		let h = harness();
		make_ready(&h, true);
		h.bus.fail_commands(true);

		assert!(matches!(h.controller.open("A"), Err(ChatError::Widget(_))));
		let state = h.controller.state();
		assert_eq!(state.phase, SessionPhase::Closed);
		assert!(state.last_error.is_some());
	}

	#[test]
	fn lock_callbacks_alternate_over_many_sessions() {
		let h = harness();
		make_ready(&h, true);
		for round in 0..5 {
			let plan = if round % 2 == 0 { "A" } else { "B" };
			refresh_for(&h, plan, true);
			h.controller.open(plan).unwrap();
			h.controller.confirm_active();
			h.controller.confirm_active();
			h.controller.close();
			h.controller.close();
		}
		let locks = locks(&h);
		assert_eq!(locks.len(), 10);
		assert!(locks.chunks(2).all(|pair| pair == [true, false]));
	}

	#[test]
	fn racing_confirm_and_close_never_leave_switcher_locked() {
		for _ in 0..200 {
			let h = harness();
			make_ready(&h, true);
			h.controller.open("A").unwrap();

			let barrier = std::sync::Barrier::new(2);
			std::thread::scope(|scope| {
				scope.spawn(|| {
					barrier.wait();
					h.controller.confirm_active();
				});
				scope.spawn(|| {
					barrier.wait();
					h.controller.close();
				});
			});

			let locks = locks(&h);
			assert!(h.controller.phase().is_closed());
			assert!(locks.is_empty() || locks == [true, false], "{locks:?}");
		}
	}

	#[test]
	fn switcher_may_close_from_its_lock_callback() {
		struct ClosingSwitcher {
			controller: Mutex<Option<Arc<SessionLifecycleController>>>,
			locks: Mutex<Vec<bool>>,
		}

		impl PlanSwitcher for ClosingSwitcher {
			fn on_lock_plan_switcher(&self, locked: bool) {
				self.locks.lock().push(locked);
				let controller = self.controller.lock().clone();
				if let (true, Some(controller)) = (locked, controller) {
					controller.close();
				}
			}

			fn on_open_plan_switcher(&self) {}
		}

		let h = harness();
		make_ready(&h, true);
		let switcher = Arc::new(ClosingSwitcher {
			controller: Mutex::new(None),
			locks: Mutex::new(Vec::new()),
		});
		let controller = Arc::new(SessionLifecycleController::new(
			h.sequencer.clone(),
			EligibilityResolver::new(h.clock.clone()),
			h.plans.clone(),
			Arc::new(h.bus.clone()),
			switcher.clone(),
		));
		*switcher.controller.lock() = Some(controller.clone());

		controller.open("A").unwrap();
		assert!(controller.confirm_active().is_applied());
		assert_eq!(controller.phase(), SessionPhase::Ended);
		assert_eq!(*switcher.locks.lock(), vec![true, false]);
		switcher.controller.lock().take();
	}

	#[test]
	fn link_clicks_open_the_current_plan() {
		let h = harness();
		make_ready(&h, true);

		h.controller.open_chat();
		assert_eq!(h.controller.phase(), SessionPhase::Closed);

		h.controller.set_current_plan(Some("B".into()));
		refresh_for(&h, "B", true);
		h.controller.open_chat();
		assert_eq!(h.controller.phase(), SessionPhase::Open);
		h.plans.remove("B");
		// Already open for B: no re-resolution happens.
		h.controller.open_chat();
		assert_eq!(h.bus.commands().len(), 1);
	}
}
