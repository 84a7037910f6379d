//! Wires the engine to a host page.
//!
//! [`ChatOrchestrator`] owns the bootstrapper, the session controller and
//! the link enhancer, routes widget events to the controller, and opens
//! chat from trigger-link clicks.

use std::sync::{Arc, Weak};

use memberchat::dom::NodeId;
use memberchat::widget::{EVENT_PLAN_SWITCH_REQUESTED, EVENT_SESSION_ENDED, EVENT_SESSION_FAILED, EVENT_SESSION_STARTED, WidgetEventHandler};
use memberchat::{
	BootstrapSequencer, ChatConfig, ChatMode, Clock, Document, EligibilityResolver, LinkEnhancer, OpenChat, PlanBook, PlanSwitchDecision, PlanSwitcher,
	Result, SessionLifecycleController, SessionState, Subscription, WidgetBus,
};
use memberchat_protocol::widget::{PlanSwitchPayload, SessionFailedPayload, WidgetOptions};
use memberchat_protocol::EligibilityRequest;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::bootstrapper::Bootstrapper;
use crate::script::ScriptLoader;
use crate::source::EligibilitySource;

/// Host capabilities the orchestrator drives.
pub struct HostParts {
	pub clock: Arc<dyn Clock>,
	pub source: Arc<dyn EligibilitySource>,
	pub loader: Arc<dyn ScriptLoader>,
	pub bus: Arc<dyn WidgetBus>,
	pub document: Arc<dyn Document>,
	pub switcher: Arc<dyn PlanSwitcher>,
}

/// Forwards link clicks without keeping the orchestrator alive.
struct LinkOpener(Weak<ChatOrchestrator>);

impl OpenChat for LinkOpener {
	fn open_chat(&self) {
		if let Some(orchestrator) = self.0.upgrade() {
			orchestrator.open_chat();
		}
	}
}

/// Top-level chat engine for one portal page.
pub struct ChatOrchestrator {
	this: Weak<ChatOrchestrator>,
	bootstrapper: Bootstrapper,
	controller: Arc<SessionLifecycleController>,
	bus: Arc<dyn WidgetBus>,
	enhancer: LinkEnhancer,
	member_id: Mutex<Option<String>>,
	subscriptions: Mutex<Vec<Subscription>>,
	pending_switch: Arc<Mutex<Option<String>>>,
	runtime: Mutex<Option<Handle>>,
}

impl ChatOrchestrator {
	pub fn new(config: &ChatConfig, parts: HostParts) -> Result<Arc<Self>> {
		config.validate()?;
		let HostParts {
			clock,
			source,
			loader,
			bus,
			document,
			switcher,
		} = parts;

		let sequencer = Arc::new(BootstrapSequencer::new(Arc::clone(&clock), config.policy()));
		let resolver = EligibilityResolver::new(clock);
		let plans = Arc::new(PlanBook::new());
		let controller = Arc::new(SessionLifecycleController::new(
			Arc::clone(&sequencer),
			resolver.clone(),
			plans.clone(),
			Arc::clone(&bus),
			switcher,
		));
		let bootstrapper = Bootstrapper::new(Arc::clone(&sequencer), resolver, plans, source, loader, config);

		Ok(Arc::new_cyclic(|this: &Weak<Self>| {
			let enhancer = LinkEnhancer::new(document, Arc::new(LinkOpener(this.clone())), sequencer, &config.trigger_phrases);
			Self {
				this: this.clone(),
				bootstrapper,
				controller,
				bus,
				enhancer,
				member_id: Mutex::new(None),
				subscriptions: Mutex::new(Vec::new()),
				pending_switch: Arc::new(Mutex::new(None)),
				runtime: Mutex::new(None),
			}
		}))
	}

	pub fn controller(&self) -> &Arc<SessionLifecycleController> {
		&self.controller
	}

	pub fn bootstrapper(&self) -> &Bootstrapper {
		&self.bootstrapper
	}

	pub fn session_state(&self) -> SessionState {
		self.controller.state()
	}

	/// Sets the member id sent with eligibility queries.
	pub fn set_member_id(&self, member_id: Option<String>) {
		*self.member_id.lock() = member_id;
	}

	fn request(&self, plan_id: &str) -> EligibilityRequest {
		let request = EligibilityRequest::new(plan_id);
		match self.member_id.lock().clone() {
			Some(member_id) => request.with_member(member_id),
			None => request,
		}
	}

	/// Brings chat up for `plan_id` and enhances trigger links under
	/// `root`. Links are left alone when chat is not available.
	///
	/// Must be called inside a tokio runtime. Calling it again re-scans and
	/// switches the current plan; routing is set up once.
	pub async fn start(&self, plan_id: &str, root: NodeId) -> Result<ChatMode> {
		*self.runtime.lock() = Some(Handle::current());
		self.controller.set_current_plan(Some(plan_id.to_string()));

		let chat_mode = self.bootstrapper.ensure_ready(&self.request(plan_id)).await?;
		self.bus.configure(&WidgetOptions {
			chat_mode,
			plan_id: Some(plan_id.to_string()),
			extra: Value::Null,
		})?;
		self.route_events();

		let enhanced = self.enhancer.scan(root);
		self.enhancer.watch(root);
		info!(target = "mchat.runtime", plan_id, %chat_mode, enhanced, "chat started");
		Ok(chat_mode)
	}

	fn route_events(&self) {
		let mut subscriptions = self.subscriptions.lock();
		if !subscriptions.is_empty() {
			return;
		}

		let controller = Arc::clone(&self.controller);
		let on_started: WidgetEventHandler = Arc::new(move |_: &Value| {
			controller.confirm_active();
		});

		let controller = Arc::clone(&self.controller);
		let on_failed: WidgetEventHandler = Arc::new(move |payload: &Value| {
			let failure: SessionFailedPayload = serde_json::from_value(payload.clone()).unwrap_or_default();
			let message = if failure.message.is_empty() { "session rejected by chat backend".to_string() } else { failure.message };
			controller.on_handshake_failure(&message);
		});

		let controller = Arc::clone(&self.controller);
		let on_ended: WidgetEventHandler = Arc::new(move |_: &Value| {
			controller.on_session_ended();
		});

		let controller = Arc::clone(&self.controller);
		let pending = Arc::clone(&self.pending_switch);
		let on_switch: WidgetEventHandler = Arc::new(move |payload: &Value| {
			let Ok(PlanSwitchPayload { plan_id }) = serde_json::from_value(payload.clone()) else {
				warn!(target = "mchat.runtime", %payload, "malformed plan switch request");
				return;
			};
			match controller.request_plan_switch(&plan_id) {
				PlanSwitchDecision::Allowed => controller.set_current_plan(Some(plan_id)),
				PlanSwitchDecision::AlreadyBound => {}
				PlanSwitchDecision::ConfirmationRequired { current, requested } => {
					info!(target = "mchat.runtime", current, requested, "plan switch awaits member confirmation");
					*pending.lock() = Some(requested);
				}
			}
		});

		subscriptions.push(self.bus.subscribe(EVENT_SESSION_STARTED, on_started));
		subscriptions.push(self.bus.subscribe(EVENT_SESSION_FAILED, on_failed));
		subscriptions.push(self.bus.subscribe(EVENT_SESSION_ENDED, on_ended));
		subscriptions.push(self.bus.subscribe(EVENT_PLAN_SWITCH_REQUESTED, on_switch));
	}

	/// Plan a pending switch request targets, if any.
	pub fn pending_plan_switch(&self) -> Option<String> {
		self.pending_switch.lock().clone()
	}

	/// Member confirmed a pending switch: ends the session, reopens the
	/// plan switcher and makes the requested plan current.
	pub fn confirm_plan_switch(&self) -> bool {
		let Some(plan_id) = self.pending_switch.lock().take() else {
			return false;
		};
		self.controller.confirm_plan_switch();
		self.controller.set_current_plan(Some(plan_id));
		true
	}

	/// Member declined a pending switch.
	pub fn cancel_plan_switch(&self) {
		self.pending_switch.lock().take();
	}

	/// Waits for readiness, then opens a session for `plan_id`.
	pub async fn open_chat_for(&self, plan_id: &str) -> Result<()> {
		self.bootstrapper.ensure_ready(&self.request(plan_id)).await?;
		self.controller.open(plan_id)
	}

	/// Stops watching for links and ends any session.
	pub fn shutdown(&self) {
		self.enhancer.stop();
		self.controller.close();
		self.subscriptions.lock().clear();
		debug!(target = "mchat.runtime", "chat orchestrator shut down");
	}
}

impl OpenChat for ChatOrchestrator {
	/// Opens chat for the current plan on a background task.
	fn open_chat(&self) {
		let Some(plan_id) = self.controller.current_plan() else {
			warn!(target = "mchat.runtime", "chat requested with no plan selected");
			return;
		};
		let Some(this) = self.this.upgrade() else {
			return;
		};
		let Some(runtime) = self.runtime.lock().clone().or_else(|| Handle::try_current().ok()) else {
			warn!(target = "mchat.runtime", "chat requested outside a runtime");
			return;
		};
		runtime.spawn(async move {
			if let Err(err) = this.open_chat_for(&plan_id).await {
				warn!(target = "mchat.runtime", plan_id, error = %err, "chat could not be opened");
			}
		});
	}
}
