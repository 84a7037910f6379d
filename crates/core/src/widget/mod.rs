//! Adapter over the vendor chat widget.
//!
//! The vendor exposes a duck-typed global with `configure`, `command` and
//! `subscribe`. The engine sees it only through [`WidgetBus`], so the real
//! binding and the test double are interchangeable.

use std::sync::Arc;

pub use memberchat_protocol::widget::{
	COMMAND_END_SESSION, COMMAND_START_SESSION, EVENT_PLAN_SWITCH_REQUESTED, EVENT_SESSION_ENDED, EVENT_SESSION_FAILED, EVENT_SESSION_STARTED,
	WidgetOptions,
};
use serde_json::Value;

use crate::error::Result;
pub use crate::subscription::Subscription;

pub mod fake;

pub use fake::FakeWidgetBus;

/// Callback for a named widget event.
pub type WidgetEventHandler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Narrow capability surface of the vendor widget.
pub trait WidgetBus: Send + Sync {
	/// Applies widget options. Called once the script has loaded.
	fn configure(&self, options: &WidgetOptions) -> Result<()>;

	/// Issues a named command with an opaque payload.
	fn command(&self, name: &str, payload: Value) -> Result<()>;

	/// Registers `handler` for `event` until the returned guard is released.
	fn subscribe(&self, event: &str, handler: WidgetEventHandler) -> Subscription;
}
