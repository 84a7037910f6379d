//! Widget bus vocabulary.
//!
//! The vendor widget is opaque; the engine only knows the names of the
//! commands it issues and the events it reacts to.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Emitted once the vendor backend accepted a session.
pub const EVENT_SESSION_STARTED: &str = "session-started";
/// Emitted when the vendor backend rejected a session start.
pub const EVENT_SESSION_FAILED: &str = "session-failed";
/// Emitted when the member or agent ended the conversation.
pub const EVENT_SESSION_ENDED: &str = "session-ended";
/// Emitted when the member asks to change plan from inside the widget.
pub const EVENT_PLAN_SWITCH_REQUESTED: &str = "plan-switch-requested";

/// Asks the widget to open a conversation for a plan.
pub const COMMAND_START_SESSION: &str = "start-session";
/// Asks the widget to tear down the current conversation.
pub const COMMAND_END_SESSION: &str = "end-session";

/// Which vendor product a session is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
	#[default]
	Legacy,
	Cloud,
}

impl std::fmt::Display for ChatMode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			ChatMode::Legacy => f.write_str("legacy"),
			ChatMode::Cloud => f.write_str("cloud"),
		}
	}
}

/// Options handed to the widget's `configure` entry point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetOptions {
	pub chat_mode: ChatMode,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub plan_id: Option<String>,
	/// Vendor-specific settings passed through untouched.
	#[serde(default, skip_serializing_if = "Value::is_null")]
	pub extra: Value,
}

/// Payload of the `start-session` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionPayload {
	pub plan_id: String,
	pub chat_mode: ChatMode,
}

/// Payload of `session-failed`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionFailedPayload {
	#[serde(default)]
	pub message: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub code: Option<String>,
}

/// Payload of `plan-switch-requested`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSwitchPayload {
	pub plan_id: String,
}
