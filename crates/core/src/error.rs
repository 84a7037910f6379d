//! Error types for the chat engine.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the engine.
pub type Result<T> = std::result::Result<T, ChatError>;

/// Errors surfaced by the chat engine.
///
/// Unparseable business hours are not represented here: the hours parser
/// returns `None` and the resolver applies its fail-closed policy instead.
#[derive(Debug, Error)]
pub enum ChatError {
	/// Network or decoding failure of the eligibility query.
	#[error("eligibility fetch failed: {0}")]
	EligibilityFetch(String),

	/// The widget script resource signalled failure.
	#[error("widget script failed to load: {0}")]
	ScriptLoad(String),

	/// The widget script did not signal within the configured timeout.
	#[error("widget script load timed out after {timeout_ms}ms")]
	ScriptLoadTimeout { timeout_ms: u64 },

	/// The vendor backend rejected the session start.
	#[error("chat session handshake failed: {0}")]
	SessionHandshake(String),

	/// Script loading exhausted its attempts; chat stays off until reset.
	#[error("chat unavailable: widget bootstrap failed after {attempts} attempts")]
	BootstrapUnavailable { attempts: u32 },

	/// Eligibility or the widget script has not completed yet.
	#[error("chat bootstrap still in progress")]
	BootstrapPending,

	/// The member cannot chat right now.
	#[error("chat not available: {reason}")]
	Ineligible { reason: String },

	/// No eligibility data is known for the requested plan.
	#[error("no eligibility data for plan {0}")]
	UnknownPlan(String),

	/// A session bound to another plan must be ended first.
	#[error("chat session is bound to plan {current}; end it before switching to {requested}")]
	PlanSwitchRequiresConfirmation { current: String, requested: String },

	/// The widget bus rejected a command or configuration.
	#[error("widget bus error: {0}")]
	Widget(String),

	/// Invalid configuration value.
	#[error("invalid configuration: {0}")]
	Config(String),

	/// Configuration file could not be read.
	#[error("failed to read {path}: {source}")]
	ConfigRead {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error(transparent)]
	Json(#[from] serde_json::Error),
}

impl ChatError {
	/// Whether a user-initiated retry can reasonably succeed.
	pub fn is_retryable(&self) -> bool {
		matches!(
			self,
			ChatError::EligibilityFetch(_) | ChatError::SessionHandshake(_) | ChatError::BootstrapPending | ChatError::ScriptLoadTimeout { .. }
		)
	}
}
