//! Engine configuration.
//!
//! Every field has a default matching the built-in policy, so an empty
//! JSON object is a valid configuration.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ChatError, Result};

/// Default eligibility cache lifetime.
pub const DEFAULT_ELIGIBILITY_TTL_SECS: u64 = 300;
/// Default time allowed for the widget script to signal.
pub const DEFAULT_SCRIPT_TIMEOUT_MS: u64 = 10_000;
/// Default number of script load attempts before sticky failure.
pub const DEFAULT_MAX_SCRIPT_ATTEMPTS: u32 = 3;

/// Link texts that open chat when clicked.
pub const DEFAULT_TRIGGER_PHRASES: &[&str] = &["start a chat", "chat with us", "chat now", "start chat", "live chat"];

/// Timing and retry policy applied by the bootstrap sequencer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootstrapPolicy {
	pub eligibility_ttl: Duration,
	pub script_timeout: Duration,
	pub max_script_attempts: u32,
}

impl Default for BootstrapPolicy {
	fn default() -> Self {
		Self {
			eligibility_ttl: Duration::from_secs(DEFAULT_ELIGIBILITY_TTL_SECS),
			script_timeout: Duration::from_millis(DEFAULT_SCRIPT_TIMEOUT_MS),
			max_script_attempts: DEFAULT_MAX_SCRIPT_ATTEMPTS,
		}
	}
}

/// On-disk configuration format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatConfig {
	pub eligibility_ttl_secs: u64,
	pub script_timeout_ms: u64,
	pub max_script_attempts: u32,
	/// Eligibility service endpoint.
	pub eligibility_endpoint: Option<String>,
	/// Vendor widget script resource.
	pub widget_script_url: Option<String>,
	pub trigger_phrases: Vec<String>,
	/// Chat mode used when the eligibility response does not say.
	pub cloud_chat: bool,
}

impl Default for ChatConfig {
	fn default() -> Self {
		Self {
			eligibility_ttl_secs: DEFAULT_ELIGIBILITY_TTL_SECS,
			script_timeout_ms: DEFAULT_SCRIPT_TIMEOUT_MS,
			max_script_attempts: DEFAULT_MAX_SCRIPT_ATTEMPTS,
			eligibility_endpoint: None,
			widget_script_url: None,
			trigger_phrases: DEFAULT_TRIGGER_PHRASES.iter().map(|p| p.to_string()).collect(),
			cloud_chat: false,
		}
	}
}

impl ChatConfig {
	pub fn from_json_str(json: &str) -> Result<Self> {
		let config: Self = serde_json::from_str(json)?;
		config.validate()?;
		Ok(config)
	}

	pub fn load(path: &Path) -> Result<Self> {
		let content = fs::read_to_string(path).map_err(|source| ChatError::ConfigRead {
			path: path.to_path_buf(),
			source,
		})?;
		Self::from_json_str(&content)
	}

	/// Loads `path` when given, otherwise the defaults.
	pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
		match path {
			Some(path) => Self::load(path),
			None => Ok(Self::default()),
		}
	}

	pub fn validate(&self) -> Result<()> {
		if self.max_script_attempts == 0 {
			return Err(ChatError::Config("maxScriptAttempts must be at least 1".to_string()));
		}
		if self.script_timeout_ms == 0 {
			return Err(ChatError::Config("scriptTimeoutMs must be positive".to_string()));
		}
		if self.trigger_phrases.iter().any(|p| p.trim().is_empty()) {
			return Err(ChatError::Config("triggerPhrases must not contain blank entries".to_string()));
		}
		Ok(())
	}

	pub fn policy(&self) -> BootstrapPolicy {
		BootstrapPolicy {
			eligibility_ttl: Duration::from_secs(self.eligibility_ttl_secs),
			script_timeout: Duration::from_millis(self.script_timeout_ms),
			max_script_attempts: self.max_script_attempts,
		}
	}
}

#[cfg(test)]
mod tests {
	use std::io::Write;

	use super::*;

	#[test]
	fn empty_object_yields_defaults() {
		let config = ChatConfig::from_json_str("{}").unwrap();
		assert_eq!(config, ChatConfig::default());
		assert_eq!(config.policy(), BootstrapPolicy::default());
		assert_eq!(config.trigger_phrases.len(), DEFAULT_TRIGGER_PHRASES.len());
	}

	#[test]
	fn partial_override_keeps_other_defaults() {
		let config = ChatConfig::from_json_str(r#"{"maxScriptAttempts": 5, "cloudChat": true}"#).unwrap();
		assert_eq!(config.max_script_attempts, 5);
		assert!(config.cloud_chat);
		assert_eq!(config.policy().script_timeout, Duration::from_secs(10));
	}

	#[test]
	fn zero_attempts_rejected() {
		let err = ChatConfig::from_json_str(r#"{"maxScriptAttempts": 0}"#).unwrap_err();
		assert!(matches!(err, ChatError::Config(_)));
	}

	#[test]
	fn loads_from_file() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		write!(file, r#"{{"eligibilityEndpoint": "https://portal.example/api/chat/eligibility"}}"#).unwrap();
		let config = ChatConfig::load(file.path()).unwrap();
		assert_eq!(config.eligibility_endpoint.as_deref(), Some("https://portal.example/api/chat/eligibility"));
	}

	#[test]
	fn missing_file_reports_path() {
		let err = ChatConfig::load(Path::new("/nonexistent/memberchat.json")).unwrap_err();
		assert!(err.to_string().contains("/nonexistent/memberchat.json"));
	}
}
