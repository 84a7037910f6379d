//! In-memory widget bus for tests.
//!
//! # Example
//!
//! ```ignore
//! let bus = FakeWidgetBus::new();
//! let _sub = bus.subscribe("session-started", Arc::new(|_| println!("started")));
//! bus.emit("session-started", json!({}));
//! assert_eq!(bus.commands().len(), 0);
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use super::{Subscription, WidgetBus, WidgetEventHandler, WidgetOptions};
use crate::error::{ChatError, Result};

#[derive(Default)]
struct FakeBusState {
	configurations: Vec<WidgetOptions>,
	commands: Vec<(String, Value)>,
	handlers: HashMap<String, Vec<(u64, WidgetEventHandler)>>,
	next_id: u64,
	fail_commands: bool,
}

/// Records configuration and commands; lets tests emit events.
///
/// Clones share state, so a test can keep one clone as its controller
/// while the engine holds another.
#[derive(Clone, Default)]
pub struct FakeWidgetBus {
	state: Arc<Mutex<FakeBusState>>,
}

impl FakeWidgetBus {
	pub fn new() -> Self {
		Self::default()
	}

	/// Delivers `payload` to every current subscriber of `event`.
	/// Returns how many handlers ran.
	pub fn emit(&self, event: &str, payload: Value) -> usize {
		let handlers: Vec<WidgetEventHandler> = self
			.state
			.lock()
			.handlers
			.get(event)
			.map(|list| list.iter().map(|(_, handler)| Arc::clone(handler)).collect())
			.unwrap_or_default();
		for handler in &handlers {
			handler(&payload);
		}
		handlers.len()
	}

	pub fn commands(&self) -> Vec<(String, Value)> {
		self.state.lock().commands.clone()
	}

	/// Names of issued commands, in order.
	pub fn command_names(&self) -> Vec<String> {
		self.state.lock().commands.iter().map(|(name, _)| name.clone()).collect()
	}

	pub fn configurations(&self) -> Vec<WidgetOptions> {
		self.state.lock().configurations.clone()
	}

	pub fn subscriber_count(&self, event: &str) -> usize {
		self.state.lock().handlers.get(event).map_or(0, Vec::len)
	}

	/// Makes subsequent commands fail, simulating a broken vendor global.
	pub fn fail_commands(&self, fail: bool) {
		self.state.lock().fail_commands = fail;
	}
}

impl WidgetBus for FakeWidgetBus {
	fn configure(&self, options: &WidgetOptions) -> Result<()> {
		self.state.lock().configurations.push(options.clone());
		Ok(())
	}

	fn command(&self, name: &str, payload: Value) -> Result<()> {
		let mut state = self.state.lock();
		if state.fail_commands {
			return Err(ChatError::Widget(format!("command {name} rejected")));
		}
		state.commands.push((name.to_string(), payload));
		Ok(())
	}

	fn subscribe(&self, event: &str, handler: WidgetEventHandler) -> Subscription {
		let id = {
			let mut state = self.state.lock();
			state.next_id += 1;
			let id = state.next_id;
			state.handlers.entry(event.to_string()).or_default().push((id, handler));
			id
		};
		let state = Arc::downgrade(&self.state);
		let event = event.to_string();
		Subscription::new(move || {
			if let Some(state) = state.upgrade() {
				if let Some(list) = state.lock().handlers.get_mut(&event) {
					list.retain(|(handler_id, _)| *handler_id != id);
				}
			}
		})
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicUsize, Ordering};

	use serde_json::json;

	use super::*;

	#[test]
	fn emit_reaches_subscribers_until_released() {
		let bus = FakeWidgetBus::new();
		let hits = Arc::new(AtomicUsize::new(0));
		let counter = hits.clone();
		let subscription = bus.subscribe(
			"session-started",
			Arc::new(move |_: &Value| {
				counter.fetch_add(1, Ordering::SeqCst);
			}),
		);

		assert_eq!(bus.emit("session-started", json!({})), 1);
		assert_eq!(bus.emit("session-ended", json!({})), 0);
		subscription.release();
		assert_eq!(bus.emit("session-started", json!({})), 0);
		assert_eq!(hits.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn handlers_may_issue_commands_while_emitting() {
		let bus = FakeWidgetBus::new();
		let inner = bus.clone();
		let _subscription = bus.subscribe(
			"plan-switch-requested",
			Arc::new(move |_: &Value| {
				inner.command("end-session", Value::Null).unwrap();
			}),
		);
		bus.emit("plan-switch-requested", json!({ "planId": "B" }));
		assert_eq!(bus.command_names(), vec!["end-session".to_string()]);
	}

	#[test]
	fn failing_commands_are_reported() {
		let bus = FakeWidgetBus::new();
		bus.fail_commands(true);
		assert!(matches!(bus.command("start-session", Value::Null), Err(ChatError::Widget(_))));
		assert!(bus.commands().is_empty());
	}
}
