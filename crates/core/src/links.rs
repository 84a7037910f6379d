//! Trigger-link enhancement.
//!
//! Portal pages carry plain anchors such as "Start a chat". The enhancer
//! finds them by text, intercepts their clicks to open chat instead of
//! navigating, and keeps doing so for content added later.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::bootstrap::BootstrapSequencer;
use crate::dom::{ClickEvent, ClickHandler, ClickHandlerRef, Document, NodeId};
use crate::subscription::Subscription;

/// What a trigger link does when clicked.
pub trait OpenChat: Send + Sync {
	fn open_chat(&self);
}

/// Trims, lower-cases and collapses internal whitespace.
pub fn normalize_link_text(text: &str) -> String {
	text.split_whitespace().map(str::to_lowercase).collect::<Vec<_>>().join(" ")
}

struct ChatLinkInterceptor {
	previous: Option<ClickHandlerRef>,
	opener: Arc<dyn OpenChat>,
}

impl ClickHandler for ChatLinkInterceptor {
	fn handle(&self, event: &mut ClickEvent) {
		event.prevent_default();
		if let Some(previous) = &self.previous {
			previous.handle(event);
		}
		self.opener.open_chat();
	}
}

struct Scanner {
	document: Arc<dyn Document>,
	opener: Arc<dyn OpenChat>,
	sequencer: Arc<BootstrapSequencer>,
	phrases: HashSet<String>,
	/// Serializes scans so two passes cannot both claim one element.
	scanning: Mutex<()>,
}

impl Scanner {
	fn scan(&self, root: NodeId) -> usize {
		let _scanning = self.scanning.lock();
		let mut enhanced = 0;
		for element in self.document.elements_under(root) {
			if !element.is_anchor_like() || self.document.has_marker(element.id) {
				continue;
			}
			if !self.phrases.contains(&normalize_link_text(&element.text)) {
				continue;
			}
			let interceptor = ChatLinkInterceptor {
				previous: self.document.click_handler(element.id),
				opener: Arc::clone(&self.opener),
			};
			self.document.set_click_handler(element.id, Arc::new(interceptor));
			self.document.set_marker(element.id);
			trace!(target = "mchat.links", element = %element.id, text = %element.text, "trigger link enhanced");
			enhanced += 1;
		}
		if enhanced > 0 {
			debug!(target = "mchat.links", %root, enhanced, "enhanced trigger links");
		}
		self.sequencer.mark_dom_enhanced(enhanced);
		enhanced
	}
}

struct Watcher {
	task: JoinHandle<()>,
	subscription: Subscription,
}

/// Attaches chat-opening click interceptors to trigger links.
pub struct LinkEnhancer {
	scanner: Arc<Scanner>,
	watcher: Mutex<Option<Watcher>>,
}

impl LinkEnhancer {
	/// `phrases` are normalized before matching; an empty set enhances
	/// nothing.
	pub fn new<I, S>(document: Arc<dyn Document>, opener: Arc<dyn OpenChat>, sequencer: Arc<BootstrapSequencer>, phrases: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		let phrases = phrases.into_iter().map(|phrase| normalize_link_text(phrase.as_ref())).filter(|phrase| !phrase.is_empty()).collect();
		Self {
			scanner: Arc::new(Scanner {
				document,
				opener,
				sequencer,
				phrases,
				scanning: Mutex::new(()),
			}),
			watcher: Mutex::new(None),
		}
	}

	/// Enhances unmarked trigger links under `root`. Returns how many were
	/// newly enhanced.
	pub fn scan(&self, root: NodeId) -> usize {
		self.scanner.scan(root)
	}

	/// Re-scans whenever elements are added under `root`. Replaces any
	/// previous watch. Must be called inside a tokio runtime.
	pub fn watch(&self, root: NodeId) {
		let (mut records, subscription) = self.scanner.document.observe(root).into_parts();
		let scanner = Arc::clone(&self.scanner);
		let task = tokio::spawn(async move {
			while let Some(record) = records.recv().await {
				if record.added.is_empty() {
					continue;
				}
				scanner.scan(record.target);
			}
		});
		let previous = self.watcher.lock().replace(Watcher { task, subscription });
		if let Some(previous) = previous {
			Self::release(previous);
		}
		debug!(target = "mchat.links", %root, "watching for trigger links");
	}

	pub fn is_watching(&self) -> bool {
		self.watcher.lock().is_some()
	}

	/// Stops watching. Safe to call repeatedly.
	pub fn stop(&self) {
		let watcher = self.watcher.lock().take();
		if let Some(watcher) = watcher {
			Self::release(watcher);
			debug!(target = "mchat.links", "stopped watching for trigger links");
		}
	}

	fn release(watcher: Watcher) {
		watcher.subscription.release();
		watcher.task.abort();
	}
}

impl Drop for LinkEnhancer {
	fn drop(&mut self) {
		self.stop();
	}
}
