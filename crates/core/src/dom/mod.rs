//! Minimal document model used by link enhancement.
//!
//! Only what trigger-link discovery needs: element enumeration with text,
//! a per-element marker, click handler slots and an element-added stream.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::subscription::Subscription;

pub mod memory;

pub use memory::MemoryDocument;

/// Opaque element handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#{}", self.0)
	}
}

/// Snapshot of one element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementInfo {
	pub id: NodeId,
	/// Lower-case tag name.
	pub tag: String,
	pub role: Option<String>,
	/// Text content including descendants.
	pub text: String,
}

impl ElementInfo {
	/// Anchors, buttons, and anything with a link or button role.
	pub fn is_anchor_like(&self) -> bool {
		matches!(self.tag.as_str(), "a" | "button") || matches!(self.role.as_deref(), Some("link" | "button"))
	}
}

/// Click event handed to handlers.
#[derive(Debug, Default)]
pub struct ClickEvent {
	default_prevented: bool,
}

impl ClickEvent {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn prevent_default(&mut self) {
		self.default_prevented = true;
	}

	pub fn default_prevented(&self) -> bool {
		self.default_prevented
	}
}

pub trait ClickHandler: Send + Sync {
	fn handle(&self, event: &mut ClickEvent);
}

impl<F> ClickHandler for F
where
	F: Fn(&mut ClickEvent) + Send + Sync,
{
	fn handle(&self, event: &mut ClickEvent) {
		self(event)
	}
}

pub type ClickHandlerRef = Arc<dyn ClickHandler>;

/// Element nodes added under `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
	pub target: NodeId,
	pub added: Vec<NodeId>,
}

/// Stream of [`MutationRecord`]s plus the guard that keeps it registered.
#[derive(Debug)]
pub struct MutationSubscription {
	records: mpsc::UnboundedReceiver<MutationRecord>,
	guard: Subscription,
}

impl MutationSubscription {
	pub fn new(records: mpsc::UnboundedReceiver<MutationRecord>, guard: Subscription) -> Self {
		Self { records, guard }
	}

	pub async fn recv(&mut self) -> Option<MutationRecord> {
		self.records.recv().await
	}

	/// Splits the stream from its guard so the guard can be released
	/// independently of whoever drains the stream.
	pub fn into_parts(self) -> (mpsc::UnboundedReceiver<MutationRecord>, Subscription) {
		(self.records, self.guard)
	}
}

/// Document capabilities consumed by [`crate::links::LinkEnhancer`].
pub trait Document: Send + Sync {
	/// `root` and its descendants in document order.
	fn elements_under(&self, root: NodeId) -> Vec<ElementInfo>;

	fn has_marker(&self, element: NodeId) -> bool;

	fn set_marker(&self, element: NodeId);

	fn click_handler(&self, element: NodeId) -> Option<ClickHandlerRef>;

	fn set_click_handler(&self, element: NodeId, handler: ClickHandlerRef);

	/// Streams element additions anywhere under `root`.
	fn observe(&self, root: NodeId) -> MutationSubscription;
}
