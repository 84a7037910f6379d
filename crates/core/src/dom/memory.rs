//! In-memory [`Document`] for tests and headless runs.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{ClickEvent, ClickHandlerRef, Document, ElementInfo, MutationRecord, MutationSubscription, NodeId};
use crate::subscription::Subscription;

struct Node {
	tag: String,
	role: Option<String>,
	text: String,
	parent: Option<NodeId>,
	children: Vec<NodeId>,
	marked: bool,
	handler: Option<ClickHandlerRef>,
	handler_assignments: usize,
}

impl Node {
	fn new(tag: &str, role: Option<&str>, text: &str, parent: Option<NodeId>) -> Self {
		Self {
			tag: tag.to_ascii_lowercase(),
			role: role.map(str::to_string),
			text: text.to_string(),
			parent,
			children: Vec::new(),
			marked: false,
			handler: None,
			handler_assignments: 0,
		}
	}
}

struct Observer {
	id: u64,
	root: NodeId,
	sender: mpsc::UnboundedSender<MutationRecord>,
}

struct DocState {
	nodes: HashMap<NodeId, Node>,
	next_node: u64,
	observers: Vec<Observer>,
	next_observer: u64,
}

impl DocState {
	fn is_within(&self, node: NodeId, root: NodeId) -> bool {
		let mut cursor = Some(node);
		while let Some(current) = cursor {
			if current == root {
				return true;
			}
			cursor = self.nodes.get(&current).and_then(|node| node.parent);
		}
		false
	}

	fn text_content(&self, id: NodeId) -> String {
		let Some(node) = self.nodes.get(&id) else {
			return String::new();
		};
		let mut text = node.text.clone();
		for child in &node.children {
			text.push_str(&self.text_content(*child));
		}
		text
	}

	fn collect(&self, id: NodeId, out: &mut Vec<ElementInfo>) {
		let Some(node) = self.nodes.get(&id) else {
			return;
		};
		out.push(ElementInfo {
			id,
			tag: node.tag.clone(),
			role: node.role.clone(),
			text: self.text_content(id),
		});
		for child in &node.children {
			self.collect(*child, out);
		}
	}
}

/// Tree of elements with observable insertions.
///
/// Clones share the same tree.
#[derive(Clone)]
pub struct MemoryDocument {
	state: Arc<Mutex<DocState>>,
	root: NodeId,
}

impl Default for MemoryDocument {
	fn default() -> Self {
		Self::new()
	}
}

impl MemoryDocument {
	/// Creates a document holding a single `body` element.
	pub fn new() -> Self {
		let root = NodeId(0);
		let mut nodes = HashMap::new();
		nodes.insert(root, Node::new("body", None, "", None));
		Self {
			state: Arc::new(Mutex::new(DocState {
				nodes,
				next_node: 1,
				observers: Vec::new(),
				next_observer: 0,
			})),
			root,
		}
	}

	pub fn root(&self) -> NodeId {
		self.root
	}

	/// Appends an element under `parent` and notifies observers.
	///
	/// # Panics
	///
	/// Panics if `parent` is not in the document.
	pub fn append(&self, parent: NodeId, tag: &str, text: &str) -> NodeId {
		self.insert(parent, tag, None, text)
	}

	pub fn append_with_role(&self, parent: NodeId, tag: &str, role: &str, text: &str) -> NodeId {
		self.insert(parent, tag, Some(role), text)
	}

	fn insert(&self, parent: NodeId, tag: &str, role: Option<&str>, text: &str) -> NodeId {
		let mut state = self.state.lock();
		let id = NodeId(state.next_node);
		state.next_node += 1;
		state
			.nodes
			.get_mut(&parent)
			.unwrap_or_else(|| panic!("parent {parent} is not in the document"))
			.children
			.push(id);
		state.nodes.insert(id, Node::new(tag, role, text, Some(parent)));

		let interested: Vec<usize> = (0..state.observers.len()).filter(|&i| state.is_within(parent, state.observers[i].root)).collect();
		let record = MutationRecord { target: parent, added: vec![id] };
		let mut closed = Vec::new();
		for index in interested {
			let observer = &state.observers[index];
			if observer.sender.send(record.clone()).is_err() {
				closed.push(observer.id);
			}
		}
		state.observers.retain(|observer| !closed.contains(&observer.id));
		id
	}

	/// Dispatches a click to the element's current handler.
	pub fn click(&self, id: NodeId) -> ClickEvent {
		let handler = self.state.lock().nodes.get(&id).and_then(|node| node.handler.clone());
		let mut event = ClickEvent::new();
		if let Some(handler) = handler {
			handler.handle(&mut event);
		}
		event
	}

	/// How many times a click handler has been assigned to `id`.
	pub fn handler_assignments(&self, id: NodeId) -> usize {
		self.state.lock().nodes.get(&id).map_or(0, |node| node.handler_assignments)
	}

	pub fn observer_count(&self) -> usize {
		self.state.lock().observers.len()
	}
}

impl Document for MemoryDocument {
	fn elements_under(&self, root: NodeId) -> Vec<ElementInfo> {
		let state = self.state.lock();
		let mut out = Vec::new();
		state.collect(root, &mut out);
		out
	}

	fn has_marker(&self, element: NodeId) -> bool {
		self.state.lock().nodes.get(&element).is_some_and(|node| node.marked)
	}

	fn set_marker(&self, element: NodeId) {
		if let Some(node) = self.state.lock().nodes.get_mut(&element) {
			node.marked = true;
		}
	}

	fn click_handler(&self, element: NodeId) -> Option<ClickHandlerRef> {
		self.state.lock().nodes.get(&element).and_then(|node| node.handler.clone())
	}

	fn set_click_handler(&self, element: NodeId, handler: ClickHandlerRef) {
		if let Some(node) = self.state.lock().nodes.get_mut(&element) {
			node.handler = Some(handler);
			node.handler_assignments += 1;
		}
	}

	fn observe(&self, root: NodeId) -> MutationSubscription {
		let (sender, receiver) = mpsc::unbounded_channel();
		let id = {
			let mut state = self.state.lock();
			let id = state.next_observer;
			state.next_observer += 1;
			state.observers.push(Observer { id, root, sender });
			id
		};
		let state = Arc::downgrade(&self.state);
		let guard = Subscription::new(move || {
			if let Some(state) = state.upgrade() {
				state.lock().observers.retain(|observer| observer.id != id);
			}
		});
		MutationSubscription::new(receiver, guard)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn elements_include_descendant_text_in_order() {
		let doc = MemoryDocument::new();
		let nav = doc.append(doc.root(), "nav", "");
		let link = doc.append(nav, "A", "Chat ");
		doc.append(link, "span", "now");

		let elements = doc.elements_under(nav);
		assert_eq!(elements.len(), 3);
		assert_eq!(elements[0].id, nav);
		assert_eq!(elements[1].tag, "a");
		assert_eq!(elements[1].text, "Chat now");
	}

	#[tokio::test]
	async fn observers_only_see_their_subtree() {
		let doc = MemoryDocument::new();
		let left = doc.append(doc.root(), "div", "");
		let right = doc.append(doc.root(), "div", "");
		let mut subscription = doc.observe(left);

		doc.append(right, "a", "ignored");
		let added = doc.append(left, "a", "seen");

		let record = subscription.recv().await.unwrap();
		assert_eq!(record, MutationRecord { target: left, added: vec![added] });
	}

	#[test]
	fn releasing_the_guard_unregisters() {
		let doc = MemoryDocument::new();
		let subscription = doc.observe(doc.root());
		assert_eq!(doc.observer_count(), 1);
		let (_records, guard) = subscription.into_parts();
		guard.release();
		assert_eq!(doc.observer_count(), 0);
	}

	#[test]
	fn click_without_handler_does_not_prevent_default() {
		let doc = MemoryDocument::new();
		let link = doc.append(doc.root(), "a", "Help");
		assert!(!doc.click(link).default_prevented());
	}
}
