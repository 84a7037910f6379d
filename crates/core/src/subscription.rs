//! Drop-to-release subscription guard.

use std::fmt;

/// Releases an event subscription when dropped or when [`Subscription::release`]
/// is called, whichever comes first.
#[must_use = "dropping a subscription releases it immediately"]
pub struct Subscription {
	release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
	pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
		Self {
			release: Some(Box::new(release)),
		}
	}

	pub fn release(mut self) {
		self.release_now();
	}

	fn release_now(&mut self) {
		if let Some(release) = self.release.take() {
			release();
		}
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		self.release_now();
	}
}

impl fmt::Debug for Subscription {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Subscription").field("active", &self.release.is_some()).finish()
	}
}
