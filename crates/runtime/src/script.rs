//! Widget script loading.
//!
//! A script resource fires exactly one of two events: loaded or failed.
//! [`ScriptSignal`] models that pair as a oneshot channel whose sender is
//! consumed by whichever event fires first.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use memberchat::{ChatError, Result};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

#[derive(Debug)]
enum ScriptOutcome {
	Loaded,
	Failed(String),
}

/// Completion side of a script injection.
#[derive(Debug)]
pub struct ScriptSignal {
	rx: oneshot::Receiver<ScriptOutcome>,
}

/// Firing side of a script injection. Consumed by the first event.
#[derive(Debug)]
pub struct ScriptSignalSender {
	tx: oneshot::Sender<ScriptOutcome>,
}

impl ScriptSignal {
	pub fn channel() -> (ScriptSignalSender, ScriptSignal) {
		let (tx, rx) = oneshot::channel();
		(ScriptSignalSender { tx }, ScriptSignal { rx })
	}

	/// Waits for the resource's event. A sender dropped without firing
	/// counts as a failure.
	pub async fn wait(self) -> Result<()> {
		match self.rx.await {
			Ok(ScriptOutcome::Loaded) => Ok(()),
			Ok(ScriptOutcome::Failed(reason)) => Err(ChatError::ScriptLoad(reason)),
			Err(_) => Err(ChatError::ScriptLoad("script resource went away without signalling".to_string())),
		}
	}
}

impl ScriptSignalSender {
	pub fn loaded(self) {
		let _ = self.tx.send(ScriptOutcome::Loaded);
	}

	pub fn failed(self, reason: impl Into<String>) {
		let _ = self.tx.send(ScriptOutcome::Failed(reason.into()));
	}
}

/// Injects the vendor widget script.
pub trait ScriptLoader: Send + Sync {
	/// Starts loading `url` and returns the signal for this attempt.
	fn inject(&self, url: &str) -> ScriptSignal;
}

/// Loads the script over HTTP and signals on the response status.
///
/// Headless stand-in for a browser script element: it proves the resource
/// is reachable. Must be used inside a tokio runtime.
#[derive(Debug, Clone)]
pub struct HttpScriptLoader {
	client: reqwest::Client,
}

impl HttpScriptLoader {
	pub fn new(timeout: Duration) -> Result<Self> {
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| ChatError::ScriptLoad(format!("failed to create HTTP client: {e}")))?;
		Ok(Self { client })
	}
}

impl ScriptLoader for HttpScriptLoader {
	fn inject(&self, url: &str) -> ScriptSignal {
		let (sender, signal) = ScriptSignal::channel();
		let request = self.client.get(url);
		let url = url.to_string();
		tokio::spawn(async move {
			match request.send().await {
				Ok(response) if response.status().is_success() => {
					debug!(target = "mchat.runtime", %url, "widget script reachable");
					sender.loaded();
				}
				Ok(response) => sender.failed(format!("unexpected status {} for {url}", response.status())),
				Err(e) => sender.failed(format!("request to {url} failed: {e}")),
			}
		});
		signal
	}
}

/// Scripted behavior of one [`ScriptedLoader`] attempt.
#[derive(Debug, Clone)]
pub enum ScriptBehavior {
	Load,
	Fail(String),
	LoadAfter(Duration),
	/// Never signals.
	Hang,
}

#[derive(Default)]
struct ScriptedState {
	plan: VecDeque<ScriptBehavior>,
	injected: Vec<String>,
	hung: Vec<ScriptSignalSender>,
}

/// Loader that plays back a queue of behaviors, then loads successfully.
///
/// Clones share state. `LoadAfter` needs a tokio runtime.
#[derive(Clone, Default)]
pub struct ScriptedLoader {
	state: Arc<Mutex<ScriptedState>>,
}

impl ScriptedLoader {
	pub fn new(plan: impl IntoIterator<Item = ScriptBehavior>) -> Self {
		let loader = Self::default();
		loader.state.lock().plan.extend(plan);
		loader
	}

	/// URLs injected so far, one per attempt.
	pub fn injected(&self) -> Vec<String> {
		self.state.lock().injected.clone()
	}

	/// Fires success on every hung attempt, oldest first.
	pub fn release_hung(&self) {
		let hung = std::mem::take(&mut self.state.lock().hung);
		for sender in hung {
			sender.loaded();
		}
	}
}

impl ScriptLoader for ScriptedLoader {
	fn inject(&self, url: &str) -> ScriptSignal {
		let (sender, signal) = ScriptSignal::channel();
		let behavior = {
			let mut state = self.state.lock();
			state.injected.push(url.to_string());
			state.plan.pop_front().unwrap_or(ScriptBehavior::Load)
		};
		match behavior {
			ScriptBehavior::Load => sender.loaded(),
			ScriptBehavior::Fail(reason) => sender.failed(reason),
			ScriptBehavior::LoadAfter(delay) => {
				tokio::spawn(async move {
					tokio::time::sleep(delay).await;
					sender.loaded();
				});
			}
			ScriptBehavior::Hang => self.state.lock().hung.push(sender),
		}
		signal
	}
}
