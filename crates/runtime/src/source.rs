//! Eligibility query sources.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use memberchat::{ChatError, Result};
use memberchat_protocol::{EligibilityRequest, EligibilityResponse};
use parking_lot::Mutex;
use tracing::debug;

/// Boxed future returned by [`EligibilitySource::fetch`].
pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = Result<EligibilityResponse>> + Send + 'a>>;

/// Answers eligibility queries for a plan/member pair.
pub trait EligibilitySource: Send + Sync {
	fn fetch<'a>(&'a self, request: &'a EligibilityRequest) -> FetchFuture<'a>;
}

/// Queries the portal's eligibility service over HTTP.
///
/// Sends `POST <endpoint>` with a JSON [`EligibilityRequest`] body and
/// expects a JSON [`EligibilityResponse`].
#[derive(Debug, Clone)]
pub struct HttpEligibilitySource {
	client: reqwest::Client,
	endpoint: String,
}

impl HttpEligibilitySource {
	pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| ChatError::EligibilityFetch(format!("failed to create HTTP client: {e}")))?;
		Ok(Self {
			client,
			endpoint: endpoint.into(),
		})
	}

	pub fn endpoint(&self) -> &str {
		&self.endpoint
	}

	async fn query(&self, request: &EligibilityRequest) -> Result<EligibilityResponse> {
		debug!(target = "mchat.runtime", endpoint = %self.endpoint, plan_id = %request.plan_id, "querying eligibility");
		let response = self
			.client
			.post(&self.endpoint)
			.json(request)
			.send()
			.await
			.map_err(|e| ChatError::EligibilityFetch(format!("request to {} failed: {e}", self.endpoint)))?;

		let status = response.status();
		if !status.is_success() {
			return Err(ChatError::EligibilityFetch(format!("unexpected status {status} from {}", self.endpoint)));
		}

		response
			.json::<EligibilityResponse>()
			.await
			.map_err(|e| ChatError::EligibilityFetch(format!("failed to parse eligibility response: {e}")))
	}
}

impl EligibilitySource for HttpEligibilitySource {
	fn fetch<'a>(&'a self, request: &'a EligibilityRequest) -> FetchFuture<'a> {
		Box::pin(self.query(request))
	}
}

#[derive(Default)]
struct StaticState {
	plans: HashMap<String, EligibilityResponse>,
	failure: Option<String>,
}

/// Canned responses keyed by plan id, for tests and offline runs.
///
/// Unknown plans answer ineligible. Clones share state.
#[derive(Clone, Default)]
pub struct StaticEligibilitySource {
	state: Arc<Mutex<StaticState>>,
	delay: Option<Duration>,
	calls: Arc<AtomicUsize>,
}

impl StaticEligibilitySource {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_plan(self, plan_id: impl Into<String>, response: EligibilityResponse) -> Self {
		self.set_plan(plan_id, response);
		self
	}

	/// Delays every answer, to exercise in-flight behavior.
	pub fn with_delay(mut self, delay: Duration) -> Self {
		self.delay = Some(delay);
		self
	}

	pub fn set_plan(&self, plan_id: impl Into<String>, response: EligibilityResponse) {
		self.state.lock().plans.insert(plan_id.into(), response);
	}

	/// Makes every fetch fail with `message` until cleared with `None`.
	pub fn set_failure(&self, message: Option<&str>) {
		self.state.lock().failure = message.map(str::to_string);
	}

	/// Number of fetches served.
	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	async fn answer(&self, request: &EligibilityRequest) -> Result<EligibilityResponse> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		if let Some(delay) = self.delay {
			tokio::time::sleep(delay).await;
		}
		let state = self.state.lock();
		if let Some(message) = &state.failure {
			return Err(ChatError::EligibilityFetch(message.clone()));
		}
		Ok(state.plans.get(&request.plan_id).cloned().unwrap_or_else(|| EligibilityResponse {
			is_eligible: false,
			reason: Some(format!("unknown plan {}", request.plan_id)),
			business_hours: String::new(),
			cloud_chat: None,
		}))
	}
}

impl EligibilitySource for StaticEligibilitySource {
	fn fetch<'a>(&'a self, request: &'a EligibilityRequest) -> FetchFuture<'a> {
		Box::pin(self.answer(request))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn open_all_week() -> EligibilityResponse {
		EligibilityResponse {
			is_eligible: true,
			reason: None,
			business_hours: "24/7".to_string(),
			cloud_chat: Some(true),
		}
	}

	#[tokio::test]
	async fn static_source_serves_known_plans() {
		let source = StaticEligibilitySource::new().with_plan("GOLD", open_all_week());
		let response = source.fetch(&EligibilityRequest::new("GOLD")).await.unwrap();
		assert!(response.is_eligible);
		assert_eq!(response.cloud_chat, Some(true));

		let unknown = source.fetch(&EligibilityRequest::new("TIN")).await.unwrap();
		assert!(!unknown.is_eligible);
		assert_eq!(source.calls(), 2);
	}

	#[tokio::test]
	async fn static_source_failure_toggle() {
		let source = StaticEligibilitySource::new().with_plan("GOLD", open_all_week());
		source.set_failure(Some("service down"));
		let err = source.fetch(&EligibilityRequest::new("GOLD")).await.unwrap_err();
		assert!(matches!(err, ChatError::EligibilityFetch(ref msg) if msg == "service down"));

		source.set_failure(None);
		assert!(source.fetch(&EligibilityRequest::new("GOLD")).await.is_ok());
	}

	#[tokio::test]
	async fn http_source_reports_connection_failure() {
		let source = HttpEligibilitySource::new("http://127.0.0.1:9/eligibility", Duration::from_millis(200)).unwrap();
		let err = source.fetch(&EligibilityRequest::new("GOLD")).await.unwrap_err();
		assert!(matches!(err, ChatError::EligibilityFetch(_)));
		assert!(!err.to_string().is_empty());
	}
}
