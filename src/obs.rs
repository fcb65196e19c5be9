//! Observability helpers shared by the orchestrator, the broker, and embedded clients.
//!
//! Every acquisition and every broker handler runs inside an `oauth2_nested_broker.flow`
//! span carrying `flow` and `stage` fields.
//!
//! # Feature Flags
//!
//! - Enable `metrics` to increment the `oauth2_nested_broker_flow_total` counter for every
//!   attempt/success/failure, labeled by `flow` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Flow kinds observed by the runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Cache lookup followed by one refresh-token renewal.
	Silent,
	/// Hidden-frame renewal against the identity provider session.
	SsoSilent,
	/// Popup-based interactive flow.
	Popup,
	/// Full-page redirect flow.
	Redirect,
	/// Processing of a redirect response on page load.
	RedirectCompletion,
	/// Embedded-to-broker handshake.
	Handshake,
	/// Broker handling of an auth request.
	BrokerAuth,
	/// Broker handling of a redirect request.
	BrokerRedirect,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::Silent => "silent",
			FlowKind::SsoSilent => "sso_silent",
			FlowKind::Popup => "popup",
			FlowKind::Redirect => "redirect",
			FlowKind::RedirectCompletion => "redirect_completion",
			FlowKind::Handshake => "handshake",
			FlowKind::BrokerAuth => "broker_auth",
			FlowKind::BrokerRedirect => "broker_redirect",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a flow.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Runs `fut` inside a flow span and records its attempt and outcome.
pub(crate) async fn observe<T, Fut>(kind: FlowKind, stage: &'static str, fut: Fut) -> Result<T>
where
	Fut: Future<Output = Result<T>>,
{
	let span = FlowSpan::new(kind, stage);

	record_flow_outcome(kind, FlowOutcome::Attempt);

	let result = span.instrument(fut).await;

	match &result {
		Ok(_) => record_flow_outcome(kind, FlowOutcome::Success),
		Err(_) => record_flow_outcome(kind, FlowOutcome::Failure),
	}

	result
}
