//! Application variants composed over one orchestrator.

// self
use crate::{
	_prelude::*,
	auth::ClientId,
	broker::Broker,
	embedded::EmbeddedClient,
	flows::{AcquisitionResult, Orchestrator, RedirectOutcome, TokenRequest},
};

/// How an application acquires tokens.
///
/// Every variant exposes the same calls; only the strategy wrapping the orchestrator differs.
#[derive(Clone, Debug)]
pub enum Application {
	/// Runs every acquisition locally.
	Standalone {
		/// Client the app is registered with.
		client_id: ClientId,
		/// Local orchestrator.
		orchestrator: Arc<Orchestrator>,
	},
	/// Top-level app that also serves embedded apps.
	Broker(Arc<Broker>),
	/// Dependent app delegating to a broker once bonded.
	Embedded(Arc<EmbeddedClient>),
}
impl Application {
	/// Creates a standalone application.
	pub fn standalone(client_id: ClientId, orchestrator: Arc<Orchestrator>) -> Self {
		Self::Standalone { client_id, orchestrator }
	}

	/// Acquires a token without interaction.
	pub async fn acquire_token_silent(&self, request: &TokenRequest) -> Result<AcquisitionResult> {
		match self {
			Self::Standalone { client_id, orchestrator } =>
				orchestrator.acquire_token_silent_or_throw(client_id, request).await,
			Self::Broker(broker) =>
				broker.orchestrator().acquire_token_silent_or_throw(&broker.config().client_id, request).await,
			Self::Embedded(client) => client.acquire_token_silent(request).await,
		}
	}

	/// Acquires a token through a hidden frame.
	pub async fn sso_silent(&self, request: &TokenRequest) -> Result<AcquisitionResult> {
		match self {
			Self::Standalone { client_id, orchestrator } =>
				orchestrator.sso_silent(client_id, request).await,
			Self::Broker(broker) =>
				broker.orchestrator().sso_silent(&broker.config().client_id, request).await,
			Self::Embedded(client) => client.sso_silent(request).await,
		}
	}

	/// Acquires a token through a popup.
	pub async fn acquire_token_popup(&self, request: &TokenRequest) -> Result<AcquisitionResult> {
		match self {
			Self::Standalone { client_id, orchestrator } =>
				orchestrator.acquire_token_popup(client_id, request).await,
			Self::Broker(broker) =>
				broker.orchestrator().acquire_token_popup(&broker.config().client_id, request).await,
			Self::Embedded(client) => client.acquire_token_popup(request).await,
		}
	}

	/// Starts a redirect flow.
	pub async fn acquire_token_redirect(&self, request: &TokenRequest) -> Result<()> {
		match self {
			Self::Standalone { client_id, orchestrator } =>
				orchestrator.acquire_token_redirect(client_id, request, None).await,
			Self::Broker(broker) =>
				broker
					.orchestrator()
					.acquire_token_redirect(&broker.config().client_id, request, None)
					.await,
			Self::Embedded(client) => client.acquire_token_redirect(request).await,
		}
	}

	/// Completes a pending redirect.
	///
	/// A broker completing a redirect it ran for an embedded app parks the result for that app
	/// and resolves to `None` here.
	pub async fn handle_redirect_promise(&self) -> Result<Option<AcquisitionResult>> {
		match self {
			Self::Standalone { orchestrator, .. } => Ok(orchestrator
				.handle_redirect_promise()
				.await?
				.map(|outcome| outcome.result)),
			Self::Broker(broker) => Ok(broker.handle_redirect_promise().await?.and_then(
				|RedirectOutcome { result, requester }| requester.is_none().then_some(result),
			)),
			Self::Embedded(client) => client.handle_redirect_promise().await,
		}
	}
}
