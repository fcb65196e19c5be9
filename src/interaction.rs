//! Interaction collaborator: popup, redirect, and hidden-frame navigation.
//!
//! Navigation mechanics live with the host. An [`InteractionClient`] drives the browser, runs
//! the authorization-code exchange with the PKCE verifier it was handed, and reports the
//! resulting [`TokenGrant`]. Redirect flows cannot return directly because the page unloads;
//! their outcome is picked up on the next load through [`InteractionClient::handle_redirect`].

// self
use crate::{
	_prelude::*,
	auth::{ClientId, CorrelationId},
	crypto::PkcePair,
	flows::TokenRequest,
	network::TokenGrant,
	protocol::Origin,
};

/// Boxed future returned by [`InteractionClient`] operations.
pub type InteractionFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Everything a navigation needs to start an authorization request.
#[derive(Clone, Debug)]
pub struct InteractiveRequest {
	/// Client the authorization is requested for.
	pub client_id: ClientId,
	/// Authorization endpoint resolved for the request's authority.
	pub authorization_endpoint: Url,
	/// The acquisition request.
	pub request: TokenRequest,
	/// PKCE pair generated for this attempt.
	pub pkce: PkcePair,
	/// Opaque state value that must round-trip through the identity provider.
	pub state: String,
	/// Correlation id of the attempt.
	pub correlation_id: CorrelationId,
	/// Embedded app that asked the broker for this flow, if any.
	pub requester: Option<Origin>,
}

/// Redirect outcome recovered after the page reloads.
#[derive(Clone, Debug)]
pub struct RedirectCompletion {
	/// Tokens issued by the code exchange.
	pub grant: TokenGrant,
	/// Client the redirect was started for.
	pub client_id: ClientId,
	/// Authority the redirect was started against.
	pub authority: String,
	/// Correlation id of the original request.
	pub correlation_id: CorrelationId,
	/// Embedded app that started the redirect through the broker, if any.
	pub requester: Option<Origin>,
}

/// Browser navigation capability consumed by interactive flows.
pub trait InteractionClient
where
	Self: Send + Sync,
{
	/// Opens a popup and resolves once it returned a grant.
	fn popup<'a>(&'a self, request: &'a InteractiveRequest) -> InteractionFuture<'a, TokenGrant>;

	/// Runs the authorization request in a hidden frame, relying on the provider session.
	fn silent_iframe<'a>(
		&'a self,
		request: &'a InteractiveRequest,
	) -> InteractionFuture<'a, TokenGrant>;

	/// Persists `request` and navigates the top frame away.
	fn redirect<'a>(&'a self, request: &'a InteractiveRequest) -> InteractionFuture<'a, ()>;

	/// Completes a redirect that returned to this page, if one did.
	fn handle_redirect(&self) -> InteractionFuture<'_, Option<RedirectCompletion>>;
}
