//! Hidden-frame, popup, and redirect acquisitions.
//!
//! Popup and redirect flows share one UI lock: browsers cannot run two interactive
//! authorizations at once, so a second attempt fails fast with
//! [`Error::InteractionInProgress`] instead of queueing behind the first.

// self
use crate::{
	_prelude::*,
	auth::ClientId,
	flows::{AcquisitionResult, Orchestrator, TokenRequest},
	interaction::InteractiveRequest,
	obs::{self, FlowKind},
	protocol::Origin,
};

/// Redirect result recovered on page load.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RedirectOutcome {
	/// Tokens issued by the redirect.
	pub result: AcquisitionResult,
	/// Embedded app the broker started the redirect for, if any.
	pub requester: Option<Origin>,
}

impl Orchestrator {
	/// Renews through a hidden frame using the identity provider's session.
	pub async fn sso_silent(
		&self,
		client_id: &ClientId,
		request: &TokenRequest,
	) -> Result<AcquisitionResult> {
		obs::observe(FlowKind::SsoSilent, "sso_silent", async move {
			let interactive = self.interactive_request(client_id, request, None).await?;
			let grant = self.interaction.silent_iframe(&interactive).await?;

			self.commit_grant(client_id, &request.authority, grant, interactive.correlation_id)
				.await
		})
		.await
	}

	/// Acquires a token through a popup window.
	pub async fn acquire_token_popup(
		&self,
		client_id: &ClientId,
		request: &TokenRequest,
	) -> Result<AcquisitionResult> {
		obs::observe(FlowKind::Popup, "acquire_token_popup", async move {
			let _ui = self.interaction_lock.try_lock().ok_or(Error::InteractionInProgress)?;
			let interactive = self.interactive_request(client_id, request, None).await?;
			let grant = self.interaction.popup(&interactive).await?;

			self.commit_grant(client_id, &request.authority, grant, interactive.correlation_id)
				.await
		})
		.await
	}

	/// Navigates the top frame to the identity provider.
	///
	/// `requester` records the embedded app a broker started the redirect for, so the result
	/// can be handed to that app once the page returns.
	pub async fn acquire_token_redirect(
		&self,
		client_id: &ClientId,
		request: &TokenRequest,
		requester: Option<Origin>,
	) -> Result<()> {
		obs::observe(FlowKind::Redirect, "acquire_token_redirect", async move {
			let _ui = self.interaction_lock.try_lock().ok_or(Error::InteractionInProgress)?;
			let interactive = self.interactive_request(client_id, request, requester).await?;

			self.interaction.redirect(&interactive).await
		})
		.await
	}

	/// Completes a redirect that returned to this page.
	///
	/// Resolves to `None` when the page load was not a redirect response.
	pub async fn handle_redirect_promise(&self) -> Result<Option<RedirectOutcome>> {
		obs::observe(FlowKind::RedirectCompletion, "handle_redirect_promise", async move {
			let Some(completion) = self.interaction.handle_redirect().await? else {
				return Ok(None);
			};
			let result = self
				.commit_grant(
					&completion.client_id,
					&completion.authority,
					completion.grant,
					completion.correlation_id,
				)
				.await?;

			Ok(Some(RedirectOutcome { result, requester: completion.requester }))
		})
		.await
	}

	async fn interactive_request(
		&self,
		client_id: &ClientId,
		request: &TokenRequest,
		requester: Option<Origin>,
	) -> Result<InteractiveRequest> {
		let correlation_id = self.correlation_id(request)?;
		let mut request = request.clone();

		if request.login_hint.is_none() {
			request.login_hint = self.resolve_account(&request).map(|account| account.username);
		}

		let metadata = self.network.discover(&request.authority).await?;

		Ok(InteractiveRequest {
			client_id: client_id.clone(),
			authorization_endpoint: metadata.authorization_endpoint,
			state: self.crypto.generate_correlation_id()?.to_string(),
			pkce: self.crypto.generate_pkce_pair(),
			correlation_id,
			request,
			requester,
		})
	}
}
