//! Auth and redirect request handlers.

// self
use crate::{
	_prelude::*,
	auth::CorrelationId,
	broker::{Broker, sequencer::Ticket},
	flows::AcquisitionResult,
	obs::{self, FlowKind},
	protocol::{
		AuthRequest, AuthResponse, BrokerReply, InteractionType, MessageBody, Origin,
		RedirectRequest, RedirectResponse,
	},
	thumbprint::RequestThumbprint,
	transport::ReplyPort,
};

/// Single-use answer to one request. The port is closed after the reply, or on drop when no
/// reply was produced.
pub(crate) struct Responder {
	port: Arc<dyn ReplyPort>,
	version: u32,
	correlation_id: CorrelationId,
}
impl Responder {
	pub(crate) fn new(port: Arc<dyn ReplyPort>, version: u32, correlation_id: CorrelationId) -> Self {
		Self { port, version, correlation_id }
	}

	pub(crate) fn respond(self, body: MessageBody) {
		let message_type = body.message_type();

		match body.encode(self.version, &self.correlation_id) {
			Ok(data) =>
				if let Err(e) = self.port.send(data) {
					tracing::debug!(%message_type, error = %e, "reply could not be delivered");
				},
			Err(e) => tracing::warn!(%message_type, error = %e, "reply could not be encoded"),
		}
	}
}
impl Drop for Responder {
	fn drop(&mut self) {
		self.port.close();
	}
}

enum Acquired {
	Tokens(AcquisitionResult),
	Redirecting,
}

impl Broker {
	/// Answers an auth request. `ticket` keeps arrival order up to the cache lookup and is
	/// released before any acquisition starts.
	pub(super) async fn handle_auth(
		&self,
		origin: Origin,
		auth: AuthRequest,
		responder: Responder,
		ticket: Ticket,
	) {
		let thumbprint = RequestThumbprint::compute(&auth.embedded_client_id, &auth.request);

		if auth.request.force_refresh {
			tracing::debug!(%origin, %thumbprint, "forced refresh bypasses the response cache");
		} else {
			let account = auth.request.account.as_ref().map(|account| &account.home_account_id);

			if let Some(mut result) = self.cache.get_for_account(&thumbprint, &origin, account) {
				drop(ticket);

				tracing::debug!(%origin, %thumbprint, "answered auth request from response cache");

				result.from_cache = true;

				responder.respond(auth_response(BrokerReply::Result(result)));

				return;
			}

			tracing::debug!(%origin, %thumbprint, "response cache miss");
		}

		drop(ticket);

		let reply = match obs::observe(FlowKind::BrokerAuth, "auth_request", self.acquire(&origin, &auth))
			.await
		{
			Ok(Acquired::Tokens(mut result)) => {
				result.tokens_to_cache = result.cacheable_bundle(OffsetDateTime::now_utc());

				self.cache.put(thumbprint, &origin, result.clone());

				BrokerReply::Result(result)
			},
			Ok(Acquired::Redirecting) => BrokerReply::Redirecting,
			Err(e) => {
				tracing::debug!(%origin, error = %e, "brokered acquisition failed");

				BrokerReply::Error(e.to_wire())
			},
		};

		responder.respond(auth_response(reply));
	}

	pub(super) fn handle_redirect(
		&self,
		origin: Origin,
		request: RedirectRequest,
		responder: Responder,
	) {
		let _span = obs::FlowSpan::new(FlowKind::BrokerRedirect, "redirect_request").entered();
		let pending = self.cache.get_by_origin(&origin);

		tracing::debug!(
			%origin,
			embedded_client_id = %request.embedded_client_id,
			found = pending.is_some(),
			"answered redirect request"
		);

		responder.respond(MessageBody::RedirectResponse(RedirectResponse {
			reply: pending.map(BrokerReply::Result),
		}));
	}

	async fn acquire(&self, origin: &Origin, auth: &AuthRequest) -> Result<Acquired> {
		let client_id = &auth.embedded_client_id;
		let mut request = auth.request.clone();

		if request.redirect_uri.is_none() {
			request.redirect_uri = self.config.redirect_uri.clone();
		}

		let has_account = request.account.is_some() || self.orchestrator.active_account().is_some();

		if has_account {
			match self.orchestrator.acquire_token_silent_or_throw(client_id, &request).await {
				Ok(result) => return Ok(Acquired::Tokens(result)),
				Err(e) if e.is_interaction_required() && auth.interaction_type.is_interactive() => {
					tracing::debug!(%origin, error = %e, "silent renewal needs interaction");
				},
				Err(e) => return Err(e),
			}
		}

		let chosen =
			self.config.interaction_policy.resolve(self.config.preferred_interaction, auth.interaction_type);

		tracing::info!(
			%origin,
			policy = ?self.config.interaction_policy,
			broker_preference = ?self.config.preferred_interaction,
			requested = %auth.interaction_type,
			%chosen,
			"resolved interaction type"
		);

		match chosen {
			InteractionType::Silent =>
				self.orchestrator.sso_silent(client_id, &request).await.map(Acquired::Tokens),
			InteractionType::Popup =>
				self.orchestrator.acquire_token_popup(client_id, &request).await.map(Acquired::Tokens),
			InteractionType::Redirect => {
				self.orchestrator
					.acquire_token_redirect(client_id, &request, Some(origin.clone()))
					.await?;

				Ok(Acquired::Redirecting)
			},
		}
	}
}

fn auth_response(reply: BrokerReply) -> MessageBody {
	MessageBody::AuthResponse(AuthResponse { reply })
}
