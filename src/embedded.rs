//! Embedded client: delegates acquisitions to a trusted broker once bonded.
//!
//! [`EmbeddedClient::initialize`] runs the handshake. The broker origin observed on the
//! handshake reply must be on the trusted broker list; it is then pinned, and every later
//! reply must come from exactly that origin. Until bonded (or after a failed handshake) every
//! call runs on the local [`Orchestrator`] instead.
//!
//! Brokered calls never retry locally. Whatever the broker reports is surfaced as-is, so a
//! failed brokered attempt cannot trigger a second interactive prompt.

// std
use std::time::Duration as StdDuration;
// self
use crate::{
	_prelude::*,
	auth::CorrelationId,
	config::EmbeddedConfig,
	flows::{AcquisitionResult, Orchestrator, TokenRequest},
	obs::{self, FlowKind},
	protocol::{
		self, AuthRequest, BrokerReply, HandshakeRequest, InteractionType, Message, MessageBody,
		MessageType, Origin, PROTOCOL_VERSION, RedirectRequest,
	},
	store::TokenKey,
	transport::{BrokerTransport, ChannelError, ReplyEvent},
};

/// Bonding state of an embedded client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BondState {
	/// Not bonded; acquisitions run locally.
	Unbonded,
	/// A handshake is in flight.
	Handshaking,
	/// Bonded to a broker; acquisitions are delegated.
	Bonded {
		/// Broker origin pinned by the handshake.
		broker_origin: Origin,
		/// Negotiated protocol version.
		version: u32,
	},
}

#[derive(Clone, Debug)]
struct Bond {
	broker_origin: Origin,
	version: u32,
}

#[derive(Debug)]
struct PendingRedirect {
	request: TokenRequest,
	result: Option<AcquisitionResult>,
}

enum ReplyOrigin<'a> {
	Trusted,
	Pinned(&'a Origin),
}

/// Client running inside a dependent context.
pub struct EmbeddedClient {
	config: EmbeddedConfig,
	transport: Arc<dyn BrokerTransport>,
	orchestrator: Arc<Orchestrator>,
	state: RwLock<BondState>,
	pending_redirect: Mutex<Option<PendingRedirect>>,
}
impl EmbeddedClient {
	/// Creates an unbonded client.
	///
	/// `orchestrator` serves local acquisitions and holds the token store brokered tokens are
	/// cached in.
	pub fn new(
		config: EmbeddedConfig,
		transport: Arc<dyn BrokerTransport>,
		orchestrator: Arc<Orchestrator>,
	) -> Self {
		Self {
			config,
			transport,
			orchestrator,
			state: RwLock::new(BondState::Unbonded),
			pending_redirect: Mutex::new(None),
		}
	}

	/// Active configuration.
	pub fn config(&self) -> &EmbeddedConfig {
		&self.config
	}

	/// Local orchestrator.
	pub fn orchestrator(&self) -> &Arc<Orchestrator> {
		&self.orchestrator
	}

	/// Current bonding state.
	pub fn state(&self) -> BondState {
		self.state.read().clone()
	}

	/// Returns `true` once bonded to a broker.
	pub fn is_bonded(&self) -> bool {
		matches!(*self.state.read(), BondState::Bonded { .. })
	}

	/// Performs the handshake with the candidate broker.
	///
	/// On failure the client stays unbonded and keeps working locally; the error is still
	/// returned so the host can react to an untrusted broker or a timeout.
	pub async fn initialize(&self) -> Result<()> {
		*self.state.write() = BondState::Handshaking;

		match obs::observe(FlowKind::Handshake, "handshake", self.handshake()).await {
			Ok(bond) => {
				tracing::info!(broker_origin = %bond.broker_origin, version = bond.version, "bonded to broker");

				*self.state.write() =
					BondState::Bonded { broker_origin: bond.broker_origin, version: bond.version };

				Ok(())
			},
			Err(e) => {
				tracing::info!(error = %e, "handshake failed, falling back to local acquisition");

				*self.state.write() = BondState::Unbonded;

				Err(e)
			},
		}
	}

	/// Acquires a token without interaction.
	pub async fn acquire_token_silent(&self, request: &TokenRequest) -> Result<AcquisitionResult> {
		let Some(bond) = self.bond() else {
			return self.orchestrator.acquire_token_silent_or_throw(&self.config.client_id, request).await;
		};

		obs::observe(FlowKind::Silent, "brokered_silent", async move {
			let result = self.brokered_tokens(&bond, InteractionType::Silent, request).await?;

			self.cache_locally(request, result, true).await
		})
		.await
	}

	/// Acquires a token through a hidden frame using the identity provider session.
	pub async fn sso_silent(&self, request: &TokenRequest) -> Result<AcquisitionResult> {
		let Some(bond) = self.bond() else {
			return self.orchestrator.sso_silent(&self.config.client_id, request).await;
		};

		obs::observe(FlowKind::SsoSilent, "brokered_sso_silent", async move {
			let result = self.brokered_tokens(&bond, InteractionType::Silent, request).await?;

			self.cache_locally(request, result, true).await
		})
		.await
	}

	/// Acquires a token through a popup.
	pub async fn acquire_token_popup(&self, request: &TokenRequest) -> Result<AcquisitionResult> {
		let Some(bond) = self.bond() else {
			return self.orchestrator.acquire_token_popup(&self.config.client_id, request).await;
		};

		obs::observe(FlowKind::Popup, "brokered_popup", async move {
			let result = self.brokered_tokens(&bond, InteractionType::Popup, request).await?;

			self.cache_locally(request, result, false).await
		})
		.await
	}

	/// Starts a redirect flow.
	///
	/// When bonded, the broker navigates the top frame and the result is collected through
	/// [`EmbeddedClient::handle_redirect_promise`]. A broker that answers immediately (from its
	/// cache, or by picking a popup) has its result parked for that call instead.
	pub async fn acquire_token_redirect(&self, request: &TokenRequest) -> Result<()> {
		let Some(bond) = self.bond() else {
			return self
				.orchestrator
				.acquire_token_redirect(&self.config.client_id, request, None)
				.await;
		};

		obs::observe(FlowKind::Redirect, "brokered_redirect", async move {
			let result = match self.brokered(&bond, InteractionType::Redirect, request).await? {
				BrokerReply::Redirecting => None,
				BrokerReply::Result(result) => Some(self.cache_locally(request, result, false).await?),
				BrokerReply::Error(wire) => return Err(Error::from_wire(wire)),
			};

			*self.pending_redirect.lock() = Some(PendingRedirect { request: request.clone(), result });

			Ok(())
		})
		.await
	}

	/// Collects the result of a redirect flow, or `None` when nothing is pending.
	pub async fn handle_redirect_promise(&self) -> Result<Option<AcquisitionResult>> {
		let Some(bond) = self.bond() else {
			return Ok(self.orchestrator.handle_redirect_promise().await?.map(|outcome| outcome.result));
		};

		let pending = self.pending_redirect.lock().take();
		let request = match pending {
			Some(PendingRedirect { result: Some(result), .. }) => return Ok(Some(result)),
			Some(PendingRedirect { request, .. }) => Some(request),
			None => None,
		};

		obs::observe(FlowKind::RedirectCompletion, "brokered_redirect_completion", async move {
			let correlation_id = self.correlation_id(None)?;
			let body = MessageBody::RedirectRequest(RedirectRequest {
				embedded_client_id: self.config.client_id.clone(),
			});
			let reply = match self.exchange(&bond, body, &correlation_id).await? {
				MessageBody::RedirectResponse(response) => response.reply,
				other => return Err(unexpected(MessageType::RedirectResponse, other.message_type().as_str())),
			};

			match reply {
				None | Some(BrokerReply::Redirecting) => Ok(None),
				Some(BrokerReply::Result(result)) => match &request {
					Some(request) => self.cache_locally(request, result, false).await.map(Some),
					// The starting request is unknown after a reload; only the account is kept.
					None => {
						self.orchestrator.set_active_account(Some(result.account.clone()));

						Ok(Some(result))
					},
				},
				Some(BrokerReply::Error(wire)) => Err(Error::from_wire(wire)),
			}
		})
		.await
	}

	fn bond(&self) -> Option<Bond> {
		match &*self.state.read() {
			BondState::Bonded { broker_origin, version } =>
				Some(Bond { broker_origin: broker_origin.clone(), version: *version }),
			_ => None,
		}
	}

	fn correlation_id(&self, requested: Option<&CorrelationId>) -> Result<CorrelationId> {
		match requested {
			Some(id) => Ok(id.clone()),
			None => Ok(self.orchestrator.crypto.generate_correlation_id()?),
		}
	}

	async fn handshake(&self) -> Result<Bond> {
		let correlation_id = self.correlation_id(None)?;
		let body = MessageBody::HandshakeRequest(HandshakeRequest {
			embedded_client_id: self.config.client_id.clone(),
		});
		let data = body.encode(PROTOCOL_VERSION, &correlation_id).map_err(ChannelError::from)?;
		let reply = self
			.transport
			.open(data)?
			.wait(self.config.handshake_timeout)
			.await
			.map_err(|e| timeout_as(e, |waited| Error::HandshakeTimeout { waited }))?;
		let message = self.accept(
			reply,
			&correlation_id,
			MessageType::HandshakeResponse,
			PROTOCOL_VERSION,
			ReplyOrigin::Trusted,
		)?;

		if let MessageBody::HandshakeResponse(response) = &message.body {
			tracing::debug!(
				broker_origin = %message.sender,
				broker_client_id = %response.broker_client_id,
				"received handshake response"
			);
		}

		Ok(Bond { broker_origin: message.sender, version: message.version })
	}

	async fn brokered(
		&self,
		bond: &Bond,
		interaction_type: InteractionType,
		request: &TokenRequest,
	) -> Result<BrokerReply> {
		let correlation_id = self.correlation_id(request.correlation_id.as_ref())?;
		let body = MessageBody::AuthRequest(AuthRequest {
			interaction_type,
			embedded_client_id: self.config.client_id.clone(),
			request: request.clone(),
		});

		match self.exchange(bond, body, &correlation_id).await? {
			MessageBody::AuthResponse(response) => Ok(response.reply),
			other => Err(unexpected(MessageType::AuthResponse, other.message_type().as_str())),
		}
	}

	async fn brokered_tokens(
		&self,
		bond: &Bond,
		interaction_type: InteractionType,
		request: &TokenRequest,
	) -> Result<AcquisitionResult> {
		match self.brokered(bond, interaction_type, request).await? {
			BrokerReply::Result(result) => Ok(result),
			BrokerReply::Error(wire) => Err(Error::from_wire(wire)),
			BrokerReply::Redirecting => Err(Error::RedirectInProgress),
		}
	}

	async fn exchange(
		&self,
		bond: &Bond,
		body: MessageBody,
		correlation_id: &CorrelationId,
	) -> Result<MessageBody> {
		let expected = body
			.message_type()
			.response_type()
			.ok_or_else(|| Error::InvalidRequest { reason: "only requests can be sent".into() })?;
		let data = body.encode(bond.version, correlation_id).map_err(ChannelError::from)?;
		let reply = self
			.transport
			.open(data)?
			.wait(self.config.response_timeout)
			.await
			.map_err(|e| timeout_as(e, |waited| Error::ResponseTimeout { waited }))?;

		self.accept(reply, correlation_id, expected, bond.version, ReplyOrigin::Pinned(&bond.broker_origin))
			.map(|message| message.body)
	}

	fn accept(
		&self,
		reply: ReplyEvent,
		correlation_id: &CorrelationId,
		expected: MessageType,
		version: u32,
		origin: ReplyOrigin<'_>,
	) -> Result<Message> {
		let message = protocol::try_validate(&reply.origin, &reply.data).map_err(|e| {
			tracing::debug!(origin = %reply.origin, error = %e, path = ?e.path(), "broker reply is malformed");

			unexpected(expected, "a malformed message")
		})?;

		match origin {
			ReplyOrigin::Trusted => self.config.trusted_broker_domains.verify(&message.sender)?,
			ReplyOrigin::Pinned(pinned) =>
				if &message.sender != pinned {
					tracing::warn!(origin = %message.sender, %pinned, "reply from a different broker origin");

					return Err(Error::UntrustedOrigin { origin: message.sender.to_string() });
				},
		}

		if message.message_type() != expected {
			return Err(unexpected(expected, message.message_type().as_str()));
		}
		if &message.correlation_id != correlation_id {
			return Err(unexpected(expected, "a reply to another request"));
		}
		if message.version != version {
			return Err(unexpected(expected, &format!("protocol version {}", message.version)));
		}

		Ok(message)
	}

	/// Stores the tokens the broker handed over and makes their account active.
	async fn cache_locally(
		&self,
		request: &TokenRequest,
		result: AcquisitionResult,
		require_tokens: bool,
	) -> Result<AcquisitionResult> {
		let Some(bundle) = result.tokens_to_cache.clone() else {
			if require_tokens {
				return Err(Error::NoTokensToCache);
			}

			self.orchestrator.set_active_account(Some(result.account.clone()));

			return Ok(result);
		};
		let key = TokenKey::new(
			result.account.home_account_id.clone(),
			self.config.client_id.clone(),
			&request.authority,
			result.scopes.clone(),
		);

		self.orchestrator.store.set_tokens(&key, bundle).await?;
		self.orchestrator.set_active_account(Some(result.account.clone()));

		Ok(result)
	}
}
impl Debug for EmbeddedClient {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("EmbeddedClient")
			.field("config", &self.config)
			.field("state", &*self.state.read())
			.finish()
	}
}

fn timeout_as(e: ChannelError, timeout: impl FnOnce(StdDuration) -> Error) -> Error {
	match e {
		ChannelError::TimedOut { waited } => timeout(waited),
		other => other.into(),
	}
}

fn unexpected(expected: MessageType, received: &str) -> Error {
	Error::UnexpectedResponse { expected, received: received.into() }
}
