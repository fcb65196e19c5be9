//! Broker: the trusted top-level context answering embedded apps.
//!
//! [`Broker::on_message`] is the single entry point for inbound traffic. It validates the
//! envelope, checks the sender against the trusted domain list, answers handshakes on the
//! spot, and turns auth and redirect requests into [`BrokerTask`]s. Each task takes a FIFO
//! ticket on arrival and waits for the [`RedirectBarrier`] before touching the
//! [`ResponseCache`], so requests observe committed redirect results and reach the cache and
//! the orchestrator in arrival order. The ticket is released once the cache was consulted;
//! acquisitions themselves run concurrently.

pub mod barrier;

mod handler;
mod sequencer;

pub use barrier::{BarrierGuard, RedirectBarrier};

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::{
	_prelude::*,
	broker::{handler::Responder, sequencer::Sequencer},
	cache::ResponseCache,
	config::BrokerConfig,
	flows::{Orchestrator, RedirectOutcome},
	obs::{self, FlowKind},
	protocol::{self, HandshakeResponse, MessageBody},
	transport::{BrokerInbox, InboundEvent},
};

/// Deferred handling of one auth or redirect request.
pub type BrokerTask = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Boxed future returned by broker operations that outlive the borrow of the broker.
pub type BrokerFuture<T> = Pin<Box<dyn Future<Output = Result<T>> + Send>>;

/// Mediates token acquisition for embedded apps.
pub struct Broker {
	config: BrokerConfig,
	orchestrator: Arc<Orchestrator>,
	cache: ResponseCache,
	barrier: RedirectBarrier,
	sequencer: Sequencer,
	dispatched: AtomicU64,
}
impl Broker {
	/// Creates a broker running acquisitions through `orchestrator`.
	pub fn new(config: BrokerConfig, orchestrator: Arc<Orchestrator>) -> Self {
		let cache = ResponseCache::new(config.response_ttl);

		Self {
			config,
			orchestrator,
			cache,
			barrier: RedirectBarrier::new(),
			sequencer: Sequencer::default(),
			dispatched: AtomicU64::new(0),
		}
	}

	/// Replaces the response cache, e.g. with one driven by a custom clock.
	pub fn with_cache(mut self, cache: ResponseCache) -> Self {
		self.cache = cache;

		self
	}

	/// Active configuration.
	pub fn config(&self) -> &BrokerConfig {
		&self.config
	}

	/// Orchestrator the broker runs acquisitions with.
	pub fn orchestrator(&self) -> &Arc<Orchestrator> {
		&self.orchestrator
	}

	/// Response cache owned by the broker.
	pub fn cache(&self) -> &ResponseCache {
		&self.cache
	}

	/// Redirect-completion latch.
	pub fn barrier(&self) -> &RedirectBarrier {
		&self.barrier
	}

	/// Number of trusted messages dispatched to a handler so far.
	pub fn dispatched(&self) -> u64 {
		self.dispatched.load(Ordering::Relaxed)
	}

	/// Handles one inbound event.
	///
	/// Malformed messages and stray replies are dropped with `Ok(None)`. A well-formed message
	/// from an untrusted origin fails with [`Error::UntrustedOrigin`] and its channel is closed
	/// unanswered. Handshakes are answered before returning. Auth and redirect requests take
	/// their place in line now and are returned as a task the caller must drive.
	pub fn on_message(self: &Arc<Self>, event: InboundEvent) -> Result<Option<BrokerTask>> {
		let InboundEvent { origin, data, reply } = event;
		let Some(message) = protocol::validate(&origin, &data) else {
			if let Some(port) = reply {
				port.close();
			}

			return Ok(None);
		};

		if let Err(e) = self.config.trusted_domains.verify(&message.sender) {
			if let Some(port) = reply {
				port.close();
			}

			return Err(e);
		}

		let Some(port) = reply else {
			tracing::debug!(
				origin = %message.sender,
				message_type = %message.message_type(),
				"dropped message without a reply channel"
			);

			return Ok(None);
		};
		let responder = Responder::new(port, message.version, message.correlation_id.clone());

		match message.body {
			MessageBody::HandshakeRequest(request) => {
				self.dispatched.fetch_add(1, Ordering::Relaxed);

				let _span = obs::FlowSpan::new(FlowKind::Handshake, "handshake_request").entered();

				tracing::debug!(
					origin = %message.sender,
					embedded_client_id = %request.embedded_client_id,
					version = message.version,
					"accepted handshake"
				);

				responder.respond(MessageBody::HandshakeResponse(HandshakeResponse {
					broker_client_id: self.config.client_id.clone(),
				}));

				Ok(None)
			},
			MessageBody::AuthRequest(request) => {
				self.dispatched.fetch_add(1, Ordering::Relaxed);

				let mut ticket = self.sequencer.ticket();
				let broker = self.clone();
				let sender = message.sender;

				Ok(Some(Box::pin(async move {
					ticket.wait().await;
					broker.barrier.wait().await;
					broker.handle_auth(sender, request, responder, ticket).await;
				})))
			},
			MessageBody::RedirectRequest(request) => {
				self.dispatched.fetch_add(1, Ordering::Relaxed);

				let mut ticket = self.sequencer.ticket();
				let broker = self.clone();
				let sender = message.sender;

				Ok(Some(Box::pin(async move {
					ticket.wait().await;
					broker.barrier.wait().await;
					broker.handle_redirect(sender, request, responder);
				})))
			},
			body => {
				tracing::debug!(
					origin = %message.sender,
					message_type = %body.message_type(),
					"ignored message the broker does not handle"
				);

				Ok(None)
			},
		}
	}

	/// Drains `inbox`, running every request task on the tokio runtime.
	pub async fn listen(self: Arc<Self>, mut inbox: BrokerInbox) {
		while let Some(event) = inbox.recv().await {
			match self.on_message(event) {
				Ok(Some(task)) => {
					tokio::spawn(task);
				},
				Ok(None) => {},
				Err(e) => tracing::debug!(error = %e, "rejected inbound message"),
			}
		}
	}

	/// Completes a redirect that returned to the broker page.
	///
	/// The barrier is armed before this returns, so every request arriving afterwards waits for
	/// the completion. A result started on an embedded app's behalf is parked for that app's
	/// redirect request. A failed completion counts as "no redirect result" for waiting
	/// requests and is still reported to the caller.
	pub fn handle_redirect_promise(self: &Arc<Self>) -> BrokerFuture<Option<RedirectOutcome>> {
		let guard = self.barrier.arm();
		let broker = self.clone();

		Box::pin(async move {
			let outcome = broker.orchestrator.handle_redirect_promise().await;

			if let Ok(Some(RedirectOutcome { result, requester: Some(requester) })) = &outcome {
				let mut result = result.clone();

				result.tokens_to_cache = result.cacheable_bundle(OffsetDateTime::now_utc());

				tracing::debug!(%requester, "parked redirect result for embedded app");

				broker.cache.put_redirect(requester, result);
			}

			guard.release();

			outcome
		})
	}
}
impl Debug for Broker {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Broker")
			.field("config", &self.config)
			.field("cache", &self.cache)
			.field("barrier_pending", &self.barrier.is_pending())
			.field("dispatched", &self.dispatched())
			.finish()
	}
}
