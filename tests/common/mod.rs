#![allow(dead_code)]

// std
use std::{
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration as StdDuration,
};
// crates.io
use parking_lot::Mutex;
use time::{Duration, OffsetDateTime};
use tokio::sync::oneshot;
// self
use oauth2_nested_broker::{
	auth::{AccountInfo, ClientId, HomeAccountId, ScopeSet, TokenBundle, TokenSecret},
	broker::Broker,
	config::{BrokerConfig, EmbeddedConfig},
	crypto::DefaultCryptoProvider,
	embedded::EmbeddedClient,
	error::Error,
	flows::{Orchestrator, TokenRequest},
	interaction::{InteractionClient, InteractionFuture, InteractiveRequest, RedirectCompletion},
	network::{NetworkClient, NetworkFuture, RefreshExchange, TokenGrant},
	store::{MemoryTokenStore, TokenKey, TokenStore},
	transport::{self, MemoryHub},
};

pub const AUTHORITY: &str = "https://login.example.com/common";
pub const BROKER_ORIGIN: &str = "https://host.example";
pub const CHILD_ORIGIN: &str = "https://child.example";
pub const OTHER_ORIGIN: &str = "https://other.example";
pub const BROKER_CLIENT: &str = "host-app";
pub const CHILD_CLIENT: &str = "child-app";

pub fn client_id(value: &str) -> ClientId {
	ClientId::new(value).expect("Client id fixture should be valid.")
}

pub fn scopes(values: &[&str]) -> ScopeSet {
	ScopeSet::new(values.iter().copied()).expect("Scope fixture should be valid.")
}

pub fn account(id: &str) -> AccountInfo {
	AccountInfo::new(
		HomeAccountId::new(id).expect("Account fixture should be valid."),
		"login.example.com",
		"tenant-1",
		format!("{id}@example.com"),
	)
}

pub fn grant(account: AccountInfo, scope: &[&str], access: &str) -> TokenGrant {
	TokenGrant {
		account,
		access_token: Some(TokenSecret::new(access)),
		id_token: Some(TokenSecret::new(format!("{access}-id"))),
		refresh_token: Some(TokenSecret::new(format!("{access}-refresh"))),
		scopes: scopes(scope),
		expires_in: Duration::hours(1),
	}
}

pub fn request(scope: &[&str]) -> TokenRequest {
	TokenRequest::new(AUTHORITY, scopes(scope))
}

/// Scripted token endpoint that counts and records every refresh.
#[derive(Debug, Default)]
pub struct FakeNetwork {
	calls: AtomicUsize,
	log: Mutex<Vec<String>>,
	interaction_required: Mutex<Option<String>>,
	gate: Mutex<Option<oneshot::Receiver<()>>>,
}
impl FakeNetwork {
	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	/// Scope sets of every refresh, in call order.
	pub fn log(&self) -> Vec<String> {
		self.log.lock().clone()
	}

	pub fn require_interaction(&self, code: &str) {
		*self.interaction_required.lock() = Some(code.into());
	}

	/// Makes the next refresh wait until the returned sender fires or drops.
	pub fn hold_next_refresh(&self) -> oneshot::Sender<()> {
		let (tx, rx) = oneshot::channel();

		*self.gate.lock() = Some(rx);

		tx
	}
}
impl NetworkClient for FakeNetwork {
	fn refresh<'a>(&'a self, exchange: &'a RefreshExchange) -> NetworkFuture<'a, TokenGrant> {
		Box::pin(async move {
			self.calls.fetch_add(1, Ordering::SeqCst);
			self.log.lock().push(exchange.scopes.to_string());

			let gate = self.gate.lock().take();

			if let Some(gate) = gate {
				let _ = gate.await;
			}

			if let Some(code) = self.interaction_required.lock().clone() {
				return Err(Error::InteractionRequired { code, description: None });
			}

			let scope = exchange.scopes.iter().collect::<Vec<_>>();

			Ok(grant(exchange.account.clone(), &scope, &format!("refreshed-{}", exchange.scopes)))
		})
	}
}

/// Navigation fake. Popups and hidden frames sign `account` in; redirects are remembered and
/// completed by [`FakeInteraction::handle_redirect`] once released.
#[derive(Debug)]
pub struct FakeInteraction {
	account: AccountInfo,
	pub popups: AtomicUsize,
	pub iframes: AtomicUsize,
	pub redirects: AtomicUsize,
	started: Mutex<Option<InteractiveRequest>>,
	gate: Mutex<Option<oneshot::Receiver<()>>>,
}
impl FakeInteraction {
	pub fn new(account: AccountInfo) -> Self {
		Self {
			account,
			popups: AtomicUsize::new(0),
			iframes: AtomicUsize::new(0),
			redirects: AtomicUsize::new(0),
			started: Mutex::new(None),
			gate: Mutex::new(None),
		}
	}

	/// Makes the next redirect completion wait until the returned sender fires or drops.
	pub fn hold_redirect(&self) -> oneshot::Sender<()> {
		let (tx, rx) = oneshot::channel();

		*self.gate.lock() = Some(rx);

		tx
	}

	/// Pretends a redirect started by someone else returned to this page.
	pub fn returned_from(&self, started: InteractiveRequest) {
		*self.started.lock() = Some(started);
	}

	pub fn interactive_calls(&self) -> usize {
		self.popups.load(Ordering::SeqCst)
			+ self.iframes.load(Ordering::SeqCst)
			+ self.redirects.load(Ordering::SeqCst)
	}

	fn signed_in(&self, request: &InteractiveRequest, access: &str) -> TokenGrant {
		let scope = request.request.scopes.iter().collect::<Vec<_>>();

		grant(self.account.clone(), &scope, access)
	}
}
impl InteractionClient for FakeInteraction {
	fn popup<'a>(&'a self, request: &'a InteractiveRequest) -> InteractionFuture<'a, TokenGrant> {
		Box::pin(async move {
			self.popups.fetch_add(1, Ordering::SeqCst);

			Ok(self.signed_in(request, "popup"))
		})
	}

	fn silent_iframe<'a>(
		&'a self,
		request: &'a InteractiveRequest,
	) -> InteractionFuture<'a, TokenGrant> {
		Box::pin(async move {
			self.iframes.fetch_add(1, Ordering::SeqCst);

			Ok(self.signed_in(request, "iframe"))
		})
	}

	fn redirect<'a>(&'a self, request: &'a InteractiveRequest) -> InteractionFuture<'a, ()> {
		Box::pin(async move {
			self.redirects.fetch_add(1, Ordering::SeqCst);
			*self.started.lock() = Some(request.clone());

			Ok(())
		})
	}

	fn handle_redirect(&self) -> InteractionFuture<'_, Option<RedirectCompletion>> {
		Box::pin(async move {
			let gate = self.gate.lock().take();

			if let Some(gate) = gate {
				let _ = gate.await;
			}

			let Some(started) = self.started.lock().take() else {
				return Ok(None);
			};

			Ok(Some(RedirectCompletion {
				grant: self.signed_in(&started, "redirect"),
				client_id: started.client_id.clone(),
				authority: started.request.authority.clone(),
				correlation_id: started.correlation_id.clone(),
				requester: started.requester.clone(),
			}))
		})
	}
}

/// Orchestrator plus handles on its fakes.
pub struct Local {
	pub orchestrator: Arc<Orchestrator>,
	pub store: Arc<MemoryTokenStore>,
	pub network: Arc<FakeNetwork>,
	pub interaction: Arc<FakeInteraction>,
}
impl Local {
	pub fn new(user: &str) -> Self {
		let store = Arc::new(MemoryTokenStore::default());
		let network = Arc::new(FakeNetwork::default());
		let interaction = Arc::new(FakeInteraction::new(account(user)));
		let orchestrator = Arc::new(Orchestrator::new(
			store.clone(),
			network.clone(),
			interaction.clone(),
			Arc::new(DefaultCryptoProvider::new()),
		));

		Self { orchestrator, store, network, interaction }
	}

	/// Seeds a refresh token (and nothing else) for `user` under `client`.
	pub async fn seed_refresh_token(&self, client: &str, user: &AccountInfo) {
		let key = TokenKey::new(
			user.home_account_id.clone(),
			client_id(client),
			AUTHORITY,
			scopes(&["openid"]),
		);
		let bundle = TokenBundle {
			access_token: None,
			id_token: None,
			refresh_token: Some(TokenSecret::new("seeded-refresh")),
		};

		self.store.set_tokens(&key, bundle).await.expect("Seeding the store should succeed.");
	}

	/// Seeds a cached access token for `user` under `client`, issued `age` ago.
	pub async fn seed_access_token(&self, client: &str, user: &AccountInfo, scope: &[&str], age: Duration) {
		let key = TokenKey::new(user.home_account_id.clone(), client_id(client), AUTHORITY, scopes(scope));
		let bundle = grant(user.clone(), scope, "seeded").bundle(OffsetDateTime::now_utc() - age);

		self.store.set_tokens(&key, bundle).await.expect("Seeding the store should succeed.");
	}
}

pub fn broker_config(trusted: &[&str]) -> BrokerConfig {
	BrokerConfig::builder(client_id(BROKER_CLIENT))
		.trust_all(trusted.iter().copied())
		.build()
		.expect("Broker config fixture should build.")
}

pub fn embedded_config(trusted_brokers: &[&str]) -> EmbeddedConfig {
	let mut builder = EmbeddedConfig::builder(client_id(CHILD_CLIENT))
		.handshake_timeout(StdDuration::from_millis(200))
		.response_timeout(StdDuration::from_secs(5));

	for pattern in trusted_brokers {
		builder = builder.trust_broker(*pattern);
	}

	builder.build().expect("Embedded config fixture should build.")
}

/// Broker listening on an in-memory inbox.
pub struct BrokerSide {
	pub broker: Arc<Broker>,
	pub local: Local,
	pub hub: MemoryHub,
}
impl BrokerSide {
	pub fn start(config: BrokerConfig) -> Self {
		let local = Local::new("broker-user");
		let broker = Arc::new(Broker::new(config, local.orchestrator.clone()));
		let (hub, inbox) = transport::memory::channel();

		tokio::spawn(broker.clone().listen(inbox));

		Self { broker, local, hub }
	}

	/// Embedded client at `origin`, with its own local orchestrator.
	pub fn embedded(&self, origin: &str, config: EmbeddedConfig) -> (EmbeddedClient, Local) {
		let local = Local::new("child-user");
		let transport = Arc::new(self.hub.connect(origin, BROKER_ORIGIN));
		let client = EmbeddedClient::new(config, transport, local.orchestrator.clone());

		(client, local)
	}
}
