//! Bonds an embedded app with a broker over the in-memory transport and acquires tokens
//! through it.
//!
//! The identity provider is simulated: popups sign a fixed user in, and the token endpoint
//! always asks for interaction, so every token printed here comes from the broker's popup or
//! its response cache.

// std
use std::{future::Future, pin::Pin, sync::Arc, time::Duration as StdDuration};
// crates.io
use color_eyre::Result;
use time::Duration;
// self
use oauth2_nested_broker::{
	auth::{AccountInfo, ClientId, HomeAccountId, ScopeSet, TokenSecret},
	broker::Broker,
	config::{BrokerConfig, EmbeddedConfig},
	crypto::DefaultCryptoProvider,
	embedded::EmbeddedClient,
	error::Error,
	flows::{Orchestrator, TokenRequest},
	interaction::{InteractionClient, InteractiveRequest, RedirectCompletion},
	network::{NetworkClient, RefreshExchange, TokenGrant},
	store::MemoryTokenStore,
	transport,
};

const AUTHORITY: &str = "https://login.example.com/common";

type Boxed<'a, T> = Pin<Box<dyn Future<Output = Result<T, Error>> + 'a + Send>>;

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let broker_config = BrokerConfig::builder(ClientId::new("host-app")?)
		.trust("https://*.contoso.com")
		.build()?;
	let broker = Arc::new(Broker::new(broker_config, orchestrator("alice")?));
	let (hub, inbox) = transport::memory::channel();

	tokio::spawn(broker.clone().listen(inbox));

	let embedded_config = EmbeddedConfig::builder(ClientId::new("mail-app")?)
		.trust_broker("https://host.contoso.com")
		.handshake_timeout(StdDuration::from_millis(500))
		.build()?;
	let client = EmbeddedClient::new(
		embedded_config,
		Arc::new(hub.connect("https://mail.contoso.com", "https://host.contoso.com")),
		orchestrator("nobody")?,
	);

	client.initialize().await?;

	println!("Bond state after the handshake: {:?}.", client.state());

	let request = TokenRequest::new(AUTHORITY, ScopeSet::new(["Mail.Read"])?);
	let popup = client.acquire_token_popup(&request).await?;

	println!(
		"Popup through the broker signed in {} (token `{}`).",
		popup.account.username,
		popup.access_token.as_ref().map(TokenSecret::expose).unwrap_or_default(),
	);

	match client.acquire_token_silent(&request.clone().with_account(popup.account.clone())).await {
		Ok(silent) => println!("Silent acquisition served from cache: {}.", silent.from_cache),
		Err(e) => println!("Silent acquisition failed: {e}."),
	}

	println!("Broker answered {} requests.", broker.dispatched());

	Ok(())
}

fn orchestrator(user: &str) -> Result<Arc<Orchestrator>> {
	let account = AccountInfo::new(
		HomeAccountId::new(user)?,
		"login.example.com",
		"tenant-1",
		format!("{user}@contoso.com"),
	);

	Ok(Arc::new(Orchestrator::new(
		Arc::new(MemoryTokenStore::default()),
		Arc::new(OfflineNetwork),
		Arc::new(ScriptedInteraction { account }),
		Arc::new(DefaultCryptoProvider::new()),
	)))
}

/// Token endpoint that never renews.
struct OfflineNetwork;
impl NetworkClient for OfflineNetwork {
	fn refresh<'a>(&'a self, _: &'a RefreshExchange) -> Boxed<'a, TokenGrant> {
		Box::pin(async {
			Err(Error::InteractionRequired { code: "login_required".into(), description: None })
		})
	}
}

/// Signs `account` in on every popup or hidden frame.
struct ScriptedInteraction {
	account: AccountInfo,
}
impl ScriptedInteraction {
	fn grant(&self, request: &InteractiveRequest, access: &str) -> TokenGrant {
		TokenGrant {
			account: self.account.clone(),
			access_token: Some(TokenSecret::new(access)),
			id_token: None,
			refresh_token: Some(TokenSecret::new(format!("{access}-refresh"))),
			scopes: request.request.scopes.clone(),
			expires_in: Duration::hours(1),
		}
	}
}
impl InteractionClient for ScriptedInteraction {
	fn popup<'a>(&'a self, request: &'a InteractiveRequest) -> Boxed<'a, TokenGrant> {
		Box::pin(async move { Ok(self.grant(request, "popup-token")) })
	}

	fn silent_iframe<'a>(&'a self, request: &'a InteractiveRequest) -> Boxed<'a, TokenGrant> {
		Box::pin(async move { Ok(self.grant(request, "iframe-token")) })
	}

	fn redirect<'a>(&'a self, _: &'a InteractiveRequest) -> Boxed<'a, ()> {
		Box::pin(async { Ok(()) })
	}

	fn handle_redirect(&self) -> Boxed<'_, Option<RedirectCompletion>> {
		Box::pin(async { Ok(None) })
	}
}
