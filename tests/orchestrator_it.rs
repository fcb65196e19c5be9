mod common;

// std
use std::sync::{Arc, atomic::Ordering};
// crates.io
use serde_json::Value;
use time::Duration;
// self
use common::*;
use oauth2_nested_broker::{
	app::Application,
	auth::{CorrelationId, IdentifierError},
	crypto::{CryptoError, CryptoProvider, DefaultCryptoProvider, KeyRef, PkcePair},
	error::Error,
	flows::Orchestrator,
	store::MemoryTokenStore,
};

/// Provider whose id generator always fails.
struct BrokenIds(DefaultCryptoProvider);
impl CryptoProvider for BrokenIds {
	fn generate_correlation_id(&self) -> Result<CorrelationId, CryptoError> {
		Err(IdentifierError::Empty { kind: "correlation" }.into())
	}

	fn generate_pkce_pair(&self) -> PkcePair {
		self.0.generate_pkce_pair()
	}

	fn digest(&self, input: &[u8]) -> String {
		self.0.digest(input)
	}

	fn derive_binding_key(&self, context: &str) -> Result<KeyRef, CryptoError> {
		self.0.derive_binding_key(context)
	}

	fn sign_token(&self, payload: &Value, key: &KeyRef) -> Result<String, CryptoError> {
		self.0.sign_token(payload, key)
	}
}

#[tokio::test]
async fn fresh_cached_token_is_returned_without_network() {
	let local = Local::new("user");
	let user = account("user");

	local.seed_access_token(CHILD_CLIENT, &user, &["User.Read", "Mail.Read"], Duration::minutes(1)).await;

	let result = local
		.orchestrator
		.acquire_token_silent_or_throw(&client_id(CHILD_CLIENT), &request(&["User.Read"]).with_account(user))
		.await
		.expect("Cached token should be served.");

	assert!(result.from_cache);
	assert_eq!(local.network.calls(), 0);
	assert_eq!(local.orchestrator.metrics.cache_hits(), 1);
}

#[tokio::test]
async fn stale_or_forced_requests_renew_exactly_once() {
	let local = Local::new("user");
	let user = account("user");
	let client = client_id(CHILD_CLIENT);

	// Expires in two minutes, inside the preemptive window.
	local.seed_access_token(CHILD_CLIENT, &user, &["User.Read"], Duration::minutes(58)).await;

	let renewed = local
		.orchestrator
		.acquire_token_silent_or_throw(&client, &request(&["User.Read"]).with_account(user.clone()))
		.await
		.expect("Stale token should be renewed.");

	assert!(!renewed.from_cache);
	assert_eq!(local.network.calls(), 1);

	local
		.orchestrator
		.acquire_token_silent_or_throw(&client, &request(&["User.Read"]).with_account(user).force_refresh())
		.await
		.expect("Forced refresh should renew.");

	assert_eq!(local.network.calls(), 2);
}

#[tokio::test]
async fn interaction_required_never_escalates() {
	let local = Local::new("user");
	let user = account("user");

	local.seed_refresh_token(CHILD_CLIENT, &user).await;
	local.network.require_interaction("consent_required");

	let err = local
		.orchestrator
		.acquire_token_silent_or_throw(&client_id(CHILD_CLIENT), &request(&["User.Read"]).with_account(user))
		.await
		.expect_err("Renewal should need interaction.");

	assert!(matches!(err, Error::InteractionRequired { ref code, .. } if code == "consent_required"));
	assert_eq!(local.network.calls(), 1);
	assert_eq!(local.interaction.interactive_calls(), 0);
}

#[tokio::test]
async fn missing_account_or_refresh_token_requires_interaction() {
	let local = Local::new("user");
	let client = client_id(CHILD_CLIENT);
	let err = local
		.orchestrator
		.acquire_token_silent_or_throw(&client, &request(&["User.Read"]))
		.await
		.expect_err("No account is known.");

	assert!(matches!(err, Error::InteractionRequired { ref code, .. } if code == "no_account"));

	let err = local
		.orchestrator
		.acquire_token_silent_or_throw(&client, &request(&["User.Read"]).with_account(account("user")))
		.await
		.expect_err("No refresh token is cached.");

	assert!(matches!(err, Error::InteractionRequired { ref code, .. } if code == "no_tokens_found"));
	assert_eq!(local.network.calls(), 0);
}

#[tokio::test]
async fn concurrent_silent_calls_share_one_renewal() {
	let local = Local::new("user");
	let user = account("user");
	let client = client_id(CHILD_CLIENT);

	local.seed_refresh_token(CHILD_CLIENT, &user).await;

	let wanted = request(&["User.Read"]).with_account(user);
	let (lhs, rhs) = tokio::join!(
		local.orchestrator.acquire_token_silent_or_throw(&client, &wanted),
		local.orchestrator.acquire_token_silent_or_throw(&client, &wanted),
	);

	lhs.expect("First call should succeed.");
	rhs.expect("Second call should succeed.");

	assert_eq!(local.network.calls(), 1);
}

#[tokio::test]
async fn standalone_application_runs_interactive_flows_locally() {
	let local = Local::new("user");
	let app = Application::standalone(client_id(CHILD_CLIENT), local.orchestrator.clone());
	let popup = app.acquire_token_popup(&request(&["User.Read"])).await.expect("Popup should succeed.");

	assert_eq!(local.interaction.popups.load(Ordering::SeqCst), 1);
	assert_eq!(local.orchestrator.active_account(), Some(popup.account.clone()));

	let silent = app
		.acquire_token_silent(&request(&["User.Read"]))
		.await
		.expect("Active account should be served from cache.");

	assert!(silent.from_cache);

	app.acquire_token_redirect(&request(&["Mail.Read"])).await.expect("Redirect should start.");

	let completed = app
		.handle_redirect_promise()
		.await
		.expect("Redirect completion should succeed.")
		.expect("A redirect was pending.");

	assert_eq!(completed.access_token.as_ref().map(|token| token.expose()), Some("redirect"));
	assert!(app.handle_redirect_promise().await.expect("Nothing left should be fine.").is_none());
	assert_eq!(local.network.calls(), 0);

	let removed = local
		.orchestrator
		.remove_account(&popup.account.home_account_id)
		.await
		.expect("Account removal should succeed.");

	assert_eq!(removed, 1);
	assert!(local.orchestrator.active_account().is_none());
}

#[tokio::test]
async fn correlation_id_failures_surface_as_crypto_errors() {
	let network = Arc::new(FakeNetwork::default());
	let interaction = Arc::new(FakeInteraction::new(account("user")));
	let orchestrator = Orchestrator::new(
		Arc::new(MemoryTokenStore::default()),
		network.clone(),
		interaction.clone(),
		Arc::new(BrokenIds(DefaultCryptoProvider::new())),
	);
	let err = orchestrator
		.acquire_token_popup(&client_id(CHILD_CLIENT), &request(&["User.Read"]))
		.await
		.expect_err("Popup should fail without a correlation id.");

	assert!(matches!(err, Error::Crypto(CryptoError::InvalidIdentifier(_))), "{err:?}");
	assert_eq!(interaction.popups.load(Ordering::SeqCst), 0);
	assert_eq!(network.calls(), 0);
}
