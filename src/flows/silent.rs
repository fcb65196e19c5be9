//! Silent acquisition: token cache, then exactly one refresh-token renewal.
//!
//! [`Orchestrator::acquire_token_silent_or_throw`] acquires a per-[`TokenKey`] singleflight
//! guard, serves a cached access token unless it sits inside the jittered preemptive window
//! (or the caller forced a refresh), and otherwise redeems the cached refresh token once.
//! Failures are returned exactly as the network collaborator classified them; an
//! interaction-required outcome never starts UI from here.

// self
use crate::{
	_prelude::*,
	auth::ClientId,
	flows::{AcquisitionResult, Orchestrator, TokenRequest},
	network::RefreshExchange,
	obs::{self, FlowKind},
	store::TokenKey,
};

impl Orchestrator {
	/// Acquires a token without user interaction or fails.
	pub async fn acquire_token_silent_or_throw(
		&self,
		client_id: &ClientId,
		request: &TokenRequest,
	) -> Result<AcquisitionResult> {
		self.metrics.record_attempt();

		obs::observe(FlowKind::Silent, "acquire_token_silent_or_throw", async move {
			let account = self.resolve_account(request).ok_or_else(|| Error::InteractionRequired {
				code: "no_account".into(),
				description: Some("No account was supplied and none is active.".into()),
			})?;
			let correlation_id = self.correlation_id(request)?;
			let key = TokenKey::new(
				account.home_account_id.clone(),
				client_id.clone(),
				&request.authority,
				request.scopes.clone(),
			);
			let guard = self.flow_guard(&key);
			let _singleflight = guard.lock().await;
			let now = OffsetDateTime::now_utc();

			if !request.force_refresh {
				if let Some(entry) = self
					.store
					.access_token(&key)
					.await?
					.filter(|entry| !self.renewal.should_renew(&key, entry, now))
				{
					let id_token = self.store.id_token(&key).await?;

					tracing::debug!(account = %account.home_account_id, "token cache hit");
					self.metrics.record_cache_hit();

					return Ok(AcquisitionResult::from_cache(account, entry, id_token, correlation_id));
				}

				tracing::debug!(account = %account.home_account_id, "token cache miss");
			}

			let refresh_token =
				self.store.refresh_token(&key).await?.ok_or_else(|| Error::InteractionRequired {
					code: "no_tokens_found".into(),
					description: Some("No refresh token is cached for the account.".into()),
				})?;
			let exchange = RefreshExchange {
				authority: request.authority.clone(),
				client_id: client_id.clone(),
				account,
				refresh_token,
				scopes: request.scopes.clone(),
				correlation_id: correlation_id.clone(),
			};

			self.metrics.record_renewal();

			let grant = self.network.refresh(&exchange).await?;

			self.commit_grant(client_id, &request.authority, grant, correlation_id).await
		})
		.await
		.inspect_err(|e| {
			self.metrics.record_failure();

			tracing::debug!(error = %e, "silent acquisition failed");
		})
	}
}
