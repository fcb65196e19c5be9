//! Acquisition orchestrator shared by standalone apps and the broker.
//!
//! [`Orchestrator`] owns the collaborators (token store, network, interaction, crypto) and
//! implements every acquisition path. Silent acquisition follows a strict chain: a cached
//! token when one is fresh, otherwise exactly one refresh-token renewal, and an
//! interaction-required failure propagated untouched. Interactive UI only ever starts from an
//! explicit popup or redirect call.

pub mod common;
pub mod interactive;
pub mod silent;

mod metrics;

pub use common::*;
pub use interactive::RedirectOutcome;
pub use metrics::AcquisitionMetrics;

// self
use crate::{
	_prelude::*,
	auth::{AccountInfo, ClientId, CorrelationId, HomeAccountId},
	crypto::CryptoProvider,
	interaction::InteractionClient,
	network::{NetworkClient, TokenGrant},
	store::{TokenKey, TokenStore},
};

/// Runs acquisitions against one set of collaborators.
pub struct Orchestrator {
	/// Token cache collaborator.
	pub store: Arc<dyn TokenStore>,
	/// Token endpoint collaborator.
	pub network: Arc<dyn NetworkClient>,
	/// Navigation collaborator.
	pub interaction: Arc<dyn InteractionClient>,
	/// Crypto collaborator.
	pub crypto: Arc<dyn CryptoProvider>,
	/// Counters for silent acquisitions.
	pub metrics: Arc<AcquisitionMetrics>,
	renewal: RenewalPolicy,
	active_account: RwLock<Option<AccountInfo>>,
	interaction_lock: AsyncMutex<()>,
	flow_guards: Mutex<HashMap<TokenKey, Arc<AsyncMutex<()>>>>,
}
impl Orchestrator {
	/// Creates an orchestrator over the given collaborators.
	pub fn new(
		store: Arc<dyn TokenStore>,
		network: Arc<dyn NetworkClient>,
		interaction: Arc<dyn InteractionClient>,
		crypto: Arc<dyn CryptoProvider>,
	) -> Self {
		Self {
			store,
			network,
			interaction,
			crypto,
			metrics: Default::default(),
			renewal: Default::default(),
			active_account: RwLock::new(None),
			interaction_lock: AsyncMutex::new(()),
			flow_guards: Default::default(),
		}
	}

	/// Overrides the preemptive renewal window (defaults to five minutes).
	pub fn with_preemptive_window(mut self, window: Duration) -> Self {
		self.renewal = RenewalPolicy::new(window);

		self
	}

	/// Account used when a request names none.
	pub fn active_account(&self) -> Option<AccountInfo> {
		self.active_account.read().clone()
	}

	/// Replaces the active account.
	pub fn set_active_account(&self, account: Option<AccountInfo>) {
		*self.active_account.write() = account;
	}

	/// Signs `account` out of the local cache and clears it if it was active.
	pub async fn remove_account(&self, account: &HomeAccountId) -> Result<usize> {
		let removed = self.store.remove_account(account).await?;
		let mut active = self.active_account.write();

		if active.as_ref().is_some_and(|current| &current.home_account_id == account) {
			*active = None;
		}

		Ok(removed)
	}

	fn resolve_account(&self, request: &TokenRequest) -> Option<AccountInfo> {
		request.account.clone().or_else(|| self.active_account())
	}

	fn correlation_id(&self, request: &TokenRequest) -> Result<CorrelationId> {
		match &request.correlation_id {
			Some(id) => Ok(id.clone()),
			None => Ok(self.crypto.generate_correlation_id()?),
		}
	}

	/// Returns (and creates on demand) the singleflight guard for a token key.
	fn flow_guard(&self, key: &TokenKey) -> Arc<AsyncMutex<()>> {
		let mut guards = self.flow_guards.lock();

		guards.entry(key.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
	}

	/// Persists a grant, makes its account active, and builds the caller's result.
	async fn commit_grant(
		&self,
		client_id: &ClientId,
		authority: &str,
		grant: TokenGrant,
		correlation_id: CorrelationId,
	) -> Result<AcquisitionResult> {
		let issued_at = OffsetDateTime::now_utc();
		let key = TokenKey::new(
			grant.account.home_account_id.clone(),
			client_id.clone(),
			authority,
			grant.scopes.clone(),
		);
		let bundle = grant.bundle(issued_at);

		if !bundle.is_empty() {
			self.store.set_tokens(&key, bundle).await?;
		}

		self.set_active_account(Some(grant.account.clone()));

		Ok(grant.to_result(correlation_id, issued_at))
	}
}
impl Debug for Orchestrator {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Orchestrator")
			.field("renewal", &self.renewal)
			.field("active_account", &self.active_account.read().as_ref().map(|a| &a.username))
			.finish()
	}
}
