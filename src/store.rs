//! Token cache collaborator contract and the in-memory implementation.
//!
//! Long-term persistence and eviction belong to the host. The orchestrator only needs the
//! four lookups below, and treats every entry it reads as a hint to be checked against the
//! clock.

pub mod memory;

pub use memory::MemoryTokenStore;

// self
use crate::{
	_prelude::*,
	auth::{AccessTokenEntry, ClientId, HomeAccountId, ScopeSet, TokenBundle, TokenSecret},
};

/// Boxed future returned by [`TokenStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Token cache used by the orchestrator.
pub trait TokenStore
where
	Self: Send + Sync,
{
	/// Access token for `key` whose scopes cover `key.scopes`, if any.
	fn access_token<'a>(&'a self, key: &'a TokenKey) -> StoreFuture<'a, Option<AccessTokenEntry>>;

	/// ID token stored for the account partition of `key`.
	fn id_token<'a>(&'a self, key: &'a TokenKey) -> StoreFuture<'a, Option<TokenSecret>>;

	/// Refresh token stored for the account partition of `key`.
	fn refresh_token<'a>(&'a self, key: &'a TokenKey) -> StoreFuture<'a, Option<TokenSecret>>;

	/// Stores everything in `bundle` under `key`; absent parts leave existing entries alone.
	fn set_tokens<'a>(&'a self, key: &'a TokenKey, bundle: TokenBundle) -> StoreFuture<'a, ()>;

	/// Drops every token of `account` and returns how many partitions were removed.
	fn remove_account<'a>(&'a self, account: &'a HomeAccountId) -> StoreFuture<'a, usize>;
}

/// Error type produced by [`TokenStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Identifies the tokens one account holds for one client at one authority.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenKey {
	/// Account the tokens belong to.
	pub account: HomeAccountId,
	/// Client the tokens were issued to.
	pub client_id: ClientId,
	/// Canonical authority URL.
	pub authority: String,
	/// Scopes the caller needs.
	pub scopes: ScopeSet,
}
impl TokenKey {
	/// Builds a key from its parts.
	pub fn new(
		account: HomeAccountId,
		client_id: ClientId,
		authority: impl Into<String>,
		scopes: ScopeSet,
	) -> Self {
		Self { account, client_id, authority: authority.into(), scopes }
	}

	/// Same key with a different scope set.
	pub fn with_scopes(&self, scopes: ScopeSet) -> Self {
		Self { scopes, ..self.clone() }
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::error::Error as StdError;
	// self
	use super::*;

	#[test]
	fn store_error_converts_into_crate_error_with_source() {
		let store_error = StoreError::Backend { message: "database unreachable".into() };
		let error: Error = store_error.clone().into();

		assert!(matches!(error, Error::Storage(_)));
		assert!(error.to_string().contains("database unreachable"));

		let source = StdError::source(&error).expect("Error should expose the store error.");

		assert_eq!(source.to_string(), store_error.to_string());
	}

	#[test]
	fn keys_compare_scopes_as_sets() {
		let account = HomeAccountId::new("uid.utid").expect("Account fixture should be valid.");
		let client = ClientId::new("child-app").expect("Client fixture should be valid.");
		let lhs = TokenKey::new(
			account.clone(),
			client.clone(),
			"https://login.example.com/common",
			ScopeSet::new(["b", "a"]).expect("Scope fixture should be valid."),
		);
		let rhs = TokenKey::new(
			account,
			client,
			"https://login.example.com/common",
			ScopeSet::new(["a", "b", "a"]).expect("Scope fixture should be valid."),
		);

		assert_eq!(lhs, rhs);
	}
}
