//! Thread-safe in-memory [`TokenStore`] for single-page lifetimes and tests.

// self
use crate::{
	_prelude::*,
	auth::{AccessTokenEntry, ClientId, HomeAccountId, TokenBundle, TokenSecret},
	store::{StoreError, StoreFuture, TokenKey, TokenStore},
};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct PartitionKey {
	account: HomeAccountId,
	client_id: ClientId,
	authority: String,
}
impl From<&TokenKey> for PartitionKey {
	fn from(key: &TokenKey) -> Self {
		Self {
			account: key.account.clone(),
			client_id: key.client_id.clone(),
			authority: key.authority.clone(),
		}
	}
}

#[derive(Clone, Debug, Default)]
struct Partition {
	access_tokens: Vec<AccessTokenEntry>,
	id_token: Option<TokenSecret>,
	refresh_token: Option<TokenSecret>,
}

type PartitionMap = Arc<RwLock<HashMap<PartitionKey, Partition>>>;

/// Keeps tokens in-process, partitioned by account, client, and authority.
///
/// Access tokens are matched by scope superset; storing a new access token evicts older ones
/// whose scopes overlap it.
#[derive(Clone, Debug, Default)]
pub struct MemoryTokenStore(PartitionMap);
impl MemoryTokenStore {
	/// Number of stored access tokens across all partitions.
	pub fn access_token_count(&self) -> usize {
		self.0.read().values().map(|partition| partition.access_tokens.len()).sum()
	}

	fn access_now(map: &PartitionMap, key: &TokenKey) -> Option<AccessTokenEntry> {
		let guard = map.read();
		let partition = guard.get(&PartitionKey::from(key))?;

		partition
			.access_tokens
			.iter()
			.filter(|entry| entry.scopes.is_superset_of(&key.scopes))
			.max_by_key(|entry| entry.expires_at)
			.cloned()
	}

	fn set_now(map: &PartitionMap, key: &TokenKey, bundle: TokenBundle) {
		let mut guard = map.write();
		let partition = guard.entry(PartitionKey::from(key)).or_default();

		if let Some(entry) = bundle.access_token {
			partition.access_tokens.retain(|existing| !existing.scopes.intersects(&entry.scopes));
			partition.access_tokens.push(entry);
		}
		if let Some(id_token) = bundle.id_token {
			partition.id_token = Some(id_token);
		}
		if let Some(refresh_token) = bundle.refresh_token {
			partition.refresh_token = Some(refresh_token);
		}
	}
}
impl TokenStore for MemoryTokenStore {
	fn access_token<'a>(&'a self, key: &'a TokenKey) -> StoreFuture<'a, Option<AccessTokenEntry>> {
		Box::pin(async move { Ok(Self::access_now(&self.0, key)) })
	}

	fn id_token<'a>(&'a self, key: &'a TokenKey) -> StoreFuture<'a, Option<TokenSecret>> {
		Box::pin(async move {
			Ok(self.0.read().get(&PartitionKey::from(key)).and_then(|p| p.id_token.clone()))
		})
	}

	fn refresh_token<'a>(&'a self, key: &'a TokenKey) -> StoreFuture<'a, Option<TokenSecret>> {
		Box::pin(async move {
			Ok(self.0.read().get(&PartitionKey::from(key)).and_then(|p| p.refresh_token.clone()))
		})
	}

	fn set_tokens<'a>(&'a self, key: &'a TokenKey, bundle: TokenBundle) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			if bundle.is_empty() {
				return Err(StoreError::Backend { message: "refusing to store an empty bundle".into() });
			}

			Self::set_now(&self.0, key, bundle);

			Ok(())
		})
	}

	fn remove_account<'a>(&'a self, account: &'a HomeAccountId) -> StoreFuture<'a, usize> {
		Box::pin(async move {
			let mut guard = self.0.write();
			let before = guard.len();

			guard.retain(|partition, _| &partition.account != account);

			Ok(before - guard.len())
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::auth::ScopeSet;

	fn key(scopes: &[&str]) -> TokenKey {
		TokenKey::new(
			HomeAccountId::new("uid.utid").expect("Account fixture should be valid."),
			ClientId::new("child-app").expect("Client fixture should be valid."),
			"https://login.example.com/common",
			ScopeSet::new(scopes.iter().copied()).expect("Scope fixture should be valid."),
		)
	}

	fn bundle(access: &str, scopes: &[&str]) -> TokenBundle {
		TokenBundle {
			access_token: Some(AccessTokenEntry::new(
				TokenSecret::new(access),
				ScopeSet::new(scopes.iter().copied()).expect("Scope fixture should be valid."),
				OffsetDateTime::now_utc(),
				Duration::hours(1),
			)),
			id_token: None,
			refresh_token: Some(TokenSecret::new(format!("{access}-refresh"))),
		}
	}

	#[tokio::test]
	async fn access_tokens_match_by_scope_superset() {
		let store = MemoryTokenStore::default();

		store
			.set_tokens(&key(&["User.Read", "Mail.Read"]), bundle("at-1", &["User.Read", "Mail.Read"]))
			.await
			.expect("Bundle should be stored.");

		let hit = store
			.access_token(&key(&["User.Read"]))
			.await
			.expect("Lookup should succeed.")
			.expect("Superset entry should satisfy a subset request.");

		assert_eq!(hit.secret.expose(), "at-1");
		assert!(
			store
				.access_token(&key(&["Files.Read"]))
				.await
				.expect("Lookup should succeed.")
				.is_none()
		);
	}

	#[tokio::test]
	async fn overlapping_access_tokens_are_replaced() {
		let store = MemoryTokenStore::default();

		store.set_tokens(&key(&["a"]), bundle("old", &["a", "b"])).await.expect("Store old.");
		store.set_tokens(&key(&["b"]), bundle("new", &["b", "c"])).await.expect("Store new.");

		assert_eq!(store.access_token_count(), 1);
		assert_eq!(
			store
				.refresh_token(&key(&["a"]))
				.await
				.expect("Lookup should succeed.")
				.map(|secret| secret.expose().to_owned()),
			Some("new-refresh".into())
		);
	}

	#[tokio::test]
	async fn remove_account_clears_partitions() {
		let store = MemoryTokenStore::default();
		let key = key(&["a"]);

		store.set_tokens(&key, bundle("at", &["a"])).await.expect("Bundle should be stored.");

		assert_eq!(store.remove_account(&key.account).await.expect("Removal should succeed."), 1);
		assert!(store.access_token(&key).await.expect("Lookup should succeed.").is_none());
		assert!(store.set_tokens(&key, TokenBundle::default()).await.is_err());
	}
}
