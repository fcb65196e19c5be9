//! Brokered token acquisition for embedded apps.
//!
//! A trusted top-level [`broker::Broker`] answers token requests on behalf of embedded
//! applications running in dependent contexts, so a user signs in once per browser profile.
//! Embedded apps bond with the broker through a pinned-origin handshake
//! ([`embedded::EmbeddedClient`]), and every acquisition path, standalone or brokered, runs
//! the same [`flows::Orchestrator`] fallback chain: cached token, then one silent renewal,
//! then an interactive flow only when the caller asks for one.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod app;
pub mod auth;
pub mod broker;
pub mod cache;
pub mod config;
pub mod crypto;
pub mod embedded;
pub mod error;
pub mod flows;
pub mod interaction;
pub mod network;
pub mod obs;
pub mod protocol;
pub mod store;
pub mod thumbprint;
pub mod transport;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports for tests; enabled via `cfg(test)` or the `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::{AccountInfo, HomeAccountId, ScopeSet, TokenSecret},
		network::TokenGrant,
	};

	/// Builds the account used across unit tests.
	pub fn test_account(id: &str) -> AccountInfo {
		AccountInfo::new(
			HomeAccountId::new(id).expect("Test account identifier should be valid."),
			"login.example.com",
			"tenant-1",
			format!("{id}@example.com"),
		)
	}

	/// Builds a one-hour grant for `account` covering `scopes`.
	pub fn test_grant(account: AccountInfo, scopes: &[&str], access: &str) -> TokenGrant {
		TokenGrant {
			account,
			access_token: Some(TokenSecret::new(access)),
			id_token: Some(TokenSecret::new(format!("{access}-id"))),
			refresh_token: Some(TokenSecret::new(format!("{access}-refresh"))),
			scopes: ScopeSet::new(scopes.iter().copied())
				.expect("Test grant scopes should be valid."),
			expires_in: Duration::hours(1),
		}
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, BTreeSet, HashMap, VecDeque, hash_map::DefaultHasher},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		hash::{Hash, Hasher},
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use serde_json::Value;
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
