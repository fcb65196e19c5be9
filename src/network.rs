//! Network collaborator contract for token-endpoint exchanges.
//!
//! The orchestrator interprets [`TokenGrant`]s and classified errors but never speaks HTTP
//! itself. The default reqwest-backed implementation lives in [`reqwest`] behind the
//! `reqwest` feature.

#[cfg(feature = "reqwest")] pub mod reqwest;
#[cfg(feature = "reqwest")] pub use reqwest::ReqwestNetworkClient;

// self
use crate::{
	_prelude::*,
	auth::{
		AccessTokenEntry, AccountInfo, ClientId, CorrelationId, ScopeSet, TokenBundle, TokenSecret,
	},
	error::{ConfigError, ServerError},
	flows::AcquisitionResult,
};

const AUTHORIZE_PATH: &str = "oauth2/v2.0/authorize";
const TOKEN_PATH: &str = "oauth2/v2.0/token";

/// OAuth error codes that mean the user has to take part before a token can be issued.
pub const INTERACTION_REQUIRED_CODES: [&str; 5] =
	["interaction_required", "login_required", "consent_required", "bad_token", "invalid_grant"];

/// Boxed future returned by [`NetworkClient`] operations.
pub type NetworkFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Token endpoint exchanges the orchestrator delegates.
pub trait NetworkClient
where
	Self: Send + Sync,
{
	/// Redeems a refresh token for a new grant (`grant_type=refresh_token`).
	fn refresh<'a>(&'a self, exchange: &'a RefreshExchange) -> NetworkFuture<'a, TokenGrant>;

	/// Resolves the endpoints of `authority`.
	///
	/// The default derives them from the conventional v2.0 layout without a round trip.
	fn discover<'a>(&'a self, authority: &'a str) -> NetworkFuture<'a, AuthorityMetadata> {
		Box::pin(async move { Ok(AuthorityMetadata::conventional(authority)?) })
	}
}

/// Endpoints an authority publishes in its OpenID configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityMetadata {
	/// Token issuer identifier.
	pub issuer: String,
	/// Where interactive flows navigate to.
	pub authorization_endpoint: Url,
	/// Where codes and refresh tokens are redeemed.
	pub token_endpoint: Url,
	/// Sign-out endpoint, when the authority has one.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub end_session_endpoint: Option<Url>,
}
impl AuthorityMetadata {
	/// Endpoints under the conventional `{authority}/oauth2/v2.0/` layout.
	pub fn conventional(authority: &str) -> Result<Self, ConfigError> {
		let base = authority.trim_end_matches('/');
		let endpoint = |path: &str| {
			Url::parse(&format!("{base}/{path}")).map_err(|source| ConfigError::InvalidAuthority {
				authority: authority.into(),
				source,
			})
		};

		Ok(Self {
			issuer: format!("{base}/v2.0"),
			authorization_endpoint: endpoint(AUTHORIZE_PATH)?,
			token_endpoint: endpoint(TOKEN_PATH)?,
			end_session_endpoint: None,
		})
	}
}

/// Inputs of one refresh-token exchange.
#[derive(Clone, Debug)]
pub struct RefreshExchange {
	/// Canonical authority URL.
	pub authority: String,
	/// Client the refresh token was issued to.
	pub client_id: ClientId,
	/// Account being renewed; echoed back in the grant.
	pub account: AccountInfo,
	/// Refresh credential.
	pub refresh_token: TokenSecret,
	/// Scopes requested for the new access token.
	pub scopes: ScopeSet,
	/// Correlation id forwarded to the identity provider.
	pub correlation_id: CorrelationId,
}

/// Tokens issued by one successful exchange.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenGrant {
	/// Account the tokens belong to.
	pub account: AccountInfo,
	/// Access token, if one was issued.
	pub access_token: Option<TokenSecret>,
	/// ID token, if one was issued.
	pub id_token: Option<TokenSecret>,
	/// Refresh token, if one was issued or rotated.
	pub refresh_token: Option<TokenSecret>,
	/// Scopes granted.
	pub scopes: ScopeSet,
	/// Lifetime of the access token.
	pub expires_in: Duration,
}
impl TokenGrant {
	/// Everything worth persisting from the grant, issued at `issued_at`.
	pub fn bundle(&self, issued_at: OffsetDateTime) -> TokenBundle {
		TokenBundle {
			access_token: self.access_token.clone().map(|secret| {
				AccessTokenEntry::new(secret, self.scopes.clone(), issued_at, self.expires_in)
			}),
			id_token: self.id_token.clone(),
			refresh_token: self.refresh_token.clone(),
		}
	}

	/// Result handed to the caller for a freshly issued grant.
	pub fn to_result(
		&self,
		correlation_id: CorrelationId,
		issued_at: OffsetDateTime,
	) -> AcquisitionResult {
		AcquisitionResult {
			account: self.account.clone(),
			access_token: self.access_token.clone(),
			id_token: self.id_token.clone(),
			scopes: self.scopes.clone(),
			expires_on: issued_at + self.expires_in,
			from_cache: false,
			correlation_id,
			tokens_to_cache: None,
		}
	}
}

/// Maps an OAuth error response to the crate taxonomy.
pub fn classify_oauth_error(code: &str, description: Option<String>, status: Option<u16>) -> Error {
	if INTERACTION_REQUIRED_CODES.contains(&code) {
		Error::InteractionRequired { code: code.into(), description }
	} else {
		ServerError { code: code.into(), description, status }.into()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::_preludet::*;

	#[test]
	fn interaction_codes_are_classified() {
		for code in INTERACTION_REQUIRED_CODES {
			assert!(classify_oauth_error(code, None, Some(400)).is_interaction_required());
		}

		match classify_oauth_error("invalid_client", Some("bad secret".into()), Some(401)) {
			Error::Server(server) => {
				assert_eq!(server.code, "invalid_client");
				assert_eq!(server.status, Some(401));
			},
			other => panic!("Unexpected classification: {other:?}."),
		}
	}

	#[test]
	fn conventional_metadata_follows_the_v2_layout() {
		let metadata = AuthorityMetadata::conventional("https://login.example.com/common/")
			.expect("Authority should produce endpoints.");

		assert_eq!(metadata.issuer, "https://login.example.com/common/v2.0");
		assert_eq!(
			metadata.token_endpoint.as_str(),
			"https://login.example.com/common/oauth2/v2.0/token"
		);
		assert_eq!(
			metadata.authorization_endpoint.as_str(),
			"https://login.example.com/common/oauth2/v2.0/authorize"
		);
		assert!(matches!(
			AuthorityMetadata::conventional("not a url"),
			Err(ConfigError::InvalidAuthority { .. })
		));
	}

	#[test]
	fn grants_convert_to_bundles_and_results() {
		let grant = test_grant(test_account("uid"), &["User.Read"], "at");
		let issued_at = OffsetDateTime::now_utc();
		let correlation = CorrelationId::new("c").expect("Correlation id should be valid.");
		let bundle = grant.bundle(issued_at);
		let result = grant.to_result(correlation, issued_at);

		assert_eq!(
			bundle.access_token.as_ref().map(|entry| entry.expires_at),
			Some(issued_at + Duration::hours(1))
		);
		assert!(bundle.refresh_token.is_some());
		assert_eq!(result.expires_on, issued_at + Duration::hours(1));
		assert!(!result.from_cache);
		assert!(result.tokens_to_cache.is_none());
	}
}
