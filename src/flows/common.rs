//! Request and result types shared by every acquisition path, plus the renewal policy.

// self
use crate::{
	_prelude::*,
	auth::{AccessTokenEntry, AccountInfo, CorrelationId, ScopeSet, TokenBundle, TokenSecret},
	store::TokenKey,
};

/// A token acquisition request, as issued by an application or forwarded by an embedded client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
	/// Canonical authority URL.
	pub authority: String,
	/// Scopes the caller needs.
	pub scopes: ScopeSet,
	/// Account to acquire for; falls back to the active account.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub account: Option<AccountInfo>,
	/// Login hint forwarded to interactive and hidden-frame flows.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub login_hint: Option<String>,
	/// OpenID Connect `prompt` value forwarded to interactive flows.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub prompt: Option<String>,
	/// Skip the token cache and renew immediately.
	#[serde(default, skip_serializing_if = "is_false")]
	pub force_refresh: bool,
	/// Correlation id to reuse instead of generating one.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub correlation_id: Option<CorrelationId>,
	/// Redirect URI overriding the configured one.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub redirect_uri: Option<Url>,
}
impl TokenRequest {
	/// Creates a request for `scopes` at `authority`.
	pub fn new(authority: impl Into<String>, scopes: ScopeSet) -> Self {
		Self {
			authority: authority.into(),
			scopes,
			account: None,
			login_hint: None,
			prompt: None,
			force_refresh: false,
			correlation_id: None,
			redirect_uri: None,
		}
	}

	/// Targets a specific account.
	pub fn with_account(mut self, account: AccountInfo) -> Self {
		self.account = Some(account);

		self
	}

	/// Sets the login hint.
	pub fn with_login_hint(mut self, login_hint: impl Into<String>) -> Self {
		self.login_hint = Some(login_hint.into());

		self
	}

	/// Sets the `prompt` value.
	pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
		self.prompt = Some(prompt.into());

		self
	}

	/// Bypasses the token cache.
	pub fn force_refresh(mut self) -> Self {
		self.force_refresh = true;

		self
	}

	/// Reuses an existing correlation id.
	pub fn with_correlation_id(mut self, correlation_id: CorrelationId) -> Self {
		self.correlation_id = Some(correlation_id);

		self
	}

	/// Overrides the redirect URI.
	pub fn with_redirect_uri(mut self, redirect_uri: Url) -> Self {
		self.redirect_uri = Some(redirect_uri);

		self
	}
}

fn is_false(value: &bool) -> bool {
	!*value
}

/// Successful outcome of an acquisition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcquisitionResult {
	/// Account the tokens belong to.
	pub account: AccountInfo,
	/// Access token, if one was issued.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub access_token: Option<TokenSecret>,
	/// ID token, if one was issued.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id_token: Option<TokenSecret>,
	/// Scopes the access token covers.
	pub scopes: ScopeSet,
	/// Expiry instant of the access token.
	#[serde(with = "time::serde::rfc3339")]
	pub expires_on: OffsetDateTime,
	/// Whether the tokens came from a cache instead of the identity provider.
	pub from_cache: bool,
	/// Correlation id of the acquisition.
	pub correlation_id: CorrelationId,
	/// Tokens a brokered embedded app should put in its own cache.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tokens_to_cache: Option<TokenBundle>,
}
impl AcquisitionResult {
	/// Builds a result served from the token store.
	pub fn from_cache(
		account: AccountInfo,
		entry: AccessTokenEntry,
		id_token: Option<TokenSecret>,
		correlation_id: CorrelationId,
	) -> Self {
		Self {
			account,
			access_token: Some(entry.secret),
			id_token,
			scopes: entry.scopes,
			expires_on: entry.expires_at,
			from_cache: true,
			correlation_id,
			tokens_to_cache: None,
		}
	}

	/// Returns `true` once the access token expired at `instant`.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		instant >= self.expires_on
	}

	/// Bundle an embedded app may cache: the access and ID tokens, never a refresh token.
	///
	/// `None` when the result carries no access token.
	pub fn cacheable_bundle(&self, now: OffsetDateTime) -> Option<TokenBundle> {
		let secret = self.access_token.clone()?;

		Some(TokenBundle {
			access_token: Some(AccessTokenEntry {
				secret,
				scopes: self.scopes.clone(),
				issued_at: now.min(self.expires_on),
				expires_at: self.expires_on,
			}),
			id_token: self.id_token.clone(),
			refresh_token: None,
		})
	}
}

/// Decides when a cached access token is too close to expiry to hand out.
///
/// The preemptive window is shortened by a deterministic per-key jitter so callers sharing a
/// store do not all renew at the same instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenewalPolicy {
	preemptive_window: Duration,
}
impl RenewalPolicy {
	/// Window used when none is configured.
	pub const DEFAULT_PREEMPTIVE_WINDOW: Duration = Duration::minutes(5);

	/// Creates a policy; negative windows clamp to zero.
	pub fn new(preemptive_window: Duration) -> Self {
		Self {
			preemptive_window: if preemptive_window.is_negative() {
				Duration::ZERO
			} else {
				preemptive_window
			},
		}
	}

	/// Configured window before jitter.
	pub fn preemptive_window(&self) -> Duration {
		self.preemptive_window
	}

	/// Returns `true` if `entry` must be renewed instead of served.
	pub fn should_renew(&self, key: &TokenKey, entry: &AccessTokenEntry, now: OffsetDateTime) -> bool {
		if entry.is_expired_at(now) {
			return true;
		}

		let window = self.effective_window(key);

		!window.is_zero() && entry.expires_at - now <= window
	}

	fn effective_window(&self, key: &TokenKey) -> Duration {
		self.preemptive_window.checked_sub(self.jitter(key)).unwrap_or(Duration::ZERO)
	}

	fn jitter(&self, key: &TokenKey) -> Duration {
		let window_secs = self.preemptive_window.whole_seconds();

		if window_secs <= 1 {
			return Duration::ZERO;
		}

		let modulus = u64::try_from(window_secs).unwrap_or(u64::MAX);
		let mut hasher = DefaultHasher::new();

		key.hash(&mut hasher);

		// Jitter stays strictly below a tenth of the window.
		let jitter_secs = hasher.finish() % (modulus / 10).max(1);

		Duration::seconds(i64::try_from(jitter_secs).unwrap_or(i64::MAX))
	}
}
impl Default for RenewalPolicy {
	fn default() -> Self {
		Self::new(Self::DEFAULT_PREEMPTIVE_WINDOW)
	}
}
