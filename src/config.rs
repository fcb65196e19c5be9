//! Broker and embedded-client configuration.
//!
//! Both configurations are immutable once built. Builders validate eagerly, and the serde
//! representations (camelCase JSON, durations in milliseconds) run through the same builders,
//! so a loaded configuration is always a validated one.

// std
use std::time::Duration as StdDuration;
// self
use crate::{
	_prelude::*,
	auth::ClientId,
	error::ConfigError,
	protocol::{InteractionType, TrustedDomains},
};

/// Resolves which side's interaction preference wins for interactive brokered requests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InteractionPolicy {
	/// A configured broker preference overrides the embedded app's request.
	#[default]
	BrokerPreferred,
	/// The embedded app's requested type wins; the broker preference only fills gaps.
	EmbeddedPreferred,
}
impl InteractionPolicy {
	/// Picks the interactive flow for a request asking for `requested`.
	///
	/// Non-interactive requests never get upgraded, and a non-interactive broker preference is
	/// ignored.
	pub fn resolve(
		self,
		broker_preference: Option<InteractionType>,
		requested: InteractionType,
	) -> InteractionType {
		if !requested.is_interactive() {
			return requested;
		}

		let broker_preference = broker_preference.filter(|preference| preference.is_interactive());

		match (self, broker_preference) {
			(Self::BrokerPreferred, Some(preference)) => preference,
			_ => requested,
		}
	}
}

/// Settings of a broker application.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "BrokerConfigRepr")]
pub struct BrokerConfig {
	/// Client id of the broker app itself.
	pub client_id: ClientId,
	/// Embedded app origins the broker answers.
	pub trusted_domains: TrustedDomains,
	/// Interactive flow the broker prefers.
	pub preferred_interaction: Option<InteractionType>,
	/// Precedence between the two preferences.
	pub interaction_policy: InteractionPolicy,
	/// Lifetime of unclaimed response cache entries.
	pub response_ttl: Duration,
	/// Redirect URI used for broker-run navigations.
	pub redirect_uri: Option<Url>,
}
impl BrokerConfig {
	/// Default response cache entry lifetime.
	pub const DEFAULT_RESPONSE_TTL: Duration = Duration::minutes(5);

	/// Starts a builder for a broker registered as `client_id`.
	pub fn builder(client_id: ClientId) -> BrokerConfigBuilder {
		BrokerConfigBuilder::new(client_id)
	}
}

/// Builder for [`BrokerConfig`].
#[derive(Debug)]
pub struct BrokerConfigBuilder {
	client_id: ClientId,
	trusted_domains: Vec<String>,
	preferred_interaction: Option<InteractionType>,
	interaction_policy: InteractionPolicy,
	response_ttl: Duration,
	redirect_uri: Option<String>,
}
impl BrokerConfigBuilder {
	/// Creates a builder seeded with defaults.
	pub fn new(client_id: ClientId) -> Self {
		Self {
			client_id,
			trusted_domains: Vec::new(),
			preferred_interaction: None,
			interaction_policy: InteractionPolicy::default(),
			response_ttl: BrokerConfig::DEFAULT_RESPONSE_TTL,
			redirect_uri: None,
		}
	}

	/// Adds one trusted domain pattern.
	pub fn trust(mut self, pattern: impl Into<String>) -> Self {
		self.trusted_domains.push(pattern.into());

		self
	}

	/// Adds several trusted domain patterns.
	pub fn trust_all<I, S>(mut self, patterns: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.trusted_domains.extend(patterns.into_iter().map(Into::into));

		self
	}

	/// Sets the broker's preferred interactive flow.
	pub fn preferred_interaction(mut self, interaction: InteractionType) -> Self {
		self.preferred_interaction = Some(interaction);

		self
	}

	/// Overrides the preference precedence.
	pub fn interaction_policy(mut self, policy: InteractionPolicy) -> Self {
		self.interaction_policy = policy;

		self
	}

	/// Overrides the response cache entry lifetime.
	pub fn response_ttl(mut self, ttl: Duration) -> Self {
		self.response_ttl = ttl;

		self
	}

	/// Sets the redirect URI.
	pub fn redirect_uri(mut self, uri: impl Into<String>) -> Self {
		self.redirect_uri = Some(uri.into());

		self
	}

	/// Validates and builds the configuration.
	pub fn build(self) -> Result<BrokerConfig, ConfigError> {
		let trusted_domains = parse_domains(self.trusted_domains, "trusted domains")?;

		if !self.response_ttl.is_positive() {
			return Err(ConfigError::ZeroDuration { field: "responseTtl" });
		}

		Ok(BrokerConfig {
			client_id: self.client_id,
			trusted_domains,
			preferred_interaction: self.preferred_interaction,
			interaction_policy: self.interaction_policy,
			response_ttl: self.response_ttl,
			redirect_uri: parse_redirect(self.redirect_uri)?,
		})
	}
}

/// Settings of an embedded application.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "EmbeddedConfigRepr")]
pub struct EmbeddedConfig {
	/// Client id the embedded app is registered with.
	pub client_id: ClientId,
	/// Origins a broker may answer from.
	pub trusted_broker_domains: TrustedDomains,
	/// How long the handshake may take before falling back to local acquisition.
	pub handshake_timeout: StdDuration,
	/// How long a brokered call may stay unanswered.
	pub response_timeout: StdDuration,
	/// Redirect URI used for local navigations.
	pub redirect_uri: Option<Url>,
}
impl EmbeddedConfig {
	/// Default handshake window.
	pub const DEFAULT_HANDSHAKE_TIMEOUT: StdDuration = StdDuration::from_secs(2);
	/// Default window for brokered calls.
	pub const DEFAULT_RESPONSE_TIMEOUT: StdDuration = StdDuration::from_secs(120);

	/// Starts a builder for an embedded app registered as `client_id`.
	pub fn builder(client_id: ClientId) -> EmbeddedConfigBuilder {
		EmbeddedConfigBuilder::new(client_id)
	}
}

/// Builder for [`EmbeddedConfig`].
#[derive(Debug)]
pub struct EmbeddedConfigBuilder {
	client_id: ClientId,
	trusted_broker_domains: Vec<String>,
	handshake_timeout: StdDuration,
	response_timeout: StdDuration,
	redirect_uri: Option<String>,
}
impl EmbeddedConfigBuilder {
	/// Creates a builder seeded with defaults.
	pub fn new(client_id: ClientId) -> Self {
		Self {
			client_id,
			trusted_broker_domains: Vec::new(),
			handshake_timeout: EmbeddedConfig::DEFAULT_HANDSHAKE_TIMEOUT,
			response_timeout: EmbeddedConfig::DEFAULT_RESPONSE_TIMEOUT,
			redirect_uri: None,
		}
	}

	/// Adds one trusted broker domain pattern.
	pub fn trust_broker(mut self, pattern: impl Into<String>) -> Self {
		self.trusted_broker_domains.push(pattern.into());

		self
	}

	/// Overrides the handshake window.
	pub fn handshake_timeout(mut self, timeout: StdDuration) -> Self {
		self.handshake_timeout = timeout;

		self
	}

	/// Overrides the brokered call window.
	pub fn response_timeout(mut self, timeout: StdDuration) -> Self {
		self.response_timeout = timeout;

		self
	}

	/// Sets the redirect URI.
	pub fn redirect_uri(mut self, uri: impl Into<String>) -> Self {
		self.redirect_uri = Some(uri.into());

		self
	}

	/// Validates and builds the configuration.
	pub fn build(self) -> Result<EmbeddedConfig, ConfigError> {
		let trusted_broker_domains =
			parse_domains(self.trusted_broker_domains, "trusted broker domains")?;

		if self.handshake_timeout.is_zero() {
			return Err(ConfigError::ZeroDuration { field: "handshakeTimeout" });
		}
		if self.response_timeout.is_zero() {
			return Err(ConfigError::ZeroDuration { field: "responseTimeout" });
		}

		Ok(EmbeddedConfig {
			client_id: self.client_id,
			trusted_broker_domains,
			handshake_timeout: self.handshake_timeout,
			response_timeout: self.response_timeout,
			redirect_uri: parse_redirect(self.redirect_uri)?,
		})
	}
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct BrokerConfigRepr {
	client_id: ClientId,
	trusted_domains: Vec<String>,
	#[serde(default)]
	preferred_interaction: Option<InteractionType>,
	#[serde(default)]
	interaction_policy: InteractionPolicy,
	#[serde(default)]
	response_ttl_ms: Option<u64>,
	#[serde(default)]
	redirect_uri: Option<String>,
}
impl TryFrom<BrokerConfigRepr> for BrokerConfig {
	type Error = ConfigError;

	fn try_from(repr: BrokerConfigRepr) -> Result<Self, Self::Error> {
		let mut builder = BrokerConfig::builder(repr.client_id)
			.trust_all(repr.trusted_domains)
			.interaction_policy(repr.interaction_policy);

		if let Some(interaction) = repr.preferred_interaction {
			builder = builder.preferred_interaction(interaction);
		}
		if let Some(ms) = repr.response_ttl_ms {
			builder = builder.response_ttl(Duration::milliseconds(i64::try_from(ms).unwrap_or(i64::MAX)));
		}
		if let Some(uri) = repr.redirect_uri {
			builder = builder.redirect_uri(uri);
		}

		builder.build()
	}
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct EmbeddedConfigRepr {
	client_id: ClientId,
	trusted_broker_domains: Vec<String>,
	#[serde(default)]
	handshake_timeout_ms: Option<u64>,
	#[serde(default)]
	response_timeout_ms: Option<u64>,
	#[serde(default)]
	redirect_uri: Option<String>,
}
impl TryFrom<EmbeddedConfigRepr> for EmbeddedConfig {
	type Error = ConfigError;

	fn try_from(repr: EmbeddedConfigRepr) -> Result<Self, Self::Error> {
		let mut builder = EmbeddedConfig::builder(repr.client_id);

		for pattern in repr.trusted_broker_domains {
			builder = builder.trust_broker(pattern);
		}
		if let Some(ms) = repr.handshake_timeout_ms {
			builder = builder.handshake_timeout(StdDuration::from_millis(ms));
		}
		if let Some(ms) = repr.response_timeout_ms {
			builder = builder.response_timeout(StdDuration::from_millis(ms));
		}
		if let Some(uri) = repr.redirect_uri {
			builder = builder.redirect_uri(uri);
		}

		builder.build()
	}
}

fn parse_domains(patterns: Vec<String>, list: &'static str) -> Result<TrustedDomains, ConfigError> {
	if patterns.is_empty() {
		return Err(ConfigError::EmptyTrustedDomains { list });
	}

	TrustedDomains::parse(patterns)
}

fn parse_redirect(uri: Option<String>) -> Result<Option<Url>, ConfigError> {
	uri.map(|uri| Url::parse(&uri).map_err(|source| ConfigError::InvalidRedirect { source }))
		.transpose()
}
