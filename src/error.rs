//! Crate-level error types shared by the orchestrator, the broker, and embedded clients.

// std
use std::time::Duration as StdDuration;
// self
use crate::{_prelude::*, protocol::MessageType};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Sender origin is not covered by the trusted domain allow-list.
	#[error("Origin `{origin}` is not in the trusted domain list.")]
	UntrustedOrigin {
		/// Observed sender origin.
		origin: String,
	},
	/// The candidate broker never answered the handshake.
	#[error("No handshake response arrived within {waited:?}.")]
	HandshakeTimeout {
		/// Window the embedded client waited for.
		waited: StdDuration,
	},
	/// A bonded broker never answered a brokered call.
	#[error("The broker did not answer within {waited:?}.")]
	ResponseTimeout {
		/// Window the embedded client waited for.
		waited: StdDuration,
	},
	/// Brokered silent renewal succeeded without tokens the embedded app can cache.
	#[error("Brokered silent renewal returned no tokens to cache.")]
	NoTokensToCache,
	/// The silent path cannot proceed without user interaction.
	#[error("Interaction is required: {code}.")]
	InteractionRequired {
		/// Provider- or runtime-supplied error code.
		code: String,
		/// Optional human-readable description.
		description: Option<String>,
	},
	/// Another interactive flow owns the UI.
	#[error("An interactive flow is already in progress.")]
	InteractionInProgress,
	/// The broker navigated the top frame; the result arrives via `handle_redirect_promise`.
	#[error("A redirect is in progress.")]
	RedirectInProgress,
	/// A reply arrived but it is not the one the caller waited for.
	#[error("Expected {expected} but received {received}.")]
	UnexpectedResponse {
		/// Message type the caller waited for.
		expected: MessageType,
		/// Short description of what actually arrived.
		received: String,
	},
	/// The acquisition request cannot be served as given.
	#[error("Request is invalid: {reason}.")]
	InvalidRequest {
		/// Why the request was rejected.
		reason: String,
	},
	/// Error returned by the broker that has no local counterpart.
	#[error("Broker failed the request: {0}.")]
	Brokered(WireError),
	/// Identity provider answered with an OAuth error.
	#[error(transparent)]
	Server(#[from] ServerError),
	/// Network failure talking to the identity provider.
	#[error(transparent)]
	Network(#[from] TransportError),
	/// Cross-context channel failure.
	#[error(transparent)]
	Channel(#[from] crate::transport::ChannelError),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Crypto collaborator failure.
	#[error(transparent)]
	Crypto(#[from] crate::crypto::CryptoError),
	/// Token store failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
}
impl Error {
	const CODE_BROKER: &'static str = "broker_error";
	const CODE_HANDSHAKE_TIMEOUT: &'static str = "handshake_timeout";
	const CODE_INTERACTION_IN_PROGRESS: &'static str = "interaction_in_progress";
	const CODE_INTERACTION_REQUIRED: &'static str = "interaction_required";
	const CODE_NETWORK: &'static str = "network_error";
	const CODE_NO_TOKENS_TO_CACHE: &'static str = "no_tokens_to_cache";
	const CODE_REDIRECT_IN_PROGRESS: &'static str = "redirect_in_progress";
	const CODE_RESPONSE_TIMEOUT: &'static str = "response_timeout";
	const CODE_SERVER: &'static str = "server_error";
	const CODE_UNTRUSTED_ORIGIN: &'static str = "untrusted_origin";

	/// Returns `true` for errors that tell the caller to pick an interactive flow.
	pub fn is_interaction_required(&self) -> bool {
		matches!(self, Self::InteractionRequired { .. })
	}

	/// Serializes the error for delivery over a broker channel.
	pub fn to_wire(&self) -> WireError {
		match self {
			Self::UntrustedOrigin { origin } =>
				WireError::new(Self::CODE_UNTRUSTED_ORIGIN).with_description(origin.clone()),
			Self::HandshakeTimeout { waited } => WireError::new(Self::CODE_HANDSHAKE_TIMEOUT)
				.with_description(self.to_string())
				.with_waited(*waited),
			Self::ResponseTimeout { waited } => WireError::new(Self::CODE_RESPONSE_TIMEOUT)
				.with_description(self.to_string())
				.with_waited(*waited),
			Self::NoTokensToCache => WireError::new(Self::CODE_NO_TOKENS_TO_CACHE),
			Self::InteractionRequired { code, description } => WireError {
				code: Self::CODE_INTERACTION_REQUIRED.into(),
				description: description.clone(),
				sub_error: Some(code.clone()),
				status: None,
				waited_ms: None,
			},
			Self::InteractionInProgress => WireError::new(Self::CODE_INTERACTION_IN_PROGRESS),
			Self::RedirectInProgress => WireError::new(Self::CODE_REDIRECT_IN_PROGRESS),
			Self::Brokered(wire) => wire.clone(),
			Self::Server(server) => WireError {
				code: Self::CODE_SERVER.into(),
				description: server.description.clone(),
				sub_error: Some(server.code.clone()),
				status: server.status,
				waited_ms: None,
			},
			Self::Network(err) =>
				WireError::new(Self::CODE_NETWORK).with_description(err.to_string()),
			_ => WireError::new(Self::CODE_BROKER).with_description(self.to_string()),
		}
	}

	/// Rebuilds the error the broker reported, keeping its classification intact.
	pub fn from_wire(wire: WireError) -> Self {
		match wire.code.as_str() {
			Self::CODE_UNTRUSTED_ORIGIN =>
				Self::UntrustedOrigin { origin: wire.description.unwrap_or_default() },
			Self::CODE_HANDSHAKE_TIMEOUT => Self::HandshakeTimeout { waited: wire.waited() },
			Self::CODE_RESPONSE_TIMEOUT => Self::ResponseTimeout { waited: wire.waited() },
			Self::CODE_NO_TOKENS_TO_CACHE => Self::NoTokensToCache,
			Self::CODE_INTERACTION_REQUIRED => Self::InteractionRequired {
				code: wire.sub_error.unwrap_or_else(|| Self::CODE_INTERACTION_REQUIRED.into()),
				description: wire.description,
			},
			Self::CODE_INTERACTION_IN_PROGRESS => Self::InteractionInProgress,
			Self::CODE_REDIRECT_IN_PROGRESS => Self::RedirectInProgress,
			Self::CODE_SERVER => Self::Server(ServerError {
				code: wire.sub_error.unwrap_or_else(|| Self::CODE_SERVER.into()),
				description: wire.description,
				status: wire.status,
			}),
			Self::CODE_NETWORK => TransportError::Remote {
				message: wire.description.unwrap_or_default(),
			}
			.into(),
			_ => Self::Brokered(wire),
		}
	}
}

/// Serializable error shape posted over broker channels.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireError {
	/// Stable error code.
	pub code: String,
	/// Optional human-readable description.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	/// Upstream error code preserved for classification.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub sub_error: Option<String>,
	/// HTTP status reported by the identity provider, when known.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub status: Option<u16>,
	/// Window a timed-out wait lasted, in milliseconds.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub waited_ms: Option<u64>,
}
impl WireError {
	/// Creates a wire error carrying only a code.
	pub fn new(code: impl Into<String>) -> Self {
		Self { code: code.into(), description: None, sub_error: None, status: None, waited_ms: None }
	}

	/// Attaches a description.
	pub fn with_description(mut self, description: impl Into<String>) -> Self {
		self.description = Some(description.into());

		self
	}

	/// Records how long a timed-out wait lasted.
	pub fn with_waited(mut self, waited: StdDuration) -> Self {
		self.waited_ms = Some(u64::try_from(waited.as_millis()).unwrap_or(u64::MAX));

		self
	}

	/// Recorded wait, zero when none was sent.
	pub fn waited(&self) -> StdDuration {
		StdDuration::from_millis(self.waited_ms.unwrap_or_default())
	}
}
impl Display for WireError {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match &self.description {
			Some(description) => write!(f, "{}: {description}", self.code),
			None => f.write_str(&self.code),
		}
	}
}

/// OAuth error answered by the identity provider.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("Identity provider returned `{code}`.")]
pub struct ServerError {
	/// OAuth `error` field.
	pub code: String,
	/// OAuth `error_description` field.
	pub description: Option<String>,
	/// HTTP status code, when available.
	pub status: Option<u16>,
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// Authority cannot be turned into a token endpoint.
	#[error("Authority `{authority}` is not a valid URL.")]
	InvalidAuthority {
		/// Authority as supplied.
		authority: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Redirect URI cannot be parsed.
	#[error("Redirect URI is invalid.")]
	InvalidRedirect {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// A trusted domain list must contain at least one entry.
	#[error("The {list} list cannot be empty.")]
	EmptyTrustedDomains {
		/// Which list was empty.
		list: &'static str,
	},
	/// A domain pattern could not be parsed.
	#[error("Domain pattern `{pattern}` is invalid.")]
	InvalidDomainPattern {
		/// Offending pattern.
		pattern: String,
	},
	/// Timeouts and TTLs must be positive.
	#[error("The {field} setting must be greater than zero.")]
	ZeroDuration {
		/// Field name.
		field: &'static str,
	},
	/// A required setting was not provided.
	#[error("The {field} setting is required.")]
	Missing {
		/// Field name.
		field: &'static str,
	},
	/// Identifier validation failed.
	#[error(transparent)]
	InvalidIdentifier(#[from] crate::auth::IdentifierError),
	/// Scope validation failed.
	#[error("Requested scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// Token endpoint response omitted `expires_in`.
	#[error("Token endpoint response is missing expires_in.")]
	MissingExpiresIn,
	/// Token endpoint returned an excessively large `expires_in`.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the token endpoint.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the token endpoint.")]
	Io(#[from] std::io::Error),
	/// Token endpoint answered with something that is neither a token nor an OAuth error.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	UnexpectedResponse {
		/// Summary of the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Token endpoint responded with malformed JSON.
	#[error("Token endpoint returned malformed JSON.")]
	ResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Network failure observed by the broker on the embedded app's behalf.
	#[error("The broker reported a network failure: {message}.")]
	Remote {
		/// Failure text reported by the broker.
		message: String,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
