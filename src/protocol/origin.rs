//! Web origins and the allow-list patterns used to trust them.

// self
use crate::{_prelude::*, error::ConfigError};

/// Error returned when a string is not a usable web origin.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum OriginError {
	/// The value is not a URL.
	#[error("`{value}` is not a URL.")]
	NotUrl {
		/// Offending value.
		value: String,
	},
	/// The URL has an opaque origin (`data:`, `file:`, sandboxed frames).
	#[error("`{value}` has an opaque origin.")]
	Opaque {
		/// Offending value.
		value: String,
	},
}

/// Normalized `scheme://host[:port]` web origin.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Origin {
	serialized: String,
	scheme_len: usize,
	host: String,
}
impl Origin {
	/// Parses any URL and keeps only its origin.
	pub fn parse(value: &str) -> Result<Self, OriginError> {
		let url = Url::parse(value).map_err(|_| OriginError::NotUrl { value: value.into() })?;

		match url.origin() {
			url::Origin::Tuple(scheme, host, _) => Ok(Self {
				serialized: url.origin().ascii_serialization(),
				scheme_len: scheme.len(),
				host: host.to_string(),
			}),
			url::Origin::Opaque(_) => Err(OriginError::Opaque { value: value.into() }),
		}
	}

	/// The `scheme://host[:port]` form.
	pub fn as_str(&self) -> &str {
		&self.serialized
	}

	/// URL scheme without the trailing `://`.
	pub fn scheme(&self) -> &str {
		&self.serialized[..self.scheme_len]
	}

	/// Host name or address.
	pub fn host(&self) -> &str {
		&self.host
	}
}
impl TryFrom<String> for Origin {
	type Error = OriginError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		Self::parse(&value)
	}
}
impl From<Origin> for String {
	fn from(value: Origin) -> Self {
		value.serialized
	}
}
impl FromStr for Origin {
	type Err = OriginError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::parse(s)
	}
}
impl Debug for Origin {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "Origin({})", self.serialized)
	}
}
impl Display for Origin {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.serialized)
	}
}

/// Single allow-list entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DomainPattern {
	/// Matches one origin exactly.
	Exact(Origin),
	/// `*.contoso.com` or `https://*.contoso.com`: any subdomain, optionally pinned to a scheme.
	Suffix {
		/// Required scheme, if the pattern named one.
		scheme: Option<String>,
		/// Host suffix including the leading dot.
		suffix: String,
	},
	/// `https://app-*`: any origin starting with the prefix.
	Prefix(String),
}
impl DomainPattern {
	/// Parses a pattern; a bare `*` is rejected.
	pub fn parse(pattern: &str) -> Result<Self, ConfigError> {
		let invalid = || ConfigError::InvalidDomainPattern { pattern: pattern.into() };
		let trimmed = pattern.trim();

		match trimmed.matches('*').count() {
			0 => Origin::parse(trimmed).map(Self::Exact).map_err(|_| invalid()),
			1 if trimmed.len() > 1 && trimmed.ends_with('*') => {
				// Origins are lowercased on parse, so the prefix must be too.
				let prefix = trimmed[..trimmed.len() - 1].to_ascii_lowercase();

				match prefix.split_once("://") {
					Some((scheme, rest)) if !scheme.is_empty() && !rest.is_empty() =>
						Ok(Self::Prefix(prefix)),
					_ => Err(invalid()),
				}
			},
			1 => {
				let (scheme, host) = match trimmed.split_once("://") {
					Some((scheme, host)) if !scheme.is_empty() =>
						(Some(scheme.to_ascii_lowercase()), host),
					Some(_) => return Err(invalid()),
					None => (None, trimmed),
				};
				let suffix = host.strip_prefix('*').filter(|s| s.starts_with('.') && s.len() > 1);

				suffix
					.map(|suffix| Self::Suffix { scheme, suffix: suffix.to_ascii_lowercase() })
					.ok_or_else(invalid)
			},
			_ => Err(invalid()),
		}
	}

	/// Returns `true` if `origin` satisfies the pattern.
	pub fn matches(&self, origin: &Origin) -> bool {
		match self {
			Self::Exact(expected) => expected == origin,
			Self::Suffix { scheme, suffix } =>
				scheme.as_deref().is_none_or(|scheme| scheme == origin.scheme())
					&& origin.host().ends_with(suffix.as_str()),
			Self::Prefix(prefix) => origin.as_str().starts_with(prefix.as_str()),
		}
	}
}
impl TryFrom<String> for DomainPattern {
	type Error = ConfigError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		Self::parse(&value)
	}
}
impl From<DomainPattern> for String {
	fn from(value: DomainPattern) -> Self {
		value.to_string()
	}
}
impl Display for DomainPattern {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::Exact(origin) => Display::fmt(origin, f),
			Self::Suffix { scheme: Some(scheme), suffix } => write!(f, "{scheme}://*{suffix}"),
			Self::Suffix { scheme: None, suffix } => write!(f, "*{suffix}"),
			Self::Prefix(prefix) => write!(f, "{prefix}*"),
		}
	}
}

/// Administrator-configured allow-list of origins.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrustedDomains(Vec<DomainPattern>);
impl TrustedDomains {
	/// Parses every pattern in `patterns`.
	pub fn parse<I, S>(patterns: I) -> Result<Self, ConfigError>
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		patterns
			.into_iter()
			.map(|pattern| DomainPattern::parse(pattern.as_ref()))
			.collect::<Result<Vec<_>, _>>()
			.map(Self)
	}

	/// Number of patterns.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns `true` when the list trusts nobody.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Returns `true` if any pattern matches `origin`.
	pub fn is_trusted(&self, origin: &Origin) -> bool {
		self.0.iter().any(|pattern| pattern.matches(origin))
	}

	/// Fails with [`Error::UntrustedOrigin`] unless `origin` is on the list.
	pub fn verify(&self, origin: &Origin) -> Result<()> {
		if self.is_trusted(origin) {
			Ok(())
		} else {
			tracing::warn!(origin = %origin, "rejected message from untrusted origin");

			Err(Error::UntrustedOrigin { origin: origin.to_string() })
		}
	}
}
