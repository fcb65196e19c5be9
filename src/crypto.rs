//! Crypto collaborator used by interactive flows.
//!
//! The orchestrator never implements primitives itself. [`DefaultCryptoProvider`] backs the
//! contract with `rand`, `sha2`, `hkdf`, `hmac`, and URL-safe base64.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand::{Rng, distr::Alphanumeric};
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	auth::{CorrelationId, IdentifierError},
};

const CORRELATION_ID_LEN: usize = 32;
const PKCE_VERIFIER_LEN: usize = 64;
const BINDING_KEY_LEN: usize = 32;
const KEY_ID_LEN: usize = 16;

type HmacSha256 = Hmac<Sha256>;

/// Failures of the signing capabilities.
#[derive(Debug, ThisError)]
pub enum CryptoError {
	/// No binding key is known under the reference.
	#[error("Binding key `{kid}` is unknown to this provider.")]
	UnknownKey {
		/// Key id that was looked up.
		kid: String,
	},
	/// Key material has an unusable length.
	#[error("Key material has an invalid length.")]
	InvalidKeyLength,
	/// Token header or payload could not be serialized.
	#[error(transparent)]
	Encode(#[from] serde_json::Error),
	/// Generated identifier was rejected.
	#[error(transparent)]
	InvalidIdentifier(#[from] IdentifierError),
}

/// Opaque reference to a binding key held by a [`CryptoProvider`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyRef(String);
impl KeyRef {
	/// Key id as placed in the `kid` header of signed tokens.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl Display for KeyRef {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

/// Supported PKCE challenge methods.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PkceCodeChallengeMethod {
	/// SHA-256 based PKCE (RFC 7636 S256).
	S256,
}
impl PkceCodeChallengeMethod {
	/// Returns the RFC 7636 identifier for the challenge method.
	pub fn as_str(self) -> &'static str {
		match self {
			PkceCodeChallengeMethod::S256 => "S256",
		}
	}
}

/// PKCE verifier and the challenge derived from it.
#[derive(Clone, PartialEq, Eq)]
pub struct PkcePair {
	/// Secret verifier sent with the code exchange.
	pub verifier: String,
	/// Challenge sent with the authorize request.
	pub challenge: String,
	/// How the challenge was derived.
	pub method: PkceCodeChallengeMethod,
}
impl Debug for PkcePair {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PkcePair")
			.field("verifier", &"<redacted>")
			.field("challenge", &self.challenge)
			.field("method", &self.method)
			.finish()
	}
}

/// Capabilities the runtime consumes from a crypto provider.
pub trait CryptoProvider
where
	Self: Send + Sync,
{
	/// Fresh identifier correlating one acquisition across contexts and the identity provider.
	fn generate_correlation_id(&self) -> Result<CorrelationId, CryptoError>;

	/// Fresh PKCE verifier/challenge pair.
	fn generate_pkce_pair(&self) -> PkcePair;

	/// URL-safe base64 SHA-256 digest of `input`.
	fn digest(&self, input: &[u8]) -> String;

	/// Derives the binding key for `context`. The same context yields the same key for the
	/// lifetime of the provider.
	fn derive_binding_key(&self, context: &str) -> Result<KeyRef, CryptoError>;

	/// Signs `payload` as a compact JWS with the key behind `key`.
	fn sign_token(&self, payload: &Value, key: &KeyRef) -> Result<String, CryptoError>;
}

/// Default [`CryptoProvider`] built on the thread-local RNG.
///
/// Binding keys are HKDF-SHA256 expansions of a per-provider random secret and sign with
/// HS256. They never leave the provider.
pub struct DefaultCryptoProvider {
	secret: [u8; BINDING_KEY_LEN],
	keys: Mutex<HashMap<KeyRef, [u8; BINDING_KEY_LEN]>>,
}
impl DefaultCryptoProvider {
	/// Creates a provider with a fresh random secret.
	pub fn new() -> Self {
		let mut secret = [0; BINDING_KEY_LEN];

		rand::rng().fill(&mut secret);

		Self { secret, keys: Mutex::new(HashMap::new()) }
	}

	fn sign(key: &[u8], input: &[u8]) -> Result<String, CryptoError> {
		let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
			.map_err(|_| CryptoError::InvalidKeyLength)?;

		mac.update(input);

		Ok(URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
	}
}
impl Default for DefaultCryptoProvider {
	fn default() -> Self {
		Self::new()
	}
}
impl Debug for DefaultCryptoProvider {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("DefaultCryptoProvider")
			.field("binding_keys", &self.keys.lock().len())
			.finish_non_exhaustive()
	}
}
impl CryptoProvider for DefaultCryptoProvider {
	fn generate_correlation_id(&self) -> Result<CorrelationId, CryptoError> {
		Ok(CorrelationId::new(random_string(CORRELATION_ID_LEN))?)
	}

	fn generate_pkce_pair(&self) -> PkcePair {
		let verifier = random_string(PKCE_VERIFIER_LEN);
		let challenge = self.digest(verifier.as_bytes());

		PkcePair { verifier, challenge, method: PkceCodeChallengeMethod::S256 }
	}

	fn digest(&self, input: &[u8]) -> String {
		URL_SAFE_NO_PAD.encode(Sha256::digest(input))
	}

	fn derive_binding_key(&self, context: &str) -> Result<KeyRef, CryptoError> {
		let mut key = [0; BINDING_KEY_LEN];

		Hkdf::<Sha256>::new(None, &self.secret)
			.expand(context.as_bytes(), &mut key)
			.map_err(|_| CryptoError::InvalidKeyLength)?;

		let kid = KeyRef(self.digest(&key).chars().take(KEY_ID_LEN).collect());

		self.keys.lock().insert(kid.clone(), key);

		Ok(kid)
	}

	fn sign_token(&self, payload: &Value, key: &KeyRef) -> Result<String, CryptoError> {
		let secret = self
			.keys
			.lock()
			.get(key)
			.copied()
			.ok_or_else(|| CryptoError::UnknownKey { kid: key.0.clone() })?;
		let header = serde_json::json!({ "alg": "HS256", "typ": "JWT", "kid": key });
		let signing_input = format!(
			"{}.{}",
			URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?),
			URL_SAFE_NO_PAD.encode(serde_json::to_vec(payload)?),
		);
		let signature = Self::sign(&secret, signing_input.as_bytes())?;

		Ok(format!("{signing_input}.{signature}"))
	}
}

fn random_string(len: usize) -> String {
	rand::rng().sample_iter(Alphanumeric).take(len).map(char::from).collect()
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn pkce_challenge_matches_rfc_7636_vector() {
		let provider = DefaultCryptoProvider::new();

		assert_eq!(
			provider.digest(b"dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
			"E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
		);

		let pair = provider.generate_pkce_pair();

		assert_eq!(pair.verifier.len(), PKCE_VERIFIER_LEN);
		assert_eq!(pair.challenge, provider.digest(pair.verifier.as_bytes()));
		assert!(!format!("{pair:?}").contains(&pair.verifier));
	}

	#[test]
	fn correlation_ids_are_unique() {
		let provider = DefaultCryptoProvider::new();
		let first = provider.generate_correlation_id().expect("Generated id should be valid.");
		let second = provider.generate_correlation_id().expect("Generated id should be valid.");

		assert_eq!(first.len(), CORRELATION_ID_LEN);
		assert_ne!(first, second);
	}

	#[test]
	fn binding_keys_are_stable_per_context_and_sign_hs256() {
		let provider = DefaultCryptoProvider::new();
		let key = provider.derive_binding_key("child-app").expect("Key derivation should succeed.");

		assert_eq!(
			provider.derive_binding_key("child-app").expect("Key derivation should succeed."),
			key
		);
		assert_ne!(
			provider.derive_binding_key("other-app").expect("Key derivation should succeed."),
			key
		);

		let token = provider
			.sign_token(&serde_json::json!({ "nonce": "n-1" }), &key)
			.expect("Known key should sign.");
		let segments = token.split('.').collect::<Vec<_>>();

		assert_eq!(segments.len(), 3);

		let header: Value = serde_json::from_slice(
			&URL_SAFE_NO_PAD.decode(segments[0]).expect("Header should be base64url."),
		)
		.expect("Header should be JSON.");

		assert_eq!(header["alg"], "HS256");
		assert_eq!(header["kid"], key.as_str());
	}

	#[test]
	fn signing_with_a_foreign_key_fails() {
		let key = DefaultCryptoProvider::new()
			.derive_binding_key("child-app")
			.expect("Key derivation should succeed.");
		let err = DefaultCryptoProvider::new()
			.sign_token(&serde_json::json!({}), &key)
			.expect_err("Another provider never saw this key.");

		assert!(matches!(err, CryptoError::UnknownKey { .. }));
	}
}
