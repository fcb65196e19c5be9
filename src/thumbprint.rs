//! Request thumbprints: the comparison key of brokered acquisitions.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	auth::{ClientId, ScopeSet},
	flows::TokenRequest,
};

/// Authority, client, and scope set of a request.
///
/// Authorities compare as exact strings; scopes compare as case-sensitive sets.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestThumbprint {
	/// Canonical authority URL.
	pub authority: String,
	/// Client the tokens are requested for.
	pub client_id: ClientId,
	/// Requested scopes.
	pub scopes: ScopeSet,
}
impl RequestThumbprint {
	/// Derives the thumbprint of `request` issued for `client_id`.
	pub fn compute(client_id: &ClientId, request: &TokenRequest) -> Self {
		Self {
			authority: request.authority.clone(),
			client_id: client_id.clone(),
			scopes: request.scopes.clone(),
		}
	}

	/// URL-safe SHA-256 digest of the thumbprint, stable across processes.
	pub fn fingerprint(&self) -> String {
		let mut hasher = Sha256::new();

		hasher.update(self.authority.as_bytes());
		hasher.update([0]);
		hasher.update(self.client_id.as_bytes());
		hasher.update([0]);
		hasher.update(self.scopes.normalized().as_bytes());

		URL_SAFE_NO_PAD.encode(hasher.finalize())
	}
}
impl Display for RequestThumbprint {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{}|{}|{}", self.authority, self.client_id, self.scopes)
	}
}
