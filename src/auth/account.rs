//! Signed-in account descriptor shared between brokers and embedded apps.

// self
use crate::{_prelude::*, auth::HomeAccountId};

/// Account the tokens were issued for.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
	/// Stable identifier across tenants.
	pub home_account_id: HomeAccountId,
	/// Identity provider host that issued the account.
	pub environment: String,
	/// Tenant the account signed into.
	pub tenant_id: String,
	/// Preferred username (login hint).
	pub username: String,
	/// Display name, when the ID token carried one.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
}
impl AccountInfo {
	/// Creates an account without a display name.
	pub fn new(
		home_account_id: HomeAccountId,
		environment: impl Into<String>,
		tenant_id: impl Into<String>,
		username: impl Into<String>,
	) -> Self {
		Self {
			home_account_id,
			environment: environment.into(),
			tenant_id: tenant_id.into(),
			username: username.into(),
			name: None,
		}
	}

	/// Attaches a display name.
	pub fn with_name(mut self, name: impl Into<String>) -> Self {
		self.name = Some(name.into());

		self
	}
}
