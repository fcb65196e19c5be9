//! Broker-owned response cache.
//!
//! Two independent maps live here. Thumbprint entries hold results of brokered acquisitions so
//! another embedded app asking for the same authority, client, and scopes is answered without a
//! network call; each origin can claim a given entry at most once. Redirect entries hold the
//! outcome of a full-page redirect for the origin that started it and are removed by their
//! first read, so a completed redirect is delivered at most once.
//!
//! Every entry expires after the configured TTL or when its access token expires, whichever
//! comes first. Expired entries are swept on every operation.

// std
use std::collections::HashSet;
// self
use crate::{
	_prelude::*, auth::HomeAccountId, flows::AcquisitionResult, protocol::Origin,
	thumbprint::RequestThumbprint,
};

type Clock = Arc<dyn Fn() -> OffsetDateTime + Send + Sync>;

/// Key accepted by [`ResponseCache::remove`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CacheKey {
	/// A thumbprint entry.
	Thumbprint(RequestThumbprint),
	/// The pending redirect entry of an origin.
	Origin(Origin),
}

#[derive(Debug)]
struct ThumbprintEntry {
	result: AcquisitionResult,
	producer: Origin,
	stored_at: OffsetDateTime,
	claimed_by: HashSet<Origin>,
}

#[derive(Debug)]
struct RedirectEntry {
	result: AcquisitionResult,
	stored_at: OffsetDateTime,
}

#[derive(Debug, Default)]
struct Entries {
	by_thumbprint: HashMap<RequestThumbprint, ThumbprintEntry>,
	by_origin: HashMap<Origin, RedirectEntry>,
}
impl Entries {
	fn sweep(&mut self, now: OffsetDateTime, ttl: Duration) {
		let live = |stored_at: OffsetDateTime, result: &AcquisitionResult| {
			now - stored_at < ttl && !result.is_expired_at(now)
		};

		self.by_thumbprint.retain(|_, entry| live(entry.stored_at, &entry.result));
		self.by_origin.retain(|_, entry| live(entry.stored_at, &entry.result));
	}
}

/// In-memory cache of completed brokered acquisitions.
pub struct ResponseCache {
	ttl: Duration,
	clock: Clock,
	entries: Mutex<Entries>,
}
impl ResponseCache {
	/// TTL used when none is configured.
	pub const DEFAULT_TTL: Duration = Duration::minutes(5);

	/// Creates an empty cache whose entries live at most `ttl`.
	pub fn new(ttl: Duration) -> Self {
		Self { ttl, clock: Arc::new(OffsetDateTime::now_utc), entries: Default::default() }
	}

	/// Replaces the wall clock, for hosts with their own time source.
	pub fn with_clock<F>(mut self, clock: F) -> Self
	where
		F: 'static + Fn() -> OffsetDateTime + Send + Sync,
	{
		self.clock = Arc::new(clock);

		self
	}

	/// Entry lifetime.
	pub fn ttl(&self) -> Duration {
		self.ttl
	}

	/// Stores the result `origin`'s request produced under `thumbprint`.
	pub fn put(&self, thumbprint: RequestThumbprint, origin: &Origin, result: AcquisitionResult) {
		let mut entries = self.swept();

		tracing::debug!(%thumbprint, producer = %origin, "cached brokered response");

		entries.by_thumbprint.insert(
			thumbprint,
			ThumbprintEntry {
				result,
				producer: origin.clone(),
				stored_at: (self.clock)(),
				claimed_by: HashSet::new(),
			},
		);
	}

	/// Returns the entry for `thumbprint` unless `origin` already claimed it.
	pub fn get_by_thumbprint(
		&self,
		thumbprint: &RequestThumbprint,
		origin: &Origin,
	) -> Option<AcquisitionResult> {
		self.get_for_account(thumbprint, origin, None)
	}

	/// Like [`ResponseCache::get_by_thumbprint`], but only serves an entry issued for
	/// `account` when one is named. A mismatch leaves the entry unclaimed.
	pub fn get_for_account(
		&self,
		thumbprint: &RequestThumbprint,
		origin: &Origin,
		account: Option<&HomeAccountId>,
	) -> Option<AcquisitionResult> {
		let mut entries = self.swept();
		let entry = entries.by_thumbprint.get_mut(thumbprint)?;

		if account.is_some_and(|account| *account != entry.result.account.home_account_id) {
			tracing::debug!(%thumbprint, %origin, "cached response belongs to another account");

			return None;
		}
		if !entry.claimed_by.insert(origin.clone()) {
			tracing::debug!(%thumbprint, %origin, "cached response already claimed by origin");

			return None;
		}

		tracing::debug!(%thumbprint, %origin, producer = %entry.producer, "serving cached response");

		Some(entry.result.clone())
	}

	/// Parks a completed redirect for `origin`, replacing any earlier one.
	pub fn put_redirect(&self, origin: &Origin, result: AcquisitionResult) {
		let mut entries = self.swept();
		let stored_at = (self.clock)();

		entries.by_origin.insert(origin.clone(), RedirectEntry { result, stored_at });
	}

	/// Takes the pending redirect result of `origin`. Only the first caller receives it.
	pub fn get_by_origin(&self, origin: &Origin) -> Option<AcquisitionResult> {
		self.swept().by_origin.remove(origin).map(|entry| entry.result)
	}

	/// Removes an entry; returns `true` if one existed.
	pub fn remove(&self, key: &CacheKey) -> bool {
		let mut entries = self.swept();

		match key {
			CacheKey::Thumbprint(thumbprint) => entries.by_thumbprint.remove(thumbprint).is_some(),
			CacheKey::Origin(origin) => entries.by_origin.remove(origin).is_some(),
		}
	}

	/// Number of live entries across both maps.
	pub fn len(&self) -> usize {
		let entries = self.swept();

		entries.by_thumbprint.len() + entries.by_origin.len()
	}

	/// Returns `true` when no live entry remains.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn swept(&self) -> parking_lot::MutexGuard<'_, Entries> {
		let mut entries = self.entries.lock();

		entries.sweep((self.clock)(), self.ttl);

		entries
	}
}
impl Default for ResponseCache {
	fn default() -> Self {
		Self::new(Self::DEFAULT_TTL)
	}
}
impl Debug for ResponseCache {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let entries = self.entries.lock();

		f.debug_struct("ResponseCache")
			.field("ttl", &self.ttl)
			.field("thumbprint_entries", &entries.by_thumbprint.len())
			.field("redirect_entries", &entries.by_origin.len())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicI64, Ordering};
	// self
	use super::*;
	use crate::{
		_preludet::*,
		auth::{ClientId, CorrelationId, ScopeSet},
		flows::TokenRequest,
	};

	fn origin(value: &str) -> Origin {
		Origin::parse(value).expect("Origin fixture should parse.")
	}

	fn thumbprint() -> RequestThumbprint {
		let request = TokenRequest::new(
			"https://login.example.com/common",
			ScopeSet::new(["User.Read"]).expect("Scope fixture should be valid."),
		);

		RequestThumbprint::compute(&ClientId::new("child-app").expect("Client id is valid."), &request)
	}

	fn result(now: OffsetDateTime) -> AcquisitionResult {
		test_grant(test_account("uid"), &["User.Read"], "at")
			.to_result(CorrelationId::new("c").expect("Correlation id is valid."), now)
	}

	#[test]
	fn thumbprint_entries_are_claimed_once_per_origin() {
		let cache = ResponseCache::default();
		let x = origin("https://x.example");
		let y = origin("https://y.example");
		let stored = result(OffsetDateTime::now_utc());

		cache.put(thumbprint(), &x, stored.clone());

		assert_eq!(cache.get_by_thumbprint(&thumbprint(), &x), Some(stored.clone()));
		assert_eq!(cache.get_by_thumbprint(&thumbprint(), &x), None);
		assert_eq!(cache.get_by_thumbprint(&thumbprint(), &y), Some(stored));
	}

	#[test]
	fn entries_for_another_account_are_skipped_without_claiming() {
		let cache = ResponseCache::default();
		let y = origin("https://y.example");
		let stored = result(OffsetDateTime::now_utc());
		let other = test_account("someone-else").home_account_id;

		cache.put(thumbprint(), &origin("https://x.example"), stored.clone());

		assert_eq!(cache.get_for_account(&thumbprint(), &y, Some(&other)), None);
		assert_eq!(
			cache.get_for_account(&thumbprint(), &y, Some(&stored.account.home_account_id)),
			Some(stored)
		);
		assert_eq!(cache.get_for_account(&thumbprint(), &y, None), None);
	}

	#[test]
	fn redirect_entries_are_delivered_at_most_once() {
		let cache = ResponseCache::default();
		let x = origin("https://x.example");
		let stored = result(OffsetDateTime::now_utc());

		cache.put_redirect(&x, stored.clone());

		assert_eq!(cache.get_by_origin(&origin("https://y.example")), None);
		assert_eq!(cache.get_by_origin(&x), Some(stored));
		assert_eq!(cache.get_by_origin(&x), None);
		assert!(cache.is_empty());
	}

	#[test]
	fn entries_expire_after_ttl_or_token_expiry() {
		static OFFSET_SECS: AtomicI64 = AtomicI64::new(0);

		let start = OffsetDateTime::now_utc();
		let cache = ResponseCache::new(Duration::minutes(5))
			.with_clock(move || start + Duration::seconds(OFFSET_SECS.load(Ordering::SeqCst)));
		let x = origin("https://x.example");

		cache.put(thumbprint(), &x, result(start));
		cache.put_redirect(&x, result(start - Duration::minutes(59) - Duration::seconds(30)));

		assert_eq!(cache.len(), 2);

		OFFSET_SECS.store(60, Ordering::SeqCst);

		assert_eq!(cache.len(), 1, "Redirect entry's token expired after one hour.");

		OFFSET_SECS.store(301, Ordering::SeqCst);

		assert!(cache.get_by_thumbprint(&thumbprint(), &x).is_none());
		assert!(cache.is_empty());
	}

	#[test]
	fn remove_targets_one_map() {
		let cache = ResponseCache::default();
		let x = origin("https://x.example");
		let now = OffsetDateTime::now_utc();

		cache.put(thumbprint(), &x, result(now));
		cache.put_redirect(&x, result(now));

		assert!(cache.remove(&CacheKey::Origin(x.clone())));
		assert!(!cache.remove(&CacheKey::Origin(x)));
		assert!(cache.remove(&CacheKey::Thumbprint(thumbprint())));
		assert!(cache.is_empty());
	}
}
