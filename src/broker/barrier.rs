//! Redirect-completion latch.

// crates.io
use tokio::sync::watch;
// self
use crate::_prelude::*;

/// Explicit latch guarding the response cache while a redirect completes.
///
/// The barrier is `Idle` until [`RedirectBarrier::arm`] hands out a guard; it stays `Pending`
/// until every guard was released or dropped, then resets to `Idle`. Waiters arriving while it
/// is idle pass straight through.
#[derive(Clone, Debug)]
pub struct RedirectBarrier {
	pending: Arc<watch::Sender<usize>>,
}
impl RedirectBarrier {
	/// Creates an idle barrier.
	pub fn new() -> Self {
		Self { pending: Arc::new(watch::Sender::new(0)) }
	}

	/// Moves the barrier to `Pending` until the returned guard goes away.
	pub fn arm(&self) -> BarrierGuard {
		self.pending.send_modify(|pending| *pending += 1);

		tracing::debug!("redirect barrier armed");

		BarrierGuard { pending: self.pending.clone() }
	}

	/// Returns `true` while a redirect completion holds the barrier.
	pub fn is_pending(&self) -> bool {
		*self.pending.borrow() > 0
	}

	/// Resolves once no redirect completion holds the barrier.
	pub async fn wait(&self) {
		let mut rx = self.pending.subscribe();

		// The sender lives as long as `self`, so the wait cannot fail.
		let _ = rx.wait_for(|pending| *pending == 0).await;
	}
}
impl Default for RedirectBarrier {
	fn default() -> Self {
		Self::new()
	}
}

/// Holds a [`RedirectBarrier`] in the `Pending` state.
#[derive(Debug)]
pub struct BarrierGuard {
	pending: Arc<watch::Sender<usize>>,
}
impl BarrierGuard {
	/// Releases the barrier explicitly.
	pub fn release(self) {}
}
impl Drop for BarrierGuard {
	fn drop(&mut self) {
		self.pending.send_modify(|pending| *pending = pending.saturating_sub(1));

		tracing::debug!("redirect barrier released");
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::time::Duration as StdDuration;
	// self
	use super::*;

	#[tokio::test]
	async fn waiters_pass_only_after_release() {
		let barrier = RedirectBarrier::new();

		tokio::time::timeout(StdDuration::from_millis(50), barrier.wait())
			.await
			.expect("Idle barrier should not block.");

		let guard = barrier.arm();

		assert!(barrier.is_pending());
		assert!(
			tokio::time::timeout(StdDuration::from_millis(20), barrier.wait()).await.is_err(),
			"Pending barrier should block waiters."
		);

		let waiter = {
			let barrier = barrier.clone();

			tokio::spawn(async move { barrier.wait().await })
		};

		guard.release();

		tokio::time::timeout(StdDuration::from_secs(1), waiter)
			.await
			.expect("Released barrier should wake waiters.")
			.expect("Waiter task should not panic.");

		assert!(!barrier.is_pending());
	}
}
