//! Arrival-order sequencing of broker requests.

// crates.io
use tokio::sync::oneshot;
// self
use crate::_prelude::*;

/// Hands out FIFO tickets; each ticket waits for the one issued before it.
#[derive(Debug, Default)]
pub(crate) struct Sequencer {
	tail: Mutex<Option<oneshot::Receiver<()>>>,
}
impl Sequencer {
	/// Issues the next ticket. Must be called synchronously on arrival.
	pub(crate) fn ticket(&self) -> Ticket {
		let (release, done) = oneshot::channel();
		let predecessor = self.tail.lock().replace(done);

		Ticket { predecessor, _release: release }
	}
}

/// Place in line; dropping it lets the next ticket through.
#[derive(Debug)]
pub(crate) struct Ticket {
	predecessor: Option<oneshot::Receiver<()>>,
	_release: oneshot::Sender<()>,
}
impl Ticket {
	/// Resolves once every earlier ticket was dropped.
	pub(crate) async fn wait(&mut self) {
		if let Some(predecessor) = self.predecessor.as_mut() {
			// Predecessors never send; the channel closing is the signal.
			let _ = predecessor.await;

			self.predecessor = None;
		}
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::time::Duration as StdDuration;
	// self
	use super::*;

	#[tokio::test]
	async fn tickets_complete_in_issue_order() {
		let sequencer = Sequencer::default();
		let first = sequencer.ticket();
		let mut second = sequencer.ticket();
		let mut third = sequencer.ticket();

		assert!(
			tokio::time::timeout(StdDuration::from_millis(20), second.wait()).await.is_err(),
			"Second ticket should wait for the first."
		);

		drop(first);

		tokio::time::timeout(StdDuration::from_secs(1), second.wait())
			.await
			.expect("Second ticket should pass once the first is dropped.");

		assert!(tokio::time::timeout(StdDuration::from_millis(20), third.wait()).await.is_err());

		drop(second);

		tokio::time::timeout(StdDuration::from_secs(1), third.wait())
			.await
			.expect("Third ticket should pass once the second is dropped.");
	}
}
