//! In-process transport linking embedded clients to a broker.
//!
//! Useful for hosts that run both sides in one process and for tests. Each
//! [`MemoryTransport`] stamps its requests with a fixed embedded origin and its replies with a
//! fixed broker origin, standing in for what a browser reports on `message` events.

// crates.io
use tokio::sync::{mpsc, oneshot};
// self
use crate::{
	_prelude::*,
	transport::{BrokerTransport, ChannelError, InboundEvent, PendingReply, ReplyEvent, ReplyPort},
};

/// Creates a hub for embedded transports and the inbox the broker drains.
pub fn channel() -> (MemoryHub, BrokerInbox) {
	let (tx, rx) = mpsc::unbounded_channel();

	(MemoryHub { tx }, BrokerInbox { rx })
}

/// Hands out transports that all deliver into one [`BrokerInbox`].
#[derive(Clone, Debug)]
pub struct MemoryHub {
	tx: mpsc::UnboundedSender<InboundEvent>,
}
impl MemoryHub {
	/// Transport for an embedded app at `embedded_origin` whose replies appear to come from
	/// `broker_origin`.
	pub fn connect(
		&self,
		embedded_origin: impl Into<String>,
		broker_origin: impl Into<String>,
	) -> MemoryTransport {
		MemoryTransport {
			embedded_origin: embedded_origin.into(),
			broker_origin: broker_origin.into(),
			tx: self.tx.clone(),
		}
	}

	/// Posts a raw event without a reply channel, as stray page traffic does.
	pub fn post(&self, origin: impl Into<String>, data: Value) -> Result<(), ChannelError> {
		self.tx
			.send(InboundEvent { origin: origin.into(), data, reply: None })
			.map_err(|_| ChannelError::Disconnected)
	}
}

/// Receiving end the broker listens on.
#[derive(Debug)]
pub struct BrokerInbox {
	rx: mpsc::UnboundedReceiver<InboundEvent>,
}
impl BrokerInbox {
	/// Next event, or `None` once every hub and transport is dropped.
	pub async fn recv(&mut self) -> Option<InboundEvent> {
		self.rx.recv().await
	}
}

/// Embedded-side transport backed by in-process channels.
#[derive(Clone, Debug)]
pub struct MemoryTransport {
	embedded_origin: String,
	broker_origin: String,
	tx: mpsc::UnboundedSender<InboundEvent>,
}
impl BrokerTransport for MemoryTransport {
	fn open(&self, data: Value) -> Result<PendingReply, ChannelError> {
		let (reply_tx, reply_rx) = oneshot::channel();
		let port = MemoryReplyPort {
			origin: self.broker_origin.clone(),
			state: Mutex::new(PortState::Open(reply_tx)),
		};

		self.tx
			.send(InboundEvent {
				origin: self.embedded_origin.clone(),
				data,
				reply: Some(Arc::new(port)),
			})
			.map_err(|_| ChannelError::Disconnected)?;

		Ok(PendingReply::new(reply_rx))
	}
}

enum PortState {
	Open(oneshot::Sender<ReplyEvent>),
	Replied,
	Closed,
}

struct MemoryReplyPort {
	origin: String,
	state: Mutex<PortState>,
}
impl ReplyPort for MemoryReplyPort {
	fn send(&self, data: Value) -> Result<(), ChannelError> {
		let mut state = self.state.lock();

		match std::mem::replace(&mut *state, PortState::Replied) {
			PortState::Open(tx) => tx
				.send(ReplyEvent { origin: self.origin.clone(), data })
				.map_err(|_| ChannelError::Disconnected),
			PortState::Replied => Err(ChannelError::AlreadyReplied),
			PortState::Closed => {
				*state = PortState::Closed;

				Err(ChannelError::Closed)
			},
		}
	}

	fn close(&self) {
		let mut state = self.state.lock();

		if matches!(*state, PortState::Open(_)) {
			*state = PortState::Closed;
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
	async fn replies_carry_the_broker_origin_and_only_once() {
		let (hub, mut inbox) = channel();
		let transport = hub.connect("https://child.example", "https://host.example");
		let pending = transport.open(serde_json::json!({ "hello": 1 })).expect("Open should work.");
		let event = inbox.recv().await.expect("Broker should receive the event.");
		let port = event.reply.expect("Dedicated channel should be attached.");

		assert_eq!(event.origin, "https://child.example");

		port.send(serde_json::json!("first")).expect("First reply should be delivered.");

		assert!(matches!(
			port.send(serde_json::json!("second")),
			Err(ChannelError::AlreadyReplied)
		));

		port.close();

		let reply = pending.wait(StdDuration::from_secs(1)).await.expect("Reply should arrive.");

		assert_eq!(reply.origin, "https://host.example");
		assert_eq!(reply.data, serde_json::json!("first"));
	}

	#[tokio::test]
	async fn closed_and_silent_channels_are_reported() {
		let (hub, mut inbox) = channel();
		let transport = hub.connect("https://child.example", "https://host.example");
		let closed = transport.open(Value::Null).expect("Open should work.");
		let silent = transport.open(Value::Null).expect("Open should work.");
		let first = inbox.recv().await.expect("First event should arrive.");
		let _second = inbox.recv().await.expect("Second event should arrive.");
		let port = first.reply.expect("Dedicated channel should be attached.");

		port.close();

		assert!(matches!(port.send(Value::Null), Err(ChannelError::Closed)));
		assert!(matches!(closed.wait(StdDuration::from_secs(1)).await, Err(ChannelError::Closed)));
		assert!(matches!(
			silent.wait(StdDuration::from_millis(20)).await,
			Err(ChannelError::TimedOut { .. })
		));
	}
}
