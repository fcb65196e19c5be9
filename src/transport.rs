//! Cross-context transport seam.
//!
//! The runtime never binds to a page's messaging surface directly. An embedded client posts
//! requests through a [`BrokerTransport`], which opens a dedicated reply channel per call. The
//! broker receives [`InboundEvent`]s carrying the sender origin the transport observed and the
//! [`ReplyPort`] to answer on. Whichever side sends the terminal reply closes the port.

pub mod memory;

pub use memory::{BrokerInbox, MemoryHub, MemoryTransport};

// std
use std::time::Duration as StdDuration;
// crates.io
use tokio::sync::oneshot;
// self
use crate::_prelude::*;

/// Failures of the cross-context channel itself.
#[derive(Debug, ThisError)]
pub enum ChannelError {
	/// The channel closed before a reply arrived.
	#[error("The reply channel closed before a reply arrived.")]
	Closed,
	/// A reply was already sent over this channel.
	#[error("The reply channel already delivered its reply.")]
	AlreadyReplied,
	/// The peer context is gone.
	#[error("The peer context is unreachable.")]
	Disconnected,
	/// No reply arrived in time.
	#[error("No reply arrived within {waited:?}.")]
	TimedOut {
		/// Window that elapsed.
		waited: StdDuration,
	},
	/// A message could not be encoded.
	#[error("Message could not be encoded.")]
	Encode(#[from] serde_json::Error),
}

/// Per-call dedicated channel the broker answers on.
pub trait ReplyPort
where
	Self: Send + Sync,
{
	/// Posts the reply.
	fn send(&self, data: Value) -> Result<(), ChannelError>;

	/// Closes the channel; further sends fail.
	fn close(&self);
}

/// Raw message as delivered to the broker.
#[derive(Clone)]
pub struct InboundEvent {
	/// Sender origin observed by the transport.
	pub origin: String,
	/// Message body.
	pub data: Value,
	/// Channel to answer on, when the sender opened one.
	pub reply: Option<Arc<dyn ReplyPort>>,
}
impl Debug for InboundEvent {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("InboundEvent")
			.field("origin", &self.origin)
			.field("data", &self.data)
			.field("has_reply_port", &self.reply.is_some())
			.finish()
	}
}

/// Raw reply as delivered to the embedded client.
#[derive(Clone, Debug, PartialEq)]
pub struct ReplyEvent {
	/// Sender origin observed by the transport.
	pub origin: String,
	/// Message body.
	pub data: Value,
}

/// Embedded side of the link to a candidate broker.
pub trait BrokerTransport
where
	Self: Send + Sync,
{
	/// Posts `data` to the broker over a fresh dedicated channel.
	fn open(&self, data: Value) -> Result<PendingReply, ChannelError>;
}

/// Reply the embedded client is waiting for.
#[derive(Debug)]
pub struct PendingReply {
	rx: oneshot::Receiver<ReplyEvent>,
}
impl PendingReply {
	/// Wraps the receiving half of a reply channel.
	pub fn new(rx: oneshot::Receiver<ReplyEvent>) -> Self {
		Self { rx }
	}

	/// Waits up to `timeout` for the reply.
	pub async fn wait(self, timeout: StdDuration) -> Result<ReplyEvent, ChannelError> {
		match tokio::time::timeout(timeout, self.rx).await {
			Ok(Ok(reply)) => Ok(reply),
			Ok(Err(_)) => Err(ChannelError::Closed),
			Err(_) => Err(ChannelError::TimedOut { waited: timeout }),
		}
	}
}
