//! Wire envelope and the typed bodies of every cross-context message.

// self
use crate::{
	_prelude::*,
	auth::{ClientId, CorrelationId},
	error::WireError,
	flows::{AcquisitionResult, TokenRequest},
	protocol::Origin,
};

/// Protocol version spoken by this crate.
pub const PROTOCOL_VERSION: u32 = 1;

/// Closed set of message kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
	/// Embedded client asks a candidate broker to bond.
	HandshakeRequest,
	/// Broker accepts the bond.
	HandshakeResponse,
	/// Embedded client asks the broker for a token.
	AuthRequest,
	/// Broker answers an [`MessageType::AuthRequest`].
	AuthResponse,
	/// Embedded client asks for the result of a completed redirect.
	RedirectRequest,
	/// Broker answers a [`MessageType::RedirectRequest`].
	RedirectResponse,
}
impl MessageType {
	/// Wire spelling of the type.
	pub fn as_str(self) -> &'static str {
		match self {
			Self::HandshakeRequest => "HANDSHAKE_REQUEST",
			Self::HandshakeResponse => "HANDSHAKE_RESPONSE",
			Self::AuthRequest => "AUTH_REQUEST",
			Self::AuthResponse => "AUTH_RESPONSE",
			Self::RedirectRequest => "REDIRECT_REQUEST",
			Self::RedirectResponse => "REDIRECT_RESPONSE",
		}
	}

	/// Type of the reply a request of this type expects.
	pub fn response_type(self) -> Option<Self> {
		match self {
			Self::HandshakeRequest => Some(Self::HandshakeResponse),
			Self::AuthRequest => Some(Self::AuthResponse),
			Self::RedirectRequest => Some(Self::RedirectResponse),
			_ => None,
		}
	}
}
impl Display for MessageType {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// How the embedded app wants the token acquired.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InteractionType {
	/// No UI; fail with interaction required instead.
	Silent,
	/// Popup window.
	Popup,
	/// Full-page redirect of the top frame.
	Redirect,
}
impl InteractionType {
	/// Returns `true` for flows that show UI.
	pub fn is_interactive(self) -> bool {
		!matches!(self, Self::Silent)
	}
}
impl Display for InteractionType {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(match self {
			Self::Silent => "silent",
			Self::Popup => "popup",
			Self::Redirect => "redirect",
		})
	}
}

/// Raw wire envelope. The payload stays untyped until [`crate::protocol::validate`] decodes
/// it for the declared type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
	/// Declared message kind.
	pub message_type: MessageType,
	/// Protocol version of the sender.
	pub version: u32,
	/// Correlates a reply with its request.
	pub correlation_id: CorrelationId,
	/// Type-specific body.
	#[serde(default)]
	pub payload: Value,
}

/// Payload of [`MessageType::HandshakeRequest`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HandshakeRequest {
	/// Client id the embedded app is registered with.
	pub embedded_client_id: ClientId,
}

/// Payload of [`MessageType::HandshakeResponse`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HandshakeResponse {
	/// Client id the broker acquires tokens with.
	pub broker_client_id: ClientId,
}

/// Payload of [`MessageType::AuthRequest`].
///
/// The embedded app's origin is deliberately absent: the broker reads it from the transport.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AuthRequest {
	/// Requested acquisition style.
	pub interaction_type: InteractionType,
	/// Client id the embedded app is registered with.
	pub embedded_client_id: ClientId,
	/// The acquisition request itself.
	pub request: TokenRequest,
}

/// Outcome of a brokered call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "camelCase")]
pub enum BrokerReply {
	/// Acquisition succeeded.
	Result(AcquisitionResult),
	/// Acquisition failed.
	Error(WireError),
	/// The broker navigated the top frame; the result arrives through a redirect request.
	Redirecting,
}

/// Payload of [`MessageType::AuthResponse`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AuthResponse {
	/// What the broker produced.
	pub reply: BrokerReply,
}

/// Payload of [`MessageType::RedirectRequest`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RedirectRequest {
	/// Client id the embedded app is registered with.
	pub embedded_client_id: ClientId,
}

/// Payload of [`MessageType::RedirectResponse`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RedirectResponse {
	/// Pending redirect outcome for the sender, or `None` when nothing is waiting.
	#[serde(default)]
	pub reply: Option<BrokerReply>,
}

/// Decoded body of a validated message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageBody {
	/// See [`HandshakeRequest`].
	HandshakeRequest(HandshakeRequest),
	/// See [`HandshakeResponse`].
	HandshakeResponse(HandshakeResponse),
	/// See [`AuthRequest`].
	AuthRequest(AuthRequest),
	/// See [`AuthResponse`].
	AuthResponse(AuthResponse),
	/// See [`RedirectRequest`].
	RedirectRequest(RedirectRequest),
	/// See [`RedirectResponse`].
	RedirectResponse(RedirectResponse),
}
impl MessageBody {
	/// Message type this body is sent as.
	pub fn message_type(&self) -> MessageType {
		match self {
			Self::HandshakeRequest(_) => MessageType::HandshakeRequest,
			Self::HandshakeResponse(_) => MessageType::HandshakeResponse,
			Self::AuthRequest(_) => MessageType::AuthRequest,
			Self::AuthResponse(_) => MessageType::AuthResponse,
			Self::RedirectRequest(_) => MessageType::RedirectRequest,
			Self::RedirectResponse(_) => MessageType::RedirectResponse,
		}
	}

	/// Builds the wire envelope for this body.
	pub fn encode(&self, version: u32, correlation_id: &CorrelationId) -> serde_json::Result<Value> {
		let payload = match self {
			Self::HandshakeRequest(body) => serde_json::to_value(body),
			Self::HandshakeResponse(body) => serde_json::to_value(body),
			Self::AuthRequest(body) => serde_json::to_value(body),
			Self::AuthResponse(body) => serde_json::to_value(body),
			Self::RedirectRequest(body) => serde_json::to_value(body),
			Self::RedirectResponse(body) => serde_json::to_value(body),
		}?;

		serde_json::to_value(Envelope {
			message_type: self.message_type(),
			version,
			correlation_id: correlation_id.clone(),
			payload,
		})
	}
}

/// Structurally valid message paired with the origin the transport observed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
	/// Protocol version the sender declared.
	pub version: u32,
	/// Correlation id of the exchange.
	pub correlation_id: CorrelationId,
	/// Sender origin as observed by the transport.
	pub sender: Origin,
	/// Decoded body.
	pub body: MessageBody,
}
impl Message {
	/// Shorthand for `self.body.message_type()`.
	pub fn message_type(&self) -> MessageType {
		self.body.message_type()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn envelopes_use_camel_case_and_screaming_types() {
		let body = MessageBody::HandshakeRequest(HandshakeRequest {
			embedded_client_id: ClientId::new("child-app").expect("Client id should be valid."),
		});
		let correlation = CorrelationId::new("c-1").expect("Correlation id should be valid.");
		let json = body.encode(PROTOCOL_VERSION, &correlation).expect("Envelope should encode.");

		assert_eq!(
			json,
			serde_json::json!({
				"messageType": "HANDSHAKE_REQUEST",
				"version": 1,
				"correlationId": "c-1",
				"payload": { "embeddedClientId": "child-app" },
			})
		);
	}

	#[test]
	fn broker_replies_are_tagged() {
		let redirecting =
			serde_json::to_value(BrokerReply::Redirecting).expect("Reply should serialize.");
		let failed = serde_json::to_value(BrokerReply::Error(WireError::new("server_error")))
			.expect("Reply should serialize.");

		assert_eq!(redirecting, serde_json::json!({ "status": "redirecting" }));
		assert_eq!(failed["status"], "error");
		assert_eq!(failed["value"]["code"], "server_error");
	}

	#[test]
	fn response_types_pair_with_requests() {
		assert_eq!(MessageType::AuthRequest.response_type(), Some(MessageType::AuthResponse));
		assert_eq!(MessageType::AuthResponse.response_type(), None);
		assert_eq!(MessageType::RedirectRequest.to_string(), "REDIRECT_REQUEST");
		assert!(InteractionType::Popup.is_interactive());
		assert!(!InteractionType::Silent.is_interactive());
	}
}
