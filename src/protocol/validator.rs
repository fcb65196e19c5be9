//! Structural validation of inbound messages.
//!
//! Validation is fail-closed: [`validate`] turns every failure into `None` so arbitrary
//! cross-context traffic can never crash a listener. [`try_validate`] exposes the reason for
//! diagnostics and tests.

// crates.io
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	protocol::{Envelope, Message, MessageBody, MessageType, Origin, OriginError, PROTOCOL_VERSION},
};

/// Why a raw event was rejected.
#[derive(Debug, ThisError)]
pub enum ValidationError {
	/// The transport reported an origin that cannot be trusted at all.
	#[error("Sender origin `{origin}` is not a valid web origin.")]
	Origin {
		/// Origin string reported by the transport.
		origin: String,
		/// Parsing failure.
		#[source]
		source: OriginError,
	},
	/// The envelope is not an object of the expected shape, or names an unknown type.
	#[error("Message envelope is malformed.")]
	Envelope {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// The sender speaks a protocol version this crate does not.
	#[error("Protocol version {version} is not supported.")]
	Version {
		/// Declared version.
		version: u32,
	},
	/// The payload does not match the declared message type.
	#[error("Payload of {message_type} is malformed.")]
	Payload {
		/// Declared message type.
		message_type: MessageType,
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
}
impl ValidationError {
	/// JSON path of the offending field, when the failure came from decoding.
	pub fn path(&self) -> Option<String> {
		match self {
			Self::Envelope { source } | Self::Payload { source, .. } =>
				Some(source.path().to_string()),
			_ => None,
		}
	}
}

/// Validates a raw event, dropping it on any failure.
pub fn validate(origin: &str, data: &Value) -> Option<Message> {
	match try_validate(origin, data) {
		Ok(message) => Some(message),
		Err(e) => {
			tracing::debug!(origin, error = %e, path = ?e.path(), "dropped malformed message");

			None
		},
	}
}

/// Validates a raw event and reports why it was rejected.
pub fn try_validate(origin: &str, data: &Value) -> Result<Message, ValidationError> {
	let sender = Origin::parse(origin)
		.map_err(|source| ValidationError::Origin { origin: origin.into(), source })?;
	let envelope: Envelope =
		serde_path_to_error::deserialize(data).map_err(|source| ValidationError::Envelope { source })?;

	if envelope.version == 0 || envelope.version > PROTOCOL_VERSION {
		return Err(ValidationError::Version { version: envelope.version });
	}

	let message_type = envelope.message_type;
	let payload = &envelope.payload;
	let body = match message_type {
		MessageType::HandshakeRequest =>
			MessageBody::HandshakeRequest(decode(message_type, payload)?),
		MessageType::HandshakeResponse =>
			MessageBody::HandshakeResponse(decode(message_type, payload)?),
		MessageType::AuthRequest => MessageBody::AuthRequest(decode(message_type, payload)?),
		MessageType::AuthResponse => MessageBody::AuthResponse(decode(message_type, payload)?),
		MessageType::RedirectRequest =>
			MessageBody::RedirectRequest(decode(message_type, payload)?),
		MessageType::RedirectResponse =>
			MessageBody::RedirectResponse(decode(message_type, payload)?),
	};

	Ok(Message { version: envelope.version, correlation_id: envelope.correlation_id, sender, body })
}

fn decode<T>(message_type: MessageType, payload: &Value) -> Result<T, ValidationError>
where
	T: DeserializeOwned,
{
	serde_path_to_error::deserialize(payload)
		.map_err(|source| ValidationError::Payload { message_type, source })
}
