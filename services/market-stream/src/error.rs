//! Error taxonomy for the market-stream core
//!
//! Two families of errors exist:
//! - retained-state errors (`MalformedMessage`, `UnrecognizedShape`): the
//!   offending message is abandoned, prior state is kept and processing
//!   continues with the next message;
//! - terminal errors (`DesyncDetected`, `TransportLoss`, `ConsumerLagged`):
//!   delivered once to the affected consumer sequences, which then end.

use thiserror::Error;
use types::errors::TypesError;
use types::instrument::Instrument;

use crate::events::ChannelKind;

/// Result type alias for market-stream operations.
pub type Result<T> = std::result::Result<T, StreamError>;

/// Main error type for market-stream operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// Payload could not be decoded or is missing a required field.
    #[error("malformed {channel} message: {reason}")]
    MalformedMessage { channel: ChannelKind, reason: String },

    /// The classifier could not tag the payload.
    #[error("unrecognized {channel} payload shape: {shape}")]
    UnrecognizedShape { channel: ChannelKind, shape: String },

    /// Updates could not be reconciled with the current book baseline.
    #[error("order book desync for {instrument}: {reason}")]
    DesyncDetected { instrument: Instrument, reason: String },

    /// The transport lost the connection or refused the subscription.
    #[error("transport lost for {channel} {instrument}: {reason}")]
    TransportLoss {
        channel: ChannelKind,
        instrument: Instrument,
        reason: String,
    },

    /// The consumer fell behind and its queue overflowed.
    #[error("consumer {consumer} lagged behind and was disconnected")]
    ConsumerLagged { consumer: u64 },

    /// Configuration rejected at subscription time.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl StreamError {
    pub(crate) fn malformed(channel: ChannelKind, reason: impl Into<String>) -> Self {
        StreamError::MalformedMessage {
            channel,
            reason: reason.into(),
        }
    }

    pub(crate) fn unrecognized(channel: ChannelKind, shape: impl Into<String>) -> Self {
        StreamError::UnrecognizedShape {
            channel,
            shape: shape.into(),
        }
    }

    /// Whether this error ends the affected consumer sequences.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamError::DesyncDetected { .. }
                | StreamError::TransportLoss { .. }
                | StreamError::ConsumerLagged { .. }
        )
    }
}

impl From<TypesError> for StreamError {
    fn from(err: TypesError) -> Self {
        StreamError::InvalidConfig(err.to_string())
    }
}
