//! Message classifier
//!
//! Tags a raw channel payload `[channel_id, body, ...]` with its
//! `ChannelMessage` variant. Classification only looks at the frame and the
//! first element of the body, so it is O(1) in the payload size, and it
//! never mutates the payload.

use serde_json::Value;

use crate::error::{Result, StreamError};
use crate::events::{ChannelKind, ChannelMessage, TradeType};

const HEARTBEAT: &str = "hb";

/// Classify a raw payload received on a channel of the given kind.
pub fn classify(channel: ChannelKind, payload: &Value) -> Result<ChannelMessage<'_>> {
    let frame = payload
        .as_array()
        .ok_or_else(|| StreamError::unrecognized(channel, format!("frame is {}", shape_of(payload))))?;

    let body = frame
        .get(1)
        .ok_or_else(|| StreamError::unrecognized(channel, "frame without body"))?;

    if body.as_str() == Some(HEARTBEAT) {
        return Ok(ChannelMessage::Heartbeat);
    }

    match channel {
        ChannelKind::Book => classify_book(body),
        ChannelKind::Ticker => classify_ticker(body),
        ChannelKind::Trades => classify_trades(frame, body),
    }
}

fn classify_book(body: &Value) -> Result<ChannelMessage<'_>> {
    match body {
        // An empty snapshot clears the book.
        Value::Array(entries) if entries.is_empty() => Ok(ChannelMessage::BookSnapshot(entries)),
        Value::Array(entries) if entries[0].is_array() => Ok(ChannelMessage::BookSnapshot(entries)),
        Value::Array(_) => Ok(ChannelMessage::BookUpdate(body)),
        other => Err(StreamError::unrecognized(
            ChannelKind::Book,
            format!("body is {}", shape_of(other)),
        )),
    }
}

fn classify_ticker(body: &Value) -> Result<ChannelMessage<'_>> {
    match body {
        Value::Array(fields) if fields.first().is_some_and(|f| !f.is_array()) => {
            Ok(ChannelMessage::Ticker(fields))
        }
        other => Err(StreamError::unrecognized(
            ChannelKind::Ticker,
            format!("body is {}", shape_of(other)),
        )),
    }
}

fn classify_trades<'a>(frame: &'a [Value], body: &'a Value) -> Result<ChannelMessage<'a>> {
    match body {
        Value::String(marker) => {
            let kind = TradeType::from_marker(marker).ok_or_else(|| {
                StreamError::unrecognized(ChannelKind::Trades, format!("unknown marker {marker:?}"))
            })?;
            match frame.get(2) {
                Some(trade) if trade.is_array() => Ok(ChannelMessage::TradeUpdate { kind, trade }),
                _ => Err(StreamError::unrecognized(
                    ChannelKind::Trades,
                    format!("{marker} event without trade array"),
                )),
            }
        }
        Value::Array(entries) if entries.is_empty() || entries[0].is_array() => {
            Ok(ChannelMessage::TradeSnapshot(entries))
        }
        other => Err(StreamError::unrecognized(
            ChannelKind::Trades,
            format!("body is {}", shape_of(other)),
        )),
    }
}

fn shape_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
