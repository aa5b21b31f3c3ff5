//! Error types for the framing layer.
//!
//! "Not enough bytes yet" is never an error here: decoders signal it with
//! `Ok(None)`. Everything in this module is a real fault.

use thiserror::Error;

use crate::frame::FrameKind;

/// HTTP/2 error codes (RFC 7540 Section 7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    NoError = 0x0,
    ProtocolError = 0x1,
    InternalError = 0x2,
    FlowControlError = 0x3,
    SettingsTimeout = 0x4,
    StreamClosed = 0x5,
    FrameSizeError = 0x6,
    RefusedStream = 0x7,
    Cancel = 0x8,
    CompressionError = 0x9,
    ConnectError = 0xa,
    EnhanceYourCalm = 0xb,
    InadequateSecurity = 0xc,
    Http11Required = 0xd,
}

impl ErrorCode {
    /// Map a wire value to a code. Unknown codes are treated as INTERNAL_ERROR.
    pub fn from_u32(v: u32) -> Self {
        match v {
            0x0 => Self::NoError,
            0x1 => Self::ProtocolError,
            0x2 => Self::InternalError,
            0x3 => Self::FlowControlError,
            0x4 => Self::SettingsTimeout,
            0x5 => Self::StreamClosed,
            0x6 => Self::FrameSizeError,
            0x7 => Self::RefusedStream,
            0x8 => Self::Cancel,
            0x9 => Self::CompressionError,
            0xa => Self::ConnectError,
            0xb => Self::EnhanceYourCalm,
            0xc => Self::InadequateSecurity,
            0xd => Self::Http11Required,
            _ => Self::InternalError,
        }
    }
}

/// A framing fault: the bytes are complete enough to know the frame is bad.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("{kind:?} frame must be {expected} bytes, got {actual}")]
    InvalidLength {
        kind: FrameKind,
        expected: u32,
        actual: u32,
    },
    #[error("{kind:?} frame needs at least {min} bytes, got {actual}")]
    PayloadTooShort { kind: FrameKind, min: u32, actual: u32 },
    #[error("SETTINGS payload length {0} is not a multiple of 6")]
    SettingsLength(u32),
    #[error("SETTINGS ACK must have an empty payload, got {0} bytes")]
    SettingsAckWithPayload(u32),
    #[error("invalid padding in {kind:?} frame (pad length {pad_length}, payload {length})")]
    InvalidPadding {
        kind: FrameKind,
        pad_length: u8,
        length: u32,
    },
    #[error("HEADERS frame too short for its priority block")]
    PriorityTooShort,
    #[error("unknown frame type {0:#x}")]
    UnknownType(u8),
    #[error("{0:?} frame requires a non-zero stream id")]
    StreamIdRequired(FrameKind),
    #[error("{kind:?} frame must be sent on stream 0, got stream {stream_id}")]
    StreamIdForbidden { kind: FrameKind, stream_id: u32 },
    #[error("frame length {length} exceeds max frame size {max}")]
    FrameTooLarge { length: u32, max: u32 },
}

impl FrameError {
    /// The RST_STREAM / GOAWAY code that corresponds to this fault.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidLength { .. }
            | Self::PayloadTooShort { .. }
            | Self::SettingsLength(_)
            | Self::SettingsAckWithPayload(_)
            | Self::FrameTooLarge { .. } => ErrorCode::FrameSizeError,
            Self::InvalidPadding { .. }
            | Self::PriorityTooShort
            | Self::UnknownType(_)
            | Self::StreamIdRequired(_)
            | Self::StreamIdForbidden { .. } => ErrorCode::ProtocolError,
        }
    }
}

/// Header compression failure reported by the compression service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("HPACK decode error: {0}")]
pub struct CompressionError(pub String);

/// A stream-state fault. The stream's accumulated data is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("stream {0}: header block already complete")]
    HeadersAfterEndHeaders(u32),
    #[error("stream {0}: data after END_STREAM")]
    DataAfterEndStream(u32),
    #[error("stream {0}: CONTINUATION without an open header block")]
    UnexpectedContinuation(u32),
    #[error("stream {0}: HEADERS while a header block is still open")]
    InterleavedHeaders(u32),
    #[error("stream {0}: DATA before HEADERS")]
    DataBeforeHeaders(u32),
    #[error("stream {0} is closed")]
    Closed(u32),
    #[error("stream {stream_id}: header block too large ({size} bytes, max {max})")]
    HeaderBlockTooLarge { stream_id: u32, size: usize, max: usize },
    #[error("stream {stream_id}: {source}")]
    Compression {
        stream_id: u32,
        #[source]
        source: CompressionError,
    },
}

impl StreamError {
    /// The RST_STREAM code sent to the peer for this fault.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::HeadersAfterEndHeaders(_)
            | Self::UnexpectedContinuation(_)
            | Self::InterleavedHeaders(_)
            | Self::DataBeforeHeaders(_) => ErrorCode::ProtocolError,
            Self::DataAfterEndStream(_) | Self::Closed(_) => ErrorCode::StreamClosed,
            Self::HeaderBlockTooLarge { .. } => ErrorCode::EnhanceYourCalm,
            Self::Compression { .. } => ErrorCode::CompressionError,
        }
    }
}

/// Failure raised by an application handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("handler failed: {0}")]
    Handler(String),
}
