//! HTTP/2 frame codec.
//!
//! Stateless functions mapping bytes to typed frames and back. Nothing here
//! knows about connections or streams.
//!
//! ```text
//! +-----------------------------------------------+
//! |                 Length (24)                    |
//! +---------------+---------------+---------------+
//! |   Type (8)    |   Flags (8)   |
//! +-+-------------+---------------+------...------+
//! |R|                 Stream Identifier (31)       |
//! +-+---------------------------------------------+
//! |                   Frame Payload ...            |
//! +-----------------------------------------------+
//! ```
//!
//! Decoders return `Ok(None)` when the buffer does not yet hold the whole
//! frame. A frame whose header alone proves it malformed (wrong fixed length,
//! unknown type, bad stream id) fails immediately, without waiting for its
//! payload.
//!
//! Reference: RFC 7540 Sections 4 and 6

use crate::error::{ErrorCode, FrameError};
use crate::headers::HeaderMap;
use crate::hpack::HeaderCompression;
use crate::settings::SettingsMap;

/// Size of the fixed frame header.
pub const FRAME_HEADER_LEN: usize = 9;

/// Largest value the 24-bit length field can carry.
pub const MAX_FRAME_LENGTH: u32 = (1 << 24) - 1;

/// Mask for the 31-bit stream identifier (bit 31 is reserved).
pub const STREAM_ID_MASK: u32 = 0x7FFF_FFFF;

/// The HTTP/2 connection preface (24 bytes)
pub const CONNECTION_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// Check if data starts with the HTTP/2 connection preface
pub fn is_connection_preface(data: &[u8]) -> bool {
    data.len() >= CONNECTION_PREFACE.len() && &data[..CONNECTION_PREFACE.len()] == CONNECTION_PREFACE
}

/// HTTP/2 frame types (RFC 7540 Section 6)
pub mod frame_type {
    pub const DATA: u8 = 0x0;
    pub const HEADERS: u8 = 0x1;
    pub const PRIORITY: u8 = 0x2;
    pub const RST_STREAM: u8 = 0x3;
    pub const SETTINGS: u8 = 0x4;
    pub const PUSH_PROMISE: u8 = 0x5;
    pub const PING: u8 = 0x6;
    pub const GOAWAY: u8 = 0x7;
    pub const WINDOW_UPDATE: u8 = 0x8;
    pub const CONTINUATION: u8 = 0x9;
}

/// HTTP/2 frame flags
pub mod flags {
    pub const END_STREAM: u8 = 0x1;
    pub const ACK: u8 = 0x1;
    pub const END_HEADERS: u8 = 0x4;
    pub const PADDED: u8 = 0x8;
    pub const PRIORITY: u8 = 0x20;
}

/// The frame types this layer recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Data,
    Headers,
    Priority,
    RstStream,
    Settings,
    PushPromise,
    Ping,
    GoAway,
    WindowUpdate,
    Continuation,
}

impl FrameKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            frame_type::DATA => Self::Data,
            frame_type::HEADERS => Self::Headers,
            frame_type::PRIORITY => Self::Priority,
            frame_type::RST_STREAM => Self::RstStream,
            frame_type::SETTINGS => Self::Settings,
            frame_type::PUSH_PROMISE => Self::PushPromise,
            frame_type::PING => Self::Ping,
            frame_type::GOAWAY => Self::GoAway,
            frame_type::WINDOW_UPDATE => Self::WindowUpdate,
            frame_type::CONTINUATION => Self::Continuation,
            _ => return None,
        })
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::Data => frame_type::DATA,
            Self::Headers => frame_type::HEADERS,
            Self::Priority => frame_type::PRIORITY,
            Self::RstStream => frame_type::RST_STREAM,
            Self::Settings => frame_type::SETTINGS,
            Self::PushPromise => frame_type::PUSH_PROMISE,
            Self::Ping => frame_type::PING,
            Self::GoAway => frame_type::GOAWAY,
            Self::WindowUpdate => frame_type::WINDOW_UPDATE,
            Self::Continuation => frame_type::CONTINUATION,
        }
    }

    /// Recognized on the wire but not acted on by this layer.
    pub fn is_unsupported(self) -> bool {
        matches!(self, Self::PushPromise | Self::Ping | Self::GoAway)
    }
}

/// A parsed HTTP/2 frame header (9 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub length: u32,      // 24 bits
    pub frame_type: u8,
    pub flags: u8,
    pub stream_id: u32,   // 31 bits (high bit reserved)
}

impl FrameHeader {
    /// Parse a 9-byte frame header. `None` if fewer than 9 bytes are available.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < FRAME_HEADER_LEN {
            return None;
        }

        let length = u32::from_be_bytes([0, data[0], data[1], data[2]]);
        let stream_id = u32::from_be_bytes([data[5], data[6], data[7], data[8]]) & STREAM_ID_MASK;

        Some(Self {
            length,
            frame_type: data[3],
            flags: data[4],
            stream_id,
        })
    }

    /// Total frame size including header
    pub fn total_size(&self) -> usize {
        FRAME_HEADER_LEN + self.length as usize
    }

    pub fn kind(&self) -> Option<FrameKind> {
        FrameKind::from_u8(self.frame_type)
    }

    pub fn has_flag(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }

    /// Check if END_STREAM flag is set
    pub fn is_end_stream(&self) -> bool {
        self.has_flag(flags::END_STREAM)
    }

    /// Check if END_HEADERS flag is set
    pub fn is_end_headers(&self) -> bool {
        self.has_flag(flags::END_HEADERS)
    }

    pub fn encode(&self) -> [u8; FRAME_HEADER_LEN] {
        encode_frame_header(self.length, self.frame_type, self.flags, self.stream_id)
    }
}

/// Stream dependency carried by PRIORITY and prioritized HEADERS frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Priority {
    pub exclusive: bool,
    pub dependency: u32,
    pub weight: u8,
}

impl Priority {
    fn parse(data: &[u8]) -> Self {
        let raw = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        Self {
            exclusive: raw & !STREAM_ID_MASK != 0,
            dependency: raw & STREAM_ID_MASK,
            weight: data[4],
        }
    }
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Data {
        stream_id: u32,
        data: Vec<u8>,
        pad_length: u8,
        end_stream: bool,
    },
    /// The fragment is still HPACK-encoded; the stream assembles and decodes it.
    Headers {
        stream_id: u32,
        fragment: Vec<u8>,
        priority: Option<Priority>,
        pad_length: u8,
        end_stream: bool,
        end_headers: bool,
    },
    Priority {
        stream_id: u32,
        priority: Priority,
    },
    RstStream {
        stream_id: u32,
        error_code: ErrorCode,
    },
    Settings {
        ack: bool,
        settings: SettingsMap,
    },
    WindowUpdate {
        stream_id: u32,
        increment: u32,
    },
    Continuation {
        stream_id: u32,
        fragment: Vec<u8>,
        end_headers: bool,
    },
    /// PUSH_PROMISE, PING or GOAWAY: header decoded, payload skipped.
    Unsupported {
        kind: FrameKind,
        stream_id: u32,
        flags: u8,
        length: u32,
    },
}

impl Frame {
    pub fn stream_id(&self) -> u32 {
        match self {
            Frame::Data { stream_id, .. }
            | Frame::Headers { stream_id, .. }
            | Frame::Priority { stream_id, .. }
            | Frame::RstStream { stream_id, .. }
            | Frame::WindowUpdate { stream_id, .. }
            | Frame::Continuation { stream_id, .. }
            | Frame::Unsupported { stream_id, .. } => *stream_id,
            Frame::Settings { .. } => 0,
        }
    }

    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Data { .. } => FrameKind::Data,
            Frame::Headers { .. } => FrameKind::Headers,
            Frame::Priority { .. } => FrameKind::Priority,
            Frame::RstStream { .. } => FrameKind::RstStream,
            Frame::Settings { .. } => FrameKind::Settings,
            Frame::WindowUpdate { .. } => FrameKind::WindowUpdate,
            Frame::Continuation { .. } => FrameKind::Continuation,
            Frame::Unsupported { kind, .. } => *kind,
        }
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// Decode a frame header from the start of `buf`.
pub fn decode_frame_header(buf: &[u8]) -> Option<FrameHeader> {
    FrameHeader::parse(buf)
}

/// Checks that need only the header: known type, size limit, stream id rules
/// and fixed payload lengths.
pub fn validate_header(header: &FrameHeader, max_frame_size: u32) -> Result<FrameKind, FrameError> {
    let kind = header
        .kind()
        .ok_or(FrameError::UnknownType(header.frame_type))?;

    if header.length > max_frame_size {
        return Err(FrameError::FrameTooLarge {
            length: header.length,
            max: max_frame_size,
        });
    }

    match kind {
        FrameKind::Data
        | FrameKind::Headers
        | FrameKind::Priority
        | FrameKind::RstStream
        | FrameKind::Continuation => {
            if header.stream_id == 0 {
                return Err(FrameError::StreamIdRequired(kind));
            }
        }
        FrameKind::Settings => {
            if header.stream_id != 0 {
                return Err(FrameError::StreamIdForbidden {
                    kind,
                    stream_id: header.stream_id,
                });
            }
        }
        FrameKind::WindowUpdate | FrameKind::PushPromise | FrameKind::Ping | FrameKind::GoAway => {}
    }

    let fixed = match kind {
        FrameKind::Priority => Some(5),
        FrameKind::RstStream | FrameKind::WindowUpdate => Some(4),
        FrameKind::Ping => Some(8),
        _ => None,
    };
    if let Some(expected) = fixed {
        if header.length != expected {
            return Err(FrameError::InvalidLength {
                kind,
                expected,
                actual: header.length,
            });
        }
    }

    // Skipped frames still need a plausible size.
    let minimum = match kind {
        FrameKind::PushPromise => 4,
        FrameKind::GoAway => 8,
        _ => 0,
    };
    if header.length < minimum {
        return Err(FrameError::PayloadTooShort {
            kind,
            min: minimum,
            actual: header.length,
        });
    }

    if kind == FrameKind::Settings {
        if header.has_flag(flags::ACK) {
            if header.length != 0 {
                return Err(FrameError::SettingsAckWithPayload(header.length));
            }
        } else if header.length % 6 != 0 {
            return Err(FrameError::SettingsLength(header.length));
        }
    }

    Ok(kind)
}

/// Decode the payload that follows `header`. `buf` starts right after the
/// 9 header bytes. Returns the frame and the number of payload bytes used.
pub fn decode_payload(
    header: &FrameHeader,
    buf: &[u8],
    max_frame_size: u32,
) -> Result<Option<(Frame, usize)>, FrameError> {
    let kind = validate_header(header, max_frame_size)?;

    let length = header.length as usize;
    if buf.len() < length {
        return Ok(None);
    }
    let payload = &buf[..length];

    let frame = match kind {
        FrameKind::Data => decode_data(header, payload)?,
        FrameKind::Headers => decode_headers(header, payload)?,
        FrameKind::Priority => Frame::Priority {
            stream_id: header.stream_id,
            priority: Priority::parse(payload),
        },
        FrameKind::RstStream => Frame::RstStream {
            stream_id: header.stream_id,
            error_code: ErrorCode::from_u32(read_u32(payload)),
        },
        FrameKind::Settings => Frame::Settings {
            ack: header.has_flag(flags::ACK),
            settings: decode_settings(payload),
        },
        FrameKind::WindowUpdate => Frame::WindowUpdate {
            stream_id: header.stream_id,
            increment: read_u32(payload) & STREAM_ID_MASK,
        },
        FrameKind::Continuation => Frame::Continuation {
            stream_id: header.stream_id,
            fragment: payload.to_vec(),
            end_headers: header.is_end_headers(),
        },
        FrameKind::PushPromise | FrameKind::Ping | FrameKind::GoAway => Frame::Unsupported {
            kind,
            stream_id: header.stream_id,
            flags: header.flags,
            length: header.length,
        },
    };

    Ok(Some((frame, length)))
}

/// Decode one whole frame from the start of `buf`.
///
/// Returns the frame and the total bytes consumed (header included), or
/// `Ok(None)` if more bytes are needed.
pub fn decode_frame(buf: &[u8], max_frame_size: u32) -> Result<Option<(Frame, usize)>, FrameError> {
    let Some(header) = decode_frame_header(buf) else {
        return Ok(None);
    };
    Ok(decode_payload(&header, &buf[FRAME_HEADER_LEN..], max_frame_size)?
        .map(|(frame, used)| (frame, FRAME_HEADER_LEN + used)))
}

fn decode_data(header: &FrameHeader, payload: &[u8]) -> Result<Frame, FrameError> {
    let (data, pad_length) = if header.has_flag(flags::PADDED) {
        let (start, end, pad) = padded_bounds(FrameKind::Data, header, payload)?;
        (&payload[start..end], pad)
    } else {
        (payload, 0)
    };

    Ok(Frame::Data {
        stream_id: header.stream_id,
        data: data.to_vec(),
        pad_length,
        end_stream: header.is_end_stream(),
    })
}

fn decode_headers(header: &FrameHeader, payload: &[u8]) -> Result<Frame, FrameError> {
    let (mut start, end, pad_length) = if header.has_flag(flags::PADDED) {
        padded_bounds(FrameKind::Headers, header, payload)?
    } else {
        (0, payload.len(), 0)
    };

    let priority = if header.has_flag(flags::PRIORITY) {
        if end < start + 5 {
            return Err(FrameError::PriorityTooShort);
        }
        let priority = Priority::parse(&payload[start..start + 5]);
        start += 5;
        Some(priority)
    } else {
        None
    };

    Ok(Frame::Headers {
        stream_id: header.stream_id,
        fragment: payload[start..end].to_vec(),
        priority,
        pad_length,
        end_stream: header.is_end_stream(),
        end_headers: header.is_end_headers(),
    })
}

/// Bounds of the content inside a padded payload: `[1, length - pad)`.
fn padded_bounds(
    kind: FrameKind,
    header: &FrameHeader,
    payload: &[u8],
) -> Result<(usize, usize, u8), FrameError> {
    let Some(&pad_length) = payload.first() else {
        return Err(FrameError::InvalidPadding {
            kind,
            pad_length: 0,
            length: header.length,
        });
    };
    let pad = pad_length as usize;
    if pad >= payload.len() {
        return Err(FrameError::InvalidPadding {
            kind,
            pad_length,
            length: header.length,
        });
    }
    Ok((1, payload.len() - pad, pad_length))
}

fn decode_settings(payload: &[u8]) -> SettingsMap {
    payload
        .chunks_exact(6)
        .map(|entry| {
            let id = u16::from_be_bytes([entry[0], entry[1]]);
            let value = u32::from_be_bytes([entry[2], entry[3], entry[4], entry[5]]);
            (id, value)
        })
        .collect()
}

fn read_u32(data: &[u8]) -> u32 {
    u32::from_be_bytes([data[0], data[1], data[2], data[3]])
}

// ============================================================================
// Encoding
// ============================================================================

/// Pack a 9-byte frame header. The reserved stream id bit is always cleared.
pub fn encode_frame_header(length: u32, frame_type: u8, flags: u8, stream_id: u32) -> [u8; FRAME_HEADER_LEN] {
    let len = length.to_be_bytes();
    let id = (stream_id & STREAM_ID_MASK).to_be_bytes();
    [len[1], len[2], len[3], frame_type, flags, id[0], id[1], id[2], id[3]]
}

fn encode_frame(frame_type: u8, flags: u8, stream_id: u32, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.extend_from_slice(&encode_frame_header(payload.len() as u32, frame_type, flags, stream_id));
    frame.extend_from_slice(payload);
    frame
}

/// Compress `headers` and wrap the block in a single HEADERS frame.
pub fn encode_headers_frame(
    stream_id: u32,
    headers: &HeaderMap,
    flags: u8,
    compressor: &mut impl HeaderCompression,
) -> Vec<u8> {
    let block = compressor.compress(headers);
    encode_frame(frame_type::HEADERS, flags, stream_id, &block)
}

/// Compress `headers` into a HEADERS frame followed by as many CONTINUATION
/// frames as `max_frame_size` requires. END_HEADERS is set on the last one.
pub fn encode_header_block(
    stream_id: u32,
    headers: &HeaderMap,
    end_stream: bool,
    max_frame_size: u32,
    compressor: &mut impl HeaderCompression,
) -> Vec<u8> {
    let block = compressor.compress(headers);
    let max = max_frame_size.clamp(1, MAX_FRAME_LENGTH) as usize;
    let stream_flag = if end_stream { flags::END_STREAM } else { 0 };

    if block.len() <= max {
        return encode_frame(
            frame_type::HEADERS,
            stream_flag | flags::END_HEADERS,
            stream_id,
            &block,
        );
    }

    let mut out = Vec::with_capacity(block.len() + FRAME_HEADER_LEN * (block.len() / max + 1));
    let mut chunks = block.chunks(max).peekable();
    if let Some(first) = chunks.next() {
        out.extend_from_slice(&encode_frame(frame_type::HEADERS, stream_flag, stream_id, first));
    }
    while let Some(chunk) = chunks.next() {
        let end_headers = chunks.peek().is_none();
        out.extend_from_slice(&encode_continuation_frame(stream_id, chunk, end_headers));
    }
    out
}

/// Create a CONTINUATION frame to continue a header block
pub fn encode_continuation_frame(stream_id: u32, fragment: &[u8], end_headers: bool) -> Vec<u8> {
    let flags_byte = if end_headers { flags::END_HEADERS } else { 0 };
    encode_frame(frame_type::CONTINUATION, flags_byte, stream_id, fragment)
}

pub fn encode_data_frame(stream_id: u32, data: &[u8], flags: u8) -> Vec<u8> {
    encode_frame(frame_type::DATA, flags, stream_id, data)
}

/// Split `body` into DATA frames of at most `max_frame_size` bytes (never more
/// than the 24-bit length field can carry), appending
/// them to `out`. Only the last frame carries END_STREAM. An empty body still
/// produces one empty DATA frame so the stream ends.
pub fn encode_body(stream_id: u32, body: &[u8], max_frame_size: u32, out: &mut Vec<u8>) -> usize {
    if body.is_empty() {
        out.extend_from_slice(&encode_data_frame(stream_id, &[], flags::END_STREAM));
        return 1;
    }

    let chunk_size = max_frame_size.clamp(1, MAX_FRAME_LENGTH) as usize;
    let count = body.len().div_ceil(chunk_size);
    for (i, chunk) in body.chunks(chunk_size).enumerate() {
        let flags_byte = if i + 1 == count { flags::END_STREAM } else { 0 };
        out.extend_from_slice(&encode_data_frame(stream_id, chunk, flags_byte));
    }
    count
}

pub fn encode_settings_frame(settings: &SettingsMap) -> Vec<u8> {
    let mut payload = Vec::with_capacity(settings.len() * 6);
    for (&id, &value) in settings {
        payload.extend_from_slice(&id.to_be_bytes());
        payload.extend_from_slice(&value.to_be_bytes());
    }
    encode_frame(frame_type::SETTINGS, 0, 0, &payload)
}

pub fn encode_settings_ack() -> Vec<u8> {
    encode_frame(frame_type::SETTINGS, flags::ACK, 0, &[])
}

pub fn encode_rst_stream(stream_id: u32, error_code: ErrorCode) -> Vec<u8> {
    encode_frame(frame_type::RST_STREAM, 0, stream_id, &(error_code as u32).to_be_bytes())
}

/// stream_id=0 updates the connection-level window, otherwise stream-level
pub fn encode_window_update(stream_id: u32, increment: u32) -> Vec<u8> {
    encode_frame(
        frame_type::WINDOW_UPDATE,
        0,
        stream_id,
        &(increment & STREAM_ID_MASK).to_be_bytes(),
    )
}
