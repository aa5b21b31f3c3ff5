//! h2-frame-server: a sans-I/O HTTP/2 server framing layer
//!
//! Turns the bytes of one HTTP/2 connection into complete requests, hands them
//! to a [`Router`], and turns the responses back into frames. The transport is
//! yours: feed received bytes in, drain bytes to write out.
//!
//! # Features
//!
//! - **Sans-I/O Design**: No sockets, no async runtime
//! - **Frame Codec**: DATA, HEADERS, PRIORITY, RST_STREAM, SETTINGS,
//!   WINDOW_UPDATE and CONTINUATION; PUSH_PROMISE, PING and GOAWAY are skipped
//! - **Handshake**: Client preface, initial SETTINGS exchange and ACK
//! - **Stream State**: Header blocks assembled across CONTINUATION frames,
//!   bodies across DATA frames, one response per stream
//! - **HPACK Support**: Header compression via fluke-hpack
//! - **Routing**: Handlers by method and path, static files under a prefix
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use h2_frame_server::{Connection, Response, Router, CONNECTION_PREFACE};
//!
//! let router = Router::new().get("/ping", |_| Ok(Response::text("pong")));
//! let mut conn = Connection::new(Arc::new(router));
//!
//! // Server SETTINGS are queued as soon as the connection exists.
//! let settings = conn.take_pending_send();
//! assert_eq!(settings.len(), 9);
//!
//! // Client preface followed by an empty SETTINGS frame.
//! conn.on_data(CONNECTION_PREFACE);
//! conn.on_data(&[0, 0, 0, 4, 0, 0, 0, 0, 0]);
//!
//! // GET /ping on stream 1: HEADERS with END_STREAM | END_HEADERS.
//! let ping = [0x82, 0x86, 0x04, 0x05, b'/', b'p', b'i', b'n', b'g'];
//! let mut frame = vec![0, 0, ping.len() as u8, 1, 0x05, 0, 0, 0, 1];
//! frame.extend_from_slice(&ping);
//! conn.on_data(&frame);
//!
//! // SETTINGS ACK, then the response HEADERS and DATA frames.
//! let out = conn.take_pending_send();
//! assert!(out.ends_with(b"pong"));
//! ```
//!
//! # Architecture
//!
//! - [`frame`]: stateless encode/decode of frames
//! - [`stream`]: per-stream request accumulation and lifecycle
//! - [`connection`]: handshake, dispatch loop, response writer
//! - [`hpack`]: the [`HeaderCompression`] service
//! - [`router`]: requests to responses
//!
//! It does NOT provide:
//! - TCP/TLS transport (you provide the bytes)
//! - Flow-control enforcement, server push, PING or GOAWAY handling

pub mod connection;
pub mod error;
pub mod frame;
pub mod headers;
pub mod hpack;
pub mod router;
pub mod settings;
pub mod stream;

pub use connection::{http_date, Connection, ConnectionState, ServerConfig};
pub use error::{CompressionError, ErrorCode, FrameError, RouteError, StreamError};
pub use frame::{
    decode_frame, decode_frame_header, decode_payload, encode_body, encode_continuation_frame,
    encode_data_frame, encode_frame_header, encode_header_block, encode_headers_frame,
    encode_rst_stream, encode_settings_ack, encode_settings_frame, encode_window_update, flags,
    frame_type, is_connection_preface, Frame, FrameHeader, FrameKind, Priority, CONNECTION_PREFACE,
    FRAME_HEADER_LEN,
};
pub use headers::HeaderMap;
pub use hpack::{HeaderCompression, Hpack, HpackDecoder, HpackEncoder};
pub use router::{Handler, Method, Request, Response, Router};
pub use settings::{settings_id, Settings, SettingsMap};
pub use stream::{Stream, StreamState, MAX_HEADER_BLOCK_SIZE};
