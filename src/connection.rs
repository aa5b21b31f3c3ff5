//! Server-side HTTP/2 connection: handshake, dispatch loop and responses.
//!
//! Sans-I/O. Feed received bytes with [`Connection::on_data`], drain bytes to
//! write with [`Connection::take_pending_send`]. Processing is synchronous and
//! runs until the receive buffer holds no complete frame.
//!
//! Faults never escape as errors. A bad frame is logged and skipped (and its
//! stream reset when it names one); a broken handshake abandons the
//! connection.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::{Buf, BytesMut};
use chrono::{DateTime, Utc};
use tracing::{debug, info, trace, warn};

use crate::error::{ErrorCode, FrameError, StreamError};
use crate::frame::{
    self, decode_frame_header, decode_payload, encode_body, encode_header_block, encode_rst_stream,
    encode_settings_ack, encode_settings_frame, flags, Frame, FrameHeader, CONNECTION_PREFACE,
    FRAME_HEADER_LEN,
};
use crate::headers::HeaderMap;
use crate::hpack::Hpack;
use crate::router::{Request, Response, Router};
use crate::settings::Settings;
use crate::stream::{Stream, StreamState, MAX_HEADER_BLOCK_SIZE};

/// Per-connection configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Advertised in the server's first SETTINGS frame. Its `max_frame_size`
    /// bounds inbound frames.
    pub local_settings: Settings,
    /// Cap on one stream's accumulated HEADERS + CONTINUATION bytes.
    pub max_header_block_size: usize,
    /// Require new stream ids to be odd and increasing.
    pub enforce_stream_id_order: bool,
    /// Source of the `date` response header.
    pub clock: fn() -> DateTime<Utc>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            local_settings: Settings::default(),
            max_header_block_size: MAX_HEADER_BLOCK_SIZE,
            enforce_stream_id_order: true,
            clock: Utc::now,
        }
    }
}

impl ServerConfig {
    pub fn with_local_settings(mut self, settings: Settings) -> Self {
        self.local_settings = settings;
        self
    }

    pub fn with_max_header_block_size(mut self, size: usize) -> Self {
        self.max_header_block_size = size;
        self
    }

    pub fn with_stream_id_order(mut self, enforce: bool) -> Self {
        self.enforce_stream_id_order = enforce;
        self
    }

    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }
}

/// Handshake progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    AwaitingPreface,
    AwaitingInitialSettings,
    Dispatching,
    /// Handshake failed or [`Connection::abandon`] was called. Input is ignored.
    Abandoned,
}

/// Inbound bytes not yet decoded. Consumed from the front in O(1).
#[derive(Debug, Default)]
struct RecvBuffer {
    buf: BytesMut,
}

impl RecvBuffer {
    fn append(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    fn data(&self) -> &[u8] {
        &self.buf[..]
    }

    fn len(&self) -> usize {
        self.buf.len()
    }

    fn consume(&mut self, n: usize) {
        let n = n.min(self.buf.len());
        self.buf.advance(n);
    }

    fn clear(&mut self) {
        self.buf.clear();
    }
}

/// One HTTP/2 connection, server side.
pub struct Connection {
    state: ConnectionState,
    config: ServerConfig,
    router: Arc<Router>,
    /// Settings announced by the peer, merged over the defaults.
    settings: Settings,
    preface_received: bool,
    settings_received: bool,
    recv_buf: RecvBuffer,
    send_buf: Vec<u8>,
    streams: BTreeMap<u32, Stream>,
    hpack: Hpack,
    /// Stream whose header block is open. Only its CONTINUATION may follow.
    continuation_stream: Option<u32>,
    /// Highest client stream id accepted so far.
    last_stream_id: u32,
    /// Payload bytes of a rejected frame still to be dropped.
    discard: usize,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state)
            .field("settings", &self.settings)
            .field("streams", &self.streams.len())
            .field("buffered", &self.recv_buf.len())
            .field("pending_send", &self.send_buf.len())
            .finish()
    }
}

impl Connection {
    pub fn new(router: Arc<Router>) -> Self {
        Self::with_config(router, ServerConfig::default())
    }

    /// Create a connection and queue the server's initial SETTINGS frame.
    pub fn with_config(router: Arc<Router>, config: ServerConfig) -> Self {
        let send_buf = encode_settings_frame(&config.local_settings.to_map());
        Self {
            state: ConnectionState::AwaitingPreface,
            config,
            router,
            settings: Settings::default(),
            preface_received: false,
            settings_received: false,
            recv_buf: RecvBuffer::default(),
            send_buf,
            streams: BTreeMap::new(),
            hpack: Hpack::new(),
            continuation_stream: None,
            last_stream_id: 0,
            discard: 0,
        }
    }

    /// Feed bytes received from the transport and process every complete frame.
    pub fn on_data(&mut self, data: &[u8]) {
        if self.state == ConnectionState::Abandoned {
            trace!(bytes = data.len(), "ignoring input on abandoned connection");
            return;
        }
        self.recv_buf.append(data);

        loop {
            let progressed = match self.state {
                ConnectionState::AwaitingPreface => self.read_preface(),
                ConnectionState::AwaitingInitialSettings => self.read_initial_settings(),
                ConnectionState::Dispatching => self.dispatch_next(),
                ConnectionState::Abandoned => false,
            };
            if !progressed {
                break;
            }
        }
    }

    /// Take all bytes queued for the transport, in write order.
    pub fn take_pending_send(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.send_buf)
    }

    pub fn has_pending_send(&self) -> bool {
        !self.send_buf.is_empty()
    }

    /// Drop all buffered input and streams and stop processing.
    pub fn abandon(&mut self) {
        warn!(
            streams = self.streams.len(),
            buffered = self.recv_buf.len(),
            "abandoning connection"
        );
        self.state = ConnectionState::Abandoned;
        self.recv_buf.clear();
        self.streams.clear();
        self.continuation_stream = None;
        self.discard = 0;
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_abandoned(&self) -> bool {
        self.state == ConnectionState::Abandoned
    }

    pub fn preface_received(&self) -> bool {
        self.preface_received
    }

    pub fn settings_received(&self) -> bool {
        self.settings_received
    }

    /// The peer's settings as negotiated so far.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn local_settings(&self) -> &Settings {
        &self.config.local_settings
    }

    pub fn stream(&self, stream_id: u32) -> Option<&Stream> {
        self.streams.get(&stream_id)
    }

    pub fn streams(&self) -> impl Iterator<Item = &Stream> {
        self.streams.values()
    }

    /// Bytes received but not yet decoded.
    pub fn buffered(&self) -> usize {
        self.recv_buf.len()
    }

    // -- Handshake --

    fn read_preface(&mut self) -> bool {
        let data = self.recv_buf.data();
        if data.len() < CONNECTION_PREFACE.len() {
            return false;
        }
        if !frame::is_connection_preface(data) {
            warn!("invalid connection preface");
            self.abandon();
            return false;
        }

        self.recv_buf.consume(CONNECTION_PREFACE.len());
        self.preface_received = true;
        self.state = ConnectionState::AwaitingInitialSettings;
        info!("connection preface received");
        true
    }

    fn read_initial_settings(&mut self) -> bool {
        let Some(header) = decode_frame_header(self.recv_buf.data()) else {
            return false;
        };
        if header.frame_type != frame::frame_type::SETTINGS || header.has_flag(flags::ACK) {
            warn!(
                frame_type = header.frame_type,
                flags = header.flags,
                "expected initial SETTINGS frame"
            );
            self.abandon();
            return false;
        }

        let decoded = decode_payload(
            &header,
            &self.recv_buf.data()[FRAME_HEADER_LEN..],
            self.config.local_settings.max_frame_size,
        );
        match decoded {
            Ok(None) => false,
            Ok(Some((Frame::Settings { settings, .. }, used))) => {
                self.recv_buf.consume(FRAME_HEADER_LEN + used);
                self.settings.merge(&settings);
                self.settings_received = true;
                self.send_buf.extend_from_slice(&encode_settings_ack());
                self.state = ConnectionState::Dispatching;
                info!(
                    max_frame_size = self.settings.max_frame_size,
                    initial_window_size = self.settings.initial_window_size,
                    "initial SETTINGS received"
                );
                true
            }
            Ok(Some((other, _))) => {
                warn!(kind = ?other.kind(), "expected initial SETTINGS frame");
                self.abandon();
                false
            }
            Err(e) => {
                warn!(error = %e, "malformed initial SETTINGS frame");
                self.abandon();
                false
            }
        }
    }

    // -- Dispatch loop --

    fn dispatch_next(&mut self) -> bool {
        if self.discard > 0 {
            let n = self.discard.min(self.recv_buf.len());
            self.recv_buf.consume(n);
            self.discard -= n;
            return n > 0;
        }

        let Some(header) = decode_frame_header(self.recv_buf.data()) else {
            return false;
        };
        let decoded = decode_payload(
            &header,
            &self.recv_buf.data()[FRAME_HEADER_LEN..],
            self.config.local_settings.max_frame_size,
        );
        match decoded {
            Ok(None) => false,
            Ok(Some((frame, used))) => {
                self.recv_buf.consume(FRAME_HEADER_LEN + used);
                self.handle_frame(frame);
                true
            }
            Err(e) => {
                self.reject_frame(&header, e);
                true
            }
        }
    }

    /// Skip a malformed frame: drop its header now and its payload as it arrives.
    fn reject_frame(&mut self, header: &FrameHeader, error: FrameError) {
        warn!(
            stream_id = header.stream_id,
            frame_type = header.frame_type,
            length = header.length,
            error = %error,
            "dropping malformed frame"
        );
        self.recv_buf.consume(FRAME_HEADER_LEN);
        self.discard = header.length as usize;

        // A malformed HEADERS still uses up its stream id.
        if header.frame_type == frame::frame_type::HEADERS
            && header.stream_id % 2 == 1
            && !self.streams.contains_key(&header.stream_id)
        {
            self.last_stream_id = self.last_stream_id.max(header.stream_id);
        }
        if header.stream_id != 0 && !matches!(error, FrameError::UnknownType(_)) {
            self.reset_stream(header.stream_id, error.code());
        }
    }

    fn handle_frame(&mut self, frame: Frame) {
        debug!(stream_id = frame.stream_id(), kind = ?frame.kind(), "frame received");

        if let Some(open) = self.continuation_stream {
            let continues = matches!(&frame, Frame::Continuation { stream_id, .. } if *stream_id == open);
            if !continues {
                warn!(stream_id = open, "header block interrupted by another frame");
                self.continuation_stream = None;
                self.reset_stream(open, ErrorCode::ProtocolError);
            }
        }

        match frame {
            Frame::Data {
                stream_id,
                data,
                end_stream,
                ..
            } => {
                let Some(stream) = self.streams.get_mut(&stream_id) else {
                    self.reject_unknown_stream(stream_id, StreamError::DataBeforeHeaders(stream_id));
                    return;
                };
                let frame_flags = if end_stream { flags::END_STREAM } else { 0 };
                let result = stream.on_data(frame_flags, &data);
                self.after_stream_update(stream_id, result);
            }
            Frame::Headers {
                stream_id,
                fragment,
                priority,
                end_stream,
                end_headers,
                ..
            } => {
                let accepted = self
                    .streams
                    .get(&stream_id)
                    .is_some_and(|s| s.state() != StreamState::Idle)
                    || self.accept_stream_id(stream_id);
                let max_block = self.config.max_header_block_size;
                let stream = self
                    .streams
                    .entry(stream_id)
                    .or_insert_with(|| Stream::new(stream_id));
                if !accepted {
                    stream.refuse();
                }
                if let Some(priority) = priority {
                    stream.on_priority(priority);
                }

                let mut frame_flags = 0;
                if end_stream {
                    frame_flags |= flags::END_STREAM;
                }
                if end_headers {
                    frame_flags |= flags::END_HEADERS;
                }
                let result = stream.on_headers(frame_flags, &fragment, max_block, &mut self.hpack);
                if result.is_ok() && !end_headers {
                    self.continuation_stream = Some(stream_id);
                }
                self.after_stream_update(stream_id, result);
            }
            Frame::Continuation {
                stream_id,
                fragment,
                end_headers,
            } => {
                let max_block = self.config.max_header_block_size;
                let frame_flags = if end_headers { flags::END_HEADERS } else { 0 };
                let Some(stream) = self.streams.get_mut(&stream_id) else {
                    self.reject_unknown_stream(stream_id, StreamError::UnexpectedContinuation(stream_id));
                    return;
                };
                let result = stream.on_continuation(frame_flags, &fragment, max_block, &mut self.hpack);
                if end_headers || result.is_err() {
                    self.continuation_stream = None;
                }
                self.after_stream_update(stream_id, result);
            }
            Frame::Priority { stream_id, priority } => match self.streams.get_mut(&stream_id) {
                Some(stream) => stream.on_priority(priority),
                None => trace!(stream_id, "PRIORITY for idle stream ignored"),
            },
            Frame::RstStream {
                stream_id,
                error_code,
            } => {
                info!(stream_id, ?error_code, "stream reset by peer");
                if let Some(stream) = self.streams.get_mut(&stream_id) {
                    stream.on_reset(error_code);
                }
                if self.continuation_stream == Some(stream_id) {
                    self.continuation_stream = None;
                }
            }
            Frame::Settings { ack: true, .. } => {
                debug!("peer acknowledged SETTINGS");
            }
            Frame::Settings {
                ack: false,
                settings,
            } => {
                self.settings.merge(&settings);
                self.send_buf.extend_from_slice(&encode_settings_ack());
                debug!(entries = settings.len(), "SETTINGS updated");
            }
            Frame::WindowUpdate {
                stream_id,
                increment,
            } => {
                trace!(stream_id, increment, "WINDOW_UPDATE ignored");
            }
            Frame::Unsupported {
                kind,
                stream_id,
                length,
                ..
            } => {
                debug!(?kind, stream_id, length, "skipping unsupported frame");
            }
        }
    }

    /// A stream frame naming an id with no stream. Answered with RST_STREAM;
    /// no table entry is created.
    fn reject_unknown_stream(&mut self, stream_id: u32, error: StreamError) {
        warn!(stream_id, error = %error, "frame for unknown stream");
        self.reset_stream(stream_id, error.code());
    }

    /// Client streams must be odd and strictly increasing.
    fn accept_stream_id(&mut self, stream_id: u32) -> bool {
        let valid = stream_id % 2 == 1 && stream_id > self.last_stream_id;
        if valid || !self.config.enforce_stream_id_order {
            self.last_stream_id = self.last_stream_id.max(stream_id);
            return true;
        }
        warn!(
            stream_id,
            last_stream_id = self.last_stream_id,
            "refusing stream with invalid id"
        );
        false
    }

    fn after_stream_update(&mut self, stream_id: u32, result: Result<(), StreamError>) {
        match result {
            Ok(()) => {}
            Err(StreamError::Closed(_)) => {
                debug!(stream_id, "frame for closed stream ignored");
                return;
            }
            Err(e @ StreamError::Compression { .. }) => {
                warn!(stream_id, error = %e, "header block could not be decoded");
                let refused = self.streams.get(&stream_id).is_some_and(Stream::is_refused);
                if refused {
                    self.reset_stream(stream_id, ErrorCode::ProtocolError);
                } else {
                    self.write_response(stream_id, Response::bad_request());
                    self.close_stream(stream_id);
                }
                return;
            }
            Err(e) => {
                warn!(stream_id, error = %e, "stream fault");
                self.reset_stream(stream_id, e.code());
                return;
            }
        }

        let Some(stream) = self.streams.get(&stream_id) else {
            return;
        };
        if stream.is_refused() {
            if !stream.is_receiving_headers() {
                self.reset_stream(stream_id, ErrorCode::ProtocolError);
            }
            return;
        }
        if !stream.needs_response() {
            return;
        }

        let request = Request::new(stream.headers().clone(), stream.body().to_vec());
        debug!(
            stream_id,
            method = request.method(),
            path = request.path(),
            body = request.body.len(),
            "request complete"
        );
        let response = self.router.respond(&request);
        self.write_response(stream_id, response);
        self.close_stream(stream_id);
    }

    /// Queue RST_STREAM and close the stream. No-op for a stream already
    /// closed. Ids without a stream get the frame but no table entry.
    fn reset_stream(&mut self, stream_id: u32, code: ErrorCode) {
        if let Some(stream) = self.streams.get_mut(&stream_id) {
            if stream.state() == StreamState::Closed {
                return;
            }
            stream.close();
        }
        self.send_buf.extend_from_slice(&encode_rst_stream(stream_id, code));
    }

    fn close_stream(&mut self, stream_id: u32) {
        if let Some(stream) = self.streams.get_mut(&stream_id) {
            stream.close();
        }
    }

    /// HEADERS (END_HEADERS) then DATA frames sized to the peer's
    /// max_frame_size, the last one with END_STREAM.
    fn write_response(&mut self, stream_id: u32, response: Response) {
        let Response { headers, body } = response;
        let status = headers.get(":status").unwrap_or("200").to_string();

        let mut out = HeaderMap::new();
        out.insert(":status", status.as_str());
        for (name, value) in headers.iter().filter(|(name, _)| *name != ":status") {
            out.insert(name.to_ascii_lowercase(), value);
        }
        if !out.contains("content-length") {
            out.insert("content-length", body.len().to_string());
        }
        out.insert("date", http_date((self.config.clock)()));

        let max_frame_size = self.settings.max_frame_size;
        let header_frames = encode_header_block(stream_id, &out, false, max_frame_size, &mut self.hpack);
        self.send_buf.extend_from_slice(&header_frames);
        let data_frames = encode_body(stream_id, &body, max_frame_size, &mut self.send_buf);

        info!(
            stream_id,
            status = status.as_str(),
            body = body.len(),
            data_frames,
            "response written"
        );
    }
}

/// IMF-fixdate, as used by the `date` header.
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
