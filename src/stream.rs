//! Per-stream request accumulator and lifecycle (RFC 7540 Section 5.1).

use crate::error::{ErrorCode, StreamError};
use crate::frame::{flags, Priority};
use crate::headers::HeaderMap;
use crate::hpack::HeaderCompression;

/// Default cap on one stream's accumulated header block (256 KB).
pub const MAX_HEADER_BLOCK_SIZE: usize = 256 * 1024;

/// State of an HTTP/2 stream (RFC 7540 Section 5.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamState {
    #[default]
    Idle,
    ReservedLocal,
    ReservedRemote,
    Open,
    HalfClosedLocal,
    HalfClosedRemote,
    Closed,
}

/// One request/response exchange.
///
/// Header block fragments from HEADERS and CONTINUATION frames are buffered
/// until END_HEADERS, then decoded in one call to the compression service.
#[derive(Debug)]
pub struct Stream {
    id: u32,
    state: StreamState,
    headers: HeaderMap,
    body: Vec<u8>,
    end_headers: bool,
    end_stream: bool,
    /// Header block received so far, waiting for END_HEADERS.
    header_block: Vec<u8>,
    receiving_headers: bool,
    priority: Option<Priority>,
    reset_code: Option<ErrorCode>,
    /// Opened with an id the connection does not accept. Its header block is
    /// still decoded to keep HPACK state in sync, but it is never answered.
    refused: bool,
}

impl Stream {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            state: StreamState::Idle,
            headers: HeaderMap::new(),
            body: Vec::new(),
            end_headers: false,
            end_stream: false,
            header_block: Vec::new(),
            receiving_headers: false,
            priority: None,
            reset_code: None,
            refused: false,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn end_headers(&self) -> bool {
        self.end_headers
    }

    pub fn end_stream(&self) -> bool {
        self.end_stream
    }

    pub fn priority(&self) -> Option<Priority> {
        self.priority
    }

    /// Error code of the RST_STREAM that closed this stream, if any.
    pub fn reset_code(&self) -> Option<ErrorCode> {
        self.reset_code
    }

    /// Waiting for CONTINUATION frames to finish a header block.
    pub fn is_receiving_headers(&self) -> bool {
        self.receiving_headers
    }

    /// Headers and body are both complete.
    pub fn is_request_complete(&self) -> bool {
        self.end_headers && self.end_stream
    }

    /// Complete and not yet answered. The only gate for producing a response.
    pub fn needs_response(&self) -> bool {
        self.is_request_complete() && self.state != StreamState::Closed && !self.refused
    }

    pub fn refuse(&mut self) {
        self.refused = true;
    }

    pub fn is_refused(&self) -> bool {
        self.refused
    }

    /// A HEADERS frame carrying `fragment`.
    ///
    /// Rejected without touching the stream if the header block is already
    /// complete. END_STREAM and END_HEADERS are taken from `frame_flags` only.
    pub fn on_headers(
        &mut self,
        frame_flags: u8,
        fragment: &[u8],
        max_block_size: usize,
        compressor: &mut impl HeaderCompression,
    ) -> Result<(), StreamError> {
        if self.state == StreamState::Closed {
            return Err(StreamError::Closed(self.id));
        }
        if self.end_headers {
            return Err(StreamError::HeadersAfterEndHeaders(self.id));
        }
        if self.receiving_headers {
            return Err(StreamError::InterleavedHeaders(self.id));
        }
        self.check_block_size(fragment.len(), max_block_size)?;

        if self.state == StreamState::Idle {
            self.state = StreamState::Open;
        }
        self.header_block.extend_from_slice(fragment);
        self.receiving_headers = true;
        if frame_flags & flags::END_STREAM != 0 {
            self.mark_end_stream();
        }

        if frame_flags & flags::END_HEADERS != 0 {
            self.finish_header_block(compressor)?;
        }
        Ok(())
    }

    /// A CONTINUATION frame extending the open header block.
    pub fn on_continuation(
        &mut self,
        frame_flags: u8,
        fragment: &[u8],
        max_block_size: usize,
        compressor: &mut impl HeaderCompression,
    ) -> Result<(), StreamError> {
        if self.state == StreamState::Closed {
            return Err(StreamError::Closed(self.id));
        }
        if !self.receiving_headers {
            return Err(StreamError::UnexpectedContinuation(self.id));
        }
        self.check_block_size(fragment.len(), max_block_size)?;

        self.header_block.extend_from_slice(fragment);
        if frame_flags & flags::END_HEADERS != 0 {
            self.finish_header_block(compressor)?;
        }
        Ok(())
    }

    /// A DATA frame. Rejected once END_STREAM has been seen.
    pub fn on_data(&mut self, frame_flags: u8, data: &[u8]) -> Result<(), StreamError> {
        if self.state == StreamState::Closed {
            return Err(StreamError::Closed(self.id));
        }
        if self.end_stream {
            return Err(StreamError::DataAfterEndStream(self.id));
        }
        if self.state == StreamState::Idle {
            return Err(StreamError::DataBeforeHeaders(self.id));
        }

        self.body.extend_from_slice(data);
        if frame_flags & flags::END_STREAM != 0 {
            self.mark_end_stream();
        }
        Ok(())
    }

    /// PRIORITY does not affect the lifecycle; the value is kept for inspection.
    pub fn on_priority(&mut self, priority: Priority) {
        self.priority = Some(priority);
    }

    /// RST_STREAM from the peer closes the stream from any state.
    pub fn on_reset(&mut self, code: ErrorCode) {
        self.reset_code = Some(code);
        self.close();
    }

    /// The response has been fully written, or the stream was aborted.
    pub fn close(&mut self) {
        self.state = StreamState::Closed;
        self.receiving_headers = false;
        self.header_block = Vec::new();
    }

    fn mark_end_stream(&mut self) {
        self.end_stream = true;
        if self.state == StreamState::Open {
            self.state = StreamState::HalfClosedRemote;
        }
    }

    fn check_block_size(&self, additional: usize, max: usize) -> Result<(), StreamError> {
        let size = self.header_block.len() + additional;
        if size > max {
            return Err(StreamError::HeaderBlockTooLarge {
                stream_id: self.id,
                size,
                max,
            });
        }
        Ok(())
    }

    fn finish_header_block(&mut self, compressor: &mut impl HeaderCompression) -> Result<(), StreamError> {
        let block = std::mem::take(&mut self.header_block);
        self.receiving_headers = false;
        let decoded = compressor
            .decompress(&block)
            .map_err(|source| StreamError::Compression {
                stream_id: self.id,
                source,
            })?;
        self.headers.merge(decoded);
        self.end_headers = true;
        Ok(())
    }
}
