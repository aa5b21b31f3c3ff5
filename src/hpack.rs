//! HPACK: Header Compression for HTTP/2 (RFC 7541)
//!
//! Thin wrapper around `fluke-hpack`. The framing layer only sees the
//! [`HeaderCompression`] trait; the dynamic tables stay inside the wrapper.

use crate::error::CompressionError;
use crate::headers::HeaderMap;

/// Connection-scoped header compression service.
///
/// Both directions keep dynamic-table state across calls, so calls must be
/// made in frame order.
pub trait HeaderCompression {
    /// Encode a header map into a header block.
    fn compress(&mut self, headers: &HeaderMap) -> Vec<u8>;

    /// Decode a complete header block.
    fn decompress(&mut self, block: &[u8]) -> Result<HeaderMap, CompressionError>;
}

/// HPACK decoder for inbound header blocks.
/// Wraps `fluke_hpack::Decoder` which maintains dynamic table state per-connection.
pub struct HpackDecoder {
    inner: fluke_hpack::Decoder<'static>,
}

impl std::fmt::Debug for HpackDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HpackDecoder").finish()
    }
}

impl Default for HpackDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl HpackDecoder {
    pub fn new() -> Self {
        Self {
            inner: fluke_hpack::Decoder::new(),
        }
    }

    /// Decode a header block. Repeated names collapse, last value wins.
    pub fn decode(&mut self, data: &[u8]) -> Result<HeaderMap, CompressionError> {
        let pairs = self
            .inner
            .decode(data)
            .map_err(|e| CompressionError(format!("{e:?}")))?;
        Ok(pairs
            .into_iter()
            .map(|(name, value)| {
                (
                    String::from_utf8_lossy(&name).into_owned(),
                    String::from_utf8_lossy(&value).into_owned(),
                )
            })
            .collect())
    }
}

/// HPACK encoder for outbound header blocks.
/// Wraps `fluke_hpack::Encoder` which maintains dynamic table state per-connection.
pub struct HpackEncoder {
    inner: fluke_hpack::Encoder<'static>,
}

impl std::fmt::Debug for HpackEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HpackEncoder").finish()
    }
}

impl Default for HpackEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl HpackEncoder {
    pub fn new() -> Self {
        Self {
            inner: fluke_hpack::Encoder::new(),
        }
    }

    pub fn encode(&mut self, headers: &HeaderMap) -> Vec<u8> {
        let pairs: Vec<(&[u8], &[u8])> = headers
            .iter()
            .map(|(name, value)| (name.as_bytes(), value.as_bytes()))
            .collect();
        self.inner.encode(pairs)
    }
}

/// Encoder/decoder pair owned by one connection.
#[derive(Debug, Default)]
pub struct Hpack {
    encoder: HpackEncoder,
    decoder: HpackDecoder,
}

impl Hpack {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HeaderCompression for Hpack {
    fn compress(&mut self, headers: &HeaderMap) -> Vec<u8> {
        self.encoder.encode(headers)
    }

    fn decompress(&mut self, block: &[u8]) -> Result<HeaderMap, CompressionError> {
        self.decoder.decode(block)
    }
}
