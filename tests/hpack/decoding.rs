//! Tests for HPACK decoding

use h2_frame_server::{HeaderCompression, HeaderMap, Hpack, HpackDecoder};

#[test]
fn test_decode_indexed_header() {
    let mut decoder = HpackDecoder::new();

    // 0x82 = indexed header, index 2 = :method: GET
    let headers = decoder.decode(&[0x82]).unwrap();

    assert_eq!(headers.len(), 1);
    assert_eq!(headers.get(":method"), Some("GET"));
}

#[test]
fn test_decode_multiple_indexed_headers() {
    let mut decoder = HpackDecoder::new();

    // 0x82 = :method: GET, 0x86 = :scheme: http, 0x84 = :path: /
    let headers = decoder.decode(&[0x82, 0x86, 0x84]).unwrap();

    let pairs: Vec<_> = headers.iter().collect();
    assert_eq!(pairs, [(":method", "GET"), (":scheme", "http"), (":path", "/")]);
}

#[test]
fn test_decode_literal_with_indexing() {
    let mut decoder = HpackDecoder::new();

    let data = [
        0x40, // Literal with indexing, new name
        0x06, // Name length: 6
        b'c', b'u', b's', b't', b'o', b'm',
        0x05, // Value length: 5
        b'v', b'a', b'l', b'u', b'e',
    ];

    let headers = decoder.decode(&data).unwrap();
    assert_eq!(headers.len(), 1);
    assert_eq!(headers.get("custom"), Some("value"));

    // Now in the dynamic table at index 62.
    let again = decoder.decode(&[0xbe]).unwrap();
    assert_eq!(again.get("custom"), Some("value"));
}

#[test]
fn test_decode_literal_indexed_name() {
    let mut decoder = HpackDecoder::new();

    let data = [
        0x41, // Literal with indexing, name index 1 (:authority)
        0x0B, // Value length: 11
        b'e', b'x', b'a', b'm', b'p', b'l', b'e', b'.', b'c', b'o', b'm',
    ];

    let headers = decoder.decode(&data).unwrap();
    assert_eq!(headers.get(":authority"), Some("example.com"));
}

#[test]
fn test_decode_repeated_name_last_wins() {
    let mut decoder = HpackDecoder::new();

    let data = [
        0x00, 0x01, b'a', 0x01, b'1', // literal without indexing, new name
        0x00, 0x01, b'a', 0x01, b'2',
    ];

    let headers = decoder.decode(&data).unwrap();
    assert_eq!(headers.len(), 1);
    assert_eq!(headers.get("a"), Some("2"));
}

#[test]
fn test_decode_empty_block() {
    let mut decoder = HpackDecoder::new();
    assert_eq!(decoder.decode(&[]).unwrap(), HeaderMap::new());
}

#[test]
fn test_decode_invalid_index_is_error() {
    let mut hpack = Hpack::new();
    let err = hpack.decompress(&[0xfe]).unwrap_err();
    assert!(err.to_string().starts_with("HPACK decode error"));
}

#[test]
fn test_decode_truncated_literal_is_error() {
    let mut decoder = HpackDecoder::new();
    // Value length 5, only 2 bytes follow.
    assert!(decoder.decode(&[0x41, 0x05, b'a', b'b']).is_err());
}
