//! Tests for HPACK encoding

use h2_frame_server::{HeaderCompression, HeaderMap, Hpack, HpackDecoder, HpackEncoder};
use proptest::prelude::*;

fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
    pairs.iter().copied().collect()
}

#[test]
fn test_encode_decode_roundtrip() {
    let mut encoder = HpackEncoder::new();
    let mut decoder = HpackDecoder::new();
    let original = headers(&[(":status", "200"), ("content-type", "application/json")]);

    let encoded = encoder.encode(&original);
    assert_eq!(decoder.decode(&encoded).unwrap(), original);
}

#[test]
fn test_encode_indexed_header() {
    let mut encoder = HpackEncoder::new();
    // :method GET is static table entry 2.
    assert_eq!(encoder.encode(&headers(&[(":method", "GET")])), [0x82]);
}

#[test]
fn test_encode_empty_map() {
    let mut encoder = HpackEncoder::new();
    assert!(encoder.encode(&HeaderMap::new()).is_empty());
}

#[test]
fn test_encoder_and_decoder_share_dynamic_table_order() {
    let mut server = Hpack::new();
    let mut client = Hpack::new();

    let blocks = [
        headers(&[(":status", "200"), ("x-trace", "one")]),
        headers(&[(":status", "404"), ("x-trace", "two")]),
        headers(&[(":status", "200"), ("x-trace", "one")]),
    ];
    for block in &blocks {
        let encoded = server.compress(block);
        assert_eq!(&client.decompress(&encoded).unwrap(), block);
    }
}

#[test]
fn test_debug_does_not_dump_tables() {
    let hpack = Hpack::new();
    let text = format!("{hpack:?}");
    assert!(text.contains("HpackEncoder"));
    assert!(text.contains("HpackDecoder"));
}

proptest! {
    #[test]
    fn prop_roundtrip_arbitrary_headers(
        pairs in proptest::collection::btree_map("[a-z][a-z0-9-]{0,15}", "[ -~]{0,40}", 0..8),
    ) {
        let original: HeaderMap = pairs.into_iter().collect();
        let mut server = Hpack::new();
        let mut client = Hpack::new();

        let first = server.compress(&original);
        prop_assert_eq!(client.decompress(&first).unwrap(), original.clone());
        let second = server.compress(&original);
        prop_assert_eq!(client.decompress(&second).unwrap(), original);
    }
}
