//! Tests for request assembly and response writing

use h2_frame_server::{
    encode_data_frame, flags, frame_type, settings_id, Frame, StreamState,
};

use super::{frame, settings_frame, test_router, Client, FIXED_DATE};

#[test]
fn test_get_ping() {
    let mut client = Client::connect(test_router());
    client.request(1, "GET", "/ping", b"");

    let frames = client.frames();
    assert_eq!(frames.len(), 2);
    assert!(matches!(
        frames[0],
        Frame::Headers { stream_id: 1, end_headers: true, end_stream: false, .. }
    ));

    let replies = client.collect(&frames);
    let reply = &replies[&1];
    let pairs: Vec<_> = reply.headers.iter().collect();
    assert_eq!(
        pairs,
        [
            (":status", "200"),
            ("content-type", "text/plain; charset=utf-8"),
            ("content-length", "4"),
            ("date", FIXED_DATE),
        ]
    );
    assert_eq!(reply.body, b"pong");
    assert!(reply.ended);
    assert_eq!(client.conn.stream(1).unwrap().state(), StreamState::Closed);
}

#[test]
fn test_post_body_across_data_frames() {
    let mut client = Client::connect(test_router());
    let block = client.header_block("POST", "/echo");
    client.send(&frame(frame_type::HEADERS, flags::END_HEADERS, 1, &block));
    client.send(&encode_data_frame(1, b"hello ", 0));
    assert!(!client.conn.has_pending_send());
    client.send(&encode_data_frame(1, b"world", flags::END_STREAM));

    let replies = client.replies();
    let reply = &replies[&1];
    assert_eq!(reply.status(), Some("200"));
    assert_eq!(reply.headers.get("content-type"), Some("application/octet-stream"));
    assert_eq!(reply.headers.get("content-length"), Some("11"));
    assert_eq!(reply.body, b"hello world");
}

#[test]
fn test_padded_data_padding_not_in_body() {
    let mut client = Client::connect(test_router());
    let block = client.header_block("POST", "/echo");
    client.send(&frame(frame_type::HEADERS, flags::END_HEADERS, 1, &block));
    client.send(&frame(
        frame_type::DATA,
        flags::PADDED | flags::END_STREAM,
        1,
        &[4, b'a', b'b', 0, 0, 0, 0],
    ));

    assert_eq!(client.replies()[&1].body, b"ab");
}

#[test]
fn test_padded_headers_with_priority() {
    let mut client = Client::connect(test_router());
    let block = client.header_block("GET", "/ping");
    let mut payload = vec![2, 0, 0, 0, 0, 15];
    payload.extend_from_slice(&block);
    payload.extend_from_slice(&[0, 0]);
    client.send(&frame(
        frame_type::HEADERS,
        flags::PADDED | flags::PRIORITY | flags::END_HEADERS | flags::END_STREAM,
        1,
        &payload,
    ));

    assert_eq!(client.replies()[&1].body, b"pong");
    assert_eq!(client.conn.stream(1).unwrap().priority().map(|p| p.weight), Some(15));
}

#[test]
fn test_request_header_block_in_continuation() {
    let mut client = Client::connect(test_router());
    let block = client.header_block("GET", "/ping");
    let (head, tail) = block.split_at(2);

    client.send(&frame(frame_type::HEADERS, flags::END_STREAM, 1, head));
    assert!(client.conn.stream(1).unwrap().is_receiving_headers());
    assert!(!client.conn.has_pending_send());

    client.send(&frame(frame_type::CONTINUATION, flags::END_HEADERS, 1, tail));
    assert_eq!(client.replies()[&1].body, b"pong");
}

#[test]
fn test_status_codes() {
    let mut client = Client::connect(test_router());
    client.request(1, "GET", "/missing", b"");
    client.request(3, "PATCH", "/ping", b"");
    client.request(5, "GET", "/fail", b"");
    client.request(7, "GET", "/ping?verbose=1", b"");

    let replies = client.replies();
    assert_eq!(replies[&1].status(), Some("404"));
    assert_eq!(replies[&3].status(), Some("501"));
    assert_eq!(replies[&5].status(), Some("500"));
    assert_eq!(replies[&7].status(), Some("200"));
    assert!(replies.values().all(|r| r.ended));
}

#[test]
fn test_handler_headers_lowercased_and_kept() {
    let mut client = Client::connect(test_router());
    client.request(1, "GET", "/custom", b"");

    let replies = client.replies();
    let reply = &replies[&1];
    assert_eq!(reply.status(), Some("201"));
    assert_eq!(reply.headers.get("x-custom"), Some("yes"));
    assert_eq!(reply.headers.get("content-length"), Some("0"));
    assert!(reply.headers.iter().all(|(name, _)| name == name.to_ascii_lowercase()));
    assert_eq!(reply.data_frames, [0]);
}

#[test]
fn test_body_split_on_peer_max_frame_size() {
    let mut client = Client::connect(test_router());
    client.send(&settings_frame(&[(settings_id::MAX_FRAME_SIZE, 100)]));
    client.conn.take_pending_send();

    client.request(1, "GET", "/big", b"");
    let replies = client.replies();
    let reply = &replies[&1];
    assert_eq!(reply.data_frames, [100, 100, 50]);
    assert_eq!(reply.body.len(), 250);
    assert!(reply.ended);
}

#[test]
fn test_concurrent_streams_answered_on_completion() {
    let mut client = Client::connect(test_router());
    let block = client.header_block("POST", "/echo");
    client.send(&frame(frame_type::HEADERS, flags::END_HEADERS, 1, &block));

    client.request(3, "GET", "/ping", b"");
    let replies = client.replies();
    assert_eq!(replies.keys().copied().collect::<Vec<_>>(), [3]);

    client.send(&encode_data_frame(1, b"late", flags::END_STREAM));
    let replies = client.replies();
    assert_eq!(replies.keys().copied().collect::<Vec<_>>(), [1]);
    assert_eq!(replies[&1].body, b"late");
}

#[test]
fn test_response_written_once() {
    let mut client = Client::connect(test_router());
    client.request(1, "GET", "/ping", b"");
    assert_eq!(client.replies().len(), 1);

    client.send(&encode_data_frame(1, b"again", flags::END_STREAM));
    let block = client.header_block("GET", "/ping");
    client.send(&frame(
        frame_type::HEADERS,
        flags::END_HEADERS | flags::END_STREAM,
        1,
        &block,
    ));
    assert!(!client.conn.has_pending_send());
}

#[test]
fn test_peer_reset_cancels_response() {
    let mut client = Client::connect(test_router());
    let block = client.header_block("POST", "/echo");
    client.send(&frame(frame_type::HEADERS, flags::END_HEADERS, 1, &block));
    client.send(&frame(frame_type::RST_STREAM, 0, 1, &[0, 0, 0, 8]));
    client.send(&encode_data_frame(1, b"x", flags::END_STREAM));

    assert!(!client.conn.has_pending_send());
    let stream = client.conn.stream(1).unwrap();
    assert_eq!(stream.state(), StreamState::Closed);
    assert_eq!(stream.reset_code(), Some(h2_frame_server::ErrorCode::Cancel));
}
