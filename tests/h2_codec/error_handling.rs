//! Tests for frame validation errors

use h2_frame_server::{
    decode_frame, encode_frame_header, flags, frame_type, ErrorCode, FrameError, FrameKind,
};
use rstest::rstest;

const MAX: u32 = 16_384;

fn header_only(length: u32, ty: u8, fl: u8, stream_id: u32) -> Vec<u8> {
    encode_frame_header(length, ty, fl, stream_id).to_vec()
}

#[rstest]
#[case(frame_type::PRIORITY, FrameKind::Priority, 4, 5)]
#[case(frame_type::PRIORITY, FrameKind::Priority, 6, 5)]
#[case(frame_type::RST_STREAM, FrameKind::RstStream, 2, 4)]
#[case(frame_type::WINDOW_UPDATE, FrameKind::WindowUpdate, 5, 4)]
#[case(frame_type::PING, FrameKind::Ping, 4, 8)]
fn test_fixed_length_violation_is_immediate(
    #[case] ty: u8,
    #[case] kind: FrameKind,
    #[case] actual: u32,
    #[case] expected: u32,
) {
    // Only the 9 header bytes are present; the error does not wait for the payload.
    let err = decode_frame(&header_only(actual, ty, 0, 1), MAX).unwrap_err();
    assert_eq!(err, FrameError::InvalidLength { kind, expected, actual });
    assert_eq!(err.code(), ErrorCode::FrameSizeError);
}

#[rstest]
#[case(frame_type::GOAWAY, FrameKind::GoAway, 4, 8)]
#[case(frame_type::PUSH_PROMISE, FrameKind::PushPromise, 2, 4)]
fn test_skipped_frames_have_minimum_size(
    #[case] ty: u8,
    #[case] kind: FrameKind,
    #[case] actual: u32,
    #[case] min: u32,
) {
    let err = decode_frame(&header_only(actual, ty, 0, 1), MAX).unwrap_err();
    assert_eq!(err, FrameError::PayloadTooShort { kind, min, actual });
    assert_eq!(err.code(), ErrorCode::FrameSizeError);
}

#[test]
fn test_settings_length_not_multiple_of_six() {
    let err = decode_frame(&header_only(7, frame_type::SETTINGS, 0, 0), MAX).unwrap_err();
    assert_eq!(err, FrameError::SettingsLength(7));
}

#[test]
fn test_settings_ack_with_payload() {
    let err = decode_frame(&header_only(6, frame_type::SETTINGS, flags::ACK, 0), MAX).unwrap_err();
    assert_eq!(err, FrameError::SettingsAckWithPayload(6));
}

#[test]
fn test_settings_on_stream_is_rejected() {
    let err = decode_frame(&header_only(0, frame_type::SETTINGS, 0, 1), MAX).unwrap_err();
    assert_eq!(
        err,
        FrameError::StreamIdForbidden {
            kind: FrameKind::Settings,
            stream_id: 1,
        }
    );
    assert_eq!(err.code(), ErrorCode::ProtocolError);
}

#[rstest]
#[case(frame_type::DATA, FrameKind::Data)]
#[case(frame_type::HEADERS, FrameKind::Headers)]
#[case(frame_type::CONTINUATION, FrameKind::Continuation)]
fn test_stream_frames_require_stream_id(#[case] ty: u8, #[case] kind: FrameKind) {
    let err = decode_frame(&header_only(0, ty, 0, 0), MAX).unwrap_err();
    assert_eq!(err, FrameError::StreamIdRequired(kind));
}

#[test]
fn test_unknown_frame_type() {
    let err = decode_frame(&header_only(3, 0x42, 0, 1), MAX).unwrap_err();
    assert_eq!(err, FrameError::UnknownType(0x42));
    assert!(err.to_string().contains("0x42"));
}

#[test]
fn test_frame_larger_than_max() {
    let err = decode_frame(&header_only(MAX + 1, frame_type::DATA, 0, 1), MAX).unwrap_err();
    assert_eq!(
        err,
        FrameError::FrameTooLarge {
            length: MAX + 1,
            max: MAX,
        }
    );
}

#[test]
fn test_padding_equal_to_payload_is_invalid() {
    let mut buf = header_only(3, frame_type::DATA, flags::PADDED, 1);
    buf.extend_from_slice(&[3, 0, 0]);
    let err = decode_frame(&buf, MAX).unwrap_err();
    assert_eq!(
        err,
        FrameError::InvalidPadding {
            kind: FrameKind::Data,
            pad_length: 3,
            length: 3,
        }
    );
}

#[test]
fn test_padded_frame_without_pad_length_byte() {
    let buf = header_only(0, frame_type::HEADERS, flags::PADDED, 1);
    assert!(matches!(
        decode_frame(&buf, MAX),
        Err(FrameError::InvalidPadding { kind: FrameKind::Headers, .. })
    ));
}

#[test]
fn test_headers_priority_flag_without_room() {
    let mut buf = header_only(3, frame_type::HEADERS, flags::PRIORITY, 1);
    buf.extend_from_slice(&[0, 0, 0]);
    assert_eq!(decode_frame(&buf, MAX), Err(FrameError::PriorityTooShort));
}

#[test]
fn test_payload_errors_wait_for_payload() {
    // Padding can only be judged once the payload is here.
    let buf = header_only(3, frame_type::DATA, flags::PADDED, 1);
    assert_eq!(decode_frame(&buf, MAX), Ok(None));
}
