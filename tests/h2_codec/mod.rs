//! Integration tests for the HTTP/2 frame codec and stream state machine

mod error_handling;
