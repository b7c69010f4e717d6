//! State machine tests for `WsClient` over a scripted transport.

mod harness;

use std::cell::Cell;
use std::rc::Rc;

use harness::{
    MockTransport, Recorded, RecordingHandler, SWITCHING_PROTOCOLS, new_client, open_client,
    server_bytes,
};
use uws::protocol::{Frame, OpCode, compute_accept_key};
use uws::{
    Config, ConnectionState, Error, IoOpenResult, IoSendResult, Limits, MessageType, OpenError,
    OptionValue, SendCallback, SendFrameResult, SendId, TRANSPORT_OPTIONS, TransportEvent,
    WsClient, WsError,
};

fn logging_callback(mock: &MockTransport, tag: &str) -> Option<SendCallback> {
    let mock = mock.clone();
    let tag = tag.to_string();
    Some(Box::new(move |result: SendFrameResult| {
        mock.log(format!("{tag} {result:?}"));
    }))
}

fn start_open(client: &mut WsClient) -> RecordingHandler {
    let handler = RecordingHandler::new();
    client.open_async(Box::new(handler.clone())).unwrap();
    handler
}

fn close_codes(frames: &[Frame]) -> Vec<u16> {
    frames
        .iter()
        .filter(|frame| frame.opcode == OpCode::Close)
        .map(|frame| u16::from_be_bytes([frame.payload()[0], frame.payload()[1]]))
        .collect()
}

// ============================================================================
// Opening
// ============================================================================

#[test]
fn test_upgrade_request_contents() {
    let mock = MockTransport::new();
    let mut client = WsClient::create_with_io(
        Box::new(mock.clone()),
        "example.com",
        8080,
        "/chat?room=1",
        &["chat", "superchat"],
    )
    .unwrap();
    client.set_request_header("Authorization", "Bearer abc").unwrap();
    let _handler = start_open(&mut client);

    assert_eq!(client.state(), ConnectionState::WaitingForUpgradeResponse);
    let request = mock.upgrade_request().unwrap();
    assert!(request.starts_with("GET /chat?room=1 HTTP/1.1\r\n"));
    assert!(request.contains("Host: example.com:8080\r\n"));
    assert!(request.contains("Upgrade: websocket\r\n"));
    assert!(request.contains("Connection: Upgrade\r\n"));
    assert!(request.contains("Sec-WebSocket-Version: 13\r\n"));
    assert!(request.contains("Sec-WebSocket-Protocol: chat, superchat\r\n"));
    assert!(request.contains("Authorization: Bearer abc\r\n"));
    assert!(request.ends_with("\r\n\r\n"));

    let key = request
        .lines()
        .find_map(|line| line.strip_prefix("Sec-WebSocket-Key: "))
        .unwrap();
    assert_eq!(key.len(), 24);
}

#[test]
fn test_nonce_differs_between_opens() {
    let (mut client, mock) = new_client(Config::new());
    let _handler = start_open(&mut client);
    let first = mock.upgrade_request().unwrap();
    client.close_async(None).unwrap();
    mock.clear_sent();

    let _handler = start_open(&mut client);
    let second = mock.upgrade_request().unwrap();
    assert_ne!(first, second);
}

#[test]
fn test_switching_protocols_opens() {
    let (mut client, mock) = new_client(Config::new());
    let handler = start_open(&mut client);
    assert!(handler.is_empty());

    mock.deliver(SWITCHING_PROTOCOLS);
    client.dowork();
    assert_eq!(client.state(), ConnectionState::Open);
    assert_eq!(handler.take(), [Recorded::Open(Ok(()))]);
    assert_eq!(client.upgrade_response().map(|r| r.status), Some(101));
}

#[test]
fn test_forbidden_status_fails_and_closes() {
    let (mut client, mock) = new_client(Config::new());
    let handler = start_open(&mut client);

    mock.deliver(b"HTTP/1.1 403 \r\n\r\n");
    client.dowork();
    assert_eq!(handler.take(), [Recorded::Open(Err(OpenError::BadResponseStatus))]);
    assert_eq!(client.state(), ConnectionState::NotOpen);
    assert_eq!(mock.closes(), 1);
}

#[test]
fn test_response_split_across_reads() {
    let (mut client, mock) = new_client(Config::new());
    let handler = start_open(&mut client);

    let (head, tail) = SWITCHING_PROTOCOLS.split_at(17);
    mock.deliver(head);
    client.dowork();
    assert_eq!(client.state(), ConnectionState::WaitingForUpgradeResponse);
    assert!(handler.is_empty());

    mock.deliver(tail);
    client.dowork();
    assert_eq!(handler.take(), [Recorded::Open(Ok(()))]);
}

#[test]
fn test_frame_in_same_read_as_response() {
    let (mut client, mock) = new_client(Config::new());
    let handler = start_open(&mut client);

    let mut bytes = SWITCHING_PROTOCOLS.to_vec();
    bytes.extend_from_slice(&[0x82, 0x01, 0x42]);
    mock.deliver(&bytes);
    client.dowork();
    assert_eq!(
        handler.take(),
        [
            Recorded::Open(Ok(())),
            Recorded::Message(MessageType::Binary, vec![0x42]),
        ]
    );
}

#[test]
fn test_malformed_response() {
    let (mut client, mock) = new_client(Config::new());
    let handler = start_open(&mut client);

    mock.deliver(b"SSH-2.0-OpenSSH\r\n\r\n");
    client.dowork();
    assert_eq!(handler.take(), [Recorded::Open(Err(OpenError::BadUpgradeResponse))]);
    assert_eq!(mock.closes(), 1);
}

#[test]
fn test_oversized_response() {
    let limits = Limits {
        max_handshake_size: 16,
        ..Limits::default()
    };
    let (mut client, mock) = new_client(Config::new().with_limits(limits));
    let handler = start_open(&mut client);

    mock.deliver(b"HTTP/1.1 101 Switching Protocols\r\n");
    client.dowork();
    assert_eq!(handler.take(), [Recorded::Open(Err(OpenError::BadUpgradeResponse))]);
}

#[test]
fn test_accept_key_verification() {
    let config = Config::new().with_verify_accept_key(true);

    let (mut client, mock) = new_client(config.clone());
    let handler = start_open(&mut client);
    mock.deliver(SWITCHING_PROTOCOLS);
    client.dowork();
    assert_eq!(handler.take(), [Recorded::Open(Err(OpenError::BadUpgradeResponse))]);

    let (mut client, mock) = new_client(config);
    let handler = start_open(&mut client);
    let request = mock.upgrade_request().unwrap();
    let key = request
        .lines()
        .find_map(|line| line.strip_prefix("Sec-WebSocket-Key: "))
        .unwrap();
    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\nSec-WebSocket-Accept: {}\r\n\r\n",
        compute_accept_key(key)
    );
    mock.deliver(response.as_bytes());
    client.dowork();
    assert_eq!(handler.take(), [Recorded::Open(Ok(()))]);
}

#[test]
fn test_selected_protocol() {
    let mock = MockTransport::new();
    let mut client =
        WsClient::create_with_io(Box::new(mock.clone()), "h", 80, "/", &["chat"]).unwrap();
    let _handler = start_open(&mut client);
    mock.deliver(b"HTTP/1.1 101 OK\r\nSec-WebSocket-Protocol: chat\r\n\r\n");
    client.dowork();
    assert_eq!(client.selected_protocol(), Some("chat"));
}

#[test]
fn test_transport_open_failures() {
    let cases = [
        (IoOpenResult::Error, OpenError::UnderlyingIoOpenFailed),
        (IoOpenResult::Cancelled, OpenError::UnderlyingIoOpenCancelled),
    ];
    for (result, expected) in cases {
        let (mut client, mock) = new_client(Config::new());
        mock.configure(|state| state.open_result = Some(result));
        let handler = start_open(&mut client);
        assert_eq!(handler.take(), [Recorded::Open(Err(expected))]);
        assert_eq!(client.state(), ConnectionState::NotOpen);
        assert_eq!(mock.closes(), 0);
    }
}

#[test]
fn test_open_refused_synchronously() {
    let (mut client, mock) = new_client(Config::new());
    mock.configure(|state| state.fail_open = true);
    let handler = RecordingHandler::new();
    assert!(matches!(
        client.open_async(Box::new(handler.clone())),
        Err(Error::Transport(_))
    ));
    assert_eq!(client.state(), ConnectionState::NotOpen);
    assert!(handler.is_empty());
}

#[test]
fn test_open_twice_rejected() {
    let (mut client, _mock) = new_client(Config::new());
    let _handler = start_open(&mut client);
    assert!(matches!(
        client.open_async(Box::new(RecordingHandler::new())),
        Err(Error::InvalidState {
            state: ConnectionState::WaitingForUpgradeResponse,
            ..
        })
    ));
}

#[test]
fn test_upgrade_request_send_failure() {
    let (mut client, mock) = new_client(Config::new());
    mock.configure(|state| state.fail_send = true);
    let handler = start_open(&mut client);
    assert_eq!(
        handler.take(),
        [Recorded::Open(Err(OpenError::CannotSendUpgradeRequest))]
    );
    assert_eq!(mock.closes(), 1);
}

#[test]
fn test_bytes_before_transport_open() {
    let (mut client, mock) = new_client(Config::new());
    mock.configure(|state| state.open_result = None);
    let handler = start_open(&mut client);
    assert_eq!(client.state(), ConnectionState::OpeningUnderlyingIo);

    mock.deliver(b"early");
    client.dowork();
    assert_eq!(
        handler.take(),
        [Recorded::Open(Err(OpenError::BytesReceivedBeforeUnderlyingOpen))]
    );
    assert_eq!(mock.closes(), 1);
}

#[test]
fn test_empty_read_while_waiting() {
    let (mut client, mock) = new_client(Config::new());
    let handler = start_open(&mut client);
    mock.deliver(b"");
    client.dowork();
    assert_eq!(
        handler.take(),
        [Recorded::Open(Err(OpenError::InvalidBytesReceivedArguments))]
    );
}

#[test]
fn test_duplicate_open_completion() {
    let (mut client, mock) = new_client(Config::new());
    let handler = start_open(&mut client);
    mock.push(TransportEvent::OpenComplete(IoOpenResult::Ok));
    client.dowork();
    assert_eq!(
        handler.take(),
        [Recorded::Open(Err(OpenError::MultipleUnderlyingIoOpenEvents))]
    );
    assert_eq!(mock.closes(), 1);

    let (mut client, mock, handler) = open_client(Config::new());
    mock.push(TransportEvent::OpenComplete(IoOpenResult::Ok));
    client.dowork();
    assert_eq!(
        handler.take(),
        [Recorded::Error(WsError::MultipleUnderlyingIoOpenEvents)]
    );
    assert_eq!(client.state(), ConnectionState::Open);
}

#[test]
fn test_transport_error_while_opening() {
    let (mut client, mock) = new_client(Config::new());
    mock.configure(|state| state.open_result = None);
    let handler = start_open(&mut client);
    mock.push(TransportEvent::Error);
    client.dowork();
    assert_eq!(handler.take(), [Recorded::Open(Err(OpenError::UnderlyingIoError))]);
    assert_eq!(mock.closes(), 0);

    let (mut client, mock) = new_client(Config::new());
    let handler = start_open(&mut client);
    mock.push(TransportEvent::Error);
    client.dowork();
    assert_eq!(handler.take(), [Recorded::Open(Err(OpenError::UnderlyingIoError))]);
    assert_eq!(mock.closes(), 1);
}

#[test]
fn test_response_buffer_limit() {
    let limits = Limits {
        max_buffer_size: 8,
        ..Limits::default()
    };
    let (mut client, mock) = new_client(Config::new().with_limits(limits));
    let handler = start_open(&mut client);
    mock.deliver(SWITCHING_PROTOCOLS);
    client.dowork();
    assert_eq!(handler.take(), [Recorded::Open(Err(OpenError::NotEnoughMemory))]);
}

// ============================================================================
// Receiving
// ============================================================================

#[test]
fn test_single_binary_frame() {
    let (mut client, mock, handler) = open_client(Config::new());
    mock.deliver(&[0x82, 0x01, 0x42]);
    client.dowork();
    assert_eq!(handler.take(), [Recorded::Message(MessageType::Binary, vec![0x42])]);
}

#[test]
fn test_fragmented_message_with_interleaved_ping() {
    let (mut client, mock, handler) = open_client(Config::new());
    let mut bytes = server_bytes(&Frame::new(false, OpCode::Text, b"Hel".to_vec()));
    bytes.extend(server_bytes(&Frame::ping(b"p".to_vec())));
    bytes.extend(server_bytes(&Frame::new(false, OpCode::Continuation, b"lo".to_vec())));
    bytes.extend(server_bytes(&Frame::new(true, OpCode::Continuation, b"!".to_vec())));
    mock.deliver(&bytes);
    client.dowork();

    assert_eq!(
        handler.take(),
        [Recorded::Message(MessageType::Text, b"Hello!".to_vec())]
    );
    let frames = mock.sent_frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].opcode, OpCode::Pong);
    assert_eq!(frames[0].payload(), b"p");
}

#[test]
fn test_every_ping_gets_one_pong() {
    let (mut client, mock, handler) = open_client(Config::new());
    for payload in [&b""[..], b"a", b"bc"] {
        mock.deliver(&server_bytes(&Frame::ping(payload.to_vec())));
    }
    mock.deliver(&server_bytes(&Frame::pong(b"ignored".to_vec())));
    client.dowork();

    assert!(handler.is_empty());
    let payloads: Vec<Vec<u8>> = mock
        .sent_frames()
        .iter()
        .map(|frame| {
            assert_eq!(frame.opcode, OpCode::Pong);
            frame.payload().to_vec()
        })
        .collect();
    assert_eq!(payloads, [b"".to_vec(), b"a".to_vec(), b"bc".to_vec()]);
}

#[test]
fn test_interleaved_messages_rejected() {
    let (mut client, mock, handler) = open_client(Config::new());
    let mut bytes = server_bytes(&Frame::new(false, OpCode::Binary, b"a".to_vec()));
    bytes.extend(server_bytes(&Frame::new(true, OpCode::Text, b"b".to_vec())));
    mock.deliver(&bytes);
    client.dowork();

    assert_eq!(handler.take(), [Recorded::Error(WsError::BadFrameReceived)]);
    assert_eq!(close_codes(&mock.sent_frames()), [1002]);
}

#[test]
fn test_masked_server_frame_rejected() {
    let (mut client, mock, handler) = open_client(Config::new());
    mock.deliver(&Frame::binary(b"x".to_vec()).encode(Some([1, 2, 3, 4])));
    client.dowork();

    assert_eq!(handler.take(), [Recorded::Error(WsError::BadFrameReceived)]);
    assert_eq!(close_codes(&mock.sent_frames()), [1002]);
    assert_eq!(client.state(), ConnectionState::Open);
    assert_eq!(
        client.send_frame_async(OpCode::Binary, b"late", true, None),
        Err(Error::CloseAlreadySent)
    );
    assert!(client.close_async(None).is_ok());
}

#[test]
fn test_non_minimal_length_rejected() {
    let (mut client, mock, handler) = open_client(Config::new());
    mock.deliver(&[0x82, 126, 0x00, 0x05, 1, 2, 3, 4, 5]);
    client.dowork();
    assert_eq!(handler.take(), [Recorded::Error(WsError::BadFrameReceived)]);
    assert_eq!(close_codes(&mock.sent_frames()), [1002]);
}

#[test]
fn test_violation_sends_only_one_close() {
    let (mut client, mock, handler) = open_client(Config::new());
    mock.deliver(&[0x82, 126, 0x00, 0x05]);
    client.dowork();
    mock.deliver(&[0x90, 0x00]);
    client.dowork();

    assert_eq!(
        handler.take(),
        [
            Recorded::Error(WsError::BadFrameReceived),
            Recorded::Error(WsError::BadFrameReceived),
        ]
    );
    assert_eq!(close_codes(&mock.sent_frames()), [1002]);
}

#[test]
fn test_oversized_frame_closes_with_1009() {
    let limits = Limits {
        max_frame_size: 16,
        ..Limits::default()
    };
    let (mut client, mock, handler) = open_client(Config::new().with_limits(limits));
    mock.deliver(&server_bytes(&Frame::binary(vec![0; 17])));
    client.dowork();
    assert_eq!(handler.take(), [Recorded::Error(WsError::BadFrameReceived)]);
    assert_eq!(close_codes(&mock.sent_frames()), [1009]);
}

#[test]
fn test_invalid_text_closes_with_1007() {
    let (mut client, mock, handler) = open_client(Config::new().with_validate_utf8(true));
    mock.deliver(&server_bytes(&Frame::text(vec![0xFF, 0xFE])));
    client.dowork();
    assert_eq!(handler.take(), [Recorded::Error(WsError::BadFrameReceived)]);
    assert_eq!(close_codes(&mock.sent_frames()), [1007]);
}

#[test]
fn test_receive_buffer_limit() {
    let limits = Limits {
        max_buffer_size: 64,
        ..Limits::default()
    };
    let (mut client, mock, handler) = open_client(Config::new().with_limits(limits));
    mock.deliver(&[0u8; 100]);
    client.dowork();
    assert_eq!(handler.take(), [Recorded::Error(WsError::NotEnoughMemory)]);
    assert_eq!(client.state(), ConnectionState::Open);
}

#[test]
fn test_transport_error_while_open() {
    let (mut client, mock, handler) = open_client(Config::new());
    mock.push(TransportEvent::Error);
    client.dowork();
    assert_eq!(handler.take(), [Recorded::Error(WsError::UnderlyingIoError)]);
}

// ============================================================================
// Sending
// ============================================================================

#[test]
fn test_send_frame_and_completion() {
    let (mut client, mock, _handler) = open_client(Config::new());
    client
        .send_frame_async(OpCode::Text, b"hello", true, logging_callback(&mock, "a"))
        .unwrap();
    client
        .send_frame_async(OpCode::Binary, b"", true, logging_callback(&mock, "b"))
        .unwrap();
    assert_eq!(client.pending_sends(), 2);

    let frames = mock.sent_frames();
    assert_eq!(frames[0].opcode, OpCode::Text);
    assert_eq!(frames[0].payload(), b"hello");
    assert!(frames[1].payload().is_empty());

    let ids = mock.sent_ids();
    let (first, second) = (ids[0].unwrap(), ids[1].unwrap());
    mock.push(TransportEvent::SendComplete(second, IoSendResult::Error));
    mock.push(TransportEvent::SendComplete(first, IoSendResult::Ok));
    client.dowork();

    assert_eq!(client.pending_sends(), 0);
    assert_eq!(mock.log_entries(), ["open", "b Error", "a Ok"]);
}

#[test]
fn test_fragmented_send() {
    let (mut client, mock, _handler) = open_client(Config::new());
    client.send_frame_async(OpCode::Text, b"ab", false, None).unwrap();
    client.send_frame_async(OpCode::Continuation, b"cd", true, None).unwrap();

    let frames = mock.sent_frames();
    assert!(!frames[0].fin);
    assert_eq!(frames[1].opcode, OpCode::Continuation);
    assert!(frames[1].fin);
}

#[test]
fn test_send_argument_checks() {
    let (mut client, _mock, _handler) = open_client(Config::new());
    let invalid = [
        (OpCode::Close, vec![], true),
        (OpCode::Ping, vec![], false),
        (OpCode::Ping, vec![0; 126], true),
        (OpCode::Pong, vec![0; 200], true),
    ];
    for (opcode, payload, is_final) in invalid {
        assert!(matches!(
            client.send_frame_async(opcode, &payload, is_final, None),
            Err(Error::InvalidArgument(_))
        ));
    }
    assert!(client.send_frame_async(OpCode::Ping, &[0; 125], true, None).is_ok());
}

#[test]
fn test_send_refused_by_transport() {
    let (mut client, mock, _handler) = open_client(Config::new());
    mock.configure(|state| state.fail_send = true);
    let result = client.send_frame_async(OpCode::Binary, b"x", true, logging_callback(&mock, "x"));
    assert!(matches!(result, Err(Error::Transport(_))));
    assert_eq!(client.pending_sends(), 0);
    assert_eq!(mock.log_entries(), ["open"]);
}

#[test]
fn test_unknown_send_completion() {
    let (mut client, mock, handler) = open_client(Config::new());
    mock.push(TransportEvent::SendComplete(SendId(999), IoSendResult::Ok));
    client.dowork();
    assert_eq!(
        handler.take(),
        [Recorded::Error(WsError::CannotRemoveSentItemFromList)]
    );
}

#[test]
fn test_synchronous_send_completion() {
    let (mut client, mock, _handler) = open_client(Config::new());
    mock.configure(|state| state.complete_sends = true);
    client
        .send_frame_async(OpCode::Binary, b"x", true, logging_callback(&mock, "sync"))
        .unwrap();
    assert_eq!(mock.log_entries(), ["open", "sync Ok"]);
}

// ============================================================================
// Closing
// ============================================================================

#[test]
fn test_close_async_cancels_pending_in_order() {
    let (mut client, mock, _handler) = open_client(Config::new());
    for tag in ["1", "2", "3"] {
        client
            .send_frame_async(OpCode::Binary, tag.as_bytes(), true, logging_callback(&mock, tag))
            .unwrap();
    }
    let closed = mock.clone();
    client
        .close_async(Some(Box::new(move || closed.log("closed"))))
        .unwrap();

    assert_eq!(
        mock.log_entries(),
        ["open", "1 Cancelled", "2 Cancelled", "3 Cancelled", "close", "closed"]
    );
    assert_eq!(client.state(), ConnectionState::NotOpen);
}

#[test]
fn test_close_async_waits_for_transport() {
    let (mut client, mock, _handler) = open_client(Config::new());
    mock.configure(|state| state.complete_close = false);
    let calls = Rc::new(Cell::new(0));
    let counter = Rc::clone(&calls);
    client
        .close_async(Some(Box::new(move || counter.set(counter.get() + 1))))
        .unwrap();
    assert_eq!(client.state(), ConnectionState::ClosingUnderlyingIo);
    assert_eq!(calls.get(), 0);

    mock.push(TransportEvent::CloseComplete);
    client.dowork();
    assert_eq!(client.state(), ConnectionState::NotOpen);
    assert_eq!(calls.get(), 1);
}

#[test]
fn test_late_cancel_from_transport_after_close_async() {
    let (mut client, mock, handler) = open_client(Config::new());
    mock.configure(|state| state.complete_close = false);
    client
        .send_frame_async(OpCode::Binary, b"queued", true, logging_callback(&mock, "queued"))
        .unwrap();
    let id = mock.sent_ids().last().copied().flatten().unwrap();

    client.close_async(None).unwrap();
    mock.push(TransportEvent::SendComplete(id, IoSendResult::Cancelled));
    mock.push(TransportEvent::CloseComplete);
    client.dowork();

    assert_eq!(mock.log_entries(), ["open", "queued Cancelled", "close"]);
    assert!(handler.is_empty());
    assert_eq!(client.state(), ConnectionState::NotOpen);
}

#[test]
fn test_close_async_during_open_cancels_it() {
    let (mut client, mock) = new_client(Config::new());
    mock.configure(|state| state.open_result = None);
    let handler = start_open(&mut client);
    client.close_async(None).unwrap();
    assert_eq!(handler.take(), [Recorded::Open(Err(OpenError::Cancelled))]);
    assert_eq!(client.state(), ConnectionState::NotOpen);
    assert_eq!(mock.closes(), 1);
}

#[test]
fn test_close_async_refused_by_transport() {
    let (mut client, mock, _handler) = open_client(Config::new());
    mock.configure(|state| state.fail_close = true);
    assert!(matches!(client.close_async(None), Err(Error::Transport(_))));
    assert_eq!(client.state(), ConnectionState::NotOpen);
}

#[test]
fn test_close_async_invalid_states() {
    let (mut client, _mock) = new_client(Config::new());
    assert!(matches!(client.close_async(None), Err(Error::InvalidState { .. })));

    let (mut client, mock, _handler) = open_client(Config::new());
    mock.configure(|state| state.complete_close = false);
    client.close_async(None).unwrap();
    assert!(matches!(
        client.close_async(None),
        Err(Error::InvalidState {
            state: ConnectionState::ClosingUnderlyingIo,
            ..
        })
    ));
}

#[test]
fn test_peer_initiated_close() {
    let (mut client, mock, handler) = open_client(Config::new());
    mock.deliver(&[0x88, 0x02, 0x03, 0xEA]);
    client.dowork();

    assert_eq!(handler.take(), [Recorded::PeerClosed(Some(1002), Vec::new())]);
    assert_eq!(close_codes(&mock.sent_frames()), [1002]);
    assert_eq!(client.state(), ConnectionState::ClosingUnderlyingIo);
    assert_eq!(mock.closes(), 0);

    let reply = mock.sent_ids().last().copied().flatten().unwrap();
    mock.push(TransportEvent::SendComplete(reply, IoSendResult::Ok));
    client.dowork();
    assert_eq!(mock.closes(), 1);
    assert_eq!(client.state(), ConnectionState::NotOpen);
    assert!(handler.is_empty());
}

#[test]
fn test_peer_close_without_code() {
    let (mut client, mock, handler) = open_client(Config::new());
    mock.deliver(&[0x88, 0x00]);
    client.dowork();
    assert_eq!(handler.take(), [Recorded::PeerClosed(None, Vec::new())]);
    let frames = mock.sent_frames();
    assert_eq!(frames.len(), 1);
    assert!(frames[0].payload().is_empty());
}

#[test]
fn test_reserved_close_code_passes_through() {
    let (mut client, mock, handler) = open_client(Config::new());
    mock.deliver(&server_bytes(&Frame::close(Some(1005), b"")));
    client.dowork();
    assert_eq!(handler.take(), [Recorded::PeerClosed(Some(1005), Vec::new())]);
    assert_eq!(close_codes(&mock.sent_frames()), [1005]);
}

#[test]
fn test_close_handshake() {
    let (mut client, mock, handler) = open_client(Config::new());
    let calls = Rc::new(Cell::new(0));
    let counter = Rc::clone(&calls);
    client
        .close_handshake_async(1000, b"bye", Some(Box::new(move || counter.set(counter.get() + 1))))
        .unwrap();

    assert_eq!(client.state(), ConnectionState::ClosingWaitingForCloseFrame);
    let frames = mock.sent_frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].payload(), [0x03, 0xE8, b'b', b'y', b'e']);
    assert!(matches!(
        client.send_frame_async(OpCode::Binary, b"x", true, None),
        Err(Error::InvalidState { .. })
    ));

    let mut bytes = server_bytes(&Frame::binary(b"still".to_vec()));
    bytes.extend(server_bytes(&Frame::close(Some(1000), b"")));
    mock.deliver(&bytes);
    client.dowork();

    assert_eq!(
        handler.take(),
        [
            Recorded::Message(MessageType::Binary, b"still".to_vec()),
            Recorded::PeerClosed(Some(1000), Vec::new()),
        ]
    );
    assert_eq!(mock.sent_frames().len(), 1);
    assert_eq!(mock.closes(), 1);
    assert_eq!(client.state(), ConnectionState::NotOpen);
    assert_eq!(calls.get(), 1);
}

#[test]
fn test_close_handshake_argument_checks() {
    let (mut client, _mock, _handler) = open_client(Config::new());
    assert!(matches!(
        client.close_handshake_async(1000, &[b'x'; 124], None),
        Err(Error::InvalidArgument(_))
    ));
    client.close_handshake_async(1000, &[b'x'; 123], None).unwrap();
    assert!(client.close_handshake_async(1000, b"", None).is_err());

    let (mut client, mock, _handler) = open_client(Config::new());
    mock.deliver(&[0x82, 126, 0x00, 0x05]);
    client.dowork();
    assert_eq!(
        client.close_handshake_async(1000, b"", None),
        Err(Error::CloseAlreadySent)
    );
}

#[test]
fn test_close_reason_with_invalid_utf8() {
    let (mut client, mock, handler) = open_client(Config::new());
    mock.deliver(&server_bytes(&Frame::close(Some(1000), &[0xFF])));
    client.dowork();
    assert_eq!(handler.take(), [Recorded::Error(WsError::BadFrameReceived)]);
    assert!(mock.sent_frames().is_empty());
    assert_eq!(mock.closes(), 1);
    assert_eq!(client.state(), ConnectionState::NotOpen);
}

#[test]
fn test_one_byte_close_payload() {
    let (mut client, mock, handler) = open_client(Config::new());
    mock.deliver(&[0x88, 0x01, 0x03]);
    client.dowork();
    assert_eq!(handler.take(), [Recorded::Error(WsError::BadFrameReceived)]);
    assert_eq!(close_codes(&mock.sent_frames()), [1002]);
}

#[test]
fn test_reopen_after_close() {
    let (mut client, mock, _handler) = open_client(Config::new());
    client.close_async(None).unwrap();
    assert_eq!(client.state(), ConnectionState::NotOpen);

    let handler = start_open(&mut client);
    mock.deliver(SWITCHING_PROTOCOLS);
    client.dowork();
    assert_eq!(handler.take(), [Recorded::Open(Ok(()))]);
    assert_eq!(mock.opens(), 2);
}

#[test]
fn test_drop_closes_and_cancels() {
    let (mut client, mock, _handler) = open_client(Config::new());
    client
        .send_frame_async(OpCode::Binary, b"x", true, logging_callback(&mock, "x"))
        .unwrap();
    client.destroy();
    assert_eq!(mock.log_entries(), ["open", "x Cancelled", "close"]);
}

#[test]
fn test_drop_when_not_open_leaves_transport_alone() {
    let (client, mock) = new_client(Config::new());
    drop(client);
    assert_eq!(mock.closes(), 0);
}

// ============================================================================
// Options
// ============================================================================

#[test]
fn test_options_forward_and_replay() {
    let (mut client, mock) = new_client(Config::new());
    client.set_option("nodelay", &OptionValue::Bool(true)).unwrap();
    assert!(matches!(
        client.set_option("unknown_flag", &OptionValue::Bool(true)),
        Err(Error::UnknownOption(_))
    ));
    assert_eq!(mock.with(|state| state.options.len()), 1);

    let snapshot = client.retrieve_options().unwrap();
    let transport = snapshot
        .get(TRANSPORT_OPTIONS)
        .and_then(OptionValue::as_options)
        .unwrap();
    assert_eq!(transport.get("nodelay"), Some(&OptionValue::Bool(true)));

    let (mut other, other_mock) = new_client(Config::new());
    snapshot.feed_options(&mut other).unwrap();
    assert_eq!(
        other_mock.with(|state| state.options.clone()),
        [("nodelay".to_string(), OptionValue::Bool(true))]
    );

    let copy = WsClient::clone_option(TRANSPORT_OPTIONS, snapshot.get(TRANSPORT_OPTIONS).unwrap())
        .unwrap();
    WsClient::destroy_option(TRANSPORT_OPTIONS, copy);
}
