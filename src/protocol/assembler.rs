//! Reassembly of fragmented data messages (RFC 6455 section 5.4).

use bytes::BytesMut;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::protocol::utf8::Utf8Validator;
use crate::protocol::{Frame, MessageType, OpCode};

/// Collects the frames of one data message at a time.
///
/// The first frame locks the message type; only continuation frames are
/// accepted until a frame with FIN set completes the message. Control
/// frames are not part of a message and pass through untouched.
#[derive(Debug)]
pub struct MessageAssembler {
    buffer: BytesMut,
    kind: Option<MessageType>,
    utf8_validator: Option<Utf8Validator>,
    config: Config,
}

impl MessageAssembler {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            buffer: BytesMut::new(),
            kind: None,
            utf8_validator: None,
            config,
        }
    }

    /// Add a frame to the message being assembled.
    ///
    /// Returns the message once a frame with FIN set completes it. Control
    /// frames always yield `None`.
    ///
    /// # Errors
    ///
    /// - `Error::ProtocolViolation` for a continuation with no message in
    ///   progress, or a new text/binary frame while one is in progress
    /// - `Error::MessageTooLarge` past the configured message limit
    /// - `Error::InvalidUtf8` for bad text when UTF-8 validation is enabled
    pub fn push(&mut self, frame: Frame) -> Result<Option<AssembledMessage>> {
        if frame.opcode.is_control() {
            return Ok(None);
        }

        match (frame.opcode, self.kind) {
            (OpCode::Continuation, None) => {
                return Err(Error::ProtocolViolation(
                    "Continuation frame without a message in progress".into(),
                ));
            }
            (OpCode::Continuation, Some(_)) => {}
            (_, Some(_)) => {
                return Err(Error::ProtocolViolation(
                    "New data frame while a fragmented message is in progress".into(),
                ));
            }
            (opcode, None) => {
                let kind = MessageType::from_opcode(opcode).ok_or_else(|| {
                    Error::ProtocolViolation(format!("{opcode} cannot start a message"))
                })?;
                self.kind = Some(kind);
                if kind == MessageType::Text && self.config.validate_utf8 {
                    self.utf8_validator = Some(Utf8Validator::new());
                }
            }
        }

        let new_size = self.buffer.len() + frame.payload().len();
        self.config.limits.check_message_size(new_size)?;

        if let Some(validator) = self.utf8_validator.as_mut() {
            validator.validate(frame.payload(), frame.fin)?;
        }

        if !frame.fin {
            self.buffer.extend_from_slice(frame.payload());
            return Ok(None);
        }

        let payload = if self.buffer.is_empty() {
            frame.into_payload()
        } else {
            self.buffer.extend_from_slice(frame.payload());
            self.buffer.split().to_vec()
        };
        let kind = self.kind.take().unwrap_or(MessageType::Binary);
        self.utf8_validator = None;
        Ok(Some(AssembledMessage { kind, payload }))
    }

    #[must_use]
    pub fn is_assembling(&self) -> bool {
        self.kind.is_some()
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.kind = None;
        self.utf8_validator = None;
    }
}

/// A fully assembled message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledMessage {
    pub kind: MessageType,
    pub payload: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Limits;

    fn small_limits_config() -> Config {
        Config::new().with_limits(Limits::new(1024, 100, 4096, 4096))
    }

    #[test]
    fn test_single_frame_message() {
        let mut assembler = MessageAssembler::new(Config::new());
        let msg = assembler.push(Frame::text(b"Hello".to_vec())).unwrap().unwrap();
        assert_eq!(msg.kind, MessageType::Text);
        assert_eq!(msg.payload, b"Hello");
        assert!(!assembler.is_assembling());
    }

    #[test]
    fn test_many_fragments() {
        let mut assembler = MessageAssembler::new(Config::new());

        let first = Frame::new(false, OpCode::Binary, vec![1, 2]);
        assert!(assembler.push(first).unwrap().is_none());
        assert!(assembler.is_assembling());
        for chunk in [vec![3, 4], vec![5, 6]] {
            let frame = Frame::new(false, OpCode::Continuation, chunk);
            assert!(assembler.push(frame).unwrap().is_none());
        }
        let msg = assembler
            .push(Frame::new(true, OpCode::Continuation, vec![7, 8]))
            .unwrap()
            .unwrap();

        assert_eq!(msg.kind, MessageType::Binary);
        assert_eq!(msg.payload, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert!(!assembler.is_assembling());
    }

    #[test]
    fn test_interleaved_control_frame() {
        let mut assembler = MessageAssembler::new(Config::new());

        let head = Frame::new(false, OpCode::Text, b"Hel".to_vec());
        assert!(assembler.push(head).unwrap().is_none());
        assert!(assembler.push(Frame::ping(b"ping".to_vec())).unwrap().is_none());
        assert!(assembler.is_assembling());

        let msg = assembler
            .push(Frame::new(true, OpCode::Continuation, b"lo".to_vec()))
            .unwrap()
            .unwrap();
        assert_eq!(msg.kind, MessageType::Text);
        assert_eq!(msg.payload, b"Hello");
    }

    #[test]
    fn test_unexpected_continuation() {
        let mut assembler = MessageAssembler::new(Config::new());
        let result = assembler.push(Frame::new(true, OpCode::Continuation, vec![1]));
        assert!(matches!(result, Err(Error::ProtocolViolation(_))));
    }

    #[test]
    fn test_interleaved_data_messages() {
        let mut assembler = MessageAssembler::new(Config::new());
        assembler.push(Frame::new(false, OpCode::Text, b"a".to_vec())).unwrap();
        let result = assembler.push(Frame::new(false, OpCode::Binary, vec![1]));
        assert!(matches!(result, Err(Error::ProtocolViolation(_))));
    }

    #[test]
    fn test_max_message_size_exceeded() {
        let mut assembler = MessageAssembler::new(small_limits_config());
        assembler.push(Frame::new(false, OpCode::Binary, vec![0; 60])).unwrap();
        let result = assembler.push(Frame::new(true, OpCode::Continuation, vec![0; 60]));
        assert!(matches!(result, Err(Error::MessageTooLarge { size: 120, max: 100 })));
    }

    #[test]
    fn test_invalid_text_passes_without_validation() {
        let mut assembler = MessageAssembler::new(Config::new());
        let msg = assembler.push(Frame::text(vec![0xFF, 0xFE])).unwrap().unwrap();
        assert_eq!(msg.payload, vec![0xFF, 0xFE]);
    }

    #[test]
    fn test_invalid_text_rejected_with_validation() {
        let mut assembler = MessageAssembler::new(Config::new().with_validate_utf8(true));
        let result = assembler.push(Frame::text(vec![0xFF, 0xFE]));
        assert_eq!(result, Err(Error::InvalidUtf8));
    }

    #[test]
    fn test_text_split_inside_code_point_with_validation() {
        let mut assembler = MessageAssembler::new(Config::new().with_validate_utf8(true));
        let bytes = "é".as_bytes();
        assembler.push(Frame::new(false, OpCode::Text, bytes[..1].to_vec())).unwrap();
        let msg = assembler
            .push(Frame::new(true, OpCode::Continuation, bytes[1..].to_vec()))
            .unwrap()
            .unwrap();
        assert_eq!(msg.payload, bytes);
    }

    #[test]
    fn test_reset() {
        let mut assembler = MessageAssembler::new(Config::new());
        assembler.push(Frame::new(false, OpCode::Text, b"Hel".to_vec())).unwrap();
        assembler.reset();
        assert!(!assembler.is_assembling());
        assert!(assembler.push(Frame::binary(vec![9])).unwrap().is_some());
    }
}
