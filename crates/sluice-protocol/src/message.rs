//! Application payloads: a run of length-prefixed root messages.
//!
//! The transport never interprets message bodies. It only needs the framing
//! (`len: u16 LE, tag: u8, body`) to reject truncated datagrams and to hand
//! the upper layer a list of `(tag, body)` pairs.

use crate::cursor::{ByteReader, ByteWriter};
use crate::ProtocolError;

/// One framed message inside a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootMessage {
    pub tag: u8,
    pub body: Vec<u8>,
}

impl RootMessage {
    pub fn new(tag: u8, body: impl Into<Vec<u8>>) -> Self {
        Self {
            tag,
            body: body.into(),
        }
    }

    /// Size on the wire, including the three-byte header.
    pub fn encoded_len(&self) -> usize {
        3 + self.body.len()
    }
}

/// The opaque application data carried by Reliable and Unreliable packets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload {
    messages: Vec<RootMessage>,
}

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_messages(messages: Vec<RootMessage>) -> Self {
        Self { messages }
    }

    /// Convenience for the common single-message case.
    pub fn single(tag: u8, body: impl Into<Vec<u8>>) -> Self {
        Self::from_messages(vec![RootMessage::new(tag, body)])
    }

    pub fn push(&mut self, message: RootMessage) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[RootMessage] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<RootMessage> {
        self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Reads root messages until the reader is exhausted.
    pub(crate) fn read(reader: &mut ByteReader<'_>) -> Result<Self, ProtocolError> {
        let mut messages = Vec::new();
        while !reader.is_empty() {
            let len = reader.read_u16_le()? as usize;
            let tag = reader.read_u8()?;
            let body = reader.read_bytes(len)?.to_vec();
            messages.push(RootMessage { tag, body });
        }
        Ok(Self { messages })
    }

    pub(crate) fn write(&self, writer: &mut ByteWriter) -> Result<(), ProtocolError> {
        for message in &self.messages {
            let len = u16::try_from(message.body.len())
                .map_err(|_| ProtocolError::TooLarge("root message body"))?;
            writer.write_u16_le(len);
            writer.write_u8(message.tag);
            writer.write_bytes(&message.body);
        }
        Ok(())
    }

    /// Decodes a bare payload (no packet header).
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        Self::read(&mut ByteReader::new(bytes))
    }

    /// Encodes a bare payload (no packet header).
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let size = self.messages.iter().map(RootMessage::encoded_len).sum();
        let mut writer = ByteWriter::with_capacity(size);
        self.write(&mut writer)?;
        Ok(writer.into_inner())
    }
}

impl From<RootMessage> for Payload {
    fn from(message: RootMessage) -> Self {
        Self::from_messages(vec![message])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_frames_each_message() {
        let payload = Payload::from_messages(vec![
            RootMessage::new(1, vec![0xaa]),
            RootMessage::new(5, Vec::new()),
        ]);
        let bytes = payload.encode().unwrap();
        assert_eq!(bytes, vec![1, 0, 1, 0xaa, 0, 0, 5]);
        assert_eq!(Payload::decode(&bytes).unwrap(), payload);
    }

    #[test]
    fn test_payload_truncated_body_is_rejected() {
        // Declares four bytes of body but carries two.
        let bytes = [4, 0, 1, 0xaa, 0xbb];
        assert!(matches!(
            Payload::decode(&bytes),
            Err(ProtocolError::Truncated { .. })
        ));
    }

    #[test]
    fn test_payload_empty_bytes_is_empty_payload() {
        let payload = Payload::decode(&[]).unwrap();
        assert!(payload.is_empty());
    }

    #[test]
    fn test_payload_oversized_body_refuses_to_encode() {
        let payload = Payload::single(1, vec![0u8; 70_000]);
        assert_eq!(
            payload.encode(),
            Err(ProtocolError::TooLarge("root message body"))
        );
    }
}
