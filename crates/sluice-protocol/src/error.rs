//! Error types for the protocol layer.
//!
//! Every decode failure maps onto one of these variants. Callers above the
//! codec treat any of them the same way (drop the datagram), but the variant
//! is kept for logging so a misbehaving client can be diagnosed.

/// Errors that can occur while encoding or decoding a packet.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// The datagram had no bytes at all.
    #[error("empty datagram")]
    Empty,

    /// The first byte is not a known packet kind.
    #[error("unknown packet kind 0x{0:02x}")]
    UnknownKind(u8),

    /// The datagram ended before a field could be read.
    #[error("truncated: needed {needed} more byte(s), {remaining} remaining")]
    Truncated {
        /// Bytes the field required.
        needed: usize,
        /// Bytes left in the buffer.
        remaining: usize,
    },

    /// A packed (7-bit varint) integer ran past five bytes.
    #[error("packed integer overflows 32 bits")]
    PackedOverflow,

    /// A string field was not valid UTF-8.
    #[error("invalid utf-8 in string field")]
    InvalidUtf8,

    /// A field was too large to encode.
    #[error("field too large: {0}")]
    TooLarge(&'static str),

    /// The packet is structurally valid but violates a framing rule.
    #[error("malformed packet: {0}")]
    Malformed(String),
}
