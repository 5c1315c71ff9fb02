//! Packet framing: the one-byte kind tag, the optional big-endian sequence
//! number, and the kind-specific body.
//!
//! ```text
//! Unreliable   0x00 | payload
//! Reliable     0x01 | seq_hi seq_lo | payload
//! Hello        0x08 | seq_hi seq_lo | hello body
//! Disconnect   0x09 | [forced=1 | len_lo len_hi 0x00 | reason | [message]]
//! Acknowledge  0x0a | seq_hi seq_lo | missing
//! Ping         0x0c | seq_hi seq_lo
//! ```
//!
//! Nothing above this module touches raw datagram bytes.

use crate::cursor::{ByteReader, ByteWriter};
use crate::message::Payload;
use crate::types::{ChatMode, ClientVersion, DisconnectReason, Language, Platform};
use crate::ProtocolError;

// ---------------------------------------------------------------------------
// PacketKind
// ---------------------------------------------------------------------------

/// The kind tag in byte 0 of every datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    Unreliable,
    Reliable,
    Hello,
    Disconnect,
    Acknowledge,
    Ping,
}

/// Rate-limit bucket a datagram is counted against.
///
/// Derived from the tag byte alone so flood control can run before decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrafficClass {
    Reliable,
    Unreliable,
}

impl PacketKind {
    pub fn from_tag(tag: u8) -> Result<Self, ProtocolError> {
        match tag {
            0x00 => Ok(Self::Unreliable),
            0x01 => Ok(Self::Reliable),
            0x08 => Ok(Self::Hello),
            0x09 => Ok(Self::Disconnect),
            0x0a => Ok(Self::Acknowledge),
            0x0c => Ok(Self::Ping),
            other => Err(ProtocolError::UnknownKind(other)),
        }
    }

    pub fn tag(self) -> u8 {
        match self {
            Self::Unreliable => 0x00,
            Self::Reliable => 0x01,
            Self::Hello => 0x08,
            Self::Disconnect => 0x09,
            Self::Acknowledge => 0x0a,
            Self::Ping => 0x0c,
        }
    }

    /// Reads the kind from a raw datagram without decoding the rest.
    pub fn peek(datagram: &[u8]) -> Result<Self, ProtocolError> {
        let tag = datagram.first().ok_or(ProtocolError::Empty)?;
        Self::from_tag(*tag)
    }

    /// Whether the peer expects an acknowledgement for this kind.
    pub fn is_reliable(self) -> bool {
        matches!(self, Self::Reliable | Self::Hello | Self::Ping)
    }

    pub fn class(self) -> TrafficClass {
        if self.is_reliable() {
            TrafficClass::Reliable
        } else {
            TrafficClass::Unreliable
        }
    }
}

// ---------------------------------------------------------------------------
// Packet bodies
// ---------------------------------------------------------------------------

/// Identity a client announces when it opens a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hello {
    pub hazel_version: u8,
    pub client_version: ClientVersion,
    pub display_name: String,
    pub last_nonce_received: u32,
    pub language: Language,
    pub chat_mode: ChatMode,
    pub platform: Platform,
    pub platform_name: String,
}

impl Hello {
    /// A Hello carrying only the mandatory fields; the rest take defaults.
    pub fn new(client_version: ClientVersion, display_name: impl Into<String>) -> Self {
        Self {
            hazel_version: 1,
            client_version,
            display_name: display_name.into(),
            last_nonce_received: 0,
            language: Language::default(),
            chat_mode: ChatMode::default(),
            platform: Platform::default(),
            platform_name: String::new(),
        }
    }

    fn read(reader: &mut ByteReader<'_>) -> Result<Self, ProtocolError> {
        let hazel_version = reader.read_u8()?;
        let client_version = ClientVersion::from_i32(reader.read_i32_le()?);
        let display_name = reader.read_string()?;
        let mut hello = Self {
            hazel_version,
            ..Self::new(client_version, display_name)
        };

        // Older clients stop after the name. Each trailing field is read
        // only if the bytes for it are present.
        if reader.remaining() >= 4 {
            hello.last_nonce_received = reader.read_u32_le()?;
        }
        if reader.remaining() >= 4 {
            hello.language = Language::from_flag(reader.read_u32_le()?);
        }
        if reader.remaining() >= 1 {
            hello.chat_mode = ChatMode::from_byte(reader.read_u8()?);
        }
        if reader.remaining() >= 3 {
            let len = reader.read_u16_le()? as usize;
            hello.platform = Platform::from_tag(reader.read_u8()?);
            let mut body = ByteReader::new(reader.read_bytes(len)?);
            if !body.is_empty() {
                hello.platform_name = body.read_string()?;
            }
        }
        Ok(hello)
    }

    fn write(&self, writer: &mut ByteWriter) -> Result<(), ProtocolError> {
        writer.write_u8(self.hazel_version);
        writer.write_i32_le(self.client_version.to_i32());
        writer.write_string(&self.display_name);
        writer.write_u32_le(self.last_nonce_received);
        writer.write_u32_le(self.language.flag());
        writer.write_u8(self.chat_mode.byte());

        let mut platform = ByteWriter::new();
        platform.write_string(&self.platform_name);
        let len = u16::try_from(platform.len())
            .map_err(|_| ProtocolError::TooLarge("platform name"))?;
        writer.write_u16_le(len);
        writer.write_u8(self.platform.tag());
        writer.write_bytes(&platform.into_inner());
        Ok(())
    }
}

/// Reason and optional text attached to a Disconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectInfo {
    pub reason: DisconnectReason,
    pub message: Option<String>,
}

impl DisconnectInfo {
    pub fn new(reason: DisconnectReason) -> Self {
        Self {
            reason,
            message: None,
        }
    }

    pub fn with_message(reason: DisconnectReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: Some(message.into()),
        }
    }

    fn read(reader: &mut ByteReader<'_>) -> Result<Option<Self>, ProtocolError> {
        if reader.is_empty() {
            return Ok(None);
        }
        let _forced = reader.read_u8()?;
        if reader.remaining() < 3 {
            return Ok(None);
        }
        let len = reader.read_u16_le()? as usize;
        let _tag = reader.read_u8()?;
        let mut body = ByteReader::new(reader.read_bytes(len)?);
        if body.is_empty() {
            return Ok(Some(Self::new(DisconnectReason::None)));
        }
        let reason = DisconnectReason::from_byte(body.read_u8()?);
        let message = if body.is_empty() {
            None
        } else {
            Some(body.read_string()?)
        };
        Ok(Some(Self { reason, message }))
    }

    fn write(&self, writer: &mut ByteWriter) -> Result<(), ProtocolError> {
        let mut body = ByteWriter::new();
        body.write_u8(self.reason.byte());
        if let Some(message) = &self.message {
            body.write_string(message);
        }
        let len =
            u16::try_from(body.len()).map_err(|_| ProtocolError::TooLarge("disconnect message"))?;

        writer.write_u8(1);
        writer.write_u16_le(len);
        writer.write_u8(0);
        writer.write_bytes(&body.into_inner());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Packet
// ---------------------------------------------------------------------------

/// A fully decoded datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Unreliable {
        payload: Payload,
    },
    Reliable {
        sequence: u16,
        payload: Payload,
    },
    Hello {
        sequence: u16,
        hello: Hello,
    },
    /// `None` is a bare disconnect with no reason attached.
    Disconnect(Option<DisconnectInfo>),
    Acknowledge {
        sequence: u16,
        /// Bitfield of recently missing sequences. Informational only.
        missing: u8,
    },
    Ping {
        sequence: u16,
    },
}

impl Packet {
    pub fn kind(&self) -> PacketKind {
        match self {
            Self::Unreliable { .. } => PacketKind::Unreliable,
            Self::Reliable { .. } => PacketKind::Reliable,
            Self::Hello { .. } => PacketKind::Hello,
            Self::Disconnect(_) => PacketKind::Disconnect,
            Self::Acknowledge { .. } => PacketKind::Acknowledge,
            Self::Ping { .. } => PacketKind::Ping,
        }
    }

    /// Sequence number for kinds that carry one.
    pub fn sequence(&self) -> Option<u16> {
        match self {
            Self::Reliable { sequence, .. }
            | Self::Hello { sequence, .. }
            | Self::Acknowledge { sequence, .. }
            | Self::Ping { sequence } => Some(*sequence),
            Self::Unreliable { .. } | Self::Disconnect(_) => None,
        }
    }

    /// An acknowledgement for `sequence`, as the server always sends it.
    pub fn ack(sequence: u16) -> Self {
        Self::Acknowledge {
            sequence,
            missing: 0xff,
        }
    }
}

/// Decodes one datagram.
///
/// # Errors
/// Any framing violation. Callers drop the datagram.
pub fn decode_packet(datagram: &[u8]) -> Result<Packet, ProtocolError> {
    let kind = PacketKind::peek(datagram)?;
    let mut reader = ByteReader::new(&datagram[1..]);

    let packet = match kind {
        PacketKind::Unreliable => Packet::Unreliable {
            payload: Payload::read(&mut reader)?,
        },
        PacketKind::Reliable => {
            let sequence = reader.read_u16_be()?;
            Packet::Reliable {
                sequence,
                payload: Payload::read(&mut reader)?,
            }
        }
        PacketKind::Hello => {
            let sequence = reader.read_u16_be()?;
            Packet::Hello {
                sequence,
                hello: Hello::read(&mut reader)?,
            }
        }
        PacketKind::Disconnect => Packet::Disconnect(DisconnectInfo::read(&mut reader)?),
        PacketKind::Acknowledge => {
            let sequence = reader.read_u16_be()?;
            let missing = if reader.is_empty() { 0xff } else { reader.read_u8()? };
            Packet::Acknowledge { sequence, missing }
        }
        PacketKind::Ping => Packet::Ping {
            sequence: reader.read_u16_be()?,
        },
    };

    // Trailing bytes after a Hello or Disconnect are tolerated; after a
    // fixed-size packet they mean the sender is not speaking this protocol.
    if matches!(kind, PacketKind::Ping | PacketKind::Acknowledge) && !reader.is_empty() {
        return Err(ProtocolError::Malformed(format!(
            "{} trailing byte(s) after {kind:?}",
            reader.remaining()
        )));
    }
    Ok(packet)
}

/// Encodes one packet into a datagram.
///
/// # Errors
/// Returns [`ProtocolError::TooLarge`] if a length-prefixed field does not fit.
pub fn encode_packet(packet: &Packet) -> Result<Vec<u8>, ProtocolError> {
    let mut writer = ByteWriter::with_capacity(16);
    writer.write_u8(packet.kind().tag());

    match packet {
        Packet::Unreliable { payload } => payload.write(&mut writer)?,
        Packet::Reliable { sequence, payload } => {
            writer.write_u16_be(*sequence);
            payload.write(&mut writer)?;
        }
        Packet::Hello { sequence, hello } => {
            writer.write_u16_be(*sequence);
            hello.write(&mut writer)?;
        }
        Packet::Disconnect(info) => {
            if let Some(info) = info {
                info.write(&mut writer)?;
            }
        }
        Packet::Acknowledge { sequence, missing } => {
            writer.write_u16_be(*sequence);
            writer.write_u8(*missing);
        }
        Packet::Ping { sequence } => writer.write_u16_be(*sequence),
    }
    Ok(writer.into_inner())
}
