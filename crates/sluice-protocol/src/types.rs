//! Value types that appear inside packets.
//!
//! These are the identity fields a client announces in its Hello and the
//! reason codes carried by a Disconnect. None of them know about sessions.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Server-assigned identifier for one connected client.
///
/// Unique for the lifetime of the process; never reused after the client
/// disconnects. Displays as `C-42` in logs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ClientId(pub u32);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C-{}", self.0)
    }
}

/// Game client build, packed on the wire as a single `i32`.
///
/// The packing is `year * 25000 + month * 1800 + day * 50 + build`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientVersion {
    pub year: u32,
    pub month: u32,
    pub day: u32,
    pub build: u32,
}

impl ClientVersion {
    pub const fn new(year: u32, month: u32, day: u32, build: u32) -> Self {
        Self {
            year,
            month,
            day,
            build,
        }
    }

    /// Unpacks a wire value. Negative values clamp to zero.
    pub fn from_i32(packed: i32) -> Self {
        let mut rest = packed.max(0) as u32;
        let year = rest / 25000;
        rest %= 25000;
        let month = rest / 1800;
        rest %= 1800;
        let day = rest / 50;
        let build = rest % 50;
        Self::new(year, month, day, build)
    }

    pub fn to_i32(self) -> i32 {
        (self.year * 25000 + self.month * 1800 + self.day * 50 + self.build) as i32
    }
}

impl fmt::Display for ClientVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.year, self.month, self.day)?;
        if self.build != 0 {
            write!(f, ".{}", self.build)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Language
// ---------------------------------------------------------------------------

/// The game language a client announces, sent as a keyword flag value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Language {
    #[default]
    English,
    SpanishAmericas,
    PortugueseBrazil,
    Portuguese,
    Korean,
    Russian,
    Dutch,
    Filipino,
    French,
    German,
    Italian,
    Japanese,
    Spanish,
    ChineseSimplified,
    ChineseTraditional,
    Irish,
    /// A flag value this server does not recognise.
    Other(u32),
}

impl Language {
    pub fn from_flag(flag: u32) -> Self {
        match flag {
            256 => Self::English,
            2 => Self::SpanishAmericas,
            2048 => Self::PortugueseBrazil,
            16 => Self::Portuguese,
            4 => Self::Korean,
            8 => Self::Russian,
            4096 => Self::Dutch,
            64 => Self::Filipino,
            8192 => Self::French,
            16384 => Self::German,
            32768 => Self::Italian,
            512 => Self::Japanese,
            1024 => Self::Spanish,
            65536 => Self::ChineseSimplified,
            131072 => Self::ChineseTraditional,
            262144 => Self::Irish,
            other => Self::Other(other),
        }
    }

    pub fn flag(self) -> u32 {
        match self {
            Self::English => 256,
            Self::SpanishAmericas => 2,
            Self::PortugueseBrazil => 2048,
            Self::Portuguese => 16,
            Self::Korean => 4,
            Self::Russian => 8,
            Self::Dutch => 4096,
            Self::Filipino => 64,
            Self::French => 8192,
            Self::German => 16384,
            Self::Italian => 32768,
            Self::Japanese => 512,
            Self::Spanish => 1024,
            Self::ChineseSimplified => 65536,
            Self::ChineseTraditional => 131072,
            Self::Irish => 262144,
            Self::Other(flag) => flag,
        }
    }

    /// Locale code used to look up translated server messages.
    ///
    /// Both Chinese variants share `zh`. Unknown languages have no locale and
    /// fall back to the server default.
    pub fn locale_code(self) -> Option<&'static str> {
        Some(match self {
            Self::English => "en",
            Self::SpanishAmericas => "es_US",
            Self::PortugueseBrazil => "pt_BR",
            Self::Portuguese => "pt",
            Self::Korean => "ko",
            Self::Russian => "ru",
            Self::Dutch => "nl",
            Self::Filipino => "fil",
            Self::French => "fr",
            Self::German => "de",
            Self::Italian => "it",
            Self::Japanese => "ja",
            Self::Spanish => "es_ES",
            Self::ChineseSimplified | Self::ChineseTraditional => "zh",
            Self::Irish => "ga",
            Self::Other(_) => return None,
        })
    }
}

// ---------------------------------------------------------------------------
// Platform and chat mode
// ---------------------------------------------------------------------------

/// The store/platform the client was launched from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Platform {
    #[default]
    Unknown,
    EpicPc,
    SteamPc,
    Mac,
    Win10,
    Itch,
    IPhone,
    Android,
    Switch,
    Xbox,
    Playstation,
    Other(u8),
}

impl Platform {
    pub fn from_tag(tag: u8) -> Self {
        match tag {
            0 => Self::Unknown,
            1 => Self::EpicPc,
            2 => Self::SteamPc,
            3 => Self::Mac,
            4 => Self::Win10,
            5 => Self::Itch,
            6 => Self::IPhone,
            7 => Self::Android,
            8 => Self::Switch,
            9 => Self::Xbox,
            10 => Self::Playstation,
            other => Self::Other(other),
        }
    }

    pub fn tag(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::EpicPc => 1,
            Self::SteamPc => 2,
            Self::Mac => 3,
            Self::Win10 => 4,
            Self::Itch => 5,
            Self::IPhone => 6,
            Self::Android => 7,
            Self::Switch => 8,
            Self::Xbox => 9,
            Self::Playstation => 10,
            Self::Other(tag) => tag,
        }
    }
}

/// Whether the client uses free-text chat or the quick-chat wheel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ChatMode {
    #[default]
    FreeChat,
    QuickChat,
    Other(u8),
}

impl ChatMode {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            1 => Self::FreeChat,
            2 => Self::QuickChat,
            other => Self::Other(other),
        }
    }

    pub fn byte(self) -> u8 {
        match self {
            Self::FreeChat => 1,
            Self::QuickChat => 2,
            Self::Other(b) => b,
        }
    }
}

// ---------------------------------------------------------------------------
// DisconnectReason
// ---------------------------------------------------------------------------

/// Reason code carried by a Disconnect packet.
///
/// The client renders a canned message for most of these. `Custom` makes it
/// display the accompanying text instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisconnectReason {
    None,
    GameFull,
    GameStarted,
    GameNotFound,
    IncorrectVersion,
    Banned,
    Kicked,
    Custom,
    InvalidName,
    Hacking,
    NotAuthorized,
    Destroy,
    Error,
    IncorrectGame,
    ServerRequest,
    ServerFull,
    Unknown(u8),
}

impl DisconnectReason {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0 => Self::None,
            1 => Self::GameFull,
            2 => Self::GameStarted,
            3 => Self::GameNotFound,
            5 => Self::IncorrectVersion,
            6 => Self::Banned,
            7 => Self::Kicked,
            8 => Self::Custom,
            9 => Self::InvalidName,
            10 => Self::Hacking,
            11 => Self::NotAuthorized,
            16 => Self::Destroy,
            17 => Self::Error,
            18 => Self::IncorrectGame,
            19 => Self::ServerRequest,
            20 => Self::ServerFull,
            other => Self::Unknown(other),
        }
    }

    pub fn byte(self) -> u8 {
        match self {
            Self::None => 0,
            Self::GameFull => 1,
            Self::GameStarted => 2,
            Self::GameNotFound => 3,
            Self::IncorrectVersion => 5,
            Self::Banned => 6,
            Self::Kicked => 7,
            Self::Custom => 8,
            Self::InvalidName => 9,
            Self::Hacking => 10,
            Self::NotAuthorized => 11,
            Self::Destroy => 16,
            Self::Error => 17,
            Self::IncorrectGame => 18,
            Self::ServerRequest => 19,
            Self::ServerFull => 20,
            Self::Unknown(b) => b,
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(b) => write!(f, "Unknown({b})"),
            other => write!(f, "{other:?}"),
        }
    }
}
