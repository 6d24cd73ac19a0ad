//! Handshake result codes
//!
//! Values of `d.code` in the Hello frame.

/// Hello handshake codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum HelloCode {
    /// Handshake accepted
    Success = 0,
    /// Connect URL was missing parameters
    MissingParams = 40100,
    /// Token is not valid
    InvalidToken = 40101,
    /// Token verification failed
    TokenVerifyFailed = 40102,
    /// Token expired; a fresh gateway URL is needed
    TokenExpired = 40103,
}

impl HelloCode {
    /// Create a `HelloCode` from a raw value
    #[must_use]
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::Success),
            40100 => Some(Self::MissingParams),
            40101 => Some(Self::InvalidToken),
            40102 => Some(Self::TokenVerifyFailed),
            40103 => Some(Self::TokenExpired),
            _ => None,
        }
    }

    /// Get the raw value
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self as i64
    }

    /// Check if the client should attempt to reconnect after this code
    ///
    /// Token rejections need an operator to fix the bot token.
    #[must_use]
    pub const fn should_reconnect(self) -> bool {
        !matches!(self, Self::InvalidToken | Self::TokenVerifyFailed)
    }

    /// Get the description for this code
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Success => "Handshake succeeded",
            Self::MissingParams => "Missing connect parameters",
            Self::InvalidToken => "Invalid token",
            Self::TokenVerifyFailed => "Token verification failed",
            Self::TokenExpired => "Token expired",
        }
    }
}

impl std::fmt::Display for HelloCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.as_i64(), self.description())
    }
}
