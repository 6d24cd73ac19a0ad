//! Connection state and timings

use std::fmt;
use std::time::Duration;

/// Socket lifecycle state
///
/// Heartbeat TIMEOUT is tracked as a separate flag on the connector, so a
/// timed-out connection is still `Connected` until the reconnect is triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "DISCONNECTED",
            Self::Connecting => "CONNECTING",
            Self::Connected => "CONNECTED",
        };
        f.write_str(name)
    }
}

/// Connector timings
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    /// How long one open attempt may take until HELLO arrives
    pub open_timeout: Duration,
    /// Open attempts per resolved gateway URL before resolving again
    pub opens_per_gateway: u32,
    /// Interval between heartbeat pings
    pub heartbeat_interval: Duration,
    /// Window for the PONG of a regular ping
    pub pong_timeout: Duration,
    /// Windows for the follow-up pings sent once the connection timed out
    pub follow_up_windows: Vec<Duration>,
    /// Continuous uptime after which the reconnect counter resets
    pub stable_period: Duration,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            open_timeout: Duration::from_secs(15),
            opens_per_gateway: 2,
            heartbeat_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(6),
            follow_up_windows: vec![Duration::from_secs(2), Duration::from_secs(4)],
            stable_period: crate::reconnect::DEFAULT_STABLE_PERIOD,
        }
    }
}
