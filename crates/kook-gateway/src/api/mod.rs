//! REST collaborator
//!
//! The connector needs three calls from the platform's REST API: resolve the
//! socket gateway URL, check the bot's online flag, and post the offline state.

mod http;

pub use http::HttpGatewayApi;

use crate::error::GatewayResult;
use async_trait::async_trait;

/// REST calls consumed by the transports
#[async_trait]
pub trait GatewayApi: Send + Sync {
    /// Resolve the socket gateway URL
    async fn gateway_url(&self, compress: bool) -> GatewayResult<String>;

    /// Tell the platform the bot is going offline
    async fn notify_offline(&self) -> GatewayResult<()>;

    /// Whether the platform still lists the bot as online
    async fn is_online(&self) -> GatewayResult<bool> {
        Ok(false)
    }
}
