//! HTTP client configuration for artifact downloads.

use reqwest::Client;
use std::time::Duration;

use crate::error::ResourceResult;

/// User-Agent for HTTP requests
pub const USER_AGENT: &str = concat!("lsp-promql/", env!("CARGO_PKG_VERSION"));

/// Default timeout for a whole artifact download (5 minutes)
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Timeout for establishing a connection (30 seconds)
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Create an HTTP client with proper configuration
pub fn create_http_client(timeout: Duration) -> ResourceResult<Client> {
    let client = Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .connect_timeout(CONNECT_TIMEOUT)
        .tcp_nodelay(true)
        .build()?;
    Ok(client)
}
