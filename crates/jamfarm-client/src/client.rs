//! Status client: connect, log in, aggregate, close.

use std::future::Future;
use std::time::Duration;

use encoding_rs::{Encoding, UTF_8};
use jamfarm_core::{ServerAddress, StatusError, StatusSnapshot};
use jamfarm_protocol::Credential;
use tracing::{debug, info};

use crate::session::{self, StatusSession};

/// Default bound on the TCP connect phase.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection tuning for [`StatusClient`].
#[derive(Debug, Clone, PartialEq)]
pub struct ClientOptions {
    /// Bound on the connect phase. Always applied.
    pub connect_timeout: Duration,
    /// Quiet period after which aggregation ends as if the peer closed.
    /// `None` waits for the server to close the connection.
    pub idle_timeout: Option<Duration>,
    /// Largest frame body accepted. `None` trusts the declared length.
    pub max_message_size: Option<u32>,
    /// Encoding of server text.
    pub encoding: &'static Encoding,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            idle_timeout: None,
            max_message_size: None,
            encoding: UTF_8,
        }
    }
}

impl ClientOptions {
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_max_message_size(mut self, max: Option<u32>) -> Self {
        self.max_message_size = max;
        self
    }

    #[must_use]
    pub fn with_encoding(mut self, encoding: &'static Encoding) -> Self {
        self.encoding = encoding;
        self
    }
}

/// Fetches the status of a session server.
///
/// Every call opens its own connection and performs a full fetch; there is
/// no shared state between calls.
#[derive(Debug, Clone, Default)]
pub struct StatusClient {
    options: ClientOptions,
}

impl StatusClient {
    pub fn new(options: ClientOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Performs one complete status fetch.
    pub async fn fetch_status(
        &self,
        address: &ServerAddress,
        credential: &Credential,
    ) -> Result<StatusSnapshot, StatusError> {
        let stream = session::connect(address, self.options.connect_timeout).await?;
        debug!(server = %address, "connected");

        let result = StatusSession::new(stream)
            .with_idle_timeout(self.options.idle_timeout)
            .with_max_message_size(self.options.max_message_size)
            .with_encoding(self.options.encoding)
            .run(credential)
            .await;

        match &result {
            Ok(snapshot) => info!(
                server = %address,
                users = snapshot.user_count(),
                "status fetched"
            ),
            Err(e) => info!(
                server = %address,
                kind = e.kind.as_str(),
                detail = %e.detail,
                "status fetch failed"
            ),
        }

        result
    }

    /// Like [`fetch_status`](Self::fetch_status), but gives up with
    /// `Cancelled` as soon as `shutdown` completes.
    ///
    /// The in-flight session is dropped on cancellation, which closes its
    /// socket.
    pub async fn fetch_status_until<F>(
        &self,
        address: &ServerAddress,
        credential: &Credential,
        shutdown: F,
    ) -> Result<StatusSnapshot, StatusError>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            result = self.fetch_status(address, credential) => result,
            () = shutdown => {
                info!(server = %address, "status fetch cancelled");
                Err(StatusError::cancelled())
            }
        }
    }
}
