//! The default command: fetch and render one server's status.

use std::future::Future;
use std::process::ExitCode;
use std::time::Duration;

use jamfarm_core::{ServerAddress, StatusError, StatusFormatter, StatusSnapshot};
use jamfarm_protocol::Credential;
use tracing::{debug, warn};

use crate::client::StatusClient;
use crate::config::ClientConfig;
use crate::error::ClientResult;
use crate::fetcher::{CachedFetcher, StatusFetcher};

/// Delay before the first retry; doubled for each further attempt.
pub const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// Fetches, renders to stdout, and maps the outcome to an exit code.
///
/// A failed fetch is still rendered so status bars always get output.
pub async fn run(config: &ClientConfig, retries: u32) -> ClientResult<ExitCode> {
    let address = config.address()?;
    let credential = config.credential()?;
    let client = StatusClient::new(config.client_options()?);

    let fetcher: Box<dyn StatusFetcher> = match config.status_cache() {
        Some(cache) => Box::new(CachedFetcher::new(client, cache)),
        None => Box::new(client),
    };

    let outcome = until_interrupted(fetch_with_retries(
        fetcher.as_ref(),
        &address,
        &credential,
        retries,
        INITIAL_BACKOFF,
    ))
    .await;

    let formatter = StatusFormatter::new(config.format_options());
    let rendered = formatter.render(config.display.format, &address, &outcome);
    if rendered.ends_with('\n') {
        print!("{}", rendered);
    } else {
        println!("{}", rendered);
    }

    Ok(if outcome.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Re-runs the whole fetch on transient failures.
///
/// Only `ConnectFailed` is retried; the wait doubles after every attempt.
pub async fn fetch_with_retries(
    fetcher: &dyn StatusFetcher,
    address: &ServerAddress,
    credential: &Credential,
    retries: u32,
    initial_backoff: Duration,
) -> Result<StatusSnapshot, StatusError> {
    let mut delay = initial_backoff;
    let mut attempt = 0;

    loop {
        match fetcher.fetch(address, credential).await {
            Err(e) if e.is_transient() && attempt < retries => {
                attempt += 1;
                warn!(
                    server = %address,
                    attempt,
                    retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "fetch failed, retrying"
                );
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
            }
            outcome => return outcome,
        }
    }
}

/// Races `fetch` against Ctrl-C.
async fn until_interrupted<F>(fetch: F) -> Result<StatusSnapshot, StatusError>
where
    F: Future<Output = Result<StatusSnapshot, StatusError>>,
{
    tokio::select! {
        outcome = fetch => outcome,
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                debug!(error = %e, "ctrl-c handler failed");
            }
            Err(StatusError::cancelled())
        }
    }
}
