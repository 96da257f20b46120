//! Size discovery with a bounded retry budget.

use std::thread;

use tracing::warn;

use crate::cancel::CancellationToken;
use crate::config::RetryPolicy;
use crate::error::{BlockFailure, TransportError};
use crate::http::RangeClient;

/// Result of probing a URL's content length.
#[derive(Debug)]
pub enum Probe {
    Found(u64),
    Canceled,
    Exhausted(BlockFailure),
}

/// Probe `url` until it answers, the policy runs out, or `token` is set.
///
/// The token is checked before every attempt but not during the backoff
/// sleep. A malformed URL fails immediately.
pub fn probe_content_length(
    client: &dyn RangeClient,
    url: &str,
    policy: &RetryPolicy,
    token: &CancellationToken,
) -> Probe {
    let mut attempt = 0;
    loop {
        if token.is_canceled() {
            return Probe::Canceled;
        }
        attempt += 1;

        let err = match client.content_length(url) {
            Ok(total) => return Probe::Found(total),
            Err(e) => e,
        };
        let fatal = matches!(err, TransportError::InvalidUrl { .. });
        if fatal || attempt >= policy.max_attempts {
            return Probe::Exhausted(BlockFailure::SizeDiscovery {
                attempts: attempt,
                last: err,
            });
        }

        let delay = policy.delay_after(attempt);
        warn!(
            url = %url,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Size probe failed, retrying"
        );
        thread::sleep(delay);
    }
}
