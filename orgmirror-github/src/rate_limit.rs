//! Pacing against the REST API quota

use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use crate::{GitHubClient, Result};

/// Margin added to the reset time so the quota has actually been refilled
const RESET_MARGIN: Duration = Duration::from_secs(1);

/// How long to sleep before the next request, `None` while quota remains
fn rate_limit_delay(remaining: u64, reset_epoch: i64, now_epoch: i64, max_wait: Duration) -> Option<Duration> {
    if remaining > 0 {
        return None;
    }

    let until_reset = u64::try_from(reset_epoch.saturating_sub(now_epoch)).unwrap_or(0);
    Some((Duration::from_secs(until_reset) + RESET_MARGIN).min(max_wait))
}

impl GitHubClient {
    /// Sleep until the core quota resets if it is exhausted, waiting at most
    /// the configured maximum
    pub async fn wait_for_core_quota(&self) -> Result<()> {
        let limits = self.client().ratelimit().get().await?;
        let quota = limits.resources.core;

        debug!(remaining = quota.remaining, limit = quota.limit, "Rate limit status");

        let Some(delay) = rate_limit_delay(
            quota.remaining as u64,
            quota.reset as i64,
            Utc::now().timestamp(),
            self.rate_limit_max_wait(),
        ) else {
            return Ok(());
        };

        warn!(seconds = delay.as_secs(), "GitHub rate limit exhausted, waiting for reset");
        tokio::time::sleep(delay).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn test_no_wait_with_quota_left() {
        assert_eq!(rate_limit_delay(1, 2_000, 1_000, HOUR), None);
    }

    #[test]
    fn test_waits_until_reset() {
        assert_eq!(
            rate_limit_delay(0, 1_060, 1_000, HOUR),
            Some(Duration::from_secs(61))
        );
    }

    #[test]
    fn test_wait_is_capped() {
        assert_eq!(
            rate_limit_delay(0, 100_000, 1_000, Duration::from_secs(30)),
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn test_reset_in_the_past() {
        assert_eq!(rate_limit_delay(0, 900, 1_000, HOUR), Some(RESET_MARGIN));
    }
}
