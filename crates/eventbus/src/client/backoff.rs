// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connect-retry backoff schedule: the delay and log severity for the
//! `attempt`'th failed connect (1-indexed). There is no upper bound on
//! attempts — the schedule simply plateaus.

use std::time::Duration;

use tracing::Level;

/// Delay before the next connect attempt, and the severity to log it at.
pub fn backoff_for(attempt: u32) -> (Duration, Level) {
    match attempt {
        0 | 1 => (Duration::from_millis(0), Level::INFO),
        2..=9 => (Duration::from_millis(1000), Level::WARN),
        _ => (Duration::from_millis(5000), Level::ERROR),
    }
}

/// Log a connect failure at the severity the schedule assigns to `attempt`.
pub fn log_connect_failure(client_id: &str, attempt: u32, delay: Duration, err: &std::io::Error) {
    let (_, level) = backoff_for(attempt);
    let delay_ms = delay.as_millis() as u64;
    match level {
        Level::INFO => {
            tracing::info!(client_id, attempt, delay_ms, %err, "connect failed, retrying")
        }
        Level::WARN => {
            tracing::warn!(client_id, attempt, delay_ms, %err, "connect failed, retrying")
        }
        _ => tracing::error!(client_id, attempt, delay_ms, %err, "connect failed, retrying"),
    }
}
