// src/utils/mod.rs
//! Utility functions and helpers.
//!
//! This module contains general-purpose utilities used across
//! the agent.

pub mod logging;
pub mod system;

use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch for a file timestamp; 0 when unavailable,
/// negative for times before the epoch.
pub fn unix_seconds(time: std::io::Result<SystemTime>) -> i64 {
    match time {
        Ok(t) => match t.duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_secs() as i64,
            Err(e) => -(e.duration().as_secs() as i64),
        },
        Err(_) => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_unix_seconds() {
        let t = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        assert_eq!(unix_seconds(Ok(t)), 1_700_000_000);

        let before = UNIX_EPOCH - Duration::from_secs(60);
        assert_eq!(unix_seconds(Ok(before)), -60);

        let err = std::io::Error::new(std::io::ErrorKind::Other, "unsupported");
        assert_eq!(unix_seconds(Err(err)), 0);
    }
}
