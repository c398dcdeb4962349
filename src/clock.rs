use std::{
    fs::{self, OpenOptions},
    path::PathBuf,
    time::{Duration, SystemTime},
};

use tracing::debug;

use crate::Result;

/// Per-query freshness clock over the `_<query>.last-update` marker.
///
/// The marker is an empty file whose mtime is the time of the last
/// successful refresh, so freshness survives process restarts.
pub(crate) struct RefreshClock {
    marker: PathBuf,
    timeout: Duration,
}

impl RefreshClock {
    pub fn new(marker: PathBuf, timeout_secs: u64) -> Self {
        Self {
            marker,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Whether a refresh is due: forced, never refreshed, or refreshed
    /// longer than the timeout ago. A marker mtime in the future counts
    /// as fresh.
    pub fn due(&self, force: bool) -> bool {
        if force {
            return true;
        }

        let Ok(meta) = fs::metadata(&self.marker) else {
            return true;
        };
        let Ok(modified) = meta.modified() else {
            return true;
        };

        match modified.elapsed() {
            Ok(age) => age >= self.timeout,
            Err(_) => false,
        }
    }

    /// Creates the marker if missing and bumps its mtime to now.
    pub fn stamp(&self) -> Result<()> {
        let marker = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&self.marker)?;
        marker.set_modified(SystemTime::now())?;

        debug!("stamped {}", self.marker.display());
        Ok(())
    }
}
