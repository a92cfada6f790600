use std::time::Duration;

use tokio::time::Instant;

/// Suppresses a frame identical to the last transmitted one within a window.
///
/// Only the most recent transmission is remembered. A suppressed frame does
/// not extend the window.
#[derive(Debug)]
pub struct DedupWindow {
    window: Duration,
    last: Option<(String, Instant)>,
}

impl DedupWindow {
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    /// Returns `true` if `payload` should be transmitted, and records it.
    pub fn admit(&mut self, payload: &str, now: Instant) -> bool {
        if let Some((last, at)) = &self.last {
            if last == payload && now.saturating_duration_since(*at) < self.window {
                return false;
            }
        }
        self.last = Some((payload.to_owned(), now));
        true
    }
}
