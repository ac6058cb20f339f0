use std::future::Future;
use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use crate::document::Document;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome<T> {
    Found(T),
    TimedOut { attempts: u32 },
    Cancelled,
}

/// Bounded polling: waits `interval`, runs `probe`, and repeats until the
/// probe yields a value or `max_attempts` probes came back empty.
///
/// The first probe runs one interval after the call, like a recurring timer.
/// Nothing is probed after the first hit.
pub async fn wait_for<F, Fut, T>(
    interval: Duration,
    max_attempts: u32,
    cancel: &CancellationToken,
    mut probe: F,
) -> WaitOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Option<T>>,
{
    for attempt in 1..=max_attempts {
        tokio::select! {
            _ = time::sleep(interval) => {}
            _ = cancel.cancelled() => return WaitOutcome::Cancelled,
        }
        if let Some(value) = probe(attempt).await {
            return WaitOutcome::Found(value);
        }
    }
    WaitOutcome::TimedOut {
        attempts: max_attempts,
    }
}

/// Waits for CSS-selectable elements to render.
#[derive(Debug, Clone, Copy)]
pub struct ElementWatcher {
    interval: Duration,
}

impl Default for ElementWatcher {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl ElementWatcher {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub async fn await_element<D>(
        &self,
        document: &D,
        selector: &str,
        max_attempts: u32,
        cancel: &CancellationToken,
    ) -> WaitOutcome<D::Handle>
    where
        D: Document + ?Sized,
    {
        let outcome = wait_for(self.interval, max_attempts, cancel, |attempt| async move {
            match document.query_selector(selector).await {
                Ok(found) => found,
                Err(err) => {
                    debug!(selector, attempt, "query failed: {err}");
                    None
                }
            }
        })
        .await;

        match &outcome {
            WaitOutcome::Found(_) => debug!(selector, "element found"),
            WaitOutcome::TimedOut { attempts } => {
                warn!("Element {selector} not found after {attempts} attempts");
            }
            WaitOutcome::Cancelled => debug!(selector, "wait cancelled"),
        }
        outcome
    }
}
