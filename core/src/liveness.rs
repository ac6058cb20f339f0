//! Best-effort check that the page shows a playable stream.
//!
//! None of these signals is authoritative; any one of them is enough.

use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::warn;

use crate::config::SelectorConfig;
use crate::document::Document;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LivenessMode {
    /// `LIVE` status text, live-time indicator or video player.
    #[default]
    Standard,
    /// Also accepts the `Offline` status text as a positive signal.
    Legacy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessSignal {
    LiveText,
    OfflineText,
    LiveTime,
    Player,
}

/// Signals present on the page, in check order. Empty means undetermined.
pub async fn detect<D>(
    document: &D,
    selectors: &SelectorConfig,
    mode: LivenessMode,
) -> Vec<LivenessSignal>
where
    D: Document + ?Sized,
{
    let mut signals = Vec::new();

    if text_equals(document, &selectors.status_text, "LIVE").await {
        signals.push(LivenessSignal::LiveText);
    }
    if mode == LivenessMode::Legacy
        && text_equals(document, &selectors.offline_status, "Offline").await
    {
        signals.push(LivenessSignal::OfflineText);
    }
    if exists(document, &selectors.live_time).await {
        signals.push(LivenessSignal::LiveTime);
    }
    if exists(document, &selectors.video_player).await {
        signals.push(LivenessSignal::Player);
    }

    if signals == [LivenessSignal::OfflineText] {
        warn!("Only the Offline status matched; proceeding because legacy liveness is enabled");
    }
    signals
}

async fn exists<D>(document: &D, selector: &str) -> bool
where
    D: Document + ?Sized,
{
    match document.query_selector(selector).await {
        Ok(found) => found.is_some(),
        Err(err) => {
            debug!(selector, "liveness query failed: {err}");
            false
        }
    }
}

async fn text_equals<D>(document: &D, selector: &str, expected: &str) -> bool
where
    D: Document + ?Sized,
{
    let handle = match document.query_selector(selector).await {
        Ok(Some(handle)) => handle,
        Ok(None) => return false,
        Err(err) => {
            debug!(selector, "liveness query failed: {err}");
            return false;
        }
    };
    match document.text_content(&handle).await {
        Ok(Some(text)) => text.trim() == expected,
        Ok(None) => false,
        Err(err) => {
            debug!(selector, "liveness text read failed: {err}");
            false
        }
    }
}
