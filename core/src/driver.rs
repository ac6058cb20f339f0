//! Session glue: watches for stream changes and keeps invoking the quality
//! selector until the current stream has its quality applied.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;

use crate::document::Document;
use crate::selector::ApplyOutcome;
use crate::selector::QualitySelector;
use crate::selector::SkipReason;
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    /// First attempt on a freshly loaded stream page.
    PlayerAppeared,
    /// Re-run after liveness could not be determined.
    Retry,
}

pub struct SessionDriver<D: Document + ?Sized> {
    document: Arc<D>,
    selector: Arc<QualitySelector>,
    session: Session,
    identifiers: watch::Receiver<String>,
}

impl<D> SessionDriver<D>
where
    D: Document + ?Sized + 'static,
{
    /// `identifiers` carries the current stream identifier (the page URL);
    /// every change starts a new session.
    pub fn new(
        document: Arc<D>,
        selector: Arc<QualitySelector>,
        session: Session,
        identifiers: watch::Receiver<String>,
    ) -> Self {
        Self {
            document,
            selector,
            session,
            identifiers,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        let timing = self.selector.timing();
        let mut pending: Option<(Instant, Pending)> = None;

        let initial = self.identifiers.borrow_and_update().clone();
        if self.session.observe_identifier(&initial) {
            pending = Some((Instant::now() + timing.player_appear_delay, Pending::PlayerAppeared));
        }

        let mut ticker = time::interval_at(
            Instant::now() + timing.driver_interval,
            timing.driver_interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut source_open = true;

        info!(
            preferred = %self.selector.preferred(),
            "quality driver started"
        );
        loop {
            let wake = pending.map(|(at, _)| at);
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = self.identifiers.changed(), if source_open => {
                    if changed.is_err() {
                        debug!("stream identifier source closed");
                        source_open = false;
                        continue;
                    }
                    let identifier = self.identifiers.borrow_and_update().clone();
                    if self.session.observe_identifier(&identifier) {
                        pending = Some((
                            Instant::now() + timing.player_appear_delay,
                            Pending::PlayerAppeared,
                        ));
                    }
                }
                _ = sleep_until(wake) => {
                    let require_player = match pending.take() {
                        Some((_, Pending::Retry)) => false,
                        Some((_, Pending::PlayerAppeared)) | None => true,
                    };
                    if self.attempt(require_player, &cancel).await == Some(Pending::Retry) {
                        pending = Some((Instant::now() + timing.retry_delay, Pending::Retry));
                    }
                }
                _ = ticker.tick() => {
                    if pending.is_some() {
                        continue;
                    }
                    if self.attempt(true, &cancel).await == Some(Pending::Retry) {
                        pending = Some((Instant::now() + timing.retry_delay, Pending::Retry));
                    }
                }
            }
        }
        info!("quality driver stopped");
    }

    async fn attempt(&self, require_player: bool, cancel: &CancellationToken) -> Option<Pending> {
        if self.session.is_applied() {
            return None;
        }
        if require_player && !self.player_present().await {
            debug!("no video player on the page yet");
            return None;
        }

        match self
            .selector
            .apply_preferred_quality(self.document.as_ref(), &self.session, cancel)
            .await
        {
            ApplyOutcome::Applied(selection) => {
                info!(option = %selection.text, "quality applied for current stream");
                None
            }
            ApplyOutcome::DeferredRetry => Some(Pending::Retry),
            ApplyOutcome::Skipped(reason) => {
                debug!(?reason, "quality selection skipped");
                None
            }
        }
    }

    async fn player_present(&self) -> bool {
        let selector = &self.selector.selectors().video_player;
        match self.document.query_selector(selector).await {
            Ok(found) => found.is_some(),
            Err(err) => {
                debug!(selector, "player query failed: {err}");
                false
            }
        }
    }
}

async fn sleep_until(at: Option<Instant>) {
    match at {
        Some(at) => time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Runs the selector once, re-invoking it after the retry delay for as long
/// as liveness stays undetermined.
pub async fn apply_until_settled<D>(
    selector: &QualitySelector,
    document: &D,
    session: &Session,
    cancel: &CancellationToken,
) -> ApplyOutcome
where
    D: Document + ?Sized,
{
    loop {
        match selector
            .apply_preferred_quality(document, session, cancel)
            .await
        {
            ApplyOutcome::DeferredRetry => {
                tokio::select! {
                    _ = time::sleep(selector.timing().retry_delay) => {}
                    _ = cancel.cancelled() => {
                        return ApplyOutcome::Skipped(SkipReason::Cancelled);
                    }
                }
            }
            outcome => return outcome,
        }
    }
}
