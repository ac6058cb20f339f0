//! Drives the player's settings menu to the preferred quality tier.
//!
//! One run walks `Idle → CheckingLiveness → OpeningSettings →
//! OpeningQualityMenu → EnumeratingOptions → Selecting → ClosingMenu → Done`.
//! Failures are reported as an [`ApplyOutcome`], never as errors: the page is
//! untrusted and a later run may well succeed.

use std::fmt;

use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::config::Config;
use crate::config::SelectorConfig;
use crate::config::Timing;
use crate::document::Document;
use crate::error::QualityError;
use crate::error::Result;
use crate::ladder::QualityLabel;
use crate::ladder::QualityLadder;
use crate::liveness;
use crate::liveness::LivenessMode;
use crate::policy::Selection;
use crate::policy::SelectionRule;
use crate::policy::select_option;
use crate::session::Session;
use crate::watcher::ElementWatcher;
use crate::watcher::WaitOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorState {
    Idle,
    CheckingLiveness,
    OpeningSettings,
    OpeningQualityMenu,
    EnumeratingOptions,
    Selecting,
    ClosingMenu,
    Done,
}

impl fmt::Display for SelectorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SelectorState::Idle => "idle",
            SelectorState::CheckingLiveness => "checking-liveness",
            SelectorState::OpeningSettings => "opening-settings",
            SelectorState::OpeningQualityMenu => "opening-quality-menu",
            SelectorState::EnumeratingOptions => "enumerating-options",
            SelectorState::Selecting => "selecting",
            SelectorState::ClosingMenu => "closing-menu",
            SelectorState::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyApplied,
    /// Another run holds the session's selection slot.
    InFlight,
    ElementNotFound {
        selector: String,
        attempts: u32,
    },
    NoOptionsAvailable,
    /// The stream changed while the run was in progress; the selection was
    /// not recorded against the new stream.
    StreamChanged,
    Cancelled,
    Document(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied(Selection),
    Skipped(SkipReason),
    /// Liveness could not be determined; try again after the retry delay.
    DeferredRetry,
}

/// Applies the configured quality preference to one page.
#[derive(Debug, Clone)]
pub struct QualitySelector {
    ladder: QualityLadder,
    preferred: QualityLabel,
    selectors: SelectorConfig,
    timing: Timing,
    liveness: LivenessMode,
}

impl QualitySelector {
    pub fn new(ladder: QualityLadder, preferred: QualityLabel) -> Self {
        Self {
            ladder,
            preferred,
            selectors: SelectorConfig::default(),
            timing: Timing::default(),
            liveness: LivenessMode::default(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(config.ladder()?, config.preferred())
            .with_selectors(config.selectors.clone())
            .with_timing(config.timing())
            .with_liveness(config.liveness))
    }

    pub fn with_selectors(mut self, selectors: SelectorConfig) -> Self {
        self.selectors = selectors;
        self
    }

    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_liveness(mut self, liveness: LivenessMode) -> Self {
        self.liveness = liveness;
        self
    }

    pub fn ladder(&self) -> &QualityLadder {
        &self.ladder
    }

    pub fn preferred(&self) -> &QualityLabel {
        &self.preferred
    }

    pub fn selectors(&self) -> &SelectorConfig {
        &self.selectors
    }

    pub fn timing(&self) -> Timing {
        self.timing
    }

    fn watcher(&self) -> ElementWatcher {
        ElementWatcher::new(self.timing.poll_interval)
    }

    pub async fn apply_preferred_quality<D>(
        &self,
        document: &D,
        session: &Session,
        cancel: &CancellationToken,
    ) -> ApplyOutcome
    where
        D: Document + ?Sized,
    {
        if session.is_applied() {
            return ApplyOutcome::Skipped(SkipReason::AlreadyApplied);
        }
        let Some(run) = session.try_begin_run() else {
            debug!("quality selection already in progress");
            return ApplyOutcome::Skipped(SkipReason::InFlight);
        };

        match self.run(document, session, run.generation(), cancel).await {
            Ok(Some(selection)) => ApplyOutcome::Applied(selection),
            Ok(None) => ApplyOutcome::Skipped(SkipReason::StreamChanged),
            Err(QualityError::LivenessUndetermined) => {
                warn!("Can't detect whether channel is live or offline");
                ApplyOutcome::DeferredRetry
            }
            Err(QualityError::ElementNotFound { selector, attempts }) => {
                info!("Quality selection abandoned: {selector} never rendered");
                ApplyOutcome::Skipped(SkipReason::ElementNotFound { selector, attempts })
            }
            Err(QualityError::NoOptionsAvailable) => {
                warn!("Quality menu had no options; leaving session unapplied");
                ApplyOutcome::Skipped(SkipReason::NoOptionsAvailable)
            }
            Err(QualityError::Cancelled) => ApplyOutcome::Skipped(SkipReason::Cancelled),
            Err(err) => {
                warn!("Quality selection failed: {err}");
                ApplyOutcome::Skipped(SkipReason::Document(err.to_string()))
            }
        }
    }

    /// `Ok(None)` when the selection was made but the session moved on.
    async fn run<D>(
        &self,
        document: &D,
        session: &Session,
        generation: u64,
        cancel: &CancellationToken,
    ) -> Result<Option<Selection>>
    where
        D: Document + ?Sized,
    {
        transition(SelectorState::Idle, SelectorState::CheckingLiveness);
        let signals = liveness::detect(document, &self.selectors, self.liveness).await;
        if signals.is_empty() {
            return Err(QualityError::LivenessUndetermined);
        }
        info!(?signals, "Setting quality for stream...");

        transition(SelectorState::CheckingLiveness, SelectorState::OpeningSettings);
        let settings = self
            .await_element(document, &self.selectors.settings_button, cancel)
            .await?;
        document.click(&settings).await?;

        transition(SelectorState::OpeningSettings, SelectorState::OpeningQualityMenu);
        let quality_item = self
            .await_element(document, &self.selectors.quality_menu_item, cancel)
            .await?;
        document.click(&quality_item).await?;

        transition(SelectorState::OpeningQualityMenu, SelectorState::EnumeratingOptions);
        self.await_element(document, &self.selectors.quality_option_marker, cancel)
            .await?;
        let inputs = document
            .query_selector_all(&self.selectors.quality_option_input)
            .await?;
        let mut texts = Vec::with_capacity(inputs.len());
        for input in &inputs {
            let text = document
                .sibling_text(input, &self.selectors.quality_option_label)
                .await?
                .map(|t| t.trim().to_string())
                .unwrap_or_default();
            texts.push(text);
        }
        debug!(options = ?texts, "quality options rendered");

        transition(SelectorState::EnumeratingOptions, SelectorState::Selecting);
        let selection = select_option(&self.ladder, &self.preferred, &texts)
            .ok_or(QualityError::NoOptionsAvailable)?;
        document.check(&inputs[selection.index]).await?;
        log_selection(&self.preferred, &selection);
        let recorded = session.mark_applied(generation);
        if !recorded {
            warn!("Stream changed during selection; the new stream stays unapplied");
        }

        transition(SelectorState::Selecting, SelectorState::ClosingMenu);
        self.close_menu(document, cancel).await;

        transition(SelectorState::ClosingMenu, SelectorState::Done);
        Ok(recorded.then_some(selection))
    }

    async fn await_element<D>(
        &self,
        document: &D,
        selector: &str,
        cancel: &CancellationToken,
    ) -> Result<D::Handle>
    where
        D: Document + ?Sized,
    {
        match self
            .watcher()
            .await_element(document, selector, self.timing.max_attempts, cancel)
            .await
        {
            WaitOutcome::Found(handle) => Ok(handle),
            WaitOutcome::TimedOut { attempts } => Err(QualityError::ElementNotFound {
                selector: selector.to_string(),
                attempts,
            }),
            WaitOutcome::Cancelled => Err(QualityError::Cancelled),
        }
    }

    /// Best-effort: a missing button or failed click is only logged.
    async fn close_menu<D>(&self, document: &D, cancel: &CancellationToken)
    where
        D: Document + ?Sized,
    {
        tokio::select! {
            _ = time::sleep(self.timing.settle_delay) => {}
            _ = cancel.cancelled() => return,
        }
        match document.query_selector(&self.selectors.settings_button).await {
            Ok(Some(button)) => match document.click(&button).await {
                Ok(()) => info!("Clicked settings button to close menu"),
                Err(err) => debug!("closing settings menu failed: {err}"),
            },
            Ok(None) => debug!("settings button gone before menu could be closed"),
            Err(err) => debug!("closing settings menu failed: {err}"),
        }
    }
}

fn transition(from: SelectorState, to: SelectorState) {
    info!(%from, %to, "quality selector transition");
}

fn log_selection(preferred: &QualityLabel, selection: &Selection) {
    match &selection.rule {
        SelectionRule::Preferred => info!("Preferred quality selected: {preferred}"),
        SelectionRule::Fallback(tier) => {
            warn!("{preferred} not available; fell back to next highest quality: {tier}");
        }
        SelectionRule::LowestAvailable => warn!(
            "No ladder quality available; falling back to lowest option: {}",
            selection.text
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeDocument;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::time::Duration;
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for LogBuffer {
        type Writer = LogBuffer;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn selector() -> QualitySelector {
        QualitySelector::new(QualityLadder::default(), "1080p60".into())
    }

    #[tokio::test(start_paused = true)]
    async fn applies_fallback_and_closes_menu() {
        let selector = selector();
        let doc = FakeDocument::with_player(selector.selectors(), &["720p60", "480p", "160p"]);
        let session = Session::new();
        let cancel = CancellationToken::new();

        let outcome = selector
            .apply_preferred_quality(&doc, &session, &cancel)
            .await;

        assert_eq!(
            outcome,
            ApplyOutcome::Applied(Selection {
                index: 0,
                text: "720p60".to_string(),
                rule: SelectionRule::Fallback("720p60".into()),
            })
        );
        assert!(session.is_applied());
        assert_eq!(
            doc.clicks(),
            vec!["settings", "quality-item", "radio:720p60", "settings"]
        );
        assert_eq!(doc.checked(), vec!["radio:720p60"]);
    }

    #[tokio::test(start_paused = true)]
    async fn every_transition_is_logged_at_info() {
        let logs = LogBuffer::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let selector = selector();
        let doc = FakeDocument::with_player(selector.selectors(), &["1080p60", "720p60"]);
        let outcome = selector
            .apply_preferred_quality(&doc, &Session::new(), &CancellationToken::new())
            .await;
        assert!(matches!(outcome, ApplyOutcome::Applied(_)));

        let contents = logs.contents();
        for state in [
            SelectorState::CheckingLiveness,
            SelectorState::OpeningSettings,
            SelectorState::OpeningQualityMenu,
            SelectorState::EnumeratingOptions,
            SelectorState::Selecting,
            SelectorState::ClosingMenu,
            SelectorState::Done,
        ] {
            assert!(contents.contains(&format!("to={state}")), "{contents}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn exact_match_is_selected() {
        let selector = selector();
        let doc = FakeDocument::with_player(
            selector.selectors(),
            &["1080p60 (Source)", "720p60", "160p"],
        );
        let session = Session::new();

        let outcome = selector
            .apply_preferred_quality(&doc, &session, &CancellationToken::new())
            .await;

        let selection = match outcome {
            ApplyOutcome::Applied(selection) => selection,
            other => panic!("expected selection, got {other:?}"),
        };
        assert_eq!(selection.rule, SelectionRule::Preferred);
        assert_eq!(doc.checked(), vec!["radio:1080p60 (Source)"]);
    }

    #[tokio::test(start_paused = true)]
    async fn defers_when_liveness_is_undetermined() {
        let selector = selector();
        let doc = FakeDocument::new();
        doc.insert(&selector.selectors().settings_button, "settings");
        let session = Session::new();

        let outcome = selector
            .apply_preferred_quality(&doc, &session, &CancellationToken::new())
            .await;

        assert_eq!(outcome, ApplyOutcome::DeferredRetry);
        assert!(doc.clicks().is_empty());
        assert!(!session.is_applied());
        assert!(!session.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_settings_button_abandons_run() {
        let selector = selector();
        let doc = FakeDocument::with_player(selector.selectors(), &["720p"]);
        doc.remove(&selector.selectors().settings_button);
        let session = Session::new();
        let start = time::Instant::now();

        let outcome = selector
            .apply_preferred_quality(&doc, &session, &CancellationToken::new())
            .await;

        assert_eq!(
            outcome,
            ApplyOutcome::Skipped(SkipReason::ElementNotFound {
                selector: selector.selectors().settings_button.clone(),
                attempts: 25,
            })
        );
        assert!(start.elapsed() >= Duration::from_millis(12_500));
        assert!(doc.clicks().is_empty());
        assert!(!session.is_applied());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_menu_leaves_session_unapplied_and_retry_succeeds() {
        let selector = selector();
        let selectors = selector.selectors().clone();
        let doc = FakeDocument::with_player(&selectors, &[]);
        // Marker renders but no inputs do.
        doc.insert(&selectors.quality_option_marker, "marker");
        let session = Session::new();
        let cancel = CancellationToken::new();

        let outcome = selector
            .apply_preferred_quality(&doc, &session, &cancel)
            .await;
        assert_eq!(outcome, ApplyOutcome::Skipped(SkipReason::NoOptionsAvailable));
        assert!(!session.is_applied());

        doc.set_options(&selectors, &["480p", "160p"]);
        let outcome = selector
            .apply_preferred_quality(&doc, &session, &cancel)
            .await;
        assert!(matches!(outcome, ApplyOutcome::Applied(ref s) if s.text == "480p"));
        assert!(session.is_applied());
    }

    #[tokio::test(start_paused = true)]
    async fn already_applied_session_is_left_alone() {
        let selector = selector();
        let doc = FakeDocument::with_player(selector.selectors(), &["720p"]);
        let session = Session::new();
        session.mark_applied(session.generation());

        let outcome = selector
            .apply_preferred_quality(&doc, &session, &CancellationToken::new())
            .await;

        assert_eq!(outcome, ApplyOutcome::Skipped(SkipReason::AlreadyApplied));
        assert_eq!(doc.query_count(&selector.selectors().video_player), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_runs_are_rejected() {
        let selector = Arc::new(selector());
        let selectors = selector.selectors().clone();
        let doc = Arc::new(FakeDocument::with_player(&selectors, &["720p"]));
        doc.remove(&selectors.quality_menu_item);
        doc.reveal_on_click("settings", &selectors.quality_menu_item, "quality-item");
        let session = Session::new();
        let cancel = CancellationToken::new();

        let first = tokio::spawn({
            let selector = Arc::clone(&selector);
            let doc = Arc::clone(&doc);
            let session = session.clone();
            let cancel = cancel.clone();
            async move {
                selector
                    .apply_preferred_quality(doc.as_ref(), &session, &cancel)
                    .await
            }
        });
        time::sleep(Duration::from_millis(100)).await;
        assert!(session.is_running());

        let second = selector
            .apply_preferred_quality(doc.as_ref(), &session, &cancel)
            .await;
        assert_eq!(second, ApplyOutcome::Skipped(SkipReason::InFlight));

        assert!(matches!(first.await.unwrap(), ApplyOutcome::Applied(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn stream_change_mid_run_is_not_recorded() {
        let selector = Arc::new(selector());
        let selectors = selector.selectors().clone();
        let doc = Arc::new(FakeDocument::with_player(&selectors, &["720p"]));
        doc.remove(&selectors.settings_button);
        doc.insert_after(&selectors.settings_button, "settings", 3);
        let session = Session::new();
        session.observe_identifier("https://www.twitch.tv/first");

        let run = tokio::spawn({
            let selector = Arc::clone(&selector);
            let doc = Arc::clone(&doc);
            let session = session.clone();
            async move {
                selector
                    .apply_preferred_quality(doc.as_ref(), &session, &CancellationToken::new())
                    .await
            }
        });
        time::sleep(Duration::from_millis(700)).await;
        session.observe_identifier("https://www.twitch.tv/second");

        assert_eq!(
            run.await.unwrap(),
            ApplyOutcome::Skipped(SkipReason::StreamChanged)
        );
        assert!(!session.is_applied());
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_the_run() {
        let selector = Arc::new(selector());
        let selectors = selector.selectors().clone();
        let doc = Arc::new(FakeDocument::with_player(&selectors, &["720p"]));
        doc.remove(&selectors.settings_button);
        let session = Session::new();
        let cancel = CancellationToken::new();

        let run = tokio::spawn({
            let selector = Arc::clone(&selector);
            let doc = Arc::clone(&doc);
            let session = session.clone();
            let cancel = cancel.clone();
            async move {
                selector
                    .apply_preferred_quality(doc.as_ref(), &session, &cancel)
                    .await
            }
        });
        time::sleep(Duration::from_millis(1200)).await;
        cancel.cancel();

        assert_eq!(
            run.await.unwrap(),
            ApplyOutcome::Skipped(SkipReason::Cancelled)
        );
        assert!(!session.is_running());
    }
}
