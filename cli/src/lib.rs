mod cli;
pub mod config;

pub use cli::Cli;
pub use cli::LivenessModeCliArg;

use std::sync::Arc;

use autoquality_browser::BrowserManager;
use autoquality_core::ApplyOutcome;
use autoquality_core::QualitySelector;
use autoquality_core::Session;
use autoquality_core::SessionDriver;
use autoquality_core::SkipReason;
use autoquality_core::apply_until_settled;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::FileConfig;

pub async fn run_main(cli: Cli) -> anyhow::Result<()> {
    let default_level = cli.log_level.clone();
    let _ = tracing_subscriber::fmt()
        // Fallback to `--log-level` if the environment variable is not set
        // _or_ contains an invalid value
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(&default_level))
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();

    let FileConfig {
        enforcer,
        browser: browser_config,
    } = FileConfig::resolve(&cli)?;
    let selector = Arc::new(QualitySelector::from_config(&enforcer)?);
    info!(
        preferred = %selector.preferred(),
        liveness = ?enforcer.liveness,
        "starting quality enforcer"
    );

    // A launched browser already opens `--url` as its start page.
    let attach_url = cli.url.clone().filter(|_| browser_config.is_external());
    let manager = BrowserManager::new(browser_config);
    manager.start().await?;
    if let Some(url) = attach_url {
        manager.goto(&url).await?;
    }

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl-C received, shutting down");
                cancel.cancel();
            }
        })
    };

    let result = if cli.once {
        run_once(&manager, &selector, &cancel).await
    } else {
        run_driver(&manager, selector, cancel.clone()).await
    };

    ctrl_c.abort();
    if let Err(e) = manager.stop().await {
        error!("failed to stop browser: {e}");
    }
    result
}

async fn run_once(
    manager: &BrowserManager,
    selector: &QualitySelector,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let document = manager.document().await?;
    let session = Session::new();
    session.observe_identifier(&manager.current_url().await?);

    tokio::select! {
        _ = tokio::time::sleep(selector.timing().player_appear_delay) => {}
        _ = cancel.cancelled() => return Ok(()),
    }
    let outcome = apply_until_settled(selector, &document, &session, cancel).await;
    println!("{}", status_line(&outcome));
    match outcome {
        ApplyOutcome::Applied(_) | ApplyOutcome::Skipped(SkipReason::Cancelled) => Ok(()),
        other => Err(anyhow::anyhow!("quality not applied: {other:?}")),
    }
}

async fn run_driver(
    manager: &BrowserManager,
    selector: Arc<QualitySelector>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let document = Arc::new(manager.document().await?);
    let identifiers = manager.watch_navigation().await?;
    let driver = SessionDriver::new(document, selector, Session::new(), identifiers);
    driver.run(cancel).await;
    Ok(())
}

fn status_line(outcome: &ApplyOutcome) -> String {
    match outcome {
        ApplyOutcome::Applied(selection) => {
            format!("applied {} ({:?})", selection.text.trim(), selection.rule)
        }
        ApplyOutcome::Skipped(SkipReason::ElementNotFound { selector, attempts }) => {
            format!("skipped: {selector} not found after {attempts} attempts")
        }
        ApplyOutcome::Skipped(reason) => format!("skipped: {reason:?}"),
        ApplyOutcome::DeferredRetry => "deferred: liveness undetermined".to_string(),
    }
}
