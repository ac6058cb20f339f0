use autoquality_core::ConfigOverrides;
use autoquality_core::LivenessMode;
use clap::Parser;
use clap::ValueEnum;
use std::path::PathBuf;

/// Keeps a live stream's player on the preferred quality tier.
#[derive(Parser, Debug, Clone)]
#[command(version)]
pub struct Cli {
    /// Config file to read instead of `~/.autoquality/config.toml`.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Quality label to select, e.g. `1080p60`.
    #[arg(long, value_name = "LABEL")]
    pub preferred: Option<String>,

    /// Comma-separated quality ladder, highest tier first.
    #[arg(long, value_name = "LABELS", value_delimiter = ',', num_args = 1..)]
    pub ladder: Option<Vec<String>>,

    /// Stream page to open.
    #[arg(long)]
    pub url: Option<String>,

    /// Attach to a Chrome started with `--remote-debugging-port`.
    #[arg(long, value_name = "PORT", conflicts_with = "connect_ws")]
    pub connect_port: Option<u16>,

    /// Attach to a Chrome DevTools WebSocket endpoint.
    #[arg(long, value_name = "URL")]
    pub connect_ws: Option<String>,

    /// Launch Chrome headless.
    #[arg(long, default_value_t = false)]
    pub headless: bool,

    /// Which page signals count as "the stream is live".
    #[arg(long, value_enum)]
    pub liveness: Option<LivenessModeCliArg>,

    /// Apply the preferred quality once and exit.
    #[arg(long, default_value_t = false)]
    pub once: bool,

    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    pub log_level: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum LivenessModeCliArg {
    Standard,
    Legacy,
}

impl From<LivenessModeCliArg> for LivenessMode {
    fn from(value: LivenessModeCliArg) -> Self {
        match value {
            LivenessModeCliArg::Standard => LivenessMode::Standard,
            LivenessModeCliArg::Legacy => LivenessMode::Legacy,
        }
    }
}

impl Cli {
    pub fn config_overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            preferred_quality: self.preferred.clone(),
            quality_ladder: self.ladder.as_ref().map(|ladder| {
                ladder
                    .iter()
                    .map(|label| label.trim().to_string())
                    .filter(|label| !label.is_empty())
                    .collect()
            }),
            liveness: self.liveness.map(Into::into),
        }
    }
}
