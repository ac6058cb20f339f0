use std::path::PathBuf;
use std::time::Duration;

use dirs::home_dir;
use serde::Deserialize;
use serde::Serialize;
use tracing::warn;

use crate::error::QualityError;
use crate::error::Result;
use crate::ladder::DEFAULT_LADDER;
use crate::ladder::DEFAULT_PREFERRED;
use crate::ladder::QualityLabel;
use crate::ladder::QualityLadder;
use crate::liveness::LivenessMode;

/// Quality preferences and timing, as read from the `config.toml` top level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_preferred")]
    pub preferred_quality: String,

    /// Highest tier first.
    #[serde(default = "default_ladder")]
    pub quality_ladder: Vec<String>,

    /// Delay between two element polls.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Polls per menu element before the run is abandoned.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Pause between selecting a tier and closing the settings menu.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Delay before retrying when liveness could not be determined.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// How often the driver checks for an unapplied session.
    #[serde(default = "default_driver_interval_ms")]
    pub driver_interval_ms: u64,

    /// Delay between a stream change and the first attempt on the new page.
    #[serde(default = "default_player_appear_delay_ms")]
    pub player_appear_delay_ms: u64,

    #[serde(default)]
    pub liveness: LivenessMode,

    #[serde(default)]
    pub selectors: SelectorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            preferred_quality: default_preferred(),
            quality_ladder: default_ladder(),
            poll_interval_ms: default_poll_interval_ms(),
            max_attempts: default_max_attempts(),
            settle_delay_ms: default_settle_delay_ms(),
            retry_delay_ms: default_retry_delay_ms(),
            driver_interval_ms: default_driver_interval_ms(),
            player_appear_delay_ms: default_player_appear_delay_ms(),
            liveness: LivenessMode::default(),
            selectors: SelectorConfig::default(),
        }
    }
}

/// CSS selectors for the elements the selector reads and clicks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Carries the literal text `LIVE` on live channels.
    pub status_text: String,
    /// Carries the literal text `Offline` on offline channels.
    pub offline_status: String,
    pub live_time: String,
    pub video_player: String,
    pub settings_button: String,
    pub quality_menu_item: String,
    /// Present once the quality submenu has rendered its options.
    pub quality_option_marker: String,
    pub quality_option_input: String,
    /// Caption next to each option input.
    pub quality_option_label: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            status_text: ".tw-channel-status-text-indicator".to_string(),
            offline_status: ".channel-status-info".to_string(),
            live_time: ".live-time".to_string(),
            video_player: r#"[data-a-target="video-player"]"#.to_string(),
            settings_button: r#"[data-a-target="player-settings-button"]"#.to_string(),
            quality_menu_item: r#"[data-a-target="player-settings-menu-item-quality"]"#
                .to_string(),
            quality_option_marker: r#"[data-a-target="tw-radio"]"#.to_string(),
            quality_option_input: r#"input[type="radio"]"#.to_string(),
            quality_option_label: "label".to_string(),
        }
    }
}

/// Overrides for the file configuration (e.g., from CLI flags).
#[derive(Default, Debug, Clone)]
pub struct ConfigOverrides {
    pub preferred_quality: Option<String>,
    pub quality_ladder: Option<Vec<String>>,
    pub liveness: Option<LivenessMode>,
}

/// Timing knobs in their runtime form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub poll_interval: Duration,
    pub max_attempts: u32,
    pub settle_delay: Duration,
    pub retry_delay: Duration,
    pub driver_interval: Duration,
    pub player_appear_delay: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Config::default().timing()
    }
}

impl Config {
    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(preferred) = overrides.preferred_quality {
            self.preferred_quality = preferred;
        }
        if let Some(ladder) = overrides.quality_ladder {
            self.quality_ladder = ladder;
        }
        if let Some(liveness) = overrides.liveness {
            self.liveness = liveness;
        }
    }

    pub fn ladder(&self) -> Result<QualityLadder> {
        QualityLadder::try_from(self.quality_ladder.clone())
    }

    pub fn preferred(&self) -> QualityLabel {
        QualityLabel::new(self.preferred_quality.trim())
    }

    /// Checks invariants that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let ladder = self.ladder()?;
        let preferred = self.preferred();
        if preferred.as_str().is_empty() {
            return Err(QualityError::Config(
                "preferred_quality must not be empty".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(QualityError::Config(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(QualityError::Config(
                "max_attempts must be greater than zero".to_string(),
            ));
        }
        if self.driver_interval_ms == 0 {
            return Err(QualityError::Config(
                "driver_interval_ms must be greater than zero".to_string(),
            ));
        }
        if !ladder.contains(&preferred) {
            warn!(
                "Preferred quality {preferred} is not on the ladder; fallback will scan every tier"
            );
        }
        Ok(())
    }

    pub fn timing(&self) -> Timing {
        Timing {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            max_attempts: self.max_attempts,
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            driver_interval: Duration::from_millis(self.driver_interval_ms),
            player_appear_delay: Duration::from_millis(self.player_appear_delay_ms),
        }
    }
}

fn default_preferred() -> String {
    DEFAULT_PREFERRED.to_string()
}

fn default_ladder() -> Vec<String> {
    DEFAULT_LADDER.iter().map(ToString::to_string).collect()
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_max_attempts() -> u32 {
    25
}

fn default_settle_delay_ms() -> u64 {
    500
}

fn default_retry_delay_ms() -> u64 {
    2000
}

fn default_driver_interval_ms() -> u64 {
    3000
}

fn default_player_appear_delay_ms() -> u64 {
    1000
}

/// Returns the path to the configuration directory, which is
/// `~/.autoquality`. Does not verify that the directory exists.
pub fn autoquality_dir() -> std::io::Result<PathBuf> {
    let mut p = home_dir().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Could not find home directory",
        )
    })?;
    p.push(".autoquality");
    Ok(p)
}

/// Default location of `config.toml`.
pub fn default_config_path() -> std::io::Result<PathBuf> {
    let mut p = autoquality_dir()?;
    p.push("config.toml");
    Ok(p)
}
