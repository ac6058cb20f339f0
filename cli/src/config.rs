use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;
use autoquality_browser::BrowserConfig;
use autoquality_core::Config;
use autoquality_core::config::default_config_path;
use serde::Deserialize;

use crate::cli::Cli;

/// Everything `config.toml` holds: enforcer keys at the top level plus a
/// `[browser]` table.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FileConfig {
    #[serde(flatten)]
    pub enforcer: Config,

    #[serde(default)]
    pub browser: BrowserConfig,
}

impl FileConfig {
    /// Reads `path`; a missing file yields the defaults.
    pub fn load_from_path(path: &Path) -> anyhow::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents)
                .with_context(|| format!("invalid configuration in {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
        }
    }

    /// Loads the file named on the command line (or the default one), then
    /// layers the command-line flags on top.
    pub fn resolve(cli: &Cli) -> anyhow::Result<Self> {
        let path = match &cli.config {
            Some(path) => path.clone(),
            None => default_config_path().unwrap_or_else(|_| PathBuf::from("config.toml")),
        };
        let mut config = Self::load_from_path(&path)?;
        config.apply_cli(cli);
        config.enforcer.validate()?;
        Ok(config)
    }

    fn apply_cli(&mut self, cli: &Cli) {
        self.enforcer.apply_overrides(cli.config_overrides());
        if cli.headless {
            self.browser.headless = true;
        }
        if let Some(port) = cli.connect_port {
            self.browser.connect_port = Some(port);
            self.browser.connect_ws = None;
        }
        if let Some(ws) = &cli.connect_ws {
            self.browser.connect_ws = Some(ws.clone());
            self.browser.connect_port = None;
        }
        if let Some(url) = &cli.url {
            self.browser.start_url = url.clone();
        }
    }
}
