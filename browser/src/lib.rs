pub mod config;
pub mod document;
pub mod manager;

pub use config::BrowserConfig;
pub use document::CdpDocument;
pub use manager::BrowserManager;

use autoquality_core::QualityError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("Browser not initialized")]
    NotInitialized,

    #[error("Page not loaded")]
    PageNotLoaded,

    #[error("CDP error: {0}")]
    CdpError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),
}

impl From<chromiumoxide::error::CdpError> for BrowserError {
    fn from(e: chromiumoxide::error::CdpError) -> Self {
        BrowserError::CdpError(e.to_string())
    }
}

impl From<BrowserError> for QualityError {
    fn from(e: BrowserError) -> Self {
        QualityError::Document(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BrowserError>;
