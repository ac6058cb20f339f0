//! Preferred-quality enforcement for a live video player.
//!
//! The page is reached only through the [`Document`] trait, so everything in
//! this crate runs against any backend that can query and click elements.

pub mod config;
pub mod document;
pub mod driver;
pub mod error;
pub mod ladder;
pub mod liveness;
pub mod policy;
pub mod selector;
pub mod session;
pub mod watcher;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use config::ConfigOverrides;
pub use config::SelectorConfig;
pub use config::Timing;
pub use document::Document;
pub use driver::SessionDriver;
pub use driver::apply_until_settled;
pub use error::QualityError;
pub use error::Result;
pub use ladder::QualityLabel;
pub use ladder::QualityLadder;
pub use liveness::LivenessMode;
pub use policy::Selection;
pub use policy::SelectionRule;
pub use policy::select_option;
pub use selector::ApplyOutcome;
pub use selector::QualitySelector;
pub use selector::SkipReason;
pub use session::Session;
pub use session::SessionState;
pub use watcher::ElementWatcher;
pub use watcher::WaitOutcome;
