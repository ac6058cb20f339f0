use std::collections::HashSet;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::error::QualityError;
use crate::error::Result;

/// Tiers offered by the player, highest first.
pub const DEFAULT_LADDER: [&str; 7] = [
    "1080p60", "936p60", "720p60", "720p", "480p", "360p", "160p",
];

pub const DEFAULT_PREFERRED: &str = "1080p60";

/// Opaque name of a resolution/frame-rate tier, e.g. `1080p60`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QualityLabel(String);

impl QualityLabel {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether a menu entry's display text names this tier.
    pub fn matches(&self, display_text: &str) -> bool {
        display_text.contains(self.0.as_str())
    }
}

impl fmt::Display for QualityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for QualityLabel {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for QualityLabel {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Ordered preference list, highest quality first. Non-empty, free of
/// duplicates and of blank labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityLadder {
    labels: Vec<QualityLabel>,
}

impl QualityLadder {
    pub fn new(labels: Vec<QualityLabel>) -> Result<Self> {
        if labels.is_empty() {
            return Err(QualityError::Config(
                "quality ladder must name at least one tier".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for label in &labels {
            // A blank label is a substring of every option text.
            if label.as_str().trim().is_empty() {
                return Err(QualityError::Config(
                    "quality ladder contains a blank tier".to_string(),
                ));
            }
            if !seen.insert(label.as_str()) {
                return Err(QualityError::Config(format!(
                    "quality ladder lists {label} more than once"
                )));
            }
        }
        Ok(Self { labels })
    }

    pub fn labels(&self) -> &[QualityLabel] {
        &self.labels
    }

    pub fn position(&self, label: &QualityLabel) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    pub fn contains(&self, label: &QualityLabel) -> bool {
        self.position(label).is_some()
    }

    /// Tiers strictly below `preferred`, in ladder order. A label missing from
    /// the ladder has no position, so the walk covers the whole ladder.
    pub fn below(&self, preferred: &QualityLabel) -> &[QualityLabel] {
        match self.position(preferred) {
            Some(idx) => &self.labels[idx + 1..],
            None => &self.labels,
        }
    }
}

impl Default for QualityLadder {
    fn default() -> Self {
        Self {
            labels: DEFAULT_LADDER.iter().copied().map(QualityLabel::from).collect(),
        }
    }
}

impl TryFrom<Vec<String>> for QualityLadder {
    type Error = QualityError;

    fn try_from(value: Vec<String>) -> Result<Self> {
        Self::new(value.into_iter().map(QualityLabel::from).collect())
    }
}
