//! Fallback selection over the options a quality menu currently renders.
//!
//! The walk is one-directional: after the preferred tier it only considers
//! tiers below it, so a missing preferred tier never turns into an upgrade.

use crate::ladder::QualityLabel;
use crate::ladder::QualityLadder;

/// Which step of the policy produced a [`Selection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionRule {
    /// An option names the preferred tier.
    Preferred,
    /// The first tier below the preferred one that some option names.
    Fallback(QualityLabel),
    /// Nothing on the ladder matched; the last rendered option.
    LowestAvailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Index into the option list handed to [`select_option`].
    pub index: usize,
    /// Display text of the chosen option.
    pub text: String,
    pub rule: SelectionRule,
}

/// Picks exactly one option, or `None` when `options` is empty.
pub fn select_option<S: AsRef<str>>(
    ladder: &QualityLadder,
    preferred: &QualityLabel,
    options: &[S],
) -> Option<Selection> {
    if let Some(index) = find_option(preferred, options) {
        return Some(selection(options, index, SelectionRule::Preferred));
    }

    for tier in ladder.below(preferred) {
        if let Some(index) = find_option(tier, options) {
            return Some(selection(
                options,
                index,
                SelectionRule::Fallback(tier.clone()),
            ));
        }
    }

    let last = options.len().checked_sub(1)?;
    Some(selection(options, last, SelectionRule::LowestAvailable))
}

fn find_option<S: AsRef<str>>(label: &QualityLabel, options: &[S]) -> Option<usize> {
    options.iter().position(|text| label.matches(text.as_ref()))
}

fn selection<S: AsRef<str>>(options: &[S], index: usize, rule: SelectionRule) -> Selection {
    Selection {
        index,
        text: options[index].as_ref().to_string(),
        rule,
    }
}
