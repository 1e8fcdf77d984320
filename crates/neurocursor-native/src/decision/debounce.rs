//! Temporal debouncing of decided intents
//!
//! A short rolling window of raw intents is majority-voted once it is full;
//! until then the raw intent passes through. A discrete action (CLICK)
//! clears the window when emitted, and an optional cooldown suppresses a
//! repeat of a discrete action for a number of ticks afterwards.

use std::collections::VecDeque;

use neurocursor_core::types::{Intent, IntentLabel};
use serde::{Deserialize, Serialize};

/// Debouncer configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebounceConfig {
    /// Votes in the rolling window
    pub window: usize,
    /// Ticks after a discrete action during which another is suppressed
    pub cooldown_ticks: usize,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self { window: 3, cooldown_ticks: 3 }
    }
}

/// Debouncer output for one tick
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Stabilized {
    /// Act on this intent
    Emit(Intent),
    /// A discrete action was held back by the cooldown
    Suppressed,
}

impl Stabilized {
    /// The intent to act on (IDLE when suppressed)
    #[must_use]
    pub fn intent(self) -> Intent {
        match self {
            Self::Emit(intent) => intent,
            Self::Suppressed => Intent::idle(),
        }
    }
}

/// Majority-vote debouncer
#[derive(Clone, Debug)]
pub struct Debouncer {
    config: DebounceConfig,
    history: VecDeque<Intent>,
    cooldown: usize,
}

impl Debouncer {
    /// Create a debouncer. A zero window is treated as one.
    #[must_use]
    pub fn new(config: DebounceConfig) -> Self {
        let window = config.window.max(1);
        Self {
            config: DebounceConfig { window, ..config },
            history: VecDeque::with_capacity(window),
            cooldown: 0,
        }
    }

    /// Configuration in force
    #[must_use]
    pub const fn config(&self) -> &DebounceConfig {
        &self.config
    }

    /// Intents currently in the window, oldest first
    #[must_use]
    pub fn history(&self) -> Vec<Intent> {
        self.history.iter().copied().collect()
    }

    /// Feed one raw intent and get the stabilized result
    pub fn stabilize(&mut self, intent: Intent) -> Stabilized {
        if self.history.len() == self.config.window {
            self.history.pop_front();
        }
        self.history.push_back(intent);
        self.cooldown = self.cooldown.saturating_sub(1);

        let candidate =
            if self.history.len() < self.config.window { intent } else { self.vote() };

        if !candidate.label.is_discrete() {
            return Stabilized::Emit(candidate);
        }
        if self.cooldown > 0 {
            tracing::debug!(
                "{} suppressed by cooldown ({} ticks left)",
                candidate.label,
                self.cooldown
            );
            return Stabilized::Suppressed;
        }
        self.history.clear();
        self.cooldown = self.config.cooldown_ticks + 1;
        Stabilized::Emit(candidate)
    }

    /// Majority label; ties go to the most recently seen of the tied labels.
    /// Confidence is the mean over the winning label's votes.
    fn vote(&self) -> Intent {
        let mut tally: Vec<(IntentLabel, usize, f64, usize)> = Vec::new();
        for (pos, intent) in self.history.iter().enumerate() {
            match tally.iter_mut().find(|(l, ..)| *l == intent.label) {
                Some(entry) => {
                    entry.1 += 1;
                    entry.2 += intent.confidence;
                    entry.3 = pos;
                }
                None => tally.push((intent.label, 1, intent.confidence, pos)),
            }
        }

        tally
            .into_iter()
            .max_by_key(|(_, count, _, last)| (*count, *last))
            .map_or_else(Intent::idle, |(label, count, sum, _)| {
                Intent::new(label, sum / count as f64)
            })
    }

    /// Drop the window and any cooldown
    pub fn reset(&mut self) {
        self.history.clear();
        self.cooldown = 0;
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DebounceConfig::default())
    }
}
