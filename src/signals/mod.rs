//! Candidate signals and the aggregators that gather them.

pub mod inbox;

use std::collections::BTreeSet;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::intent::types::{Intention, IntentionSource, RiskLevel, TrustLevel};

pub use inbox::InboxAggregator;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub source: IntentionSource,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub risk: Option<RiskLevel>,
    #[serde(default)]
    pub required_trust: Option<TrustLevel>,
    /// Initial strength for a new intention, or the boost for a duplicate.
    #[serde(default)]
    pub strength: Option<f32>,
}

impl Signal {
    pub fn new(source: IntentionSource, title: impl Into<String>) -> Self {
        Self {
            source,
            title: title.into(),
            description: String::new(),
            reason: String::new(),
            risk: None,
            required_trust: None,
            strength: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn with_risk(mut self, risk: RiskLevel) -> Self {
        self.risk = Some(risk);
        self
    }

    pub fn with_strength(mut self, strength: f32) -> Self {
        self.strength = Some(strength);
        self
    }
}

#[async_trait]
pub trait SignalAggregator: Send + Sync {
    fn name(&self) -> &str;

    async fn gather(&self, cancel: &CancellationToken) -> Vec<Signal>;
}

/// Hands out a fixed list once.
#[derive(Default)]
pub struct StaticAggregator {
    signals: Mutex<Vec<Signal>>,
}

impl StaticAggregator {
    pub fn new(signals: Vec<Signal>) -> Self {
        Self {
            signals: Mutex::new(signals),
        }
    }

    pub fn push(&self, signal: Signal) {
        self.signals.lock().unwrap_or_else(|e| e.into_inner()).push(signal);
    }
}

#[async_trait]
impl SignalAggregator for StaticAggregator {
    fn name(&self) -> &str {
        "static"
    }

    async fn gather(&self, _cancel: &CancellationToken) -> Vec<Signal> {
        std::mem::take(&mut *self.signals.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

pub fn normalize_title(title: &str) -> String {
    title
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn tokens(text: &str) -> BTreeSet<String> {
    normalize_title(text).split(' ').filter(|w| !w.is_empty()).map(str::to_string).collect()
}

pub fn jaccard(a: &str, b: &str) -> f32 {
    let a = tokens(a);
    let b = tokens(b);
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let shared = a.intersection(&b).count() as f32;
    let union = a.union(&b).count() as f32;
    shared / union
}

/// Same normalized title, or title+description token overlap at or above
/// `threshold`.
pub fn is_near_duplicate(signal: &Signal, intention: &Intention, threshold: f32) -> bool {
    if normalize_title(&signal.title) == normalize_title(&intention.title) {
        return true;
    }
    let left = format!("{} {}", signal.title, signal.description);
    let right = format!("{} {}", intention.title, intention.description);
    jaccard(&left, &right) >= threshold
}
