use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cost incurred on behalf of a subject (infrastructure, GPU hours, models).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostSignal {
    pub subject_id: String,
    pub model: String,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub amount_usd: f64,
    pub idempotency_key: String,
    pub recorded_at: DateTime<Utc>,
}

/// Revenue attributed to a subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenueSignal {
    pub subject_id: String,
    pub source: String,
    pub amount_usd: f64,
    pub description: String,
    pub idempotency_key: String,
    pub recorded_at: DateTime<Utc>,
}

/// One journal line: either kind of signal, tagged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SignalKind {
    Cost(CostSignal),
    Revenue(RevenueSignal),
}

impl SignalKind {
    #[must_use]
    pub fn idempotency_key(&self) -> &str {
        match self {
            Self::Cost(c) => &c.idempotency_key,
            Self::Revenue(r) => &r.idempotency_key,
        }
    }

    #[must_use]
    pub fn subject_id(&self) -> &str {
        match self {
            Self::Cost(c) => &c.subject_id,
            Self::Revenue(r) => &r.subject_id,
        }
    }
}

/// Per-subject totals over a set of signals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalSummary {
    pub subject_id: String,
    pub cost_usd: f64,
    pub revenue_usd: f64,
    pub tokens: u64,
    pub last_model: Option<String>,
}

impl SignalSummary {
    /// Revenue over cost, or `None` when nothing has been spent yet.
    #[must_use]
    pub fn ratio(&self) -> Option<f64> {
        (self.cost_usd > 0.0).then(|| self.revenue_usd / self.cost_usd)
    }
}
