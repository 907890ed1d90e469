//! JSON contracts of the explorer dashboard backend.
//!
//! The dashboard is not part of this service, but it is usually deployed
//! alongside it and reads two endpoints: `metrics` and `transactions`. These
//! types pin the shape of those responses so that a co-deployed backend
//! written against this crate stays wire-compatible with the dashboard.
//!
//! Every response is wrapped in an [`Envelope`]:
//!
//! ```json
//! {"type":"metrics","data":{...},"meta":{...}}
//! ```

use serde::{Deserialize, Serialize};

/// Wire wrapper tagging the payload with its kind plus free-form metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope<D, M> {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: D,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<M>,
}

impl<D, M> Envelope<D, M> {
    pub fn new(kind: impl Into<String>, data: D, meta: M) -> Self {
        Self {
            kind: kind.into(),
            data,
            meta: Some(meta),
        }
    }
}

/// Throughput snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub spot_tps: u64,
    pub peak_tps: u64,
    pub average_tps: u64,
    /// Transactions processed so far; divide by `progressMax` for a ratio.
    pub progress: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsMeta {
    pub test_state: TestPhase,
    pub test_start: u64,
    pub test_stop: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_next: Option<u64>,
    pub progress_max: u64,
}

pub type MetricsResponse = Envelope<Metrics, MetricsMeta>;

impl MetricsResponse {
    pub fn metrics(metrics: Metrics, state: TestState, progress_max: u64) -> Self {
        Envelope::new(
            "metrics",
            metrics,
            MetricsMeta {
                test_state: state.phase(),
                test_start: state.start(),
                test_stop: state.stop(),
                test_next: None,
                progress_max,
            },
        )
    }
}

/// Lifecycle phase of a throughput test.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestPhase {
    /// Nothing has been observed yet.
    #[default]
    Unknown,
    /// Measurement is on-going.
    Started,
    /// Measurement stopped; results can still be verified.
    Finished,
    /// Network shut down; only the recorded metrics remain.
    Terminated,
}

/// Test phase plus the timestamps (ms since epoch) it was entered and left.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TestState {
    phase: TestPhase,
    start: u64,
    stop: u64,
}

impl TestState {
    pub const fn phase(&self) -> TestPhase {
        self.phase
    }

    pub const fn start(&self) -> u64 {
        self.start
    }

    pub const fn stop(&self) -> u64 {
        self.stop
    }

    /// Advances the lifecycle given the latest system observation.
    ///
    /// - `Unknown` resolves to `Started`, `Finished`, or `Terminated`.
    /// - `Started` becomes `Finished` when measuring stops.
    /// - `Finished` becomes `Terminated` when the nodes disappear.
    /// - `Terminated` becomes `Started` when a new measurement begins.
    #[must_use]
    pub const fn observe(self, has_nodes: bool, is_measuring: bool, now: u64) -> Self {
        match self.phase {
            TestPhase::Unknown => {
                let phase = match (has_nodes, is_measuring) {
                    (true, true) => TestPhase::Started,
                    (true, false) => TestPhase::Finished,
                    (false, _) => TestPhase::Terminated,
                };
                Self {
                    phase,
                    start: now,
                    stop: now,
                }
            }
            TestPhase::Started if !is_measuring => Self {
                phase: TestPhase::Finished,
                start: self.start,
                stop: now,
            },
            TestPhase::Finished if !has_nodes => Self {
                phase: TestPhase::Terminated,
                ..self
            },
            TestPhase::Terminated if has_nodes && is_measuring => Self {
                phase: TestPhase::Started,
                start: now,
                stop: 0,
            },
            _ => self,
        }
    }
}

/// One imported transaction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionInfo {
    #[serde(rename = "bitcoinTransactionId")]
    pub id: String,
    #[serde(rename = "bitcoinBlockTimestamp")]
    pub timestamp: u64,
    /// Decimal amount, kept as a JSON number without rounding through `f64`
    /// on the way in.
    pub amount: serde_json::Number,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMeta {
    pub page: u32,
}

pub type TransactionPage = Envelope<Vec<TransactionInfo>, PageMeta>;

impl TransactionPage {
    pub fn transactions(items: Vec<TransactionInfo>, page: u32) -> Self {
        Envelope::new("transactions", items, PageMeta { page })
    }
}
