use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use flowlens_core::model::{Kind, StageId};

/// Items that reached a stage (or any later one) by a window's end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageCount {
    pub stage_id: StageId,
    pub name: String,
    pub count: usize,
}

/// Flow metrics for one window plus the running totals up to its end.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSnapshot {
    pub label: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,

    pub scope: usize,
    pub throughput: usize,
    pub accumulated_throughput: usize,
    pub throughput_by_kind: BTreeMap<Kind, usize>,

    /// Cumulative flow per stage, in pipeline order.
    pub cfd: Vec<StageCount>,

    pub bugs_opened: usize,
    pub bugs_closed: usize,
    pub bugs_opened_total: usize,
    pub bugs_closed_total: usize,
    /// Bugs among all items created so far, as a percentage.
    pub bugs_share: f64,

    pub upstream_delivered: usize,
    pub downstream_delivered: usize,
    pub upstream_delivered_total: usize,
    pub downstream_delivered_total: usize,

    /// Commitment-to-completion business hours of items finished here.
    pub lead_times_hours: Vec<f64>,
    pub lead_time_p80: f64,
    pub lead_time_p80_to_date: f64,

    /// Touch time over touch plus queue time, as a percentage.
    pub flow_efficiency: f64,

    /// Most recent throughput samples, oldest first.
    pub monte_carlo_samples: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageSeries {
    pub stage_id: StageId,
    pub name: String,
    pub counts: Vec<usize>,
}

/// Chart-ready series, one entry per charted window.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChartSeries {
    pub labels: Vec<String>,
    pub scope: Vec<usize>,
    pub throughput: Vec<usize>,
    pub accumulated_throughput: Vec<usize>,
    pub cfd: Vec<StageSeries>,
    pub bugs_share: Vec<f64>,
    pub lead_time_p80: Vec<f64>,
    pub flow_efficiency: Vec<f64>,
}

impl ChartSeries {
    pub(crate) fn push(&mut self, snapshot: &MetricSnapshot) {
        self.labels.push(snapshot.label.clone());
        self.scope.push(snapshot.scope);
        self.throughput.push(snapshot.throughput);
        self.accumulated_throughput
            .push(snapshot.accumulated_throughput);
        for (series, stage) in self.cfd.iter_mut().zip(&snapshot.cfd) {
            series.counts.push(stage.count);
        }
        self.bugs_share.push(snapshot.bugs_share);
        self.lead_time_p80.push(snapshot.lead_time_p80);
        self.flow_efficiency.push(snapshot.flow_efficiency);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
