//! Flow aggregation over a repository feeding the forecast.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use flowlens_analytics::{BacklogGap, FlowConfig, FlowWindowAggregator, ForecastEngine};
use flowlens_core::model::{Kind, Stage, StageId, StageStream, Transition, WorkItem, WorkItemId};
use flowlens_core::repo::{Dataset, InMemoryRepository};
use flowlens_core::{Period, windows_between};

fn at(month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, month, day, 10, 0, 0)
        .single()
        .expect("valid date")
}

fn date(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, month, day).expect("valid date")
}

fn repository() -> InMemoryRepository {
    let mut work_items = Vec::new();
    let mut transitions = Vec::new();
    // Eight items, two finishing each week through January.
    for index in 0..8u32 {
        let created = at(1, 1 + index / 2);
        let done = at(1, 3 + index / 2 * 7);
        let mut item = WorkItem::new(format!("D-{index}"), created);
        item.committed_at = Some(created);
        item.completed_at = Some(done);
        if index % 4 == 0 {
            item.kind = Kind::Bug;
        }
        transitions.push(Transition {
            id: format!("t-{index}"),
            work_item_id: WorkItemId::new(format!("D-{index}")),
            stage_id: StageId::new("dev"),
            entered_at: created,
            exited_at: Some(done),
        });
        work_items.push(item);
    }
    // Backlog still open.
    for index in 8..14u32 {
        work_items.push(WorkItem::new(format!("D-{index}"), at(1, 2)));
    }

    let dataset = Dataset {
        stages: vec![Stage {
            id: StageId::new("dev"),
            name: "Development".to_string(),
            order: 1,
            stream: StageStream::Downstream,
            queue: false,
            end_point: false,
        }],
        work_items,
        transitions,
        ..Dataset::default()
    };
    dataset.validate().expect("valid dataset");
    InMemoryRepository::from_dataset(dataset)
}

#[test]
fn january_flow_and_forecast() {
    let repo = repository();
    let windows = windows_between(date(1, 1), date(1, 28), Period::Week);
    assert_eq!(windows.len(), 4);

    let last = windows.last().expect("windows").end;
    let mut aggregator = FlowWindowAggregator::from_repository(&repo, last, FlowConfig::default());
    let snapshots = aggregator.accumulate_all(&windows).expect("ordered");

    let throughput: Vec<usize> = snapshots.iter().map(|s| s.throughput).collect();
    assert_eq!(throughput, [2, 2, 2, 2]);
    assert_eq!(snapshots[3].accumulated_throughput, 8);
    assert_eq!(snapshots[3].downstream_delivered_total, 8);
    assert_eq!(snapshots[3].bugs_closed_total, 2);
    assert_eq!(snapshots[3].cfd[0].count, 8);
    assert_eq!(aggregator.chart().len(), 4);

    let gap = BacklogGap::from_snapshots(&snapshots).expect("gap");
    assert_eq!(gap.known_scope, 14);
    assert_eq!(gap.delivered, 8);
    assert_eq!(gap.remaining, 6);

    let report = ForecastEngine::new(1_000)
        .with_seed(7)
        .report(&snapshots, Some(date(2, 19)), date(1, 29))
        .expect("report");
    // Constant throughput of two per week: three more weeks, always.
    assert!(report.forecast.distribution.iter().all(|weeks| *weeks == 3));
    assert_eq!(report.weeks_to_deadline, Some(3));
    assert!(report.deadline_odds.is_some_and(|odds| (odds - 1.0).abs() < 1e-9));
}

#[test]
fn range_starting_mid_history_carries_earlier_deliveries() {
    let mut early = WorkItem::new("A", at(1, 1));
    early.completed_at = Some(at(1, 3));
    let mut late = WorkItem::new("B", at(1, 1));
    late.completed_at = Some(at(1, 16));
    let repo = InMemoryRepository::from_dataset(Dataset {
        work_items: vec![early, late],
        ..Dataset::default()
    });

    let windows = windows_between(date(1, 15), date(1, 21), Period::Week);
    assert_eq!(windows.len(), 1);
    let mut aggregator =
        FlowWindowAggregator::from_repository(&repo, windows[0].end, FlowConfig::default());
    let snapshot = aggregator.accumulate(&windows[0], true).expect("first window");

    assert_eq!(snapshot.scope, 2);
    assert_eq!(snapshot.throughput, 1);
    assert_eq!(snapshot.accumulated_throughput, 2);

    let gap = BacklogGap::from_snapshots(&[snapshot]).expect("gap");
    assert_eq!(gap.known_scope, 2);
    assert_eq!(gap.remaining, 0);
}
