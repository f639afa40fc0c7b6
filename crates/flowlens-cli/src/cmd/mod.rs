pub mod effort;
pub mod flow;
pub mod forecast;
pub mod hours;

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use std::path::Path;
use tracing::debug;

use flowlens_core::ErrorCode;
use flowlens_core::repo::{Dataset, FlowRepository, InMemoryRepository, ModelError, RepoError};
use flowlens_analytics::FlowError;
use flowlens_effort::EffortError;

/// Load and validate a dataset file into a repository.
pub fn load_repository(path: &Path) -> anyhow::Result<InMemoryRepository> {
    let dataset =
        Dataset::load(path).with_context(|| format!("failed to load {}", path.display()))?;
    debug!(
        items = dataset.work_items.len(),
        transitions = dataset.transitions.len(),
        assignments = dataset.assignments.len(),
        "dataset loaded"
    );
    Ok(InMemoryRepository::from_dataset(dataset))
}

/// First creation date to the last recorded event date.
pub fn observed_range<R: FlowRepository + ?Sized>(repo: &R) -> Option<(NaiveDate, NaiveDate)> {
    let items = repo.work_items();
    let first = items.iter().map(|item| item.created_at).min()?;
    let last = items
        .iter()
        .flat_map(|item| {
            [
                Some(item.created_at),
                item.committed_at,
                item.completed_at,
                item.discarded_at,
            ]
        })
        .flatten()
        .max()
        .unwrap_or(first);
    Some((first.date_naive(), last.date_naive()))
}

pub fn now_or(now: Option<DateTime<Utc>>) -> DateTime<Utc> {
    now.unwrap_or_else(Utc::now)
}

/// Stable engine error code carried anywhere in an error chain.
pub fn error_code(err: &anyhow::Error) -> Option<ErrorCode> {
    err.chain().find_map(|cause| {
        if let Some(model) = cause.downcast_ref::<ModelError>() {
            Some(model.code())
        } else if let Some(effort) = cause.downcast_ref::<EffortError>() {
            Some(effort.code())
        } else if let Some(repo) = cause.downcast_ref::<RepoError>() {
            Some(repo.code())
        } else {
            cause.downcast_ref::<FlowError>().map(FlowError::code)
        }
    })
}
