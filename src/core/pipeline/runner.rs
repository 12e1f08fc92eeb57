use crate::core::error::AppError;
use crate::core::pipeline::config::Configuration;
use crate::core::pipeline::conflict::{collision_error, find_collisions, Collision};
use crate::core::pipeline::output::{DryRunSink, OutputSink, WrittenOutput};
use crate::core::pipeline::walker::SourceWalker;
use crate::core::types::RunStatus;
use futures::future::join_all;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Structured outcome of one run; the caller decides what it means for the process.
#[derive(Debug, Default)]
pub struct RunReport {
    pub status: RunStatus,
    pub sources: usize,
    pub outputs: Vec<WrittenOutput>,
    /// Outputs whose chain ran but whose destination was falsy.
    pub discarded: usize,
    pub errors: Vec<AppError>,
    pub collisions: Vec<Collision>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    pub fn exit_code(&self) -> u8 {
        match self.status {
            RunStatus::Succeeded => 0,
            RunStatus::Collided => 2,
            RunStatus::Failed | RunStatus::Pending => 1,
        }
    }

    pub fn summary(&self) -> String {
        let elapsed = humantime::format_duration(Duration::from_millis(
            self.elapsed.as_millis() as u64,
        ));
        match self.status {
            RunStatus::Collided => format!(
                "aborted: {} colliding destination(s), nothing written ({})",
                self.collisions.len(),
                elapsed
            ),
            _ => format!(
                "{} output(s) from {} source(s), {} discarded, {} error(s) in {}",
                self.outputs.len(),
                self.sources,
                self.discarded,
                self.errors.len(),
                elapsed
            ),
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "status": self.status,
            "sources": self.sources,
            "discarded": self.discarded,
            "elapsed_ms": self.elapsed.as_millis() as u64,
            "outputs": self.outputs,
            "collisions": self.collisions,
            "errors": self.errors.iter().map(|err| json!({
                "code": err.code,
                "category": err.category,
                "message": err.message,
                "context": err.context,
            })).collect::<Vec<_>>(),
        })
    }
}

/// Collect every output, refuse to write anything on a collision, then
/// materialize all outputs concurrently.
///
/// Transform and write failures are isolated per output and aggregated in the
/// report.
pub async fn run(
    config: &Configuration,
    walker: &dyn SourceWalker,
    sink: &dyn OutputSink,
) -> RunReport {
    let started = Instant::now();
    tracing::info!(
        sources = config.source_dirs().len(),
        output = %config.output_root().display(),
        "run started"
    );

    let collected = config.collect_outputs(walker).await;
    let mut report = RunReport {
        sources: collected.sources,
        errors: collected.errors,
        ..RunReport::default()
    };

    let collisions = find_collisions(&collected.outputs);
    if !collisions.is_empty() {
        let error = collision_error(&collisions);
        tracing::warn!(collisions = collisions.len(), "destination collision, nothing written");
        report.errors.push(error);
        report.collisions = collisions;
        report.status = RunStatus::Collided;
        report.elapsed = started.elapsed();
        return report;
    }

    let results = join_all(
        collected
            .outputs
            .iter()
            .map(|output| output.materialize(sink)),
    )
    .await;
    let mut failed = Vec::new();
    for result in results {
        match result {
            Ok(Some(written)) => report.outputs.push(written),
            Ok(None) => report.discarded += 1,
            Err(err) => {
                tracing::warn!(error = %err, "output failed");
                failed.push(err);
            }
        }
    }
    report.errors.extend(collapse_shared_failures(failed));
    report.outputs.sort_by(|a, b| a.destination.cmp(&b.destination));

    report.status = if report.errors.is_empty() {
        RunStatus::Succeeded
    } else {
        RunStatus::Failed
    };
    report.elapsed = started.elapsed();
    tracing::info!(
        status = ?report.status,
        outputs = report.outputs.len(),
        errors = report.errors.len(),
        "run finished"
    );
    report
}

/// Keep one error per `(source, root cause)`; a failed read or parent chain
/// otherwise shows up once for every output depending on it.
fn collapse_shared_failures(errors: Vec<AppError>) -> Vec<AppError> {
    let mut kept: Vec<AppError> = Vec::new();
    let mut counts: Vec<usize> = Vec::new();
    let mut seen: HashMap<(String, String, String), usize> = HashMap::new();
    for error in errors {
        let key = (
            error.context.get("source").cloned().unwrap_or_default(),
            error.root_code().to_string(),
            error.chain().pop().unwrap_or_default(),
        );
        if key.0.is_empty() {
            kept.push(error);
            counts.push(1);
            continue;
        }
        match seen.get(&key) {
            Some(&index) => counts[index] += 1,
            None => {
                seen.insert(key, kept.len());
                kept.push(error);
                counts.push(1);
            }
        }
    }
    kept.into_iter()
        .zip(counts)
        .map(|(error, count)| {
            if count > 1 {
                error.with_context("affected_outputs", count.to_string())
            } else {
                error
            }
        })
        .collect()
}

/// Same as [`run`] with every write discarded: matching, conflict detection and
/// transforms all happen, the filesystem is left alone.
pub async fn plan(config: &Configuration, walker: &dyn SourceWalker) -> RunReport {
    run(config, walker, &DryRunSink).await
}
