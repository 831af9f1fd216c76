// Job event log: every manager event becomes one structured log line

use recur_core::domain::JobEvent;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};

/// Log events until the manager's channel closes
pub async fn log_events(mut events: broadcast::Receiver<JobEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => log_event(&event),
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped = skipped, "Event log lagging, events dropped");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn log_event(event: &JobEvent) {
    let job = event.job_name.as_deref().unwrap_or("-");
    match &event.run {
        Some(run) => info!(
            job = %job,
            action = %event.action,
            status = %run.status,
            result = %run.result,
            duration_ms = (run.finished_at - run.started_at).num_milliseconds(),
            "Job event"
        ),
        None => info!(job = %job, action = %event.action, "Job event"),
    }
}
