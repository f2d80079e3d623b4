use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::document::SourceDocument;
use crate::error::ToolInvocationError;
use crate::resolver::ResolvedDiagnostic;
use crate::runner::ValidationRunner;

/// Anything that can perform one blocking validation pass.
pub trait Validate: Send + Sync + 'static {
    fn validate(
        &self,
        filename: Option<&Path>,
        document: &SourceDocument,
    ) -> Result<Vec<ResolvedDiagnostic>, ToolInvocationError>;
}

impl Validate for ValidationRunner {
    fn validate(
        &self,
        filename: Option<&Path>,
        document: &SourceDocument,
    ) -> Result<Vec<ResolvedDiagnostic>, ToolInvocationError> {
        self.run(filename, document)
    }
}

/// Snapshot of a document at the moment validation was requested.
#[derive(Debug, Clone)]
pub struct ValidationRequest {
    pub revision: u64,
    pub filename: Option<PathBuf>,
    pub document: Arc<SourceDocument>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Queued,
    Running,
    Completed,
    Failed,
}

/// Result of one request, tagged with the revision it was computed against.
#[derive(Debug)]
pub struct ValidationOutcome {
    pub revision: u64,
    pub result: Result<Vec<ResolvedDiagnostic>, ToolInvocationError>,
}

impl ValidationOutcome {
    pub fn state(&self) -> RequestState {
        match self.result {
            Ok(_) => RequestState::Completed,
            Err(_) => RequestState::Failed,
        }
    }
}

// AIDEV-NOTE: Fixed pool of worker threads fed by a flume queue. Every request runs
// (no coalescing, no cancellation); outcomes come back on a channel that only the
// interactive thread drains, so display state is never touched from a worker.
pub struct ValidationScheduler {
    jobs: flume::Sender<ValidationRequest>,
    outcomes: flume::Receiver<ValidationOutcome>,
}

impl ValidationScheduler {
    pub fn new<V: Validate>(validator: Arc<V>, workers: usize) -> Self {
        let (jobs, job_receiver) = flume::unbounded::<ValidationRequest>();
        let (outcome_sender, outcomes) = flume::unbounded();

        for id in 0..workers.max(1) {
            let validator = Arc::clone(&validator);
            let job_receiver = job_receiver.clone();
            let outcome_sender = outcome_sender.clone();
            // Workers are detached; they stop once the scheduler drops its job sender
            let spawned = thread::Builder::new()
                .name(format!("glsv-worker-{id}"))
                .spawn(move || worker_loop(id, validator, job_receiver, outcome_sender));
            if let Err(e) = spawned {
                tracing::error!("could not start validation worker: {e}");
            }
        }

        Self { jobs, outcomes }
    }

    /// Queue a request; never blocks the caller.
    pub fn submit(&self, request: ValidationRequest) -> RequestState {
        let revision = request.revision;
        match self.jobs.send(request) {
            Ok(()) => {
                tracing::debug!(revision, state = ?RequestState::Queued, "validation queued");
                RequestState::Queued
            }
            Err(_) => {
                tracing::error!(revision, "no validation workers left, request dropped");
                RequestState::Failed
            }
        }
    }

    /// Outcomes that are ready now, in completion order.
    pub fn take_ready(&self) -> Vec<ValidationOutcome> {
        self.outcomes.try_iter().collect()
    }

    /// Block until the next outcome arrives; `None` timeout waits indefinitely.
    pub fn wait_next(&self, timeout: Option<Duration>) -> Option<ValidationOutcome> {
        match timeout {
            Some(timeout) => self.outcomes.recv_timeout(timeout).ok(),
            None => self.outcomes.recv().ok(),
        }
    }
}

fn worker_loop<V: Validate>(
    id: usize,
    validator: Arc<V>,
    jobs: flume::Receiver<ValidationRequest>,
    outcomes: flume::Sender<ValidationOutcome>,
) {
    while let Ok(request) = jobs.recv() {
        let span = tracing::debug_span!("validation", revision = request.revision, worker = id);
        let _guard = span.enter();

        tracing::debug!(state = ?RequestState::Running, "validation started");
        let result = validator.validate(request.filename.as_deref(), &request.document);
        let outcome = ValidationOutcome {
            revision: request.revision,
            result,
        };
        tracing::debug!(state = ?outcome.state(), "validation finished");

        if outcomes.send(outcome).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    use crate::document::Span;

    // The first call is slow, so a later submission can overtake it
    struct SlowFirst {
        calls: AtomicUsize,
    }

    impl Validate for SlowFirst {
        fn validate(
            &self,
            _filename: Option<&Path>,
            document: &SourceDocument,
        ) -> Result<Vec<ResolvedDiagnostic>, ToolInvocationError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call == 0 {
                thread::sleep(Duration::from_millis(300));
            }
            Ok(vec![ResolvedDiagnostic {
                span: document.line_span(0).unwrap_or(Span::new(0, 0)),
                line_index: 0,
                category: "error".to_string(),
                message: document.text().to_string(),
            }])
        }
    }

    struct AlwaysFails;

    impl Validate for AlwaysFails {
        fn validate(
            &self,
            _filename: Option<&Path>,
            _document: &SourceDocument,
        ) -> Result<Vec<ResolvedDiagnostic>, ToolInvocationError> {
            Err(ToolInvocationError::PermissionDenied {
                detail: "Permission denied".to_string(),
            })
        }
    }

    fn request(revision: u64, text: &str) -> ValidationRequest {
        ValidationRequest {
            revision,
            filename: None,
            document: Arc::new(SourceDocument::new(text)),
        }
    }

    #[test]
    fn test_submit_does_not_block() {
        let scheduler = ValidationScheduler::new(
            Arc::new(SlowFirst {
                calls: AtomicUsize::new(0),
            }),
            1,
        );
        let started = Instant::now();
        assert_eq!(scheduler.submit(request(1, "a")), RequestState::Queued);
        assert!(started.elapsed() < Duration::from_millis(200));

        let outcome = scheduler.wait_next(Some(Duration::from_secs(5))).unwrap();
        assert_eq!(outcome.revision, 1);
        assert_eq!(outcome.state(), RequestState::Completed);
    }

    #[test]
    fn test_overlapping_requests_complete_out_of_order() {
        let scheduler = ValidationScheduler::new(
            Arc::new(SlowFirst {
                calls: AtomicUsize::new(0),
            }),
            2,
        );
        scheduler.submit(request(3, "three"));
        // Give the first worker time to pick up revision 3 before 4 is queued
        thread::sleep(Duration::from_millis(50));
        scheduler.submit(request(4, "four"));

        let first = scheduler.wait_next(Some(Duration::from_secs(5))).unwrap();
        let second = scheduler.wait_next(Some(Duration::from_secs(5))).unwrap();

        assert_eq!(first.revision, 4);
        assert_eq!(second.revision, 3);
        assert!(scheduler.take_ready().is_empty());
    }

    #[test]
    fn test_every_request_gets_exactly_one_outcome() {
        let scheduler = ValidationScheduler::new(
            Arc::new(SlowFirst {
                calls: AtomicUsize::new(1),
            }),
            3,
        );
        for revision in 1..=5 {
            scheduler.submit(request(revision, "same text"));
        }

        let mut revisions: Vec<u64> = (0..5)
            .filter_map(|_| scheduler.wait_next(Some(Duration::from_secs(5))))
            .map(|outcome| outcome.revision)
            .collect();
        revisions.sort_unstable();

        assert_eq!(revisions, vec![1, 2, 3, 4, 5]);
        assert!(scheduler.wait_next(Some(Duration::from_millis(50))).is_none());
    }

    #[test]
    fn test_failures_are_delivered_as_outcomes() {
        let scheduler = ValidationScheduler::new(Arc::new(AlwaysFails), 1);
        scheduler.submit(request(7, "x"));

        let outcome = scheduler.wait_next(Some(Duration::from_secs(5))).unwrap();
        assert_eq!(outcome.revision, 7);
        assert_eq!(outcome.state(), RequestState::Failed);
    }
}
