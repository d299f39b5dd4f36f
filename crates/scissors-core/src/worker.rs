//! Off-thread segment computation for seed commits.
//!
//! The session never runs a commit search on the interactive thread when
//! driven through [`SegmentWorker`]. [`Session::begin_seed`] produces a
//! [`SegmentJob`] carrying shared handles to the field and cache; the
//! worker computes a pure [`SegmentResponse`] and the interactive side
//! hands it to [`Session::apply`], which drops it if a newer request has
//! superseded it in the meantime.
//!
//! [`Session::begin_seed`]: crate::Session::begin_seed
//! [`Session::apply`]: crate::Session::apply

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::anchor::{AnchorConfig, AutoAnchorPlanner, PlannedPath, TailHint};
use crate::cache::{CachedSearch, PathCache};
use crate::cost::CostFunctionKind;
use crate::gradient::GradientField;
use crate::search::SegmentSearch;
use crate::types::{GridCoord, ScissorsError};

/// What a pending seed commit needs computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentRequest {
    /// Session generation when the request was issued. A response is
    /// applied only while this is still the latest pending request.
    pub generation: u64,
    /// Last committed seed.
    pub start: GridCoord,
    /// Snapped click position, or the first seed for a closing request.
    pub end: GridCoord,
    /// `true` when the segment closes the contour back to the first seed.
    pub closing: bool,
}

/// A request plus everything needed to compute it off-thread.
#[derive(Debug, Clone)]
pub struct SegmentJob {
    /// The request being answered.
    pub request: SegmentRequest,
    /// Field the session held when the request was issued.
    pub field: Arc<GradientField>,
    /// Cache paired with `field`.
    pub cache: Arc<PathCache>,
    /// Cost model in effect.
    pub cost: CostFunctionKind,
    /// Planner tunables in effect.
    pub anchor: AnchorConfig,
    /// Tail of the committed path, for direction-consistency scoring.
    pub tail: TailHint,
}

/// Result of a [`SegmentJob`].
#[derive(Debug, Serialize, Deserialize)]
pub struct SegmentResponse {
    /// The request this answers.
    pub request: SegmentRequest,
    /// The planned path, or why it could not be computed.
    pub outcome: Result<PlannedPath, ScissorsError>,
    /// Wall-clock time spent computing (seconds).
    #[serde(with = "crate::diagnostics::duration_serde")]
    pub elapsed: Duration,
}

/// Compute a job's path: cached search, subdivided by the planner when
/// enabled.
///
/// # Errors
///
/// Propagates [`ScissorsError`] from the search.
pub fn compute_segment(job: &SegmentJob) -> Result<PlannedPath, ScissorsError> {
    let search = CachedSearch::new(&job.field, &job.cost, &job.cache);
    let SegmentRequest { start, end, .. } = job.request;
    if job.anchor.enabled {
        AutoAnchorPlanner::new(&job.field, &job.anchor).plan(&search, start, end, &job.tail)
    } else {
        Ok(PlannedPath::direct(search.search(start, end)?))
    }
}

/// Run a job to completion, converting a panic into
/// [`ScissorsError::Worker`].
#[must_use]
pub fn run_job(job: SegmentJob) -> SegmentResponse {
    let started = Instant::now();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| compute_segment(&job)))
        .unwrap_or_else(|payload| Err(ScissorsError::Worker(panic_message(payload.as_ref()))));
    SegmentResponse {
        request: job.request,
        outcome,
        elapsed: started.elapsed(),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "segment computation panicked".to_string())
}

/// One background thread answering [`SegmentJob`]s in submission order.
///
/// Dropping the worker closes its queue and joins the thread after the
/// job in progress (if any) finishes.
#[derive(Debug)]
pub struct SegmentWorker {
    jobs: Option<Sender<SegmentJob>>,
    responses: Receiver<SegmentResponse>,
    handle: Option<JoinHandle<()>>,
}

impl SegmentWorker {
    /// Start the background thread.
    ///
    /// # Errors
    ///
    /// Returns [`ScissorsError::Worker`] if the thread cannot be spawned.
    pub fn spawn() -> Result<Self, ScissorsError> {
        let (job_tx, job_rx) = mpsc::channel::<SegmentJob>();
        let (response_tx, response_rx) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("scissors-segment-worker".to_string())
            .spawn(move || {
                for job in job_rx {
                    let generation = job.request.generation;
                    let response = run_job(job);
                    tracing::debug!(
                        generation,
                        ok = response.outcome.is_ok(),
                        elapsed_ms = response.elapsed.as_secs_f64() * 1000.0,
                        "segment job finished"
                    );
                    if response_tx.send(response).is_err() {
                        break;
                    }
                }
            })
            .map_err(|e| ScissorsError::Worker(format!("failed to spawn worker thread: {e}")))?;
        Ok(Self {
            jobs: Some(job_tx),
            responses: response_rx,
            handle: Some(handle),
        })
    }

    /// Queue a job.
    ///
    /// # Errors
    ///
    /// Returns [`ScissorsError::Worker`] if the thread has stopped.
    pub fn submit(&self, job: SegmentJob) -> Result<(), ScissorsError> {
        self.jobs
            .as_ref()
            .ok_or_else(|| ScissorsError::Worker("worker is shut down".to_string()))?
            .send(job)
            .map_err(|_| ScissorsError::Worker("worker thread has stopped".to_string()))
    }

    /// A finished response, if one is ready.
    #[must_use]
    pub fn try_recv(&self) -> Option<SegmentResponse> {
        self.responses.try_recv().ok()
    }

    /// Wait up to `timeout` for the next response.
    ///
    /// # Errors
    ///
    /// Returns [`ScissorsError::Worker`] if the thread has stopped.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<SegmentResponse>, ScissorsError> {
        match self.responses.recv_timeout(timeout) {
            Ok(response) => Ok(Some(response)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                Err(ScissorsError::Worker("worker thread has stopped".to_string()))
            }
        }
    }
}

impl Drop for SegmentWorker {
    fn drop(&mut self) {
        self.jobs.take();
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            tracing::error!("segment worker thread panicked");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::GrayImage;

    use super::*;
    use crate::gradient::build_gradient_field;

    fn job(generation: u64, start: GridCoord, end: GridCoord) -> SegmentJob {
        SegmentJob {
            request: SegmentRequest {
                generation,
                start,
                end,
                closing: false,
            },
            field: Arc::new(build_gradient_field(&GrayImage::new(16, 16))),
            cache: Arc::new(PathCache::new(8).unwrap()),
            cost: CostFunctionKind::default(),
            anchor: AnchorConfig::default(),
            tail: TailHint::empty(),
        }
    }

    #[test]
    fn compute_segment_fills_cache() {
        let j = job(1, GridCoord::new(0, 0), GridCoord::new(5, 9));
        let plan = compute_segment(&j).unwrap();
        assert_eq!(plan.segments.len(), 1);
        assert!(j.cache.contains(GridCoord::new(0, 0), GridCoord::new(5, 9)));
    }

    #[test]
    fn run_job_reports_errors() {
        let response = run_job(job(2, GridCoord::new(0, 0), GridCoord::new(99, 0)));
        assert_eq!(response.request.generation, 2);
        assert!(matches!(
            response.outcome,
            Err(ScissorsError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn panic_payloads_become_messages() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn std::any::Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "segment computation panicked");
    }

    #[test]
    fn worker_round_trip_preserves_order() {
        let worker = SegmentWorker::spawn().unwrap();
        worker
            .submit(job(1, GridCoord::new(0, 0), GridCoord::new(3, 3)))
            .unwrap();
        worker
            .submit(job(2, GridCoord::new(3, 3), GridCoord::new(9, 1)))
            .unwrap();
        let first = worker
            .recv_timeout(Duration::from_secs(10))
            .unwrap()
            .unwrap();
        let second = worker
            .recv_timeout(Duration::from_secs(10))
            .unwrap()
            .unwrap();
        assert_eq!(first.request.generation, 1);
        assert_eq!(second.request.generation, 2);
        assert!(first.outcome.is_ok() && second.outcome.is_ok());
    }

    #[test]
    fn response_crosses_json_boundary() {
        let response = run_job(job(3, GridCoord::new(1, 1), GridCoord::new(4, 2)));
        let json = serde_json::to_string(&response).unwrap();
        let back: SegmentResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(back.request, response.request);
        assert_eq!(back.outcome.unwrap(), response.outcome.unwrap());
    }
}
