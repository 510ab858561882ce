//! Aggregation of streamed frame analyses into run state.
//!
//! Starting an analysis job is fire-and-forget on the wire: the backend never
//! pairs its pushes with the request that started them beyond a task id that
//! only becomes known once frames arrive. [`RunRegistry`] owns the currently
//! active run, pins it to the first task id seen, and fences out late frames
//! from runs that were superseded. [`RunHandle`] is the caller's frozen view:
//! it stays valid (and stops changing) once a newer run begins.

use std::collections::HashSet;
use std::sync::Arc;

use log::{debug, info};
use parking_lot::Mutex;
use streamlens_rs_protocol::{FrameAnalysis, Notification, RunSummary, TaskId};
use tokio::sync::watch;

/// Lifecycle of an analysis run as observed from pushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// The job was submitted; no frame has arrived yet.
    Pending,
    /// Frames are streaming in.
    Streaming,
    /// The run summary arrived.
    Complete,
}

/// Point-in-time copy of a run's aggregated state.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSnapshot {
    /// Accepted frames in arrival order, deduplicated by timestamp.
    pub frames: Vec<FrameAnalysis>,
    /// Run summary, if it has arrived.
    pub summary: Option<String>,
    /// Task id of the run, published when the end marker arrives.
    pub task_id: Option<TaskId>,
    /// Whether the end marker has been seen.
    pub ended: bool,
    /// Current lifecycle status.
    pub status: RunStatus,
    /// Monotonic run counter, for diagnostics.
    pub generation: u64,
}

/// Aggregated state of one run.
struct RunState {
    generation: u64,
    frames: Vec<FrameAnalysis>,
    seen_timestamps: HashSet<String>,
    summary: Option<String>,
    /// Task id the run was pinned to by its first frame.
    pinned_task: Option<TaskId>,
    /// Task id published by the end marker.
    task_id: Option<TaskId>,
    ended: bool,
    status: RunStatus,
}

impl RunState {
    fn new(generation: u64) -> Self {
        Self {
            generation,
            frames: Vec::new(),
            seen_timestamps: HashSet::new(),
            summary: None,
            pinned_task: None,
            task_id: None,
            ended: false,
            status: RunStatus::Pending,
        }
    }

    fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            frames: self.frames.clone(),
            summary: self.summary.clone(),
            task_id: self.task_id.clone(),
            ended: self.ended,
            status: self.status,
            generation: self.generation,
        }
    }
}

/// The registry's live run slot.
struct ActiveRun {
    state: Arc<Mutex<RunState>>,
    updates: watch::Sender<u64>,
}

impl ActiveRun {
    fn bump(&self) {
        self.updates.send_modify(|version| *version += 1);
    }
}

/// Caller-facing view of one analysis run.
///
/// The handle keeps the run readable after a newer run replaces it; a
/// replaced run simply stops receiving updates.
#[derive(Clone)]
pub struct RunHandle {
    state: Arc<Mutex<RunState>>,
    updates: watch::Receiver<u64>,
}

impl RunHandle {
    /// Copy the run's current aggregated state.
    pub fn snapshot(&self) -> RunSnapshot {
        self.state.lock().snapshot()
    }

    /// Accepted frames so far, in arrival order.
    pub fn frames(&self) -> Vec<FrameAnalysis> {
        self.state.lock().frames.clone()
    }

    /// Run summary, if it has arrived.
    pub fn summary(&self) -> Option<String> {
        self.state.lock().summary.clone()
    }

    /// Task id of the run, known once the end marker arrives.
    pub fn task_id(&self) -> Option<TaskId> {
        self.state.lock().task_id.clone()
    }

    /// Current lifecycle status.
    pub fn status(&self) -> RunStatus {
        self.state.lock().status
    }

    /// Watch for state changes; the value is a bumped version counter.
    pub fn updates(&self) -> watch::Receiver<u64> {
        self.updates.clone()
    }

    /// Wait for the end marker and return the published task id.
    ///
    /// Returns `None` if the run was replaced or the channel shut down before
    /// the marker arrived.
    pub async fn wait_for_end(&self) -> Option<TaskId> {
        let mut updates = self.updates.clone();
        loop {
            {
                let state = self.state.lock();
                if state.ended {
                    return state.task_id.clone();
                }
            }
            if updates.changed().await.is_err() {
                return self.state.lock().task_id.clone();
            }
        }
    }

    /// Wait for the run summary.
    ///
    /// Returns `None` if the run was replaced or the channel shut down before
    /// a summary arrived.
    pub async fn wait_for_summary(&self) -> Option<String> {
        let mut updates = self.updates.clone();
        loop {
            {
                let state = self.state.lock();
                if let Some(summary) = &state.summary {
                    return Some(summary.clone());
                }
            }
            if updates.changed().await.is_err() {
                return self.state.lock().summary.clone();
            }
        }
    }
}

/// Owns the active run and routes push notifications into it.
pub(crate) struct RunRegistry {
    active: Mutex<Option<ActiveRun>>,
    /// Task ids of superseded runs; their late frames are dropped.
    retired: Mutex<HashSet<TaskId>>,
    generation: Mutex<u64>,
}

impl RunRegistry {
    pub(crate) fn new() -> Self {
        Self {
            active: Mutex::new(None),
            retired: Mutex::new(HashSet::new()),
            generation: Mutex::new(0),
        }
    }

    /// Replace the active run with a fresh one and hand out its view.
    ///
    /// The previous run, if any, is frozen as-is and its task id retired so
    /// that frames still in flight cannot leak into the new run.
    pub(crate) fn begin(&self) -> RunHandle {
        let mut active = self.active.lock();
        if let Some(previous) = active.take() {
            let state = previous.state.lock();
            let task = state.pinned_task.clone().or_else(|| state.task_id.clone());
            if let Some(task) = task {
                debug!("retiring run (task_id={}, generation={})", task, state.generation);
                self.retired.lock().insert(task);
            }
        }

        let generation = {
            let mut counter = self.generation.lock();
            *counter += 1;
            *counter
        };
        info!("starting analysis run (generation={})", generation);
        let state = Arc::new(Mutex::new(RunState::new(generation)));
        let (updates_tx, updates_rx) = watch::channel(0);
        *active = Some(ActiveRun {
            state: state.clone(),
            updates: updates_tx,
        });
        RunHandle {
            state,
            updates: updates_rx,
        }
    }

    /// Route one push notification into the active run.
    pub(crate) fn ingest(&self, notification: Notification) {
        match notification {
            Notification::Frame(frame) => self.ingest_frame(frame),
            Notification::Summary(summary) => self.ingest_summary(summary),
        }
    }

    fn ingest_frame(&self, frame: FrameAnalysis) {
        if self.retired.lock().contains(&frame.task_id) {
            debug!(
                "dropping frame from retired run (task_id={}, timestamp={})",
                frame.task_id, frame.timestamp
            );
            return;
        }

        let active = self.active.lock();
        let Some(run) = active.as_ref() else {
            debug!("dropping frame with no active run (task_id={})", frame.task_id);
            return;
        };

        let mut state = run.state.lock();
        match &state.pinned_task {
            Some(pinned) if *pinned != frame.task_id => {
                debug!(
                    "dropping frame from foreign task (pinned={}, task_id={})",
                    pinned, frame.task_id
                );
                return;
            }
            None => state.pinned_task = Some(frame.task_id.clone()),
            Some(_) => {}
        }

        if frame.is_end() {
            info!(
                "analysis run ended (task_id={}, frames={})",
                frame.task_id,
                state.frames.len()
            );
            state.task_id = Some(frame.task_id.clone());
            state.ended = true;
        } else if state.seen_timestamps.insert(frame.timestamp.clone()) {
            if state.status == RunStatus::Pending {
                state.status = RunStatus::Streaming;
            }
            state.frames.push(frame);
        } else {
            debug!("dropping duplicate frame (timestamp={})", frame.timestamp);
            return;
        }

        drop(state);
        run.bump();
    }

    fn ingest_summary(&self, summary: RunSummary) {
        let active = self.active.lock();
        let Some(run) = active.as_ref() else {
            debug!("dropping summary with no active run");
            return;
        };

        let mut state = run.state.lock();
        info!("run summary received (chars={})", summary.summary_result.len());
        state.summary = Some(summary.summary_result);
        state.status = RunStatus::Complete;
        drop(state);
        run.bump();
    }
}
