//! Background observation tracker.
//!
//! One long-running cooperative loop polls the device, classifies state
//! transitions, buffers snapshots, and periodically distills them into
//! observations. Request handlers read the bounded deques concurrently
//! through the accessors, which return newest-first copies.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use anyhow::{bail, Result};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use valet_config::{MemoryConfig, TrackerConfig};
use valet_device::{classify_transition, DeviceDriver, StateChangeKind, UiState};
use valet_memory::{MemoryType, Observation, StructuredStore};

use crate::embedder::EmbeddingGenerator;
use crate::inferencer::ObservationInferencer;
use crate::snapshot::{UiSnapshot, UiStateChange};

const CHANGES_CAPACITY: usize = 10;
const SNAPSHOTS_CAPACITY: usize = 50;
const OBSERVATIONS_CAPACITY: usize = 20;

/// Short sleep after a change — a burst of activity likely continues.
const BURST_SLEEP: Duration = Duration::from_millis(200);
/// Backoff after any error inside the loop; the loop never exits on error.
const ERROR_BACKOFF: Duration = Duration::from_secs(5);
/// Grace period for the loop to observe `running = false` before the task
/// is cancelled.
const STOP_DEADLINE: Duration = Duration::from_secs(5);

/// Everything the loop mutates, behind one lock. Accessors copy out.
#[derive(Default)]
struct TrackerState {
    changes: VecDeque<UiStateChange>,
    snapshots: VecDeque<UiSnapshot>,
    observations: VecDeque<Observation>,
    snapshot_counter: usize,
    last_state: Option<UiState>,
    /// Whether the current tail observation has already been flushed —
    /// guards against persisting the same observation twice.
    tail_persisted: bool,
}

/// Deque sizes exposed by the monitoring overview route.
#[derive(Debug, Clone, Serialize)]
pub struct MonitoringOverview {
    pub running: bool,
    pub state_changes: usize,
    pub state_snapshots: usize,
    pub observations: usize,
    pub snapshot_counter: usize,
}

pub struct ObservationTracker {
    device: Arc<dyn DeviceDriver>,
    inferencer: ObservationInferencer,
    embedder: EmbeddingGenerator,
    structured: Arc<dyn StructuredStore>,
    persist_structured: bool,
    context_size: usize,
    state: Mutex<TrackerState>,
    running: AtomicBool,
    poll_interval: StdMutex<f64>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ObservationTracker {
    pub fn new(
        device: Arc<dyn DeviceDriver>,
        inferencer: ObservationInferencer,
        embedder: EmbeddingGenerator,
        structured: Arc<dyn StructuredStore>,
        memory_config: &MemoryConfig,
        tracker_config: &TrackerConfig,
    ) -> Self {
        Self {
            device,
            inferencer,
            embedder,
            structured,
            persist_structured: memory_config.persist_structured,
            context_size: tracker_config.context_size.max(1),
            state: Mutex::new(TrackerState::default()),
            running: AtomicBool::new(false),
            poll_interval: StdMutex::new(tracker_config.poll_interval_secs),
            task: Mutex::new(None),
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────────

    /// Launch the main loop as a background task. Fails when a loop is
    /// already running.
    pub async fn start(self: Arc<Self>, poll_interval: f64) -> Result<()> {
        let mut task = self.task.lock().await;
        if let Some(handle) = task.as_ref() {
            if !handle.is_finished() {
                bail!("observation tracking already running");
            }
        }

        if let Ok(mut interval) = self.poll_interval.lock() {
            *interval = poll_interval;
        }
        self.running.store(true, Ordering::SeqCst);

        let tracker = Arc::clone(&self);
        *task = Some(tokio::spawn(async move {
            tracker.run_loop(poll_interval).await;
        }));
        info!(poll_interval, "observation tracking started");
        Ok(())
    }

    /// Stop polling but keep all buffered state. Returns whether tracking
    /// was running before the call.
    pub async fn pause(&self) -> bool {
        let was_running = self.running.swap(false, Ordering::SeqCst);
        // let the loop observe the flag at its next wakeup
        tokio::time::sleep(Duration::from_millis(100)).await;
        was_running
    }

    /// Stop the loop (5 s grace, then cancel), flush the tail observation,
    /// and clear all buffered state.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);

        let handle = self.task.lock().await.take();
        if let Some(mut handle) = handle {
            if tokio::time::timeout(STOP_DEADLINE, &mut handle).await.is_err() {
                warn!("tracking loop did not exit in time, cancelling");
                handle.abort();
            }
        }

        self.flush_tail().await;

        let mut state = self.state.lock().await;
        state.changes.clear();
        state.snapshots.clear();
        state.observations.clear();
        state.snapshot_counter = 0;
        state.last_state = None;
        state.tail_persisted = false;
        info!("observation tracking stopped");
    }

    /// Feed a pre-recorded snapshot sequence through the same counter →
    /// inference → save path the live loop uses, then flush the tail.
    /// Tracking is paused for the duration and resumed afterwards when it
    /// was running.
    pub async fn replay(self: Arc<Self>, snapshots: Vec<UiSnapshot>) -> Result<()> {
        let was_running = self.pause().await;
        let prior_interval = self
            .poll_interval
            .lock()
            .map(|interval| *interval)
            .unwrap_or(1.0);

        for snapshot in snapshots {
            let window = {
                let mut state = self.state.lock().await;
                push_bounded(&mut state.snapshots, snapshot, SNAPSHOTS_CAPACITY);
                state.snapshot_counter += 1;
                if state.snapshot_counter >= self.context_size {
                    state.snapshot_counter = 0;
                    Some(recent_window(&state.snapshots, self.context_size))
                } else {
                    None
                }
            };
            if let Some(window) = window {
                if let Some(new_observation) = self.infer_observation(&window).await {
                    self.save_and_rotate(new_observation).await;
                }
            }
        }

        self.flush_tail().await;

        if was_running {
            Arc::clone(&self).start(prior_interval).await?;
        }
        Ok(())
    }

    // ── Main loop ────────────────────────────────────────────────────────

    async fn run_loop(self: Arc<Self>, poll_interval: f64) {
        let idle_sleep = Duration::from_secs_f64(poll_interval.max(0.01));
        info!("tracking loop entered");

        while self.running.load(Ordering::SeqCst) {
            match self.poll_once().await {
                Ok(changed) => {
                    let sleep_for = if changed { BURST_SLEEP } else { idle_sleep };
                    tokio::time::sleep(sleep_for).await;
                }
                Err(e) => {
                    error!(error = %e, "observation tracking error, backing off");
                    tokio::time::sleep(ERROR_BACKOFF).await;
                }
            }
        }
        info!("tracking loop exited");
    }

    /// One poll: detect a transition, buffer it, and run inference when the
    /// snapshot window fills. Returns whether a real change was observed.
    async fn poll_once(&self) -> Result<bool> {
        let current = self.device.get_state().await?;

        let window = {
            let mut state = self.state.lock().await;
            let Some(last) = state.last_state.take() else {
                // first poll establishes the baseline
                state.last_state = Some(current);
                return Ok(false);
            };

            let kind = classify_transition(&last, &current);
            if kind == StateChangeKind::NoChange {
                state.last_state = Some(current);
                return Ok(false);
            }

            let change = UiStateChange::observed(last, current.clone(), kind);
            let snapshot = UiSnapshot::from_change(&change);
            push_bounded(&mut state.changes, change, CHANGES_CAPACITY);
            push_bounded(&mut state.snapshots, snapshot, SNAPSHOTS_CAPACITY);
            state.snapshot_counter += 1;
            state.last_state = Some(current);

            if state.snapshot_counter >= self.context_size {
                state.snapshot_counter = 0;
                Some(recent_window(&state.snapshots, self.context_size))
            } else {
                None
            }
        };

        if let Some(window) = window {
            if let Some(new_observation) = self.infer_observation(&window).await {
                self.save_and_rotate(new_observation).await;
            }
        }
        Ok(true)
    }

    /// Two-step inference policy: try to fold the window into the current
    /// tail; when that reports no meaningful update, try to create a new
    /// observation. Returns the new observation when one was created,
    /// `None` when the tail was updated in place or nothing emerged.
    async fn infer_observation(&self, window: &[UiSnapshot]) -> Option<Observation> {
        let tail = { self.state.lock().await.observations.back().cloned() };

        if let Some(tail) = tail {
            match self.inferencer.update_observation(&tail, window).await {
                Ok(Some(updated)) => {
                    let mut state = self.state.lock().await;
                    if let Some(slot) = state.observations.back_mut() {
                        if slot.id() == tail.id() {
                            *slot = updated;
                            state.tail_persisted = false;
                        }
                    }
                    return None;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "update inference failed");
                    return None;
                }
            }
        }

        match self.inferencer.create_new_observation(window).await {
            Ok(observation) => observation,
            Err(e) => {
                warn!(error = %e, "create inference failed");
                None
            }
        }
    }

    /// Persist the current tail (once), then append the new observation.
    /// A deque eviction at capacity drops the oldest observation without
    /// persistence — rotation persists the previous *tail*, not the head.
    async fn save_and_rotate(&self, new_observation: Observation) {
        let tail_to_persist = {
            let mut state = self.state.lock().await;
            if state.tail_persisted {
                None
            } else {
                let tail = state.observations.back().cloned();
                if tail.is_some() {
                    state.tail_persisted = true;
                }
                tail
            }
        };
        if let Some(tail) = tail_to_persist {
            self.persist_observation(&tail).await;
        }

        let mut state = self.state.lock().await;
        push_bounded(&mut state.observations, new_observation, OBSERVATIONS_CAPACITY);
        state.tail_persisted = false;
    }

    /// Flush the current tail observation if it has not been persisted yet.
    async fn flush_tail(&self) {
        let tail = {
            let mut state = self.state.lock().await;
            if state.tail_persisted {
                None
            } else {
                let tail = state.observations.back().cloned();
                if tail.is_some() {
                    state.tail_persisted = true;
                }
                tail
            }
        };
        if let Some(tail) = tail {
            self.persist_observation(&tail).await;
        }
    }

    async fn persist_observation(&self, observation: &Observation) {
        if self.persist_structured {
            if let Err(e) = self
                .structured
                .insert_observation(observation.to_row())
                .await
            {
                error!(id = %observation.id(), error = %e, "structured store write failed");
            }
        }
        if let Err(e) = self
            .embedder
            .generate_and_save(observation.id(), observation.node())
            .await
        {
            // tolerable loss of this one observation from semantic memory
            error!(id = %observation.id(), error = %e, "embedding flush failed");
        }
    }

    // ── Accessors ────────────────────────────────────────────────────────

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Newest-first copy of the observations deque.
    pub async fn get_observations(
        &self,
        limit: Option<usize>,
        memory_type: Option<MemoryType>,
    ) -> Vec<Observation> {
        let state = self.state.lock().await;
        state
            .observations
            .iter()
            .rev()
            .filter(|o| memory_type.map(|mt| o.memory_type() == mt).unwrap_or(true))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    /// Newest-first copy of the state-changes deque.
    pub async fn get_state_changes(
        &self,
        limit: Option<usize>,
        change_kind: Option<StateChangeKind>,
    ) -> Vec<UiStateChange> {
        let state = self.state.lock().await;
        state
            .changes
            .iter()
            .rev()
            .filter(|c| change_kind.map(|k| c.change_kind == k).unwrap_or(true))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    /// Newest-first copy of the snapshots deque.
    pub async fn get_state_snapshots(&self, limit: Option<usize>) -> Vec<UiSnapshot> {
        let state = self.state.lock().await;
        state
            .snapshots
            .iter()
            .rev()
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    pub async fn clear_observations(&self) {
        let mut state = self.state.lock().await;
        state.observations.clear();
        state.tail_persisted = false;
    }

    pub async fn clear_state_changes(&self) {
        self.state.lock().await.changes.clear();
    }

    pub async fn clear_state_snapshots(&self) {
        let mut state = self.state.lock().await;
        state.snapshots.clear();
        state.snapshot_counter = 0;
    }

    pub async fn monitoring_overview(&self) -> MonitoringOverview {
        let state = self.state.lock().await;
        MonitoringOverview {
            running: self.is_running(),
            state_changes: state.changes.len(),
            state_snapshots: state.snapshots.len(),
            observations: state.observations.len(),
            snapshot_counter: state.snapshot_counter,
        }
    }
}

fn push_bounded<T>(deque: &mut VecDeque<T>, item: T, capacity: usize) {
    if deque.len() >= capacity {
        deque.pop_front();
    }
    deque.push_back(item);
}

/// Last `size` snapshots in chronological order.
fn recent_window(snapshots: &VecDeque<UiSnapshot>, size: usize) -> Vec<UiSnapshot> {
    let skip = snapshots.len().saturating_sub(size);
    snapshots.iter().skip(skip).cloned().collect()
}
