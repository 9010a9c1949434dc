use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};

use crate::blurring::domain::blur_backend::BackendKind;
use crate::pipeline::capture::PresentationSink;
use crate::shared::blur_config::BlurConfig;
use crate::shared::error::BlurError;
use crate::shared::pixel_buffer::PixelBuffer;

pub type TaskId = u64;

/// Lifecycle of one backdrop task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskState {
    Idle = 0,
    Capturing = 1,
    Downscaling = 2,
    Blurring = 3,
    Done = 4,
    Cancelled = 5,
    Failed = 6,
}

/// Task state shared between the owning context and the worker.
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new(state: TaskState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn set(&self, state: TaskState) {
        self.0.store(state as u8, Ordering::Release);
    }

    pub(crate) fn get(&self) -> TaskState {
        match self.0.load(Ordering::Acquire) {
            1 => TaskState::Capturing,
            2 => TaskState::Downscaling,
            3 => TaskState::Blurring,
            4 => TaskState::Done,
            5 => TaskState::Cancelled,
            6 => TaskState::Failed,
            _ => TaskState::Idle,
        }
    }
}

/// What a finished task cost, for callers that want to verify behavior
/// (most usefully: which backend actually ran).
#[derive(Clone, Debug)]
pub struct BlurMetrics {
    pub elapsed: Duration,
    /// Bytes held by the captured snapshot.
    pub capture_bytes: usize,
    /// Bytes held by the downscaled buffer the blur ran on.
    pub downscale_bytes: usize,
    /// Backend that actually produced the pixels.
    pub backend: BackendKind,
    /// True when the accelerated path failed and the stack blur stepped in.
    pub fell_back: bool,
}

/// Final pixel buffer plus metrics, delivered once per successful task.
#[derive(Debug)]
pub struct BlurResult {
    pub buffer: PixelBuffer,
    pub metrics: BlurMetrics,
}

/// Terminal event of a task. Sent exactly once.
#[derive(Debug)]
pub enum TaskOutcome {
    Done(BlurResult),
    Cancelled,
    Failed(BlurError),
}

/// A queued unit of work owned by the worker: one buffer moving through
/// downscale and blur, with the cancellation flag both sides can see.
pub(crate) struct BlurTask {
    pub id: TaskId,
    pub config: BlurConfig,
    pub buffer: PixelBuffer,
    pub state: Arc<StateCell>,
    pub cancelled: Arc<AtomicBool>,
    pub outcome_tx: Sender<TaskOutcome>,
    pub started: Instant,
    pub capture_bytes: usize,
}

/// Caller-side view of an in-flight task.
///
/// The terminal outcome arrives over a channel drained on whatever thread
/// the caller chooses, typically the one that started the task, so
/// delivery happens on the caller's execution context rather than the
/// worker's.
pub struct TaskHandle {
    pub(crate) id: TaskId,
    pub(crate) state: Arc<StateCell>,
    pub(crate) cancelled: Arc<AtomicBool>,
    pub(crate) outcome_rx: Receiver<TaskOutcome>,
}

impl TaskHandle {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn state(&self) -> TaskState {
        self.state.get()
    }

    /// Request cooperative cancellation. The worker notices at the next
    /// stage boundary or blur row, releases the task's buffer, and emits
    /// [`TaskOutcome::Cancelled`]; no completion callback runs.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// The terminal outcome, if it has already arrived. The outcome is a
    /// single message: whoever receives it first consumes it.
    pub fn try_outcome(&self) -> Option<TaskOutcome> {
        self.outcome_rx.try_recv().ok()
    }

    /// Block until the terminal outcome arrives. A disconnected worker is
    /// reported as cancellation, which is the only way it can happen.
    pub fn wait_outcome(&self) -> TaskOutcome {
        self.outcome_rx.recv().unwrap_or(TaskOutcome::Cancelled)
    }

    /// Block until the task terminates and hand a successful result to the
    /// sink. The sink is invoked on the calling thread, at most once.
    pub fn deliver(self, sink: &mut dyn PresentationSink) -> TaskState {
        match self.wait_outcome() {
            TaskOutcome::Done(result) => {
                sink.accept(result);
                TaskState::Done
            }
            TaskOutcome::Cancelled => TaskState::Cancelled,
            TaskOutcome::Failed(_) => TaskState::Failed,
        }
    }
}
