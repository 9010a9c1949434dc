use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};

use crate::blurring::domain::blur_backend::{BackendError, BackendKind, BlurBackend};
use crate::blurring::infrastructure::backend_factory;
use crate::blurring::infrastructure::stack_blur::StackBlurFilter;
use crate::pipeline::capture::CaptureSource;
use crate::pipeline::task::{
    BlurMetrics, BlurResult, BlurTask, StateCell, TaskHandle, TaskId, TaskOutcome, TaskState,
};
use crate::sampling::downscale_sampler::DownscaleSampler;
use crate::shared::blur_config::{BackendPreference, BlurConfig};
use crate::shared::error::BlurError;
use crate::shared::pixel_buffer::PixelBuffer;

/// Produces a backend for a preference. Swappable for tests.
pub type BackendFactory = Box<dyn Fn(BackendPreference) -> Box<dyn BlurBackend> + Send>;

/// Runs backdrop tasks on a dedicated worker thread.
///
/// Capture happens synchronously on the caller's thread when a task is
/// started; downscale and blur run on the worker. At most one task is live
/// per orchestrator: starting a new one cancels the previous task first, so
/// a stale backdrop can never overtake a fresh one.
pub struct BlurOrchestrator {
    job_tx: Option<Sender<BlurTask>>,
    worker: Option<JoinHandle<()>>,
    active: Option<Arc<AtomicBool>>,
    next_id: TaskId,
}

impl BlurOrchestrator {
    pub fn new() -> Self {
        Self::with_backend_factory(Box::new(backend_factory::create_backend))
    }

    pub fn with_backend_factory(factory: BackendFactory) -> Self {
        let (job_tx, job_rx) = unbounded::<BlurTask>();
        let worker = thread::spawn(move || worker_loop(job_rx, factory));
        Self {
            job_tx: Some(job_tx),
            worker: Some(worker),
            active: None,
            next_id: 0,
        }
    }

    /// Capture a snapshot and queue it for downscale and blur.
    ///
    /// A previous in-flight task is cancelled first. When capture itself
    /// fails the task terminates immediately, without touching the worker,
    /// and the handle already holds the `Failed` outcome.
    pub fn start_task(&mut self, config: BlurConfig, capture: &mut dyn CaptureSource) -> TaskHandle {
        self.cancel_active();

        self.next_id += 1;
        let id = self.next_id;
        let state = Arc::new(StateCell::new(TaskState::Capturing));
        let cancelled = Arc::new(AtomicBool::new(false));
        let (outcome_tx, outcome_rx) = bounded(1);
        let handle = TaskHandle {
            id,
            state: Arc::clone(&state),
            cancelled: Arc::clone(&cancelled),
            outcome_rx,
        };

        let started = Instant::now();
        let buffer = match capture.capture() {
            Ok(buffer) => buffer,
            Err(err) => {
                log::warn!("task {id}: snapshot capture failed: {err}");
                state.set(TaskState::Failed);
                let _ = outcome_tx.send(TaskOutcome::Failed(err));
                return handle;
            }
        };
        let capture_bytes = buffer.allocated_bytes();
        log::debug!(
            "task {id}: captured {}x{} ({capture_bytes} bytes)",
            buffer.width(),
            buffer.height()
        );

        let task = BlurTask {
            id,
            config,
            buffer,
            state,
            cancelled: Arc::clone(&cancelled),
            outcome_tx,
            started,
            capture_bytes,
        };
        self.active = Some(cancelled);
        if let Some(tx) = &self.job_tx {
            if tx.send(task).is_err() {
                log::error!("task {id}: blur worker is gone");
            }
        }
        handle
    }

    /// Cancel the task currently in flight, if any. The worker notices at
    /// its next check point; the task's handle reports `Cancelled`.
    pub fn cancel_active(&mut self) {
        if let Some(flag) = self.active.take() {
            flag.store(true, Ordering::Relaxed);
        }
    }
}

impl Default for BlurOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BlurOrchestrator {
    fn drop(&mut self) {
        self.cancel_active();
        self.job_tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn worker_loop(job_rx: Receiver<BlurTask>, factory: BackendFactory) {
    let sampler = DownscaleSampler::new();
    // Backends are probed once per preference and reused across tasks.
    let mut backends: HashMap<BackendPreference, Box<dyn BlurBackend>> = HashMap::new();
    while let Ok(task) = job_rx.recv() {
        let preference = task.config.backend();
        let backend = backends
            .entry(preference)
            .or_insert_with(|| factory(preference));
        run_task(task, &sampler, backend.as_ref());
    }
}

fn run_task(mut task: BlurTask, sampler: &DownscaleSampler, backend: &dyn BlurBackend) {
    let id = task.id;
    if task.cancelled.load(Ordering::Relaxed) {
        finish_cancelled(&mut task);
        return;
    }

    task.state.set(TaskState::Downscaling);
    let downscaled = match sampler.downscale(
        &task.buffer,
        task.config.downscale_factor(),
        task.config.bands(),
    ) {
        Ok(buffer) => buffer,
        Err(err) => {
            log::warn!("task {id}: downscale failed: {err}");
            finish_failed(&mut task, err);
            return;
        }
    };
    // The full-resolution snapshot is the big allocation; drop it as soon
    // as the downscaled copy exists.
    task.buffer.release();
    task.buffer = downscaled;
    log::debug!(
        "task {id}: downscaled to {}x{}",
        task.buffer.width(),
        task.buffer.height()
    );

    if task.cancelled.load(Ordering::Relaxed) {
        finish_cancelled(&mut task);
        return;
    }

    task.state.set(TaskState::Blurring);
    let (used, fell_back) = match run_blur(
        backend,
        &mut task.buffer,
        task.config.radius(),
        &task.cancelled,
    ) {
        Ok(result) => result,
        Err(BackendError::Cancelled) => {
            finish_cancelled(&mut task);
            return;
        }
        Err(err) => {
            // After fallback only buffer errors remain.
            let err = match err {
                BackendError::Buffer(inner) => inner,
                _ => BlurError::UseAfterRelease,
            };
            log::warn!("task {id}: blur failed: {err}");
            finish_failed(&mut task, err);
            return;
        }
    };

    // A cancel that lands during the final blur rows still wins: the
    // result is discarded, never delivered.
    if task.cancelled.load(Ordering::Relaxed) {
        finish_cancelled(&mut task);
        return;
    }

    let metrics = BlurMetrics {
        elapsed: task.started.elapsed(),
        capture_bytes: task.capture_bytes,
        downscale_bytes: task.buffer.allocated_bytes(),
        backend: used,
        fell_back,
    };
    if task.config.instrumentation() {
        log::info!(
            "task {id}: {}x{} backdrop ready in {:?} on {:?} backend \
             ({} captured bytes, {} blurred)",
            task.buffer.width(),
            task.buffer.height(),
            metrics.elapsed,
            metrics.backend,
            metrics.capture_bytes,
            metrics.downscale_bytes,
        );
    }
    task.state.set(TaskState::Done);
    let _ = task.outcome_tx.send(TaskOutcome::Done(BlurResult {
        buffer: task.buffer,
        metrics,
    }));
}

/// Run the blur, substituting the stack blur when the configured backend
/// fails at runtime. Cancellation and buffer misuse are not retried.
fn run_blur(
    backend: &dyn BlurBackend,
    buffer: &mut PixelBuffer,
    radius: u32,
    cancelled: &AtomicBool,
) -> Result<(BackendKind, bool), BackendError> {
    match backend.blur(buffer, radius, cancelled) {
        Ok(kind) => Ok((kind, false)),
        Err(err @ (BackendError::Cancelled | BackendError::Buffer(_))) => Err(err),
        Err(err) => {
            log::warn!("blur backend failed ({err}), retrying with stack blur");
            let kind = StackBlurFilter::new().blur(buffer, radius, cancelled)?;
            Ok((kind, true))
        }
    }
}

fn finish_cancelled(task: &mut BlurTask) {
    task.buffer.release();
    task.state.set(TaskState::Cancelled);
    log::debug!("task {}: cancelled", task.id);
    let _ = task.outcome_tx.send(TaskOutcome::Cancelled);
}

fn finish_failed(task: &mut BlurTask, err: BlurError) {
    task.buffer.release();
    task.state.set(TaskState::Failed);
    let _ = task.outcome_tx.send(TaskOutcome::Failed(err));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blurring::domain::blur_backend::BackendKind;
    use crate::pipeline::capture::PresentationSink;
    use crate::shared::exclusion_bands::ExclusionBands;
    use crate::shared::pixel_buffer::{PixelBuffer, PixelFormat};
    use crossbeam_channel::RecvTimeoutError;
    use std::time::Duration;

    fn gradient_buffer(width: u32, height: u32) -> PixelBuffer {
        let mut data = vec![0u8; width as usize * height as usize * 4];
        for (i, byte) in data.iter_mut().enumerate() {
            *byte = ((i * 13) % 256) as u8;
        }
        PixelBuffer::from_bytes(data, width, height, PixelFormat::Argb).unwrap()
    }

    struct BufferCapture(PixelBuffer);

    impl CaptureSource for BufferCapture {
        fn capture(&mut self) -> Result<PixelBuffer, BlurError> {
            self.0.duplicate()
        }
    }

    struct EmptyCapture;

    impl CaptureSource for EmptyCapture {
        fn capture(&mut self) -> Result<PixelBuffer, BlurError> {
            Err(BlurError::NoSnapshotAvailable)
        }
    }

    struct CollectSink(Vec<BlurResult>);

    impl PresentationSink for CollectSink {
        fn accept(&mut self, result: BlurResult) {
            self.0.push(result);
        }
    }

    /// Parks in the blur stage until the gate fires, honoring cancellation
    /// while parked. Reports itself as accelerated so fallback paths stay
    /// observable.
    struct GateBackend(Receiver<()>);

    impl BlurBackend for GateBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::Accelerated
        }

        fn blur(
            &self,
            buffer: &mut PixelBuffer,
            radius: u32,
            cancelled: &AtomicBool,
        ) -> Result<BackendKind, BackendError> {
            loop {
                if cancelled.load(Ordering::Relaxed) {
                    return Err(BackendError::Cancelled);
                }
                match self.0.recv_timeout(Duration::from_millis(2)) {
                    Ok(()) => break,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => {
                        return Err(BackendError::Execution("gate dropped".into()))
                    }
                }
            }
            StackBlurFilter::new().blur(buffer, radius, cancelled)
        }
    }

    /// Blurs normally, then flips the cancellation flag before returning,
    /// landing the cancel in the window between blur completion and
    /// delivery.
    struct CancelOnCompletion;

    impl BlurBackend for CancelOnCompletion {
        fn kind(&self) -> BackendKind {
            BackendKind::Cpu
        }

        fn blur(
            &self,
            buffer: &mut PixelBuffer,
            radius: u32,
            cancelled: &AtomicBool,
        ) -> Result<BackendKind, BackendError> {
            let kind = StackBlurFilter::new().blur(buffer, radius, cancelled)?;
            cancelled.store(true, Ordering::Relaxed);
            Ok(kind)
        }
    }

    struct FailingBackend;

    impl BlurBackend for FailingBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::Accelerated
        }

        fn blur(
            &self,
            _buffer: &mut PixelBuffer,
            _radius: u32,
            _cancelled: &AtomicBool,
        ) -> Result<BackendKind, BackendError> {
            Err(BackendError::Execution("device lost".into()))
        }
    }

    fn wait_for_state(handle: &TaskHandle, state: TaskState) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while handle.state() != state {
            assert!(
                Instant::now() < deadline,
                "timed out waiting for {state:?}, still {:?}",
                handle.state()
            );
            thread::yield_now();
        }
    }

    #[test]
    fn test_end_to_end_produces_downscaled_blurred_buffer() {
        let mut orchestrator = BlurOrchestrator::new();
        let mut capture = BufferCapture(gradient_buffer(100, 100));
        let config = BlurConfig::builder().radius(8).downscale_factor(4.0).build();
        let handle = orchestrator.start_task(config, &mut capture);
        match handle.wait_outcome() {
            TaskOutcome::Done(result) => {
                assert_eq!((result.buffer.width(), result.buffer.height()), (25, 25));
                assert_eq!(result.metrics.backend, BackendKind::Cpu);
                assert!(!result.metrics.fell_back);
                assert_eq!(result.metrics.capture_bytes, 100 * 100 * 4);
                assert_eq!(result.metrics.downscale_bytes, 25 * 25 * 4);
            }
            other => panic!("expected Done, got {other:?}"),
        }
    }

    #[test]
    fn test_negative_radius_yields_downscale_only() {
        let source = gradient_buffer(40, 40);
        let expected = DownscaleSampler::new()
            .downscale(&source, 4.0, ExclusionBands::NONE)
            .unwrap();

        let mut orchestrator = BlurOrchestrator::new();
        let mut capture = BufferCapture(source);
        let config = BlurConfig::builder().radius(-3).downscale_factor(4.0).build();
        let handle = orchestrator.start_task(config, &mut capture);
        match handle.wait_outcome() {
            TaskOutcome::Done(result) => {
                assert_eq!(result.buffer.data().unwrap(), expected.data().unwrap());
            }
            other => panic!("expected Done, got {other:?}"),
        }
    }

    #[test]
    fn test_degenerate_bands_fail_the_task() {
        let mut orchestrator = BlurOrchestrator::new();
        let mut capture = BufferCapture(gradient_buffer(50, 10));
        let config = BlurConfig::builder()
            .bands(ExclusionBands::new(5, 5, 0, 0))
            .build();
        let handle = orchestrator.start_task(config, &mut capture);
        match handle.wait_outcome() {
            TaskOutcome::Failed(err) => {
                assert_eq!(
                    err,
                    BlurError::DegenerateRegion {
                        width: 50,
                        height: 10
                    }
                );
            }
            other => panic!("expected Failed, got {other:?}"),
        }
        assert_eq!(handle.state(), TaskState::Failed);
    }

    #[test]
    fn test_capture_failure_terminates_without_worker() {
        let mut orchestrator = BlurOrchestrator::new();
        let handle = orchestrator.start_task(BlurConfig::default(), &mut EmptyCapture);
        assert_eq!(handle.state(), TaskState::Failed);
        match handle.try_outcome() {
            Some(TaskOutcome::Failed(BlurError::NoSnapshotAvailable)) => {}
            other => panic!("expected immediate Failed, got {other:?}"),
        }
    }

    #[test]
    fn test_failed_task_never_reaches_sink() {
        let mut orchestrator = BlurOrchestrator::new();
        let handle = orchestrator.start_task(BlurConfig::default(), &mut EmptyCapture);
        let mut sink = CollectSink(Vec::new());
        assert_eq!(handle.deliver(&mut sink), TaskState::Failed);
        assert!(sink.0.is_empty());
    }

    #[test]
    fn test_deliver_hands_result_to_sink() {
        let mut orchestrator = BlurOrchestrator::new();
        let mut capture = BufferCapture(gradient_buffer(32, 32));
        let handle = orchestrator.start_task(BlurConfig::default(), &mut capture);
        let mut sink = CollectSink(Vec::new());
        assert_eq!(handle.deliver(&mut sink), TaskState::Done);
        assert_eq!(sink.0.len(), 1);
        assert_eq!(sink.0[0].buffer.width(), 8);
    }

    #[test]
    fn test_cancel_mid_blur_skips_sink() {
        let (gate_tx, gate_rx) = unbounded::<()>();
        let mut orchestrator = BlurOrchestrator::with_backend_factory(Box::new(move |_| {
            Box::new(GateBackend(gate_rx.clone()))
        }));
        let mut capture = BufferCapture(gradient_buffer(32, 32));
        let handle = orchestrator.start_task(BlurConfig::default(), &mut capture);
        wait_for_state(&handle, TaskState::Blurring);
        handle.cancel();
        let mut sink = CollectSink(Vec::new());
        assert_eq!(handle.deliver(&mut sink), TaskState::Cancelled);
        assert!(sink.0.is_empty());
        drop(gate_tx);
    }

    #[test]
    fn test_cancelled_task_releases_its_buffer() {
        let (outcome_tx, outcome_rx) = bounded(1);
        let mut task = BlurTask {
            id: 1,
            config: BlurConfig::default(),
            buffer: gradient_buffer(8, 8),
            state: Arc::new(StateCell::new(TaskState::Blurring)),
            cancelled: Arc::new(AtomicBool::new(true)),
            outcome_tx,
            started: Instant::now(),
            capture_bytes: 8 * 8 * 4,
        };
        finish_cancelled(&mut task);
        assert!(task.buffer.is_released());
        assert_eq!(task.buffer.allocated_bytes(), 0);
        assert_eq!(task.state.get(), TaskState::Cancelled);
        assert!(matches!(outcome_rx.try_recv(), Ok(TaskOutcome::Cancelled)));
    }

    #[test]
    fn test_cancel_during_final_blur_rows_is_honored() {
        // The flag flips while the backend is still producing the result;
        // the worker must discard it instead of delivering Done.
        let mut orchestrator =
            BlurOrchestrator::with_backend_factory(Box::new(|_| Box::new(CancelOnCompletion)));
        let mut capture = BufferCapture(gradient_buffer(16, 16));
        let handle = orchestrator.start_task(BlurConfig::default(), &mut capture);
        let mut sink = CollectSink(Vec::new());
        assert_eq!(handle.deliver(&mut sink), TaskState::Cancelled);
        assert!(sink.0.is_empty());
    }

    #[test]
    fn test_new_task_cancels_previous() {
        let (gate_tx, gate_rx) = unbounded::<()>();
        let mut orchestrator = BlurOrchestrator::with_backend_factory(Box::new(move |_| {
            Box::new(GateBackend(gate_rx.clone()))
        }));
        let mut capture = BufferCapture(gradient_buffer(32, 32));

        let first = orchestrator.start_task(BlurConfig::default(), &mut capture);
        wait_for_state(&first, TaskState::Blurring);
        let second = orchestrator.start_task(BlurConfig::default(), &mut capture);

        // The superseded task exits through its cancellation check; only
        // then is the gate released for the new one.
        match first.wait_outcome() {
            TaskOutcome::Cancelled => {}
            other => panic!("expected first task Cancelled, got {other:?}"),
        }
        gate_tx.send(()).unwrap();
        match second.wait_outcome() {
            TaskOutcome::Done(result) => assert_eq!(result.buffer.width(), 8),
            other => panic!("expected second task Done, got {other:?}"),
        }
    }

    #[test]
    fn test_runtime_backend_failure_falls_back_to_stack_blur() {
        let source = gradient_buffer(40, 40);
        let config = BlurConfig::builder()
            .radius(6)
            .downscale_factor(2.0)
            .backend(BackendPreference::Accelerated)
            .build();

        let mut reference = BlurOrchestrator::new();
        let mut capture = BufferCapture(source.duplicate().unwrap());
        let cpu_config = BlurConfig::builder().radius(6).downscale_factor(2.0).build();
        let expected = match reference.start_task(cpu_config, &mut capture).wait_outcome() {
            TaskOutcome::Done(result) => result.buffer.into_bytes().unwrap(),
            other => panic!("reference run failed: {other:?}"),
        };

        let mut orchestrator =
            BlurOrchestrator::with_backend_factory(Box::new(|_| Box::new(FailingBackend)));
        let mut capture = BufferCapture(source);
        match orchestrator.start_task(config, &mut capture).wait_outcome() {
            TaskOutcome::Done(result) => {
                assert!(result.metrics.fell_back);
                assert_eq!(result.metrics.backend, BackendKind::Cpu);
                assert_eq!(result.buffer.into_bytes().unwrap(), expected);
            }
            other => panic!("expected Done via fallback, got {other:?}"),
        }
    }

    #[test]
    fn test_failed_probe_matches_forced_cpu() {
        // A failed accelerated probe hands out the stack blur, so an
        // accelerated-preference run must be byte-equal to a cpu one.
        let source = gradient_buffer(40, 40);

        let mut reference = BlurOrchestrator::new();
        let mut capture = BufferCapture(source.duplicate().unwrap());
        let cpu_config = BlurConfig::builder().radius(6).downscale_factor(2.0).build();
        let expected = match reference.start_task(cpu_config, &mut capture).wait_outcome() {
            TaskOutcome::Done(result) => result.buffer.into_bytes().unwrap(),
            other => panic!("reference run failed: {other:?}"),
        };

        let mut orchestrator =
            BlurOrchestrator::with_backend_factory(Box::new(|_| Box::new(StackBlurFilter::new())));
        let mut capture = BufferCapture(source);
        let config = BlurConfig::builder()
            .radius(6)
            .downscale_factor(2.0)
            .backend(BackendPreference::Accelerated)
            .build();
        match orchestrator.start_task(config, &mut capture).wait_outcome() {
            TaskOutcome::Done(result) => {
                assert_eq!(result.metrics.backend, BackendKind::Cpu);
                assert!(!result.metrics.fell_back);
                assert_eq!(result.buffer.into_bytes().unwrap(), expected);
            }
            other => panic!("expected Done, got {other:?}"),
        }
    }

    #[test]
    fn test_outcome_is_consumed_once() {
        let mut orchestrator = BlurOrchestrator::new();
        let mut capture = BufferCapture(gradient_buffer(16, 16));
        let handle = orchestrator.start_task(BlurConfig::default(), &mut capture);
        assert!(matches!(handle.wait_outcome(), TaskOutcome::Done(_)));
        assert!(handle.try_outcome().is_none());
    }

    #[test]
    fn test_sequential_tasks_get_distinct_ids() {
        let mut orchestrator = BlurOrchestrator::new();
        let mut capture = BufferCapture(gradient_buffer(16, 16));
        let first = orchestrator.start_task(BlurConfig::default(), &mut capture);
        let _ = first.wait_outcome();
        let second = orchestrator.start_task(BlurConfig::default(), &mut capture);
        assert_ne!(first.id(), second.id());
        let _ = second.wait_outcome();
    }

    #[test]
    fn test_drop_joins_worker_cleanly() {
        let mut orchestrator = BlurOrchestrator::new();
        let mut capture = BufferCapture(gradient_buffer(16, 16));
        let handle = orchestrator.start_task(BlurConfig::default(), &mut capture);
        drop(orchestrator);
        // The queued task either finished or was cancelled on shutdown,
        // never lost without an outcome.
        match handle.wait_outcome() {
            TaskOutcome::Done(_) | TaskOutcome::Cancelled => {}
            other => panic!("unexpected outcome after drop: {other:?}"),
        }
    }
}
