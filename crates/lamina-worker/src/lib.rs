//! Background render thread for the lamina pipeline.
//!
//! [`PipelineWorker`] owns a dedicated OS thread with its own
//! [`Pipeline`] and [`Renderer`], so the bitmap cache and the preview
//! zoom live where the rendering happens. The calling thread submits
//! jobs carrying a snapshot of the edited pipeline's content plus a
//! reply callback; the worker syncs its content from the snapshot,
//! renders, and invokes the callback on the worker thread. Keeping one
//! long-lived pipeline on the worker is what makes incremental renders
//! cheap: an edit to one stage reuses every cached upstream result.
//!
//! Cancellation uses a generation counter shared between the handle and
//! the thread. Each job records the generation it was submitted under;
//! [`PipelineWorker::cancel_all`] bumps the counter, and the worker
//! discards any job whose generation no longer matches, whether it is
//! still queued or already mid-render. A discarded job's reply never
//! runs.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::thread;

use lamina_pipeline::{
    BuiltinBackend, CacheConfig, Dimensions, Pipeline, PipelineError, Renderer, SharedBitmap,
    StageBackend, ZoomFactor,
};

/// What one render job produced, delivered to its reply callback.
#[derive(Debug)]
pub struct RenderReply {
    /// The rendered preview. `Ok(None)` means the pipeline was empty.
    pub outcome: Result<Option<SharedBitmap>, PipelineError>,
    /// The zoom the preview was rendered at, after any zoom step the
    /// job itself performed.
    pub zoom: ZoomFactor,
}

type ReplyFn = Box<dyn FnOnce(RenderReply) + Send>;

enum JobKind {
    RenderAtSize { viewport: Dimensions },
    ZoomIn,
    ZoomOut,
}

struct Job {
    generation: u64,
    kind: JobKind,
    snapshot: Pipeline,
    reply: ReplyFn,
}

enum Request {
    Job(Job),
    Shutdown,
}

/// Handle to the render thread.
///
/// Jobs run strictly in submission order. [`PipelineWorker::shutdown`]
/// cancels whatever is pending and waits for the thread; dropping the
/// handle only asks the thread to stop, without waiting.
#[derive(Debug)]
pub struct PipelineWorker {
    sender: mpsc::Sender<Request>,
    generation: Arc<AtomicU64>,
    handle: Option<thread::JoinHandle<()>>,
}

impl PipelineWorker {
    /// Spawn the render thread with the built-in backend and default
    /// cache configuration.
    ///
    /// # Errors
    ///
    /// Returns an error when the OS cannot spawn the thread.
    pub fn spawn() -> io::Result<Self> {
        Self::with_config(&CacheConfig::default())
    }

    /// Spawn the render thread with the built-in backend and the given
    /// cache configuration.
    ///
    /// # Errors
    ///
    /// Returns an error when the OS cannot spawn the thread.
    pub fn with_config(config: &CacheConfig) -> io::Result<Self> {
        Self::with_backend(BuiltinBackend, config)
    }

    /// Spawn the render thread around a custom stage backend.
    ///
    /// # Errors
    ///
    /// Returns an error when the OS cannot spawn the thread.
    pub fn with_backend<B>(backend: B, config: &CacheConfig) -> io::Result<Self>
    where
        B: StageBackend + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel();
        let generation = Arc::new(AtomicU64::new(0));
        let mut worker = WorkerLoop {
            pipeline: Pipeline::new(),
            renderer: Renderer::with_config(backend, config),
            generation: Arc::clone(&generation),
        };
        let handle = thread::Builder::new()
            .name("lamina-pipeline".to_string())
            .spawn(move || worker.run(&receiver))?;
        Ok(Self {
            sender,
            generation,
            handle: Some(handle),
        })
    }

    /// Render `pipeline`'s content scaled for a viewport of the given
    /// size. Returns whether the job was accepted.
    pub fn render_at_size(
        &self,
        pipeline: &Pipeline,
        viewport: Dimensions,
        reply: impl FnOnce(RenderReply) + Send + 'static,
    ) -> bool {
        self.submit(JobKind::RenderAtSize { viewport }, pipeline, reply)
    }

    /// Step the worker's preview zoom in and re-render. Returns whether
    /// the job was accepted.
    pub fn zoom_in(
        &self,
        pipeline: &Pipeline,
        reply: impl FnOnce(RenderReply) + Send + 'static,
    ) -> bool {
        self.submit(JobKind::ZoomIn, pipeline, reply)
    }

    /// Step the worker's preview zoom out and re-render. Returns
    /// whether the job was accepted.
    pub fn zoom_out(
        &self,
        pipeline: &Pipeline,
        reply: impl FnOnce(RenderReply) + Send + 'static,
    ) -> bool {
        self.submit(JobKind::ZoomOut, pipeline, reply)
    }

    /// Invalidate every queued and in-flight job. Their replies never
    /// run. Jobs submitted after this call proceed normally.
    pub fn cancel_all(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Cancel pending jobs, stop the worker, and wait for the thread
    /// to finish.
    pub fn shutdown(mut self) {
        self.cancel_all();
        self.request_stop();
        self.join();
    }

    fn submit(
        &self,
        kind: JobKind,
        pipeline: &Pipeline,
        reply: impl FnOnce(RenderReply) + Send + 'static,
    ) -> bool {
        let job = Job {
            generation: self.generation.load(Ordering::SeqCst),
            kind,
            snapshot: pipeline.clone(),
            reply: Box::new(reply),
        };
        if self.sender.send(Request::Job(job)).is_err() {
            log::warn!("render worker is gone, dropping job");
            return false;
        }
        true
    }

    fn request_stop(&self) {
        let _ = self.sender.send(Request::Shutdown);
    }

    fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("render worker thread panicked");
            }
        }
    }
}

impl Drop for PipelineWorker {
    fn drop(&mut self) {
        self.request_stop();
    }
}

/// State owned by the worker thread. The pipeline's content is synced
/// from each job's snapshot; its view state persists across jobs so
/// zoom steps accumulate.
struct WorkerLoop<B> {
    pipeline: Pipeline,
    renderer: Renderer<B>,
    generation: Arc<AtomicU64>,
}

impl<B: StageBackend> WorkerLoop<B> {
    fn run(&mut self, receiver: &mpsc::Receiver<Request>) {
        while let Ok(request) = receiver.recv() {
            match request {
                Request::Job(job) => self.handle(job),
                Request::Shutdown => break,
            }
        }
    }

    fn handle(&mut self, job: Job) {
        if self.stale(job.generation) {
            log::debug!("skipping cancelled render (generation {})", job.generation);
            return;
        }
        self.pipeline.sync_content_from(&job.snapshot);
        self.pipeline.set_quality(job.snapshot.quality());
        let outcome = match job.kind {
            JobKind::RenderAtSize { viewport } => {
                self.pipeline.render_at_size(&mut self.renderer, viewport)
            }
            JobKind::ZoomIn => {
                self.pipeline.zoom_in();
                self.pipeline.render(&mut self.renderer)
            }
            JobKind::ZoomOut => {
                self.pipeline.zoom_out();
                self.pipeline.render(&mut self.renderer)
            }
        };
        // Cancellation can land while the render is in flight.
        if self.stale(job.generation) {
            log::debug!("discarding cancelled render (generation {})", job.generation);
            return;
        }
        (job.reply)(RenderReply {
            outcome,
            zoom: self.pipeline.zoom(),
        });
    }

    fn stale(&self, generation: u64) -> bool {
        generation != self.generation.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use lamina_pipeline::{
        AdjustmentStage, Bitmap, InputSource, InputStage, LoadError, RgbaImage, StageConfig,
        TransformError,
    };

    use super::*;

    const WAIT: Duration = Duration::from_secs(10);

    /// Test backend: inputs are "WIDTHxHEIGHT" strings decoded into
    /// blank images, adjustments delegate to the built-in transforms.
    #[derive(Debug, Default)]
    struct ParseBackend;

    impl StageBackend for ParseBackend {
        fn load_input(&self, stage: &InputStage) -> Result<Bitmap, LoadError> {
            let InputSource::Memory { bytes } = stage.source() else {
                return Err(LoadError::EmptyInput);
            };
            if bytes.is_empty() {
                return Err(LoadError::EmptyInput);
            }
            let spec = String::from_utf8(bytes.clone()).unwrap();
            let (width, height) = spec.split_once('x').unwrap();
            Ok(Bitmap::new(RgbaImage::new(
                width.parse().unwrap(),
                height.parse().unwrap(),
            )))
        }

        fn apply(
            &self,
            stage: &AdjustmentStage,
            source: &Bitmap,
        ) -> Result<Bitmap, TransformError> {
            BuiltinBackend.apply(stage, source)
        }
    }

    /// Backend whose `apply` blocks until released, so a render can be
    /// held in flight while the test acts.
    struct GateBackend {
        started: mpsc::Sender<()>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl StageBackend for GateBackend {
        fn load_input(&self, stage: &InputStage) -> Result<Bitmap, LoadError> {
            ParseBackend.load_input(stage)
        }

        fn apply(
            &self,
            _stage: &AdjustmentStage,
            source: &Bitmap,
        ) -> Result<Bitmap, TransformError> {
            self.started.send(()).unwrap();
            // Timeout instead of a plain recv so a broken test fails
            // instead of wedging the worker join.
            self.release.lock().unwrap().recv_timeout(WAIT).unwrap();
            Ok(Bitmap::derived(source, source.pixels().clone()))
        }
    }

    fn parse_worker() -> PipelineWorker {
        PipelineWorker::with_backend(ParseBackend, &CacheConfig::default()).unwrap()
    }

    fn sized_pipeline(spec: &str) -> Pipeline {
        let mut pipeline = Pipeline::new();
        pipeline.set_input(InputStage::from_bytes(spec.as_bytes().to_vec()));
        pipeline
    }

    // --- Ordering and snapshots ---

    #[test]
    fn replies_arrive_in_submission_order() {
        let worker = parse_worker();
        let pipeline = sized_pipeline("16x16");
        let (tx, rx) = mpsc::channel();

        for label in ["a", "b", "c"] {
            let tx = tx.clone();
            worker.render_at_size(&pipeline, Dimensions::new(8, 8), move |reply| {
                tx.send((label, reply)).unwrap();
            });
        }

        let mut labels = Vec::new();
        for _ in 0..3 {
            let (label, reply) = rx.recv_timeout(WAIT).unwrap();
            assert!(reply.outcome.is_ok());
            labels.push(label);
        }
        assert_eq!(labels, ["a", "b", "c"]);
    }

    #[test]
    fn a_job_renders_the_snapshot_not_later_edits() {
        let worker = parse_worker();
        let mut pipeline = sized_pipeline("8x8");
        let (tx, rx) = mpsc::channel();

        worker.render_at_size(&pipeline, Dimensions::new(8, 8), move |reply| {
            tx.send(reply).unwrap();
        });
        // This edit lands after the snapshot was taken.
        pipeline.add_stage(AdjustmentStage::new(StageConfig::SolidBorder {
            thickness: 2,
            color: [0, 0, 0, 255],
        }));

        let reply = rx.recv_timeout(WAIT).unwrap();
        let bitmap = reply.outcome.unwrap().unwrap();
        assert_eq!(bitmap.dimensions(), Dimensions::new(8, 8));
    }

    #[test]
    fn an_empty_pipeline_replies_none() {
        let worker = parse_worker();
        let (tx, rx) = mpsc::channel();
        worker.render_at_size(&Pipeline::new(), Dimensions::new(8, 8), move |reply| {
            tx.send(reply).unwrap();
        });
        let reply = rx.recv_timeout(WAIT).unwrap();
        assert!(reply.outcome.unwrap().is_none());
    }

    #[test]
    fn load_failures_come_back_as_errors() {
        let worker = parse_worker();
        let mut pipeline = Pipeline::new();
        pipeline.set_input(InputStage::from_bytes(Vec::new()));
        let (tx, rx) = mpsc::channel();
        worker.render_at_size(&pipeline, Dimensions::new(8, 8), move |reply| {
            tx.send(reply).unwrap();
        });
        let reply = rx.recv_timeout(WAIT).unwrap();
        assert!(matches!(
            reply.outcome,
            Err(PipelineError::InputLoad(LoadError::EmptyInput)),
        ));
    }

    // --- Zoom ---

    #[test]
    fn zoom_steps_persist_across_jobs() {
        let worker = parse_worker();
        let pipeline = sized_pipeline("160x120");
        let (tx, rx) = mpsc::channel();

        let first = tx.clone();
        worker.render_at_size(&pipeline, Dimensions::new(80, 60), move |reply| {
            first.send(reply).unwrap();
        });
        let fitted = rx.recv_timeout(WAIT).unwrap();
        assert_eq!(fitted.zoom.to_string(), "1:2");

        let second = tx.clone();
        worker.zoom_in(&pipeline, move |reply| {
            second.send(reply).unwrap();
        });
        let zoomed = rx.recv_timeout(WAIT).unwrap();
        assert_eq!(zoomed.zoom.to_string(), "2:3");
        let bitmap = zoomed.outcome.unwrap().unwrap();
        assert_eq!(bitmap.dimensions(), Dimensions::new(106, 80));

        // A plain re-render at the same viewport keeps the manual zoom.
        worker.render_at_size(&pipeline, Dimensions::new(80, 60), move |reply| {
            tx.send(reply).unwrap();
        });
        let again = rx.recv_timeout(WAIT).unwrap();
        assert_eq!(again.zoom.to_string(), "2:3");
    }

    // --- Cancellation and shutdown ---

    #[test]
    fn cancel_all_discards_queued_and_in_flight_work() {
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let backend = GateBackend {
            started: started_tx,
            release: Mutex::new(release_rx),
        };
        let worker = PipelineWorker::with_backend(backend, &CacheConfig::default()).unwrap();
        let pipeline = sized_pipeline("8x8");
        let (tx, rx) = mpsc::channel();

        let in_flight = tx.clone();
        worker.render_at_size(&pipeline, Dimensions::new(8, 8), move |reply| {
            in_flight.send(("in-flight", reply)).unwrap();
        });
        started_rx.recv_timeout(WAIT).unwrap();

        // One job is held at the gate; queue another behind it, then
        // cancel both and let the held render finish.
        let queued = tx.clone();
        worker.render_at_size(&pipeline, Dimensions::new(8, 8), move |reply| {
            queued.send(("queued", reply)).unwrap();
        });
        worker.cancel_all();
        release_tx.send(()).unwrap();

        // The queued job is discarded before rendering, so it never
        // touches the gate. This job renders the same content at the
        // same zoom and completes from cache, also without the gate.
        worker.render_at_size(&pipeline, Dimensions::new(8, 8), move |reply| {
            tx.send(("after-cancel", reply)).unwrap();
        });
        let (label, reply) = rx.recv_timeout(WAIT).unwrap();
        assert_eq!(label, "after-cancel");
        assert!(reply.outcome.is_ok());
        assert!(rx.try_recv().is_err(), "cancelled replies must not run");
    }

    #[test]
    fn shutdown_joins_an_idle_worker() {
        let worker = parse_worker();
        worker.shutdown();
    }

    #[test]
    fn jobs_after_shutdown_are_rejected() {
        let mut worker = parse_worker();
        let pipeline = sized_pipeline("8x8");
        worker.request_stop();
        worker.join();
        let accepted = worker.render_at_size(&pipeline, Dimensions::new(8, 8), |_| {});
        assert!(!accepted, "a job sent to a stopped worker is not accepted");
    }
}
