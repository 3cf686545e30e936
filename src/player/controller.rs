//! Pipeline lifecycle controller.
//!
//! `start()` spawns a dedicated worker thread that builds the pipeline and
//! runs a blocking event loop over a single-consumer queue. Surface changes
//! from the host and bus traffic from the engine both arrive as messages on
//! that queue, so only the worker thread ever touches the pipeline. `stop()`
//! signals the loop and joins the thread: it never returns before the worker
//! has released the pipeline and reported `stopped` to the host.

use crate::player::bridge::{CallbackBridge, HostCallbacks, ThreadAttachment};
use crate::player::engine::{BusMessage, BusOrigin, MediaEngine, MediaPipeline, SurfaceHandle};
use crate::player::state::PipelineState;
use crate::player::surface::{BindOutcome, SurfaceTracker};
use log::{debug, error, info, warn};
use std::net::Ipv4Addr;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

const WORKER_THREAD_NAME: &str = "pipeline-worker";

/// Error kind reported to the host for runtime bus errors.
const ERROR_KIND_BUS: i32 = 1;

/// Target of the playback session.
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    pub source_ip: Ipv4Addr,
    pub source_port: u32,
}

impl PlayerConfig {
    /// Launch description handed to the engine, parameterized by the target.
    pub fn launch_description(&self) -> String {
        format!(
            "udpsrc address={} port={} ! gdpdepay ! rtph264depay ! avdec_h264 ! videoconvert ! autovideosink sync=false",
            self.source_ip, self.source_port
        )
    }
}

/// Messages consumed by the worker's event loop.
#[derive(Debug)]
enum WorkerEvent {
    Play,
    SurfaceChanged(Option<SurfaceHandle>),
    Expose,
    Bus(BusMessage),
    Quit,
}

/// Clonable handle the engine uses to deliver bus traffic into the worker
/// loop. Posting after the loop exited is harmless.
#[derive(Clone)]
pub struct BusHandle {
    tx: Sender<WorkerEvent>,
}

impl BusHandle {
    pub fn post(&self, message: BusMessage) {
        if self.tx.send(WorkerEvent::Bus(message)).is_err() {
            debug!("bus message dropped, worker loop already gone");
        }
    }
}

struct Worker {
    tx: Sender<WorkerEvent>,
    join: JoinHandle<()>,
}

/// Owns the pipeline's lifecycle on behalf of the host application.
pub struct PlayerController {
    config: PlayerConfig,
    engine: Arc<dyn MediaEngine>,
    bridge: CallbackBridge,
    surface: Arc<Mutex<SurfaceTracker>>,
    worker: Option<Worker>,
}

impl PlayerController {
    pub fn new(
        config: PlayerConfig,
        engine: Arc<dyn MediaEngine>,
        host: Arc<dyn HostCallbacks>,
    ) -> Self {
        PlayerController {
            config,
            engine,
            bridge: CallbackBridge::new(host),
            surface: Arc::new(Mutex::new(SurfaceTracker::new())),
            worker: None,
        }
    }

    /// Spawns the worker thread. Fire-and-continue: building the pipeline and
    /// completing initialization happen on the worker.
    pub fn start(&mut self) {
        if self.worker.is_some() {
            warn!("pipeline worker already running");
            return;
        }

        let (tx, rx) = channel();
        let context = WorkerContext {
            engine: Arc::clone(&self.engine),
            bridge: self.bridge.clone(),
            surface: Arc::clone(&self.surface),
            description: self.config.launch_description(),
            bus: BusHandle { tx: tx.clone() },
            events: rx,
        };

        match thread::Builder::new()
            .name(WORKER_THREAD_NAME.into())
            .spawn(move || context.run())
        {
            Ok(join) => self.worker = Some(Worker { tx, join }),
            Err(e) => error!("failed to spawn pipeline worker: {e}"),
        }
    }

    /// Requests playback. No-op until the pipeline exists.
    pub fn play(&self) {
        match &self.worker {
            Some(worker) => {
                let _ = worker.tx.send(WorkerEvent::Play);
            }
            None => debug!("play requested with no pipeline"),
        }
    }

    /// Signals the worker loop to exit and blocks until the thread has
    /// joined. The worker reports `stopped` before it ends, so the host has
    /// seen the final state by the time this returns.
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        debug!("quitting worker loop");
        let _ = worker.tx.send(WorkerEvent::Quit);
        debug!("waiting for worker to finish");
        if worker.join.join().is_err() {
            error!("pipeline worker panicked during shutdown");
        }
    }

    /// Supplies or replaces the display surface.
    pub fn set_surface(&mut self, handle: SurfaceHandle) {
        let outcome = self.surface.lock().unwrap().bind(handle);
        match outcome {
            BindOutcome::Redundant => {
                debug!("surface unchanged, re-exposing render target");
                if let Some(worker) = &self.worker {
                    let _ = worker.tx.send(WorkerEvent::Expose);
                    let _ = worker.tx.send(WorkerEvent::Expose);
                }
            }
            BindOutcome::Replaced => {
                if let Some(worker) = &self.worker {
                    let _ = worker.tx.send(WorkerEvent::SurfaceChanged(Some(handle)));
                } else {
                    debug!("surface stored, binding deferred until the worker loop is up");
                }
            }
        }
    }

    /// Tears the surface down: the render target is detached and the pipeline
    /// drops back to `Ready`.
    pub fn clear_surface(&mut self) {
        self.surface.lock().unwrap().release();
        if let Some(worker) = &self.worker {
            let _ = worker.tx.send(WorkerEvent::SurfaceChanged(None));
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }
}

/// Everything the worker thread owns for one session.
struct WorkerContext {
    engine: Arc<dyn MediaEngine>,
    bridge: CallbackBridge,
    surface: Arc<Mutex<SurfaceTracker>>,
    description: String,
    bus: BusHandle,
    events: Receiver<WorkerEvent>,
}

impl WorkerContext {
    fn run(self) {
        let host = self.bridge.attach(WORKER_THREAD_NAME);

        debug!("building pipeline: {}", self.description);
        let mut pipeline = match self.engine.build(&self.description, self.bus.clone()) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                error!("unable to build pipeline: {e:#}");
                host.set_message(&format!("Unable to build pipeline: {e}"));
                return;
            }
        };

        // ready right away, so the sink can accept a window handle before playback
        if let Err(e) = pipeline.set_state(PipelineState::Ready) {
            error!("failed to ready pipeline: {e:#}");
        }

        // the event loop exists from here on; a surface supplied earlier
        // completes initialization now, one supplied later re-runs this check
        // from the surface path
        self.check_initialization(&host, pipeline.as_mut());

        info!("entering worker loop");
        while let Ok(event) = self.events.recv() {
            match event {
                WorkerEvent::Quit => break,
                WorkerEvent::Play => {
                    if let Err(e) = pipeline.set_state(PipelineState::Playing) {
                        error!("failed to request playback: {e:#}");
                    }
                }
                WorkerEvent::Expose => pipeline.expose(),
                WorkerEvent::SurfaceChanged(Some(_)) => {
                    self.check_initialization(&host, pipeline.as_mut());
                }
                WorkerEvent::SurfaceChanged(None) => {
                    pipeline.set_render_target(None);
                    if let Err(e) = pipeline.set_state(PipelineState::Ready) {
                        error!("failed to drop pipeline to ready: {e:#}");
                    }
                }
                WorkerEvent::Bus(message) => self.handle_bus(message, &host, pipeline.as_mut()),
            }
        }
        info!("exited worker loop");

        if let Err(e) = pipeline.set_state(PipelineState::Null) {
            error!("failed to tear pipeline down: {e:#}");
        }
        host.notify_state(PipelineState::Null);
        drop(pipeline);
        // the render target died with the pipeline; a stored surface has to
        // rebind on the next start
        self.surface.lock().unwrap().unbind();
        // host detach is logged when the attachment drops
    }

    /// Initialization barrier: the loop is running, so a stored surface is
    /// all that is missing before the render target can be bound.
    fn check_initialization(&self, host: &ThreadAttachment, pipeline: &mut dyn MediaPipeline) {
        let mut surface = self.surface.lock().unwrap();
        if surface.is_bound() {
            // the startup check already consumed the pending surface
            return;
        }
        match surface.handle() {
            Some(handle) => {
                debug!("initialization complete, binding surface {:#x}", handle.as_raw());
                pipeline.set_render_target(Some(handle));
                surface.mark_bound();
                host.on_initialized();
            }
            None => debug!("initialization not complete, no surface yet"),
        }
    }

    fn handle_bus(
        &self,
        message: BusMessage,
        host: &ThreadAttachment,
        pipeline: &mut dyn MediaPipeline,
    ) {
        match message {
            BusMessage::Error { source, message } => {
                error!("error received from element {source}: {message}");
                host.set_error(
                    ERROR_KIND_BUS,
                    &format!("Error received from element {source}: {message}"),
                );
                if let Err(e) = pipeline.set_state(PipelineState::Null) {
                    error!("failed to tear pipeline down: {e:#}");
                }
                host.notify_state(PipelineState::Null);
            }
            BusMessage::StateChanged { origin, state } => {
                // children also post state changes, only the pipeline's own matter
                if origin == BusOrigin::Pipeline {
                    debug!("pipeline state now {state}");
                    host.notify_state(state);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Result, bail};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum PipelineCall {
        Build(String),
        SetState(PipelineState),
        RenderTarget(Option<SurfaceHandle>),
        Expose,
    }

    #[derive(Default)]
    struct FakeEngine {
        calls: Arc<Mutex<Vec<PipelineCall>>>,
        bus: Arc<Mutex<Option<BusHandle>>>,
        fail_build: bool,
    }

    impl FakeEngine {
        fn calls(&self) -> Vec<PipelineCall> {
            self.calls.lock().unwrap().clone()
        }

        fn bus(&self) -> BusHandle {
            self.bus.lock().unwrap().clone().expect("pipeline not built")
        }

        fn count(&self, matcher: impl Fn(&PipelineCall) -> bool) -> usize {
            self.calls().iter().filter(|call| matcher(call)).count()
        }
    }

    impl MediaEngine for FakeEngine {
        fn build(&self, description: &str, bus: BusHandle) -> Result<Box<dyn MediaPipeline>> {
            if self.fail_build {
                bail!("no element \"udpsrc\"");
            }
            *self.bus.lock().unwrap() = Some(bus);
            let calls = Arc::clone(&self.calls);
            calls
                .lock()
                .unwrap()
                .push(PipelineCall::Build(description.to_owned()));
            Ok(Box::new(FakePipeline { calls }))
        }
    }

    struct FakePipeline {
        calls: Arc<Mutex<Vec<PipelineCall>>>,
    }

    impl MediaPipeline for FakePipeline {
        fn set_state(&mut self, state: PipelineState) -> Result<()> {
            self.calls.lock().unwrap().push(PipelineCall::SetState(state));
            Ok(())
        }

        fn set_render_target(&mut self, surface: Option<SurfaceHandle>) {
            self.calls
                .lock()
                .unwrap()
                .push(PipelineCall::RenderTarget(surface));
        }

        fn expose(&mut self) {
            self.calls.lock().unwrap().push(PipelineCall::Expose);
        }
    }

    #[derive(Default)]
    struct RecordingHost {
        messages: Mutex<Vec<String>>,
        errors: Mutex<Vec<(i32, String)>>,
        states: Mutex<Vec<i32>>,
        initialized: AtomicUsize,
    }

    impl RecordingHost {
        fn states(&self) -> Vec<i32> {
            self.states.lock().unwrap().clone()
        }

        fn initialized(&self) -> usize {
            self.initialized.load(Ordering::Relaxed)
        }
    }

    impl HostCallbacks for RecordingHost {
        fn set_message(&self, text: &str) -> Result<()> {
            self.messages.lock().unwrap().push(text.to_owned());
            Ok(())
        }

        fn set_error(&self, kind: i32, text: &str) -> Result<()> {
            self.errors.lock().unwrap().push((kind, text.to_owned()));
            Ok(())
        }

        fn notify_state(&self, code: i32) -> Result<()> {
            self.states.lock().unwrap().push(code);
            Ok(())
        }

        fn on_initialized(&self) -> Result<()> {
            self.initialized.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    fn controller(
        engine: Arc<FakeEngine>,
        host: Arc<RecordingHost>,
    ) -> PlayerController {
        let config = PlayerConfig {
            source_ip: Ipv4Addr::new(192, 168, 1, 5),
            source_port: 5000,
        };
        PlayerController::new(config, engine, host)
    }

    fn wait_for(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(3);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn launch_description_is_parameterized() {
        let config = PlayerConfig {
            source_ip: Ipv4Addr::new(10, 0, 0, 2),
            source_port: 9000,
        };
        assert_eq!(
            config.launch_description(),
            "udpsrc address=10.0.0.2 port=9000 ! gdpdepay ! rtph264depay ! \
             avdec_h264 ! videoconvert ! autovideosink sync=false"
        );
    }

    #[test]
    fn surface_before_start_binds_on_worker_startup() {
        let engine = Arc::new(FakeEngine::default());
        let host = Arc::new(RecordingHost::default());
        let mut player = controller(engine.clone(), host.clone());

        let surface = SurfaceHandle::from_raw(0xA);
        player.set_surface(surface);
        player.start();

        wait_for(|| host.initialized() == 1);
        assert_eq!(
            engine.count(|c| *c == PipelineCall::RenderTarget(Some(surface))),
            1
        );
        // built ready before binding
        assert_eq!(
            engine.count(|c| *c == PipelineCall::SetState(PipelineState::Ready)),
            1
        );

        player.stop();
        assert_eq!(host.initialized(), 1);
    }

    #[test]
    fn stop_reports_stopped_before_returning() {
        let engine = Arc::new(FakeEngine::default());
        let host = Arc::new(RecordingHost::default());
        let mut player = controller(engine.clone(), host.clone());

        player.start();
        wait_for(|| !engine.calls().is_empty());
        player.stop();

        assert!(!player.is_running());
        assert_eq!(host.states().last(), Some(&PipelineState::Null.code()));
        assert_eq!(
            engine.count(|c| *c == PipelineCall::SetState(PipelineState::Null)),
            1
        );
    }

    #[test]
    fn surface_after_start_completes_initialization() {
        let engine = Arc::new(FakeEngine::default());
        let host = Arc::new(RecordingHost::default());
        let mut player = controller(engine.clone(), host.clone());

        player.start();
        wait_for(|| !engine.calls().is_empty());
        assert_eq!(host.initialized(), 0);

        let surface = SurfaceHandle::from_raw(0xB);
        player.set_surface(surface);
        wait_for(|| host.initialized() == 1);
        assert_eq!(
            engine.count(|c| *c == PipelineCall::RenderTarget(Some(surface))),
            1
        );

        player.stop();
    }

    #[test]
    fn redundant_rebind_exposes_twice_without_rebinding() {
        let engine = Arc::new(FakeEngine::default());
        let host = Arc::new(RecordingHost::default());
        let mut player = controller(engine.clone(), host.clone());

        player.start();
        let surface = SurfaceHandle::from_raw(0xC);
        player.set_surface(surface);
        wait_for(|| host.initialized() == 1);

        player.set_surface(surface);
        wait_for(|| engine.count(|c| *c == PipelineCall::Expose) == 2);

        assert_eq!(
            engine.count(|c| matches!(c, PipelineCall::RenderTarget(Some(_)))),
            1
        );
        assert_eq!(host.initialized(), 1);

        player.stop();
    }

    #[test]
    fn clearing_surface_detaches_and_drops_to_ready() {
        let engine = Arc::new(FakeEngine::default());
        let host = Arc::new(RecordingHost::default());
        let mut player = controller(engine.clone(), host.clone());

        player.start();
        player.set_surface(SurfaceHandle::from_raw(0xD));
        wait_for(|| host.initialized() == 1);

        player.clear_surface();
        wait_for(|| engine.count(|c| *c == PipelineCall::RenderTarget(None)) == 1);
        // ready once after build, once after the surface went away
        wait_for(|| engine.count(|c| *c == PipelineCall::SetState(PipelineState::Ready)) == 2);

        player.stop();
    }

    #[test]
    fn bus_error_forces_idle_and_reports() {
        let engine = Arc::new(FakeEngine::default());
        let host = Arc::new(RecordingHost::default());
        let mut player = controller(engine.clone(), host.clone());

        player.start();
        wait_for(|| !engine.calls().is_empty());

        engine.bus().post(BusMessage::Error {
            source: "udpsrc0".into(),
            message: "Could not get/set settings from/on resource.".into(),
        });

        wait_for(|| !host.errors.lock().unwrap().is_empty());
        wait_for(|| host.states().contains(&PipelineState::Null.code()));
        wait_for(|| engine.count(|c| *c == PipelineCall::SetState(PipelineState::Null)) == 1);
        let (kind, text) = host.errors.lock().unwrap()[0].clone();
        assert_eq!(kind, 1);
        assert!(text.contains("udpsrc0"));

        player.stop();
    }

    #[test]
    fn only_pipeline_state_changes_reach_the_host() {
        let engine = Arc::new(FakeEngine::default());
        let host = Arc::new(RecordingHost::default());
        let mut player = controller(engine.clone(), host.clone());

        player.start();
        wait_for(|| !engine.calls().is_empty());

        let bus = engine.bus();
        bus.post(BusMessage::StateChanged {
            origin: BusOrigin::Element,
            state: PipelineState::Paused,
        });
        bus.post(BusMessage::StateChanged {
            origin: BusOrigin::Pipeline,
            state: PipelineState::Playing,
        });

        wait_for(|| host.states() == vec![PipelineState::Playing.code()]);

        player.stop();
        assert_eq!(
            host.states(),
            vec![PipelineState::Playing.code(), PipelineState::Null.code()]
        );
    }

    #[test]
    fn play_requests_playing_state() {
        let engine = Arc::new(FakeEngine::default());
        let host = Arc::new(RecordingHost::default());
        let mut player = controller(engine.clone(), host.clone());

        player.start();
        wait_for(|| !engine.calls().is_empty());
        player.play();
        wait_for(|| engine.count(|c| *c == PipelineCall::SetState(PipelineState::Playing)) == 1);

        player.stop();
    }

    #[test]
    fn play_without_pipeline_is_a_noop() {
        let engine = Arc::new(FakeEngine::default());
        let host = Arc::new(RecordingHost::default());
        let player = controller(engine.clone(), host.clone());

        player.play();
        assert!(engine.calls().is_empty());
    }

    #[test]
    fn build_failure_reports_and_exits_worker() {
        let engine = Arc::new(FakeEngine {
            fail_build: true,
            ..FakeEngine::default()
        });
        let host = Arc::new(RecordingHost::default());
        let mut player = controller(engine.clone(), host.clone());

        player.start();
        wait_for(|| !host.messages.lock().unwrap().is_empty());
        assert!(
            host.messages.lock().unwrap()[0].starts_with("Unable to build pipeline")
        );

        // the worker already left; stop must still return cleanly
        player.stop();
        assert!(engine.calls().is_empty());
        assert!(host.states().is_empty());
    }

    #[test]
    fn restart_rebinds_stored_surface() {
        let engine = Arc::new(FakeEngine::default());
        let host = Arc::new(RecordingHost::default());
        let mut player = controller(engine.clone(), host.clone());

        let surface = SurfaceHandle::from_raw(0xE);
        player.start();
        player.set_surface(surface);
        wait_for(|| host.initialized() == 1);
        player.stop();

        // the surface is still stored, so the rebuilt pipeline binds it again
        player.start();
        wait_for(|| host.initialized() == 2);
        assert_eq!(engine.count(|c| matches!(c, PipelineCall::Build(_))), 2);
        assert_eq!(
            engine.count(|c| *c == PipelineCall::RenderTarget(Some(surface))),
            2
        );

        player.stop();
    }

    #[test]
    fn double_start_keeps_the_first_worker() {
        let engine = Arc::new(FakeEngine::default());
        let host = Arc::new(RecordingHost::default());
        let mut player = controller(engine.clone(), host.clone());

        player.start();
        wait_for(|| !engine.calls().is_empty());
        player.start();
        thread::sleep(Duration::from_millis(50));

        assert_eq!(engine.count(|c| matches!(c, PipelineCall::Build(_))), 1);
        player.stop();
    }
}
