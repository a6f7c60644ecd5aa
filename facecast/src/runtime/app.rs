use std::sync::Arc;

use log::{error, info, warn};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{KeyEvent, WindowEvent};
use winit::event_loop::{
    ActiveEventLoop, ControlFlow, EventLoop, EventLoopProxy,
};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowAttributes, WindowId};

use super::dispatch::Dispatcher;
use super::events::{AppEvent, EventSink, KeyInput, UserEvent};
use super::scheduler::{FnTask, PeriodicTask, Scheduler};
use crate::avatar::SpriteAvatar;
use crate::config::{Config, SourceSpec};
use crate::error::{AppError, SetupError};
use crate::framework::pixels::Pixels;
use crate::overlay::{self, NodeUpdate};
use crate::render::Gpu;
use crate::vision::cascade::CascadeDetector;
use crate::vision::sources::{FrameSource, ImageSequence};
use crate::vision::{Detector, NullDetector, VisionTask};

/// Opens the configured frame source.
pub fn open_source(
    config: &Config,
) -> Result<Box<dyn FrameSource>, SetupError> {
    match config.source()? {
        SourceSpec::Frames { dir, looping } => {
            Ok(Box::new(ImageSequence::open(&dir, looping)?))
        }
        #[cfg(feature = "camera")]
        SourceSpec::Camera(index) => Ok(Box::new(
            crate::vision::sources::CameraSource::open(index)?,
        )),
        #[cfg(not(feature = "camera"))]
        SourceSpec::Camera(index) => Err(SetupError::new(format!(
            "camera {} unavailable: built without the `camera` feature",
            index
        ))),
    }
}

/// Loads the configured face and eye cascades. Without them nothing is
/// ever detected and the avatar keeps its rest pose.
pub fn open_detector(
    config: &Config,
) -> Result<Box<dyn Detector>, SetupError> {
    match config.cascades() {
        Some((face, eyes)) => Ok(Box::new(CascadeDetector::load(face, eyes)?)),
        None => {
            info!("No cascades configured, face tracking is off");
            Ok(Box::new(NullDetector))
        }
    }
}

/// Reads the frame that sizes the window and the background texture.
pub fn read_first_frame(
    source: &mut dyn FrameSource,
) -> Result<Pixels, SetupError> {
    source.read().ok_or_else(|| {
        SetupError::new(format!(
            "{} ended before the first frame",
            source.describe()
        ))
    })
}

struct FacecastApp {
    config: Config,
    proxy: EventLoopProxy<UserEvent>,
    source: Option<Box<dyn FrameSource>>,
    detector: Option<Box<dyn Detector>>,
    first_frame: Pixels,
    window: Option<Arc<Window>>,
    window_id: Option<WindowId>,
    dispatcher: Option<Dispatcher<Gpu, NodeUpdate>>,
    scheduler: Scheduler,
    fatal: Option<AppError>,
    shut_down: bool,
}

impl FacecastApp {
    fn new(
        config: Config,
        proxy: EventLoopProxy<UserEvent>,
        source: Box<dyn FrameSource>,
        detector: Box<dyn Detector>,
        first_frame: Pixels,
    ) -> Self {
        Self {
            config,
            proxy,
            source: Some(source),
            detector: Some(detector),
            first_frame,
            window: None,
            window_id: None,
            dispatcher: None,
            scheduler: Scheduler::new(),
            fatal: None,
            shut_down: false,
        }
    }

    // Window, GPU and scene first; workers only once there is something
    // for them to post into.
    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<(), AppError> {
        let [width, height] = self.first_frame.size();
        let attrs = WindowAttributes::default()
            .with_title(self.config.title.clone())
            .with_inner_size(PhysicalSize::new(width, height));

        let window =
            Arc::new(event_loop.create_window(attrs).map_err(|err| {
                SetupError::new(format!("failed to create window: {}", err))
            })?);

        let gpu = Gpu::new(window.clone())?;
        let avatar = SpriteAvatar::new(&gpu, &self.config.avatar)?;
        let overlay =
            overlay::build_overlay(&gpu, &self.first_frame, Box::new(avatar))?;

        let mut dispatcher = Dispatcher::new(gpu, overlay.graph);
        dispatcher.keys_mut().bind(KeyCode::Escape, |input, control| {
            if input.is_pressed() {
                control.quit();
            }
        });

        self.window_id = Some(window.id());
        self.window = Some(window);
        self.dispatcher = Some(dispatcher);

        let source = self
            .source
            .take()
            .ok_or_else(|| SetupError::new("frame source already in use"))?;
        let detector = self
            .detector
            .take()
            .ok_or_else(|| SetupError::new("detector already in use"))?;

        let vision = PeriodicTask::new(
            self.config.vision_interval(),
            VisionTask::new(
                source,
                detector,
                self.config.vision_settings(),
                overlay.background,
                overlay.avatar,
                self.proxy.clone(),
            ),
        )?;
        self.scheduler.spawn("vision", vision)?;

        let proxy = self.proxy.clone();
        let render = PeriodicTask::new(
            self.config.render_interval(),
            FnTask::new(move || proxy.post(UserEvent::Refresh)),
        )?;
        self.scheduler.spawn("render", render)?;

        info!("Running {}", self.scheduler.running().join(", "));
        Ok(())
    }

    fn dispatch(&mut self, event_loop: &ActiveEventLoop, event: AppEvent) {
        if self.shut_down {
            return;
        }
        let Some(dispatcher) = self.dispatcher.as_mut() else {
            return;
        };
        if !dispatcher.handle(event) {
            self.shutdown(event_loop);
        }
    }

    fn fail(&mut self, err: AppError) {
        error!("{}", err);
        self.fatal.get_or_insert(err);
    }

    // Tasks stop before GPU resources go; a never-initialised runtime only
    // has tasks to stop.
    fn teardown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        let stopped = match self.dispatcher.as_mut() {
            Some(dispatcher) => dispatcher.shutdown(&mut self.scheduler),
            None => self.scheduler.stop_all(),
        };
        if let Err(err) = stopped {
            self.fail(err.into());
        }
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        self.teardown();
        event_loop.exit();
    }
}

impl ApplicationHandler<UserEvent> for FacecastApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() || self.shut_down {
            return;
        }

        if let Err(err) = self.init(event_loop) {
            self.fail(err);
            self.shutdown(event_loop);
            return;
        }

        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: UserEvent) {
        self.dispatch(event_loop, AppEvent::User(event));
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if self.window_id != Some(window_id) {
            return;
        }

        let event = match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                AppEvent::Quit
            }
            WindowEvent::Resized(size) => {
                AppEvent::Resized([size.width, size.height])
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state,
                        repeat: false,
                        ..
                    },
                ..
            } => AppEvent::Key(KeyInput { code, state }),
            WindowEvent::RedrawRequested => AppEvent::Redraw,
            _ => return,
        };

        self.dispatch(event_loop, event);
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.teardown();
    }
}

/// Loads the detector and opens the frame source, then runs the window
/// until quit. Tasks are stopped and GPU resources released before this
/// returns.
pub fn run(config: Config) -> Result<(), AppError> {
    let detector = open_detector(&config)?;
    let mut source = open_source(&config)?;
    let first_frame = read_first_frame(source.as_mut())?;
    info!(
        "First frame {}x{} from {}",
        first_frame.width(),
        first_frame.height(),
        source.describe()
    );

    let event_loop = EventLoop::<UserEvent>::with_user_event()
        .build()
        .map_err(|err| {
            SetupError::new(format!("failed to create event loop: {}", err))
        })?;
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = FacecastApp::new(
        config,
        event_loop.create_proxy(),
        source,
        detector,
        first_frame,
    );

    if let Err(err) = event_loop.run_app(&mut app) {
        warn!("Event loop ended with an error: {}", err);
        app.teardown();
        app.fatal.get_or_insert(
            SetupError::new(format!("event loop failed: {}", err)).into(),
        );
    }

    match app.fatal.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
