use std::collections::HashMap;
use std::time::Instant;

use log::{debug, info, trace};
use winit::keyboard::KeyCode;

use super::events::{AppEvent, AppEventReceiver, KeyInput, UserEvent};
use super::frame_clock::FrameClock;
use super::scheduler::Scheduler;
use crate::error::SchedulerError;
use crate::scene::SceneGraph;

/// The presentation half of the GPU context.
pub trait Presenter {
    fn resize(&mut self, size: [u32; 2]);

    /// Acquires and clears the next frame. `false` skips this present.
    fn begin_frame(&mut self) -> bool;

    fn present(&mut self);

    /// Frees every GPU resource. Called once, after all tasks stopped.
    fn release_resources(&mut self) {}
}

/// Handed to key handlers so they can end the loop.
#[derive(Debug, Default)]
pub struct LoopControl {
    quit: bool,
}

impl LoopControl {
    pub fn quit(&mut self) {
        self.quit = true;
    }

    pub fn quit_requested(&self) -> bool {
        self.quit
    }
}

type KeyHandler = Box<dyn FnMut(&KeyInput, &mut LoopControl)>;

/// Key code to handler table. Binding a code again replaces its handler.
#[derive(Default)]
pub struct KeyBindings {
    handlers: HashMap<KeyCode, KeyHandler>,
}

impl KeyBindings {
    pub fn bind<F>(&mut self, code: KeyCode, handler: F)
    where
        F: FnMut(&KeyInput, &mut LoopControl) + 'static,
    {
        if self.handlers.insert(code, Box::new(handler)).is_some() {
            debug!("replaced key binding for {:?}", code);
        }
    }

    pub fn unbind(&mut self, code: KeyCode) -> bool {
        self.handlers.remove(&code).is_some()
    }

    pub fn is_bound(&self, code: KeyCode) -> bool {
        self.handlers.contains_key(&code)
    }

    /// Runs the handler bound to the key. Presses and releases both reach
    /// it; handlers check `input.state` themselves.
    pub fn dispatch(
        &mut self,
        input: &KeyInput,
        control: &mut LoopControl,
    ) -> bool {
        match self.handlers.get_mut(&input.code) {
            Some(handler) => {
                handler(input, control);
                true
            }
            None => false,
        }
    }
}

/// Owns the scene graph and the GPU context and reacts to one event at a
/// time. Lives on the GPU thread.
pub struct Dispatcher<C: Presenter, P> {
    graph: SceneGraph<C, P>,
    ctx: C,
    window_size: [u32; 2],
    keys: KeyBindings,
    clock: FrameClock,
    ended: bool,
    released: bool,
    frames_presented: u64,
}

impl<C: Presenter, P> Dispatcher<C, P> {
    pub fn new(ctx: C, graph: SceneGraph<C, P>) -> Self {
        Self {
            window_size: graph.window_size(),
            graph,
            ctx,
            keys: KeyBindings::default(),
            clock: FrameClock::new(),
            ended: false,
            released: false,
            frames_presented: 0,
        }
    }

    pub fn graph(&self) -> &SceneGraph<C, P> {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut SceneGraph<C, P> {
        &mut self.graph
    }

    pub fn ctx(&self) -> &C {
        &self.ctx
    }

    pub fn ctx_mut(&mut self) -> &mut C {
        &mut self.ctx
    }

    pub fn keys_mut(&mut self) -> &mut KeyBindings {
        &mut self.keys
    }

    pub fn window_size(&self) -> [u32; 2] {
        self.window_size
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    pub fn average_fps(&self) -> f32 {
        self.clock.average_fps()
    }

    pub fn ended(&self) -> bool {
        self.ended
    }

    pub fn request_quit(&mut self) {
        self.ended = true;
    }

    /// `true` once `shutdown` freed the GPU context.
    pub fn is_shut_down(&self) -> bool {
        self.released
    }

    /// Handles one event. Returns `false` once the loop should end.
    /// Events still queued after `shutdown` are dropped.
    pub fn handle(&mut self, event: AppEvent) -> bool {
        if self.released {
            trace!("dropping {:?} after shutdown", event);
            return false;
        }
        trace!("dispatch {:?}", event);

        match event {
            AppEvent::Quit => {
                info!("quit requested");
                self.ended = true;
            }
            AppEvent::Resized(size) => self.resize(size),
            AppEvent::Key(input) => {
                let mut control = LoopControl::default();
                self.keys.dispatch(&input, &mut control);
                if control.quit_requested() {
                    self.ended = true;
                }
            }
            AppEvent::User(UserEvent::Refresh) | AppEvent::Redraw => {
                self.redraw();
            }
            AppEvent::User(UserEvent::FrameReady(ids)) => {
                self.graph.sync(&mut self.ctx, &ids);
            }
        }

        !self.ended
    }

    /// Traverses the whole tree and presents. Skipped when the context has
    /// no frame to draw into; pending uploads then wait for the next one.
    pub fn redraw(&mut self) -> bool {
        if self.released || !self.ctx.begin_frame() {
            return false;
        }

        let delta_seconds = self.clock.frame(Instant::now());
        self.graph.traverse_and_draw(
            &mut self.ctx,
            self.window_size,
            delta_seconds,
        );
        self.ctx.present();
        self.frames_presented += 1;
        true
    }

    fn resize(&mut self, size: [u32; 2]) {
        if size[0] == 0 || size[1] == 0 {
            debug!("ignoring resize to {}x{}", size[0], size[1]);
            return;
        }

        self.window_size = size;
        self.graph.set_window_size(size);
        self.ctx.resize(size);
        self.redraw();
    }

    /// Stops every task first so no worker posts into a node whose
    /// resources are gone, then frees GPU resources. Later calls only stop
    /// tasks again.
    pub fn shutdown(
        &mut self,
        scheduler: &mut Scheduler,
    ) -> Result<(), SchedulerError> {
        let stopped = scheduler.stop_all();
        self.ended = true;
        if self.released {
            return stopped;
        }
        self.released = true;
        self.ctx.release_resources();
        info!("shutdown complete after {} frames", self.frames_presented);
        stopped
    }
}

/// Drives `dispatcher` from a channel until quit or until every sender is
/// gone. Returns the number of events handled.
pub fn run_blocking<C: Presenter, P>(
    dispatcher: &mut Dispatcher<C, P>,
    events: &AppEventReceiver,
) -> usize {
    let mut handled = 0;

    while !dispatcher.ended() {
        let Ok(event) = events.recv() else {
            debug!("event channel closed");
            break;
        };
        dispatcher.handle(event);
        handled += 1;
    }

    handled
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use winit::event::ElementState;

    use super::*;
    use crate::runtime::events::event_channel;
    use crate::scene::{DrawArgs, Drawable, Layout, Node, Rect};

    #[derive(Default)]
    struct FakeGpu {
        sizes: Vec<[u32; 2]>,
        frames: usize,
        presents: usize,
        viewports: Vec<Rect>,
        uploads: Vec<u8>,
        refuse_frames: bool,
        released: bool,
    }

    impl Presenter for FakeGpu {
        fn resize(&mut self, size: [u32; 2]) {
            self.sizes.push(size);
        }

        fn begin_frame(&mut self) -> bool {
            self.frames += 1;
            !self.refuse_frames
        }

        fn present(&mut self) {
            self.presents += 1;
        }

        fn release_resources(&mut self) {
            self.released = true;
        }
    }

    struct Panel;

    impl Drawable<FakeGpu, u8> for Panel {
        fn upload(&mut self, ctx: &mut FakeGpu, pending: Option<u8>) {
            ctx.uploads.extend(pending);
        }

        fn draw(&mut self, ctx: &mut FakeGpu, args: &DrawArgs) {
            ctx.viewports.push(args.viewport);
        }
    }

    fn dispatcher() -> Dispatcher<FakeGpu, u8> {
        let mut graph = SceneGraph::new([640, 480]);
        let root = graph.root();
        graph
            .add_child(
                root,
                Node::new("panel", Panel).with_layout(Layout::Fraction {
                    width: 0.5,
                    height: 1.0,
                }),
            )
            .expect("panel");
        Dispatcher::new(FakeGpu::default(), graph)
    }

    #[test]
    fn resize_presents_with_new_layout() {
        let mut dispatcher = dispatcher();

        assert!(dispatcher.handle(AppEvent::Resized([800, 600])));

        let gpu = dispatcher.ctx();
        assert_eq!(gpu.sizes, vec![[800, 600]]);
        assert_eq!(gpu.presents, 1);
        assert_eq!(gpu.viewports, vec![Rect::new(200.0, 0.0, 400.0, 600.0)]);
        assert_eq!(dispatcher.window_size(), [800, 600]);
    }

    #[test]
    fn zero_sized_resize_is_ignored() {
        let mut dispatcher = dispatcher();
        dispatcher.handle(AppEvent::Resized([0, 600]));

        assert!(dispatcher.ctx().sizes.is_empty());
        assert_eq!(dispatcher.frames_presented(), 0);
        assert_eq!(dispatcher.window_size(), [640, 480]);
    }

    #[test]
    fn frame_ready_uploads_without_presenting() {
        let mut dispatcher = dispatcher();
        let panel = dispatcher.graph().draw_order()[1];
        let handle = dispatcher.graph().handle(panel).expect("handle");

        handle.post(9);
        dispatcher.handle(AppEvent::User(UserEvent::FrameReady(vec![panel])));

        let gpu = dispatcher.ctx();
        assert_eq!(gpu.uploads, vec![9]);
        assert_eq!(gpu.presents, 0);
        assert!(gpu.viewports.is_empty());
    }

    #[test]
    fn refresh_and_redraw_present() {
        let mut dispatcher = dispatcher();
        dispatcher.handle(AppEvent::User(UserEvent::Refresh));
        dispatcher.handle(AppEvent::Redraw);

        assert_eq!(dispatcher.ctx().presents, 2);
        assert_eq!(dispatcher.frames_presented(), 2);
    }

    #[test]
    fn refused_frame_keeps_uploads_pending() {
        let mut dispatcher = dispatcher();
        let panel = dispatcher.graph().draw_order()[1];
        let handle = dispatcher.graph().handle(panel).expect("handle");
        dispatcher.ctx_mut().refuse_frames = true;

        handle.post(4);
        dispatcher.handle(AppEvent::User(UserEvent::Refresh));
        assert!(handle.is_dirty());
        assert_eq!(dispatcher.ctx().presents, 0);

        dispatcher.ctx_mut().refuse_frames = false;
        dispatcher.handle(AppEvent::User(UserEvent::Refresh));
        assert!(!handle.is_dirty());
        assert_eq!(dispatcher.ctx().uploads, vec![4]);
        assert_eq!(dispatcher.ctx().frames, 2);
    }

    #[test]
    fn last_key_binding_wins() {
        let mut dispatcher = dispatcher();
        let first = Rc::new(Cell::new(0));
        let second = Rc::new(Cell::new(0));

        let counter = first.clone();
        dispatcher.keys_mut().bind(KeyCode::KeyA, move |_, _| {
            counter.set(counter.get() + 1);
        });
        let counter = second.clone();
        dispatcher.keys_mut().bind(KeyCode::KeyA, move |_, _| {
            counter.set(counter.get() + 1);
        });

        dispatcher.handle(AppEvent::Key(KeyInput::pressed(KeyCode::KeyA)));

        assert_eq!(first.get(), 0);
        assert_eq!(second.get(), 1);
    }

    #[test]
    fn releases_reach_key_handlers() {
        let mut dispatcher = dispatcher();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let log = seen.clone();
        dispatcher.keys_mut().bind(KeyCode::Space, move |input, control| {
            log.borrow_mut().push(input.state);
            if !input.is_pressed() {
                control.quit();
            }
        });

        assert!(dispatcher.handle(AppEvent::Key(KeyInput::pressed(
            KeyCode::Space
        ))));
        assert!(!dispatcher.handle(AppEvent::Key(KeyInput::released(
            KeyCode::Space
        ))));
        assert_eq!(
            *seen.borrow(),
            vec![ElementState::Pressed, ElementState::Released]
        );
    }

    #[test]
    fn key_handler_can_quit() {
        let mut dispatcher = dispatcher();
        dispatcher
            .keys_mut()
            .bind(KeyCode::Escape, |_, control| control.quit());

        let unbound = AppEvent::Key(KeyInput::pressed(KeyCode::KeyQ));
        let escape = AppEvent::Key(KeyInput::pressed(KeyCode::Escape));

        assert!(dispatcher.handle(unbound));
        assert!(!dispatcher.handle(escape));
        assert!(dispatcher.ended());
    }

    #[test]
    fn run_blocking_stops_at_quit() {
        let mut dispatcher = dispatcher();
        let (tx, rx) = event_channel();

        tx.send(AppEvent::User(UserEvent::Refresh)).expect("send");
        tx.send(AppEvent::Quit).expect("send");
        tx.send(AppEvent::User(UserEvent::Refresh)).expect("send");

        assert_eq!(run_blocking(&mut dispatcher, &rx), 2);
        assert_eq!(dispatcher.frames_presented(), 1);
    }

    #[test]
    fn run_blocking_stops_when_senders_are_gone() {
        let mut dispatcher = dispatcher();
        let (tx, rx) = event_channel();
        tx.send(AppEvent::Redraw).expect("send");
        drop(tx);

        assert_eq!(run_blocking(&mut dispatcher, &rx), 1);
        assert!(!dispatcher.ended());
    }

    #[test]
    fn shutdown_releases_gpu_resources() {
        let mut dispatcher = dispatcher();
        let mut scheduler = Scheduler::new();

        dispatcher.shutdown(&mut scheduler).expect("shutdown");
        assert!(dispatcher.ctx().released);
        assert!(dispatcher.is_shut_down());
        assert!(dispatcher.ended());
    }

    #[test]
    fn events_after_shutdown_never_touch_the_gpu() {
        let mut dispatcher = dispatcher();
        let mut scheduler = Scheduler::new();
        let panel = dispatcher.graph().draw_order()[1];
        let handle = dispatcher.graph().handle(panel).expect("handle");

        dispatcher.shutdown(&mut scheduler).expect("shutdown");
        handle.post(7);

        assert!(!dispatcher.handle(AppEvent::User(UserEvent::Refresh)));
        assert!(!dispatcher.handle(AppEvent::Redraw));
        assert!(!dispatcher.handle(AppEvent::Resized([800, 600])));
        assert!(!dispatcher.handle(AppEvent::User(UserEvent::FrameReady(
            vec![panel]
        ))));
        assert!(!dispatcher.redraw());

        let gpu = dispatcher.ctx();
        assert_eq!((gpu.frames, gpu.presents), (0, 0));
        assert!(gpu.sizes.is_empty());
        assert!(gpu.uploads.is_empty());
        assert_eq!(dispatcher.frames_presented(), 0);

        dispatcher.shutdown(&mut scheduler).expect("second shutdown");
    }
}
