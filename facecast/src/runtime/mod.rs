pub mod app;
pub mod dispatch;
pub mod events;
pub mod frame_clock;
pub mod scheduler;

pub use app::run;
pub use dispatch::{Dispatcher, KeyBindings, LoopControl, Presenter};
pub use events::{AppEvent, EventSink, KeyInput, UserEvent};
pub use scheduler::{FnTask, PeriodicTask, Scheduler, TaskBody, TaskState};
