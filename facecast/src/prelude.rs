pub use crate::avatar::{Avatar, Projection, SpriteAvatar};
pub use crate::config::{Args, Config, SourceSpec};
pub use crate::error::{
    AppError, CascadeError, SceneError, SchedulerError, SetupError,
    TextureError,
};
pub use crate::framework::logging::init_logger;
pub use crate::framework::logging::{debug, error, info, trace, warn};
pub use crate::framework::pixels::Pixels;
pub use crate::overlay::{NodeUpdate, Overlay};
pub use crate::render::{Gpu, TextureId, TextureManager};
pub use crate::runtime::dispatch::{Dispatcher, Presenter, run_blocking};
pub use crate::runtime::events::{
    AppEvent, AppEventReceiver, AppEventSender, EventSink, KeyInput,
    UserEvent, event_channel,
};
pub use crate::runtime::frame_clock::FrameClock;
pub use crate::runtime::scheduler::{
    FnTask, PeriodicTask, Scheduler, TaskBody, TaskState,
};
pub use crate::scene::{
    DrawArgs, Drawable, Layout, Node, NodeHandle, NodeId, Rect, SceneGraph,
};
pub use crate::vision::cascade::{Cascade, CascadeDetector, SearchParams};
pub use crate::vision::sources::{FrameSource, ImageSequence};
pub use crate::vision::{
    Detection, Detector, NullDetector, Region, Tracking, VisionSettings,
    VisionTask,
};
