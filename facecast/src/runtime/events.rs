use std::sync::mpsc::{self, Receiver, Sender};

use winit::event::ElementState;
use winit::event_loop::EventLoopProxy;
use winit::keyboard::KeyCode;

use crate::scene::NodeId;

/// Events worker threads raise for the GPU thread.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum UserEvent {
    /// Full traversal and present.
    Refresh,
    /// Pending uploads are waiting on these nodes. No present.
    FrameReady(Vec<NodeId>),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct KeyInput {
    pub code: KeyCode,
    pub state: ElementState,
}

impl KeyInput {
    pub fn pressed(code: KeyCode) -> Self {
        Self {
            code,
            state: ElementState::Pressed,
        }
    }

    pub fn released(code: KeyCode) -> Self {
        Self {
            code,
            state: ElementState::Released,
        }
    }

    pub fn is_pressed(&self) -> bool {
        self.state == ElementState::Pressed
    }
}

/// Everything the dispatch loop reacts to, independent of the window
/// system that produced it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AppEvent {
    Quit,
    Resized([u32; 2]),
    Key(KeyInput),
    User(UserEvent),
    Redraw,
}

impl From<UserEvent> for AppEvent {
    fn from(event: UserEvent) -> Self {
        AppEvent::User(event)
    }
}

/// Cross-thread posting endpoint. `post` returns `false` once the loop on
/// the other side is gone.
pub trait EventSink: Send + 'static {
    fn post(&self, event: UserEvent) -> bool;
}

impl EventSink for EventLoopProxy<UserEvent> {
    fn post(&self, event: UserEvent) -> bool {
        self.send_event(event).is_ok()
    }
}

impl EventSink for Sender<AppEvent> {
    fn post(&self, event: UserEvent) -> bool {
        self.send(AppEvent::User(event)).is_ok()
    }
}

pub type AppEventSender = Sender<AppEvent>;
pub type AppEventReceiver = Receiver<AppEvent>;

pub fn event_channel() -> (AppEventSender, AppEventReceiver) {
    mpsc::channel()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_sink_wraps_user_events() {
        let (tx, rx) = event_channel();

        assert!(tx.post(UserEvent::Refresh));
        assert_eq!(
            rx.recv().expect("recv"),
            AppEvent::User(UserEvent::Refresh)
        );

        drop(rx);
        assert!(!tx.post(UserEvent::Refresh));
    }
}
