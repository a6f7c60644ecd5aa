pub mod graph;
pub mod layout;
pub mod node;

pub use graph::SceneGraph;
pub use layout::{Layout, Rect};
pub use node::{DrawArgs, Drawable, Group, Node, NodeHandle, NodeId};
