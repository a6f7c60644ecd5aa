use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use super::layout::{Layout, Rect};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct NodeId(u64);

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

impl NodeId {
    fn next() -> Self {
        Self(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Per-draw inputs handed to a node after its layout has been resolved.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawArgs {
    pub viewport: Rect,
    pub window_size: [u32; 2],
    pub delta_seconds: f32,
}

/// The behaviour attached to a node. `C` is the GPU-side context, `P` the
/// payload worker threads post into the node.
pub trait Drawable<C, P> {
    /// Consumes pending data while the node lock is held. Runs only when
    /// the node is dirty.
    fn upload(&mut self, _ctx: &mut C, _pending: Option<P>) {}

    /// Records draw commands. Never called with the node lock held.
    fn draw(&mut self, ctx: &mut C, args: &DrawArgs);
}

/// Structural node with nothing to draw.
#[derive(Clone, Copy, Debug, Default)]
pub struct Group;

impl<C, P> Drawable<C, P> for Group {
    fn draw(&mut self, _ctx: &mut C, _args: &DrawArgs) {}
}

struct SyncState<P> {
    dirty: bool,
    pending: Option<P>,
}

/// Thread-safe side of a node. Workers hold clones of this; the node itself
/// stays on the GPU thread.
pub struct NodeHandle<P> {
    id: NodeId,
    state: Arc<Mutex<SyncState<P>>>,
}

impl<P> Clone for NodeHandle<P> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            state: self.state.clone(),
        }
    }
}

impl<P> fmt::Debug for NodeHandle<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeHandle")
            .field("id", &self.id)
            .field("dirty", &self.is_dirty())
            .finish()
    }
}

impl<P> NodeHandle<P> {
    fn new(id: NodeId) -> Self {
        Self {
            id,
            state: Arc::new(Mutex::new(SyncState {
                dirty: false,
                pending: None,
            })),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn mark_dirty(&self) {
        self.state.lock().dirty = true;
    }

    /// Replaces the pending payload and marks the node dirty. Returns the
    /// previous payload if the GPU thread never consumed it.
    pub fn post(&self, payload: P) -> Option<P> {
        let mut state = self.state.lock();
        state.dirty = true;
        state.pending.replace(payload)
    }

    pub fn is_dirty(&self) -> bool {
        self.state.lock().dirty
    }
}

pub struct Node<C, P> {
    pub(crate) id: NodeId,
    pub(crate) handle: NodeHandle<P>,
    pub(crate) drawable: Box<dyn Drawable<C, P>>,
    pub(crate) layout: Layout,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<Node<C, P>>,
    label: String,
}

impl<C, P> Node<C, P> {
    pub fn new(label: &str, drawable: impl Drawable<C, P> + 'static) -> Self {
        let id = NodeId::next();
        Self {
            id,
            handle: NodeHandle::new(id),
            drawable: Box::new(drawable),
            layout: Layout::Fill,
            parent: None,
            children: Vec::new(),
            label: label.to_string(),
        }
    }

    pub fn group(label: &str) -> Self {
        Self::new(label, Group)
    }

    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    /// Builder-style child attachment for assembling a subtree before it
    /// joins a graph.
    pub fn with_child(mut self, mut child: Node<C, P>) -> Self {
        child.parent = Some(self.id);
        self.children.push(child);
        self
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn handle(&self) -> NodeHandle<P> {
        self.handle.clone()
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[Node<C, P>] {
        &self.children
    }

    pub(crate) fn contains(&self, id: NodeId) -> bool {
        self.id == id || self.children.iter().any(|child| child.contains(id))
    }

    pub(crate) fn count(&self) -> usize {
        1 + self.children.iter().map(Node::count).sum::<usize>()
    }

    /// Runs the upload step if the node is dirty. The flag is cleared only
    /// after `upload` returns, both under the same lock.
    pub(crate) fn sync(&mut self, ctx: &mut C) -> bool {
        let mut state = self.handle.state.lock();
        if !state.dirty {
            return false;
        }

        let pending = state.pending.take();
        self.drawable.upload(ctx, pending);
        state.dirty = false;
        true
    }
}

impl<C, P> fmt::Debug for Node<C, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("layout", &self.layout)
            .field("parent", &self.parent)
            .field("children", &self.children.len())
            .finish()
    }
}
