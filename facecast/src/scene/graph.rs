use std::thread::{self, ThreadId};

use log::trace;

use super::layout::{Layout, Rect};
use super::node::{DrawArgs, Node, NodeHandle, NodeId};
use crate::error::SceneError;

/// Ownership tree of renderable nodes rooted at the window.
///
/// Topology changes and traversal belong to the thread that created the
/// graph. Workers only touch nodes through their [`NodeHandle`]s.
pub struct SceneGraph<C, P> {
    root: Node<C, P>,
    window_size: [u32; 2],
    owner: ThreadId,
}

impl<C, P> SceneGraph<C, P> {
    pub fn new(window_size: [u32; 2]) -> Self {
        Self {
            root: Node::group("window"),
            window_size,
            owner: thread::current().id(),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root.id
    }

    pub fn window_size(&self) -> [u32; 2] {
        self.window_size
    }

    pub fn set_window_size(&mut self, window_size: [u32; 2]) {
        self.assert_owner();
        self.window_size = window_size;
    }

    pub fn len(&self) -> usize {
        self.root.count()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.root.contains(id)
    }

    pub fn get(&self, id: NodeId) -> Option<&Node<C, P>> {
        find(&self.root, id)
    }

    pub fn handle(&self, id: NodeId) -> Option<NodeHandle<P>> {
        self.get(id).map(Node::handle)
    }

    /// Appends `node` (and its subtree) as the last child of `parent`, so it
    /// paints over its earlier siblings.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        mut node: Node<C, P>,
    ) -> Result<NodeId, SceneError> {
        self.assert_owner();

        let parent_node = find_mut(&mut self.root, parent)
            .ok_or(SceneError::UnknownNode(parent))?;

        let id = node.id;
        node.parent = Some(parent);
        parent_node.children.push(node);

        trace!("added {} under {}", id, parent);
        Ok(id)
    }

    pub fn set_layout(
        &mut self,
        id: NodeId,
        layout: Layout,
    ) -> Result<(), SceneError> {
        self.assert_owner();
        let node =
            find_mut(&mut self.root, id).ok_or(SceneError::UnknownNode(id))?;
        node.layout = layout;
        Ok(())
    }

    /// Moves `child` to the end of `new_parent`'s children.
    pub fn reparent(
        &mut self,
        child: NodeId,
        new_parent: NodeId,
    ) -> Result<(), SceneError> {
        self.assert_owner();

        if child == self.root.id {
            return Err(SceneError::RootMove);
        }

        let subtree = self.get(child).ok_or(SceneError::UnknownNode(child))?;
        if subtree.contains(new_parent) {
            return Err(SceneError::Cycle {
                child,
                parent: new_parent,
            });
        }
        if !self.contains(new_parent) {
            return Err(SceneError::UnknownNode(new_parent));
        }

        let node = self.detach(child)?;
        self.add_child(new_parent, node)?;
        Ok(())
    }

    /// Removes `id` and its subtree from the graph and hands ownership back.
    pub fn detach(&mut self, id: NodeId) -> Result<Node<C, P>, SceneError> {
        self.assert_owner();

        if id == self.root.id {
            return Err(SceneError::RootMove);
        }

        let parent_id = self
            .get(id)
            .and_then(Node::parent)
            .ok_or(SceneError::UnknownNode(id))?;
        let parent = find_mut(&mut self.root, parent_id)
            .ok_or(SceneError::UnknownNode(parent_id))?;
        let index = parent
            .children
            .iter()
            .position(|child| child.id == id)
            .ok_or(SceneError::UnknownNode(id))?;

        let mut node = parent.children.remove(index);
        node.parent = None;
        Ok(node)
    }

    /// Detaches every child of `id`. The subtrees are returned, not dropped.
    pub fn remove_all_children(
        &mut self,
        id: NodeId,
    ) -> Result<Vec<Node<C, P>>, SceneError> {
        self.assert_owner();

        let node =
            find_mut(&mut self.root, id).ok_or(SceneError::UnknownNode(id))?;
        let mut children = std::mem::take(&mut node.children);
        for child in &mut children {
            child.parent = None;
        }
        Ok(children)
    }

    /// Node ids in draw order.
    pub fn draw_order(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.len());
        collect_order(&self.root, &mut order);
        order
    }

    /// Full depth-first pass: pending uploads, layout, then draw, parent
    /// before children. Returns the number of nodes that uploaded.
    pub fn traverse_and_draw(
        &mut self,
        ctx: &mut C,
        window_size: [u32; 2],
        delta_seconds: f32,
    ) -> usize {
        self.assert_owner();
        self.window_size = window_size;

        let window = Rect::from_size(window_size);
        let mut uploads = 0;
        visit(
            &mut self.root,
            ctx,
            &window,
            window_size,
            delta_seconds,
            &mut uploads,
        );
        uploads
    }

    /// Upload-only pass over `ids`. Unknown ids are skipped.
    pub fn sync(&mut self, ctx: &mut C, ids: &[NodeId]) -> usize {
        self.assert_owner();

        let mut uploads = 0;
        for id in ids {
            if let Some(node) = find_mut(&mut self.root, *id) {
                if node.sync(ctx) {
                    uploads += 1;
                }
            }
        }
        uploads
    }

    fn assert_owner(&self) {
        debug_assert_eq!(
            thread::current().id(),
            self.owner,
            "scene graph used off its owning thread"
        );
    }
}

fn visit<C, P>(
    node: &mut Node<C, P>,
    ctx: &mut C,
    parent: &Rect,
    window_size: [u32; 2],
    delta_seconds: f32,
    uploads: &mut usize,
) {
    if node.sync(ctx) {
        *uploads += 1;
    }

    let args = DrawArgs {
        viewport: node.layout.resolve(parent),
        window_size,
        delta_seconds,
    };
    node.drawable.draw(ctx, &args);

    for child in &mut node.children {
        visit(child, ctx, &args.viewport, window_size, delta_seconds, uploads);
    }
}

fn find<C, P>(node: &Node<C, P>, id: NodeId) -> Option<&Node<C, P>> {
    if node.id == id {
        return Some(node);
    }
    node.children.iter().find_map(|child| find(child, id))
}

fn find_mut<C, P>(
    node: &mut Node<C, P>,
    id: NodeId,
) -> Option<&mut Node<C, P>> {
    if node.id == id {
        return Some(node);
    }
    node.children
        .iter_mut()
        .find_map(|child| find_mut(child, id))
}

fn collect_order<C, P>(node: &Node<C, P>, order: &mut Vec<NodeId>) {
    order.push(node.id);
    for child in &node.children {
        collect_order(child, order);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use parking_lot::Mutex;

    use super::*;
    use crate::scene::node::Drawable;

    #[derive(Default)]
    struct Log {
        draws: Vec<(String, Rect)>,
        uploads: Vec<(String, Option<u32>)>,
    }

    struct Recorder(&'static str);

    impl Drawable<Log, u32> for Recorder {
        fn upload(&mut self, ctx: &mut Log, pending: Option<u32>) {
            ctx.uploads.push((self.0.to_string(), pending));
        }

        fn draw(&mut self, ctx: &mut Log, args: &DrawArgs) {
            ctx.draws.push((self.0.to_string(), args.viewport));
        }
    }

    fn node(label: &'static str) -> Node<Log, u32> {
        Node::new(label, Recorder(label))
    }

    fn drawn(log: &Log) -> Vec<&str> {
        log.draws.iter().map(|(name, _)| name.as_str()).collect()
    }

    #[test]
    fn traversal_is_preorder_in_insertion_order() {
        let mut graph = SceneGraph::new([640, 480]);
        let root = graph.root();
        let a = graph.add_child(root, node("a")).expect("a");
        graph.add_child(root, node("b")).expect("b");
        graph.add_child(a, node("a1")).expect("a1");
        graph.add_child(a, node("a2")).expect("a2");

        let mut log = Log::default();
        graph.traverse_and_draw(&mut log, [640, 480], 0.016);

        assert_eq!(drawn(&log), vec!["a", "a1", "a2", "b"]);
        assert_eq!(graph.len(), 5);
    }

    #[test]
    fn layout_is_resolved_against_current_window_size() {
        let mut graph = SceneGraph::new([640, 480]);
        let root = graph.root();
        let panel = node("panel").with_layout(Layout::Fraction {
            width: 0.5,
            height: 0.5,
        });
        graph.add_child(root, panel).expect("panel");

        let mut log = Log::default();
        graph.traverse_and_draw(&mut log, [640, 480], 0.0);
        graph.traverse_and_draw(&mut log, [800, 600], 0.0);

        assert_eq!(log.draws[0].1, Rect::new(160.0, 120.0, 320.0, 240.0));
        assert_eq!(log.draws[1].1, Rect::new(200.0, 150.0, 400.0, 300.0));
        assert_eq!(graph.window_size(), [800, 600]);
    }

    #[test]
    fn nan_layout_draws_empty_and_keeps_children_drawing() {
        let mut graph = SceneGraph::new([640, 480]);
        let root = graph.root();
        let broken = node("broken").with_layout(Layout::Fraction {
            width: f32::NAN,
            height: 0.5,
        });
        let broken = graph.add_child(root, broken).expect("broken");
        graph.add_child(broken, node("child")).expect("child");
        graph.add_child(root, node("sibling")).expect("sibling");

        let mut log = Log::default();
        graph.traverse_and_draw(&mut log, [640, 480], 0.016);

        assert_eq!(drawn(&log), vec!["broken", "child", "sibling"]);
        assert_eq!(log.draws[0].1, Rect::new(0.0, 0.0, 0.0, 0.0));
        assert_eq!(log.draws[1].1, Rect::new(0.0, 0.0, 0.0, 0.0));
        assert_eq!(log.draws[2].1, Rect::new(0.0, 0.0, 640.0, 480.0));
    }

    #[test]
    fn sync_uploads_without_drawing() {
        let mut graph = SceneGraph::new([64, 64]);
        let root = graph.root();
        let id = graph.add_child(root, node("bg")).expect("bg");
        let handle = graph.handle(id).expect("handle");

        handle.post(3);
        let mut log = Log::default();
        assert_eq!(graph.sync(&mut log, &[id]), 1);
        assert_eq!(graph.sync(&mut log, &[id]), 0);

        assert!(log.draws.is_empty());
        assert_eq!(log.uploads, vec![("bg".to_string(), Some(3))]);
    }

    #[test]
    fn reparent_rejects_cycles_and_root() {
        let mut graph = SceneGraph::new([64, 64]);
        let root = graph.root();
        let a = graph.add_child(root, node("a")).expect("a");
        let b = graph.add_child(a, node("b")).expect("b");

        assert_eq!(
            graph.reparent(a, b),
            Err(SceneError::Cycle {
                child: a,
                parent: b
            })
        );
        assert_eq!(
            graph.reparent(a, a),
            Err(SceneError::Cycle {
                child: a,
                parent: a
            })
        );
        assert_eq!(graph.reparent(root, a), Err(SceneError::RootMove));

        graph.reparent(b, root).expect("move b up");
        assert_eq!(graph.get(b).and_then(Node::parent), Some(root));

        let mut log = Log::default();
        graph.traverse_and_draw(&mut log, [64, 64], 0.0);
        assert_eq!(drawn(&log), vec!["a", "b"]);
    }

    #[test]
    fn unknown_nodes_are_reported() {
        let mut graph = SceneGraph::<Log, u32>::new([64, 64]);
        let stray = node("stray");
        let stray_id = stray.id();

        assert_eq!(
            graph.add_child(stray_id, node("x")).map(|_| ()),
            Err(SceneError::UnknownNode(stray_id))
        );
        assert_eq!(
            graph.reparent(stray_id, graph.root()),
            Err(SceneError::UnknownNode(stray_id))
        );
    }

    #[test]
    fn remove_all_children_returns_subtrees() {
        let mut graph = SceneGraph::new([64, 64]);
        let root = graph.root();
        let a = graph.add_child(root, node("a")).expect("a");
        graph.add_child(a, node("a1")).expect("a1");
        graph.add_child(root, node("b")).expect("b");

        let removed = graph.remove_all_children(root).expect("remove");

        assert_eq!(removed.len(), 2);
        assert_eq!(removed[0].children().len(), 1);
        assert!(removed.iter().all(|node| node.parent().is_none()));
        assert_eq!(graph.len(), 1);

        let reattached = removed.into_iter().next().expect("a");
        graph.add_child(root, reattached).expect("reattach");
        assert_eq!(graph.len(), 3);
    }

    /// A worker posts a numbered stream while the owner traverses. Every
    /// payload must be either uploaded exactly once or handed back by
    /// `post` as superseded, and uploads must arrive in order.
    #[test]
    fn concurrent_posts_are_consumed_at_most_once() {
        const POSTS: u32 = 2_000;

        let mut graph = SceneGraph::new([64, 64]);
        let root = graph.root();
        let id = graph.add_child(root, node("bg")).expect("bg");
        let handle = graph.handle(id).expect("handle");

        let superseded = Arc::new(Mutex::new(Vec::new()));
        let worker = {
            let superseded = superseded.clone();
            thread::spawn(move || {
                for n in 1..=POSTS {
                    if let Some(old) = handle.post(n) {
                        superseded.lock().push(old);
                    }
                    if n % 16 == 0 {
                        thread::yield_now();
                    }
                }
            })
        };

        let mut log = Log::default();
        while !worker.is_finished() {
            graph.traverse_and_draw(&mut log, [64, 64], 0.0);
        }
        worker.join().expect("worker");
        graph.traverse_and_draw(&mut log, [64, 64], 0.0);

        let uploaded = log
            .uploads
            .iter()
            .map(|(_, pending)| pending.expect("payload with every mark"))
            .collect::<Vec<_>>();

        assert!(uploaded.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(uploaded.last(), Some(&POSTS));

        let mut all = uploaded;
        all.extend(superseded.lock().iter().copied());
        all.sort_unstable();
        assert_eq!(all, (1..=POSTS).collect::<Vec<_>>());
    }
}
