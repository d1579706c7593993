//! In-memory accessibility engine over a serialisable UI tree
//!
//! `SnapshotEngine` replays a [`UINode`] tree (usually loaded from JSON) as if
//! it were a live host. Each `fetch_root` takes a snapshot of the current tree,
//! so replacing the tree mid-scan does not disturb handles already handed out.
//! The engine keeps books on every handle it acquires and releases, records
//! which nodes were touched and which gestures were submitted, and can inject
//! failures: an unavailable window, attribute reads that fail for chosen
//! nodes, and gestures that are cancelled, rejected, or never answered.

use super::{
    AccessibilityEngine, Bounds, GestureDescription, GestureOutcome, NodeHandle, UiNode,
};
use crate::AutomationError;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::debug;

/// Attributes of a node in a serialised tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(alias = "elementId", skip_serializing_if = "Option::is_none")]
    pub element_id: Option<String>,
    pub interactable: bool,
    pub bounds: Bounds,
}

/// A node in a serialised UI tree, with its attributes and children.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UINode {
    /// Stable name for bookkeeping. Nodes without one are named by their
    /// child-index path from the root, e.g. `0.2.1`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub attributes: NodeAttributes,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<UINode>,
}

impl UINode {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Default::default()
        }
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.attributes.text = Some(text.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.attributes.description = Some(description.into());
        self
    }

    pub fn element_id(mut self, element_id: impl Into<String>) -> Self {
        self.attributes.element_id = Some(element_id.into());
        self
    }

    pub fn interactable(mut self, interactable: bool) -> Self {
        self.attributes.interactable = interactable;
        self
    }

    pub fn bounds(mut self, left: f64, top: f64, right: f64, bottom: f64) -> Self {
        self.attributes.bounds = Bounds::new(left, top, right, bottom);
        self
    }

    pub fn child(mut self, child: UINode) -> Self {
        self.children.push(child);
        self
    }
}

/// How the engine answers submitted gestures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GestureMode {
    #[default]
    Complete,
    Cancel,
    /// Refuse the submission outright.
    Reject,
    /// Accept the submission and never answer.
    Hold,
}

struct FlatNode {
    id: String,
    attributes: NodeAttributes,
    parent: Option<usize>,
    children: Vec<usize>,
}

/// Arena form of a [`UINode`] tree; index 0 is the root.
struct FlatTree {
    nodes: Vec<FlatNode>,
}

impl FlatTree {
    fn build(root: &UINode) -> Self {
        let mut nodes = Vec::new();
        Self::push(&mut nodes, root, None, "0".to_string());
        Self { nodes }
    }

    fn push(
        nodes: &mut Vec<FlatNode>,
        node: &UINode,
        parent: Option<usize>,
        path: String,
    ) -> usize {
        let index = nodes.len();
        nodes.push(FlatNode {
            id: node.id.clone().unwrap_or_else(|| path.clone()),
            attributes: node.attributes.clone(),
            parent,
            children: Vec::with_capacity(node.children.len()),
        });
        for (position, child) in node.children.iter().enumerate() {
            let child_path = format!("{path}.{position}");
            let child_index = Self::push(nodes, child, Some(index), child_path);
            nodes[index].children.push(child_index);
        }
        index
    }
}

#[derive(Default)]
struct EngineState {
    tree: RwLock<Option<Arc<FlatTree>>>,
    gesture_mode: Mutex<GestureMode>,
    failing: RwLock<HashSet<String>>,
    acquired: AtomicUsize,
    released: AtomicUsize,
    touched: Mutex<Vec<String>>,
    gestures: Mutex<Vec<GestureDescription>>,
    held: Mutex<Vec<oneshot::Sender<GestureOutcome>>>,
}

/// Reference [`AccessibilityEngine`] backed by an in-memory tree.
#[derive(Clone, Default)]
pub struct SnapshotEngine {
    state: Arc<EngineState>,
}

impl SnapshotEngine {
    pub fn new(root: UINode) -> Self {
        let engine = Self::default();
        engine.set_tree(Some(root));
        engine
    }

    /// An engine with no accessible window.
    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, AutomationError> {
        let root: UINode = serde_json::from_str(json)
            .map_err(|e| AutomationError::InvalidArgument(format!("Invalid UI tree JSON: {e}")))?;
        Ok(Self::new(root))
    }

    /// Replace the live tree. `None` makes the window unavailable.
    pub fn set_tree(&self, root: Option<UINode>) {
        *self.state.tree.write() = root.as_ref().map(|r| Arc::new(FlatTree::build(r)));
    }

    pub fn set_gesture_mode(&self, mode: GestureMode) {
        *self.state.gesture_mode.lock() = mode;
    }

    /// Make every attribute read on the node named `id` fail.
    pub fn fail_reads_for(&self, id: impl Into<String>) {
        self.state.failing.write().insert(id.into());
    }

    /// Number of node handles handed out so far.
    pub fn acquired(&self) -> usize {
        self.state.acquired.load(Ordering::SeqCst)
    }

    /// Number of node handles released so far.
    pub fn released(&self) -> usize {
        self.state.released.load(Ordering::SeqCst)
    }

    /// Handles handed out and not yet released.
    pub fn outstanding(&self) -> usize {
        self.acquired().saturating_sub(self.released())
    }

    /// Ids of nodes acquired since the last [`clear_log`](Self::clear_log), in order.
    pub fn touched(&self) -> Vec<String> {
        self.state.touched.lock().clone()
    }

    pub fn gestures(&self) -> Vec<GestureDescription> {
        self.state.gestures.lock().clone()
    }

    /// Answer every gesture accepted in [`GestureMode::Hold`]. Returns how many
    /// were still waiting.
    pub fn complete_held(&self, outcome: GestureOutcome) -> usize {
        let held: Vec<_> = self.state.held.lock().drain(..).collect();
        let mut answered = 0;
        for tx in held {
            if tx.send(outcome).is_ok() {
                answered += 1;
            }
        }
        answered
    }

    pub fn clear_log(&self) {
        self.state.touched.lock().clear();
        self.state.gestures.lock().clear();
    }

    fn handle(&self, tree: &Arc<FlatTree>, index: usize) -> NodeHandle {
        self.state.acquired.fetch_add(1, Ordering::SeqCst);
        self.state.touched.lock().push(tree.nodes[index].id.clone());
        NodeHandle::new(SnapshotNode {
            engine: self.clone(),
            tree: Arc::clone(tree),
            index,
            released: false,
        })
    }
}

impl AccessibilityEngine for SnapshotEngine {
    fn fetch_root(&self) -> Result<NodeHandle, AutomationError> {
        let tree = self
            .state
            .tree
            .read()
            .clone()
            .ok_or_else(|| AutomationError::Unavailable("no active window".to_string()))?;
        Ok(self.handle(&tree, 0))
    }

    fn dispatch_gesture(
        &self,
        gesture: GestureDescription,
    ) -> Result<oneshot::Receiver<GestureOutcome>, AutomationError> {
        let mode = *self.state.gesture_mode.lock();
        debug!("Snapshot engine received gesture ({:?}): {:?}", mode, gesture);
        if mode == GestureMode::Reject {
            return Err(AutomationError::DispatchCancelled(
                "host refused the gesture".to_string(),
            ));
        }
        self.state.gestures.lock().push(gesture);

        let (tx, rx) = oneshot::channel();
        match mode {
            GestureMode::Complete => {
                let _ = tx.send(GestureOutcome::Completed);
            }
            GestureMode::Cancel => {
                let _ = tx.send(GestureOutcome::Cancelled);
            }
            GestureMode::Hold => self.state.held.lock().push(tx),
            GestureMode::Reject => {}
        }
        Ok(rx)
    }
}

struct SnapshotNode {
    engine: SnapshotEngine,
    tree: Arc<FlatTree>,
    index: usize,
    released: bool,
}

impl SnapshotNode {
    fn node(&self) -> Result<&FlatNode, AutomationError> {
        let node = &self.tree.nodes[self.index];
        if self.engine.state.failing.read().contains(&node.id) {
            return Err(AutomationError::AttributeRead(format!(
                "node {} is no longer attached",
                node.id
            )));
        }
        Ok(node)
    }
}

impl UiNode for SnapshotNode {
    fn text(&self) -> Result<Option<String>, AutomationError> {
        Ok(self.node()?.attributes.text.clone())
    }

    fn description(&self) -> Result<Option<String>, AutomationError> {
        Ok(self.node()?.attributes.description.clone())
    }

    fn element_id(&self) -> Result<Option<String>, AutomationError> {
        Ok(self.node()?.attributes.element_id.clone())
    }

    fn is_interactable(&self) -> Result<bool, AutomationError> {
        Ok(self.node()?.attributes.interactable)
    }

    fn bounds(&self) -> Result<Bounds, AutomationError> {
        Ok(self.node()?.attributes.bounds)
    }

    fn child_count(&self) -> Result<usize, AutomationError> {
        Ok(self.node()?.children.len())
    }

    fn child(&self, index: usize) -> Result<Option<NodeHandle>, AutomationError> {
        let child = self.node()?.children.get(index).copied();
        Ok(child.map(|c| self.engine.handle(&self.tree, c)))
    }

    fn parent(&self) -> Result<Option<NodeHandle>, AutomationError> {
        let parent = self.node()?.parent;
        Ok(parent.map(|p| self.engine.handle(&self.tree, p)))
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.engine.state.released.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> UINode {
        UINode::new("root")
            .child(UINode::new("a").text("Hello"))
            .child(UINode::new("b").child(UINode::default()))
    }

    #[test]
    fn test_handles_are_counted_and_released_on_drop() {
        let engine = SnapshotEngine::new(sample());
        {
            let root = engine.fetch_root().unwrap();
            let child = root.child(0).unwrap().unwrap();
            assert_eq!(child.text().unwrap().as_deref(), Some("Hello"));
            assert_eq!(engine.outstanding(), 2);
        }
        assert_eq!(engine.acquired(), 2);
        assert_eq!(engine.released(), 2);
    }

    #[test]
    fn test_unnamed_nodes_get_path_ids() {
        let engine = SnapshotEngine::new(sample());
        let root = engine.fetch_root().unwrap();
        let b = root.child(1).unwrap().unwrap();
        let _leaf = b.child(0).unwrap().unwrap();
        assert_eq!(engine.touched(), vec!["root", "b", "0.1.0"]);
    }

    #[test]
    fn test_parent_navigation() {
        let engine = SnapshotEngine::new(sample());
        let root = engine.fetch_root().unwrap();
        let a = root.child(0).unwrap().unwrap();
        let parent = a.parent().unwrap().unwrap();
        assert_eq!(parent.child_count().unwrap(), 2);
        assert!(root.parent().unwrap().is_none());
    }

    #[test]
    fn test_unavailable_window() {
        let engine = SnapshotEngine::unavailable();
        assert!(matches!(
            engine.fetch_root(),
            Err(AutomationError::Unavailable(_))
        ));
    }

    #[test]
    fn test_snapshot_survives_tree_replacement() {
        let engine = SnapshotEngine::new(sample());
        let root = engine.fetch_root().unwrap();
        engine.set_tree(Some(UINode::new("other")));
        assert_eq!(root.child_count().unwrap(), 2);
        let fresh = engine.fetch_root().unwrap();
        assert_eq!(fresh.child_count().unwrap(), 0);
    }

    #[test]
    fn test_failing_reads() {
        let engine = SnapshotEngine::new(sample());
        engine.fail_reads_for("a");
        let root = engine.fetch_root().unwrap();
        let a = root.child(0).unwrap().unwrap();
        assert!(matches!(a.text(), Err(AutomationError::AttributeRead(_))));
        assert!(root.text().is_ok());
    }

    #[test]
    fn test_tree_from_json() {
        let json = r#"{
            "id": "root",
            "children": [
                {"attributes": {"text": "확인", "elementId": "btn_ok", "interactable": true,
                  "bounds": {"left": 0, "top": 0, "right": 10, "bottom": 10}}}
            ]
        }"#;
        let engine = SnapshotEngine::from_json(json).unwrap();
        let root = engine.fetch_root().unwrap();
        let ok = root.child(0).unwrap().unwrap();
        assert_eq!(ok.element_id().unwrap().as_deref(), Some("btn_ok"));
        assert!(ok.is_interactable().unwrap());
        assert_eq!(ok.bounds().unwrap().right, 10.0);

        assert!(matches!(
            SnapshotEngine::from_json("{not json"),
            Err(AutomationError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_gesture_modes() {
        let engine = SnapshotEngine::new(sample());
        let tap = GestureDescription::tap(
            super::super::Point::new(5.0, 5.0),
            std::time::Duration::from_millis(100),
        );

        let rx = engine.dispatch_gesture(tap.clone()).unwrap();
        assert_eq!(rx.await.unwrap(), GestureOutcome::Completed);

        engine.set_gesture_mode(GestureMode::Cancel);
        let rx = engine.dispatch_gesture(tap.clone()).unwrap();
        assert_eq!(rx.await.unwrap(), GestureOutcome::Cancelled);

        engine.set_gesture_mode(GestureMode::Reject);
        assert!(engine.dispatch_gesture(tap.clone()).is_err());

        assert_eq!(engine.gestures().len(), 2);
    }
}
