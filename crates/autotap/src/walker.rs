//! Depth-first search for the node to tap
//!
//! The walker visits the tree in pre-order, testing each node before its
//! children. The first match that resolves to something tappable wins and the
//! walk stops there. A matching node that is not itself interactable resolves
//! to its nearest interactable ancestor; a match with no such ancestor is
//! dropped and the walk carries on.
//!
//! Handles are owned: every node the walker fetches is released when it goes
//! out of scope, so everything except the returned node is released before
//! [`TreeWalker::find_actionable`] returns.
//!
//! A panic inside a host read is caught and treated like a failed read of
//! that node.

use crate::matcher::SearchTarget;
use crate::platforms::{AccessibilityEngine, Bounds, NodeHandle, Point, UiNode};
use crate::AutomationError;
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, warn};

/// Default bound on tree depth and on ancestor walks.
pub const DEFAULT_MAX_DEPTH: usize = 100;

/// Bookkeeping for one walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WalkStats {
    pub nodes_visited: usize,
    /// Matches dropped because no interactable ancestor existed.
    pub unanchored_matches: usize,
    /// Nodes whose attributes could not be read; their subtrees were skipped.
    pub read_errors: usize,
    pub depth_limit_hits: usize,
}

/// Result of a walk: the node to tap, if any, plus stats.
#[derive(Debug)]
pub struct WalkResult {
    pub actionable: Option<NodeHandle>,
    pub stats: WalkStats,
}

/// What a scan resolved to, with every node handle already released.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanHit {
    pub label: String,
    pub bounds: Bounds,
    pub point: Point,
    pub stats: WalkStats,
}

#[derive(Debug, Clone)]
pub struct TreeWalker {
    max_depth: usize,
}

impl Default for TreeWalker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}

impl TreeWalker {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Search the tree under `root` for the first actionable match.
    pub fn find_actionable(&self, root: NodeHandle, target: &SearchTarget) -> WalkResult {
        let mut stats = WalkStats::default();
        let actionable = if target.is_empty() {
            None
        } else {
            self.visit(root, target, 0, &mut stats)
        };
        WalkResult { actionable, stats }
    }

    /// Fetch the foreground root, walk it, and resolve the tap point.
    ///
    /// Returns `Ok(None)` when nothing matched. Blocking: the host calls may
    /// take a while, so async callers should run this on a blocking worker.
    pub fn scan(
        &self,
        engine: &dyn AccessibilityEngine,
        target: &SearchTarget,
    ) -> Result<Option<ScanHit>, AutomationError> {
        let root = engine.fetch_root()?;
        let WalkResult { actionable, stats } = self.find_actionable(root, target);
        debug!(
            "Walked {} nodes for '{}' ({} unanchored, {} read errors)",
            stats.nodes_visited,
            target.as_str(),
            stats.unanchored_matches,
            stats.read_errors
        );

        let Some(node) = actionable else {
            return Ok(None);
        };
        let bounds = contained(|| node.bounds())?;
        Ok(Some(ScanHit {
            label: node.label(),
            bounds,
            point: bounds.center(),
            stats,
        }))
    }

    fn visit(
        &self,
        node: NodeHandle,
        target: &SearchTarget,
        depth: usize,
        stats: &mut WalkStats,
    ) -> Option<NodeHandle> {
        stats.nodes_visited += 1;

        match contained(|| self.resolve_match(&node, target, stats)) {
            Ok(Resolution::Node) => return Some(node),
            Ok(Resolution::Ancestor(ancestor)) => return Some(ancestor),
            Ok(Resolution::Unanchored) | Ok(Resolution::NoMatch) => {}
            Err(e) => {
                // The node and its subtree yield nothing; siblings still get visited.
                stats.read_errors += 1;
                debug!("Skipping subtree at depth {}: {}", depth, e);
                return None;
            }
        }

        if depth >= self.max_depth {
            stats.depth_limit_hits += 1;
            warn!(
                "Tree depth limit ({}) reached, not descending further",
                self.max_depth
            );
            return None;
        }

        let child_count = match contained(|| node.child_count()) {
            Ok(count) => count,
            Err(e) => {
                stats.read_errors += 1;
                debug!("Could not count children at depth {}: {}", depth, e);
                return None;
            }
        };

        for index in 0..child_count {
            let child = match contained(|| node.child(index)) {
                Ok(Some(child)) => child,
                Ok(None) => continue,
                Err(e) => {
                    stats.read_errors += 1;
                    debug!("Could not fetch child {} at depth {}: {}", index, depth, e);
                    continue;
                }
            };
            if let Some(found) = self.visit(child, target, depth + 1, stats) {
                return Some(found);
            }
        }
        None
    }

    fn resolve_match(
        &self,
        node: &NodeHandle,
        target: &SearchTarget,
        stats: &mut WalkStats,
    ) -> Result<Resolution, AutomationError> {
        if !target.matches_node(&**node)? {
            return Ok(Resolution::NoMatch);
        }
        if node.is_interactable()? {
            debug!("Matched interactable node {}", node.label());
            return Ok(Resolution::Node);
        }
        match self.interactable_ancestor(&**node)? {
            Some(ancestor) => {
                debug!(
                    "Matched {} via interactable ancestor {}",
                    node.label(),
                    ancestor.label()
                );
                Ok(Resolution::Ancestor(ancestor))
            }
            None => {
                stats.unanchored_matches += 1;
                debug!(
                    "Matched {} but no interactable ancestor; continuing",
                    node.label()
                );
                Ok(Resolution::Unanchored)
            }
        }
    }

    /// Walk strictly upward from `node` to the first interactable ancestor.
    /// Ancestors walked past are released as the walk moves on.
    fn interactable_ancestor(
        &self,
        node: &dyn UiNode,
    ) -> Result<Option<NodeHandle>, AutomationError> {
        let mut current = node.parent()?;
        let mut steps = 0;
        while let Some(ancestor) = current {
            if ancestor.is_interactable()? {
                return Ok(Some(ancestor));
            }
            steps += 1;
            if steps >= self.max_depth {
                warn!("find_interactable_ancestor: hit iteration limit without finding one");
                return Ok(None);
            }
            current = ancestor.parent()?;
        }
        Ok(None)
    }
}

/// Run a host read, turning a panic inside the host into a read error for
/// that node.
fn contained<T>(
    read: impl FnOnce() -> Result<T, AutomationError>,
) -> Result<T, AutomationError> {
    panic::catch_unwind(AssertUnwindSafe(read)).unwrap_or_else(|payload| {
        let reason = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Err(AutomationError::AttributeRead(format!(
            "host panicked during read: {reason}"
        )))
    })
}

enum Resolution {
    NoMatch,
    /// The matching node itself is the tap target.
    Node,
    Ancestor(NodeHandle),
    Unanchored,
}

/// Search `root` with default limits.
pub fn find_actionable(root: NodeHandle, target: &SearchTarget) -> Option<NodeHandle> {
    TreeWalker::default().find_actionable(root, target).actionable
}
