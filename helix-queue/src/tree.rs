//! Hierarchical queue tree.
//!
//! Each node owns a FIFO of items and a map of named children. Nodes are
//! created lazily on enqueue and removed as soon as a dequeue drains them, so
//! the tree only ever contains nodes with queued work (plus the root).
//!
//! Selection at each depth is delegated to that depth's [`QueuingAlgorithm`].
//! A dequeue walks from the root, asking each level's algorithm which local
//! queue or child to take from, and reports back whether the chosen child
//! drained so the algorithm can prune its rotation.

use std::collections::{HashMap, VecDeque};

use helix_core::{Position, QueuePath};

use crate::algorithm::{DequeueContext, QueuingAlgorithm, Rotation, Selection};
use crate::error::{QueueError, QueueResult};

/// Name of the root node.
pub const ROOT_NAME: &str = "root";

/// A node in the queue tree.
#[derive(Debug)]
pub struct Node<T> {
    name: String,
    depth: usize,
    local_queue: VecDeque<T>,
    children: HashMap<String, Node<T>>,
    rotation: Rotation,
    /// Items in this node's local queue and all descendants.
    item_count: usize,
}

impl<T> Node<T> {
    fn new(name: String, depth: usize) -> Self {
        Self {
            name,
            depth,
            local_queue: VecDeque::new(),
            children: HashMap::new(),
            rotation: Rotation::default(),
            item_count: 0,
        }
    }

    /// Returns the node name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the node depth (the root is depth 0).
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.depth
    }

    /// Returns the number of items in this node and its descendants.
    #[must_use]
    pub const fn item_count(&self) -> usize {
        self.item_count
    }

    /// Returns true if this node and its descendants hold no items.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.item_count == 0
    }

    /// Returns the number of items in this node's own queue.
    #[must_use]
    pub fn local_queue_len(&self) -> usize {
        self.local_queue.len()
    }

    /// Returns the number of direct children.
    #[must_use]
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Returns a direct child by name.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&Self> {
        self.children.get(name)
    }

    /// Returns the node's rotation state.
    #[must_use]
    pub const fn rotation(&self) -> &Rotation {
        &self.rotation
    }

    fn enqueue(
        &mut self,
        algorithms: &[Box<dyn QueuingAlgorithm>],
        segments: &[String],
        item: T,
        front: bool,
    ) {
        self.item_count += 1;

        let Some((head, rest)) = segments.split_first() else {
            if front {
                self.local_queue.push_front(item);
            } else {
                self.local_queue.push_back(item);
            }
            return;
        };

        let depth = self.depth;
        let rotation = &mut self.rotation;
        let child = self.children.entry(head.clone()).or_insert_with(|| {
            algorithms[depth].add_child_node(rotation, head);
            Node::new(head.clone(), depth + 1)
        });
        child.enqueue(algorithms, rest, item, front);
    }

    fn dequeue(
        &mut self,
        algorithms: &[Box<dyn QueuingAlgorithm>],
        ctx: &DequeueContext<'_>,
    ) -> Option<(QueuePath, T)> {
        if self.is_empty() {
            return None;
        }

        let algorithm = &algorithms[self.depth];
        self.rotation.reset_pass();
        loop {
            let selection = algorithm.dequeue_select_node(&mut self.rotation, ctx);

            let mut child_emptied = false;
            let dequeued = match &selection {
                Selection::LocalQueue => self
                    .local_queue
                    .pop_front()
                    .map(|item| (QueuePath::root(), item)),
                Selection::Child(name) => match self.children.get_mut(name) {
                    Some(child) => {
                        let dequeued = child.dequeue(algorithms, ctx).map(|(mut path, item)| {
                            path.push_front(name.clone());
                            (path, item)
                        });
                        if child.is_empty() {
                            self.children.remove(name);
                            child_emptied = true;
                        }
                        dequeued
                    }
                    // A rotation entry without a node is pruned like a drained child.
                    None => {
                        child_emptied = true;
                        None
                    }
                },
                Selection::Nothing => None,
            };

            if dequeued.is_some() {
                self.item_count -= 1;
            }

            algorithm.dequeue_update_state(
                &mut self.rotation,
                &selection,
                child_emptied,
                dequeued.is_some(),
            );

            if dequeued.is_some() || algorithm.checked_all_nodes(&self.rotation) {
                return dequeued;
            }
        }
    }

    fn get_node(&self, segments: &[String]) -> Option<&Self> {
        match segments.split_first() {
            None => Some(self),
            Some((head, rest)) => self.children.get(head)?.get_node(rest),
        }
    }
}

/// Queue tree with one queuing algorithm per depth.
#[derive(Debug)]
pub struct Tree<T> {
    root: Node<T>,
    algorithms: Vec<Box<dyn QueuingAlgorithm>>,
}

impl<T> Tree<T> {
    /// Creates a tree whose depth is the number of algorithms.
    ///
    /// `algorithms[0]` governs the root, `algorithms[1]` its children, and so on.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::InvalidConfig` if no algorithms are given.
    pub fn new(algorithms: Vec<Box<dyn QueuingAlgorithm>>) -> QueueResult<Self> {
        if algorithms.is_empty() {
            return Err(QueueError::InvalidConfig {
                message: "queue tree needs at least one queuing algorithm".to_string(),
            });
        }

        Ok(Self {
            root: Node::new(ROOT_NAME.to_string(), 0),
            algorithms,
        })
    }

    /// Returns the number of tree levels.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.algorithms.len()
    }

    /// Appends an item to the node at `path`, creating missing nodes.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::PathTooDeep` if the path is longer than the tree allows.
    pub fn enqueue_back(&mut self, path: &QueuePath, item: T) -> QueueResult<()> {
        self.check_path(path)?;
        self.root.enqueue(&self.algorithms, path.segments(), item, false);
        Ok(())
    }

    /// Prepends an item to the node at `path`, creating missing nodes.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::PathTooDeep` if the path is longer than the tree allows.
    pub fn enqueue_front(&mut self, path: &QueuePath, item: T) -> QueueResult<()> {
        self.check_path(path)?;
        self.root.enqueue(&self.algorithms, path.segments(), item, true);
        Ok(())
    }

    /// Removes the next item chosen by the per-level algorithms.
    ///
    /// Returns the path of the node the item came from, relative to the root,
    /// or `None` if no item is eligible.
    pub fn dequeue(&mut self, ctx: &DequeueContext<'_>) -> Option<(QueuePath, T)> {
        self.root.dequeue(&self.algorithms, ctx)
    }

    /// Returns the node at `path`, if it exists.
    #[must_use]
    pub fn get_node(&self, path: &QueuePath) -> Option<&Node<T>> {
        self.root.get_node(path.segments())
    }

    /// Returns the root node.
    #[must_use]
    pub const fn root(&self) -> &Node<T> {
        &self.root
    }

    /// Returns true if the tree holds no items.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Returns the total number of queued items.
    #[must_use]
    pub const fn item_count(&self) -> usize {
        self.root.item_count
    }

    /// Returns the root rotation cursor.
    #[must_use]
    pub const fn root_position(&self) -> Position {
        self.root.rotation.cursor
    }

    /// Moves the root rotation cursor.
    pub fn set_root_position(&mut self, position: Position) {
        self.root.rotation.cursor = position;
    }

    fn check_path(&self, path: &QueuePath) -> QueueResult<()> {
        let max_len = self.algorithms.len() - 1;
        if path.len() > max_len {
            return Err(QueueError::PathTooDeep {
                path_len: path.len(),
                max_len,
            });
        }
        Ok(())
    }
}
