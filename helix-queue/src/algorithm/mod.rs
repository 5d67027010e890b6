//! Per-level queuing algorithms.
//!
//! Every depth of the queue tree is governed by one [`QueuingAlgorithm`]. The
//! algorithm decides, on each visit to a node at that depth, whether to serve
//! the node's own local queue or one of its children, and it maintains the
//! node's rotation as children appear and drain.
//!
//! Algorithms are stateless policies: the rotation they steer lives in each
//! node's [`Rotation`], so one algorithm instance serves every node at its
//! depth without per-node bookkeeping of its own.

mod round_robin;
mod shuffle_shard;
mod skip_over;

use std::collections::VecDeque;
use std::fmt;

use helix_core::{Position, QuerierId};

use crate::assignments::TenantQuerierAssignments;
use crate::utilization::UtilizationCheck;

pub use round_robin::RoundRobin;
pub use shuffle_shard::TenantShuffleShard;
pub use skip_over::SkipOverUtilization;

/// Outcome of a node selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Serve the node's own local queue.
    LocalQueue,
    /// Descend into the named child.
    Child(String),
    /// Nothing selectable on this attempt.
    Nothing,
}

/// Rotation state of one tree node.
#[derive(Debug, Clone, Default)]
pub struct Rotation {
    /// Child names in service order.
    pub(crate) order: Vec<String>,
    /// Next position to serve.
    pub(crate) cursor: Position,
    /// Positions examined since the last successful dequeue.
    pub(crate) nodes_checked: usize,
    /// Children passed over during the current pass, oldest first.
    pub(crate) skipped: VecDeque<String>,
}

impl Rotation {
    /// Returns the child names in service order.
    #[must_use]
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Returns the current cursor.
    #[must_use]
    pub const fn cursor(&self) -> Position {
        self.cursor
    }

    /// Returns the names skipped in the current pass.
    #[must_use]
    pub const fn skipped(&self) -> &VecDeque<String> {
        &self.skipped
    }

    /// Starts a new selection pass.
    pub(crate) fn reset_pass(&mut self) {
        self.nodes_checked = 0;
        self.skipped.clear();
    }

    /// Steps the cursor forward: local queue, then each child, then back to the local queue.
    pub(crate) fn advance(&mut self) {
        self.cursor = match self.cursor {
            Position::LocalQueue if self.order.is_empty() => Position::LocalQueue,
            Position::LocalQueue => Position::Child(0),
            Position::Child(index) if index + 1 < self.order.len() => Position::Child(index + 1),
            Position::Child(_) => Position::LocalQueue,
        };
    }

    /// Removes a child from the order, keeping the cursor on the element
    /// that was next in line.
    pub(crate) fn remove_child(&mut self, name: &str) {
        let Some(removed) = self.order.iter().position(|child| child == name) else {
            return;
        };
        self.order.remove(removed);

        if let Position::Child(cursor) = self.cursor {
            let cursor = if removed < cursor { cursor - 1 } else { cursor };
            self.cursor = if cursor < self.order.len() {
                Position::Child(cursor)
            } else {
                Position::LocalQueue
            };
        }
    }

    /// Returns the child name under the cursor, if the cursor is on a child.
    pub(crate) fn current_child(&self) -> Option<&String> {
        self.cursor.child_index().and_then(|index| self.order.get(index))
    }
}

/// Dequeue-time inputs shared by every level of one tree traversal.
#[derive(Clone, Copy, Default)]
pub struct DequeueContext<'a> {
    /// The querier asking for work.
    pub querier_id: Option<&'a QuerierId>,
    /// Tenant-to-querier shuffle-shard assignments.
    pub assignments: Option<&'a TenantQuerierAssignments>,
    /// Utilization check for the query-component level.
    pub utilization: Option<&'a dyn UtilizationCheck>,
}

impl<'a> DequeueContext<'a> {
    /// Creates a context with no querier, assignments or utilization check.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            querier_id: None,
            assignments: None,
            utilization: None,
        }
    }

    /// Creates a context for a querier.
    #[must_use]
    pub const fn for_querier(
        querier_id: &'a QuerierId,
        assignments: &'a TenantQuerierAssignments,
    ) -> Self {
        Self {
            querier_id: Some(querier_id),
            assignments: Some(assignments),
            utilization: None,
        }
    }

    /// Attaches a utilization check.
    #[must_use]
    pub const fn with_utilization(mut self, utilization: &'a dyn UtilizationCheck) -> Self {
        self.utilization = Some(utilization);
        self
    }
}

impl fmt::Debug for DequeueContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DequeueContext")
            .field("querier_id", &self.querier_id)
            .field("has_assignments", &self.assignments.is_some())
            .field("has_utilization", &self.utilization.is_some())
            .finish()
    }
}

/// Selection policy for one depth of the queue tree.
pub trait QueuingAlgorithm: Send + Sync + fmt::Debug {
    /// Registers a newly created child with the parent's rotation.
    fn add_child_node(&self, rotation: &mut Rotation, name: &str);

    /// Chooses what to serve next from a node.
    fn dequeue_select_node(&self, rotation: &mut Rotation, ctx: &DequeueContext<'_>) -> Selection;

    /// Updates the rotation after a selection was attempted.
    ///
    /// `child_emptied` is true when the selected child drained and was removed
    /// from the node; `dequeued` is true when an item was returned.
    fn dequeue_update_state(
        &self,
        rotation: &mut Rotation,
        selection: &Selection,
        child_emptied: bool,
        dequeued: bool,
    );

    /// Returns true once every candidate has been examined without success.
    fn checked_all_nodes(&self, rotation: &Rotation) -> bool;
}
