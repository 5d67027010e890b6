//! Round-robin selection.

use super::{DequeueContext, QueuingAlgorithm, Rotation, Selection};
use helix_core::Position;

/// Serves the local queue, then each child in first-seen order, then wraps.
///
/// New children join at the tail of the rotation. A child that drains is
/// dropped from the rotation without moving the cursor, so the next child
/// in line is served next.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoundRobin;

impl QueuingAlgorithm for RoundRobin {
    fn add_child_node(&self, rotation: &mut Rotation, name: &str) {
        rotation.order.push(name.to_string());
    }

    fn dequeue_select_node(&self, rotation: &mut Rotation, _ctx: &DequeueContext<'_>) -> Selection {
        rotation.nodes_checked += 1;

        if let Some(name) = rotation.current_child() {
            return Selection::Child(name.clone());
        }
        // A stale child cursor falls back to the local queue.
        rotation.cursor = Position::LocalQueue;
        Selection::LocalQueue
    }

    fn dequeue_update_state(
        &self,
        rotation: &mut Rotation,
        selection: &Selection,
        child_emptied: bool,
        dequeued: bool,
    ) {
        match selection {
            Selection::Nothing => return,
            Selection::Child(name) if child_emptied => rotation.remove_child(name),
            Selection::Child(_) | Selection::LocalQueue => rotation.advance(),
        }

        if dequeued {
            rotation.nodes_checked = 0;
        }
    }

    fn checked_all_nodes(&self, rotation: &Rotation) -> bool {
        rotation.nodes_checked > rotation.order.len()
    }
}
