//! Utilization-aware selection over query-component children.
//!
//! Rotates like round-robin, but a child whose query component is eating
//! into the connections reserved for other components is passed over and
//! remembered. If a whole pass completes without serving anything, the
//! remembered children are served oldest-skip first, so sustained overload
//! degrades into a threshold violation rather than an empty queue.

use super::{DequeueContext, QueuingAlgorithm, Rotation, Selection};
use helix_core::Position;

/// Round-robin that defers children over their component's utilization threshold.
#[derive(Debug, Clone, Copy, Default)]
pub struct SkipOverUtilization;

impl SkipOverUtilization {
    fn should_skip(name: &str, ctx: &DequeueContext<'_>) -> bool {
        ctx.utilization.is_some_and(|check| {
            check.trigger_utilization_check() && check.exceeds_threshold_for_component_name(name).0
        })
    }
}

impl QueuingAlgorithm for SkipOverUtilization {
    fn add_child_node(&self, rotation: &mut Rotation, name: &str) {
        // New children land just behind the cursor and are served before the pass wraps.
        match rotation.cursor {
            Position::LocalQueue => rotation.order.push(name.to_string()),
            Position::Child(index) => {
                let index = index.min(rotation.order.len());
                rotation.order.insert(index, name.to_string());
                rotation.cursor = Position::Child(index + 1);
            }
        }
    }

    fn dequeue_select_node(&self, rotation: &mut Rotation, ctx: &DequeueContext<'_>) -> Selection {
        if rotation.cursor.is_local_queue() {
            rotation.nodes_checked += 1;
            return Selection::LocalQueue;
        }

        // First pass: local queue plus every child.
        if rotation.nodes_checked <= rotation.order.len() {
            rotation.nodes_checked += 1;

            let Some(name) = rotation.current_child().cloned() else {
                rotation.cursor = Position::LocalQueue;
                return Selection::LocalQueue;
            };

            if Self::should_skip(&name, ctx) {
                rotation.skipped.push_back(name);
                rotation.advance();
                return Selection::Nothing;
            }
            return Selection::Child(name);
        }

        // Pass exhausted: fall back to skipped children in skip order.
        while let Some(name) = rotation.skipped.pop_front() {
            if let Some(index) = rotation.order.iter().position(|child| *child == name) {
                rotation.cursor = Position::Child(index);
                return Selection::Child(name);
            }
        }
        Selection::Nothing
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
            Selection::Child(name) if child_emptied => {
                rotation.remove_child(name);
                rotation.skipped.retain(|skipped| skipped != name);
            }
            Selection::Child(_) | Selection::LocalQueue => rotation.advance(),
        }

        if dequeued {
            rotation.nodes_checked = 0;
            rotation.skipped.clear();
        }
    }

    fn checked_all_nodes(&self, rotation: &Rotation) -> bool {
        rotation.nodes_checked > rotation.order.len() && rotation.skipped.is_empty()
    }
}
