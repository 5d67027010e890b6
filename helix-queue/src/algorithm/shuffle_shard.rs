//! Shuffle-shard tenant selection.
//!
//! Governs the root of the tenant tree. Tenants rotate the same way children
//! do under round-robin, except that a tenant is only a candidate when the
//! requesting querier belongs to its shuffle shard. Ineligible tenants are
//! passed over but keep their place in the rotation.
//!
//! The root cursor is the single shared rotation position: every querier's
//! dequeue continues from where the previous one left off, so inter-tenant
//! fairness holds across queriers rather than per querier.

use super::{DequeueContext, QueuingAlgorithm, Rotation, Selection};
use helix_core::Position;

/// Rotates over tenants eligible for the current querier.
#[derive(Debug, Clone, Copy, Default)]
pub struct TenantShuffleShard;

impl QueuingAlgorithm for TenantShuffleShard {
    fn add_child_node(&self, rotation: &mut Rotation, name: &str) {
        rotation.order.push(name.to_string());
    }

    fn dequeue_select_node(&self, rotation: &mut Rotation, ctx: &DequeueContext<'_>) -> Selection {
        let len = rotation.order.len();

        // Tenant selection is always on behalf of a querier.
        let Some(querier_id) = ctx.querier_id else {
            rotation.nodes_checked = len;
            return Selection::Nothing;
        };

        let mut index = rotation
            .cursor
            .child_index()
            .filter(|index| *index < len)
            .unwrap_or(0);

        while rotation.nodes_checked < len {
            rotation.nodes_checked += 1;

            let tenant = &rotation.order[index];
            let eligible = ctx
                .assignments
                .map_or(true, |assignments| assignments.is_tenant_eligible(tenant, querier_id));
            if eligible {
                rotation.cursor = Position::Child(index);
                return Selection::Child(tenant.clone());
            }

            index = (index + 1) % len;
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
            Selection::Nothing | Selection::LocalQueue => return,
            Selection::Child(name) if child_emptied => rotation.remove_child(name),
            Selection::Child(_) => {
                let len = rotation.order.len();
                if let Position::Child(index) = rotation.cursor {
                    rotation.cursor = Position::Child((index + 1) % len);
                }
            }
        }

        if dequeued {
            rotation.nodes_checked = 0;
        }
    }

    fn checked_all_nodes(&self, rotation: &Rotation) -> bool {
        rotation.nodes_checked >= rotation.order.len()
    }
}
