//! Property-based test generators using proptest.
//!
//! Ids come from a small pool and timestamps from a narrow window so that
//! generated caches and remote collections overlap, tie and diverge often.

use crate::fixtures::at;
use cachesync_model::{Entity, SyncState};
use proptest::prelude::*;
use std::collections::BTreeMap;

/// Size of the id pool.
pub const ID_POOL: u8 = 12;

/// Strategy for entity ids drawn from the pool.
pub fn entity_id_strategy() -> impl Strategy<Value = String> {
    (0..ID_POOL).prop_map(|n| format!("e{n}"))
}

/// Strategy for timestamps within a five second window.
pub fn timestamp_secs_strategy() -> impl Strategy<Value = i64> {
    0i64..5
}

/// Strategy for any sync state.
pub fn sync_state_strategy() -> impl Strategy<Value = SyncState> + Clone {
    prop::sample::select(SyncState::ALL.to_vec())
}

/// Strategy for states that a pull may leave or see: `Synced` and `Getting`.
pub fn settled_state_strategy() -> impl Strategy<Value = SyncState> + Clone {
    prop::sample::select(vec![SyncState::Synced, SyncState::Getting])
}

fn body(id: String, secs: i64, revision: u8) -> Entity {
    Entity::new(id.clone(), format!("{id} r{revision}"))
        .with_created(at(0))
        .with_last_updated(at(secs))
}

/// Strategy for a remote collection with unique ids, in id order.
pub fn remote_collection_strategy() -> impl Strategy<Value = Vec<Entity>> {
    prop::collection::btree_map(entity_id_strategy(), (timestamp_secs_strategy(), any::<u8>()), 0..8)
        .prop_map(|entries| {
            entries
                .into_iter()
                .map(|(id, (secs, revision))| body(id, secs, revision))
                .collect()
        })
}

/// Strategy for cached records with unique ids, paired with their state.
pub fn cached_collection_strategy(
    states: impl Strategy<Value = SyncState> + Clone,
) -> impl Strategy<Value = Vec<(Entity, SyncState)>> {
    prop::collection::btree_map(
        entity_id_strategy(),
        (timestamp_secs_strategy(), any::<u8>(), states),
        0..8,
    )
    .prop_map(|entries: BTreeMap<String, (i64, u8, SyncState)>| {
        entries
            .into_iter()
            .map(|(id, (secs, revision, state))| (body(id, secs, revision), state))
            .collect()
    })
}
