//! Property tests for reconciliation.

use cachesync_engine::{PlanStep, Reconciler, SyncConfig, SyncOrchestrator};
use cachesync_model::{Entity, SyncState};
use cachesync_remote::MemoryRemote;
use cachesync_store::MemoryStore;
use cachesync_testkit::prelude::*;
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

fn setup(cached: &[(Entity, SyncState)], remote: &[Entity]) -> SyncFixture {
    let fixture = SyncFixture::new();
    for (entity, state) in cached {
        seed(&*fixture.store, "charts", entity.clone(), *state);
    }
    for entity in remote {
        fixture.remote.put("charts", entity.clone());
    }
    fixture
}

fn orchestrator(fixture: &SyncFixture) -> SyncOrchestrator<MemoryStore, MemoryRemote> {
    SyncOrchestrator::new(
        SyncConfig::new([charts()]),
        Arc::clone(&fixture.store),
        Arc::clone(&fixture.remote),
    )
}

proptest! {
    #[test]
    fn second_round_changes_nothing(
        cached in cached_collection_strategy(settled_state_strategy()),
        remote in remote_collection_strategy(),
    ) {
        let fixture = setup(&cached, &remote);
        let engine = orchestrator(&fixture);

        prop_assert!(engine.run_round().unwrap().is_success());
        let first = fixture.store.records();

        let report = engine.run_round().unwrap();
        prop_assert_eq!(report.pull.counts().total(), 0);
        prop_assert_eq!(fixture.store.records(), first);
    }

    #[test]
    fn settled_cache_converges_to_remote(
        seeded in cached_collection_strategy(settled_state_strategy()),
        remote in remote_collection_strategy(),
    ) {
        let fixture = setup(&seeded, &remote);
        orchestrator(&fixture).run_round().unwrap();

        let remote: BTreeMap<String, Entity> =
            remote.into_iter().map(|e| (e.id.clone(), e)).collect();
        let local = cached_ids(&*fixture.store, "charts");
        prop_assert_eq!(local, remote.keys().cloned().collect::<Vec<_>>());

        for (id, record) in cached(&*fixture.store, "charts") {
            let remote_updated = remote[&id].last_updated.unwrap();
            let local_updated = record.entity.last_updated.unwrap();
            prop_assert!(!remote_updated.is_after(&local_updated));
        }
    }

    #[test]
    fn plan_never_targets_pending_records(
        cached in cached_collection_strategy(sync_state_strategy()),
        remote in remote_collection_strategy(),
    ) {
        let fixture = setup(&cached, &remote);
        let states: BTreeMap<String, SyncState> =
            cached.iter().map(|(e, state)| (e.id.clone(), *state)).collect();

        let plan = Reconciler::new(&*fixture.store, &*fixture.remote)
            .plan(&charts())
            .unwrap();

        for step in plan.steps() {
            match step {
                PlanStep::Delete { record } | PlanStep::Update { record, .. } => {
                    prop_assert!(!record.state.is_pending());
                }
                PlanStep::Insert { entity, .. } => {
                    prop_assert!(!states.contains_key(&entity.id));
                }
            }
        }
    }
}
