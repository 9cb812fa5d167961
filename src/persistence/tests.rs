//! Persistence Engine Integration Tests
//!
//! Exercises migration, reconciliation, debouncing, consistency
//! checking and the diagnostic surface against in-memory test stores
//! (with failure injection) and the real SQLite/JSON adapters.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{Entity, Folder, PersistenceError, PersistenceResult};
use crate::persistence::{
    DebouncedWriter, EngineConfig, EventBus, MigrationController, MigrationOutcome,
    PersistenceEvent, Reconciler, StoreMode,
};
use crate::repository::{get_json, set_json, LegacyStore, PersistentStore};
use crate::{CardAll, CardAllConfig};

// ============================================================================
// Test doubles
// ============================================================================

/// In-memory persistent store with failure injection
struct MemStore<T: Entity> {
    data: Mutex<HashMap<T::Id, T>>,
    /// Number of bulk_write calls that have been made
    write_calls: AtomicUsize,
    /// Fail this many upcoming bulk_write calls
    fail_remaining: AtomicUsize,
}

impl<T: Entity> MemStore<T> {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            data: Mutex::new(HashMap::new()),
            write_calls: AtomicUsize::new(0),
            fail_remaining: AtomicUsize::new(0),
        })
    }

    fn fail_next(&self, n: usize) {
        self.fail_remaining.store(n, Ordering::SeqCst);
    }

    fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    fn contents(&self) -> Vec<T> {
        let mut entities: Vec<T> = self.data.lock().unwrap().values().cloned().collect();
        entities.sort_by_key(|e| e.id());
        entities
    }
}

#[async_trait]
impl<T: Entity> PersistentStore<T> for MemStore<T> {
    async fn read_all(&self) -> PersistenceResult<Vec<T>> {
        Ok(self.contents())
    }

    async fn bulk_write(
        &self,
        add: &[T],
        update: &[T],
        delete: &[T::Id],
    ) -> PersistenceResult<()> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        if self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(PersistenceError::Internal("injected failure".to_string()));
        }

        let mut data = self.data.lock().unwrap();
        for id in delete {
            data.remove(id);
        }
        for entity in update.iter().chain(add) {
            data.insert(entity.id(), entity.clone());
        }
        Ok(())
    }

    async fn clear(&self) -> PersistenceResult<()> {
        self.data.lock().unwrap().clear();
        Ok(())
    }
}

/// In-memory legacy store with write failure injection
struct MemLegacy {
    entries: Mutex<BTreeMap<String, String>>,
    /// Fail this many upcoming set_raw calls
    fail_remaining: AtomicUsize,
}

impl MemLegacy {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(BTreeMap::new()),
            fail_remaining: AtomicUsize::new(0),
        })
    }

    fn fail_next_set(&self, n: usize) {
        self.fail_remaining.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl LegacyStore for MemLegacy {
    async fn get_raw(&self, key: &str) -> PersistenceResult<Option<String>> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn set_raw(&self, key: &str, value: &str) -> PersistenceResult<()> {
        if self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(PersistenceError::StoreUnavailable(
                "injected failure".to_string(),
            ));
        }
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> PersistenceResult<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }

    async fn keys(&self) -> PersistenceResult<Vec<String>> {
        Ok(self.entries.lock().unwrap().keys().cloned().collect())
    }
}

async fn recv_matching<F>(rx: &mut tokio::sync::broadcast::Receiver<PersistenceEvent>, pred: F) -> PersistenceEvent
where
    F: Fn(&PersistenceEvent) -> bool,
{
    loop {
        // Longer than any timer in these tests, so under a paused clock
        // the legitimate timer always fires first
        let event = tokio::time::timeout(Duration::from_secs(60), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("bus closed");
        if pred(&event) {
            return event;
        }
    }
}

// ============================================================================
// Migration
// ============================================================================

#[tokio::test]
async fn test_migration_transfers_legacy_content_and_sets_flag() {
    let store = MemStore::<Folder>::new();
    let legacy = MemLegacy::new();
    let folders = vec![Folder::new("f1", "Work"), Folder::new("f2", "Home")];
    set_json(legacy.as_ref(), "cardall:folders", &folders)
        .await
        .unwrap();

    let migration = MigrationController::new(
        "folders",
        legacy.clone() as Arc<dyn LegacyStore>,
        store.clone() as Arc<dyn PersistentStore<Folder>>,
        EventBus::default(),
    );

    match migration.run().await.unwrap() {
        MigrationOutcome::Migrated(entities) => assert_eq!(entities.len(), 2),
        _ => panic!("expected Migrated"),
    }
    assert_eq!(store.contents(), folders);
    assert!(migration.is_migrated().await);

    // Second run skips entirely
    assert!(matches!(
        migration.run().await.unwrap(),
        MigrationOutcome::AlreadyMigrated
    ));
    assert_eq!(store.write_calls(), 1);
}

#[tokio::test]
async fn test_migration_failure_leaves_flag_unset() {
    let store = MemStore::<Folder>::new();
    let legacy = MemLegacy::new();
    set_json(legacy.as_ref(), "cardall:folders", &vec![Folder::new("f1", "Work")])
        .await
        .unwrap();
    store.fail_next(1); // migration does not retry within a session

    let migration = MigrationController::new(
        "folders",
        legacy.clone() as Arc<dyn LegacyStore>,
        store.clone() as Arc<dyn PersistentStore<Folder>>,
        EventBus::default(),
    );

    match migration.run().await.unwrap() {
        MigrationOutcome::Degraded(entities) => {
            // Session still has the legacy content
            assert_eq!(entities.len(), 1);
        }
        _ => panic!("expected Degraded"),
    }
    assert!(!migration.is_migrated().await);

    // Next load retries and succeeds
    match migration.run().await.unwrap() {
        MigrationOutcome::Migrated(entities) => assert_eq!(entities.len(), 1),
        _ => panic!("expected Migrated on retry"),
    }
    assert!(migration.is_migrated().await);
}

#[tokio::test]
async fn test_migration_with_empty_legacy_store() {
    let store = MemStore::<Folder>::new();
    let legacy = MemLegacy::new();

    let migration = MigrationController::new(
        "folders",
        legacy as Arc<dyn LegacyStore>,
        store.clone() as Arc<dyn PersistentStore<Folder>>,
        EventBus::default(),
    );

    match migration.run().await.unwrap() {
        MigrationOutcome::Migrated(entities) => assert!(entities.is_empty()),
        _ => panic!("expected Migrated"),
    }
    assert!(migration.is_migrated().await);
}

#[tokio::test(start_paused = true)]
async fn test_migration_rerun_keeps_rows_written_since_failed_flag_write() {
    use crate::persistence::PersistenceEngine;

    let store = MemStore::<Folder>::new();
    let legacy = MemLegacy::new();
    set_json(legacy.as_ref(), "cardall:folders", &vec![Folder::new("f1", "Work")])
        .await
        .unwrap();
    let bus = EventBus::default();
    let config = EngineConfig {
        quiet_period: Duration::from_millis(100),
        check_interval: Duration::from_secs(30),
        self_heal: false,
    };

    // Session 1: the legacy content transfers, but the flag write fails
    legacy.fail_next_set(1);
    let engine = PersistenceEngine::init(
        "folders",
        store.clone() as Arc<dyn PersistentStore<Folder>>,
        legacy.clone() as Arc<dyn LegacyStore>,
        bus.clone(),
        &config,
    )
    .await
    .unwrap();
    assert_eq!(engine.mode(), StoreMode::Migrated);

    let mut rx = bus.subscribe();
    engine.upsert(Folder::new("f2", "Home")).await;
    recv_matching(&mut rx, |e| {
        matches!(e, PersistenceEvent::FlushCompleted { .. })
    })
    .await;
    engine.shutdown().await;

    // Session 2: the flag stayed unset, so migration re-runs from the
    // legacy payload. Rows persisted last session must survive it.
    let engine = PersistenceEngine::init(
        "folders",
        store.clone() as Arc<dyn PersistentStore<Folder>>,
        legacy.clone() as Arc<dyn LegacyStore>,
        bus.clone(),
        &config,
    )
    .await
    .unwrap();
    assert_eq!(engine.len().await, 2);
    assert!(engine.get(&"f2".to_string()).await.is_some());
    engine.shutdown().await;
}

// ============================================================================
// Reconciler
// ============================================================================

fn reconciler_over(
    store: &Arc<MemStore<Folder>>,
    legacy: &Arc<MemLegacy>,
    bus: &EventBus,
) -> Reconciler<Folder> {
    Reconciler::new(
        "folders",
        store.clone() as Arc<dyn PersistentStore<Folder>>,
        legacy.clone() as Arc<dyn LegacyStore>,
        bus.clone(),
    )
}

#[tokio::test]
async fn test_reconcile_makes_store_match_collection() {
    let store = MemStore::<Folder>::new();
    let legacy = MemLegacy::new();
    let mut reconciler = reconciler_over(&store, &legacy, &EventBus::default());

    let snapshot = vec![Folder::new("f1", "Work"), Folder::new("f2", "Home")];
    let stats = reconciler.apply(&snapshot).await.unwrap();
    assert_eq!(stats.added, 2);

    let mut expected = snapshot.clone();
    expected.sort_by(|a, b| a.id.cmp(&b.id));
    assert_eq!(store.contents(), expected);
}

#[tokio::test]
async fn test_reconcile_second_pass_adds_and_deletes_nothing() {
    let store = MemStore::<Folder>::new();
    let legacy = MemLegacy::new();
    let mut reconciler = reconciler_over(&store, &legacy, &EventBus::default());

    let snapshot = vec![Folder::new("f1", "Work")];
    reconciler.apply(&snapshot).await.unwrap();

    let stats = reconciler.apply(&snapshot).await.unwrap();
    assert_eq!(stats.added, 0);
    assert_eq!(stats.deleted, 0);
    assert_eq!(store.contents().len(), 1);
}

#[tokio::test]
async fn test_reconcile_rename_rewrites_without_extra_entries() {
    let store = MemStore::<Folder>::new();
    let legacy = MemLegacy::new();
    let mut reconciler = reconciler_over(&store, &legacy, &EventBus::default());

    let mut work = Folder::new("f1", "Work");
    reconciler.apply(std::slice::from_ref(&work)).await.unwrap();

    work.name = "Work!".to_string();
    let stats = reconciler.apply(std::slice::from_ref(&work)).await.unwrap();
    assert_eq!(stats.added, 0);
    assert_eq!(stats.updated, 1);

    let contents = store.contents();
    assert_eq!(contents.len(), 1);
    assert_eq!(contents[0].name, "Work!");
}

#[tokio::test]
async fn test_reconcile_delete_touches_only_removed_entity() {
    let store = MemStore::<Folder>::new();
    let legacy = MemLegacy::new();
    let mut reconciler = reconciler_over(&store, &legacy, &EventBus::default());

    let f1 = Folder::new("f1", "Work");
    let f2 = Folder::new("f2", "Home");
    reconciler.apply(&[f1.clone(), f2]).await.unwrap();

    // User deletes f2
    let stats = reconciler.apply(std::slice::from_ref(&f1)).await.unwrap();
    assert_eq!(stats.deleted, 1);
    assert_eq!(stats.added, 0);
    assert_eq!(store.contents(), vec![f1]);
}

#[tokio::test]
async fn test_reconcile_retry_once_recovers() {
    let store = MemStore::<Folder>::new();
    let legacy = MemLegacy::new();
    let mut reconciler = reconciler_over(&store, &legacy, &EventBus::default());

    store.fail_next(1);
    let snapshot = vec![Folder::new("f1", "Work")];
    reconciler.apply(&snapshot).await.expect("retry should recover");
    assert_eq!(store.write_calls(), 2);
    assert_eq!(store.contents(), snapshot);
}

#[tokio::test]
async fn test_reconcile_double_failure_backs_up_and_degrades() {
    let store = MemStore::<Folder>::new();
    let legacy = MemLegacy::new();
    let bus = EventBus::default();
    let mut rx = bus.subscribe();
    let mut reconciler = reconciler_over(&store, &legacy, &bus);

    store.fail_next(2);
    let snapshot = vec![Folder::new("f1", "Work")];
    let err = reconciler.apply(&snapshot).await.unwrap_err();
    assert!(matches!(err, PersistenceError::ReconciliationFailed(_)));

    let event = recv_matching(&mut rx, |e| {
        matches!(e, PersistenceEvent::PersistenceDegraded { .. })
    })
    .await;
    let backup_id = match event {
        PersistenceEvent::PersistenceDegraded { backup_id, .. } => backup_id,
        _ => unreachable!(),
    };
    assert!(!backup_id.is_empty());

    // Backup snapshot landed in the legacy store
    let key = format!("cardall:folders:backup:{}", backup_id);
    let backed_up: Option<Vec<Folder>> = get_json(legacy.as_ref(), &key).await.unwrap();
    assert_eq!(backed_up.unwrap(), snapshot);

    // Baseline untouched: the next pass retries the same diff and heals
    let stats = reconciler.apply(&snapshot).await.unwrap();
    assert_eq!(stats.added, 1);
    assert_eq!(store.contents(), snapshot);
}

// ============================================================================
// Debounced writer
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_debounce_coalesces_burst_into_one_flush() {
    let store = MemStore::<Folder>::new();
    let legacy = MemLegacy::new();
    let reconciler = reconciler_over(&store, &legacy, &EventBus::default());
    let writer = DebouncedWriter::spawn("folders", Duration::from_millis(800), reconciler);

    writer.schedule(vec![Folder::new("f1", "A")]);
    writer.schedule(vec![Folder::new("f1", "B")]);
    writer.schedule(vec![Folder::new("f1", "Work!")]);

    // Let the quiet period elapse
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(store.write_calls(), 1);
    let contents = store.contents();
    assert_eq!(contents.len(), 1);
    assert_eq!(contents[0].name, "Work!");

    writer.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_debounce_quiet_period_restarts_on_schedule() {
    let store = MemStore::<Folder>::new();
    let legacy = MemLegacy::new();
    let reconciler = reconciler_over(&store, &legacy, &EventBus::default());
    let writer = DebouncedWriter::spawn("folders", Duration::from_millis(800), reconciler);

    writer.schedule(vec![Folder::new("f1", "A")]);
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(store.write_calls(), 0);

    writer.schedule(vec![Folder::new("f1", "B")]);
    tokio::time::sleep(Duration::from_millis(500)).await;
    // 1000ms since the first schedule, but only 500ms of quiet
    assert_eq!(store.write_calls(), 0);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(store.write_calls(), 1);
    assert_eq!(store.contents()[0].name, "B");

    writer.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_writer_flushes_pending_state_on_shutdown() {
    let store = MemStore::<Folder>::new();
    let legacy = MemLegacy::new();
    let reconciler = reconciler_over(&store, &legacy, &EventBus::default());
    let writer = DebouncedWriter::spawn("folders", Duration::from_secs(3600), reconciler);

    // Quiet period could never elapse; shutdown must still flush
    writer.schedule(vec![Folder::new("f1", "Work")]);
    writer.shutdown().await;

    assert_eq!(store.contents().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_schedule_after_flush_triggers_followup() {
    let store = MemStore::<Folder>::new();
    let legacy = MemLegacy::new();
    let reconciler = reconciler_over(&store, &legacy, &EventBus::default());
    let writer = DebouncedWriter::spawn("folders", Duration::from_millis(800), reconciler);

    writer.schedule(vec![Folder::new("f1", "First")]);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(store.write_calls(), 1);

    writer.schedule(vec![Folder::new("f1", "Second")]);
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(store.write_calls(), 2);
    assert_eq!(store.contents()[0].name, "Second");

    writer.shutdown().await;
}

// ============================================================================
// Full engine / composition root
// ============================================================================

fn test_config(dir: &std::path::Path) -> CardAllConfig {
    let mut config = CardAllConfig::in_dir(dir);
    config.engine = EngineConfig {
        quiet_period: Duration::from_millis(50),
        check_interval: Duration::from_secs(3600),
        self_heal: false,
    };
    config
}

#[tokio::test]
async fn test_cardall_migrates_then_persists_across_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    // Seed the legacy store the way the old storage left it
    {
        let legacy = crate::repository::JsonFileStore::open(&config.legacy_path).unwrap();
        let folders = vec![Folder::new("f1", "Work"), Folder::new("f2", "Home")];
        set_json(&legacy, "cardall:folders", &folders).await.unwrap();
    }

    let app = CardAll::init(config.clone()).await.unwrap();
    assert_eq!(app.folders.len().await, 2);
    assert_eq!(app.folders.mode(), StoreMode::Migrated);

    app.folders.upsert(Folder::new("f3", "Archive")).await;
    app.folders.remove(&"f2".to_string()).await;
    // Shutdown flushes whatever the debounce window still holds
    app.shutdown().await;

    // Restart: flag is set, so the persistent store is authoritative
    let app = CardAll::init(config).await.unwrap();
    let ids: Vec<String> = app
        .folders
        .snapshot()
        .await
        .into_iter()
        .map(|f| f.id)
        .collect();
    assert_eq!(ids, vec!["f1".to_string(), "f3".to_string()]);
    app.shutdown().await;
}

#[tokio::test]
async fn test_cardall_engines_are_independent() {
    let dir = tempfile::tempdir().unwrap();
    let app = CardAll::init(test_config(dir.path())).await.unwrap();

    app.folders.upsert(Folder::new("f1", "Work")).await;
    app.cards
        .upsert(crate::domain::Card::new_in_folder("c1", "Note", "f1", 0))
        .await;

    assert_eq!(app.folders.len().await, 1);
    assert_eq!(app.cards.len().await, 1);
    assert!(app.folders.get(&"c1".to_string()).await.is_none());
    app.shutdown().await;
}

#[tokio::test]
async fn test_flush_completed_event_reaches_subscribers() {
    let dir = tempfile::tempdir().unwrap();
    let app = CardAll::init(test_config(dir.path())).await.unwrap();
    let mut rx = app.subscribe();

    app.folders.upsert(Folder::new("f1", "Work")).await;

    let event = recv_matching(&mut rx, |e| {
        matches!(e, PersistenceEvent::FlushCompleted { collection, .. } if collection == "folders")
    })
    .await;
    match event {
        PersistenceEvent::FlushCompleted { added, .. } => assert_eq!(added, 1),
        _ => unreachable!(),
    }
    app.shutdown().await;
}

// ============================================================================
// Consistency checker (engine-level, via self-heal)
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_checker_reports_drift_and_self_heals() {
    use crate::persistence::PersistenceEngine;

    let store = MemStore::<Folder>::new();
    let legacy = MemLegacy::new();
    let bus = EventBus::default();
    let mut rx = bus.subscribe();

    let engine = PersistenceEngine::init(
        "folders",
        store.clone() as Arc<dyn PersistentStore<Folder>>,
        legacy.clone() as Arc<dyn LegacyStore>,
        bus.clone(),
        &EngineConfig {
            quiet_period: Duration::from_millis(100),
            check_interval: Duration::from_secs(30),
            self_heal: true,
        },
    )
    .await
    .unwrap();

    engine.upsert(Folder::new("f1", "Work")).await;
    // Wait for the debounced flush to land
    recv_matching(&mut rx, |e| {
        matches!(e, PersistenceEvent::FlushCompleted { .. })
    })
    .await;

    // Sabotage the store behind the engine's back
    store.clear().await.unwrap();

    let event = recv_matching(&mut rx, |e| {
        matches!(e, PersistenceEvent::DriftDetected { .. })
    })
    .await;
    match event {
        PersistenceEvent::DriftDetected {
            missing_in_store,
            extra_in_store,
            ..
        } => {
            assert_eq!(missing_in_store, vec!["f1".to_string()]);
            assert!(extra_in_store.is_empty());
        }
        _ => unreachable!(),
    }

    // Self-healing flush restores the store
    recv_matching(&mut rx, |e| {
        matches!(e, PersistenceEvent::FlushCompleted { .. })
    })
    .await;
    assert_eq!(store.contents().len(), 1);

    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_checker_self_heals_rows_added_behind_the_engine() {
    use crate::persistence::PersistenceEngine;

    let store = MemStore::<Folder>::new();
    let legacy = MemLegacy::new();
    let bus = EventBus::default();
    let mut rx = bus.subscribe();

    let engine = PersistenceEngine::init(
        "folders",
        store.clone() as Arc<dyn PersistentStore<Folder>>,
        legacy.clone() as Arc<dyn LegacyStore>,
        bus.clone(),
        &EngineConfig {
            quiet_period: Duration::from_millis(100),
            check_interval: Duration::from_secs(30),
            self_heal: true,
        },
    )
    .await
    .unwrap();

    engine.upsert(Folder::new("f1", "Work")).await;
    recv_matching(&mut rx, |e| {
        matches!(e, PersistenceEvent::FlushCompleted { .. })
    })
    .await;

    // Sneak a row into the store that the engine never wrote
    store
        .bulk_write(&[Folder::new("f2", "Stray")], &[], &[])
        .await
        .unwrap();

    let event = recv_matching(&mut rx, |e| {
        matches!(e, PersistenceEvent::DriftDetected { .. })
    })
    .await;
    match event {
        PersistenceEvent::DriftDetected {
            missing_in_store,
            extra_in_store,
            ..
        } => {
            assert!(missing_in_store.is_empty());
            assert_eq!(extra_in_store, vec!["f2".to_string()]);
        }
        _ => unreachable!(),
    }

    // The healing flush must delete the stray row, not leave it to be
    // reported again on every later check
    let event = recv_matching(&mut rx, |e| {
        matches!(e, PersistenceEvent::FlushCompleted { .. })
    })
    .await;
    match event {
        PersistenceEvent::FlushCompleted { deleted, .. } => assert_eq!(deleted, 1),
        _ => unreachable!(),
    }
    let contents = store.contents();
    assert_eq!(contents.len(), 1);
    assert_eq!(contents[0].id, "f1");

    engine.shutdown().await;
}

// ============================================================================
// Diagnostics
// ============================================================================

#[tokio::test]
async fn test_status_and_report() {
    let dir = tempfile::tempdir().unwrap();
    let app = CardAll::init(test_config(dir.path())).await.unwrap();

    app.folders.upsert(Folder::new("f1", "Work")).await;
    let status = app.folders.status().await;
    assert_eq!(status.collection, "folders");
    assert!(status.migrated);
    assert_eq!(status.in_memory, 1);

    let report = app.generate_report().await;
    assert!(report.contains("[folders]"));
    assert!(report.contains("[cards]"));
    app.shutdown().await;
}

#[tokio::test]
async fn test_snapshot_create_and_restore() {
    let dir = tempfile::tempdir().unwrap();
    let app = CardAll::init(test_config(dir.path())).await.unwrap();

    app.folders.upsert(Folder::new("f1", "Work")).await;
    let backup_id = app.folders.create_snapshot().await.unwrap();
    assert_eq!(app.folders.list_snapshots().await.unwrap(), vec![backup_id.clone()]);

    app.folders.remove(&"f1".to_string()).await;
    app.folders.upsert(Folder::new("f9", "Noise")).await;

    let restored = app.folders.restore_snapshot(&backup_id).await.unwrap();
    assert_eq!(restored, 1);
    assert!(app.folders.get(&"f1".to_string()).await.is_some());
    assert!(app.folders.get(&"f9".to_string()).await.is_none());
    app.shutdown().await;
}

#[tokio::test]
async fn test_restore_unknown_snapshot_is_invalid_input() {
    let dir = tempfile::tempdir().unwrap();
    let app = CardAll::init(test_config(dir.path())).await.unwrap();

    let err = app.folders.restore_snapshot("nope").await.unwrap_err();
    assert!(matches!(err, PersistenceError::InvalidInput(_)));
    app.shutdown().await;
}

#[tokio::test]
async fn test_clear_storage_keeps_migration_flag() {
    let dir = tempfile::tempdir().unwrap();
    let app = CardAll::init(test_config(dir.path())).await.unwrap();
    let mut rx = app.subscribe();

    app.folders.upsert(Folder::new("f1", "Work")).await;
    // Let the debounced flush land first, so it cannot re-add the
    // entity after the wipe
    recv_matching(&mut rx, |e| {
        matches!(e, PersistenceEvent::FlushCompleted { .. })
    })
    .await;
    app.folders.clear_storage().await.unwrap();

    assert_eq!(app.folders.len().await, 0);
    let status = app.folders.status().await;
    assert_eq!(status.persisted, Some(0));
    // Flag survives: normal operation never re-runs migration
    assert!(status.migrated);
    app.shutdown().await;
}

#[tokio::test]
async fn test_force_migration_is_the_only_flag_reset() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    {
        let legacy = crate::repository::JsonFileStore::open(&config.legacy_path).unwrap();
        set_json(&legacy, "cardall:folders", &vec![Folder::new("f1", "Work")])
            .await
            .unwrap();
    }

    let mut app = CardAll::init(config).await.unwrap();
    assert!(app.folders.status().await.migrated);

    // Drift in: someone edited memory without the legacy copy changing
    app.folders.upsert(Folder::new("f2", "Extra")).await;
    let count = app.folders.force_migration().await.unwrap();
    assert_eq!(count, 1);
    assert_eq!(app.folders.len().await, 1);
    assert!(app.folders.status().await.migrated);
    app.shutdown().await;
}
