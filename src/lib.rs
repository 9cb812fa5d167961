//! CardAll Persistence Core
//!
//! Layered architecture:
//! - domain: Core entities and abstractions
//! - repository: Store adapters (SQLite persistent store, JSON legacy store)
//! - persistence: Migration, reconciliation, debounced writes, consistency checks
//!
//! The composition root is [`CardAll`]: it owns the stores, one engine
//! per collection and the event bus, with an explicit init/shutdown
//! lifecycle.

pub mod domain;
pub mod persistence;
pub mod repository;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::info;
use tokio::sync::broadcast;

pub use domain::{Card, Collection, Entity, Folder, PersistenceError, PersistenceResult};
pub use persistence::{
    EngineConfig, EngineStatus, EventBus, PersistenceEngine, PersistenceEvent, StoreMode,
};

use repository::{
    init_db, JsonFileStore, LegacyStore, PersistentStore, SqliteCardStore, SqliteFolderStore,
};

/// Application-level configuration
#[derive(Debug, Clone)]
pub struct CardAllConfig {
    /// SQLite database file
    pub db_path: PathBuf,
    /// Legacy key-value store file
    pub legacy_path: PathBuf,
    /// Per-engine tuning, shared by both collections
    pub engine: EngineConfig,
    /// Event bus buffer size
    pub event_capacity: usize,
}

impl CardAllConfig {
    /// Default file layout inside an application data directory
    pub fn in_dir(data_dir: &Path) -> Self {
        Self {
            db_path: data_dir.join("cardall.db"),
            legacy_path: data_dir.join("cardall_legacy.json"),
            engine: EngineConfig::default(),
            event_capacity: 64,
        }
    }
}

/// Application state: both persistence engines plus the event bus
pub struct CardAll {
    pub folders: PersistenceEngine<Folder>,
    pub cards: PersistenceEngine<Card>,
    bus: EventBus,
}

impl CardAll {
    /// Open the stores, run migrations and start both engines
    pub async fn init(config: CardAllConfig) -> PersistenceResult<Self> {
        let conn = init_db(&config.db_path).await?;
        let legacy: Arc<dyn LegacyStore> = Arc::new(JsonFileStore::open(&config.legacy_path)?);
        let bus = EventBus::new(config.event_capacity);

        let folder_store: Arc<dyn PersistentStore<Folder>> =
            Arc::new(SqliteFolderStore::new(conn.clone()));
        let card_store: Arc<dyn PersistentStore<Card>> = Arc::new(SqliteCardStore::new(conn));

        let folders = PersistenceEngine::init(
            "folders",
            folder_store,
            legacy.clone(),
            bus.clone(),
            &config.engine,
        )
        .await?;
        let cards =
            PersistenceEngine::init("cards", card_store, legacy, bus.clone(), &config.engine)
                .await?;

        info!("cardall initialized ({})", config.db_path.display());
        Ok(Self {
            folders,
            cards,
            bus,
        })
    }

    /// Subscribe to persistence events from both engines
    pub fn subscribe(&self) -> broadcast::Receiver<PersistenceEvent> {
        self.bus.subscribe()
    }

    /// Aggregated human-readable diagnostic report
    pub async fn generate_report(&self) -> String {
        let mut report = String::from("=== CardAll Persistence Report ===\n");
        report.push_str(&self.folders.report_section().await);
        report.push_str(&self.cards.report_section().await);
        report
    }

    /// Tear down both engines; pending state is flushed before return
    pub async fn shutdown(self) {
        self.folders.shutdown().await;
        self.cards.shutdown().await;
        info!("cardall shut down");
    }
}
