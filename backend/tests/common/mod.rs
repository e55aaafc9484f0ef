//! Shared fixtures for the ledger integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use backoffice::{
    audit::{AuditEvent, AuditHook},
    config::{AuditConfig, DatabaseConfig, JwtConfig, LedgerConfig, ServerConfig},
    services::{
        ledger::{MovementInput, ReverseInput},
        stock::CreateStockInput,
        AlertService, LedgerService, StockService,
    },
    store::{MemoryCatalog, MemoryLedgerStore},
    AppState, Config,
};
use shared::StockKey;
use tokio::sync::mpsc;
use uuid::Uuid;

pub const JWT_SECRET: &str = "test-secret-key";

pub struct Harness {
    pub store: Arc<MemoryLedgerStore>,
    pub catalog: Arc<MemoryCatalog>,
    pub ledger: LedgerService,
    pub stock: StockService,
    pub alerts: AlertService,
    pub audit_rx: mpsc::Receiver<AuditEvent>,
    pub actor: Uuid,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(LedgerConfig::default())
    }

    pub fn with_config(config: LedgerConfig) -> Self {
        let store = Arc::new(MemoryLedgerStore::new(config.lock_timeout()));
        let catalog = Arc::new(MemoryCatalog::permissive());
        let (audit, audit_rx) = AuditHook::channel(256);

        Self {
            ledger: LedgerService::new(store.clone(), audit.clone(), config.clone()),
            stock: StockService::new(store.clone(), catalog.clone(), audit, config),
            alerts: AlertService::new(store.clone()),
            store,
            catalog,
            audit_rx,
            actor: Uuid::new_v4(),
        }
    }

    /// Create a record for a fresh (product, location, variant)
    pub async fn record(&self, quantity: i64, reorder_threshold: i64) -> Uuid {
        self.record_at(Uuid::new_v4(), quantity, reorder_threshold)
            .await
    }

    pub async fn record_at(&self, location_id: Uuid, quantity: i64, reorder_threshold: i64) -> Uuid {
        self.stock
            .create(
                self.actor,
                create_input(random_key_at(location_id), quantity, reorder_threshold),
            )
            .await
            .expect("create stock record")
            .id
    }

    pub async fn balance(&self, record_id: Uuid) -> i64 {
        self.stock
            .get(record_id)
            .await
            .expect("get stock record")
            .record
            .quantity_on_hand
    }

    /// Drain every audit event emitted so far
    pub fn drain_audit(&mut self) -> Vec<AuditEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.audit_rx.try_recv() {
            events.push(event);
        }
        events
    }
}

pub fn random_key() -> StockKey {
    random_key_at(Uuid::new_v4())
}

pub fn random_key_at(location_id: Uuid) -> StockKey {
    StockKey {
        product_id: Uuid::new_v4(),
        location_id,
        variant_id: Uuid::new_v4(),
    }
}

pub fn create_input(key: StockKey, quantity: i64, reorder_threshold: i64) -> CreateStockInput {
    CreateStockInput {
        product_id: key.product_id,
        location_id: key.location_id,
        variant_id: key.variant_id,
        quantity,
        reorder_threshold,
    }
}

pub fn movement(record_id: Uuid, kind: &str, quantity: i64) -> MovementInput {
    MovementInput {
        stock_record_id: record_id,
        kind: kind.to_string(),
        quantity,
        reason: format!("{} for test", kind),
    }
}

pub fn reverse(reason: &str) -> ReverseInput {
    ReverseInput {
        reason: reason.to_string(),
    }
}

pub fn fast_lock_config() -> LedgerConfig {
    LedgerConfig {
        lock_timeout_ms: 50,
        ..LedgerConfig::default()
    }
}

pub fn test_config() -> Config {
    Config {
        environment: "test".to_string(),
        server: ServerConfig::default(),
        database: DatabaseConfig {
            url: "postgres://localhost/unused".to_string(),
            max_connections: 1,
            min_connections: 0,
            acquire_timeout_secs: 1,
        },
        jwt: JwtConfig {
            secret: JWT_SECRET.to_string(),
        },
        ledger: LedgerConfig::default(),
        audit: AuditConfig::default(),
    }
}

/// Application state over in-memory stores
pub fn memory_state(catalog: MemoryCatalog) -> AppState {
    let config = test_config();
    AppState {
        store: Arc::new(MemoryLedgerStore::new(Duration::from_millis(
            config.ledger.lock_timeout_ms,
        ))),
        catalog: Arc::new(catalog),
        audit: AuditHook::disabled(),
        config: Arc::new(config),
    }
}
