//! Low-stock and out-of-stock projection

use std::sync::Arc;

use serde::Deserialize;
use shared::AlertReport;
use uuid::Uuid;

use crate::error::AppResult;
use crate::store::{LedgerStore, StockFilter};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlertQuery {
    pub location_id: Option<Uuid>,
}

/// Alert service
#[derive(Clone)]
pub struct AlertService {
    store: Arc<dyn LedgerStore>,
}

impl AlertService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Records at or below their reorder threshold, optionally for one location
    pub async fn alerts(&self, query: AlertQuery) -> AppResult<AlertReport> {
        let filter = StockFilter {
            location_id: query.location_id,
            ..Default::default()
        };
        let records = self.store.list_records(&filter).await?;
        Ok(AlertReport::project(&records))
    }
}
