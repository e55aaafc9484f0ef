//! Stock alert projection

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::StockRecord;

/// Classification of a stock record against its reorder threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    Normal,
    Low,
    OutOfStock,
}

impl StockStatus {
    pub fn classify(quantity_on_hand: i64, reorder_threshold: i64) -> Self {
        if quantity_on_hand <= 0 {
            StockStatus::OutOfStock
        } else if quantity_on_hand <= reorder_threshold {
            StockStatus::Low
        } else {
            StockStatus::Normal
        }
    }

    pub fn of(record: &StockRecord) -> Self {
        Self::classify(record.quantity_on_hand, record.reorder_threshold)
    }

    /// Parse a list filter value (`low`, `out`, `normal`)
    pub fn from_filter(s: &str) -> Option<Self> {
        match s {
            "normal" => Some(StockStatus::Normal),
            "low" => Some(StockStatus::Low),
            "out" | "out_of_stock" => Some(StockStatus::OutOfStock),
            _ => None,
        }
    }

    pub fn is_alert(&self) -> bool {
        !matches!(self, StockStatus::Normal)
    }
}

/// A stock record flagged by the alert projection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockAlert {
    pub stock_record_id: Uuid,
    pub product_id: Uuid,
    pub location_id: Uuid,
    pub variant_id: Uuid,
    pub quantity_on_hand: i64,
    pub reorder_threshold: i64,
    pub status: StockStatus,
}

/// Counts per alert class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertSummary {
    pub total: usize,
    pub low: usize,
    pub out_of_stock: usize,
}

/// Alert summary plus the flagged records, lowest quantity first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertReport {
    pub summary: AlertSummary,
    pub alerts: Vec<StockAlert>,
}

impl AlertReport {
    /// Classify non-voided records, dropping the ones above threshold.
    pub fn project<'a>(records: impl IntoIterator<Item = &'a StockRecord>) -> Self {
        let mut alerts: Vec<StockAlert> = records
            .into_iter()
            .filter(|r| !r.is_voided())
            .filter_map(|r| {
                let status = StockStatus::of(r);
                status.is_alert().then(|| StockAlert {
                    stock_record_id: r.id,
                    product_id: r.product_id,
                    location_id: r.location_id,
                    variant_id: r.variant_id,
                    quantity_on_hand: r.quantity_on_hand,
                    reorder_threshold: r.reorder_threshold,
                    status,
                })
            })
            .collect();

        alerts.sort_by_key(|a| a.quantity_on_hand);

        let out_of_stock = alerts
            .iter()
            .filter(|a| a.status == StockStatus::OutOfStock)
            .count();
        let summary = AlertSummary {
            total: alerts.len(),
            low: alerts.len() - out_of_stock,
            out_of_stock,
        };

        Self { summary, alerts }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(quantity_on_hand: i64, reorder_threshold: i64) -> StockRecord {
        StockRecord {
            id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            location_id: Uuid::new_v4(),
            variant_id: Uuid::new_v4(),
            quantity_on_hand,
            reorder_threshold,
            created_by: Uuid::new_v4(),
            created_at: Utc::now(),
            modified_by: None,
            modified_at: None,
            voided_by: None,
            voided_at: None,
        }
    }

    #[test]
    fn test_classify_boundaries() {
        assert_eq!(StockStatus::classify(0, 5), StockStatus::OutOfStock);
        assert_eq!(StockStatus::classify(1, 5), StockStatus::Low);
        assert_eq!(StockStatus::classify(5, 5), StockStatus::Low);
        assert_eq!(StockStatus::classify(6, 5), StockStatus::Normal);
        assert_eq!(StockStatus::classify(0, 0), StockStatus::OutOfStock);
        assert_eq!(StockStatus::classify(1, 0), StockStatus::Normal);
    }

    #[test]
    fn test_filter_values() {
        assert_eq!(StockStatus::from_filter("out"), Some(StockStatus::OutOfStock));
        assert_eq!(StockStatus::from_filter("low"), Some(StockStatus::Low));
        assert_eq!(StockStatus::from_filter("normal"), Some(StockStatus::Normal));
        assert_eq!(StockStatus::from_filter("empty"), None);
    }

    #[test]
    fn test_projection_orders_and_counts() {
        let records = vec![record(6, 5), record(5, 5), record(0, 5), record(2, 10)];
        let report = AlertReport::project(&records);

        assert_eq!(
            report.summary,
            AlertSummary {
                total: 3,
                low: 2,
                out_of_stock: 1
            }
        );
        let quantities: Vec<i64> = report.alerts.iter().map(|a| a.quantity_on_hand).collect();
        assert_eq!(quantities, vec![0, 2, 5]);
        assert_eq!(report.alerts[0].status, StockStatus::OutOfStock);
    }

    #[test]
    fn test_projection_skips_voided() {
        let mut voided = record(0, 5);
        voided.voided_at = Some(Utc::now());
        let report = AlertReport::project([&voided]);
        assert_eq!(report.summary.total, 0);
        assert!(report.alerts.is_empty());
    }
}
