//! Movement ledger models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Kind of stock movement recorded in the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    Inbound,
    Outbound,
    Adjustment,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown movement kind: {0}")]
pub struct UnknownMovementKind(pub String);

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Inbound => "inbound",
            MovementKind::Outbound => "outbound",
            MovementKind::Adjustment => "adjustment",
        }
    }

    /// The kind a compensating entry is recorded with.
    ///
    /// Adjustments stay adjustments; the sign of the delta carries the reversal.
    pub fn opposite(&self) -> Self {
        match self {
            MovementKind::Inbound => MovementKind::Outbound,
            MovementKind::Outbound => MovementKind::Inbound,
            MovementKind::Adjustment => MovementKind::Adjustment,
        }
    }

    /// Effect of a stored `quantity_delta` on the balance.
    pub fn signed_effect(&self, quantity_delta: i64) -> i64 {
        match self {
            MovementKind::Inbound => quantity_delta,
            MovementKind::Outbound => -quantity_delta,
            MovementKind::Adjustment => quantity_delta,
        }
    }
}

impl std::str::FromStr for MovementKind {
    type Err = UnknownMovementKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inbound" => Ok(MovementKind::Inbound),
            "outbound" => Ok(MovementKind::Outbound),
            "adjustment" => Ok(MovementKind::Adjustment),
            other => Err(UnknownMovementKind(other.to_string())),
        }
    }
}

impl std::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated movement, ready to be applied to a balance.
///
/// `quantity_delta` is stored exactly as it lands in the ledger: a positive
/// magnitude for inbound and outbound, a signed value for adjustments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Movement {
    pub kind: MovementKind,
    pub quantity_delta: i64,
}

impl Movement {
    /// Build a movement from a requested quantity.
    pub fn new(kind: MovementKind, quantity: i64) -> Result<Self, &'static str> {
        match kind {
            MovementKind::Inbound | MovementKind::Outbound if quantity <= 0 => {
                Err("Quantity must be a positive number")
            }
            MovementKind::Adjustment if quantity == 0 => Err("Adjustment quantity cannot be zero"),
            // its magnitude has no i64 representation
            MovementKind::Adjustment if quantity == i64::MIN => {
                Err("Adjustment quantity is out of range")
            }
            _ => Ok(Self {
                kind,
                quantity_delta: quantity,
            }),
        }
    }

    pub fn signed_effect(&self) -> i64 {
        self.kind.signed_effect(self.quantity_delta)
    }

    /// Balance after applying this movement to `balance`.
    pub fn resulting_balance(&self, balance: i64) -> Result<i64, BalanceError> {
        let next = balance
            .checked_add(self.signed_effect())
            .ok_or(BalanceError::Overflow)?;
        if next < 0 {
            let requested = self
                .signed_effect()
                .checked_neg()
                .ok_or(BalanceError::Overflow)?;
            return Err(BalanceError::Insufficient {
                available: balance,
                requested,
            });
        }
        Ok(next)
    }
}

/// Why a movement cannot be applied to a balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BalanceError {
    #[error("insufficient stock: {available} available, {requested} requested")]
    Insufficient { available: i64, requested: i64 },
    #[error("resulting balance is out of range")]
    Overflow,
}

/// An immutable entry in the movement ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub stock_record_id: Uuid,
    pub kind: MovementKind,
    pub quantity_delta: i64,
    /// Balance of the stock record right after this entry was written
    pub resulting_balance: i64,
    pub reason: String,
    pub actor_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub voided: bool,
    pub voided_at: Option<DateTime<Utc>>,
    pub voided_by: Option<Uuid>,
    /// Set on compensating entries; points at the entry being reversed
    pub reversal_of_entry_id: Option<Uuid>,
}

impl LedgerEntry {
    pub fn signed_effect(&self) -> i64 {
        self.kind.signed_effect(self.quantity_delta)
    }

    pub fn is_reversal(&self) -> bool {
        self.reversal_of_entry_id.is_some()
    }

    /// Neither voided nor a compensating entry.
    pub fn is_live(&self) -> bool {
        !self.voided && !self.is_reversal()
    }

    /// The movement that exactly cancels this entry's effect on the balance.
    pub fn compensating_movement(&self) -> Movement {
        let quantity_delta = match self.kind {
            MovementKind::Adjustment => -self.quantity_delta,
            MovementKind::Inbound | MovementKind::Outbound => self.quantity_delta,
        };
        Movement {
            kind: self.kind.opposite(),
            quantity_delta,
        }
    }
}

/// Entry payload handed to the store inside an atomic unit
#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub kind: MovementKind,
    pub quantity_delta: i64,
    pub resulting_balance: i64,
    pub reason: String,
    pub actor_id: Uuid,
    pub reversal_of_entry_id: Option<Uuid>,
}

/// Fold of a record's ledger, used for reconciliation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTotals {
    /// Sum of signed effects over every entry
    pub ledger_total: i64,
    /// Sum of signed effects over live entries only
    pub live_total: i64,
    pub entry_count: i64,
}

impl LedgerTotals {
    pub fn fold<'a>(entries: impl IntoIterator<Item = &'a LedgerEntry>) -> Self {
        entries.into_iter().fold(Self::default(), |mut acc, entry| {
            acc.ledger_total += entry.signed_effect();
            if entry.is_live() {
                acc.live_total += entry.signed_effect();
            }
            acc.entry_count += 1;
            acc
        })
    }

    pub fn matches(&self, quantity_on_hand: i64) -> bool {
        self.ledger_total == quantity_on_hand && self.live_total == quantity_on_hand
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn entry(kind: MovementKind, quantity_delta: i64) -> LedgerEntry {
        LedgerEntry {
            id: Uuid::new_v4(),
            stock_record_id: Uuid::new_v4(),
            kind,
            quantity_delta,
            resulting_balance: 0,
            reason: "test".to_string(),
            actor_id: Uuid::new_v4(),
            created_at: Utc::now(),
            voided: false,
            voided_at: None,
            voided_by: None,
            reversal_of_entry_id: None,
        }
    }

    #[test]
    fn test_opposite_kinds() {
        assert_eq!(MovementKind::Inbound.opposite(), MovementKind::Outbound);
        assert_eq!(MovementKind::Outbound.opposite(), MovementKind::Inbound);
        assert_eq!(MovementKind::Adjustment.opposite(), MovementKind::Adjustment);
    }

    #[test]
    fn test_parse_kind() {
        assert_eq!("inbound".parse::<MovementKind>(), Ok(MovementKind::Inbound));
        assert_eq!("outbound".parse::<MovementKind>(), Ok(MovementKind::Outbound));
        assert_eq!(
            "adjustment".parse::<MovementKind>(),
            Ok(MovementKind::Adjustment)
        );
        assert!("entrada".parse::<MovementKind>().is_err());
        assert!("Inbound".parse::<MovementKind>().is_err());
    }

    #[test]
    fn test_movement_quantity_rules() {
        assert!(Movement::new(MovementKind::Inbound, 5).is_ok());
        assert!(Movement::new(MovementKind::Inbound, 0).is_err());
        assert!(Movement::new(MovementKind::Outbound, -3).is_err());
        assert!(Movement::new(MovementKind::Adjustment, -3).is_ok());
        assert!(Movement::new(MovementKind::Adjustment, 0).is_err());
    }

    #[test]
    fn test_outbound_decreases_balance() {
        let movement = Movement::new(MovementKind::Outbound, 3).unwrap();
        assert_eq!(movement.quantity_delta, 3);
        assert_eq!(movement.resulting_balance(15), Ok(12));
        assert_eq!(
            movement.resulting_balance(2),
            Err(BalanceError::Insufficient {
                available: 2,
                requested: 3
            })
        );
    }

    #[test]
    fn test_balance_may_reach_zero() {
        let movement = Movement::new(MovementKind::Adjustment, -7).unwrap();
        assert_eq!(movement.resulting_balance(7), Ok(0));
        assert!(movement.resulting_balance(6).is_err());
    }

    #[test]
    fn test_apply_overflow_is_rejected() {
        let movement = Movement::new(MovementKind::Inbound, i64::MAX).unwrap();
        assert_eq!(movement.resulting_balance(1), Err(BalanceError::Overflow));
    }

    #[test]
    fn test_min_adjustment_is_rejected() {
        assert!(Movement::new(MovementKind::Adjustment, i64::MIN).is_err());
        assert!(Movement::new(MovementKind::Adjustment, i64::MIN + 1).is_ok());
    }

    #[test]
    fn test_shortfall_on_largest_decrease() {
        let movement = Movement::new(MovementKind::Adjustment, i64::MIN + 1).unwrap();
        assert_eq!(
            movement.resulting_balance(0),
            Err(BalanceError::Insufficient {
                available: 0,
                requested: i64::MAX
            })
        );
    }

    #[test]
    fn test_compensating_movement_cancels_effect() {
        for (kind, delta) in [
            (MovementKind::Inbound, 4),
            (MovementKind::Outbound, 3),
            (MovementKind::Adjustment, -2),
            (MovementKind::Adjustment, 9),
        ] {
            let original = entry(kind, delta);
            let compensation = original.compensating_movement();
            assert_eq!(compensation.signed_effect(), -original.signed_effect());
        }
    }

    #[test]
    fn test_reversing_outbound_is_inbound() {
        let compensation = entry(MovementKind::Outbound, 3).compensating_movement();
        assert_eq!(compensation.kind, MovementKind::Inbound);
        assert_eq!(compensation.quantity_delta, 3);
    }

    #[test]
    fn test_totals_fold() {
        let mut original = entry(MovementKind::Outbound, 3);
        original.voided = true;
        let mut reversal = entry(MovementKind::Inbound, 3);
        reversal.reversal_of_entry_id = Some(original.id);
        let opening = entry(MovementKind::Inbound, 10);

        let totals = LedgerTotals::fold([&opening, &original, &reversal]);
        assert_eq!(totals.ledger_total, 10);
        assert_eq!(totals.live_total, 10);
        assert_eq!(totals.entry_count, 3);
        assert!(totals.matches(10));
        assert!(!totals.matches(7));
    }

    fn kind_strategy() -> impl Strategy<Value = MovementKind> {
        prop_oneof![
            Just(MovementKind::Inbound),
            Just(MovementKind::Outbound),
            Just(MovementKind::Adjustment),
        ]
    }

    proptest! {
        #[test]
        fn prop_reversal_restores_balance(
            kind in kind_strategy(),
            quantity in 1i64..10_000,
            negative in any::<bool>(),
            opening in 0i64..100_000,
        ) {
            let quantity = if kind == MovementKind::Adjustment && negative { -quantity } else { quantity };
            let movement = Movement::new(kind, quantity).unwrap();
            let mut original = entry(kind, movement.quantity_delta);
            original.resulting_balance = opening;

            if let Ok(after) = movement.resulting_balance(opening) {
                let restored = original.compensating_movement().resulting_balance(after);
                prop_assert_eq!(restored, Ok(opening));
            }
        }

        #[test]
        fn prop_balance_never_negative(kind in kind_strategy(), quantity in -10_000i64..10_000, opening in 0i64..10_000) {
            if let Ok(movement) = Movement::new(kind, quantity) {
                match movement.resulting_balance(opening) {
                    Ok(next) => prop_assert!(next >= 0),
                    Err(BalanceError::Insufficient { available, .. }) => prop_assert_eq!(available, opening),
                    Err(BalanceError::Overflow) => prop_assert!(false, "small values cannot overflow"),
                }
            }
        }
    }
}
