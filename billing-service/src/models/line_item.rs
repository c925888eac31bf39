//! Invoice line item (ligne de facture).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One billable row on an invoice. `total` is derived and stored; it is
/// recomputed from `unit_price * quantity` on every write and never taken
/// from caller input.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LineItem {
    pub line_item_id: Uuid,
    pub invoice_id: Uuid,
    pub designation: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub total: Decimal,
    pub position: i32,
    pub created_utc: DateTime<Utc>,
}

/// Input for creating a line item. There is deliberately no `total` field.
#[derive(Debug, Clone)]
pub struct CreateLineItem {
    pub designation: String,
    pub unit_price: Decimal,
    pub quantity: i32,
}

/// Derived line total.
pub fn line_total(unit_price: Decimal, quantity: i32) -> Decimal {
    unit_price * Decimal::from(quantity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn total_is_price_times_quantity() {
        assert_eq!(line_total(dec!(500.00), 1), dec!(500.00));
        assert_eq!(line_total(dec!(12.50), 4), dec!(50.00));
    }

    #[test]
    fn zero_quantity_yields_zero_total() {
        assert_eq!(line_total(dec!(99.99), 0), dec!(0));
    }
}
