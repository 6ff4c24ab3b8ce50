//! Order rows and the fulfillment status vocabulary.
//!
//! An order is the immutable artifact of a completed checkout; its items
//! are frozen snapshots, so later catalog edits never alter history.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Order {
    pub id: Uuid,
    pub cart_id: Uuid,
    pub guest_user_id: String,
    pub status: String,
    pub payment_method: Option<String>,
    pub delivery_method: Option<String>,
    pub shipping_amount: Decimal,
    pub tax_amount: Decimal,
    pub subtotal_before_promo: Decimal,
    pub subtotal_after_promo: Decimal,
    pub total_price: Decimal,
    pub customer_name: Option<String>,
    pub customer_mobile: Option<String>,
    pub promocode_id: Option<Uuid>,
    pub address: Option<String>,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Frozen snapshot of a cart item at checkout time; product name and price
/// are copied, not referenced live.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub size_label: String,
    pub quantity: i32,
    pub price_per_unit: Decimal,
    pub total_price: Decimal,
    pub notes: String,
}

/// Post-checkout fulfillment state. Any status may follow any other;
/// cancelled and failed are terminal by convention only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Preparing,
    Shipped,
    Ready,
    Delivered,
    Cancelled,
    Failed,
}

impl OrderStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(OrderStatus::Pending),
            "confirmed" => Some(OrderStatus::Confirmed),
            "preparing" => Some(OrderStatus::Preparing),
            "shipped" => Some(OrderStatus::Shipped),
            "ready" => Some(OrderStatus::Ready),
            "delivered" => Some(OrderStatus::Delivered),
            "cancelled" => Some(OrderStatus::Cancelled),
            "failed" => Some(OrderStatus::Failed),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Ready => "ready",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Failed => "failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_full_fulfillment_vocabulary() {
        let all = [
            "pending",
            "confirmed",
            "preparing",
            "shipped",
            "ready",
            "delivered",
            "cancelled",
            "failed",
        ];
        for value in all {
            let status = OrderStatus::parse(value).unwrap();
            assert_eq!(status.as_str(), value);
        }
    }

    #[test]
    fn rejects_statuses_outside_the_vocabulary() {
        assert_eq!(OrderStatus::parse("refunded"), None);
        assert_eq!(OrderStatus::parse("Pending"), None);
        assert_eq!(OrderStatus::parse(""), None);
    }
}
