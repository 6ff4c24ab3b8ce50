//! Cart rows and status vocabulary.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A shopper's in-progress selection. `total_price` is a cached aggregate
/// of the item totals, overwritten after every mutation.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Cart {
    pub id: Uuid,
    pub guest_user_id: String,
    pub status: String,
    pub total_price: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One product/size selection within a cart. `(cart_id, product_id,
/// size_label)` is unique; re-adding the same triple increments quantity.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CartItem {
    pub id: Uuid,
    pub cart_id: Uuid,
    pub product_id: Uuid,
    pub size_label: String,
    pub quantity: i32,
    pub price_per_unit: Decimal,
    pub total_price: Decimal,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

/// Cart item joined with live catalog display fields. Denormalized for
/// listing only, never persisted on the item.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CartItemView {
    pub id: Uuid,
    pub cart_id: Uuid,
    pub product_id: Uuid,
    pub size_label: String,
    pub quantity: i32,
    pub price_per_unit: Decimal,
    pub total_price: Decimal,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub product_name: String,
    pub product_image: Option<String>,
    pub category_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartStatus {
    Active,
    CheckedOut,
}

impl CartStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CartStatus::Active => "active",
            CartStatus::CheckedOut => "checked_out",
        }
    }
}
