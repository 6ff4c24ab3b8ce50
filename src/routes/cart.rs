//! Cart lifecycle: item mutations and read projections.
//!
//! Every mutation runs in one transaction with the cart row locked, and
//! finishes by overwriting the cached cart total from the item aggregate.
//! Totals are never incremented in place, so multi-step mutations cannot
//! drift.

use axum::extract::{Path, State};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::cart::{Cart, CartItem, CartItemView, CartStatus};
use crate::domain::pricing;
use crate::error::{Error, Result};
use crate::routes::require;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/cart_items", post(add_item))
        .route("/cart_items/delete", delete(remove_item))
        .route("/cart_items/update", put(update_quantity))
        .route("/cart/user/:guest_user_id", get(get_active_cart))
        .route("/cart/:cart_id/items", get(list_items))
}

#[derive(Debug, Deserialize)]
struct AddItemRequest {
    guest_user_id: Option<String>,
    cart_id: Option<Uuid>,
    product_id: Option<Uuid>,
    size_label: Option<String>,
    quantity: Option<i32>,
    price_per_unit: Option<Decimal>,
    #[serde(default)]
    notes: String,
}

#[derive(Debug, Serialize)]
struct AddItemResponse {
    message: &'static str,
    cart_id: Uuid,
    item: CartItem,
}

/// Add a product/size selection to the shopper's active cart, creating the
/// cart when none exists and merging into an existing line for the same
/// (product, size).
async fn add_item(
    State(state): State<AppState>,
    Json(req): Json<AddItemRequest>,
) -> Result<Json<AddItemResponse>> {
    let guest_user_id = require(
        req.guest_user_id.filter(|g| !g.is_empty()),
        "guest_user_id",
    )?;
    let product_id = require(req.product_id, "product_id")?;
    let size_label = require(req.size_label.filter(|s| !s.is_empty()), "size_label")?;
    let quantity = require(req.quantity, "quantity")?;
    let price_per_unit = require(req.price_per_unit, "price_per_unit")?;
    if quantity <= 0 {
        return Err(Error::Validation("Quantity must be > 0".into()));
    }

    let mut tx = state.db.begin().await?;

    let cart_id = resolve_active_cart(&mut tx, &guest_user_id, req.cart_id).await?;

    let line_total = pricing::line_total(price_per_unit, quantity);
    let existing: Option<(Uuid,)> = sqlx::query_as(
        "SELECT id FROM cart_items WHERE cart_id = $1 AND product_id = $2 AND size_label = $3",
    )
    .bind(cart_id)
    .bind(product_id)
    .bind(&size_label)
    .fetch_optional(&mut *tx)
    .await?;

    let (message, item) = if existing.is_some() {
        let item = sqlx::query_as::<_, CartItem>(
            "UPDATE cart_items SET quantity = quantity + $1, total_price = total_price + $2 \
             WHERE cart_id = $3 AND product_id = $4 AND size_label = $5 RETURNING *",
        )
        .bind(quantity)
        .bind(line_total)
        .bind(cart_id)
        .bind(product_id)
        .bind(&size_label)
        .fetch_one(&mut *tx)
        .await?;
        ("Item updated", item)
    } else {
        let item = sqlx::query_as::<_, CartItem>(
            "INSERT INTO cart_items \
             (id, cart_id, product_id, size_label, quantity, price_per_unit, total_price, notes) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(cart_id)
        .bind(product_id)
        .bind(&size_label)
        .bind(quantity)
        .bind(price_per_unit)
        .bind(line_total)
        .bind(&req.notes)
        .fetch_one(&mut *tx)
        .await?;
        ("Item added", item)
    };

    recompute_cart_total(&mut tx, cart_id).await?;
    tx.commit().await?;

    Ok(Json(AddItemResponse {
        message,
        cart_id,
        item,
    }))
}

async fn get_active_cart(
    State(state): State<AppState>,
    Path(guest_user_id): Path<String>,
) -> Result<Json<Cart>> {
    let cart = sqlx::query_as::<_, Cart>(
        "SELECT * FROM cart WHERE guest_user_id = $1 AND status = $2",
    )
    .bind(&guest_user_id)
    .bind(CartStatus::Active.as_str())
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| Error::NotFound("No active cart".into()))?;
    Ok(Json(cart))
}

#[derive(Debug, Deserialize)]
struct RemoveItemRequest {
    cart_id: Uuid,
    product_id: Uuid,
    size_label: String,
}

#[derive(Debug, Serialize)]
struct RemoveItemResponse {
    message: &'static str,
    #[serde(rename = "promoShouldClear", skip_serializing_if = "Option::is_none")]
    promo_should_clear: Option<bool>,
}

/// Delete a cart item. Idempotent: a missing cart or item still succeeds.
/// Removing the last item deletes the cart itself and signals the caller
/// that any pending promotion for this shopper should be cleared.
async fn remove_item(
    State(state): State<AppState>,
    Json(req): Json<RemoveItemRequest>,
) -> Result<Json<RemoveItemResponse>> {
    let mut tx = state.db.begin().await?;

    let locked: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM cart WHERE id = $1 FOR UPDATE")
            .bind(req.cart_id)
            .fetch_optional(&mut *tx)
            .await?;
    if locked.is_none() {
        return Ok(Json(RemoveItemResponse {
            message: "Item deleted",
            promo_should_clear: None,
        }));
    }

    let (had_items,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM cart_items WHERE cart_id = $1")
            .bind(req.cart_id)
            .fetch_one(&mut *tx)
            .await?;

    sqlx::query(
        "DELETE FROM cart_items WHERE cart_id = $1 AND product_id = $2 AND size_label = $3",
    )
    .bind(req.cart_id)
    .bind(req.product_id)
    .bind(&req.size_label)
    .execute(&mut *tx)
    .await?;

    let (remaining,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM cart_items WHERE cart_id = $1")
            .bind(req.cart_id)
            .fetch_one(&mut *tx)
            .await?;

    if had_items > 0 && remaining == 0 {
        sqlx::query("DELETE FROM cart WHERE id = $1")
            .bind(req.cart_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        return Ok(Json(RemoveItemResponse {
            message: "Item deleted and cart removed",
            promo_should_clear: Some(true),
        }));
    }

    recompute_cart_total(&mut tx, req.cart_id).await?;
    tx.commit().await?;

    Ok(Json(RemoveItemResponse {
        message: "Item deleted",
        promo_should_clear: None,
    }))
}

#[derive(Debug, Deserialize)]
struct UpdateQuantityRequest {
    cart_id: Option<Uuid>,
    product_id: Option<Uuid>,
    size_label: Option<String>,
    quantity: Option<i32>,
}

#[derive(Debug, Serialize)]
struct UpdateQuantityResponse {
    message: &'static str,
    item: CartItem,
}

async fn update_quantity(
    State(state): State<AppState>,
    Json(req): Json<UpdateQuantityRequest>,
) -> Result<Json<UpdateQuantityResponse>> {
    let cart_id = require(req.cart_id, "cart_id")?;
    let product_id = require(req.product_id, "product_id")?;
    let size_label = require(req.size_label.filter(|s| !s.is_empty()), "size_label")?;
    let quantity = require(req.quantity, "quantity")?;
    if quantity <= 0 {
        return Err(Error::Validation("Quantity must be > 0".into()));
    }

    let mut tx = state.db.begin().await?;

    let locked: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM cart WHERE id = $1 FOR UPDATE")
            .bind(cart_id)
            .fetch_optional(&mut *tx)
            .await?;
    if locked.is_none() {
        return Err(Error::NotFound("Cart not found".into()));
    }

    let item = sqlx::query_as::<_, CartItem>(
        "UPDATE cart_items SET quantity = $1, total_price = price_per_unit * $1 \
         WHERE cart_id = $2 AND product_id = $3 AND size_label = $4 RETURNING *",
    )
    .bind(quantity)
    .bind(cart_id)
    .bind(product_id)
    .bind(&size_label)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| Error::NotFound("Cart item not found".into()))?;

    recompute_cart_total(&mut tx, cart_id).await?;
    tx.commit().await?;

    Ok(Json(UpdateQuantityResponse {
        message: "Quantity updated",
        item,
    }))
}

async fn list_items(
    State(state): State<AppState>,
    Path(cart_id): Path<Uuid>,
) -> Result<Json<Vec<CartItemView>>> {
    let items = sqlx::query_as::<_, CartItemView>(
        "SELECT ci.*, p.name AS product_name, p.image_url AS product_image, \
                c.name AS category_name \
         FROM cart_items ci \
         JOIN products p ON ci.product_id = p.id \
         LEFT JOIN categories c ON p.category_id = c.id \
         WHERE ci.cart_id = $1 \
         ORDER BY ci.created_at",
    )
    .bind(cart_id)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(items))
}

/// Resolve the shopper's active cart under a row lock, creating one when
/// none exists. A supplied cart id is honored only while still active.
async fn resolve_active_cart(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    guest_user_id: &str,
    cart_id: Option<Uuid>,
) -> Result<Uuid> {
    if let Some(id) = cart_id {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT status FROM cart WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut **tx)
                .await?;
        if let Some((status,)) = row {
            if status == CartStatus::Active.as_str() {
                return Ok(id);
            }
        }
    }

    let existing: Option<(Uuid,)> = sqlx::query_as(
        "SELECT id FROM cart WHERE guest_user_id = $1 AND status = $2 \
         ORDER BY created_at DESC LIMIT 1 FOR UPDATE",
    )
    .bind(guest_user_id)
    .bind(CartStatus::Active.as_str())
    .fetch_optional(&mut **tx)
    .await?;
    if let Some((id,)) = existing {
        return Ok(id);
    }

    let id = Uuid::now_v7();
    sqlx::query("INSERT INTO cart (id, guest_user_id, status, total_price) VALUES ($1, $2, $3, 0)")
        .bind(id)
        .bind(guest_user_id)
        .bind(CartStatus::Active.as_str())
        .execute(&mut **tx)
        .await?;
    Ok(id)
}

/// Overwrite the cached cart total from the item aggregate.
async fn recompute_cart_total(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    cart_id: Uuid,
) -> Result<()> {
    sqlx::query(
        "UPDATE cart SET total_price = \
             (SELECT COALESCE(SUM(total_price), 0) FROM cart_items WHERE cart_id = $1), \
             updated_at = NOW() \
         WHERE id = $1",
    )
    .bind(cart_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
