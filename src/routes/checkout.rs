//! Checkout: the only writer that turns an active cart into an order.
//!
//! The whole conversion is one transaction with the cart row locked, so a
//! failure at any step leaves no partial order, snapshot, or promo state,
//! and two concurrent attempts on the same cart cannot both succeed.

use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::domain::cart::CartStatus;
use crate::domain::order::{Order, OrderItem, OrderStatus};
use crate::domain::pricing::CheckoutTotals;
use crate::domain::promo::UsageStatus;
use crate::error::{Error, Result};
use crate::routes::require;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/checkout", post(checkout))
        .route("/orders-admain", get(list_orders))
        .route("/orders-admain/:id/details", get(order_details))
        .route("/orders-admain/:id/status", put(update_order_status))
        .route("/users/:guest_user_id/orders", get(list_user_orders))
}

#[derive(Debug, Deserialize)]
struct CheckoutRequest {
    cart_id: Option<Uuid>,
    delivery_method: Option<String>,
    payment_method: Option<String>,
    customer_name: Option<String>,
    customer_mobile: Option<String>,
    #[serde(default)]
    shipping_amount: Decimal,
    #[serde(default)]
    tax_amount: Decimal,
    #[serde(default)]
    notes: String,
    promocode_id: Option<Uuid>,
    address: Option<String>,
}

/// Cart item joined with the live product name, the shape that gets frozen
/// into an order item.
#[derive(Debug, sqlx::FromRow)]
struct CheckoutItem {
    product_id: Uuid,
    product_name: String,
    size_label: String,
    quantity: i32,
    price_per_unit: Decimal,
    total_price: Decimal,
    notes: String,
}

async fn checkout(
    State(state): State<AppState>,
    Json(req): Json<CheckoutRequest>,
) -> Result<Json<Value>> {
    let cart_id = require(req.cart_id, "cart_id")?;

    let mut tx = state.db.begin().await?;

    // "Cart is active" is re-checked under the row lock, at commit scope:
    // a concurrent checkout of the same cart blocks here and then observes
    // checked_out.
    let cart: Option<(String,)> = sqlx::query_as(
        "SELECT guest_user_id FROM cart WHERE id = $1 AND status = $2 FOR UPDATE",
    )
    .bind(cart_id)
    .bind(CartStatus::Active.as_str())
    .fetch_optional(&mut *tx)
    .await?;
    let (guest_user_id,) = cart.ok_or_else(|| {
        Error::NotFound("Cart not found or already checked out".into())
    })?;

    let items = sqlx::query_as::<_, CheckoutItem>(
        "SELECT ci.product_id, p.name AS product_name, ci.size_label, ci.quantity, \
                ci.price_per_unit, ci.total_price, ci.notes \
         FROM cart_items ci \
         JOIN products p ON ci.product_id = p.id \
         WHERE ci.cart_id = $1",
    )
    .bind(cart_id)
    .fetch_all(&mut *tx)
    .await?;
    if items.is_empty() {
        return Err(Error::Validation("Cart is empty".into()));
    }

    let promo_percentage = match req.promocode_id {
        Some(promo_id) => {
            let promo: Option<(Decimal,)> =
                sqlx::query_as("SELECT discount_amount FROM promocode WHERE id = $1")
                    .bind(promo_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            let (percentage,) =
                promo.ok_or_else(|| Error::Validation("Promo code not found".into()))?;

            // The shopper must hold a usage record that is not yet spent.
            let usage: Option<(String,)> = sqlx::query_as(
                "SELECT status FROM user_promocode \
                 WHERE guest_user_id = $1 AND promocode_id = $2 FOR UPDATE",
            )
            .bind(&guest_user_id)
            .bind(promo_id)
            .fetch_optional(&mut *tx)
            .await?;
            match usage {
                Some((status,)) if status == UsageStatus::Pending.as_str() => {}
                _ => {
                    return Err(Error::Conflict(
                        "Promo code is not valid or already used".into(),
                    ));
                }
            }
            Some(percentage)
        }
        None => None,
    };

    // Totals come from the items, never from the cart's cached total.
    let totals = CheckoutTotals::compute(
        items.iter().map(|i| i.total_price),
        promo_percentage,
        req.shipping_amount,
        req.tax_amount,
    );

    let order_id = Uuid::now_v7();
    sqlx::query(
        "INSERT INTO orders \
         (id, cart_id, guest_user_id, status, payment_method, delivery_method, \
          shipping_amount, tax_amount, subtotal_before_promo, subtotal_after_promo, \
          total_price, customer_name, customer_mobile, promocode_id, address, notes) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
    )
    .bind(order_id)
    .bind(cart_id)
    .bind(&guest_user_id)
    .bind(OrderStatus::Pending.as_str())
    .bind(&req.payment_method)
    .bind(&req.delivery_method)
    .bind(req.shipping_amount)
    .bind(req.tax_amount)
    .bind(totals.subtotal_before_promo)
    .bind(totals.subtotal_after_promo)
    .bind(totals.total_price)
    .bind(&req.customer_name)
    .bind(&req.customer_mobile)
    .bind(req.promocode_id)
    .bind(&req.address)
    .bind(&req.notes)
    .execute(&mut *tx)
    .await?;

    for item in &items {
        sqlx::query(
            "INSERT INTO order_items \
             (id, order_id, product_id, product_name, size_label, quantity, \
              price_per_unit, total_price, notes) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(Uuid::now_v7())
        .bind(order_id)
        .bind(item.product_id)
        .bind(&item.product_name)
        .bind(&item.size_label)
        .bind(item.quantity)
        .bind(item.price_per_unit)
        .bind(item.total_price)
        .bind(&item.notes)
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
        .bind(cart_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE cart SET status = $1, updated_at = NOW() WHERE id = $2")
        .bind(CartStatus::CheckedOut.as_str())
        .bind(cart_id)
        .execute(&mut *tx)
        .await?;

    if let Some(promo_id) = req.promocode_id {
        sqlx::query(
            "UPDATE user_promocode SET status = $1, used_at = NOW() \
             WHERE guest_user_id = $2 AND promocode_id = $3",
        )
        .bind(UsageStatus::Used.as_str())
        .bind(&guest_user_id)
        .bind(promo_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    tracing::info!(%order_id, %cart_id, total = %totals.total_price, "checkout complete");
    Ok(Json(json!({ "message": "Checkout complete", "order_id": order_id })))
}

#[derive(Debug, Deserialize)]
struct UpdateOrderStatusRequest {
    status: String,
}

async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateOrderStatusRequest>,
) -> Result<Json<Order>> {
    let status = OrderStatus::parse(&req.status)
        .ok_or_else(|| Error::Validation("Invalid status value".into()))?;

    let order = sqlx::query_as::<_, Order>(
        "UPDATE orders SET status = $1, updated_at = NOW() WHERE id = $2 RETURNING *",
    )
    .bind(status.as_str())
    .bind(id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| Error::NotFound("Order not found".into()))?;

    Ok(Json(order))
}

async fn list_orders(State(state): State<AppState>) -> Result<Json<Vec<Order>>> {
    let orders =
        sqlx::query_as::<_, Order>("SELECT * FROM orders ORDER BY created_at DESC")
            .fetch_all(&state.db)
            .await?;
    Ok(Json(orders))
}

#[derive(Debug, Serialize)]
struct OrderDetails {
    #[serde(flatten)]
    order: Order,
    items: Vec<OrderItem>,
}

/// Order plus its frozen item snapshots. No catalog join: the snapshot is
/// the source of truth for historical orders.
async fn order_details(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderDetails>> {
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| Error::NotFound("Order not found".into()))?;

    let items = sqlx::query_as::<_, OrderItem>(
        "SELECT * FROM order_items WHERE order_id = $1",
    )
    .bind(id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(OrderDetails { order, items }))
}

async fn list_user_orders(
    State(state): State<AppState>,
    Path(guest_user_id): Path<String>,
) -> Result<Json<Vec<Order>>> {
    let orders = sqlx::query_as::<_, Order>(
        "SELECT * FROM orders WHERE guest_user_id = $1 ORDER BY created_at DESC",
    )
    .bind(&guest_user_id)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(orders))
}
