//! Promotion codes: admin definitions and per-shopper application.
//!
//! Applying a code is a preview: it records a pending usage for the
//! shopper and returns the discounted numbers, but never touches the
//! cart's stored total. Only checkout advances pending → used.

use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;
use validator::Validate;

use crate::domain::promo::{self, PromoCode, PromoStatus, PromoUsage, UsageStatus};
use crate::domain::pricing;
use crate::error::{Error, Result};
use crate::routes::require;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/promocode", post(create_code))
        .route("/promocodes", get(list_codes))
        .route("/promocode/:id", put(update_code).delete(delete_code))
        .route("/promocode/:id/status", put(set_status))
        .route("/cart/:cart_id/apply-promocode", post(apply_code))
        .route("/cart/:cart_id/remove-promocode", post(remove_pending))
}

fn validate_percentage(value: &Decimal) -> std::result::Result<(), validator::ValidationError> {
    if *value < Decimal::ZERO || *value > Decimal::from(100) {
        return Err(validator::ValidationError::new(
            "discount_amount must be a percentage between 0 and 100",
        ));
    }
    Ok(())
}

#[derive(Debug, Deserialize, Validate)]
struct CreatePromoRequest {
    #[validate(length(min = 1, message = "code must not be empty"))]
    code: String,
    #[validate(custom = "validate_percentage")]
    discount_amount: Decimal,
    end_date: Option<DateTime<Utc>>,
}

async fn create_code(
    State(state): State<AppState>,
    Json(req): Json<CreatePromoRequest>,
) -> Result<Json<Value>> {
    req.validate()
        .map_err(|e| Error::Validation(e.to_string()))?;

    let promo = sqlx::query_as::<_, PromoCode>(
        "INSERT INTO promocode (id, code, discount_amount, status, end_date) \
         VALUES ($1, $2, $3, $4, $5) RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(req.code.trim())
    .bind(req.discount_amount)
    .bind(PromoStatus::Active.as_str())
    .bind(req.end_date)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(json!({ "message": "Promo code created", "promo": promo })))
}

/// List all codes, lazily expiring overdue active ones in the same
/// transaction as the read.
async fn list_codes(State(state): State<AppState>) -> Result<Json<Vec<PromoCode>>> {
    let mut tx = state.db.begin().await?;

    sqlx::query(
        "UPDATE promocode SET status = $1 \
         WHERE status = $2 AND end_date IS NOT NULL AND end_date < NOW()",
    )
    .bind(PromoStatus::Expired.as_str())
    .bind(PromoStatus::Active.as_str())
    .execute(&mut *tx)
    .await?;

    let promos =
        sqlx::query_as::<_, PromoCode>("SELECT * FROM promocode ORDER BY created_at DESC")
            .fetch_all(&mut *tx)
            .await?;

    tx.commit().await?;
    Ok(Json(promos))
}

#[derive(Debug, Deserialize)]
struct ApplyPromoRequest {
    promo_code: Option<String>,
    guest_user_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ApplyPromoResponse {
    message: &'static str,
    discount_amount: Decimal,
    discount_percentage: Decimal,
    promocode_id: Uuid,
    new_total: Decimal,
}

/// Preview-apply a code against a cart: validates the code, records the
/// shopper's single pending usage, and returns the discounted numbers.
async fn apply_code(
    State(state): State<AppState>,
    Path(cart_id): Path<Uuid>,
    Json(req): Json<ApplyPromoRequest>,
) -> Result<Json<ApplyPromoResponse>> {
    let code = require(
        req.promo_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty()),
        "promo_code",
    )?;
    let guest_user_id = require(
        req.guest_user_id.filter(|g| !g.is_empty()),
        "guest_user_id",
    )?;

    let mut tx = state.db.begin().await?;

    let promo = sqlx::query_as::<_, PromoCode>(
        "SELECT * FROM promocode WHERE code = $1 FOR UPDATE",
    )
    .bind(code)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| Error::NotFound("Promo code not found".into()))?;

    let stored = promo.current_status();
    let effective = promo::effective_status(stored, promo.end_date, Utc::now());
    if effective == PromoStatus::Expired && stored == PromoStatus::Active {
        sqlx::query("UPDATE promocode SET status = $1 WHERE id = $2")
            .bind(PromoStatus::Expired.as_str())
            .bind(promo.id)
            .execute(&mut *tx)
            .await?;
    }
    match effective {
        PromoStatus::Active => {}
        PromoStatus::Inactive => {
            return Err(Error::Validation("Promo code is inactive".into()));
        }
        PromoStatus::Expired => {
            // Keep the lazily persisted expiry transition before failing.
            tx.commit().await?;
            return Err(Error::Validation("Promo code is expired".into()));
        }
    }

    let used: Option<(Uuid,)> = sqlx::query_as(
        "SELECT id FROM user_promocode \
         WHERE guest_user_id = $1 AND promocode_id = $2 AND status = $3",
    )
    .bind(&guest_user_id)
    .bind(promo.id)
    .bind(UsageStatus::Used.as_str())
    .fetch_optional(&mut *tx)
    .await?;
    if used.is_some() {
        return Err(Error::Conflict(
            "You have already used this promo code".into(),
        ));
    }

    // A shopper holds at most one pending promotion at a time.
    sqlx::query("DELETE FROM user_promocode WHERE guest_user_id = $1 AND status = $2")
        .bind(&guest_user_id)
        .bind(UsageStatus::Pending.as_str())
        .execute(&mut *tx)
        .await?;

    let usage = sqlx::query_as::<_, PromoUsage>(
        "INSERT INTO user_promocode (id, guest_user_id, promocode_id, status) \
         VALUES ($1, $2, $3, $4) \
         ON CONFLICT (guest_user_id, promocode_id) \
         DO UPDATE SET status = $4, used_at = NULL \
         RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(&guest_user_id)
    .bind(promo.id)
    .bind(UsageStatus::Pending.as_str())
    .fetch_one(&mut *tx)
    .await?;
    tracing::debug!(usage_id = %usage.id, code = %promo.code, "promo recorded as pending");

    let subtotal: (Decimal,) = sqlx::query_as("SELECT total_price FROM cart WHERE id = $1")
        .bind(cart_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Error::NotFound("Cart not found".into()))?;

    let (discount_amount, new_total) =
        pricing::apply_discount(subtotal.0, promo.discount_amount);

    tx.commit().await?;

    Ok(Json(ApplyPromoResponse {
        message: "Promo code applied (pending)",
        discount_amount,
        discount_percentage: promo.discount_amount,
        promocode_id: promo.id,
        new_total,
    }))
}

#[derive(Debug, Deserialize)]
struct RemovePromoRequest {
    guest_user_id: Option<String>,
}

/// Drop the shopper's pending usage record. Idempotent.
async fn remove_pending(
    State(state): State<AppState>,
    Path(_cart_id): Path<Uuid>,
    Json(req): Json<RemovePromoRequest>,
) -> Result<Json<Value>> {
    let guest_user_id = require(req.guest_user_id, "guest_user_id")?;

    sqlx::query("DELETE FROM user_promocode WHERE guest_user_id = $1 AND status = $2")
        .bind(&guest_user_id)
        .bind(UsageStatus::Pending.as_str())
        .execute(&state.db)
        .await?;

    Ok(Json(json!({ "message": "Promo code removed" })))
}

#[derive(Debug, Deserialize)]
struct SetStatusRequest {
    status: String,
}

async fn set_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SetStatusRequest>,
) -> Result<Json<Value>> {
    let status = PromoStatus::parse(&req.status)
        .ok_or_else(|| Error::Validation("Invalid status value".into()))?;

    let promo = sqlx::query_as::<_, PromoCode>(
        "UPDATE promocode SET status = $1 WHERE id = $2 RETURNING *",
    )
    .bind(status.as_str())
    .bind(id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| Error::NotFound("Promo code not found".into()))?;

    Ok(Json(json!({
        "message": format!("Promo code status updated to '{status}'"),
        "promo": promo,
    })))
}

#[derive(Debug, Deserialize, Validate)]
struct UpdatePromoRequest {
    end_date: Option<DateTime<Utc>>,
    status: Option<String>,
    #[validate(custom = "validate_percentage")]
    discount_amount: Option<Decimal>,
}

/// Patch a code's end date, status, or percentage. An expired code whose
/// new end date lies in the future is reactivated.
async fn update_code(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdatePromoRequest>,
) -> Result<Json<Value>> {
    req.validate()
        .map_err(|e| Error::Validation(e.to_string()))?;
    let requested = match req.status.as_deref() {
        Some(value) => Some(
            PromoStatus::parse(value)
                .ok_or_else(|| Error::Validation("Invalid status value".into()))?,
        ),
        None => None,
    };

    let mut tx = state.db.begin().await?;

    let current = sqlx::query_as::<_, PromoCode>(
        "SELECT * FROM promocode WHERE id = $1 FOR UPDATE",
    )
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| Error::NotFound("Promo code not found".into()))?;

    let end_date = req.end_date.or(current.end_date);
    let discount_amount = req.discount_amount.unwrap_or(current.discount_amount);
    let status = if promo::reactivates(current.current_status(), end_date, Utc::now()) {
        PromoStatus::Active
    } else {
        requested.unwrap_or_else(|| current.current_status())
    };

    let promo = sqlx::query_as::<_, PromoCode>(
        "UPDATE promocode SET end_date = $1, status = $2, discount_amount = $3 \
         WHERE id = $4 RETURNING *",
    )
    .bind(end_date)
    .bind(status.as_str())
    .bind(discount_amount)
    .bind(id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(Json(json!({ "message": "Promo updated successfully", "promo": promo })))
}

async fn delete_code(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>> {
    let promo = sqlx::query_as::<_, PromoCode>(
        "DELETE FROM promocode WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| Error::NotFound("Promo code not found".into()))?;

    Ok(Json(json!({ "message": "Promo code deleted successfully", "promo": promo })))
}
