//! Shared handler state. The pool is the only cross-request state; all
//! synchronization happens in the store.

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
}
