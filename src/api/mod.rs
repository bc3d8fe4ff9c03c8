//! HTTP surface: JSON over `/api/...`.

pub mod accounts;
pub mod export;
pub mod fx_rates;
pub mod health;
pub mod positions;
pub mod securities;
pub mod transactions;

use crate::db::Repository;
use crate::fx::FxOracle;
use crate::orchestration::LedgerService;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub ledger: Arc<LedgerService>,
    pub oracle: Arc<dyn FxOracle>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health::health))
        .route(
            "/api/securities",
            get(securities::list_securities).post(securities::create_security),
        )
        .route(
            "/api/securities/:id",
            get(securities::get_security).delete(securities::delete_security),
        )
        .route(
            "/api/accounts",
            get(accounts::list_accounts).post(accounts::create_account),
        )
        .route(
            "/api/accounts/:id",
            get(accounts::get_account).delete(accounts::delete_account),
        )
        .route(
            "/api/transactions",
            get(transactions::list_transactions).post(transactions::create_transaction),
        )
        .route(
            "/api/transactions/:id",
            get(transactions::get_transaction)
                .put(transactions::update_transaction)
                .delete(transactions::delete_transaction),
        )
        .route("/api/positions", get(positions::list_positions))
        .route("/api/fx-rates", post(fx_rates::create_fx_rate))
        .route("/api/fx-rates/rate", get(fx_rates::get_rate))
        .route("/api/export/csv", get(export::export_csv))
        .route("/api/export/json", get(export::export_json))
        .with_state(state)
}
