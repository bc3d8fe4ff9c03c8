//! End-to-end coverage of the ±30-day superficial-loss rule.

use acbtrack::api;
use acbtrack::db::init_db;
use acbtrack::domain::{Currency, Decimal};
use acbtrack::fx::{FixedFxOracle, FxOracle};
use acbtrack::{LedgerService, Repository};
use axum::http::StatusCode;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::util::ServiceExt;

struct TestApp {
    app: axum::Router,
    _temp: TempDir,
}

async fn setup_test_app() -> TestApp {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(Repository::new(pool));
    let oracle: Arc<dyn FxOracle> = Arc::new(FixedFxOracle::new().with_rate(
        &Currency::usd(),
        &Currency::cad(),
        Decimal::from_str_canonical("1.35").unwrap(),
    ));
    let ledger = Arc::new(LedgerService::new(
        repo.clone(),
        oracle.clone(),
        Duration::from_millis(1000),
    ));
    let app = api::create_router(api::AppState {
        repo,
        ledger,
        oracle,
    });
    TestApp {
        app,
        _temp: temp_dir,
    }
}

async fn request(
    app: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = axum::http::Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            axum::body::Body::from(json.to_string())
        }
        None => axum::body::Body::empty(),
    };
    let resp = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn setup_ledger(app: &axum::Router, account_kind: &str) -> (i64, i64) {
    let (_, security) = request(
        app,
        "POST",
        "/api/securities",
        Some(json!({"symbol": "TEST", "name": "Test Corp", "currency": "CAD", "type": "stock"})),
    )
    .await;
    let (_, account) = request(
        app,
        "POST",
        "/api/accounts",
        Some(json!({"name": "Main", "type": account_kind})),
    )
    .await;
    (
        security["id"].as_i64().unwrap(),
        account["id"].as_i64().unwrap(),
    )
}

async fn post_transaction(app: &axum::Router, body: Value) -> Value {
    let (status, value) = request(app, "POST", "/api/transactions", Some(body)).await;
    assert_eq!(status, StatusCode::CREATED, "{}", value);
    value
}

async fn get_transaction(app: &axum::Router, id: i64) -> Value {
    let (status, value) = request(app, "GET", &format!("/api/transactions/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    value
}

fn flags(value: &Value) -> Vec<String> {
    value["flags"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f.as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_full_repurchase_denies_loss_and_bumps_acb() {
    let test_app = setup_test_app().await;
    let (security, account) = setup_ledger(&test_app.app, "non-registered").await;

    post_transaction(
        &test_app.app,
        json!({
            "date": "2024-01-15", "type": "buy", "securityId": security,
            "accountId": account, "quantity": 100, "price": 50, "fees": 0
        }),
    )
    .await;
    let sell = post_transaction(
        &test_app.app,
        json!({
            "date": "2024-02-15", "type": "sell", "securityId": security,
            "accountId": account, "quantity": 100, "price": 40, "fees": 0
        }),
    )
    .await;
    assert_eq!(sell["capitalGain"].as_f64().unwrap(), -1000.0);

    let rebuy = post_transaction(
        &test_app.app,
        json!({
            "date": "2024-02-20", "type": "buy", "securityId": security,
            "accountId": account, "quantity": 100, "price": 38, "fees": 0
        }),
    )
    .await;
    // 3800 purchase cost plus the 1000 denied loss.
    assert_eq!(rebuy["acbAfter"].as_f64().unwrap(), 4800.0);

    let sell_after = get_transaction(&test_app.app, sell["id"].as_i64().unwrap()).await;
    assert!(flags(&sell_after).contains(&"superficial_loss".to_string()));
    let review = &sell_after["calculationDetails"]["superficialLoss"];
    assert_eq!(review["isSuperficial"], true);
    assert_eq!(review["lossAmount"].as_f64().unwrap(), 1000.0);
}

#[tokio::test]
async fn test_partial_repurchase_denies_proportionally() {
    let test_app = setup_test_app().await;
    let (security, account) = setup_ledger(&test_app.app, "non-registered").await;

    post_transaction(
        &test_app.app,
        json!({
            "date": "2024-01-15", "type": "buy", "securityId": security,
            "accountId": account, "quantity": 100, "price": 50, "fees": 0
        }),
    )
    .await;
    let sell = post_transaction(
        &test_app.app,
        json!({
            "date": "2024-02-15", "type": "sell", "securityId": security,
            "accountId": account, "quantity": 100, "price": 40, "fees": 0
        }),
    )
    .await;

    let rebuy = post_transaction(
        &test_app.app,
        json!({
            "date": "2024-02-20", "type": "buy", "securityId": security,
            "accountId": account, "quantity": 50, "price": 38, "fees": 0
        }),
    )
    .await;
    // Half the shares repurchased: 1900 cost plus 500 of the 1000 loss.
    assert_eq!(rebuy["acbAfter"].as_f64().unwrap(), 2400.0);

    let sell_after = get_transaction(&test_app.app, sell["id"].as_i64().unwrap()).await;
    let review = &sell_after["calculationDetails"]["superficialLoss"];
    assert_eq!(review["lossAmount"].as_f64().unwrap(), 500.0);
}

#[tokio::test]
async fn test_denial_distributes_across_multiple_repurchases() {
    let test_app = setup_test_app().await;
    let (security, account) = setup_ledger(&test_app.app, "non-registered").await;

    post_transaction(
        &test_app.app,
        json!({
            "date": "2024-01-15", "type": "buy", "securityId": security,
            "accountId": account, "quantity": 100, "price": 50, "fees": 0
        }),
    )
    .await;
    post_transaction(
        &test_app.app,
        json!({
            "date": "2024-02-15", "type": "sell", "securityId": security,
            "accountId": account, "quantity": 100, "price": 40, "fees": 0
        }),
    )
    .await;
    let first = post_transaction(
        &test_app.app,
        json!({
            "date": "2024-02-20", "type": "buy", "securityId": security,
            "accountId": account, "quantity": 50, "price": 38, "fees": 0
        }),
    )
    .await;
    let second = post_transaction(
        &test_app.app,
        json!({
            "date": "2024-02-25", "type": "buy", "securityId": security,
            "accountId": account, "quantity": 50, "price": 39, "fees": 0
        }),
    )
    .await;

    // Full 1000 denied, prorated 500/500 over the two repurchases.
    let first_after = get_transaction(&test_app.app, first["id"].as_i64().unwrap()).await;
    assert_eq!(first_after["acbAfter"].as_f64().unwrap(), 2400.0);
    assert_eq!(second["acbAfter"].as_f64().unwrap(), 4850.0);

    let (_, positions) = request(&test_app.app, "GET", "/api/positions", None).await;
    let position = positions
        .as_array()
        .unwrap()
        .iter()
        .find(|p| p["securityId"].as_i64().unwrap() == security)
        .unwrap()
        .clone();
    assert_eq!(position["acb"].as_f64().unwrap(), 4850.0);
    assert_eq!(position["shares"].as_f64().unwrap(), 100.0);
}

#[tokio::test]
async fn test_registered_account_losses_are_never_denied() {
    let test_app = setup_test_app().await;
    let (security, account) = setup_ledger(&test_app.app, "TFSA").await;

    post_transaction(
        &test_app.app,
        json!({
            "date": "2024-01-15", "type": "buy", "securityId": security,
            "accountId": account, "quantity": 100, "price": 50, "fees": 0
        }),
    )
    .await;
    let sell = post_transaction(
        &test_app.app,
        json!({
            "date": "2024-02-15", "type": "sell", "securityId": security,
            "accountId": account, "quantity": 100, "price": 40, "fees": 0
        }),
    )
    .await;
    // Registered accounts report no capital gain at all.
    assert!(sell.get("capitalGain").is_none());

    let rebuy = post_transaction(
        &test_app.app,
        json!({
            "date": "2024-02-20", "type": "buy", "securityId": security,
            "accountId": account, "quantity": 100, "price": 38, "fees": 0
        }),
    )
    .await;
    assert_eq!(rebuy["acbAfter"].as_f64().unwrap(), 3800.0);

    let sell_after = get_transaction(&test_app.app, sell["id"].as_i64().unwrap()).await;
    assert!(flags(&sell_after).is_empty());
}

#[tokio::test]
async fn test_no_repurchase_keeps_loss_claimable() {
    let test_app = setup_test_app().await;
    let (security, account) = setup_ledger(&test_app.app, "non-registered").await;

    post_transaction(
        &test_app.app,
        json!({
            "date": "2024-01-15", "type": "buy", "securityId": security,
            "accountId": account, "quantity": 100, "price": 50, "fees": 0
        }),
    )
    .await;
    let sell = post_transaction(
        &test_app.app,
        json!({
            "date": "2024-02-15", "type": "sell", "securityId": security,
            "accountId": account, "quantity": 100, "price": 40, "fees": 0
        }),
    )
    .await;
    // A repurchase well outside the window does not trigger denial.
    post_transaction(
        &test_app.app,
        json!({
            "date": "2024-04-20", "type": "buy", "securityId": security,
            "accountId": account, "quantity": 100, "price": 38, "fees": 0
        }),
    )
    .await;

    let sell_after = get_transaction(&test_app.app, sell["id"].as_i64().unwrap()).await;
    assert!(flags(&sell_after).is_empty());
    assert_eq!(sell_after["capitalGain"].as_f64().unwrap(), -1000.0);
    let review = &sell_after["calculationDetails"]["superficialLoss"];
    assert_eq!(review["isSuperficial"], false);
}

#[tokio::test]
async fn test_editing_repurchase_date_into_window_reflags_the_sell() {
    let test_app = setup_test_app().await;
    let (security, account) = setup_ledger(&test_app.app, "non-registered").await;

    post_transaction(
        &test_app.app,
        json!({
            "date": "2024-01-15", "type": "buy", "securityId": security,
            "accountId": account, "quantity": 100, "price": 50, "fees": 0
        }),
    )
    .await;
    let sell = post_transaction(
        &test_app.app,
        json!({
            "date": "2024-02-15", "type": "sell", "securityId": security,
            "accountId": account, "quantity": 100, "price": 40, "fees": 0
        }),
    )
    .await;
    let rebuy = post_transaction(
        &test_app.app,
        json!({
            "date": "2024-04-20", "type": "buy", "securityId": security,
            "accountId": account, "quantity": 100, "price": 38, "fees": 0
        }),
    )
    .await;
    assert_eq!(rebuy["acbAfter"].as_f64().unwrap(), 3800.0);

    let (status, moved) = request(
        &test_app.app,
        "PUT",
        &format!("/api/transactions/{}", rebuy["id"].as_i64().unwrap()),
        Some(json!({"date": "2024-02-20"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", moved);
    assert_eq!(moved["acbAfter"].as_f64().unwrap(), 4800.0);

    let sell_after = get_transaction(&test_app.app, sell["id"].as_i64().unwrap()).await;
    assert!(flags(&sell_after).contains(&"superficial_loss".to_string()));
}

#[tokio::test]
async fn test_drip_counts_as_reacquisition() {
    let test_app = setup_test_app().await;
    let (security, account) = setup_ledger(&test_app.app, "non-registered").await;

    post_transaction(
        &test_app.app,
        json!({
            "date": "2024-01-15", "type": "buy", "securityId": security,
            "accountId": account, "quantity": 100, "price": 50, "fees": 0
        }),
    )
    .await;
    let sell = post_transaction(
        &test_app.app,
        json!({
            "date": "2024-02-15", "type": "sell", "securityId": security,
            "accountId": account, "quantity": 100, "price": 40, "fees": 0
        }),
    )
    .await;
    let drip = post_transaction(
        &test_app.app,
        json!({
            "date": "2024-02-20", "type": "drip", "securityId": security,
            "accountId": account, "quantity": 10, "price": 4, "fees": 0
        }),
    )
    .await;

    // 10 of 100 shares reacquired: 100 of the 1000 loss denied, landing on
    // the DRIP (which itself adds no ACB on a zero-share base).
    assert_eq!(drip["sharesAfter"].as_f64().unwrap(), 10.0);
    assert_eq!(drip["acbAfter"].as_f64().unwrap(), 100.0);

    let sell_after = get_transaction(&test_app.app, sell["id"].as_i64().unwrap()).await;
    assert!(flags(&sell_after).contains(&"superficial_loss".to_string()));
    let review = &sell_after["calculationDetails"]["superficialLoss"];
    assert_eq!(review["lossAmount"].as_f64().unwrap(), 100.0);
}

#[tokio::test]
async fn test_repurchase_in_another_account_still_denies() {
    let test_app = setup_test_app().await;
    let (security, account) = setup_ledger(&test_app.app, "non-registered").await;
    let (_, second_account) = request(
        &test_app.app,
        "POST",
        "/api/accounts",
        Some(json!({"name": "Second", "type": "non-registered"})),
    )
    .await;
    let second_account = second_account["id"].as_i64().unwrap();

    post_transaction(
        &test_app.app,
        json!({
            "date": "2024-01-15", "type": "buy", "securityId": security,
            "accountId": account, "quantity": 100, "price": 50, "fees": 0
        }),
    )
    .await;
    let sell = post_transaction(
        &test_app.app,
        json!({
            "date": "2024-02-15", "type": "sell", "securityId": security,
            "accountId": account, "quantity": 100, "price": 40, "fees": 0
        }),
    )
    .await;
    // Reacquired in a different account: still held, still denied.
    post_transaction(
        &test_app.app,
        json!({
            "date": "2024-02-20", "type": "buy", "securityId": security,
            "accountId": second_account, "quantity": 100, "price": 38, "fees": 0
        }),
    )
    .await;

    let sell_after = get_transaction(&test_app.app, sell["id"].as_i64().unwrap()).await;
    assert!(flags(&sell_after).contains(&"superficial_loss".to_string()));
    let review = &sell_after["calculationDetails"]["superficialLoss"];
    assert_eq!(review["isSuperficial"], true);
    assert!(review["adjustmentRequired"]
        .as_str()
        .unwrap()
        .contains("outside this account"));
}

#[tokio::test]
async fn test_denied_then_final_sale_recovers_loss_through_acb() {
    let test_app = setup_test_app().await;
    let (security, account) = setup_ledger(&test_app.app, "non-registered").await;

    post_transaction(
        &test_app.app,
        json!({
            "date": "2024-01-15", "type": "buy", "securityId": security,
            "accountId": account, "quantity": 100, "price": 50, "fees": 0
        }),
    )
    .await;
    post_transaction(
        &test_app.app,
        json!({
            "date": "2024-02-15", "type": "sell", "securityId": security,
            "accountId": account, "quantity": 100, "price": 40, "fees": 0
        }),
    )
    .await;
    post_transaction(
        &test_app.app,
        json!({
            "date": "2024-02-20", "type": "buy", "securityId": security,
            "accountId": account, "quantity": 100, "price": 38, "fees": 0
        }),
    )
    .await;
    let final_sell = post_transaction(
        &test_app.app,
        json!({
            "date": "2024-05-15", "type": "sell", "securityId": security,
            "accountId": account, "quantity": 100, "price": 50, "fees": 0
        }),
    )
    .await;

    // Proceeds 5000 against the bumped ACB of 4800.
    assert_eq!(final_sell["capitalGain"].as_f64().unwrap(), 200.0);
    assert!(flags(&final_sell).is_empty());
}
