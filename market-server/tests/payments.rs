// market-server/tests/payments.rs
// Webhook reconciliation: approval, replays, ordering, refunds, chargebacks

mod common;

use common::*;
use market_server::gateway::signature;
use market_server::orders::CreateOrderRequest;
use market_server::webhook::{Handled, WebhookError};
use shared::order::{OrderStatus, PaymentStatus, SplitStatus};
use shared::util::now_millis;
use shared::wallet::{Transaction, TransactionStatus, TransactionType, Wallet};
use std::collections::HashMap;

fn wallet(h: &Harness) -> Wallet {
    h.store().get::<Wallet>(TENANT).unwrap().unwrap()
}

#[tokio::test]
async fn test_approval_confirms_order_and_escrows_seller_amount() {
    let h = Harness::new();
    h.seed_seller();
    h.seed_product("p1", "100.00", 5);

    let order = h.paid_order(&buyer(), "p1", 1).await;

    assert_eq!(order.status, OrderStatus::Confirmed);
    assert_eq!(order.payment_status, PaymentStatus::Paid);
    assert_eq!(order.payment_split.split_status, SplitStatus::Held);
    assert!(order.paid_at.is_some());
    assert!(order.delivery_code_id.is_some());

    let balance = wallet(&h).balance;
    assert_eq!(balance.pending, d("95.00"));
    assert_eq!(balance.available, d("0"));
    assert!(balance.is_consistent());

    let sale = h
        .store()
        .get::<Transaction>(&format!("sale-{}", order.id))
        .unwrap()
        .unwrap();
    assert_eq!(sale.kind, TransactionType::Sale);
    assert_eq!(sale.status, TransactionStatus::Pending);
    assert_eq!(sale.net, d("95.00"));
    assert_eq!(sale.fee, d("5.00"));
}

#[tokio::test]
async fn test_replayed_delivery_is_acknowledged_without_effect() {
    let h = Harness::new();
    h.seed_seller();
    h.seed_product("p1", "100.00", 5);
    let order = h.paid_order(&buyer(), "p1", 1).await;
    let payment_id = order.gateway_payment_id().unwrap().to_string();

    let replay = h
        .payment_webhook(&payment_id, &format!("req-approve-{payment_id}"))
        .await
        .unwrap();
    assert_eq!(replay, Handled::Duplicate);

    // Same status under a new delivery id is processed but changes nothing
    let again = h.payment_webhook(&payment_id, "req-other").await.unwrap();
    assert_eq!(again, Handled::Processed);

    assert_eq!(wallet(&h).balance.pending, d("95.00"));
    assert_eq!(h.order(&order.id).status_history.len(), order.status_history.len());
}

#[tokio::test]
async fn test_late_pending_never_downgrades_paid() {
    let h = Harness::new();
    h.seed_seller();
    h.seed_product("p1", "100.00", 5);
    let order = h.paid_order(&buyer(), "p1", 1).await;
    let payment_id = order.gateway_payment_id().unwrap().to_string();

    h.gateway.set_status(&payment_id, "in_process");
    h.payment_webhook(&payment_id, "req-late-pending").await.unwrap();
    h.gateway.set_status(&payment_id, "rejected");
    h.payment_webhook(&payment_id, "req-late-rejected").await.unwrap();

    let current = h.order(&order.id);
    assert_eq!(current.payment_status, PaymentStatus::Paid);
    assert_eq!(current.status, OrderStatus::Confirmed);
    assert_eq!(wallet(&h).balance.pending, d("95.00"));
}

#[tokio::test]
async fn test_rejected_pix_marks_failed_and_keeps_reservation() {
    let h = Harness::new();
    h.seed_seller();
    h.seed_product("p1", "40.00", 5);
    let order = h.checkout(&buyer(), "p1", 1).await;
    let payment_id = order.gateway_payment_id().unwrap().to_string();

    h.gateway.set_status(&payment_id, "rejected");
    h.payment_webhook(&payment_id, "req-rejected").await.unwrap();

    let current = h.order(&order.id);
    assert_eq!(current.payment_status, PaymentStatus::Failed);
    assert_eq!(current.payment_split.split_status, SplitStatus::Failed);
    assert_eq!(current.gateway_status.as_deref(), Some("rejected"));
    assert_eq!(current.status, OrderStatus::Pending);
    assert_eq!(h.product("p1").quantity, 4);
    assert!(h.store().get::<Wallet>(TENANT).unwrap().is_none());
}

fn card_request() -> CreateOrderRequest {
    CreateOrderRequest {
        payment_method: "credit_card".into(),
        card_token: Some("card-tok-1".into()),
        installments: Some(1),
        ..pix_request(None)
    }
}

#[tokio::test]
async fn test_card_rejected_at_checkout_returns_stock() {
    let h = Harness::new();
    h.seed_seller();
    h.seed_product("p1", "40.00", 3);
    h.gateway.create_with_status("rejected");
    let buyer = buyer();
    h.add_to_cart(&buyer, "p1", 2);

    let order = h
        .state
        .orders
        .create_order(&buyer, card_request(), now_millis())
        .await
        .unwrap();

    assert_eq!(order.status, OrderStatus::Cancelled);
    assert_eq!(order.payment_status, PaymentStatus::Failed);
    assert!(order.stock_restored_at.is_some());
    assert_eq!(h.product("p1").quantity, 3);
    assert!(h.store().get::<Wallet>(TENANT).unwrap().is_none());
}

#[tokio::test]
async fn test_card_rejected_by_notification_returns_stock_once() {
    let h = Harness::new();
    h.seed_seller();
    h.seed_product("p1", "40.00", 3);
    h.gateway.create_with_status("in_process");
    let buyer = buyer();
    h.add_to_cart(&buyer, "p1", 2);
    let order = h
        .state
        .orders
        .create_order(&buyer, card_request(), now_millis())
        .await
        .unwrap();
    assert_eq!(h.product("p1").quantity, 1);
    let payment_id = order.gateway_payment_id().unwrap().to_string();

    h.gateway.set_status(&payment_id, "rejected");
    h.payment_webhook(&payment_id, "req-card-rejected").await.unwrap();
    h.payment_webhook(&payment_id, "req-card-rejected-again").await.unwrap();

    let current = h.order(&order.id);
    assert_eq!(current.status, OrderStatus::Cancelled);
    assert_eq!(current.payment_status, PaymentStatus::Failed);
    assert_eq!(h.product("p1").quantity, 3);
}

#[tokio::test]
async fn test_refund_notification_reverses_wallet_and_restores_stock_once() {
    let h = Harness::new();
    h.seed_seller();
    h.seed_product("p1", "50.00", 5);
    let order = h.paid_order(&buyer(), "p1", 2).await;
    let payment_id = order.gateway_payment_id().unwrap().to_string();
    assert_eq!(h.product("p1").quantity, 3);
    assert_eq!(wallet(&h).balance.pending, d("95.00"));

    h.gateway.set_status(&payment_id, "refunded");
    h.payment_webhook(&payment_id, "req-refund-1").await.unwrap();
    h.payment_webhook(&payment_id, "req-refund-2").await.unwrap();

    let current = h.order(&order.id);
    assert_eq!(current.status, OrderStatus::Refunded);
    assert_eq!(current.payment_status, PaymentStatus::Refunded);
    assert_eq!(current.payment_split.split_status, SplitStatus::Refunded);
    assert!(current.stock_restored_at.is_some());
    assert_eq!(h.product("p1").quantity, 5);

    let balance = wallet(&h).balance;
    assert_eq!(balance.pending, d("0"));
    assert_eq!(balance.total, d("0"));
    assert!(balance.is_consistent());

    // A refund is terminal: a late approval cannot resurrect the order
    h.gateway.set_status(&payment_id, "approved");
    h.payment_webhook(&payment_id, "req-late-approval").await.unwrap();
    assert_eq!(h.order(&order.id).payment_status, PaymentStatus::Refunded);
    assert_eq!(wallet(&h).balance.pending, d("0"));
}

#[tokio::test]
async fn test_chargeback_closes_order() {
    let h = Harness::new();
    h.seed_seller();
    h.seed_product("p1", "100.00", 5);
    let order = h.paid_order(&buyer(), "p1", 1).await;
    let payment_id = order.gateway_payment_id().unwrap().to_string();

    let body = format!(r#"{{"type":"chargeback","data":{{"id":"{payment_id}"}}}}"#);
    let header = signature::sign(&payment_id, "req-cb", "1700000000", WEBHOOK_SECRET);
    let handled = h
        .state
        .webhook
        .handle(Some(&header), Some("req-cb"), body.as_bytes(), &HashMap::new(), now_millis())
        .await
        .unwrap();
    assert_eq!(handled, Handled::Processed);

    let current = h.order(&order.id);
    assert_eq!(current.status, OrderStatus::Refunded);
    assert_eq!(current.payment_split.split_status, SplitStatus::Chargedback);
    assert_eq!(h.product("p1").quantity, 5);
    assert_eq!(wallet(&h).balance.total, d("0"));
    let entry = h
        .store()
        .get::<Transaction>(&format!("chargeback-{}", order.id))
        .unwrap()
        .unwrap();
    assert_eq!(entry.amount, d("-95.00"));
}

#[tokio::test]
async fn test_invalid_signature_rejected_before_any_effect() {
    let h = Harness::new();
    h.seed_seller();
    h.seed_product("p1", "100.00", 5);
    let order = h.checkout(&buyer(), "p1", 1).await;
    let payment_id = order.gateway_payment_id().unwrap().to_string();
    h.gateway.set_status(&payment_id, "approved");

    let body = payment_body(&payment_id);
    let forged = signature::sign(&payment_id, "req-forged", "1700000000", "wrong-secret");
    let result = h
        .state
        .webhook
        .handle(Some(&forged), Some("req-forged"), body.as_bytes(), &HashMap::new(), now_millis())
        .await;
    assert!(matches!(result, Err(WebhookError::Signature(_))));

    let missing = h
        .state
        .webhook
        .handle(None, Some("req-forged"), body.as_bytes(), &HashMap::new(), now_millis())
        .await;
    assert!(matches!(missing, Err(WebhookError::Signature(_))));

    assert_eq!(h.order(&order.id).payment_status, PaymentStatus::Pending);
}

#[tokio::test]
async fn test_missing_secret_rejects_everything() {
    let mut config = test_config();
    config.mp_webhook_secret = None;
    let h = Harness::with_config(config);

    let result = h.payment_webhook("pay-1", "req-1").await;
    assert!(matches!(result, Err(WebhookError::SecretMissing)));
}

#[tokio::test]
async fn test_unknown_payment_and_type_are_ignored() {
    let h = Harness::new();
    assert_eq!(h.payment_webhook("pay-404", "req-1").await.unwrap(), Handled::Ignored);

    let body = r#"{"type":"merchant_order","data":{"id":"mo-1"}}"#;
    let header = signature::sign("mo-1", "req-2", "1700000000", WEBHOOK_SECRET);
    let handled = h
        .state
        .webhook
        .handle(Some(&header), Some("req-2"), body.as_bytes(), &HashMap::new(), now_millis())
        .await
        .unwrap();
    assert_eq!(handled, Handled::Ignored);
}

#[tokio::test]
async fn test_query_only_notification_is_understood() {
    let h = Harness::new();
    h.seed_seller();
    h.seed_product("p1", "100.00", 5);
    let order = h.checkout(&buyer(), "p1", 1).await;
    let payment_id = order.gateway_payment_id().unwrap().to_string();
    h.gateway.set_status(&payment_id, "approved");

    let query = HashMap::from([
        ("type".to_string(), "payment".to_string()),
        ("data.id".to_string(), payment_id.clone()),
    ]);
    let header = signature::sign(&payment_id, "req-q", "1700000000", WEBHOOK_SECRET);
    let handled = h
        .state
        .webhook
        .handle(Some(&header), Some("req-q"), b"", &query, now_millis())
        .await
        .unwrap();
    assert_eq!(handled, Handled::Processed);
    assert_eq!(h.order(&order.id).payment_status, PaymentStatus::Paid);
}
