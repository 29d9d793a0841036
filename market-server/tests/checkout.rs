// market-server/tests/checkout.rs
// Checkout: stock reservation, split snapshot, idempotent retries

mod common;

use common::*;
use market_server::auth::CallerIdentity;
use market_server::orders::CreateOrderRequest;
use shared::error::ErrorCode;
use shared::models::Cart;
use shared::order::{OrderStatus, PaymentStatus, SplitStatus};
use shared::util::now_millis;
use shared::wallet::Wallet;
use std::sync::atomic::Ordering;

fn other_buyer(n: u32) -> CallerIdentity {
    CallerIdentity {
        user_id: format!("u-buyer-{n}"),
        email: format!("buyer{n}@example.com"),
        name: None,
        tenant_id: None,
    }
}

#[tokio::test]
async fn test_checkout_reserves_stock_and_snapshots_split() {
    let h = Harness::new();
    h.seed_seller();
    h.seed_product("p1", "100.00", 5);

    let order = h.checkout(&buyer(), "p1", 2).await;

    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.payment_status, PaymentStatus::Pending);
    assert_eq!(order.total, d("200.00"));
    assert_eq!(order.payment_split.platform_fee_amount, d("10.00"));
    assert_eq!(order.payment_split.seller_amount, d("190.00"));
    assert_eq!(order.payment_split.platform_fee_percentage, d("5"));
    assert!(order.split_is_balanced());
    assert!(order.pix.as_ref().is_some_and(|p| p.code.is_some()));

    assert_eq!(h.product("p1").quantity, 3);
    assert!(h.store().get::<Cart>(BUYER).unwrap().is_none());

    let sent = h.gateway.last_create.lock().unwrap().clone().unwrap();
    assert_eq!(sent.transaction_amount, d("200.00"));
    assert_eq!(sent.application_fee, d("10.00"));
    assert_eq!(sent.external_reference, order.id);
    assert_eq!(sent.money_release_days, 1);
}

#[tokio::test]
async fn test_checkout_replay_returns_same_order() {
    let h = Harness::new();
    h.seed_seller();
    h.seed_product("p1", "50.00", 10);
    let buyer = buyer();

    h.add_to_cart(&buyer, "p1", 1);
    let first = h
        .state
        .orders
        .create_order(&buyer, pix_request(Some("checkout-key-0001")), now_millis())
        .await
        .unwrap();
    let replay = h
        .state
        .orders
        .create_order(&buyer, pix_request(Some("checkout-key-0001")), now_millis())
        .await
        .unwrap();

    assert_eq!(first.id, replay.id);
    assert_eq!(MockGateway::count(&h.gateway.creates), 1);
    assert_eq!(h.product("p1").quantity, 9);
}

#[tokio::test]
async fn test_same_key_from_two_buyers_creates_two_orders() {
    let h = Harness::new();
    h.seed_seller();
    h.seed_product("p1", "50.00", 10);
    let first_buyer = buyer();
    let second_buyer = other_buyer(1);

    h.add_to_cart(&first_buyer, "p1", 1);
    h.add_to_cart(&second_buyer, "p1", 2);
    let first = h
        .state
        .orders
        .create_order(&first_buyer, pix_request(Some("shared-key-0001")), now_millis())
        .await
        .unwrap();
    let second = h
        .state
        .orders
        .create_order(&second_buyer, pix_request(Some("shared-key-0001")), now_millis())
        .await
        .unwrap();

    assert_ne!(first.id, second.id);
    assert_eq!(second.buyer_user_id, second_buyer.user_id);
    assert_eq!(second.total, d("100.00"));
    assert_eq!(MockGateway::count(&h.gateway.creates), 2);
    assert_eq!(h.product("p1").quantity, 7);
}

#[tokio::test]
async fn test_gateway_failure_restores_stock_and_allows_retry() {
    let h = Harness::new();
    h.seed_seller();
    h.seed_product("p1", "30.00", 4);
    let buyer = buyer();
    h.add_to_cart(&buyer, "p1", 3);

    h.gateway.fail_create.store(true, Ordering::SeqCst);
    let err = h
        .state
        .orders
        .create_order(&buyer, pix_request(Some("retry-key-0001")), now_millis())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::GatewayError);
    assert_eq!(h.product("p1").quantity, 4);
    assert_eq!(h.store().get::<Cart>(BUYER).unwrap().unwrap().items.len(), 1);

    h.gateway.fail_create.store(false, Ordering::SeqCst);
    let order = h
        .state
        .orders
        .create_order(&buyer, pix_request(Some("retry-key-0001")), now_millis())
        .await
        .unwrap();
    assert_eq!(order.total, d("90.00"));
    assert_eq!(h.product("p1").quantity, 1);
}

#[tokio::test]
async fn test_unconnected_seller_rejects_checkout() {
    let h = Harness::new();
    h.seed_product("p1", "30.00", 2);
    let buyer = buyer();
    h.add_to_cart(&buyer, "p1", 1);

    let err = h
        .state
        .orders
        .create_order(&buyer, pix_request(None), now_millis())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::SellerNotConnected);
    assert_eq!(h.product("p1").quantity, 2);
    assert_eq!(MockGateway::count(&h.gateway.creates), 0);
}

#[tokio::test]
async fn test_card_payment_requires_token() {
    let h = Harness::new();
    h.seed_seller();
    h.seed_product("p1", "30.00", 2);
    let buyer = buyer();
    h.add_to_cart(&buyer, "p1", 1);

    let request = CreateOrderRequest {
        payment_method: "credit_card".into(),
        card_token: Some("   ".into()),
        ..pix_request(None)
    };
    let err = h
        .state
        .orders
        .create_order(&buyer, request, now_millis())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::CardTokenRequired);
    assert_eq!(h.product("p1").quantity, 2);
}

#[tokio::test]
async fn test_empty_cart_rejected() {
    let h = Harness::new();
    h.seed_seller();
    let err = h
        .state
        .orders
        .create_order(&buyer(), pix_request(None), now_millis())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::CartEmpty);
}

#[tokio::test]
async fn test_card_approved_at_creation_escrows_seller_amount() {
    let h = Harness::new();
    h.seed_seller();
    h.seed_product("p1", "100.00", 1);
    h.gateway.create_with_status("approved");
    let buyer = buyer();
    h.add_to_cart(&buyer, "p1", 1);

    let request = CreateOrderRequest {
        payment_method: "credit_card".into(),
        card_token: Some("card-tok-1".into()),
        installments: Some(3),
        ..pix_request(None)
    };
    let order = h
        .state
        .orders
        .create_order(&buyer, request, now_millis())
        .await
        .unwrap();

    assert_eq!(order.status, OrderStatus::Confirmed);
    assert_eq!(order.payment_status, PaymentStatus::Paid);
    assert_eq!(order.payment_split.split_status, SplitStatus::Held);
    let wallet = h.store().get::<Wallet>(TENANT).unwrap().unwrap();
    assert_eq!(wallet.balance.pending, d("95.00"));
    assert!(wallet.balance.is_consistent());
    assert!(h.order(&order.id).delivery_code_id.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_checkouts_never_oversell() {
    let h = Harness::new();
    h.seed_seller();
    h.seed_product("p1", "20.00", 3);

    let buyers: Vec<CallerIdentity> = (0..6).map(other_buyer).collect();
    for b in &buyers {
        h.add_to_cart(b, "p1", 1);
    }

    let mut handles = Vec::new();
    for b in buyers {
        let state = h.state.clone();
        handles.push(tokio::spawn(async move {
            state
                .orders
                .create_order(&b, pix_request(None), now_millis())
                .await
        }));
    }

    let mut created = 0;
    let mut out_of_stock = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => created += 1,
            Err(e) => {
                assert_eq!(e.code(), ErrorCode::InsufficientStock);
                out_of_stock += 1;
            }
        }
    }
    assert_eq!(created, 3);
    assert_eq!(out_of_stock, 3);
    assert_eq!(h.product("p1").quantity, 0);
}
