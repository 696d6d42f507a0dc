//! Integration tests for the Razorpay and Shiprocket HTTP clients.
//!
//! Each test starts a small axum server on an ephemeral port that speaks
//! just enough of the upstream API to exercise request building, token
//! handling and response parsing.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use common::AggregateId;
use domain::catalog::{AdjustStock, CatalogService, ProductDetails, UpsertProduct};
use domain::order::{CartItem, OrderService, OrderStatus, PlaceOrder};
use domain::payment::SignatureVerifier;
use domain::{Actor, Aggregate, Money, ProductId, ShippingAddress};
use event_store::InMemoryEventStore;
use fulfillment::{
    FulfillmentError, InMemoryPaymentGateway, PaymentCoordinator, PaymentGateway, PickupConfig,
    RazorpayConfig, RazorpayGateway, ServiceabilityQuery, ShipmentCoordinator,
    ShippingAggregator, ShiprocketAggregator, ShiprocketConfig, VerifyPayment,
};
use serde_json::{Value, json};

const TIMEOUT: Duration = Duration::from_secs(5);
const UNSERVICEABLE: &str = "799001";

async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

// -- Shiprocket --

#[derive(Default)]
struct ShiprocketStub {
    logins: AtomicU32,
    authorised_calls: AtomicU32,
    next_shipment: AtomicU32,
    valid_token: Mutex<Option<String>>,
    booked: Mutex<Vec<Value>>,
    cancelled: Mutex<Vec<String>>,
}

impl ShiprocketStub {
    fn logins(&self) -> u32 {
        self.logins.load(Ordering::SeqCst)
    }

    fn authorised_calls(&self) -> u32 {
        self.authorised_calls.load(Ordering::SeqCst)
    }

    /// Makes the token handed out earlier stop working.
    fn rotate_token(&self) {
        *self.valid_token.lock().unwrap() = Some("rotated".to_string());
    }

    fn check(&self, headers: &HeaderMap) -> Result<(), StatusCode> {
        let presented = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        let valid = self.valid_token.lock().unwrap().clone();
        if presented.is_some() && presented == valid.as_deref() {
            self.authorised_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        } else {
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

type Shiprocket = Arc<ShiprocketStub>;

async fn login(State(stub): State<Shiprocket>, Json(body): Json<Value>) -> Response {
    if body["email"] != "ops@example.com" || body["password"] != "pw" {
        return (StatusCode::BAD_REQUEST, Json(json!({"message": "bad credentials"})))
            .into_response();
    }
    let n = stub.logins.fetch_add(1, Ordering::SeqCst) + 1;
    let token = format!("tok-{n}");
    *stub.valid_token.lock().unwrap() = Some(token.clone());
    Json(json!({ "token": token, "id": 77 })).into_response()
}

async fn serviceability(
    State(stub): State<Shiprocket>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, StatusCode> {
    stub.check(&headers)?;
    if params.get("delivery_postcode").map(String::as_str) == Some(UNSERVICEABLE) {
        return Ok((
            StatusCode::NOT_FOUND,
            Json(json!({"message": "No courier serviceable"})),
        )
            .into_response());
    }
    Ok(Json(json!({
        "status": 200,
        "data": {
            "available_courier_companies": [
                {"courier_company_id": 10, "courier_name": "Xpressbees", "estimated_delivery_days": "6"},
                {"courier_company_id": 24, "courier_name": "Delhivery Surface", "estimated_delivery_days": 4}
            ],
            "recommended_courier_company_id": 24
        }
    }))
    .into_response())
}

async fn create_adhoc(
    State(stub): State<Shiprocket>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    stub.check(&headers)?;
    stub.booked.lock().unwrap().push(body);
    let n = stub.next_shipment.fetch_add(1, Ordering::SeqCst) + 1;
    Ok(Json(json!({
        "order_id": 500_000 + n,
        "shipment_id": 900_000 + n,
        "status": "NEW"
    })))
}

async fn assign_awb(
    State(stub): State<Shiprocket>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    stub.check(&headers)?;
    let shipment_id = body["shipment_id"].as_str().unwrap_or_default().to_string();
    let courier = if body["courier_id"] == 24 {
        "Delhivery Surface"
    } else {
        "Other"
    };
    Ok(Json(json!({
        "awb_assign_status": 1,
        "response": {
            "data": {
                "awb_code": format!("SRX{shipment_id}"),
                "courier_name": courier,
                "shipment_id": shipment_id
            }
        }
    })))
}

async fn cancel_awbs(
    State(stub): State<Shiprocket>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    stub.check(&headers)?;
    let awbs = body["awbs"]
        .as_array()
        .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect::<Vec<_>>())
        .unwrap_or_default();
    stub.cancelled.lock().unwrap().extend(awbs);
    Ok(Json(json!({"message": "Bulk Shipment cancellation is in progress."})))
}

async fn shiprocket() -> (ShiprocketAggregator, Shiprocket) {
    let stub = Shiprocket::default();
    let router = Router::new()
        .route("/v1/external/auth/login", post(login))
        .route("/v1/external/courier/serviceability/", get(serviceability))
        .route("/v1/external/orders/create/adhoc", post(create_adhoc))
        .route("/v1/external/courier/assign/awb", post(assign_awb))
        .route("/v1/external/orders/cancel/shipment/awbs", post(cancel_awbs))
        .with_state(stub.clone());
    let base_url = spawn(router).await;

    let aggregator = ShiprocketAggregator::new(ShiprocketConfig {
        email: "ops@example.com".to_string(),
        password: "pw".to_string(),
        base_url,
        timeout: TIMEOUT,
        token_ttl: Duration::from_secs(3600),
    })
    .unwrap();
    (aggregator, stub)
}

fn query(postcode: &str) -> ServiceabilityQuery {
    ServiceabilityQuery {
        pickup_postcode: "110001".to_string(),
        delivery_postcode: postcode.to_string(),
        weight_kg: 0.4,
        cash_on_delivery: false,
    }
}

fn address() -> ShippingAddress {
    ShippingAddress {
        name: "Meera Iyer".to_string(),
        phone: "9123456780".to_string(),
        line1: "5 Temple Street".to_string(),
        line2: Some("Near the market".to_string()),
        city: "Madurai".to_string(),
        state: "Tamil Nadu".to_string(),
        postcode: "625001".to_string(),
        country: "India".to_string(),
    }
}

type Payments = PaymentCoordinator<InMemoryEventStore, InMemoryPaymentGateway>;

const SECRET: &[u8] = b"razorpay_test_secret";

fn payments(store: &InMemoryEventStore) -> Payments {
    PaymentCoordinator::new(
        store.clone(),
        InMemoryPaymentGateway::new(),
        SignatureVerifier::new(SECRET).unwrap(),
        "INR",
        TIMEOUT,
    )
}

async fn paid_order(store: &InMemoryEventStore, payments: &Payments) -> AggregateId {
    let sku = ProductId::new("TRIPHALA-60");
    let catalog = CatalogService::new(store.clone());
    if catalog.get_product(&sku).await.unwrap().is_none() {
        catalog
            .upsert_product(UpsertProduct {
                product_id: sku.clone(),
                details: ProductDetails {
                    name: "Triphala Churna".to_string(),
                    price: Money::from_minor(19900),
                    image: None,
                    weight_grams: 250,
                },
            })
            .await
            .unwrap();
        catalog
            .adjust_stock(AdjustStock {
                product_id: sku,
                delta: 10,
                reason: "seed".to_string(),
            })
            .await
            .unwrap();
    }

    let customer = Actor::customer("meera");
    let order_id = OrderService::new(store.clone())
        .place_order(PlaceOrder::new(
            customer.clone(),
            vec![CartItem::new("TRIPHALA-60", 1)],
            address(),
        ))
        .await
        .unwrap()
        .id()
        .unwrap();

    let signer = SignatureVerifier::new(SECRET).unwrap();
    let intent = payments
        .initiate_payment(order_id, &customer, None)
        .await
        .unwrap();
    let order = payments
        .verify_payment(VerifyPayment {
            order_id,
            actor: customer,
            gateway_order_id: intent.gateway_order_id.clone(),
            gateway_payment_id: format!("pay_{order_id}"),
            signature: signer.sign(&intent.gateway_order_id, &format!("pay_{order_id}")),
        })
        .await
        .unwrap();
    assert_eq!(order.status(), OrderStatus::Paid);
    order_id
}

#[tokio::test]
async fn shipments_share_one_login() {
    let (aggregator, stub) = shiprocket().await;
    let store = InMemoryEventStore::new();
    let coordinator = ShipmentCoordinator::new(
        store.clone(),
        aggregator,
        PickupConfig {
            location: "Primary".to_string(),
            postcode: "110001".to_string(),
        },
        TIMEOUT,
    );
    let admin = Actor::admin("ops");
    let payments = payments(&store);

    let first = paid_order(&store, &payments).await;
    let shipment = coordinator.register_shipment(first, &admin).await.unwrap();
    assert_eq!(shipment.awb(), "SRX900001");
    assert_eq!(shipment.courier(), "Delhivery Surface");
    assert_eq!(shipment.aggregator_order_id(), "500001");
    assert_eq!(shipment.aggregator_shipment_id(), "900001");

    let second = paid_order(&store, &payments).await;
    let shipment = coordinator.register_shipment(second, &admin).await.unwrap();
    assert_eq!(shipment.awb(), "SRX900002");

    assert_eq!(stub.logins(), 1);
    assert_eq!(stub.authorised_calls(), 6);

    let booked = stub.booked.lock().unwrap().clone();
    assert_eq!(booked[0]["order_id"], first.to_string());
    assert_eq!(booked[0]["payment_method"], "Prepaid");
    assert_eq!(booked[0]["billing_pincode"], "625001");
    assert_eq!(booked[0]["order_items"][0]["sku"], "TRIPHALA-60");
    assert_eq!(booked[0]["order_items"][0]["selling_price"], 199.0);
}

#[tokio::test]
async fn refused_token_forces_a_fresh_login() {
    let (aggregator, stub) = shiprocket().await;
    let courier = aggregator
        .check_serviceability(&query("625001"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(courier.courier_id, 24);
    assert_eq!(courier.estimated_days, Some(4));
    assert_eq!(stub.logins(), 1);

    stub.rotate_token();
    let err = aggregator
        .check_serviceability(&query("625001"))
        .await
        .unwrap_err();
    assert!(matches!(err, FulfillmentError::UpstreamUnavailable { .. }));
    assert!(err.is_retryable());

    aggregator
        .check_serviceability(&query("625001"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stub.logins(), 2);
}

#[tokio::test]
async fn not_found_serviceability_means_no_courier() {
    let (aggregator, _) = shiprocket().await;
    let courier = aggregator
        .check_serviceability(&query(UNSERVICEABLE))
        .await
        .unwrap();
    assert!(courier.is_none());
}

#[tokio::test]
async fn cancellation_posts_the_awbs() {
    let (aggregator, stub) = shiprocket().await;
    aggregator
        .cancel_awbs(&["SRX1".to_string(), "SRX2".to_string()])
        .await
        .unwrap();
    assert_eq!(*stub.cancelled.lock().unwrap(), vec!["SRX1", "SRX2"]);
}

// -- Razorpay --

async fn create_order(headers: HeaderMap, Json(body): Json<Value>) -> Response {
    let authorised = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("Basic "));
    if !authorised {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    match body["amount"].as_i64() {
        Some(1) => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": {"code": "BAD_REQUEST_ERROR", "description": "amount too small"}})),
        )
            .into_response(),
        Some(2) => StatusCode::SERVICE_UNAVAILABLE.into_response(),
        Some(amount) => Json(json!({
            "id": "order_NxQ1",
            "entity": "order",
            "amount": amount,
            "amount_paid": 0,
            "currency": body["currency"],
            "receipt": body["receipt"],
            "status": "created"
        }))
        .into_response(),
        None => StatusCode::BAD_REQUEST.into_response(),
    }
}

async fn razorpay() -> RazorpayGateway {
    let base_url = spawn(Router::new().route("/v1/orders", post(create_order))).await;
    RazorpayGateway::new(RazorpayConfig {
        key_id: "rzp_test_key".to_string(),
        key_secret: "rzp_secret".to_string(),
        base_url,
        timeout: TIMEOUT,
    })
    .unwrap()
}

#[tokio::test]
async fn razorpay_order_is_parsed() {
    let gateway = razorpay().await;
    let order = gateway
        .create_order(Money::from_minor(39800), "INR", "rcpt_42")
        .await
        .unwrap();

    assert_eq!(order.id, "order_NxQ1");
    assert_eq!(order.amount, Money::from_minor(39800));
    assert_eq!(order.currency, "INR");
    assert_eq!(order.receipt, "rcpt_42");
}

#[tokio::test]
async fn razorpay_failures_are_classified() {
    let gateway = razorpay().await;

    let rejected = gateway
        .create_order(Money::from_minor(1), "INR", "rcpt_1")
        .await
        .unwrap_err();
    assert!(matches!(rejected, FulfillmentError::UpstreamRejected { .. }));
    assert!(!rejected.is_retryable());

    let unavailable = gateway
        .create_order(Money::from_minor(2), "INR", "rcpt_2")
        .await
        .unwrap_err();
    assert!(unavailable.is_retryable());
}
