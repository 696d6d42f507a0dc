//! Shipping aggregator trait, in-memory sandbox and Shiprocket client.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::ShippingAddress;
use domain::shipment::PackageDetails;
use serde::Deserialize;
use serde_json::json;

use crate::error::{FulfillmentError, Result};
use crate::token::TokenCache;
use crate::upstream;

const SERVICE: &str = "shiprocket";

/// Route a parcel would take.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceabilityQuery {
    pub pickup_postcode: String,
    pub delivery_postcode: String,
    pub weight_kg: f64,
    pub cash_on_delivery: bool,
}

/// A courier willing to carry the parcel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourierOption {
    pub courier_id: u32,
    pub courier_name: String,
    pub estimated_days: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdhocItem {
    pub name: String,
    pub sku: String,
    pub units: u32,
    /// Unit price in minor units.
    pub unit_price_minor: i64,
}

/// Order details the aggregator needs to book a pickup.
#[derive(Debug, Clone)]
pub struct AdhocOrderRequest {
    /// Our order id, used as the aggregator's channel order reference.
    pub order_ref: String,
    pub order_date: DateTime<Utc>,
    pub pickup_location: String,
    pub address: ShippingAddress,
    pub items: Vec<AdhocItem>,
    pub subtotal_minor: i64,
    pub package: PackageDetails,
}

/// The aggregator's identifiers for a booked order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdhocOrder {
    pub order_id: String,
    pub shipment_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwbAssignment {
    pub awb: String,
    pub courier_name: String,
}

/// Trait for shipping aggregator operations.
#[async_trait]
pub trait ShippingAggregator: Send + Sync {
    /// Obtains a fresh API token.
    async fn authenticate(&self) -> Result<String>;

    /// Returns the recommended courier, or None when nobody delivers there.
    async fn check_serviceability(&self, query: &ServiceabilityQuery)
    -> Result<Option<CourierOption>>;

    async fn create_adhoc_order(&self, request: &AdhocOrderRequest) -> Result<AdhocOrder>;

    async fn assign_awb(&self, shipment_id: &str, courier_id: u32) -> Result<AwbAssignment>;

    async fn cancel_awbs(&self, awbs: &[String]) -> Result<()>;
}

#[async_trait]
impl<T: ShippingAggregator + ?Sized> ShippingAggregator for Arc<T> {
    async fn authenticate(&self) -> Result<String> {
        (**self).authenticate().await
    }

    async fn check_serviceability(
        &self,
        query: &ServiceabilityQuery,
    ) -> Result<Option<CourierOption>> {
        (**self).check_serviceability(query).await
    }

    async fn create_adhoc_order(&self, request: &AdhocOrderRequest) -> Result<AdhocOrder> {
        (**self).create_adhoc_order(request).await
    }

    async fn assign_awb(&self, shipment_id: &str, courier_id: u32) -> Result<AwbAssignment> {
        (**self).assign_awb(shipment_id, courier_id).await
    }

    async fn cancel_awbs(&self, awbs: &[String]) -> Result<()> {
        (**self).cancel_awbs(awbs).await
    }
}

#[derive(Debug, Default)]
struct InMemoryShippingState {
    unserviceable: HashSet<String>,
    shipments: HashMap<String, String>,
    awbs: HashMap<String, bool>,
    cancelled: Vec<String>,
    next_id: u32,
    unavailable: bool,
    fail_awb_assignment: bool,
}

/// In-memory shipping aggregator for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryShippingAggregator {
    state: Arc<Mutex<InMemoryShippingState>>,
}

impl InMemoryShippingAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, InMemoryShippingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes every call fail as if the aggregator could not be reached.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state().unavailable = unavailable;
    }

    /// Makes AWB assignment fail after the adhoc order was created.
    pub fn set_fail_awb_assignment(&self, fail: bool) {
        self.state().fail_awb_assignment = fail;
    }

    /// Marks a delivery postcode as not covered by any courier.
    pub fn mark_unserviceable(&self, postcode: &str) {
        self.state().unserviceable.insert(postcode.to_string());
    }

    /// Returns the AWBs cancelled so far, in call order.
    pub fn cancelled_awbs(&self) -> Vec<String> {
        self.state().cancelled.clone()
    }

    /// Returns the number of AWBs assigned and not cancelled.
    pub fn active_awb_count(&self) -> usize {
        self.state().awbs.values().filter(|active| **active).count()
    }

    fn ensure_available(state: &InMemoryShippingState) -> Result<()> {
        if state.unavailable {
            return Err(FulfillmentError::unavailable(SERVICE, "sandbox unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl ShippingAggregator for InMemoryShippingAggregator {
    async fn authenticate(&self) -> Result<String> {
        Self::ensure_available(&self.state())?;
        Ok("sandbox-token".to_string())
    }

    async fn check_serviceability(
        &self,
        query: &ServiceabilityQuery,
    ) -> Result<Option<CourierOption>> {
        let state = self.state();
        Self::ensure_available(&state)?;
        if state.unserviceable.contains(&query.delivery_postcode) {
            return Ok(None);
        }
        Ok(Some(CourierOption {
            courier_id: 1,
            courier_name: "Sandbox Express".to_string(),
            estimated_days: Some(3),
        }))
    }

    async fn create_adhoc_order(&self, request: &AdhocOrderRequest) -> Result<AdhocOrder> {
        let mut state = self.state();
        Self::ensure_available(&state)?;
        state.next_id += 1;
        let order = AdhocOrder {
            order_id: format!("SR-{:04}", state.next_id),
            shipment_id: format!("SHP-{:04}", state.next_id),
        };
        state
            .shipments
            .insert(order.shipment_id.clone(), request.order_ref.clone());
        Ok(order)
    }

    async fn assign_awb(&self, shipment_id: &str, _courier_id: u32) -> Result<AwbAssignment> {
        let mut state = self.state();
        Self::ensure_available(&state)?;
        if state.fail_awb_assignment {
            return Err(FulfillmentError::rejected(SERVICE, "no courier accepted the pickup"));
        }
        if !state.shipments.contains_key(shipment_id) {
            return Err(FulfillmentError::rejected(
                SERVICE,
                format!("unknown shipment {shipment_id}"),
            ));
        }
        let awb = format!("AWB{}", shipment_id.trim_start_matches("SHP-"));
        state.awbs.insert(awb.clone(), true);
        Ok(AwbAssignment {
            awb,
            courier_name: "Sandbox Express".to_string(),
        })
    }

    async fn cancel_awbs(&self, awbs: &[String]) -> Result<()> {
        let mut state = self.state();
        Self::ensure_available(&state)?;
        for awb in awbs {
            if let Some(active) = state.awbs.get_mut(awb) {
                *active = false;
            }
            state.cancelled.push(awb.clone());
        }
        Ok(())
    }
}

/// Connection settings for the Shiprocket external API.
#[derive(Debug, Clone)]
pub struct ShiprocketConfig {
    pub email: String,
    pub password: String,
    pub base_url: String,
    pub timeout: Duration,
    pub token_ttl: Duration,
}

/// Shiprocket client. Authenticates with email and password and reuses the
/// bearer token until it nears expiry or is refused.
#[derive(Debug)]
pub struct ShiprocketAggregator {
    client: reqwest::Client,
    email: String,
    password: String,
    base_url: String,
    tokens: TokenCache,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct ServiceabilityResponse {
    #[serde(default)]
    data: Option<ServiceabilityData>,
}

#[derive(Debug, Deserialize)]
struct ServiceabilityData {
    #[serde(default)]
    available_courier_companies: Vec<CourierCompany>,
    #[serde(default)]
    recommended_courier_company_id: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct CourierCompany {
    courier_company_id: u32,
    courier_name: String,
    #[serde(default)]
    estimated_delivery_days: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct AdhocResponse {
    order_id: serde_json::Value,
    shipment_id: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct AssignAwbResponse {
    #[serde(default)]
    awb_assign_status: u8,
    response: AssignAwbEnvelope,
}

#[derive(Debug, Deserialize)]
struct AssignAwbEnvelope {
    data: AssignAwbData,
}

#[derive(Debug, Deserialize)]
struct AssignAwbData {
    #[serde(default)]
    awb_code: String,
    #[serde(default)]
    courier_name: String,
}

/// Shiprocket sends ids as numbers in some responses and strings in others.
fn id_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn days(value: &Option<serde_json::Value>) -> Option<u32> {
    match value.as_ref()? {
        serde_json::Value::Number(n) => n.as_u64().and_then(|d| u32::try_from(d).ok()),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Formats minor units as the decimal rupee amount the API expects.
fn major(minor: i64) -> f64 {
    minor as f64 / 100.0
}

impl ShiprocketAggregator {
    pub fn new(config: ShiprocketConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| upstream::transport_error(SERVICE, e))?;
        Ok(Self {
            client,
            email: config.email,
            password: config.password,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            tokens: TokenCache::new(config.token_ttl, Duration::from_secs(300)),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/external{path}", self.base_url)
    }

    async fn token(&self) -> Result<String> {
        self.tokens.get_or_fetch(|| self.authenticate()).await
    }

    /// Sends an authorised request. A 401 drops the cached token so the
    /// next call logs in again.
    async fn send_authorised(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let token = self.token().await?;
        let response = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| upstream::transport_error(SERVICE, e))?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            self.tokens.invalidate().await;
            return Err(FulfillmentError::unavailable(SERVICE, "token was refused"));
        }
        Ok(response)
    }
}

#[async_trait]
impl ShippingAggregator for ShiprocketAggregator {
    async fn authenticate(&self) -> Result<String> {
        let response = self
            .client
            .post(self.url("/auth/login"))
            .json(&json!({ "email": self.email, "password": self.password }))
            .send()
            .await
            .map_err(|e| upstream::transport_error(SERVICE, e))?;
        let login: LoginResponse = upstream::read_json(SERVICE, response).await?;
        Ok(login.token)
    }

    #[tracing::instrument(skip(self, query), fields(postcode = %query.delivery_postcode))]
    async fn check_serviceability(
        &self,
        query: &ServiceabilityQuery,
    ) -> Result<Option<CourierOption>> {
        let request = self
            .client
            .get(self.url("/courier/serviceability/"))
            .query(&[
                ("pickup_postcode", query.pickup_postcode.clone()),
                ("delivery_postcode", query.delivery_postcode.clone()),
                ("weight", format!("{:.3}", query.weight_kg)),
                ("cod", u8::from(query.cash_on_delivery).to_string()),
            ]);
        let response = self.send_authorised(request).await?;

        // Unserviceable routes come back as 404 with an explanatory body.
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: ServiceabilityResponse = upstream::read_json(SERVICE, response).await?;
        let Some(data) = body.data else {
            return Ok(None);
        };

        let recommended = data.recommended_courier_company_id;
        let chosen = data
            .available_courier_companies
            .iter()
            .find(|c| Some(c.courier_company_id) == recommended)
            .or_else(|| data.available_courier_companies.first());

        Ok(chosen.map(|c| CourierOption {
            courier_id: c.courier_company_id,
            courier_name: c.courier_name.clone(),
            estimated_days: days(&c.estimated_delivery_days),
        }))
    }

    #[tracing::instrument(skip(self, request), fields(order_ref = %request.order_ref))]
    async fn create_adhoc_order(&self, request: &AdhocOrderRequest) -> Result<AdhocOrder> {
        let address = &request.address;
        let items: Vec<_> = request
            .items
            .iter()
            .map(|item| {
                json!({
                    "name": item.name,
                    "sku": item.sku,
                    "units": item.units,
                    "selling_price": major(item.unit_price_minor),
                })
            })
            .collect();

        let body = json!({
            "order_id": request.order_ref,
            "order_date": request.order_date.format("%Y-%m-%d %H:%M").to_string(),
            "pickup_location": request.pickup_location,
            "billing_customer_name": address.name,
            "billing_last_name": "",
            "billing_address": address.line1,
            "billing_address_2": address.line2.clone().unwrap_or_default(),
            "billing_city": address.city,
            "billing_pincode": address.postcode,
            "billing_state": address.state,
            "billing_country": address.country,
            "billing_phone": address.phone,
            "shipping_is_billing": true,
            "order_items": items,
            "payment_method": "Prepaid",
            "sub_total": major(request.subtotal_minor),
            "length": request.package.length_cm,
            "breadth": request.package.breadth_cm,
            "height": request.package.height_cm,
            "weight": request.package.weight_kg(),
        });

        let response = self
            .send_authorised(self.client.post(self.url("/orders/create/adhoc")).json(&body))
            .await?;
        let created: AdhocResponse = upstream::read_json(SERVICE, response).await?;
        Ok(AdhocOrder {
            order_id: id_string(&created.order_id),
            shipment_id: id_string(&created.shipment_id),
        })
    }

    #[tracing::instrument(skip(self))]
    async fn assign_awb(&self, shipment_id: &str, courier_id: u32) -> Result<AwbAssignment> {
        let body = json!({ "shipment_id": shipment_id, "courier_id": courier_id });
        let response = self
            .send_authorised(self.client.post(self.url("/courier/assign/awb")).json(&body))
            .await?;
        let assigned: AssignAwbResponse = upstream::read_json(SERVICE, response).await?;

        if assigned.awb_assign_status != 1 || assigned.response.data.awb_code.is_empty() {
            return Err(FulfillmentError::rejected(SERVICE, "AWB was not assigned"));
        }
        Ok(AwbAssignment {
            awb: assigned.response.data.awb_code,
            courier_name: assigned.response.data.courier_name,
        })
    }

    #[tracing::instrument(skip(self))]
    async fn cancel_awbs(&self, awbs: &[String]) -> Result<()> {
        let body = json!({ "awbs": awbs });
        let response = self
            .send_authorised(
                self.client
                    .post(self.url("/orders/cancel/shipment/awbs"))
                    .json(&body),
            )
            .await?;
        upstream::read_json::<serde_json::Value>(SERVICE, response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> AdhocOrderRequest {
        AdhocOrderRequest {
            order_ref: "order-1".to_string(),
            order_date: Utc::now(),
            pickup_location: "Primary".to_string(),
            address: ShippingAddress {
                name: "Asha Verma".to_string(),
                phone: "9876543210".to_string(),
                line1: "12 MG Road".to_string(),
                line2: None,
                city: "Bengaluru".to_string(),
                state: "Karnataka".to_string(),
                postcode: "560001".to_string(),
                country: "India".to_string(),
            },
            items: vec![AdhocItem {
                name: "Ashwagandha".to_string(),
                sku: "ASHWA-100".to_string(),
                units: 1,
                unit_price_minor: 29900,
            }],
            subtotal_minor: 29900,
            package: PackageDetails::standard_box(100),
        }
    }

    fn query(postcode: &str) -> ServiceabilityQuery {
        ServiceabilityQuery {
            pickup_postcode: "110001".to_string(),
            delivery_postcode: postcode.to_string(),
            weight_kg: 0.1,
            cash_on_delivery: false,
        }
    }

    #[tokio::test]
    async fn sandbox_books_and_cancels() {
        let aggregator = InMemoryShippingAggregator::new();
        let courier = aggregator
            .check_serviceability(&query("560001"))
            .await
            .unwrap()
            .unwrap();
        let booked = aggregator.create_adhoc_order(&request()).await.unwrap();
        let assigned = aggregator
            .assign_awb(&booked.shipment_id, courier.courier_id)
            .await
            .unwrap();

        assert_eq!(booked.order_id, "SR-0001");
        assert_eq!(assigned.awb, "AWB0001");
        assert_eq!(aggregator.active_awb_count(), 1);

        aggregator.cancel_awbs(&[assigned.awb.clone()]).await.unwrap();
        assert_eq!(aggregator.active_awb_count(), 0);
        assert_eq!(aggregator.cancelled_awbs(), vec![assigned.awb]);
    }

    #[tokio::test]
    async fn sandbox_unserviceable_postcode() {
        let aggregator = InMemoryShippingAggregator::new();
        aggregator.mark_unserviceable("799001");
        assert!(
            aggregator
                .check_serviceability(&query("799001"))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn ids_and_days_accept_numbers_or_strings() {
        assert_eq!(id_string(&json!(12345)), "12345");
        assert_eq!(id_string(&json!("12345")), "12345");
        assert_eq!(days(&Some(json!(4))), Some(4));
        assert_eq!(days(&Some(json!("5"))), Some(5));
        assert_eq!(days(&None), None);
    }

    #[test]
    fn prices_are_sent_in_rupees() {
        assert!((major(29900) - 299.0).abs() < f64::EPSILON);
    }
}
