//! Product listing and stock endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use domain::catalog::{AdjustStock, Product, ProductDetails, UpsertProduct};
use domain::{Money, ProductId};
use event_store::EventStore;
use serde::{Deserialize, Serialize};

use super::require_admin;
use crate::error::ApiError;
use crate::extract::Payload;
use crate::session::Session;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ProductRequest {
    pub name: String,
    /// Price in minor units.
    pub price: i64,
    #[serde(default)]
    pub image: Option<String>,
    pub weight_grams: u32,
}

#[derive(Deserialize)]
pub struct StockRequest {
    pub delta: i64,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Serialize)]
pub struct ProductResponse {
    pub sku: ProductId,
    pub name: String,
    pub price: Money,
    pub image: Option<String>,
    pub weight_grams: u32,
    pub stock: u32,
}

impl ProductResponse {
    fn new(sku: ProductId, product: &Product) -> Self {
        Self {
            sku,
            name: product.name().to_string(),
            price: product.price(),
            image: product.image().map(str::to_string),
            weight_grams: product.weight_grams(),
            stock: product.stock(),
        }
    }
}

/// PUT /admin/products/{sku}: lists a product or revises its details.
#[tracing::instrument(skip(state, session, req))]
pub async fn upsert<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    session: Session,
    Path(sku): Path<String>,
    Payload(req): Payload<ProductRequest>,
) -> Result<Json<ProductResponse>, ApiError> {
    require_admin(&session.actor)?;
    let product_id = ProductId::new(sku);
    let product = state
        .catalog
        .upsert_product(UpsertProduct {
            product_id: product_id.clone(),
            details: ProductDetails {
                name: req.name,
                price: Money::from_minor(req.price),
                image: req.image,
                weight_grams: req.weight_grams,
            },
        })
        .await?;
    Ok(Json(ProductResponse::new(product_id, &product)))
}

/// POST /admin/products/{sku}/stock: adds or removes sellable units.
#[tracing::instrument(skip(state, session, req))]
pub async fn adjust_stock<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    session: Session,
    Path(sku): Path<String>,
    Payload(req): Payload<StockRequest>,
) -> Result<Json<ProductResponse>, ApiError> {
    require_admin(&session.actor)?;
    let product_id = ProductId::new(sku);
    let product = state
        .catalog
        .adjust_stock(AdjustStock {
            product_id: product_id.clone(),
            delta: req.delta,
            reason: req
                .reason
                .unwrap_or_else(|| format!("adjusted by {}", session.actor.user_id)),
        })
        .await?;
    Ok(Json(ProductResponse::new(product_id, &product)))
}

/// GET /products/{sku}
pub async fn get<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(sku): Path<String>,
) -> Result<Json<ProductResponse>, ApiError> {
    let product_id = ProductId::new(sku);
    let product = state
        .catalog
        .get_product(&product_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("product {product_id} not found")))?;
    Ok(Json(ProductResponse::new(product_id, &product)))
}
