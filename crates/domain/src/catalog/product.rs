//! Product aggregate.

use chrono::Utc;
use common::{AggregateId, IdNamespace};
use event_store::Version;

use crate::aggregate::Aggregate;
use crate::value_objects::{Money, ProductId};

use super::{
    CatalogError, ProductEvent, ProductListedData, ProductRevisedData, StockAdjustedData,
    StockMovementData,
};

/// Descriptive fields an admin maintains for a product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductDetails {
    pub name: String,
    pub price: Money,
    pub image: Option<String>,
    pub weight_grams: u32,
}

impl ProductDetails {
    fn validate(&self) -> Result<(), CatalogError> {
        if self.name.trim().is_empty() {
            return Err(CatalogError::InvalidProduct("name must not be empty".into()));
        }
        if !self.price.is_positive() {
            return Err(CatalogError::InvalidProduct(format!(
                "price must be positive, got {}",
                self.price
            )));
        }
        if self.weight_grams == 0 {
            return Err(CatalogError::InvalidProduct(
                "weight must be at least one gram".into(),
            ));
        }
        Ok(())
    }
}

/// Product aggregate root: catalog price and available stock for one SKU.
#[derive(Debug, Clone, Default)]
pub struct Product {
    id: Option<AggregateId>,
    version: Version,
    product_id: Option<ProductId>,
    name: String,
    price: Money,
    image: Option<String>,
    weight_grams: u32,
    stock: u32,
}

impl Product {
    /// Stream id of the product with the given SKU.
    pub fn stream_id(product_id: &ProductId) -> AggregateId {
        AggregateId::derived(IdNamespace::Product, product_id.as_str())
    }
}

impl Aggregate for Product {
    type Event = ProductEvent;
    type Error = CatalogError;

    fn aggregate_type() -> &'static str {
        "Product"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            ProductEvent::ProductListed(data) => {
                self.id = Some(data.id);
                self.product_id = Some(data.product_id);
                self.name = data.name;
                self.price = data.price;
                self.image = data.image;
                self.weight_grams = data.weight_grams;
            }
            ProductEvent::ProductRevised(data) => {
                self.name = data.name;
                self.price = data.price;
                self.image = data.image;
                self.weight_grams = data.weight_grams;
            }
            ProductEvent::StockAdjusted(data) => self.stock = data.stock_after,
            ProductEvent::StockReserved(data) | ProductEvent::StockReleased(data) => {
                self.stock = data.stock_after
            }
        }
    }
}

// Query methods
impl Product {
    pub fn product_id(&self) -> Option<&ProductId> {
        self.product_id.as_ref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn price(&self) -> Money {
        self.price
    }

    pub fn image(&self) -> Option<&str> {
        self.image.as_deref()
    }

    pub fn weight_grams(&self) -> u32 {
        self.weight_grams
    }

    pub fn stock(&self) -> u32 {
        self.stock
    }

    fn details(&self) -> ProductDetails {
        ProductDetails {
            name: self.name.clone(),
            price: self.price,
            image: self.image.clone(),
            weight_grams: self.weight_grams,
        }
    }

    fn listed_id(&self) -> Result<ProductId, CatalogError> {
        self.product_id
            .clone()
            .ok_or_else(|| CatalogError::NotListed(ProductId::new("<unlisted>")))
    }
}

// Command methods (return events)
impl Product {
    /// Lists a new product or revises an existing one. Unchanged details
    /// produce no events.
    pub fn list_or_revise(
        &self,
        product_id: &ProductId,
        details: ProductDetails,
    ) -> Result<Vec<ProductEvent>, CatalogError> {
        details.validate()?;

        if !self.exists() {
            return Ok(vec![ProductEvent::ProductListed(ProductListedData {
                id: Product::stream_id(product_id),
                product_id: product_id.clone(),
                name: details.name,
                price: details.price,
                image: details.image,
                weight_grams: details.weight_grams,
                listed_at: Utc::now(),
            })]);
        }

        if self.details() == details {
            return Ok(vec![]);
        }

        Ok(vec![ProductEvent::ProductRevised(ProductRevisedData {
            name: details.name,
            price: details.price,
            image: details.image,
            weight_grams: details.weight_grams,
        })])
    }

    /// Restocks (positive delta) or writes off (negative delta) units.
    pub fn adjust_stock(
        &self,
        delta: i64,
        reason: impl Into<String>,
    ) -> Result<Vec<ProductEvent>, CatalogError> {
        let product_id = self.listed_id()?;
        if delta == 0 {
            return Ok(vec![]);
        }

        let stock_after = i64::from(self.stock) + delta;
        let stock_after = u32::try_from(stock_after).map_err(|_| CatalogError::NegativeStock {
            product_id,
            stock: self.stock,
            delta,
        })?;

        Ok(vec![ProductEvent::StockAdjusted(StockAdjustedData {
            delta,
            stock_after,
            reason: reason.into(),
        })])
    }

    /// Takes `quantity` units for an order, failing if fewer are available.
    pub fn reserve(
        &self,
        order_id: AggregateId,
        quantity: u32,
    ) -> Result<Vec<ProductEvent>, CatalogError> {
        let product_id = self.listed_id()?;
        if quantity > self.stock {
            return Err(CatalogError::OutOfStock {
                product_id,
                requested: quantity,
                available: self.stock,
            });
        }

        Ok(vec![ProductEvent::StockReserved(StockMovementData {
            order_id,
            quantity,
            stock_after: self.stock - quantity,
        })])
    }

    /// Returns units previously reserved for an order.
    pub fn release(
        &self,
        order_id: AggregateId,
        quantity: u32,
    ) -> Result<Vec<ProductEvent>, CatalogError> {
        self.listed_id()?;
        Ok(vec![ProductEvent::StockReleased(StockMovementData {
            order_id,
            quantity,
            stock_after: self.stock.saturating_add(quantity),
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details(price: i64) -> ProductDetails {
        ProductDetails {
            name: "Ashwagandha Root Powder".to_string(),
            price: Money::from_minor(price),
            image: Some("ashwagandha.jpg".to_string()),
            weight_grams: 100,
        }
    }

    fn listed(stock: u32) -> Product {
        let sku = ProductId::new("ASHWA-100");
        let mut product = Product::default();
        product.apply_events(product.list_or_revise(&sku, details(100)).unwrap());
        if stock > 0 {
            product.apply_events(product.adjust_stock(i64::from(stock), "initial").unwrap());
        }
        product
    }

    #[test]
    fn listing_sets_identity_from_sku() {
        let product = listed(0);
        assert_eq!(
            product.id(),
            Some(Product::stream_id(&ProductId::new("ASHWA-100")))
        );
        assert_eq!(product.price(), Money::from_minor(100));
    }

    #[test]
    fn unchanged_details_produce_no_events() {
        let product = listed(0);
        let events = product
            .list_or_revise(&ProductId::new("ASHWA-100"), details(100))
            .unwrap();
        assert!(events.is_empty());

        let events = product
            .list_or_revise(&ProductId::new("ASHWA-100"), details(120))
            .unwrap();
        assert!(matches!(events[0], ProductEvent::ProductRevised(_)));
    }

    #[test]
    fn rejects_invalid_details() {
        let result = Product::default().list_or_revise(&ProductId::new("X"), details(0));
        assert!(matches!(result, Err(CatalogError::InvalidProduct(_))));
    }

    #[test]
    fn reserve_decrements_stock() {
        let mut product = listed(5);
        product.apply_events(product.reserve(AggregateId::new(), 2).unwrap());
        assert_eq!(product.stock(), 3);
    }

    #[test]
    fn reserve_more_than_available_is_out_of_stock() {
        let product = listed(1);
        let result = product.reserve(AggregateId::new(), 2);
        assert!(matches!(
            result,
            Err(CatalogError::OutOfStock {
                requested: 2,
                available: 1,
                ..
            })
        ));
    }

    #[test]
    fn release_restores_stock() {
        let mut product = listed(5);
        let order = AggregateId::new();
        product.apply_events(product.reserve(order, 5).unwrap());
        product.apply_events(product.release(order, 5).unwrap());
        assert_eq!(product.stock(), 5);
    }

    #[test]
    fn stock_cannot_go_negative() {
        let product = listed(2);
        assert!(matches!(
            product.adjust_stock(-3, "damaged"),
            Err(CatalogError::NegativeStock { .. })
        ));
    }

    #[test]
    fn unlisted_products_cannot_be_reserved() {
        let result = Product::default().reserve(AggregateId::new(), 1);
        assert!(matches!(result, Err(CatalogError::NotListed(_))));
    }
}
