use axum::{
    extract::{Path, Query, State},
    Json,
};
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

use crate::domain::{
    compute_transport_fee, Address, HistoryOrder, LifecycleStage, Product, Role, TransactionEvent,
};
use crate::error::AppError;
use crate::services::ProductFilter;
use crate::validation::parse_distance_km;
use crate::AppState;

#[derive(Debug, Deserialize, Default)]
pub struct ProductQuery {
    /// Comma separated stage names or ordinals.
    pub stage: Option<String>,
    pub role: Option<String>,
    pub farmer: Option<String>,
}

impl ProductQuery {
    fn into_filter(self) -> Result<ProductFilter, AppError> {
        let farmer = self
            .farmer
            .filter(|raw| !raw.trim().is_empty())
            .map(|raw| Address::parse(&raw))
            .transpose()?;

        let mut filter = match self.role.filter(|raw| !raw.trim().is_empty()) {
            Some(raw) => {
                let role = raw.parse::<Role>().map_err(AppError::BadRequest)?;
                ProductFilter::for_role(role, farmer.as_ref()).map_err(|_| {
                    AppError::BadRequest("role=farmer requires farmer=<address>".to_string())
                })?
            }
            None => ProductFilter::any(),
        };

        if let Some(raw) = self.stage.filter(|raw| !raw.trim().is_empty()) {
            let stages = raw
                .split(',')
                .map(str::parse::<LifecycleStage>)
                .collect::<Result<Vec<_>, _>>()
                .map_err(AppError::BadRequest)?;
            filter.stages = Some(stages);
        }
        if let Some(farmer) = farmer {
            filter = filter.owned_by(farmer);
        }
        Ok(filter)
    }
}

/// A product plus the amounts derived from it.
#[derive(Debug, Serialize)]
pub struct ProductView {
    #[serde(flatten)]
    pub product: Product,
    pub total_fee: BigDecimal,
    pub total_price: Option<BigDecimal>,
}

impl From<Product> for ProductView {
    fn from(product: Product) -> Self {
        Self {
            total_fee: product.total_fee(),
            total_price: product.total_price(),
            product,
        }
    }
}

pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductQuery>,
) -> Result<Json<Vec<ProductView>>, AppError> {
    let filter = query.into_filter()?;
    let products = state.reconciler.list_products(&filter).await?;
    Ok(Json(products.into_iter().map(ProductView::from).collect()))
}

pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<ProductView>, AppError> {
    let product = state.reconciler.get_product(id).await?;
    Ok(Json(product.into()))
}

pub async fn product_history(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Vec<TransactionEvent>>, AppError> {
    let events = state
        .reconciler
        .fetch_history(Some(id), HistoryOrder::OldestFirst)
        .await?;
    Ok(Json(events))
}

#[derive(Debug, Deserialize)]
pub struct TransportFeeQuery {
    pub distance_km: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TransportFee {
    pub distance_km: u64,
    pub transporter_fee: BigDecimal,
}

pub async fn transport_fee(
    Query(query): Query<TransportFeeQuery>,
) -> Result<Json<TransportFee>, AppError> {
    let raw = query.distance_km.unwrap_or_default();
    let distance_km = parse_distance_km("distance_km", &raw)?;
    Ok(Json(TransportFee {
        distance_km,
        transporter_fee: compute_transport_fee(distance_km),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(stage: Option<&str>, role: Option<&str>, farmer: Option<&str>) -> ProductQuery {
        ProductQuery {
            stage: stage.map(String::from),
            role: role.map(String::from),
            farmer: farmer.map(String::from),
        }
    }

    #[test]
    fn test_empty_query_matches_everything() {
        assert_eq!(query(None, None, None).into_filter().unwrap(), ProductFilter::any());
    }

    #[test]
    fn test_role_query_uses_role_filter() {
        let filter = query(None, Some("transporter"), None).into_filter().unwrap();
        assert_eq!(filter, ProductFilter::stage(LifecycleStage::CollectedByCollector));
    }

    #[test]
    fn test_stage_list_overrides_role_stages() {
        let filter = query(Some("WithRetailer,sold"), Some("retailer"), None)
            .into_filter()
            .unwrap();
        assert_eq!(filter, ProductFilter::marketplace());
    }

    #[test]
    fn test_farmer_role_requires_farmer_address() {
        let err = query(None, Some("farmer"), None).into_filter().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Bad request: role=farmer requires farmer=<address>"
        );

        let own = "0x".to_owned() + &"f1".repeat(20);
        let filter = query(None, Some("farmer"), Some(&own)).into_filter().unwrap();
        assert_eq!(filter.farmer.map(|f| f.to_string()), Some(own));
    }

    #[test]
    fn test_bad_parameters_are_rejected() {
        assert!(query(Some("shipped"), None, None).into_filter().is_err());
        assert!(query(None, Some("miller"), None).into_filter().is_err());
        assert!(query(None, None, Some("0xabc")).into_filter().is_err());
    }
}
