//! Pricing strategies turn catalog rows and requested items into priced
//! lines and a total. Strategies are pure: they see no database handle and
//! keep no state between calls, so one instance is shared by every request.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::{config::AppConfig, entities::catalog_service, errors::ServiceError};

/// Largest catalog price the `services.price` column (12, 2) can hold.
pub const MAX_UNIT_PRICE: Decimal = dec!(9999999999.99);

/// Largest amount the `appointments.total` and `payments.amount` columns
/// (14, 2) can hold.
pub const MAX_TOTAL: Decimal = dec!(999999999999.99);

/// `unit_price * quantity`, or INVALID_ARGUMENT when it does not fit.
pub fn checked_subtotal(
    service_id: i32,
    unit_price: Decimal,
    quantity: i32,
) -> Result<Decimal, ServiceError> {
    unit_price
        .checked_mul(Decimal::from(quantity))
        .ok_or_else(|| {
            ServiceError::InvalidInput(format!(
                "{} x service {} at {} overflows",
                quantity, service_id, unit_price
            ))
        })
}

/// A service and how many of it the customer wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedItem {
    pub service_id: i32,
    pub quantity: i32,
}

/// One line of a quote, with the unit price that will be snapshotted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedLine {
    pub service_id: i32,
    pub unit_price: Decimal,
    pub quantity: i32,
}

impl PricedLine {
    pub fn subtotal(&self) -> Result<Decimal, ServiceError> {
        checked_subtotal(self.service_id, self.unit_price, self.quantity)
    }
}

fn checked_total(lines: &[PricedLine]) -> Result<Decimal, ServiceError> {
    lines.iter().try_fold(Decimal::ZERO, |total, line| {
        total.checked_add(line.subtotal()?).ok_or_else(|| {
            ServiceError::InvalidInput("booking total overflows".to_string())
        })
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub lines: Vec<PricedLine>,
    pub total: Decimal,
}

impl Quote {
    /// Builds a quote whose total is the sum of its lines. Totals that would
    /// not fit the stored columns are rejected as invalid input.
    pub fn from_lines(lines: Vec<PricedLine>) -> Result<Self, ServiceError> {
        let total = checked_total(&lines)?;
        if total > MAX_TOTAL {
            return Err(ServiceError::InvalidInput(format!(
                "booking total {} exceeds the maximum of {}",
                total, MAX_TOTAL
            )));
        }
        Ok(Self { lines, total })
    }

    /// Checks what every strategy must guarantee before anything is persisted:
    /// one line per requested item, positive unit prices, and a total that
    /// equals the sum of the lines.
    pub fn verify(&self, items: &[RequestedItem]) -> Result<(), ServiceError> {
        if self.lines.len() != items.len() {
            return Err(ServiceError::InternalError(format!(
                "quote has {} lines for {} requested items",
                self.lines.len(),
                items.len()
            )));
        }
        for (line, item) in self.lines.iter().zip(items) {
            if line.service_id != item.service_id || line.quantity != item.quantity {
                return Err(ServiceError::InternalError(format!(
                    "quote line for service {} does not match requested service {}",
                    line.service_id, item.service_id
                )));
            }
            if line.unit_price <= Decimal::ZERO {
                return Err(ServiceError::InternalError(format!(
                    "service {} priced at {}",
                    line.service_id, line.unit_price
                )));
            }
        }
        let sum = checked_total(&self.lines)?;
        if sum != self.total {
            return Err(ServiceError::InternalError(format!(
                "quote total {} differs from line sum {}",
                self.total, sum
            )));
        }
        Ok(())
    }
}

pub trait PricingStrategy: Send + Sync + Debug {
    fn name(&self) -> &'static str;

    /// Prices `items` (in request order) against the catalog rows loaded for them.
    fn price_items(
        &self,
        catalog: &[catalog_service::Model],
        items: &[RequestedItem],
    ) -> Result<Quote, ServiceError>;
}

fn index_catalog(catalog: &[catalog_service::Model]) -> HashMap<i32, &catalog_service::Model> {
    catalog.iter().map(|row| (row.id, row)).collect()
}

fn lookup<'a>(
    index: &HashMap<i32, &'a catalog_service::Model>,
    service_id: i32,
) -> Result<&'a catalog_service::Model, ServiceError> {
    index
        .get(&service_id)
        .copied()
        .ok_or_else(|| ServiceError::NotFound(format!("Service {} not found", service_id)))
}

/// Unit price is the catalog's current price.
#[derive(Debug, Clone, Copy, Default)]
pub struct Standard;

impl PricingStrategy for Standard {
    fn name(&self) -> &'static str {
        "standard"
    }

    fn price_items(
        &self,
        catalog: &[catalog_service::Model],
        items: &[RequestedItem],
    ) -> Result<Quote, ServiceError> {
        let index = index_catalog(catalog);
        let lines = items
            .iter()
            .map(|item| {
                let row = lookup(&index, item.service_id)?;
                Ok(PricedLine {
                    service_id: item.service_id,
                    unit_price: row.price,
                    quantity: item.quantity,
                })
            })
            .collect::<Result<Vec<_>, ServiceError>>()?;

        Quote::from_lines(lines)
    }
}

/// Takes a flat percentage off every unit price. Discounted prices are
/// rounded to cents and never drop below one cent.
#[derive(Debug, Clone, Copy)]
pub struct PercentOff {
    percent: Decimal,
}

impl PercentOff {
    pub fn new(percent: Decimal) -> Result<Self, ServiceError> {
        if percent < Decimal::ZERO || percent >= Decimal::ONE_HUNDRED {
            return Err(ServiceError::ValidationError(format!(
                "discount percent {} must be in [0, 100)",
                percent
            )));
        }
        Ok(Self { percent })
    }

    fn discounted(&self, price: Decimal) -> Decimal {
        let factor = (Decimal::ONE_HUNDRED - self.percent) / Decimal::ONE_HUNDRED;
        (price * factor)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
            .max(Decimal::new(1, 2))
    }
}

impl PricingStrategy for PercentOff {
    fn name(&self) -> &'static str {
        "percent_off"
    }

    fn price_items(
        &self,
        catalog: &[catalog_service::Model],
        items: &[RequestedItem],
    ) -> Result<Quote, ServiceError> {
        let index = index_catalog(catalog);
        let lines = items
            .iter()
            .map(|item| {
                let row = lookup(&index, item.service_id)?;
                Ok(PricedLine {
                    service_id: item.service_id,
                    unit_price: self.discounted(row.price),
                    quantity: item.quantity,
                })
            })
            .collect::<Result<Vec<_>, ServiceError>>()?;

        Quote::from_lines(lines)
    }
}

/// Picks the strategy named by `pricing_strategy`.
pub fn strategy_from_config(cfg: &AppConfig) -> Result<Arc<dyn PricingStrategy>, ServiceError> {
    match cfg.pricing_strategy.to_ascii_lowercase().as_str() {
        "standard" => Ok(Arc::new(Standard)),
        "percent_off" => Ok(Arc::new(PercentOff::new(cfg.pricing_discount_percent)?)),
        other => Err(ServiceError::ValidationError(format!(
            "unknown pricing strategy '{}'",
            other
        ))),
    }
}
