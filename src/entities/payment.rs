use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    #[sea_orm(string_value = "PENDING")]
    Pending,
    #[sea_orm(string_value = "COMPLETED")]
    Completed,
    #[sea_orm(string_value = "FAILED")]
    Failed,
    #[sea_orm(string_value = "CANCELLED")]
    Cancelled,
}

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    #[sea_orm(string_value = "CASH")]
    Cash,
    #[sea_orm(string_value = "BANK")]
    Bank,
}

/// What a payment settles. Persisted as two nullable columns of which
/// exactly one is set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementTarget {
    Order(i32),
    Appointment(i32),
}

impl SettlementTarget {
    /// Rebuilds the target from its flattened columns.
    pub fn from_columns(order_id: Option<i32>, appointment_id: Option<i32>) -> Option<Self> {
        match (order_id, appointment_id) {
            (Some(id), None) => Some(Self::Order(id)),
            (None, Some(id)) => Some(Self::Appointment(id)),
            _ => None,
        }
    }

    /// Splits the target into `(order_id, appointment_id)`.
    pub fn into_columns(self) -> (Option<i32>, Option<i32>) {
        match self {
            Self::Order(id) => (Some(id), None),
            Self::Appointment(id) => (None, Some(id)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payments")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub order_id: Option<i32>,
    pub appointment_id: Option<i32>,
    pub amount: Decimal,
    pub description: String,
    pub status: PaymentStatus,
    pub method: PaymentMethod,
    #[sea_orm(unique)]
    pub external_order_code: Option<i64>,
    pub external_link_id: Option<String>,
    pub checkout_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// The stored checkout link, if one is attached.
    pub fn link(&self) -> Option<(String, String)> {
        match (&self.external_link_id, &self.checkout_url) {
            (Some(link_id), Some(url)) => Some((link_id.clone(), url.clone())),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn settlement_target_requires_exactly_one_column() {
        assert_eq!(
            SettlementTarget::from_columns(Some(42), None),
            Some(SettlementTarget::Order(42))
        );
        assert_eq!(
            SettlementTarget::from_columns(None, Some(17)),
            Some(SettlementTarget::Appointment(17))
        );
        assert_eq!(SettlementTarget::from_columns(Some(1), Some(2)), None);
        assert_eq!(SettlementTarget::from_columns(None, None), None);
        assert_eq!(SettlementTarget::Order(42).into_columns(), (Some(42), None));
    }

    #[test]
    fn status_tags_round_trip_through_strum() {
        assert_eq!(PaymentStatus::Cancelled.to_string(), "CANCELLED");
        assert_eq!(PaymentMethod::from_str("BANK").unwrap(), PaymentMethod::Bank);
    }
}
