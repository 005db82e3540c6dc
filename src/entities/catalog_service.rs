use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A bookable service in the catalog. `price` is the current price; bookings
/// copy it into their own lines and never read it again.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "services")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::appointment_detail::Entity")]
    AppointmentDetails,
}

impl Related<super::appointment_detail::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AppointmentDetails.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
