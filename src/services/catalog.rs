use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use validator::{Validate, ValidationError};

use crate::{
    db::{begin_serializable, commit, retry_on_conflict, ConflictRetry, DbPool},
    entities::{appointment_detail, catalog_service},
    errors::ServiceError,
    events::{Event, EventSender},
    services::pricing::MAX_UNIT_PRICE,
};

fn validate_price(price: &Decimal) -> Result<(), ValidationError> {
    if *price <= Decimal::ZERO {
        return Err(ValidationError::new("price_must_be_positive"));
    }
    if *price > MAX_UNIT_PRICE {
        return Err(ValidationError::new("price_too_large"));
    }
    if price.normalize().scale() > 2 {
        return Err(ValidationError::new("price_has_sub_cent_digits"));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateServiceInput {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(max = 2000))]
    pub description: String,
    #[validate(custom = "validate_price")]
    pub price: Decimal,
}

/// Partial update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateServiceInput {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(custom = "validate_price")]
    pub price: Option<Decimal>,
}

/// Catalog administration. Bookings only ever read this table.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl CatalogService {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_service(
        &self,
        input: CreateServiceInput,
    ) -> Result<catalog_service::Model, ServiceError> {
        input.validate().map_err(|e| {
            warn!(error = %e, "Rejected catalog entry");
            ServiceError::from(e)
        })?;

        let now = Utc::now();
        let model = catalog_service::ActiveModel {
            name: Set(input.name),
            description: Set(input.description),
            price: Set(input.price),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&*self.db)
        .await?;

        info!(service_id = model.id, price = %model.price, "Catalog service created");
        self.event_sender
            .publish(Event::ServiceCreated(model.id))
            .await;

        Ok(model)
    }

    #[instrument(skip(self))]
    pub async fn get_service(&self, id: i32) -> Result<catalog_service::Model, ServiceError> {
        catalog_service::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Service {} not found", id)))
    }

    #[instrument(skip(self))]
    pub async fn list_services(&self) -> Result<Vec<catalog_service::Model>, ServiceError> {
        Ok(catalog_service::Entity::find()
            .order_by_asc(catalog_service::Column::Id)
            .all(&*self.db)
            .await?)
    }

    /// Price changes take the row lock (the database write lock on SQLite), so
    /// they wait for bookings that are still reading the old price.
    #[instrument(skip(self, input))]
    pub async fn update_service(
        &self,
        id: i32,
        input: UpdateServiceInput,
    ) -> Result<catalog_service::Model, ServiceError> {
        input.validate()?;

        let (old_price, updated) =
            retry_on_conflict("update_service", &ConflictRetry::default(), || {
                self.write_service(id, &input)
            })
            .await?;

        info!(service_id = id, "Catalog service updated");
        if updated.price != old_price {
            self.event_sender
                .publish(Event::ServicePriceChanged {
                    service_id: id,
                    old_price,
                    new_price: updated.price,
                })
                .await;
        }

        Ok(updated)
    }

    async fn write_service(
        &self,
        id: i32,
        input: &UpdateServiceInput,
    ) -> Result<(Decimal, catalog_service::Model), ServiceError> {
        let txn = begin_serializable(&*self.db).await?;
        let current = catalog_service::Entity::find_by_id(id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Service {} not found", id)))?;

        let old_price = current.price;
        let mut active: catalog_service::ActiveModel = current.into();
        if let Some(name) = &input.name {
            active.name = Set(name.clone());
        }
        if let Some(description) = &input.description {
            active.description = Set(description.clone());
        }
        if let Some(price) = input.price {
            active.price = Set(price);
        }
        active.updated_at = Set(Utc::now());

        let updated = active.update(&txn).await?;
        commit(txn).await?;
        Ok((old_price, updated))
    }

    /// Removes a service nobody has booked. Booked services stay so that
    /// appointment details can still name them.
    #[instrument(skip(self))]
    pub async fn delete_service(&self, id: i32) -> Result<(), ServiceError> {
        retry_on_conflict("delete_service", &ConflictRetry::default(), || {
            self.remove_service(id)
        })
        .await?;

        info!(service_id = id, "Catalog service deleted");
        self.event_sender.publish(Event::ServiceDeleted(id)).await;
        Ok(())
    }

    async fn remove_service(&self, id: i32) -> Result<(), ServiceError> {
        let txn = begin_serializable(&*self.db).await?;

        catalog_service::Entity::find_by_id(id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Service {} not found", id)))?;

        let references = appointment_detail::Entity::find()
            .filter(appointment_detail::Column::ServiceId.eq(id))
            .count(&txn)
            .await?;
        if references > 0 {
            warn!(service_id = id, references, "Refusing to delete booked service");
            return Err(ServiceError::FailedPrecondition(format!(
                "Service {} is referenced by {} appointment line(s)",
                id, references
            )));
        }

        catalog_service::Entity::delete_by_id(id).exec(&txn).await?;
        commit(txn).await
    }
}
