use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_000001_create_services_table::Migration),
            Box::new(m20250301_000002_create_appointments_table::Migration),
            Box::new(m20250301_000003_create_appointment_details_table::Migration),
            Box::new(m20250301_000004_create_payments_table::Migration),
        ]
    }
}

// Migration implementations

mod m20250301_000001_create_services_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250301_000001_create_services_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            // Catalog of bookable services - matches entities::catalog_service Model
            manager
                .create_table(
                    Table::create()
                        .table(Services::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Services::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Services::Name).string().not_null())
                        .col(ColumnDef::new(Services::Description).string().not_null().default(""))
                        .col(ColumnDef::new(Services::Price).decimal_len(12, 2).not_null())
                        .col(ColumnDef::new(Services::CreatedAt).timestamp_with_time_zone().not_null())
                        .col(ColumnDef::new(Services::UpdatedAt).timestamp_with_time_zone().not_null())
                        .check(Expr::col(Services::Price).gt(0))
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Services::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub enum Services {
        Table,
        Id,
        Name,
        Description,
        Price,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20250301_000002_create_appointments_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250301_000002_create_appointments_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Appointments::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Appointments::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Appointments::CustomerId).integer().not_null())
                        .col(ColumnDef::new(Appointments::BranchId).integer().not_null())
                        .col(ColumnDef::new(Appointments::EmployeeId).integer().null())
                        .col(ColumnDef::new(Appointments::CustomerAddress).string().not_null())
                        .col(
                            ColumnDef::new(Appointments::ScheduledTime)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Appointments::Status).string_len(20).not_null())
                        .col(ColumnDef::new(Appointments::Note).string().not_null().default(""))
                        .col(ColumnDef::new(Appointments::Total).decimal_len(14, 2).not_null())
                        .col(ColumnDef::new(Appointments::CreatedAt).timestamp_with_time_zone().not_null())
                        .col(ColumnDef::new(Appointments::UpdatedAt).timestamp_with_time_zone().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_appointments_customer_id")
                        .table(Appointments::Table)
                        .col(Appointments::CustomerId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_appointments_employee_id")
                        .table(Appointments::Table)
                        .col(Appointments::EmployeeId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_appointments_scheduled_time")
                        .table(Appointments::Table)
                        .col(Appointments::ScheduledTime)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Appointments::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub enum Appointments {
        Table,
        Id,
        CustomerId,
        BranchId,
        EmployeeId,
        CustomerAddress,
        ScheduledTime,
        Status,
        Note,
        Total,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20250301_000003_create_appointment_details_table {
    use super::m20250301_000001_create_services_table::Services;
    use super::m20250301_000002_create_appointments_table::Appointments;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250301_000003_create_appointment_details_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            // Lines die with their appointment; a referenced service cannot be removed.
            manager
                .create_table(
                    Table::create()
                        .table(AppointmentDetails::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(AppointmentDetails::AppointmentId).integer().not_null())
                        .col(ColumnDef::new(AppointmentDetails::ServiceId).integer().not_null())
                        .col(
                            ColumnDef::new(AppointmentDetails::UnitPriceSnapshot)
                                .decimal_len(12, 2)
                                .not_null(),
                        )
                        .col(ColumnDef::new(AppointmentDetails::Quantity).integer().not_null())
                        .primary_key(
                            Index::create()
                                .col(AppointmentDetails::AppointmentId)
                                .col(AppointmentDetails::ServiceId),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_appointment_details_appointment")
                                .from(AppointmentDetails::Table, AppointmentDetails::AppointmentId)
                                .to(Appointments::Table, Appointments::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_appointment_details_service")
                                .from(AppointmentDetails::Table, AppointmentDetails::ServiceId)
                                .to(Services::Table, Services::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .check(Expr::col(AppointmentDetails::UnitPriceSnapshot).gt(0))
                        .check(Expr::col(AppointmentDetails::Quantity).gte(1))
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_appointment_details_service_id")
                        .table(AppointmentDetails::Table)
                        .col(AppointmentDetails::ServiceId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(AppointmentDetails::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum AppointmentDetails {
        Table,
        AppointmentId,
        ServiceId,
        UnitPriceSnapshot,
        Quantity,
    }
}

mod m20250301_000004_create_payments_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250301_000004_create_payments_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            // Create payments table - matches entities::payment Model
            manager
                .create_table(
                    Table::create()
                        .table(Payments::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Payments::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Payments::OrderId).integer().null())
                        .col(ColumnDef::new(Payments::AppointmentId).integer().null())
                        .col(ColumnDef::new(Payments::Amount).decimal_len(14, 2).not_null())
                        .col(ColumnDef::new(Payments::Description).string().not_null().default(""))
                        .col(ColumnDef::new(Payments::Status).string_len(20).not_null())
                        .col(ColumnDef::new(Payments::Method).string_len(20).not_null())
                        .col(
                            ColumnDef::new(Payments::ExternalOrderCode)
                                .big_integer()
                                .null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Payments::ExternalLinkId).string().null())
                        .col(ColumnDef::new(Payments::CheckoutUrl).string().null())
                        .col(ColumnDef::new(Payments::CreatedAt).timestamp_with_time_zone().not_null())
                        .col(ColumnDef::new(Payments::UpdatedAt).timestamp_with_time_zone().not_null())
                        // Exactly one settlement target.
                        .check(Expr::cust("(order_id IS NULL) <> (appointment_id IS NULL)"))
                        .check(Expr::col(Payments::Amount).gt(0))
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_payments_order_id")
                        .table(Payments::Table)
                        .col(Payments::OrderId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_payments_appointment_id")
                        .table(Payments::Table)
                        .col(Payments::AppointmentId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Payments::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Payments {
        Table,
        Id,
        OrderId,
        AppointmentId,
        Amount,
        Description,
        Status,
        Method,
        ExternalOrderCode,
        ExternalLinkId,
        CheckoutUrl,
        CreatedAt,
        UpdatedAt,
    }
}
