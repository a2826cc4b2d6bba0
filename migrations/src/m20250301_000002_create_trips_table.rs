use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create trips table
        manager
            .create_table(
                Table::create()
                    .table(Trips::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Trips::Id).uuid().primary_key().not_null())
                    .col(ColumnDef::new(Trips::RouteId).uuid().not_null())
                    .col(ColumnDef::new(Trips::VehicleName).string().not_null())
                    .col(
                        ColumnDef::new(Trips::Price)
                            .decimal()
                            .not_null()
                            .default(0.0),
                    )
                    .col(ColumnDef::new(Trips::DepartureAt).timestamp().not_null())
                    .col(ColumnDef::new(Trips::ArrivalAt).timestamp().null())
                    .col(
                        ColumnDef::new(Trips::Status)
                            .string()
                            .not_null()
                            .default("Scheduled"),
                    )
                    .col(ColumnDef::new(Trips::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Trips::UpdatedAt).timestamp().null())
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Trips::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Trips {
    Table,
    Id,
    RouteId,
    VehicleName,
    Price,
    DepartureAt,
    ArrivalAt,
    Status,
    CreatedAt,
    UpdatedAt,
}
