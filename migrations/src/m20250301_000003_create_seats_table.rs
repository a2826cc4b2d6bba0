use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create seats table
        manager
            .create_table(
                Table::create()
                    .table(Seats::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Seats::Id).uuid().primary_key().not_null())
                    .col(ColumnDef::new(Seats::TripId).uuid().not_null())
                    .col(ColumnDef::new(Seats::Floor).integer().not_null())
                    .col(ColumnDef::new(Seats::Row).integer().not_null())
                    .col(ColumnDef::new(Seats::Col).integer().not_null())
                    .col(
                        ColumnDef::new(Seats::Status)
                            .string()
                            .not_null()
                            .default("Available"),
                    )
                    .col(ColumnDef::new(Seats::ReservedBy).string().null())
                    .col(ColumnDef::new(Seats::ReservedUntil).timestamp().null())
                    .col(ColumnDef::new(Seats::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Seats::UpdatedAt).timestamp().null())
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Seats::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Seats {
    Table,
    Id,
    TripId,
    Floor,
    Row,
    Col,
    Status,
    ReservedBy,
    ReservedUntil,
    CreatedAt,
    UpdatedAt,
}
