use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create tickets table
        manager
            .create_table(
                Table::create()
                    .table(Tickets::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Tickets::Id).uuid().primary_key().not_null())
                    .col(ColumnDef::new(Tickets::OrderId).uuid().not_null())
                    .col(ColumnDef::new(Tickets::SeatId).uuid().not_null())
                    .col(
                        ColumnDef::new(Tickets::BasePrice)
                            .decimal()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(Tickets::FinalPrice)
                            .decimal()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(Tickets::Status)
                            .string()
                            .not_null()
                            .default("Pending"),
                    )
                    .col(ColumnDef::new(Tickets::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Tickets::UpdatedAt).timestamp().null())
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Tickets::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Tickets {
    Table,
    Id,
    OrderId,
    SeatId,
    BasePrice,
    FinalPrice,
    Status,
    CreatedAt,
    UpdatedAt,
}
