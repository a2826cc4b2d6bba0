use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create routes table
        manager
            .create_table(
                Table::create()
                    .table(Routes::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Routes::Id).uuid().primary_key().not_null())
                    .col(ColumnDef::new(Routes::Name).string().not_null())
                    .col(
                        ColumnDef::new(Routes::BasePrice)
                            .decimal()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(Routes::TotalDistanceKm)
                            .decimal()
                            .not_null()
                            .default(0.0),
                    )
                    .col(ColumnDef::new(Routes::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Routes::UpdatedAt).timestamp().null())
                    .to_owned(),
            )
            .await?;

        // Create route_stops table
        manager
            .create_table(
                Table::create()
                    .table(RouteStops::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RouteStops::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(ColumnDef::new(RouteStops::RouteId).uuid().not_null())
                    .col(ColumnDef::new(RouteStops::Seq).integer().not_null())
                    .col(ColumnDef::new(RouteStops::StopName).string().not_null())
                    .col(
                        ColumnDef::new(RouteStops::DistanceFromStartKm)
                            .decimal()
                            .not_null()
                            .default(0.0),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RouteStops::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Routes::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Routes {
    Table,
    Id,
    Name,
    BasePrice,
    TotalDistanceKm,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
pub enum RouteStops {
    Table,
    Id,
    RouteId,
    Seq,
    StopName,
    DistanceFromStartKm,
}
