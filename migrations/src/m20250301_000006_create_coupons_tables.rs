use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create coupons table
        manager
            .create_table(
                Table::create()
                    .table(Coupons::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Coupons::Id).uuid().primary_key().not_null())
                    .col(
                        ColumnDef::new(Coupons::Code)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Coupons::CouponType).string().not_null())
                    .col(
                        ColumnDef::new(Coupons::Value)
                            .decimal()
                            .not_null()
                            .default(0.0),
                    )
                    .col(ColumnDef::new(Coupons::StartPeriod).timestamp().not_null())
                    .col(ColumnDef::new(Coupons::EndPeriod).timestamp().not_null())
                    .col(
                        ColumnDef::new(Coupons::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Coupons::MaxUsage)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Coupons::CurrentUsageCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Coupons::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Coupons::UpdatedAt).timestamp().null())
                    .to_owned(),
            )
            .await?;

        // Create coupon_usages table
        manager
            .create_table(
                Table::create()
                    .table(CouponUsages::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CouponUsages::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(ColumnDef::new(CouponUsages::CouponId).uuid().not_null())
                    .col(ColumnDef::new(CouponUsages::OrderId).uuid().not_null())
                    .col(ColumnDef::new(CouponUsages::UserId).uuid().null())
                    .col(
                        ColumnDef::new(CouponUsages::DiscountAmount)
                            .decimal()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(CouponUsages::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CouponUsages::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Coupons::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Coupons {
    Table,
    Id,
    Code,
    CouponType,
    Value,
    StartPeriod,
    EndPeriod,
    IsActive,
    MaxUsage,
    CurrentUsageCount,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
pub enum CouponUsages {
    Table,
    Id,
    CouponId,
    OrderId,
    UserId,
    DiscountAmount,
    CreatedAt,
}
