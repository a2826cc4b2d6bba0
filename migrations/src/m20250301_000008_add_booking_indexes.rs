use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Seat lookups are always scoped to a trip.
        manager
            .create_index(
                Index::create()
                    .name("idx_seats_trip_status")
                    .table(Seats::Table)
                    .col(Seats::TripId)
                    .col(Seats::Status)
                    .to_owned(),
            )
            .await?;

        // Ticket lookups by order (refund path) and by seat (cascade path).
        manager
            .create_index(
                Index::create()
                    .name("idx_tickets_order_id")
                    .table(Tickets::Table)
                    .col(Tickets::OrderId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_tickets_seat_id")
                    .table(Tickets::Table)
                    .col(Tickets::SeatId)
                    .to_owned(),
            )
            .await?;

        // Order history accessors filter by purchaser.
        manager
            .create_index(
                Index::create()
                    .name("idx_orders_user_id")
                    .table(Orders::Table)
                    .col(Orders::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_orders_guest_email")
                    .table(Orders::Table)
                    .col(Orders::GuestEmail)
                    .to_owned(),
            )
            .await?;

        // Payment rows are fetched newest-first per order.
        manager
            .create_index(
                Index::create()
                    .name("idx_payments_order_created")
                    .table(Payments::Table)
                    .col(Payments::OrderId)
                    .col((Payments::CreatedAt, IndexOrder::Desc))
                    .to_owned(),
            )
            .await?;

        // Coupon usage reversal looks up by order; the per-user cap counts
        // by coupon and user.
        manager
            .create_index(
                Index::create()
                    .name("idx_coupon_usages_order_id")
                    .table(CouponUsages::Table)
                    .col(CouponUsages::OrderId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_coupon_usages_coupon_user")
                    .table(CouponUsages::Table)
                    .col(CouponUsages::CouponId)
                    .col(CouponUsages::UserId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for name in [
            "idx_seats_trip_status",
            "idx_tickets_order_id",
            "idx_tickets_seat_id",
            "idx_orders_user_id",
            "idx_orders_guest_email",
            "idx_payments_order_created",
            "idx_coupon_usages_order_id",
            "idx_coupon_usages_coupon_user",
        ] {
            manager
                .drop_index(Index::drop().name(name).to_owned())
                .await?;
        }
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Seats {
    Table,
    TripId,
    Status,
}

#[derive(DeriveIden)]
enum Tickets {
    Table,
    OrderId,
    SeatId,
}

#[derive(DeriveIden)]
enum Orders {
    Table,
    UserId,
    GuestEmail,
}

#[derive(DeriveIden)]
enum Payments {
    Table,
    OrderId,
    CreatedAt,
}

#[derive(DeriveIden)]
enum CouponUsages {
    Table,
    OrderId,
    CouponId,
    UserId,
}
