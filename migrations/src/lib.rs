pub use sea_orm_migration::prelude::*;

mod m20250301_000001_create_routes_tables;
mod m20250301_000002_create_trips_table;
mod m20250301_000003_create_seats_table;
mod m20250301_000004_create_orders_table;
mod m20250301_000005_create_tickets_table;
mod m20250301_000006_create_coupons_tables;
mod m20250301_000007_create_payments_table;
mod m20250301_000008_add_booking_indexes;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_000001_create_routes_tables::Migration),
            Box::new(m20250301_000002_create_trips_table::Migration),
            Box::new(m20250301_000003_create_seats_table::Migration),
            Box::new(m20250301_000004_create_orders_table::Migration),
            Box::new(m20250301_000005_create_tickets_table::Migration),
            Box::new(m20250301_000006_create_coupons_tables::Migration),
            Box::new(m20250301_000007_create_payments_table::Migration),
            Box::new(m20250301_000008_add_booking_indexes::Migration),
        ]
    }
}
