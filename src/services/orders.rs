//! Read accessors over orders, for the API layer.

use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::order::{self, Entity as OrderEntity};
use crate::entities::ticket::{self, Entity as TicketEntity};
use crate::errors::ServiceError;

/// An order with its tickets.
#[derive(Debug, Serialize, Deserialize)]
pub struct OrderDetails {
    pub order: order::Model,
    pub tickets: Vec<ticket::Model>,
}

/// Service exposing order reads with pagination.
#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DbPool>,
}

impl OrderService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Retrieves an order and its tickets by id.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderDetails, ServiceError> {
        let db = &*self.db_pool;

        let order = OrderEntity::find_by_id(order_id)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let tickets = TicketEntity::find()
            .filter(ticket::Column::OrderId.eq(order_id))
            .order_by_asc(ticket::Column::Id)
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(OrderDetails { order, tickets })
    }

    /// Lists a user's orders, newest first.
    #[instrument(skip(self))]
    pub async fn list_orders_for_user(
        &self,
        user_id: Uuid,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<order::Model>, u64), ServiceError> {
        self.list(order::Column::UserId.eq(user_id), page, limit)
            .await
    }

    /// Lists a guest's orders by contact email, newest first.
    #[instrument(skip(self))]
    pub async fn list_orders_for_guest(
        &self,
        guest_email: &str,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<order::Model>, u64), ServiceError> {
        self.list(order::Column::GuestEmail.eq(guest_email), page, limit)
            .await
    }

    async fn list(
        &self,
        filter: sea_orm::sea_query::SimpleExpr,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<order::Model>, u64), ServiceError> {
        if page == 0 {
            return Err(ServiceError::ValidationError(
                "Page number must be greater than 0".to_string(),
            ));
        }
        if limit == 0 || limit > 1000 {
            return Err(ServiceError::ValidationError(
                "Limit must be between 1 and 1000".to_string(),
            ));
        }

        let db = &*self.db_pool;

        let paginator = OrderEntity::find()
            .filter(filter)
            .order_by_desc(order::Column::CreatedAt)
            .paginate(db, limit);

        let total = paginator
            .num_items()
            .await
            .map_err(ServiceError::db_error)?;

        let orders = paginator
            .fetch_page(page - 1)
            .await
            .map_err(ServiceError::db_error)?;

        Ok((orders, total))
    }
}
