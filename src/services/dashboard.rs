use crate::{
    entities::{activity_log, menu_item, order, user, OrderStatus, UserRole},
    errors::ServiceError,
    services::{
        activity::ActivityService,
        cart::{count_for, CartOwner},
        chat::ChatService,
    },
};
use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Select,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;

const ADMIN_RECENT_ACTIVITY: u64 = 10;
const CUSTOMER_RECENT_ORDERS: u64 = 5;

#[derive(Debug, Clone, Serialize)]
pub struct AdminDashboard {
    pub total_orders: u64,
    pub pending_orders: u64,
    pub orders_today: u64,
    pub revenue: Decimal,
    pub customers: u64,
    pub menu_items: u64,
    pub unread_messages: u64,
    pub recent_activity: Vec<activity_log::Model>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CustomerDashboard {
    pub total_orders: u64,
    pub active_orders: u64,
    pub total_spent: Decimal,
    pub recent_orders: Vec<order::Model>,
    pub cart_count: i64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DeliveryDashboard {
    pub active_orders: u64,
    pub completed_today: u64,
    pub completed_total: u64,
}

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct ReferralStats {
    pub referrals: u64,
    pub conversions: u64,
    pub earnings: Decimal,
}

/// Ambassador programme is not backed by any tables yet
#[derive(Debug, Clone, Serialize)]
pub struct AmbassadorDashboard {
    pub profile: user::Model,
    pub referral_stats: ReferralStats,
    pub program_active: bool,
}

fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.from_utc_datetime(&now.date_naive().and_time(NaiveTime::MIN))
}

#[derive(Clone)]
pub struct DashboardService {
    db: Arc<DatabaseConnection>,
    activity: Arc<ActivityService>,
    chat: Arc<ChatService>,
}

impl DashboardService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        activity: Arc<ActivityService>,
        chat: Arc<ChatService>,
    ) -> Self {
        Self { db, activity, chat }
    }

    #[instrument(skip(self))]
    pub async fn admin(&self) -> Result<AdminDashboard, ServiceError> {
        let today = start_of_day(Utc::now());
        let db = &*self.db;

        let total_orders = order::Entity::find().count(db).await?;
        let pending_orders = order::Entity::find()
            .filter(order::Column::Status.eq(OrderStatus::Pending))
            .count(db)
            .await?;
        let orders_today = order::Entity::find()
            .filter(order::Column::CreatedAt.gte(today))
            .count(db)
            .await?;
        let revenue = self.sum_totals(order::Entity::find()).await?;
        let customers = user::Entity::find()
            .filter(user::Column::Role.eq(UserRole::Customer))
            .count(db)
            .await?;
        let menu_items = menu_item::Entity::find().count(db).await?;
        let unread_messages = self.chat.unread_for_support().await?;
        let recent_activity = self.activity.recent(ADMIN_RECENT_ACTIVITY).await?;

        Ok(AdminDashboard {
            total_orders,
            pending_orders,
            orders_today,
            revenue,
            customers,
            menu_items,
            unread_messages,
            recent_activity,
        })
    }

    #[instrument(skip(self))]
    pub async fn customer(&self, customer_id: Uuid) -> Result<CustomerDashboard, ServiceError> {
        let db = &*self.db;
        let own = || order::Entity::find().filter(order::Column::CustomerId.eq(customer_id));

        let total_orders = own().count(db).await?;
        let active_orders = own()
            .filter(order::Column::Status.is_in(OrderStatus::active()))
            .count(db)
            .await?;
        let total_spent = self.sum_totals(own()).await?;
        let recent_orders = own()
            .order_by_desc(order::Column::CreatedAt)
            .limit(CUSTOMER_RECENT_ORDERS)
            .all(db)
            .await?;
        let cart_count = count_for(db, &CartOwner::User(customer_id)).await?;

        Ok(CustomerDashboard {
            total_orders,
            active_orders,
            total_spent,
            recent_orders,
            cart_count,
        })
    }

    #[instrument(skip(self))]
    pub async fn delivery(&self, delivery_person_id: Uuid) -> Result<DeliveryDashboard, ServiceError> {
        let db = &*self.db;
        let today = start_of_day(Utc::now());
        let assigned =
            || order::Entity::find().filter(order::Column::DeliveryPersonId.eq(delivery_person_id));

        let active_orders = assigned()
            .filter(order::Column::Status.is_in(OrderStatus::active()))
            .count(db)
            .await?;
        let completed_today = assigned()
            .filter(order::Column::Status.eq(OrderStatus::Delivered))
            .filter(order::Column::DeliveredAt.gte(today))
            .count(db)
            .await?;
        let completed_total = assigned()
            .filter(order::Column::Status.eq(OrderStatus::Delivered))
            .count(db)
            .await?;

        Ok(DeliveryDashboard {
            active_orders,
            completed_today,
            completed_total,
        })
    }

    pub async fn ambassador(&self, user_id: Uuid) -> Result<AmbassadorDashboard, ServiceError> {
        let profile = user::Entity::find_by_id(user_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("User", user_id))?;
        Ok(AmbassadorDashboard {
            profile,
            referral_stats: ReferralStats::default(),
            program_active: false,
        })
    }

    /// Sum of order totals excluding cancelled orders.
    ///
    /// Postgres sums `numeric` exactly in the query. SQLite stores decimals without an
    /// exact aggregate, so there the totals are loaded and added up in Rust, which reads
    /// one row per matching order.
    async fn sum_totals(&self, orders: Select<order::Entity>) -> Result<Decimal, ServiceError> {
        let orders = orders
            .filter(order::Column::Status.ne(OrderStatus::Cancelled))
            .select_only();

        let total = match self.db.get_database_backend() {
            DbBackend::Postgres => orders
                .column_as(Expr::col(order::Column::Total).sum(), "total")
                .into_tuple::<Option<Decimal>>()
                .one(&*self.db)
                .await?
                .flatten()
                .unwrap_or_default(),
            _ => orders
                .column(order::Column::Total)
                .into_tuple::<Decimal>()
                .all(&*self.db)
                .await?
                .into_iter()
                .sum::<Decimal>(),
        };
        Ok(total.round_dp(2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_starts_at_midnight_utc() {
        let now = Utc.with_ymd_and_hms(2024, 5, 17, 18, 42, 7).unwrap();
        assert_eq!(start_of_day(now), Utc.with_ymd_and_hms(2024, 5, 17, 0, 0, 0).unwrap());
    }
}
