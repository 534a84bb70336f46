use crate::{
    common::{fetch_page, Page},
    config::AppConfig,
    entities::{cart_item, order, order_item, user, OrderStatus, UserRole},
    errors::ServiceError,
    services::{
        activity::{ActivityEntry, ActivityService, ActivityType},
        cart::{lines_for, CartOwner},
    },
};
use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

const ORDER_NUMBER_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const ORDER_NUMBER_ATTEMPTS: usize = 5;

/// Delivery fee rules applied at checkout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderPricing {
    pub delivery_fee: Decimal,
    pub free_delivery_threshold: Decimal,
}

impl OrderPricing {
    pub fn new(delivery_fee: Decimal, free_delivery_threshold: Decimal) -> Self {
        Self {
            delivery_fee,
            free_delivery_threshold,
        }
    }

    /// Fee for a given subtotal: nothing for an empty subtotal, waived at or above the threshold
    pub fn fee_for(&self, subtotal: Decimal) -> Decimal {
        if subtotal <= Decimal::ZERO || subtotal >= self.free_delivery_threshold {
            Decimal::ZERO
        } else {
            self.delivery_fee
        }
    }

    /// Returns `(delivery_fee, total)`
    pub fn quote(&self, subtotal: Decimal) -> (Decimal, Decimal) {
        let fee = self.fee_for(subtotal).round_dp(2);
        (fee, (subtotal + fee).round_dp(2))
    }
}

impl From<&AppConfig> for OrderPricing {
    fn from(config: &AppConfig) -> Self {
        Self::new(config.delivery_fee, config.free_delivery_threshold)
    }
}

/// `MOW-YYYYMMDD-XXXXXX`
pub fn generate_order_number(now: DateTime<Utc>) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..6)
        .map(|_| ORDER_NUMBER_CHARSET[rng.gen_range(0..ORDER_NUMBER_CHARSET.len())] as char)
        .collect();
    format!("MOW-{}-{}", now.format("%Y%m%d"), suffix)
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct CheckoutDetails {
    /// Falls back to the address on the customer's profile
    #[validate(length(min = 1, max = 500))]
    pub delivery_address: Option<String>,
    #[validate(length(max = 1000))]
    pub delivery_notes: Option<String>,
    #[validate(length(max = 40))]
    pub contact_phone: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    /// Matches part of the order number
    pub search: Option<String>,
}

/// An order with its line snapshots
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
}

#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    activity: Arc<ActivityService>,
    pricing: OrderPricing,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        activity: Arc<ActivityService>,
        pricing: OrderPricing,
    ) -> Self {
        Self {
            db,
            activity,
            pricing,
        }
    }

    pub fn pricing(&self) -> OrderPricing {
        self.pricing
    }

    /// Turns the customer's cart into an order and empties the cart
    #[instrument(skip(self, details))]
    pub async fn checkout(
        &self,
        customer_id: Uuid,
        details: CheckoutDetails,
    ) -> Result<OrderDetails, ServiceError> {
        details.validate()?;
        let owner = CartOwner::User(customer_id);

        let txn = self.db.begin().await?;
        let customer = user::Entity::find_by_id(customer_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("User", customer_id))?;

        let non_blank = |a: &Option<String>| {
            a.as_deref().map(str::trim).filter(|a| !a.is_empty()).map(str::to_string)
        };
        let delivery_address = non_blank(&details.delivery_address)
            .or_else(|| non_blank(&customer.address))
            .ok_or_else(|| {
                ServiceError::ValidationError("A delivery address is required".to_string())
            })?;

        let lines = lines_for(&txn, &owner).await?;
        if lines.is_empty() {
            return Err(ServiceError::InvalidOperation("Cart is empty".to_string()));
        }
        let unavailable: Vec<&str> = lines
            .iter()
            .filter(|(_, item)| !item.is_available)
            .map(|(_, item)| item.name.as_str())
            .collect();
        if !unavailable.is_empty() {
            return Err(ServiceError::InvalidOperation(format!(
                "Some items are no longer available: {}",
                unavailable.join(", ")
            )));
        }

        let subtotal = lines
            .iter()
            .map(|(line, item)| item.price * Decimal::from(line.quantity))
            .sum::<Decimal>()
            .round_dp(2);
        let (delivery_fee, total) = self.pricing.quote(subtotal);

        let now = Utc::now();
        let order_number = unused_order_number(&txn, now).await?;
        let order_id = Uuid::new_v4();

        let created = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(order_number),
            customer_id: Set(customer_id),
            status: Set(OrderStatus::Pending),
            subtotal: Set(subtotal),
            delivery_fee: Set(delivery_fee),
            total: Set(total),
            delivery_address: Set(delivery_address),
            delivery_notes: Set(details.delivery_notes.filter(|n| !n.trim().is_empty())),
            contact_phone: Set(details.contact_phone.or(customer.phone)),
            delivery_person_id: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            delivered_at: Set(None),
        }
        .insert(&txn)
        .await?;

        let mut items = Vec::with_capacity(lines.len());
        for (line, item) in &lines {
            let snapshot = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                menu_item_id: Set(Some(item.id)),
                name: Set(item.name.clone()),
                unit_price: Set(item.price),
                quantity: Set(line.quantity),
                line_total: Set((item.price * Decimal::from(line.quantity)).round_dp(2)),
            }
            .insert(&txn)
            .await?;
            items.push(snapshot);
        }

        cart_item::Entity::delete_many()
            .filter(cart_item::Column::UserId.eq(customer_id))
            .exec(&txn)
            .await?;
        txn.commit().await?;

        metrics::counter!("meals.orders.created", 1);
        info!(order_id = %created.id, order_number = %created.order_number, total = %created.total, "order placed");
        self.activity
            .record(
                ActivityEntry::new(
                    ActivityType::Order,
                    "order_created",
                    format!(
                        "Order {} placed by {} for {}",
                        created.order_number, customer.name, created.total
                    ),
                )
                .entity("order", created.id)
                .actor(customer_id),
            )
            .await;

        Ok(OrderDetails {
            order: created,
            items,
        })
    }

    // ---- customer ----

    pub async fn list_for_customer(
        &self,
        customer_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<Page<order::Model>, ServiceError> {
        let query = order::Entity::find()
            .filter(order::Column::CustomerId.eq(customer_id))
            .order_by_desc(order::Column::CreatedAt);
        Ok(fetch_page(&*self.db, query, page, per_page).await?)
    }

    /// Orders of other customers are reported as missing
    pub async fn get_for_customer(
        &self,
        customer_id: Uuid,
        order_id: Uuid,
    ) -> Result<OrderDetails, ServiceError> {
        let details = self.get(order_id).await?;
        if details.order.customer_id != customer_id {
            return Err(ServiceError::not_found("Order", order_id));
        }
        Ok(details)
    }

    #[instrument(skip(self))]
    pub async fn cancel_by_customer(
        &self,
        customer_id: Uuid,
        order_id: Uuid,
    ) -> Result<order::Model, ServiceError> {
        let details = self.get_for_customer(customer_id, order_id).await?;
        if details.order.status != OrderStatus::Pending {
            return Err(ServiceError::InvalidStatus(format!(
                "Only pending orders can be cancelled; order is {}",
                details.order.status
            )));
        }
        self.transition(details.order, OrderStatus::Cancelled, customer_id, ActivityType::Order)
            .await
    }

    // ---- admin ----

    #[instrument(skip(self))]
    pub async fn list(
        &self,
        filter: OrderFilter,
        page: u64,
        per_page: u64,
    ) -> Result<Page<order::Model>, ServiceError> {
        let mut query = order::Entity::find();
        if let Some(status) = filter.status {
            query = query.filter(order::Column::Status.eq(status));
        }
        if let Some(term) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            query = query.filter(order::Column::OrderNumber.contains(term.to_uppercase()));
        }
        let query = query.order_by_desc(order::Column::CreatedAt);
        Ok(fetch_page(&*self.db, query, page, per_page).await?)
    }

    pub async fn get(&self, order_id: Uuid) -> Result<OrderDetails, ServiceError> {
        let order = order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Order", order_id))?;
        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .order_by_asc(order_item::Column::Name)
            .all(&*self.db)
            .await?;
        Ok(OrderDetails { order, items })
    }

    pub async fn update_status(
        &self,
        order_id: Uuid,
        status: OrderStatus,
        actor: Uuid,
    ) -> Result<order::Model, ServiceError> {
        let current = self.get(order_id).await?.order;
        self.transition(current, status, actor, ActivityType::Order).await
    }

    /// Assigns an active delivery driver to an order that is still in progress
    #[instrument(skip(self))]
    pub async fn assign_delivery(
        &self,
        order_id: Uuid,
        delivery_person_id: Uuid,
        actor: Uuid,
    ) -> Result<order::Model, ServiceError> {
        let current = self.get(order_id).await?.order;
        if current.status.is_terminal() {
            return Err(ServiceError::InvalidStatus(format!(
                "Cannot assign a driver to a {} order",
                current.status
            )));
        }
        let driver = user::Entity::find_by_id(delivery_person_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("User", delivery_person_id))?;
        if driver.role != UserRole::Delivery || !driver.is_active {
            return Err(ServiceError::ValidationError(format!(
                "{} is not an active delivery driver",
                driver.name
            )));
        }

        let mut active: order::ActiveModel = current.into();
        active.delivery_person_id = Set(Some(driver.id));
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        self.activity
            .record(
                ActivityEntry::new(
                    ActivityType::Delivery,
                    "order_assigned",
                    format!("Order {} assigned to {}", updated.order_number, driver.name),
                )
                .entity("order", updated.id)
                .actor(actor),
            )
            .await;
        Ok(updated)
    }

    // ---- delivery ----

    /// Active orders assigned to the driver, oldest first
    pub async fn list_assigned(
        &self,
        delivery_person_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<Page<order::Model>, ServiceError> {
        let query = order::Entity::find()
            .filter(order::Column::DeliveryPersonId.eq(delivery_person_id))
            .filter(order::Column::Status.is_in(OrderStatus::active()))
            .order_by_asc(order::Column::CreatedAt);
        Ok(fetch_page(&*self.db, query, page, per_page).await?)
    }

    pub async fn start_delivery(
        &self,
        delivery_person_id: Uuid,
        order_id: Uuid,
    ) -> Result<order::Model, ServiceError> {
        let current = self.assigned_order(delivery_person_id, order_id).await?;
        self.transition(
            current,
            OrderStatus::OutForDelivery,
            delivery_person_id,
            ActivityType::Delivery,
        )
        .await
    }

    pub async fn complete_delivery(
        &self,
        delivery_person_id: Uuid,
        order_id: Uuid,
    ) -> Result<order::Model, ServiceError> {
        let current = self.assigned_order(delivery_person_id, order_id).await?;
        self.transition(
            current,
            OrderStatus::Delivered,
            delivery_person_id,
            ActivityType::Delivery,
        )
        .await
    }

    async fn assigned_order(
        &self,
        delivery_person_id: Uuid,
        order_id: Uuid,
    ) -> Result<order::Model, ServiceError> {
        let current = self.get(order_id).await?.order;
        if current.delivery_person_id != Some(delivery_person_id) {
            return Err(ServiceError::not_found("Order", order_id));
        }
        Ok(current)
    }

    /// Moves an order to `next` if the transition is legal.
    /// The update is guarded on the status read so two concurrent moves cannot both apply.
    #[instrument(skip(self, current), fields(order_id = %current.id, from = %current.status, to = %next))]
    async fn transition(
        &self,
        current: order::Model,
        next: OrderStatus,
        actor: Uuid,
        activity_type: ActivityType,
    ) -> Result<order::Model, ServiceError> {
        if !current.status.can_transition_to(next) {
            return Err(ServiceError::InvalidStatus(format!(
                "Cannot move order from {} to {}",
                current.status, next
            )));
        }

        let now = Utc::now();
        let mut update = order::Entity::update_many()
            .col_expr(order::Column::Status, Expr::value(next))
            .col_expr(order::Column::UpdatedAt, Expr::value(now));
        if next == OrderStatus::Delivered {
            update = update.col_expr(order::Column::DeliveredAt, Expr::value(Some(now)));
        }
        let result = update
            .filter(order::Column::Id.eq(current.id))
            .filter(order::Column::Status.eq(current.status))
            .exec(&*self.db)
            .await?;
        if result.rows_affected != 1 {
            warn!("order status changed concurrently");
            return Err(ServiceError::Conflict(
                "Order status was changed by another request".to_string(),
            ));
        }

        let updated = order::Entity::find_by_id(current.id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Order", current.id))?;

        self.activity
            .record(
                ActivityEntry::new(
                    activity_type,
                    format!("order_{}", next),
                    format!(
                        "Order {} moved from {} to {}",
                        updated.order_number, current.status, next
                    ),
                )
                .entity("order", updated.id)
                .actor(actor),
            )
            .await;
        Ok(updated)
    }
}

/// Draws order numbers until one is free
async fn unused_order_number<C: ConnectionTrait>(
    db: &C,
    now: DateTime<Utc>,
) -> Result<String, ServiceError> {
    for _ in 0..ORDER_NUMBER_ATTEMPTS {
        let candidate = generate_order_number(now);
        let taken = order::Entity::find()
            .filter(order::Column::OrderNumber.eq(candidate.as_str()))
            .count(db)
            .await?;
        if taken == 0 {
            return Ok(candidate);
        }
    }
    Err(ServiceError::InternalError(
        "Could not allocate a unique order number".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    fn pricing() -> OrderPricing {
        OrderPricing::new(dec!(5.00), dec!(50.00))
    }

    #[rstest]
    #[case(dec!(0), dec!(0), dec!(0))]
    #[case(dec!(12.50), dec!(5.00), dec!(17.50))]
    #[case(dec!(49.99), dec!(5.00), dec!(54.99))]
    #[case(dec!(50.00), dec!(0), dec!(50.00))]
    #[case(dec!(120.25), dec!(0), dec!(120.25))]
    fn delivery_fee_rules(
        #[case] subtotal: Decimal,
        #[case] fee: Decimal,
        #[case] total: Decimal,
    ) {
        assert_eq!(pricing().quote(subtotal), (fee, total));
    }

    #[test]
    fn order_numbers_have_expected_shape() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap();
        let number = generate_order_number(now);

        assert_eq!(number.len(), "MOW-20240309-XXXXXX".len());
        assert!(number.starts_with("MOW-20240309-"));
        assert!(number[13..]
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn checkout_details_reject_long_phone() {
        let details = CheckoutDetails {
            contact_phone: Some("1".repeat(41)),
            ..Default::default()
        };
        assert!(details.validate().is_err());
    }
}
