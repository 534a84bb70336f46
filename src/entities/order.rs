use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub order_number: String,
    pub customer_id: Uuid,
    pub status: OrderStatus,
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub subtotal: Decimal,
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub delivery_fee: Decimal,
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub total: Decimal,
    #[sea_orm(column_type = "Text")]
    pub delivery_address: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub delivery_notes: Option<String>,
    pub contact_phone: Option<String>,
    pub delivery_person_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItems,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Lifecycle of an order from checkout to the customer's door
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    Display,
    EnumString,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum OrderStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "confirmed")]
    Confirmed,
    #[sea_orm(string_value = "preparing")]
    Preparing,
    #[sea_orm(string_value = "out_for_delivery")]
    OutForDelivery,
    #[sea_orm(string_value = "delivered")]
    Delivered,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl OrderStatus {
    /// Statuses reachable in one step from `self`
    pub fn next_statuses(self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            Pending => &[Confirmed, Cancelled],
            Confirmed => &[Preparing, Cancelled],
            Preparing => &[OutForDelivery],
            OutForDelivery => &[Delivered],
            Delivered | Cancelled => &[],
        }
    }

    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        self.next_statuses().contains(&next)
    }

    pub fn is_terminal(self) -> bool {
        self.next_statuses().is_empty()
    }

    /// Orders still moving through the kitchen or on the road
    pub fn active() -> [OrderStatus; 4] {
        [
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            OrderStatus::Preparing,
            OrderStatus::OutForDelivery,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(OrderStatus::Pending, OrderStatus::Confirmed, true)]
    #[case(OrderStatus::Pending, OrderStatus::Cancelled, true)]
    #[case(OrderStatus::Confirmed, OrderStatus::Preparing, true)]
    #[case(OrderStatus::Confirmed, OrderStatus::Cancelled, true)]
    #[case(OrderStatus::Preparing, OrderStatus::OutForDelivery, true)]
    #[case(OrderStatus::OutForDelivery, OrderStatus::Delivered, true)]
    #[case(OrderStatus::Pending, OrderStatus::Delivered, false)]
    #[case(OrderStatus::Preparing, OrderStatus::Cancelled, false)]
    #[case(OrderStatus::OutForDelivery, OrderStatus::Preparing, false)]
    #[case(OrderStatus::Delivered, OrderStatus::Pending, false)]
    #[case(OrderStatus::Cancelled, OrderStatus::Confirmed, false)]
    #[case(OrderStatus::Pending, OrderStatus::Pending, false)]
    fn transitions(#[case] from: OrderStatus, #[case] to: OrderStatus, #[case] allowed: bool) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn terminal_statuses() {
        assert!(OrderStatus::Delivered.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(!OrderStatus::Pending.is_terminal());
    }

    #[test]
    fn status_strings_are_snake_case() {
        assert_eq!(OrderStatus::OutForDelivery.to_string(), "out_for_delivery");
        assert_eq!(
            "out_for_delivery".parse::<OrderStatus>().unwrap(),
            OrderStatus::OutForDelivery
        );
    }
}
