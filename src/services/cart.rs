use crate::{
    entities::{cart_item, menu_item},
    errors::ServiceError,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Expr, Func, SimpleExpr},
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

/// Upper bound on the quantity of a single cart line
pub const MAX_LINE_QUANTITY: i32 = 99;

/// Whose cart an operation targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartOwner {
    User(Uuid),
    Guest(String),
}

impl CartOwner {
    /// Wraps a guest session token after checking its shape
    pub fn guest(token: &str) -> Result<Self, ServiceError> {
        let token = token.trim();
        let valid_len = (8..=128).contains(&token.len());
        let valid_chars = token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid_len || !valid_chars {
            return Err(ServiceError::ValidationError(
                "Cart session token must be 8-128 characters of letters, digits, '-' or '_'"
                    .to_string(),
            ));
        }
        Ok(CartOwner::Guest(token.to_string()))
    }

    fn condition(&self) -> Condition {
        match self {
            CartOwner::User(id) => Condition::all().add(cart_item::Column::UserId.eq(*id)),
            CartOwner::Guest(token) => Condition::all()
                .add(cart_item::Column::SessionToken.eq(token.as_str()))
                .add(cart_item::Column::UserId.is_null()),
        }
    }
}

/// Cart line joined with the current menu row
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CartLine {
    pub id: Uuid,
    pub menu_item_id: Uuid,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub line_total: Decimal,
    pub is_available: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CartView {
    pub lines: Vec<CartLine>,
    pub item_count: i64,
    pub subtotal: Decimal,
}

/// Total quantity across the owner's cart lines, 0 when empty
pub(crate) async fn count_for<C: ConnectionTrait>(db: &C, owner: &CartOwner) -> Result<i64, ServiceError> {
    let total = cart_item::Entity::find()
        .select_only()
        .column_as(
            SimpleExpr::from(Func::coalesce([
                Func::sum(Expr::col(cart_item::Column::Quantity)).into(),
                Expr::val(0).into(),
            ])),
            "item_count",
        )
        .filter(owner.condition())
        .into_tuple::<i64>()
        .one(db)
        .await?;
    Ok(total.unwrap_or(0))
}

/// Lines of the owner's cart with their menu rows, oldest line first
pub(crate) async fn lines_for<C: ConnectionTrait>(
    db: &C,
    owner: &CartOwner,
) -> Result<Vec<(cart_item::Model, menu_item::Model)>, ServiceError> {
    let rows = cart_item::Entity::find()
        .find_also_related(menu_item::Entity)
        .filter(owner.condition())
        .order_by_asc(cart_item::Column::CreatedAt)
        .order_by_asc(cart_item::Column::Id)
        .all(db)
        .await?;
    Ok(rows
        .into_iter()
        .filter_map(|(line, item)| item.map(|item| (line, item)))
        .collect())
}

#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Adds `quantity` of a menu item, topping up an existing line
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        owner: &CartOwner,
        menu_item_id: Uuid,
        quantity: i32,
    ) -> Result<cart_item::Model, ServiceError> {
        if quantity < 1 {
            return Err(ServiceError::ValidationError(
                "quantity must be at least 1".to_string(),
            ));
        }
        let item = menu_item::Entity::find_by_id(menu_item_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Menu item", menu_item_id))?;
        if !item.is_available {
            return Err(ServiceError::InvalidOperation(format!(
                "'{}' is currently unavailable",
                item.name
            )));
        }

        let now = Utc::now();
        let existing = cart_item::Entity::find()
            .filter(owner.condition())
            .filter(cart_item::Column::MenuItemId.eq(menu_item_id))
            .one(&*self.db)
            .await?;

        let line = match existing {
            Some(line) => {
                let new_quantity = line.quantity.saturating_add(quantity).min(MAX_LINE_QUANTITY);
                let mut active: cart_item::ActiveModel = line.into();
                active.quantity = Set(new_quantity);
                active.updated_at = Set(now);
                active.update(&*self.db).await?
            }
            None => {
                let (user_id, session_token) = match owner {
                    CartOwner::User(id) => (Some(*id), None),
                    CartOwner::Guest(token) => (None, Some(token.clone())),
                };
                cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    user_id: Set(user_id),
                    session_token: Set(session_token),
                    menu_item_id: Set(menu_item_id),
                    quantity: Set(quantity.min(MAX_LINE_QUANTITY)),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&*self.db)
                .await?
            }
        };

        debug!(line_id = %line.id, quantity = line.quantity, "cart line saved");
        Ok(line)
    }

    /// Sets a line's quantity; zero or less removes the line and returns `None`
    #[instrument(skip(self))]
    pub async fn update_quantity(
        &self,
        owner: &CartOwner,
        line_id: Uuid,
        quantity: i32,
    ) -> Result<Option<cart_item::Model>, ServiceError> {
        let line = self.owned_line(owner, line_id).await?;
        if quantity <= 0 {
            cart_item::Entity::delete_by_id(line.id).exec(&*self.db).await?;
            return Ok(None);
        }
        let mut active: cart_item::ActiveModel = line.into();
        active.quantity = Set(quantity.min(MAX_LINE_QUANTITY));
        active.updated_at = Set(Utc::now());
        Ok(Some(active.update(&*self.db).await?))
    }

    pub async fn remove_item(&self, owner: &CartOwner, line_id: Uuid) -> Result<(), ServiceError> {
        let line = self.owned_line(owner, line_id).await?;
        cart_item::Entity::delete_by_id(line.id).exec(&*self.db).await?;
        Ok(())
    }

    /// Empties the cart, returning how many lines were removed
    pub async fn clear(&self, owner: &CartOwner) -> Result<u64, ServiceError> {
        let result = cart_item::Entity::delete_many()
            .filter(owner.condition())
            .exec(&*self.db)
            .await?;
        Ok(result.rows_affected)
    }

    pub async fn count(&self, owner: &CartOwner) -> Result<i64, ServiceError> {
        count_for(&*self.db, owner).await
    }

    /// Lines priced at the current menu price. Unavailable items stay listed but are not summed.
    #[instrument(skip(self))]
    pub async fn view(&self, owner: &CartOwner) -> Result<CartView, ServiceError> {
        let rows = lines_for(&*self.db, owner).await?;

        let mut subtotal = Decimal::ZERO;
        let mut item_count = 0i64;
        let lines = rows
            .into_iter()
            .map(|(line, item)| {
                let line_total = item.price * Decimal::from(line.quantity);
                if item.is_available {
                    subtotal += line_total;
                }
                item_count += i64::from(line.quantity);
                CartLine {
                    id: line.id,
                    menu_item_id: item.id,
                    name: item.name,
                    unit_price: item.price,
                    quantity: line.quantity,
                    line_total,
                    is_available: item.is_available,
                }
            })
            .collect();

        Ok(CartView {
            lines,
            item_count,
            subtotal: subtotal.round_dp(2),
        })
    }

    /// Moves a guest cart onto a user's cart after sign-in.
    /// Lines for the same menu item are combined, capped at the line maximum.
    #[instrument(skip(self, token))]
    pub async fn merge_guest_into_user(&self, token: &str, user_id: Uuid) -> Result<u64, ServiceError> {
        let guest = CartOwner::guest(token)?;
        let user = CartOwner::User(user_id);
        let now = Utc::now();

        let txn = self.db.begin().await?;
        let guest_lines = cart_item::Entity::find()
            .filter(guest.condition())
            .all(&txn)
            .await?;
        if guest_lines.is_empty() {
            return Ok(0);
        }

        let mut merged = 0u64;
        for line in guest_lines {
            let existing = cart_item::Entity::find()
                .filter(user.condition())
                .filter(cart_item::Column::MenuItemId.eq(line.menu_item_id))
                .one(&txn)
                .await?;
            match existing {
                Some(target) => {
                    let quantity = target.quantity.saturating_add(line.quantity).min(MAX_LINE_QUANTITY);
                    let mut active: cart_item::ActiveModel = target.into();
                    active.quantity = Set(quantity);
                    active.updated_at = Set(now);
                    active.update(&txn).await?;
                    cart_item::Entity::delete_by_id(line.id).exec(&txn).await?;
                }
                None => {
                    let mut active: cart_item::ActiveModel = line.into();
                    active.user_id = Set(Some(user_id));
                    active.session_token = Set(None);
                    active.updated_at = Set(now);
                    active.update(&txn).await?;
                }
            }
            merged += 1;
        }
        txn.commit().await?;

        info!(%user_id, lines = merged, "merged guest cart");
        Ok(merged)
    }

    async fn owned_line(&self, owner: &CartOwner, line_id: Uuid) -> Result<cart_item::Model, ServiceError> {
        cart_item::Entity::find_by_id(line_id)
            .filter(owner.condition())
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Cart item", line_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("guest-session-01", true)]
    #[case("abc_DEF_123", true)]
    #[case("short", false)]
    #[case("has space in it", false)]
    #[case("semi;colon;token", false)]
    fn guest_tokens(#[case] token: &str, #[case] ok: bool) {
        assert_eq!(CartOwner::guest(token).is_ok(), ok);
    }

    #[test]
    fn overlong_guest_token_is_rejected() {
        assert!(CartOwner::guest(&"a".repeat(129)).is_err());
        assert!(CartOwner::guest(&"a".repeat(128)).is_ok());
    }
}
