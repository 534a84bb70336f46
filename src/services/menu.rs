use crate::{
    common::{fetch_page, not_blank, Page},
    entities::{cart_item, menu_item},
    errors::ServiceError,
    services::activity::{ActivityEntry, ActivityService, ActivityType},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::{Validate, ValidationError};

fn validate_price(price: &Decimal) -> Result<(), ValidationError> {
    if price.is_sign_negative() || price.is_zero() {
        return Err(ValidationError::new("price_must_be_positive"));
    }
    if price.normalize().scale() > 2 {
        return Err(ValidationError::new("price_too_precise"));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct MenuItemInput {
    #[validate(length(min = 1, max = 120), custom = "not_blank")]
    pub name: String,
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub description: String,
    #[validate(length(min = 1, max = 60), custom = "not_blank")]
    pub category: String,
    #[validate(custom = "validate_price")]
    pub price: Decimal,
    #[validate(url)]
    pub image_url: Option<String>,
    #[serde(default = "default_available")]
    pub is_available: bool,
}

fn default_available() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct MenuItemUpdate {
    #[validate(length(min = 1, max = 120), custom = "not_blank")]
    pub name: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(length(min = 1, max = 60), custom = "not_blank")]
    pub category: Option<String>,
    #[validate(custom = "validate_price")]
    pub price: Option<Decimal>,
    #[validate(url)]
    pub image_url: Option<String>,
    pub is_available: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MenuFilter {
    pub category: Option<String>,
    pub search: Option<String>,
}

#[derive(Clone)]
pub struct MenuService {
    db: Arc<DatabaseConnection>,
    activity: Arc<ActivityService>,
}

impl MenuService {
    pub fn new(db: Arc<DatabaseConnection>, activity: Arc<ActivityService>) -> Self {
        Self { db, activity }
    }

    /// Storefront listing. Admin listings pass `only_available = false`.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        filter: MenuFilter,
        only_available: bool,
        page: u64,
        per_page: u64,
    ) -> Result<Page<menu_item::Model>, ServiceError> {
        let mut query = menu_item::Entity::find();
        if only_available {
            query = query.filter(menu_item::Column::IsAvailable.eq(true));
        }
        if let Some(category) = filter.category.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            query = query.filter(menu_item::Column::Category.eq(category));
        }
        if let Some(term) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            query = query.filter(
                Condition::any()
                    .add(menu_item::Column::Name.contains(term))
                    .add(menu_item::Column::Description.contains(term)),
            );
        }
        let query = query
            .order_by_asc(menu_item::Column::Category)
            .order_by_asc(menu_item::Column::Name);

        Ok(fetch_page(&*self.db, query, page, per_page).await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<menu_item::Model, ServiceError> {
        menu_item::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Menu item", id))
    }

    /// Public lookup; unavailable items are hidden
    pub async fn get_available(&self, id: Uuid) -> Result<menu_item::Model, ServiceError> {
        let item = self.get(id).await?;
        if !item.is_available {
            return Err(ServiceError::not_found("Menu item", id));
        }
        Ok(item)
    }

    /// Distinct categories of available items, alphabetical
    pub async fn categories(&self) -> Result<Vec<String>, ServiceError> {
        let categories = menu_item::Entity::find()
            .select_only()
            .column(menu_item::Column::Category)
            .distinct()
            .filter(menu_item::Column::IsAvailable.eq(true))
            .order_by_asc(menu_item::Column::Category)
            .into_tuple::<String>()
            .all(&*self.db)
            .await?;
        Ok(categories)
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create(
        &self,
        input: MenuItemInput,
        actor: Uuid,
    ) -> Result<menu_item::Model, ServiceError> {
        input.validate()?;
        let now = Utc::now();
        let item = menu_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name.trim().to_string()),
            description: Set(input.description.trim().to_string()),
            category: Set(input.category.trim().to_string()),
            price: Set(input.price.round_dp(2)),
            image_url: Set(input.image_url),
            is_available: Set(input.is_available),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        info!(menu_item_id = %item.id, "created menu item");
        self.activity
            .record(
                ActivityEntry::new(
                    ActivityType::Menu,
                    "menu_item_created",
                    format!("Menu item '{}' added at {}", item.name, item.price),
                )
                .entity("menu_item", item.id)
                .actor(actor),
            )
            .await;
        Ok(item)
    }

    #[instrument(skip(self, update))]
    pub async fn update(
        &self,
        id: Uuid,
        update: MenuItemUpdate,
        actor: Uuid,
    ) -> Result<menu_item::Model, ServiceError> {
        update.validate()?;
        let item = self.get(id).await?;
        let mut active: menu_item::ActiveModel = item.into();

        if let Some(name) = update.name {
            active.name = Set(name.trim().to_string());
        }
        if let Some(description) = update.description {
            active.description = Set(description.trim().to_string());
        }
        if let Some(category) = update.category {
            active.category = Set(category.trim().to_string());
        }
        if let Some(price) = update.price {
            active.price = Set(price.round_dp(2));
        }
        if let Some(image_url) = update.image_url {
            active.image_url = Set(Some(image_url).filter(|u| !u.is_empty()));
        }
        if let Some(is_available) = update.is_available {
            active.is_available = Set(is_available);
        }
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        self.activity
            .record(
                ActivityEntry::new(
                    ActivityType::Menu,
                    "menu_item_updated",
                    format!("Menu item '{}' updated", updated.name),
                )
                .entity("menu_item", id)
                .actor(actor),
            )
            .await;
        Ok(updated)
    }

    pub async fn set_availability(
        &self,
        id: Uuid,
        is_available: bool,
        actor: Uuid,
    ) -> Result<menu_item::Model, ServiceError> {
        self.update(
            id,
            MenuItemUpdate {
                is_available: Some(is_available),
                ..Default::default()
            },
            actor,
        )
        .await
    }

    /// Removes the item together with any cart lines pointing at it.
    /// Past order lines keep their snapshot.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid, actor: Uuid) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;
        let item = menu_item::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Menu item", id))?;

        let removed_lines = cart_item::Entity::delete_many()
            .filter(cart_item::Column::MenuItemId.eq(id))
            .exec(&txn)
            .await?;
        menu_item::Entity::delete_by_id(id).exec(&txn).await?;
        txn.commit().await?;

        info!(menu_item_id = %id, cart_lines = removed_lines.rows_affected, "deleted menu item");
        self.activity
            .record(
                ActivityEntry::new(
                    ActivityType::Menu,
                    "menu_item_deleted",
                    format!("Menu item '{}' deleted", item.name),
                )
                .entity("menu_item", id)
                .actor(actor),
            )
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    #[rstest]
    #[case(dec!(9.99), true)]
    #[case(dec!(12), true)]
    #[case(dec!(12.50), true)]
    #[case(dec!(0), false)]
    #[case(dec!(-1.00), false)]
    #[case(dec!(3.999), false)]
    fn price_rules(#[case] price: Decimal, #[case] ok: bool) {
        assert_eq!(validate_price(&price).is_ok(), ok);
    }

    #[test]
    fn blank_name_is_rejected() {
        let input = MenuItemInput {
            name: String::new(),
            description: String::new(),
            category: "Mains".into(),
            price: dec!(8.50),
            image_url: None,
            is_available: true,
        };
        assert!(input.validate().is_err());
    }
}
