use crate::{
    auth::password,
    common::{fetch_page, Page},
    entities::{
        blog_comment, blog_like, blog_post, cart_item, customer_message, order, password_reset,
        user, UserRole,
    },
    errors::ServiceError,
    services::{
        accounts::{duplicate_email, normalize_email},
        activity::{ActivityEntry, ActivityService, ActivityType},
        blog::recount_post,
    },
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserFilter {
    pub role: Option<UserRole>,
    pub search: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminUserUpdate {
    pub role: Option<UserRole>,
    pub is_active: Option<bool>,
}

/// Input for accounts created by staff or the CLI, where the role is chosen explicitly
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: UserRole,
}

/// Back office user management
#[derive(Clone)]
pub struct UserService {
    db: Arc<DatabaseConnection>,
    activity: Arc<ActivityService>,
}

impl UserService {
    pub fn new(db: Arc<DatabaseConnection>, activity: Arc<ActivityService>) -> Self {
        Self { db, activity }
    }

    #[instrument(skip(self))]
    pub async fn list(
        &self,
        filter: UserFilter,
        page: u64,
        per_page: u64,
    ) -> Result<Page<user::Model>, ServiceError> {
        let mut query = user::Entity::find().order_by_asc(user::Column::Name);

        if let Some(role) = filter.role {
            query = query.filter(user::Column::Role.eq(role));
        }
        if let Some(active) = filter.is_active {
            query = query.filter(user::Column::IsActive.eq(active));
        }
        if let Some(term) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            query = query.filter(
                Condition::any()
                    .add(user::Column::Name.contains(term))
                    .add(user::Column::Email.contains(term.to_lowercase())),
            );
        }

        Ok(fetch_page(&*self.db, query, page, per_page).await?)
    }

    pub async fn get(&self, user_id: Uuid) -> Result<user::Model, ServiceError> {
        user::Entity::find_by_id(user_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("User", user_id))
    }

    /// Creates an account with an explicit role
    #[instrument(skip(self, input), fields(email = %input.email, role = %input.role))]
    pub async fn create(&self, input: NewUser) -> Result<user::Model, ServiceError> {
        password::validate_password(&input.password)
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(ServiceError::ValidationError("name must not be blank".into()));
        }
        let email = normalize_email(&input.email);
        if !email.contains('@') {
            return Err(ServiceError::ValidationError("email is invalid".into()));
        }

        if user::Entity::find()
            .filter(user::Column::Email.eq(email.as_str()))
            .one(&*self.db)
            .await?
            .is_some()
        {
            return Err(ServiceError::Conflict(duplicate_email(&email)));
        }

        let password_hash = password::hash_password(&input.password)
            .map_err(|e| ServiceError::HashError(e.to_string()))?;
        let now = Utc::now();
        let created = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name),
            email: Set(email.clone()),
            password_hash: Set(password_hash),
            role: Set(input.role),
            phone: Set(None),
            address: Set(None),
            is_active: Set(true),
            newsletter_opt_in: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .map_err(|e| ServiceError::from(e).conflict_on_duplicate(|| duplicate_email(&email)))?;

        self.activity
            .record(
                ActivityEntry::new(
                    ActivityType::User,
                    "user_created",
                    format!("Created {} account for {}", created.role, created.email),
                )
                .entity("user", created.id),
            )
            .await;
        Ok(created)
    }

    /// Changes role and/or active flag. Admins cannot demote or deactivate themselves.
    #[instrument(skip(self))]
    pub async fn update(
        &self,
        acting_admin: Uuid,
        user_id: Uuid,
        update: AdminUserUpdate,
    ) -> Result<user::Model, ServiceError> {
        let existing = self.get(user_id).await?;

        if user_id == acting_admin {
            if update.role.is_some_and(|r| r != UserRole::Admin) {
                return Err(ServiceError::InvalidOperation(
                    "Admins cannot change their own role".to_string(),
                ));
            }
            if update.is_active == Some(false) {
                return Err(ServiceError::InvalidOperation(
                    "Admins cannot deactivate their own account".to_string(),
                ));
            }
        }

        let mut changes = Vec::new();
        let mut active: user::ActiveModel = existing.clone().into();
        if let Some(role) = update.role.filter(|r| *r != existing.role) {
            active.role = Set(role);
            changes.push(format!("role {} -> {}", existing.role, role));
        }
        if let Some(is_active) = update.is_active.filter(|a| *a != existing.is_active) {
            active.is_active = Set(is_active);
            changes.push(if is_active { "activated" } else { "deactivated" }.to_string());
        }
        if changes.is_empty() {
            return Ok(existing);
        }
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        self.activity
            .record(
                ActivityEntry::new(
                    ActivityType::User,
                    "user_updated",
                    format!("Updated {}: {}", updated.email, changes.join(", ")),
                )
                .entity("user", updated.id)
                .actor(acting_admin),
            )
            .await;
        Ok(updated)
    }

    /// Deletes a user that has no order history and no authored posts.
    ///
    /// Their cart lines, reset tokens, support thread, likes and comments go with them,
    /// and the counters of affected posts are recomputed in the same transaction.
    #[instrument(skip(self))]
    pub async fn delete(&self, acting_admin: Uuid, user_id: Uuid) -> Result<(), ServiceError> {
        if user_id == acting_admin {
            return Err(ServiceError::InvalidOperation(
                "Admins cannot delete their own account".to_string(),
            ));
        }

        let txn = self.db.begin().await?;
        let existing = user::Entity::find_by_id(user_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("User", user_id))?;

        let order_count = order::Entity::find()
            .filter(
                Condition::any()
                    .add(order::Column::CustomerId.eq(user_id))
                    .add(order::Column::DeliveryPersonId.eq(user_id)),
            )
            .count(&txn)
            .await?;
        if order_count > 0 {
            return Err(ServiceError::Conflict(
                "User has order history and cannot be deleted; deactivate the account instead"
                    .to_string(),
            ));
        }
        let post_count = blog_post::Entity::find()
            .filter(blog_post::Column::AuthorId.eq(user_id))
            .count(&txn)
            .await?;
        if post_count > 0 {
            return Err(ServiceError::Conflict(
                "User has authored blog posts and cannot be deleted".to_string(),
            ));
        }

        let mut touched_posts: BTreeSet<Uuid> = blog_like::Entity::find()
            .select_only()
            .column(blog_like::Column::PostId)
            .filter(blog_like::Column::UserId.eq(user_id))
            .into_tuple::<Uuid>()
            .all(&txn)
            .await?
            .into_iter()
            .collect();
        touched_posts.extend(
            blog_comment::Entity::find()
                .select_only()
                .column(blog_comment::Column::PostId)
                .filter(blog_comment::Column::UserId.eq(user_id))
                .into_tuple::<Uuid>()
                .all(&txn)
                .await?,
        );

        blog_like::Entity::delete_many()
            .filter(blog_like::Column::UserId.eq(user_id))
            .exec(&txn)
            .await?;
        blog_comment::Entity::delete_many()
            .filter(blog_comment::Column::UserId.eq(user_id))
            .exec(&txn)
            .await?;
        for post_id in &touched_posts {
            recount_post(&txn, *post_id).await?;
        }

        cart_item::Entity::delete_many()
            .filter(cart_item::Column::UserId.eq(user_id))
            .exec(&txn)
            .await?;
        password_reset::Entity::delete_many()
            .filter(password_reset::Column::UserId.eq(user_id))
            .exec(&txn)
            .await?;
        customer_message::Entity::delete_many()
            .filter(customer_message::Column::CustomerId.eq(user_id))
            .exec(&txn)
            .await?;
        user::Entity::delete_by_id(user_id).exec(&txn).await?;

        txn.commit().await?;

        info!(%user_id, "deleted user");
        self.activity
            .record(
                ActivityEntry::new(
                    ActivityType::User,
                    "user_deleted",
                    format!("Deleted user {}", existing.email),
                )
                .entity("user", user_id)
                .actor(acting_admin),
            )
            .await;
        Ok(())
    }
}
