use crate::{
    auth::password::{self, generate_reset_token, hash_reset_token},
    common::not_blank,
    entities::{password_reset, user, UserRole},
    errors::ServiceError,
    services::activity::{ActivityEntry, ActivityService, ActivityType},
};
use chrono::{Duration, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct RegisterInput {
    #[validate(length(min = 1, max = 100), custom = "not_blank")]
    pub name: String,
    #[validate(email)]
    pub email: String,
    pub password: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    #[serde(default)]
    pub newsletter_opt_in: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ProfileUpdate {
    #[validate(length(min = 1, max = 100), custom = "not_blank")]
    pub name: Option<String>,
    #[validate(length(max = 40))]
    pub phone: Option<String>,
    #[validate(length(max = 500))]
    pub address: Option<String>,
}

/// Raw reset token; only handed back to the caller outside production
#[derive(Debug, Clone, Serialize)]
pub struct IssuedReset {
    pub token: String,
    pub expires_at: chrono::DateTime<Utc>,
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub(crate) fn duplicate_email(email: &str) -> String {
    format!("An account with email {} already exists", email)
}

fn hash(password: &str) -> Result<String, ServiceError> {
    password::hash_password(password).map_err(|e| ServiceError::HashError(e.to_string()))
}

fn check_password_rules(password: &str) -> Result<(), ServiceError> {
    password::validate_password(password).map_err(|e| ServiceError::ValidationError(e.to_string()))
}

/// Self-service account operations: sign-up, sign-in, profile and password reset
#[derive(Clone)]
pub struct AccountService {
    db: Arc<DatabaseConnection>,
    activity: Arc<ActivityService>,
    reset_ttl: Duration,
}

impl AccountService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        activity: Arc<ActivityService>,
        reset_ttl_secs: u64,
    ) -> Self {
        Self {
            db,
            activity,
            reset_ttl: Duration::seconds(reset_ttl_secs as i64),
        }
    }

    /// Creates a customer account. The email must not be taken.
    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn register(&self, input: RegisterInput) -> Result<user::Model, ServiceError> {
        input.validate()?;
        check_password_rules(&input.password)?;
        let email = normalize_email(&input.email);

        if user::Entity::find()
            .filter(user::Column::Email.eq(email.as_str()))
            .one(&*self.db)
            .await?
            .is_some()
        {
            return Err(ServiceError::Conflict(duplicate_email(&email)));
        }

        let now = Utc::now();
        let account = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name.trim().to_string()),
            email: Set(email.clone()),
            password_hash: Set(hash(&input.password)?),
            role: Set(UserRole::Customer),
            phone: Set(input.phone.filter(|p| !p.trim().is_empty())),
            address: Set(input.address.filter(|a| !a.trim().is_empty())),
            is_active: Set(true),
            newsletter_opt_in: Set(input.newsletter_opt_in),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .map_err(|e| ServiceError::from(e).conflict_on_duplicate(|| duplicate_email(&email)))?;

        info!(user_id = %account.id, "registered new customer");
        self.activity
            .record(
                ActivityEntry::new(
                    ActivityType::Account,
                    "user_registered",
                    format!("New customer {} registered", account.name),
                )
                .entity("user", account.id)
                .actor(account.id),
            )
            .await;

        Ok(account)
    }

    /// Checks credentials. Unknown email and wrong password are indistinguishable.
    #[instrument(skip(self, password))]
    pub async fn authenticate(
        &self,
        email: &str,
        password: &str,
    ) -> Result<user::Model, ServiceError> {
        let email = normalize_email(email);
        let account = user::Entity::find()
            .filter(user::Column::Email.eq(email.as_str()))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::Unauthorized("Invalid email or password".to_string()))?;

        if !password::verify_password(password, &account.password_hash) {
            warn!(user_id = %account.id, "failed login attempt");
            return Err(ServiceError::Unauthorized(
                "Invalid email or password".to_string(),
            ));
        }

        if !account.is_active {
            return Err(ServiceError::Forbidden("Account is disabled".to_string()));
        }

        Ok(account)
    }

    pub async fn get_profile(&self, user_id: Uuid) -> Result<user::Model, ServiceError> {
        user::Entity::find_by_id(user_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("User", user_id))
    }

    #[instrument(skip(self))]
    pub async fn update_profile(
        &self,
        user_id: Uuid,
        update: ProfileUpdate,
    ) -> Result<user::Model, ServiceError> {
        update.validate()?;
        let account = self.get_profile(user_id).await?;
        let mut active: user::ActiveModel = account.into();

        if let Some(name) = update.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(ServiceError::ValidationError(
                    "name must not be blank".to_string(),
                ));
            }
            active.name = Set(name);
        }
        if let Some(phone) = update.phone {
            active.phone = Set(Some(phone.trim().to_string()).filter(|p| !p.is_empty()));
        }
        if let Some(address) = update.address {
            active.address = Set(Some(address.trim().to_string()).filter(|a| !a.is_empty()));
        }
        active.updated_at = Set(Utc::now());

        Ok(active.update(&*self.db).await?)
    }

    /// Changes the password after re-checking the current one
    #[instrument(skip(self, current_password, new_password))]
    pub async fn change_password(
        &self,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), ServiceError> {
        let account = self.get_profile(user_id).await?;
        if !password::verify_password(current_password, &account.password_hash) {
            return Err(ServiceError::ValidationError(
                "Current password is incorrect".to_string(),
            ));
        }
        check_password_rules(new_password)?;

        let mut active: user::ActiveModel = account.into();
        active.password_hash = Set(hash(new_password)?);
        active.updated_at = Set(Utc::now());
        active.update(&*self.db).await?;

        self.activity
            .record(
                ActivityEntry::new(ActivityType::Account, "password_changed", "Password changed")
                    .entity("user", user_id)
                    .actor(user_id),
            )
            .await;
        Ok(())
    }

    pub async fn set_newsletter_opt_in(
        &self,
        user_id: Uuid,
        opt_in: bool,
    ) -> Result<user::Model, ServiceError> {
        let account = self.get_profile(user_id).await?;
        let mut active: user::ActiveModel = account.into();
        active.newsletter_opt_in = Set(opt_in);
        active.updated_at = Set(Utc::now());
        Ok(active.update(&*self.db).await?)
    }

    /// Issues a reset token for an active account.
    /// Unknown or disabled emails return `None` so callers cannot probe for accounts.
    #[instrument(skip(self))]
    pub async fn request_reset(&self, email: &str) -> Result<Option<IssuedReset>, ServiceError> {
        let email = normalize_email(email);
        let account = match user::Entity::find()
            .filter(user::Column::Email.eq(email.as_str()))
            .filter(user::Column::IsActive.eq(true))
            .one(&*self.db)
            .await?
        {
            Some(account) => account,
            None => {
                info!("password reset requested for unknown email");
                return Ok(None);
            }
        };

        let (token, token_hash) = generate_reset_token();
        let now = Utc::now();
        let expires_at = now + self.reset_ttl;

        password_reset::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(account.id),
            token_hash: Set(token_hash),
            expires_at: Set(expires_at),
            used_at: Set(None),
            created_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        self.activity
            .record(
                ActivityEntry::new(
                    ActivityType::Account,
                    "password_reset_requested",
                    format!("Password reset requested for {}", account.email),
                )
                .entity("user", account.id),
            )
            .await;

        Ok(Some(IssuedReset { token, expires_at }))
    }

    /// Consumes a reset token and sets the new password, all in one transaction
    #[instrument(skip(self, token, new_password))]
    pub async fn complete_reset(&self, token: &str, new_password: &str) -> Result<(), ServiceError> {
        check_password_rules(new_password)?;
        let new_hash = hash(new_password)?;
        let token_hash = hash_reset_token(token.trim());
        let now = Utc::now();

        let txn = self.db.begin().await?;

        let reset = password_reset::Entity::find()
            .filter(password_reset::Column::TokenHash.eq(token_hash))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::ValidationError("Invalid reset token".to_string()))?;

        if reset.used_at.is_some() {
            return Err(ServiceError::ValidationError(
                "Reset token has already been used".to_string(),
            ));
        }
        if reset.expires_at <= now {
            return Err(ServiceError::ValidationError(
                "Reset token has expired".to_string(),
            ));
        }

        // Guarded update so a concurrent completion cannot consume the token twice
        let consumed = password_reset::Entity::update_many()
            .col_expr(password_reset::Column::UsedAt, Expr::value(now))
            .filter(password_reset::Column::Id.eq(reset.id))
            .filter(password_reset::Column::UsedAt.is_null())
            .exec(&txn)
            .await?;
        if consumed.rows_affected != 1 {
            return Err(ServiceError::ValidationError(
                "Reset token has already been used".to_string(),
            ));
        }

        let account = user::Entity::find_by_id(reset.user_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("User", reset.user_id))?;
        let mut active: user::ActiveModel = account.into();
        active.password_hash = Set(new_hash);
        active.updated_at = Set(now);
        active.update(&txn).await?;

        txn.commit().await?;

        self.activity
            .record(
                ActivityEntry::new(
                    ActivityType::Account,
                    "password_reset_completed",
                    "Password reset completed",
                )
                .entity("user", reset.user_id)
                .actor(reset.user_id),
            )
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails_are_normalized() {
        assert_eq!(normalize_email("  Jo.Smith@Example.COM "), "jo.smith@example.com");
    }

    #[test]
    fn register_input_requires_valid_email() {
        let input = RegisterInput {
            name: "Jo".into(),
            email: "not-an-email".into(),
            password: "soup4tuesday".into(),
            phone: None,
            address: None,
            newsletter_opt_in: false,
        };
        assert!(input.validate().is_err());
    }
}
