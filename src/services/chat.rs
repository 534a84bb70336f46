use crate::{
    entities::{customer_message, user, SenderRole, UserRole},
    errors::ServiceError,
    services::activity::{ActivityEntry, ActivityService, ActivityType},
};
use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

pub const MAX_MESSAGE_CHARS: usize = 2000;
pub const MAX_POLL_LIMIT: u64 = 100;
const MAX_CLIENT_TOKEN_LEN: usize = 64;

/// One row of the admin inbox
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ConversationSummary {
    pub customer_id: Uuid,
    pub customer_name: String,
    pub customer_email: String,
    pub last_message_at: DateTime<Utc>,
    pub last_message_preview: String,
    pub unread_count: u64,
}

fn clean_body(body: &str) -> Result<String, ServiceError> {
    let body = body.trim();
    let length = body.chars().count();
    if length == 0 || length > MAX_MESSAGE_CHARS {
        return Err(ServiceError::ValidationError(format!(
            "Message must be between 1 and {} characters",
            MAX_MESSAGE_CHARS
        )));
    }
    Ok(body.to_string())
}

fn preview(body: &str) -> String {
    const PREVIEW_CHARS: usize = 80;
    if body.chars().count() <= PREVIEW_CHARS {
        body.to_string()
    } else {
        let cut: String = body.chars().take(PREVIEW_CHARS).collect();
        format!("{}...", cut)
    }
}

/// Customer support threads, one per customer, read by polling
#[derive(Clone)]
pub struct ChatService {
    db: Arc<DatabaseConnection>,
    activity: Arc<ActivityService>,
}

impl ChatService {
    pub fn new(db: Arc<DatabaseConnection>, activity: Arc<ActivityService>) -> Self {
        Self { db, activity }
    }

    /// Customer message to support.
    ///
    /// A repeated `client_token` returns the message stored the first time, with `false`.
    #[instrument(skip(self, body))]
    pub async fn send(
        &self,
        customer_id: Uuid,
        body: &str,
        client_token: Option<String>,
    ) -> Result<(customer_message::Model, bool), ServiceError> {
        let body = clean_body(body)?;
        let client_token = client_token
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        if client_token
            .as_ref()
            .is_some_and(|t| t.len() > MAX_CLIENT_TOKEN_LEN)
        {
            return Err(ServiceError::ValidationError(format!(
                "client_token must be at most {} characters",
                MAX_CLIENT_TOKEN_LEN
            )));
        }

        if let Some(token) = client_token.as_deref() {
            if let Some(existing) = self.find_by_token(customer_id, token).await? {
                debug!(message_id = %existing.id, "duplicate send ignored");
                return Ok((existing, false));
            }
        }

        let inserted = customer_message::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_id: Set(customer_id),
            sender_id: Set(customer_id),
            sender_role: Set(SenderRole::Customer),
            body: Set(body),
            client_token: Set(client_token.clone()),
            is_read: Set(false),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await;

        let message = match inserted {
            Ok(message) => message,
            Err(err) => {
                let err = ServiceError::from(err);
                // A concurrent send with the same token won the unique index
                if let (true, Some(token)) = (err.is_unique_violation(), client_token.as_deref()) {
                    if let Some(existing) = self.find_by_token(customer_id, token).await? {
                        return Ok((existing, false));
                    }
                }
                return Err(err);
            }
        };

        self.activity
            .record(
                ActivityEntry::new(ActivityType::Chat, "message_received", "New customer message")
                    .entity("customer_message", message.id)
                    .actor(customer_id),
            )
            .await;
        Ok((message, true))
    }

    /// Support reply into a customer's thread
    #[instrument(skip(self, body))]
    pub async fn reply(
        &self,
        admin_id: Uuid,
        customer_id: Uuid,
        body: &str,
    ) -> Result<customer_message::Model, ServiceError> {
        let body = clean_body(body)?;
        let customer = user::Entity::find_by_id(customer_id)
            .one(&*self.db)
            .await?
            .filter(|u| u.role == UserRole::Customer)
            .ok_or_else(|| ServiceError::not_found("Customer", customer_id))?;

        let message = customer_message::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_id: Set(customer.id),
            sender_id: Set(admin_id),
            sender_role: Set(SenderRole::Admin),
            body: Set(body),
            client_token: Set(None),
            is_read: Set(false),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await?;

        self.activity
            .record(
                ActivityEntry::new(
                    ActivityType::Chat,
                    "message_replied",
                    format!("Support replied to {}", customer.name),
                )
                .entity("customer_message", message.id)
                .actor(admin_id),
            )
            .await;
        Ok(message)
    }

    /// Messages of a thread in ascending order.
    ///
    /// With `since`, only messages strictly newer than it. Without, the latest `limit`.
    #[instrument(skip(self))]
    pub async fn poll(
        &self,
        customer_id: Uuid,
        since: Option<DateTime<Utc>>,
        limit: u64,
    ) -> Result<Vec<customer_message::Model>, ServiceError> {
        let limit = limit.clamp(1, MAX_POLL_LIMIT);
        let thread = customer_message::Entity::find()
            .filter(customer_message::Column::CustomerId.eq(customer_id));

        let messages = match since {
            Some(since) => {
                thread
                    .filter(customer_message::Column::CreatedAt.gt(since))
                    .order_by_asc(customer_message::Column::CreatedAt)
                    .order_by_asc(customer_message::Column::Id)
                    .limit(limit)
                    .all(&*self.db)
                    .await?
            }
            None => {
                let mut latest = thread
                    .order_by_desc(customer_message::Column::CreatedAt)
                    .order_by_desc(customer_message::Column::Id)
                    .limit(limit)
                    .all(&*self.db)
                    .await?;
                latest.reverse();
                latest
            }
        };
        Ok(messages)
    }

    /// Marks the other party's messages in a thread as read.
    /// With `up_to`, only messages created at or before it.
    pub async fn mark_read(
        &self,
        customer_id: Uuid,
        reader: SenderRole,
        up_to: Option<DateTime<Utc>>,
    ) -> Result<u64, ServiceError> {
        let mut update = customer_message::Entity::update_many()
            .col_expr(customer_message::Column::IsRead, Expr::value(true))
            .filter(customer_message::Column::CustomerId.eq(customer_id))
            .filter(customer_message::Column::SenderRole.eq(reader.counterpart()))
            .filter(customer_message::Column::IsRead.eq(false));
        if let Some(up_to) = up_to {
            update = update.filter(customer_message::Column::CreatedAt.lte(up_to));
        }
        let result = update.exec(&*self.db).await?;
        Ok(result.rows_affected)
    }

    /// Unread messages sent by customers across all threads
    pub async fn unread_for_support(&self) -> Result<u64, ServiceError> {
        Ok(customer_message::Entity::find()
            .filter(customer_message::Column::SenderRole.eq(SenderRole::Customer))
            .filter(customer_message::Column::IsRead.eq(false))
            .count(&*self.db)
            .await?)
    }

    /// One summary per customer thread, most recently active first
    #[instrument(skip(self))]
    pub async fn conversations(&self) -> Result<Vec<ConversationSummary>, ServiceError> {
        let messages = customer_message::Entity::find()
            .order_by_desc(customer_message::Column::CreatedAt)
            .order_by_desc(customer_message::Column::Id)
            .all(&*self.db)
            .await?;

        let mut order: Vec<Uuid> = Vec::new();
        let mut threads: HashMap<Uuid, (DateTime<Utc>, String, u64)> = HashMap::new();
        for message in &messages {
            let unread = u64::from(message.sender_role == SenderRole::Customer && !message.is_read);
            threads
                .entry(message.customer_id)
                .and_modify(|(_, _, count)| *count += unread)
                .or_insert_with(|| {
                    order.push(message.customer_id);
                    (message.created_at, preview(&message.body), unread)
                });
        }
        if order.is_empty() {
            return Ok(Vec::new());
        }

        let customers: HashMap<Uuid, user::Model> = user::Entity::find()
            .filter(user::Column::Id.is_in(order.clone()))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|u| (u.id, u))
            .collect();

        Ok(order
            .into_iter()
            .filter_map(|customer_id| {
                let (last_message_at, last_message_preview, unread_count) =
                    threads.remove(&customer_id)?;
                let customer = customers.get(&customer_id);
                Some(ConversationSummary {
                    customer_id,
                    customer_name: customer.map(|c| c.name.clone()).unwrap_or_default(),
                    customer_email: customer.map(|c| c.email.clone()).unwrap_or_default(),
                    last_message_at,
                    last_message_preview,
                    unread_count,
                })
            })
            .collect())
    }

    async fn find_by_token(
        &self,
        customer_id: Uuid,
        token: &str,
    ) -> Result<Option<customer_message::Model>, ServiceError> {
        Ok(customer_message::Entity::find()
            .filter(customer_message::Column::CustomerId.eq(customer_id))
            .filter(customer_message::Column::ClientToken.eq(token))
            .one(&*self.db)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bodies_are_trimmed_and_bounded() {
        assert_eq!(clean_body("  hello ").unwrap(), "hello");
        assert!(clean_body("   ").is_err());
        assert!(clean_body(&"x".repeat(MAX_MESSAGE_CHARS + 1)).is_err());
    }

    #[test]
    fn previews_are_shortened() {
        assert_eq!(preview("short"), "short");
        let long = "a".repeat(120);
        assert_eq!(preview(&long).chars().count(), 83);
    }
}
