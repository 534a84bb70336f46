use crate::{
    common::{fetch_page, Page},
    entities::activity_log,
    errors::ServiceError,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strum::{Display, EnumString};
use tracing::{instrument, warn};
use uuid::Uuid;

pub const MAX_RECENT: u64 = 100;

/// Broad area of the business an activity belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActivityType {
    Account,
    User,
    Menu,
    Order,
    Delivery,
    Blog,
    Chat,
    Newsletter,
}

/// Row to be written to the activity log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityEntry {
    pub activity_type: ActivityType,
    pub action: String,
    pub description: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<Uuid>,
    pub actor_id: Option<Uuid>,
}

impl ActivityEntry {
    pub fn new(
        activity_type: ActivityType,
        action: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            activity_type,
            action: action.into(),
            description: description.into(),
            entity_type: None,
            entity_id: None,
            actor_id: None,
        }
    }

    pub fn entity(mut self, entity_type: impl Into<String>, entity_id: Uuid) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id);
        self
    }

    pub fn actor(mut self, actor_id: impl Into<Option<Uuid>>) -> Self {
        self.actor_id = actor_id.into();
        self
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActivityFilter {
    pub activity_type: Option<String>,
}

/// Audit trail of notable actions, read back by dashboards
#[derive(Clone)]
pub struct ActivityService {
    db: Arc<DatabaseConnection>,
}

impl ActivityService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Inserts one activity row
    #[instrument(skip(self), fields(activity_type = %entry.activity_type, action = %entry.action))]
    pub async fn log(&self, entry: ActivityEntry) -> Result<activity_log::Model, ServiceError> {
        let row = activity_log::ActiveModel {
            id: Set(Uuid::new_v4()),
            activity_type: Set(entry.activity_type.to_string()),
            action: Set(entry.action),
            description: Set(entry.description),
            entity_type: Set(entry.entity_type),
            entity_id: Set(entry.entity_id),
            actor_id: Set(entry.actor_id),
            created_at: Set(Utc::now()),
        };

        let saved = row.insert(&*self.db).await?;
        metrics::counter!("meals.activity.logged", 1);
        Ok(saved)
    }

    /// Best-effort variant of [`Self::log`]: failures are logged and swallowed
    pub async fn record(&self, entry: ActivityEntry) {
        let action = entry.action.clone();
        if let Err(err) = self.log(entry).await {
            metrics::counter!("meals.activity.failures", 1);
            warn!(%action, error = %err, "failed to write activity log entry");
        }
    }

    /// Most recent entries, newest first. `limit` is clamped to 1..=100.
    #[instrument(skip(self))]
    pub async fn recent(&self, limit: u64) -> Result<Vec<activity_log::Model>, ServiceError> {
        let limit = limit.clamp(1, MAX_RECENT);
        let rows = activity_log::Entity::find()
            .order_by_desc(activity_log::Column::CreatedAt)
            .order_by_desc(activity_log::Column::Id)
            .limit(limit)
            .all(&*self.db)
            .await?;
        Ok(rows)
    }

    /// Paginated listing for the admin activity page
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        filter: ActivityFilter,
        page: u64,
        per_page: u64,
    ) -> Result<Page<activity_log::Model>, ServiceError> {
        let mut query = activity_log::Entity::find()
            .order_by_desc(activity_log::Column::CreatedAt)
            .order_by_desc(activity_log::Column::Id);

        if let Some(activity_type) = filter
            .activity_type
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
        {
            query = query.filter(activity_log::Column::ActivityType.eq(activity_type));
        }

        Ok(fetch_page(&*self.db, query, page, per_page).await?)
    }
}
