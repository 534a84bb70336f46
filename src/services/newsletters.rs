use crate::{
    common::{fetch_page, not_blank, Page},
    entities::{newsletter_campaign, newsletter_template, user, CampaignStatus},
    errors::ServiceError,
    services::activity::{ActivityEntry, ActivityService, ActivityType},
};
use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct TemplateInput {
    #[validate(length(min = 1, max = 120), custom = "not_blank")]
    pub name: String,
    #[validate(length(min = 1, max = 200), custom = "not_blank")]
    pub subject: String,
    #[validate(length(min = 1), custom = "not_blank")]
    pub body: String,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct TemplateUpdate {
    #[validate(length(min = 1, max = 120), custom = "not_blank")]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 200), custom = "not_blank")]
    pub subject: Option<String>,
    #[validate(length(min = 1), custom = "not_blank")]
    pub body: Option<String>,
}

/// A campaign either copies a template or carries its own subject and body.
/// Explicit fields override the template's.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CampaignInput {
    pub template_id: Option<Uuid>,
    #[validate(length(min = 1, max = 200), custom = "not_blank")]
    pub subject: Option<String>,
    #[validate(length(min = 1), custom = "not_blank")]
    pub body: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CampaignUpdate {
    #[validate(length(min = 1, max = 200), custom = "not_blank")]
    pub subject: Option<String>,
    #[validate(length(min = 1), custom = "not_blank")]
    pub body: Option<String>,
}

#[derive(Clone)]
pub struct NewsletterService {
    db: Arc<DatabaseConnection>,
    activity: Arc<ActivityService>,
}

impl NewsletterService {
    pub fn new(db: Arc<DatabaseConnection>, activity: Arc<ActivityService>) -> Self {
        Self { db, activity }
    }

    // ---- templates ----

    pub async fn list_templates(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<Page<newsletter_template::Model>, ServiceError> {
        let query = newsletter_template::Entity::find().order_by_asc(newsletter_template::Column::Name);
        Ok(fetch_page(&*self.db, query, page, per_page).await?)
    }

    pub async fn get_template(&self, id: Uuid) -> Result<newsletter_template::Model, ServiceError> {
        newsletter_template::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Newsletter template", id))
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_template(
        &self,
        input: TemplateInput,
    ) -> Result<newsletter_template::Model, ServiceError> {
        input.validate()?;
        let now = Utc::now();
        Ok(newsletter_template::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name.trim().to_string()),
            subject: Set(input.subject.trim().to_string()),
            body: Set(input.body),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?)
    }

    pub async fn update_template(
        &self,
        id: Uuid,
        update: TemplateUpdate,
    ) -> Result<newsletter_template::Model, ServiceError> {
        update.validate()?;
        let mut active: newsletter_template::ActiveModel = self.get_template(id).await?.into();
        if let Some(name) = update.name {
            active.name = Set(name.trim().to_string());
        }
        if let Some(subject) = update.subject {
            active.subject = Set(subject.trim().to_string());
        }
        if let Some(body) = update.body {
            active.body = Set(body);
        }
        active.updated_at = Set(Utc::now());
        Ok(active.update(&*self.db).await?)
    }

    /// Campaigns created from the template keep their copied content
    pub async fn delete_template(&self, id: Uuid) -> Result<(), ServiceError> {
        self.get_template(id).await?;
        newsletter_campaign::Entity::update_many()
            .col_expr(
                newsletter_campaign::Column::TemplateId,
                Expr::value(Option::<Uuid>::None),
            )
            .filter(newsletter_campaign::Column::TemplateId.eq(id))
            .exec(&*self.db)
            .await?;
        newsletter_template::Entity::delete_by_id(id)
            .exec(&*self.db)
            .await?;
        Ok(())
    }

    // ---- campaigns ----

    pub async fn list_campaigns(
        &self,
        status: Option<CampaignStatus>,
        page: u64,
        per_page: u64,
    ) -> Result<Page<newsletter_campaign::Model>, ServiceError> {
        let mut query = newsletter_campaign::Entity::find();
        if let Some(status) = status {
            query = query.filter(newsletter_campaign::Column::Status.eq(status));
        }
        let query = query.order_by_desc(newsletter_campaign::Column::CreatedAt);
        Ok(fetch_page(&*self.db, query, page, per_page).await?)
    }

    pub async fn get_campaign(&self, id: Uuid) -> Result<newsletter_campaign::Model, ServiceError> {
        newsletter_campaign::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Newsletter campaign", id))
    }

    #[instrument(skip(self, input))]
    pub async fn create_campaign(
        &self,
        input: CampaignInput,
        created_by: Uuid,
    ) -> Result<newsletter_campaign::Model, ServiceError> {
        input.validate()?;
        let template = match input.template_id {
            Some(id) => Some(self.get_template(id).await?),
            None => None,
        };

        let subject = input
            .subject
            .or_else(|| template.as_ref().map(|t| t.subject.clone()));
        let body = input.body.or_else(|| template.as_ref().map(|t| t.body.clone()));
        let (subject, body) = match (subject, body) {
            (Some(subject), Some(body)) => (subject, body),
            _ => {
                return Err(ServiceError::ValidationError(
                    "A campaign needs a template or both subject and body".to_string(),
                ))
            }
        };

        let now = Utc::now();
        let campaign = newsletter_campaign::ActiveModel {
            id: Set(Uuid::new_v4()),
            template_id: Set(template.map(|t| t.id)),
            subject: Set(subject.trim().to_string()),
            body: Set(body),
            status: Set(CampaignStatus::Draft),
            scheduled_at: Set(None),
            sent_at: Set(None),
            recipients_count: Set(0),
            created_by: Set(created_by),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        self.activity
            .record(
                ActivityEntry::new(
                    ActivityType::Newsletter,
                    "campaign_created",
                    format!("Newsletter campaign '{}' drafted", campaign.subject),
                )
                .entity("newsletter_campaign", campaign.id)
                .actor(created_by),
            )
            .await;
        Ok(campaign)
    }

    pub async fn update_campaign(
        &self,
        id: Uuid,
        update: CampaignUpdate,
    ) -> Result<newsletter_campaign::Model, ServiceError> {
        update.validate()?;
        let campaign = self.unsent_campaign(id).await?;
        let mut active: newsletter_campaign::ActiveModel = campaign.into();
        if let Some(subject) = update.subject {
            active.subject = Set(subject.trim().to_string());
        }
        if let Some(body) = update.body {
            active.body = Set(body);
        }
        active.updated_at = Set(Utc::now());
        Ok(active.update(&*self.db).await?)
    }

    #[instrument(skip(self))]
    pub async fn schedule(
        &self,
        id: Uuid,
        scheduled_at: DateTime<Utc>,
        actor: Uuid,
    ) -> Result<newsletter_campaign::Model, ServiceError> {
        if scheduled_at <= Utc::now() {
            return Err(ServiceError::ValidationError(
                "Scheduled time must be in the future".to_string(),
            ));
        }
        let campaign = self.unsent_campaign(id).await?;
        let mut active: newsletter_campaign::ActiveModel = campaign.into();
        active.status = Set(CampaignStatus::Scheduled);
        active.scheduled_at = Set(Some(scheduled_at));
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        self.activity
            .record(
                ActivityEntry::new(
                    ActivityType::Newsletter,
                    "campaign_scheduled",
                    format!("Newsletter '{}' scheduled for {}", updated.subject, scheduled_at),
                )
                .entity("newsletter_campaign", id)
                .actor(actor),
            )
            .await;
        Ok(updated)
    }

    /// Marks the campaign sent to every active, opted-in user. Delivery itself happens elsewhere.
    #[instrument(skip(self))]
    pub async fn send(&self, id: Uuid, actor: Uuid) -> Result<newsletter_campaign::Model, ServiceError> {
        let campaign = self.unsent_campaign(id).await?;
        let recipients = user::Entity::find()
            .filter(user::Column::IsActive.eq(true))
            .filter(user::Column::NewsletterOptIn.eq(true))
            .count(&*self.db)
            .await?;

        let now = Utc::now();
        let result = newsletter_campaign::Entity::update_many()
            .col_expr(newsletter_campaign::Column::Status, Expr::value(CampaignStatus::Sent))
            .col_expr(newsletter_campaign::Column::SentAt, Expr::value(Some(now)))
            .col_expr(
                newsletter_campaign::Column::RecipientsCount,
                Expr::value(recipients as i32),
            )
            .col_expr(newsletter_campaign::Column::UpdatedAt, Expr::value(now))
            .filter(newsletter_campaign::Column::Id.eq(campaign.id))
            .filter(newsletter_campaign::Column::Status.ne(CampaignStatus::Sent))
            .exec(&*self.db)
            .await?;
        if result.rows_affected != 1 {
            return Err(ServiceError::Conflict(
                "Newsletter campaign has already been sent".to_string(),
            ));
        }

        let sent = self.get_campaign(id).await?;
        info!(campaign_id = %id, recipients, "newsletter campaign sent");
        metrics::counter!("meals.newsletters.sent", 1);
        self.activity
            .record(
                ActivityEntry::new(
                    ActivityType::Newsletter,
                    "campaign_sent",
                    format!("Newsletter '{}' sent to {} subscribers", sent.subject, recipients),
                )
                .entity("newsletter_campaign", id)
                .actor(actor),
            )
            .await;
        Ok(sent)
    }

    pub async fn delete_campaign(&self, id: Uuid) -> Result<(), ServiceError> {
        self.unsent_campaign(id).await?;
        newsletter_campaign::Entity::delete_by_id(id)
            .exec(&*self.db)
            .await?;
        Ok(())
    }

    async fn unsent_campaign(&self, id: Uuid) -> Result<newsletter_campaign::Model, ServiceError> {
        let campaign = self.get_campaign(id).await?;
        if campaign.status == CampaignStatus::Sent {
            return Err(ServiceError::Conflict(
                "Newsletter campaign has already been sent".to_string(),
            ));
        }
        Ok(campaign)
    }
}
