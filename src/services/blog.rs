use crate::{
    common::{fetch_page, not_blank, Page},
    entities::{blog_comment, blog_like, blog_post, user, PostStatus},
    errors::ServiceError,
    services::activity::{ActivityEntry, ActivityService, ActivityType},
};
use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

pub const MAX_COMMENT_CHARS: usize = 2000;

lazy_static! {
    static ref NON_SLUG_CHARS: Regex = Regex::new(r"[^a-z0-9]+").unwrap();
}

/// Lowercase, ASCII alphanumerics separated by single dashes
pub fn slugify(title: &str) -> String {
    let lowered = title.trim().to_lowercase();
    let slug = NON_SLUG_CHARS.replace_all(&lowered, "-");
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "post".to_string()
    } else {
        slug.chars().take(80).collect::<String>().trim_end_matches('-').to_string()
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PostInput {
    #[validate(length(min = 1, max = 200), custom = "not_blank")]
    pub title: String,
    #[validate(length(max = 500))]
    pub excerpt: Option<String>,
    #[validate(length(min = 1), custom = "not_blank")]
    pub content: String,
    #[serde(default)]
    pub publish: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct PostUpdate {
    #[validate(length(min = 1, max = 200), custom = "not_blank")]
    pub title: Option<String>,
    #[validate(length(max = 500))]
    pub excerpt: Option<String>,
    #[validate(length(min = 1), custom = "not_blank")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostFilter {
    pub search: Option<String>,
    pub status: Option<PostStatus>,
}

/// Result of a like, unlike or toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeState {
    pub liked: bool,
    pub likes_count: i32,
}

/// Comment with the commenter's display name
#[derive(Debug, Clone, Serialize)]
pub struct CommentView {
    pub id: Uuid,
    pub post_id: Uuid,
    pub user_id: Uuid,
    pub author_name: String,
    pub body: String,
    pub created_at: chrono::DateTime<Utc>,
}

/// Recomputes both counters of a post from its like and comment rows
pub(crate) async fn recount_post<C: ConnectionTrait>(db: &C, post_id: Uuid) -> Result<(), ServiceError> {
    let likes = blog_like::Entity::find()
        .filter(blog_like::Column::PostId.eq(post_id))
        .count(db)
        .await?;
    let comments = blog_comment::Entity::find()
        .filter(blog_comment::Column::PostId.eq(post_id))
        .count(db)
        .await?;
    blog_post::Entity::update_many()
        .col_expr(blog_post::Column::LikesCount, Expr::value(likes as i32))
        .col_expr(blog_post::Column::CommentsCount, Expr::value(comments as i32))
        .filter(blog_post::Column::Id.eq(post_id))
        .exec(db)
        .await?;
    Ok(())
}

async fn published_post<C: ConnectionTrait>(
    db: &C,
    post_id: Uuid,
) -> Result<blog_post::Model, ServiceError> {
    blog_post::Entity::find_by_id(post_id)
        .filter(blog_post::Column::Status.eq(PostStatus::Published))
        .one(db)
        .await?
        .ok_or_else(|| ServiceError::not_found("Blog post", post_id))
}

/// Inserts the like row unless one already exists, so concurrent likes settle on one row
async fn insert_like<C: ConnectionTrait>(
    db: &C,
    post_id: Uuid,
    user_id: Uuid,
) -> Result<(), ServiceError> {
    let like = blog_like::ActiveModel {
        id: Set(Uuid::new_v4()),
        post_id: Set(post_id),
        user_id: Set(user_id),
        created_at: Set(Utc::now()),
    };
    blog_like::Entity::insert(like)
        .on_conflict(
            OnConflict::columns([blog_like::Column::PostId, blog_like::Column::UserId])
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;
    Ok(())
}

/// Stores the number of like rows on the post and returns it
async fn sync_likes_count<C: ConnectionTrait>(db: &C, post_id: Uuid) -> Result<i32, ServiceError> {
    let likes = blog_like::Entity::find()
        .filter(blog_like::Column::PostId.eq(post_id))
        .count(db)
        .await? as i32;
    blog_post::Entity::update_many()
        .col_expr(blog_post::Column::LikesCount, Expr::value(likes))
        .filter(blog_post::Column::Id.eq(post_id))
        .exec(db)
        .await?;
    Ok(likes)
}

/// Blog posts, likes and comments
#[derive(Clone)]
pub struct BlogService {
    db: Arc<DatabaseConnection>,
    activity: Arc<ActivityService>,
}

impl BlogService {
    pub fn new(db: Arc<DatabaseConnection>, activity: Arc<ActivityService>) -> Self {
        Self { db, activity }
    }

    // ---- public reads ----

    #[instrument(skip(self))]
    pub async fn list_published(
        &self,
        search: Option<String>,
        page: u64,
        per_page: u64,
    ) -> Result<Page<blog_post::Model>, ServiceError> {
        self.list(
            PostFilter {
                search,
                status: Some(PostStatus::Published),
            },
            page,
            per_page,
        )
        .await
    }

    pub async fn get_published_by_slug(&self, slug: &str) -> Result<blog_post::Model, ServiceError> {
        blog_post::Entity::find()
            .filter(blog_post::Column::Slug.eq(slug))
            .filter(blog_post::Column::Status.eq(PostStatus::Published))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Blog post '{}' not found", slug)))
    }

    /// Comments of a published post, oldest first
    #[instrument(skip(self))]
    pub async fn list_comments(
        &self,
        post_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<Page<CommentView>, ServiceError> {
        published_post(&*self.db, post_id).await?;

        let query = blog_comment::Entity::find()
            .filter(blog_comment::Column::PostId.eq(post_id))
            .order_by_asc(blog_comment::Column::CreatedAt)
            .order_by_asc(blog_comment::Column::Id);
        let comments = fetch_page(&*self.db, query, page, per_page).await?;

        let user_ids: Vec<Uuid> = comments.items.iter().map(|c| c.user_id).collect();
        let names: HashMap<Uuid, String> = if user_ids.is_empty() {
            HashMap::new()
        } else {
            user::Entity::find()
                .filter(user::Column::Id.is_in(user_ids))
                .all(&*self.db)
                .await?
                .into_iter()
                .map(|u| (u.id, u.name))
                .collect()
        };

        Ok(comments.map(|c| CommentView {
            author_name: names.get(&c.user_id).cloned().unwrap_or_default(),
            id: c.id,
            post_id: c.post_id,
            user_id: c.user_id,
            body: c.body,
            created_at: c.created_at,
        }))
    }

    // ---- likes ----

    /// Idempotent: liking twice leaves a single like row
    #[instrument(skip(self))]
    pub async fn like(&self, post_id: Uuid, user_id: Uuid) -> Result<LikeState, ServiceError> {
        let txn = self.db.begin().await?;
        published_post(&txn, post_id).await?;

        insert_like(&txn, post_id, user_id).await?;
        let likes_count = sync_likes_count(&txn, post_id).await?;
        txn.commit().await?;

        Ok(LikeState {
            liked: true,
            likes_count,
        })
    }

    /// Idempotent: unliking a post that is not liked changes nothing
    #[instrument(skip(self))]
    pub async fn unlike(&self, post_id: Uuid, user_id: Uuid) -> Result<LikeState, ServiceError> {
        let txn = self.db.begin().await?;
        published_post(&txn, post_id).await?;

        blog_like::Entity::delete_many()
            .filter(blog_like::Column::PostId.eq(post_id))
            .filter(blog_like::Column::UserId.eq(user_id))
            .exec(&txn)
            .await?;
        let likes_count = sync_likes_count(&txn, post_id).await?;
        txn.commit().await?;

        Ok(LikeState {
            liked: false,
            likes_count,
        })
    }

    /// Flips the caller's like on a post
    #[instrument(skip(self))]
    pub async fn toggle(&self, post_id: Uuid, user_id: Uuid) -> Result<LikeState, ServiceError> {
        let txn = self.db.begin().await?;
        published_post(&txn, post_id).await?;

        let existing = blog_like::Entity::find()
            .filter(blog_like::Column::PostId.eq(post_id))
            .filter(blog_like::Column::UserId.eq(user_id))
            .one(&txn)
            .await?;
        let liked = match existing {
            Some(like) => {
                blog_like::Entity::delete_by_id(like.id).exec(&txn).await?;
                false
            }
            None => {
                insert_like(&txn, post_id, user_id).await?;
                true
            }
        };
        let likes_count = sync_likes_count(&txn, post_id).await?;
        txn.commit().await?;

        Ok(LikeState { liked, likes_count })
    }

    // ---- comments ----

    #[instrument(skip(self, body))]
    pub async fn add_comment(
        &self,
        post_id: Uuid,
        user_id: Uuid,
        body: &str,
    ) -> Result<blog_comment::Model, ServiceError> {
        let body = body.trim();
        let length = body.chars().count();
        if length == 0 || length > MAX_COMMENT_CHARS {
            return Err(ServiceError::ValidationError(format!(
                "Comment must be between 1 and {} characters",
                MAX_COMMENT_CHARS
            )));
        }

        let txn = self.db.begin().await?;
        let post = published_post(&txn, post_id).await?;

        let comment = blog_comment::ActiveModel {
            id: Set(Uuid::new_v4()),
            post_id: Set(post_id),
            user_id: Set(user_id),
            body: Set(body.to_string()),
            created_at: Set(Utc::now()),
        }
        .insert(&txn)
        .await?;

        blog_post::Entity::update_many()
            .col_expr(
                blog_post::Column::CommentsCount,
                Expr::col(blog_post::Column::CommentsCount).add(1),
            )
            .filter(blog_post::Column::Id.eq(post_id))
            .exec(&txn)
            .await?;
        txn.commit().await?;

        self.activity
            .record(
                ActivityEntry::new(
                    ActivityType::Blog,
                    "comment_added",
                    format!("New comment on '{}'", post.title),
                )
                .entity("blog_comment", comment.id)
                .actor(user_id),
            )
            .await;
        Ok(comment)
    }

    #[instrument(skip(self))]
    pub async fn delete_comment(&self, comment_id: Uuid, actor: Uuid) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;
        let comment = blog_comment::Entity::find_by_id(comment_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Comment", comment_id))?;

        blog_comment::Entity::delete_by_id(comment_id)
            .exec(&txn)
            .await?;
        blog_post::Entity::update_many()
            .col_expr(
                blog_post::Column::CommentsCount,
                Expr::col(blog_post::Column::CommentsCount).sub(1),
            )
            .filter(blog_post::Column::Id.eq(comment.post_id))
            .filter(blog_post::Column::CommentsCount.gt(0))
            .exec(&txn)
            .await?;
        txn.commit().await?;

        self.activity
            .record(
                ActivityEntry::new(ActivityType::Blog, "comment_deleted", "Comment removed")
                    .entity("blog_comment", comment_id)
                    .actor(actor),
            )
            .await;
        Ok(())
    }

    // ---- admin post management ----

    #[instrument(skip(self))]
    pub async fn list(
        &self,
        filter: PostFilter,
        page: u64,
        per_page: u64,
    ) -> Result<Page<blog_post::Model>, ServiceError> {
        let mut query = blog_post::Entity::find();
        if let Some(status) = filter.status {
            query = query.filter(blog_post::Column::Status.eq(status));
        }
        if let Some(term) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            query = query.filter(
                Condition::any()
                    .add(blog_post::Column::Title.contains(term))
                    .add(blog_post::Column::Content.contains(term)),
            );
        }
        let query = query
            .order_by_desc(blog_post::Column::PublishedAt)
            .order_by_desc(blog_post::Column::CreatedAt);

        Ok(fetch_page(&*self.db, query, page, per_page).await?)
    }

    pub async fn get(&self, post_id: Uuid) -> Result<blog_post::Model, ServiceError> {
        blog_post::Entity::find_by_id(post_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Blog post", post_id))
    }

    /// Picks `base`, or `base-2`, `base-3`... when taken by another post
    async fn unique_slug(&self, title: &str, exclude: Option<Uuid>) -> Result<String, ServiceError> {
        let base = slugify(title);
        let mut candidate = base.clone();
        let mut suffix = 2;
        loop {
            let mut query = blog_post::Entity::find().filter(blog_post::Column::Slug.eq(candidate.as_str()));
            if let Some(id) = exclude {
                query = query.filter(blog_post::Column::Id.ne(id));
            }
            if query.count(&*self.db).await? == 0 {
                return Ok(candidate);
            }
            candidate = format!("{}-{}", base, suffix);
            suffix += 1;
        }
    }

    #[instrument(skip(self, input), fields(title = %input.title))]
    pub async fn create_post(
        &self,
        author_id: Uuid,
        input: PostInput,
    ) -> Result<blog_post::Model, ServiceError> {
        input.validate()?;
        let slug = self.unique_slug(&input.title, None).await?;
        let now = Utc::now();
        let (status, published_at) = if input.publish {
            (PostStatus::Published, Some(now))
        } else {
            (PostStatus::Draft, None)
        };

        let post = blog_post::ActiveModel {
            id: Set(Uuid::new_v4()),
            author_id: Set(author_id),
            title: Set(input.title.trim().to_string()),
            slug: Set(slug),
            excerpt: Set(input.excerpt),
            content: Set(input.content),
            status: Set(status),
            likes_count: Set(0),
            comments_count: Set(0),
            published_at: Set(published_at),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        info!(post_id = %post.id, slug = %post.slug, "created blog post");
        self.activity
            .record(
                ActivityEntry::new(
                    ActivityType::Blog,
                    "post_created",
                    format!("Blog post '{}' created", post.title),
                )
                .entity("blog_post", post.id)
                .actor(author_id),
            )
            .await;
        Ok(post)
    }

    /// Updating the title regenerates the slug
    #[instrument(skip(self, update))]
    pub async fn update_post(
        &self,
        post_id: Uuid,
        update: PostUpdate,
        actor: Uuid,
    ) -> Result<blog_post::Model, ServiceError> {
        update.validate()?;
        let post = self.get(post_id).await?;
        let mut active: blog_post::ActiveModel = post.clone().into();

        if let Some(title) = update.title.map(|t| t.trim().to_string()) {
            if title != post.title {
                active.slug = Set(self.unique_slug(&title, Some(post_id)).await?);
                active.title = Set(title);
            }
        }
        if let Some(excerpt) = update.excerpt {
            active.excerpt = Set(Some(excerpt).filter(|e| !e.trim().is_empty()));
        }
        if let Some(content) = update.content {
            active.content = Set(content);
        }
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        self.activity
            .record(
                ActivityEntry::new(
                    ActivityType::Blog,
                    "post_updated",
                    format!("Blog post '{}' updated", updated.title),
                )
                .entity("blog_post", post_id)
                .actor(actor),
            )
            .await;
        Ok(updated)
    }

    /// Publishes a draft; the first publication time is kept on republish
    pub async fn publish(&self, post_id: Uuid, actor: Uuid) -> Result<blog_post::Model, ServiceError> {
        self.set_status(post_id, PostStatus::Published, actor).await
    }

    pub async fn unpublish(&self, post_id: Uuid, actor: Uuid) -> Result<blog_post::Model, ServiceError> {
        self.set_status(post_id, PostStatus::Draft, actor).await
    }

    #[instrument(skip(self))]
    async fn set_status(
        &self,
        post_id: Uuid,
        status: PostStatus,
        actor: Uuid,
    ) -> Result<blog_post::Model, ServiceError> {
        let post = self.get(post_id).await?;
        if post.status == status {
            return Ok(post);
        }
        let now = Utc::now();
        let mut active: blog_post::ActiveModel = post.clone().into();
        active.status = Set(status);
        if status == PostStatus::Published && post.published_at.is_none() {
            active.published_at = Set(Some(now));
        }
        active.updated_at = Set(now);
        let updated = active.update(&*self.db).await?;

        let action = match status {
            PostStatus::Published => "post_published",
            PostStatus::Draft => "post_unpublished",
        };
        self.activity
            .record(
                ActivityEntry::new(
                    ActivityType::Blog,
                    action,
                    format!("Blog post '{}' is now {}", updated.title, status),
                )
                .entity("blog_post", post_id)
                .actor(actor),
            )
            .await;
        Ok(updated)
    }

    /// Likes and comments are removed by cascade
    #[instrument(skip(self))]
    pub async fn delete_post(&self, post_id: Uuid, actor: Uuid) -> Result<(), ServiceError> {
        let post = self.get(post_id).await?;

        let txn = self.db.begin().await?;
        blog_like::Entity::delete_many()
            .filter(blog_like::Column::PostId.eq(post_id))
            .exec(&txn)
            .await?;
        blog_comment::Entity::delete_many()
            .filter(blog_comment::Column::PostId.eq(post_id))
            .exec(&txn)
            .await?;
        blog_post::Entity::delete_by_id(post_id).exec(&txn).await?;
        txn.commit().await?;

        self.activity
            .record(
                ActivityEntry::new(
                    ActivityType::Blog,
                    "post_deleted",
                    format!("Blog post '{}' deleted", post.title),
                )
                .entity("blog_post", post_id)
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

    #[rstest]
    #[case("Hello, World!", "hello-world")]
    #[case("  Winter   Menu 2024 ", "winter-menu-2024")]
    #[case("Soupe à l'oignon", "soupe-l-oignon")]
    #[case("!!!", "post")]
    #[case("", "post")]
    fn slugs(#[case] title: &str, #[case] expected: &str) {
        assert_eq!(slugify(title), expected);
    }

    #[test]
    fn long_titles_are_truncated() {
        let slug = slugify(&"word ".repeat(50));
        assert!(slug.len() <= 80);
        assert!(!slug.ends_with('-'));
    }
}
