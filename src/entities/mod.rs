//! Database entities.

pub mod activity_log;
pub mod blog_comment;
pub mod blog_like;
pub mod blog_post;
pub mod cart_item;
pub mod customer_message;
pub mod menu_item;
pub mod newsletter_campaign;
pub mod newsletter_template;
pub mod order;
pub mod order_item;
pub mod password_reset;
pub mod user;

pub use blog_post::PostStatus;
pub use customer_message::SenderRole;
pub use newsletter_campaign::CampaignStatus;
pub use order::OrderStatus;
pub use user::UserRole;
