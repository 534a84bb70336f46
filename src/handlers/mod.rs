pub mod account;
pub mod activity;
pub mod auth;
pub mod blog;
pub mod cart;
pub mod chat;
pub mod common;
pub mod dashboard;
pub mod menu;
pub mod newsletters;
pub mod orders;
pub mod users;

use crate::{
    config::AppConfig,
    db::DbPool,
    services::{
        accounts::AccountService, activity::ActivityService, blog::BlogService, cart::CartService,
        chat::ChatService, dashboard::DashboardService, menu::MenuService,
        newsletters::NewsletterService, orders::{OrderPricing, OrderService}, users::UserService,
    },
};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub activity: Arc<ActivityService>,
    pub accounts: Arc<AccountService>,
    pub users: Arc<UserService>,
    pub menu: Arc<MenuService>,
    pub cart: Arc<CartService>,
    pub orders: Arc<OrderService>,
    pub blog: Arc<BlogService>,
    pub chat: Arc<ChatService>,
    pub newsletters: Arc<NewsletterService>,
    pub dashboard: Arc<DashboardService>,
}

impl AppServices {
    pub fn new(db_pool: Arc<DbPool>, config: &AppConfig) -> Self {
        let activity = Arc::new(ActivityService::new(db_pool.clone()));
        let accounts = Arc::new(AccountService::new(
            db_pool.clone(),
            activity.clone(),
            config.password_reset_ttl_secs,
        ));
        let users = Arc::new(UserService::new(db_pool.clone(), activity.clone()));
        let menu = Arc::new(MenuService::new(db_pool.clone(), activity.clone()));
        let cart = Arc::new(CartService::new(db_pool.clone()));
        let orders = Arc::new(OrderService::new(
            db_pool.clone(),
            activity.clone(),
            OrderPricing::from(config),
        ));
        let blog = Arc::new(BlogService::new(db_pool.clone(), activity.clone()));
        let chat = Arc::new(ChatService::new(db_pool.clone(), activity.clone()));
        let newsletters = Arc::new(NewsletterService::new(db_pool.clone(), activity.clone()));
        let dashboard = Arc::new(DashboardService::new(
            db_pool,
            activity.clone(),
            chat.clone(),
        ));

        Self {
            activity,
            accounts,
            users,
            menu,
            cart,
            orders,
            blog,
            chat,
            newsletters,
            dashboard,
        }
    }
}
