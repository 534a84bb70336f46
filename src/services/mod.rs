// Audit trail shared by every other service
pub mod activity;

// Accounts and back office user management
pub mod accounts;
pub mod users;

// Storefront
pub mod blog;
pub mod cart;
pub mod menu;
pub mod orders;

// Support and outreach
pub mod chat;
pub mod newsletters;

// Role dashboards
pub mod dashboard;
