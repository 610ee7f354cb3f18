pub mod health;
pub mod platform_webhooks;
