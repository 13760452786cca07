//! HTTP API handlers for evreg-ri

pub mod auth;
pub mod health;
pub mod ingest;
pub mod referrals;
pub mod uploads;
pub mod users;

pub use auth::auth_middleware;
pub use health::health_routes;
pub use ingest::ingest_routes;
pub use referrals::referral_routes;
pub use uploads::upload_routes;
pub use users::user_routes;
