pub mod admin;
pub mod audit;
pub mod auth;
pub mod authz;
pub mod metrics;
