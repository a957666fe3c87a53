pub mod auth;
pub mod db;
pub mod handlers;
pub mod health;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod realtime;
