pub mod config;
pub mod db;
pub mod errors;
pub mod identity;
pub mod models;
pub mod onboarding;
pub mod routes;
pub mod state;
