pub mod accounts;
pub mod api;
pub mod billing;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod models;
pub mod modules;
pub mod notify;
pub mod routes;
pub mod store;
