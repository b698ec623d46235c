pub mod api;
pub mod app;
pub mod auth;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod models;
pub mod notify;
pub mod player;
pub mod profile;
pub mod routes;
pub mod search;
pub mod sw_cache;
