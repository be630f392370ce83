//! Marketplace offer core
//!
//! This library exports the offer lifecycle, its scheduler sweeps, the
//! review gate and the HTTP surface of the marketplace backend.

pub mod app_state;
pub mod config;
pub mod error;
pub mod events;
pub mod handlers;
pub mod models;
pub mod offers;
pub mod reviews;
pub mod routes;
pub mod scheduler;
pub mod store;
pub mod transition;
pub mod websocket;
