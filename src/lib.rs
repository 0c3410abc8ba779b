// lib.rs
// Dormitory rental service: rooms, monthly billing, slip payments, admin
// verification, notifications and scheduled jobs over MongoDB.

pub mod cache;
pub mod config;
pub mod error;
pub mod jobs;
pub mod mailer;
pub mod models;
pub mod period;
pub mod routes;
pub mod scheduler;
pub mod session;
pub mod slip;
pub mod state;
pub mod storage;
pub mod telemetry;
