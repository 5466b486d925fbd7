//! Aggregates job vacancies from several job sites into a local SQLite store
//! and keeps it fresh by re-running saved searches on a schedule.

pub mod aggregator;
pub mod config;
pub mod database;
pub mod error;
pub mod job_store;
pub mod jobs;
pub mod logger;
pub mod models;
pub mod scheduler;
pub mod schema;
pub mod server;
pub mod sink;
pub mod sources;
pub mod vacancies;
