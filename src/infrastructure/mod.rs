pub mod activity_log;
pub mod appointment_store;
pub mod calendar_cache;
pub mod config;
pub mod error;
pub mod event_mapper;
pub mod schedule_rules;
