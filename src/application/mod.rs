pub mod availability;
pub mod bootstrap;
pub mod commands;
pub mod reschedule;
