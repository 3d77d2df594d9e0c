//! Command implementations.

pub mod calendars;
pub mod config;
pub mod create;
pub mod events;
pub mod login;

mod session;
