//! Utility functions for the application

pub mod file;
pub mod json;
pub mod retry;
pub mod sql;
pub mod time;
