//! Nodebox CLI - device manager front-end.

pub mod auth;
pub mod commands;
pub mod output;
