//! API route handlers

pub mod alerts;
pub mod commands;
pub mod devices;
pub mod health;
