//! API handlers.

pub mod admin;
pub mod allocations;
pub mod health;
pub mod pages;
pub mod webhooks;
pub mod writers;
