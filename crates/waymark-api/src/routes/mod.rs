//! Route modules organized by caller.

pub mod admin;
pub mod dispatch;
pub mod health;
pub mod quest;
