//! Data models for the bot catalog.
//!
//! Serialized with camelCase keys for the catalog frontend.

mod bot;
mod catalog;
mod developer;
mod interaction;

pub use bot::*;
pub use catalog::*;
pub use developer::*;
pub use interaction::*;
