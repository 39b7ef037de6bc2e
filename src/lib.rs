//! cworg: team scheduling and roster management.
//!
//! Feature areas (dashboard, meets, teams, locations, user profiles) are
//! self-contained site modules which register with a
//! [`sitemodule::ModuleRegistry`] at startup. The registry merges their
//! routes, builds the navigation menu and provides the canonical
//! `<label>:<model>_<view>` naming used for every link in the application.

use diesel_migrations::{EmbeddedMigrations, embed_migrations};

pub mod auth;
pub mod calendar;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod locations;
pub mod meets;
pub mod msg;
pub mod permission;
pub mod schema;
pub mod sitemodule;
pub mod slug;
pub mod state;
pub mod teams;
pub mod template;
pub mod userprofile;
pub mod util_resp;
pub mod validation;
pub mod views;
pub mod widgets;

#[cfg(test)]
mod test;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");
