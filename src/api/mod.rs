//! Web API module for the points market
//!
//! JSON endpoints over the venue. Callers are trusted to pass already
//! authenticated user ids and admin flags.

pub mod routes;
pub mod server;

pub use server::{create_app, AppState};
