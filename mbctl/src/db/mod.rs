//! Storage layer.
//!
//! Each entity has a store trait ([`handlers::ProjectStore`],
//! [`handlers::UsageStore`]) with two implementations: DynamoDB for
//! production and an in-memory variant for development and tests. The rest of
//! the application only sees the traits.

pub mod errors;
pub mod handlers;
pub mod models;
