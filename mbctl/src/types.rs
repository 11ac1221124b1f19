//! Common type definitions shared across the crate.
//!
//! User identifiers come from the JWT `sub` claim issued by the shared auth
//! service and are opaque strings; projects are identified by UUIDs minted at
//! creation time.

use uuid::Uuid;

/// Opaque user identifier carried in session tokens.
pub type UserId = String;

/// Project identifier.
pub type ProjectId = Uuid;

/// Abbreviate a UUID to its first 8 characters for more readable logs.
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}
