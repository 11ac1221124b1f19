//! Authentication.
//!
//! All authenticated routes expect a bearer JWT in the `Authorization`
//! header, signed with the shared secret from configuration (HS256). The
//! token is issued by the platform's auth service; this crate only verifies
//! it and exposes the caller's identity to handlers via the [`CurrentUser`]
//! extractor.
//!
//! - [`session`]: JWT claims, token creation and verification
//! - [`middleware`]: the `CurrentUser` axum extractor

pub mod middleware;
pub mod session;

pub use middleware::CurrentUser;
