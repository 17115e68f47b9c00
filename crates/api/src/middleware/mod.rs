//! Request extractors.
//!
//! - [`session::ActiveSession`] -- Resolves the live session named by `x-session-id`.
//! - [`session::SessionIdHeader`] -- The raw session id, for lifecycle endpoints.

pub mod session;
