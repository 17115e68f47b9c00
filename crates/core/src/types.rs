//! Shared identifier types.

use uuid::Uuid;

/// Identifier of a working session.
pub type SessionId = Uuid;

/// Identifier of an image within a session.
pub type ImageId = Uuid;

/// Allocate a fresh random identifier.
pub fn new_id() -> Uuid {
    Uuid::new_v4()
}
