//! Unique identifiers for invocations and events

use uuid::Uuid;

/// Generate a fresh random (version 4) identifier in hyphenated form
pub fn new_identifier() -> String {
    Uuid::new_v4().to_string()
}
