//! Cookie-session reading.
//!
//! The orchestrator authenticates with a single `session` cookie whose
//! value is kept in a file next to the deployment.

use std::io;
use std::path::Path;

/// Read the session cookie value, trimming surrounding whitespace.
pub fn read_cookie_session(path: &Path) -> io::Result<String> {
    let raw = std::fs::read_to_string(path)?;
    Ok(raw.trim().to_string())
}
