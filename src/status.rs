//! Status display text.
//!
//! Holds the single line (or block) of text a device page shows in its
//! debug area. Toggles write fixed messages; each settled prediction
//! overwrites it with the rendered prediction.

use std::sync::{Arc, RwLock};

pub const STATUS_INITIALIZED: &str = "Initialized.";
pub const STATUS_RECORDING: &str = "Recording.";
pub const STATUS_NOT_RECORDING: &str = "Not recording.";

/// Cloneable handle to the shared status text.
#[derive(Debug, Clone)]
pub struct StatusBoard {
    text: Arc<RwLock<String>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self {
            text: Arc::new(RwLock::new(STATUS_INITIALIZED.to_string())),
        }
    }

    pub fn set(&self, text: impl Into<String>) {
        let mut guard = self.text.write().unwrap_or_else(|p| p.into_inner());
        *guard = text.into();
    }

    pub fn get(&self) -> String {
        self.text.read().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}
