//! Persistent device identifier

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use tracing::{info, warn};

use crate::domain::experimentation::SubjectId;
use crate::domain::DomainError;

/// Loads the device ID decisions are keyed on, creating it on first use
#[derive(Debug, Clone, Copy)]
pub struct DeviceIdStore;

impl DeviceIdStore {
    /// Read the device ID stored at `path`, or generate and persist a new one
    ///
    /// A missing or unparsable file is replaced with a fresh ID.
    pub fn load_or_create(path: &Path) -> Result<SubjectId, DomainError> {
        match fs::read_to_string(path) {
            Ok(contents) => match SubjectId::parse(&contents) {
                Ok(device_id) => return Ok(device_id),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Invalid device ID, regenerating");
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(DomainError::storage(format!(
                    "Failed to read device ID from {}: {}",
                    path.display(),
                    e
                )));
            }
        }

        let device_id = SubjectId::new();
        Self::persist(path, &device_id)?;
        info!(path = %path.display(), device_id = %device_id, "Created device ID");

        Ok(device_id)
    }

    /// A device ID that lives only for this process
    pub fn ephemeral() -> SubjectId {
        SubjectId::new()
    }

    fn persist(path: &Path, device_id: &SubjectId) -> Result<(), DomainError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                DomainError::storage(format!(
                    "Failed to create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        fs::write(path, device_id.to_string()).map_err(|e| {
            DomainError::storage(format!(
                "Failed to write device ID to {}: {}",
                path.display(),
                e
            ))
        })
    }
}
