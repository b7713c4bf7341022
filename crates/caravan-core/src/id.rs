//! Run-unique random identifiers.

use uuid::Uuid;

/// Random 32-hex-character instance identifier (122 bits of entropy).
///
/// Names the per-job remote working directory, so it must not collide
/// across jobs running concurrently on the same host.
pub fn instance_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Auto-assigned id for job entries that do not declare one.
pub fn job_id() -> String {
    format!("job-{}", Uuid::new_v4().simple())
}
