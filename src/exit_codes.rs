//! Process exit codes.

use crate::error::AuditError;

pub const SUCCESS: i32 = 0;

/// General error
pub const ERROR: i32 = 1;

/// Diff completed and found drift (only with --fail-on-drift)
pub const DRIFT_DETECTED: i32 = 2;

/// Referenced snapshot does not exist
pub const NOT_FOUND: i32 = 3;

/// Inventory pass timed out, safe to retry
pub const TIMEOUT: i32 = 4;

/// Stored or declared snapshot data is invalid
pub const MALFORMED: i32 = 5;

/// Bad config file or arguments (sysexits.h EX_USAGE)
pub const USAGE_ERROR: i32 = 64;

pub fn for_error(err: &AuditError) -> i32 {
    match err {
        AuditError::NotFound(_) => NOT_FOUND,
        AuditError::Timeout { .. } => TIMEOUT,
        AuditError::MalformedSnapshot { .. } | AuditError::InvalidBaseline { .. } => MALFORMED,
        AuditError::Config(_) => USAGE_ERROR,
        AuditError::Storage(_) | AuditError::Inventory(_) | AuditError::Serialization(_) => ERROR,
    }
}
