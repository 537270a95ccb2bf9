//! Driver error types.

use core::fmt;

/// Errors reported by platform services and chip operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverError {
    /// The hardware device was not found or did not respond.
    DeviceNotFound,
    /// Driver initialization failed.
    InitFailed,
    /// A hardware operation timed out.
    Timeout,
    /// The requested operation is not supported by this driver or platform.
    Unsupported,
    /// An I/O error occurred during a hardware operation.
    IoError,
    /// The driver is not in a valid state for this operation.
    InvalidState,
    /// The platform could not satisfy a memory request.
    NoMemory,
    /// The device or resource is busy.
    Busy,
    /// The resource is already claimed by someone else.
    ResourceConflict,
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeviceNotFound => f.write_str("device not found"),
            Self::InitFailed => f.write_str("driver initialization failed"),
            Self::Timeout => f.write_str("hardware operation timed out"),
            Self::Unsupported => f.write_str("operation not supported"),
            Self::IoError => f.write_str("I/O error"),
            Self::InvalidState => f.write_str("invalid driver state"),
            Self::NoMemory => f.write_str("out of memory"),
            Self::Busy => f.write_str("device busy"),
            Self::ResourceConflict => f.write_str("resource already claimed"),
        }
    }
}

impl core::error::Error for DriverError {}
