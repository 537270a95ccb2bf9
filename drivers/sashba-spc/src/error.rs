//! Adapter error taxonomy.

use core::fmt;

use sashba_core::id::CcbTag;
use sashba_driver_api::DriverError;

/// Errors reported by the adapter core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HbaError {
    /// DMA region `region` (index into the region table) could not be
    /// granted with the required size and alignment.
    AllocationFailure {
        /// Index of the failing region.
        region: usize,
    },
    /// Logical window 0 is missing or smaller than 32 KiB.
    InvalidDeviceWindow {
        /// Size of the window found, 0 when unmapped.
        size: u64,
    },
    /// Every command slot is outstanding.
    PoolExhausted,
    /// The tag is not currently outstanding.
    InvalidTag(CcbTag),
    /// Neither MSI-X nor the legacy line could be bound.
    InterruptBindFailure,
    /// The chip failed to reset or initialise.
    ChipInitFailure(DriverError),
    /// The driver was loaded with the disable parameter.
    Disabled,
    /// A platform or transport service failed.
    Platform(DriverError),
    /// The adapter is not in a state that allows the operation.
    InvalidState,
}

impl fmt::Display for HbaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllocationFailure { region } => {
                write!(f, "DMA region {region} allocation failed")
            }
            Self::InvalidDeviceWindow { size } => {
                write!(f, "BAR0 window unusable ({size:#x} bytes)")
            }
            Self::PoolExhausted => f.write_str("no free command slot"),
            Self::InvalidTag(tag) => write!(f, "tag {tag} is not outstanding"),
            Self::InterruptBindFailure => f.write_str("interrupt binding failed"),
            Self::ChipInitFailure(err) => write!(f, "chip initialization failed: {err}"),
            Self::Disabled => f.write_str("driver disabled by parameter"),
            Self::Platform(err) => write!(f, "platform error: {err}"),
            Self::InvalidState => f.write_str("invalid adapter state"),
        }
    }
}

impl core::error::Error for HbaError {}

impl From<DriverError> for HbaError {
    fn from(err: DriverError) -> Self {
        Self::Platform(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            format!("{}", HbaError::AllocationFailure { region: 3 }),
            "DMA region 3 allocation failed"
        );
        assert_eq!(
            format!("{}", HbaError::InvalidDeviceWindow { size: 0x4000 }),
            "BAR0 window unusable (0x4000 bytes)"
        );
        assert_eq!(
            format!("{}", HbaError::InvalidTag(CcbTag::new(9))),
            "tag 0x9 is not outstanding"
        );
        assert_eq!(
            format!("{}", HbaError::ChipInitFailure(DriverError::Timeout)),
            "chip initialization failed: hardware operation timed out"
        );
    }

    #[test]
    fn driver_errors_convert_to_platform() {
        let err: HbaError = DriverError::NoMemory.into();
        assert_eq!(err, HbaError::Platform(DriverError::NoMemory));
    }
}
