//! Startup parameters and compile-time limits.
//!
//! [`HbaParams`] mirrors the driver's load-time parameters; parsing them is
//! the host's business, this module only holds and normalises the values.

use bitflags::bitflags;

/// Number of phy slots tracked per adapter.
pub const MAX_PHYS: usize = 8;

/// Upper bound on MSI-X vectors requested per adapter.
pub const MAX_MSIX_VECTORS: usize = 16;

/// Default firmware event log size in bytes.
pub const DEFAULT_EVENT_LOG_SIZE: u32 = 128 * 1024;

/// Smallest event log the firmware accepts.
const MIN_EVENT_LOG_SIZE: u32 = 64;

bitflags! {
    /// Per-adapter log categories.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LogMask: u32 {
        /// Failure paths.
        const FAIL = 0x01;
        /// Bring-up and teardown.
        const INIT = 0x02;
        /// Discovery.
        const DISC = 0x04;
        /// I/O path.
        const IO = 0x08;
        /// Error handling.
        const EH = 0x10;
        /// Management ioctls.
        const IOCTL = 0x20;
        /// Firmware messages.
        const MSG = 0x40;
        /// Device registration.
        const DEV = 0x80;
        /// Per-device I/O.
        const DEVIO = 0x100;
    }
}

/// How a recognised interrupt reaches the chip's service routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterruptDelivery {
    /// Service the chip directly in the hard-interrupt handler.
    Inline,
    /// Schedule a single-threaded bottom half and return at once.
    #[default]
    Deferred,
}

/// Load-time parameters shared by every adapter of a driver context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HbaParams {
    /// One SAS address for phys 0-3 and that address plus one for phys 4+.
    /// Takes precedence over `wwn_by8`.
    pub wwn_by4: Option<u64>,
    /// One SAS address for every phy.
    pub wwn_by8: Option<u64>,
    /// Log categories enabled on new adapters.
    pub logging_level: LogMask,
    /// Firmware event log severity option, passed through to the chip.
    pub logging_option: u32,
    /// Requested firmware event log size in bytes (normalised on use).
    pub logging_size: u32,
    /// Whether the SCSI error handler runs for the adapter's host.
    pub scsi_ehandler: bool,
    /// Refuse to bind any adapter.
    pub disable: bool,
    /// Interrupt delivery policy.
    pub delivery: InterruptDelivery,
    /// MSI-X vectors to request (clamped to `1..=MAX_MSIX_VECTORS`).
    pub msix_vectors: usize,
}

impl HbaParams {
    /// Returns the built-in defaults.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            wwn_by4: None,
            wwn_by8: None,
            logging_level: LogMask::FAIL.union(LogMask::INIT),
            logging_option: 0,
            logging_size: DEFAULT_EVENT_LOG_SIZE,
            scsi_ehandler: true,
            disable: false,
            delivery: InterruptDelivery::Deferred,
            msix_vectors: 1,
        }
    }

    /// Sets the split 4/4 SAS address override.
    #[must_use]
    pub const fn with_wwn_by4(mut self, addr: u64) -> Self {
        self.wwn_by4 = Some(addr);
        self
    }

    /// Sets the shared SAS address override.
    #[must_use]
    pub const fn with_wwn_by8(mut self, addr: u64) -> Self {
        self.wwn_by8 = Some(addr);
        self
    }

    /// Sets the enabled log categories.
    #[must_use]
    pub const fn with_logging_level(mut self, mask: LogMask) -> Self {
        self.logging_level = mask;
        self
    }

    /// Sets the requested event log size.
    #[must_use]
    pub const fn with_logging_size(mut self, size: u32) -> Self {
        self.logging_size = size;
        self
    }

    /// Sets the interrupt delivery policy.
    #[must_use]
    pub const fn with_delivery(mut self, delivery: InterruptDelivery) -> Self {
        self.delivery = delivery;
        self
    }

    /// Sets the number of MSI-X vectors to request.
    #[must_use]
    pub const fn with_msix_vectors(mut self, count: usize) -> Self {
        self.msix_vectors = count;
        self
    }

    /// Enables or disables the SCSI error handler.
    #[must_use]
    pub const fn with_scsi_ehandler(mut self, enabled: bool) -> Self {
        self.scsi_ehandler = enabled;
        self
    }

    /// Sets the driver-disable flag.
    #[must_use]
    pub const fn with_disable(mut self, disable: bool) -> Self {
        self.disable = disable;
        self
    }

    /// Event log size actually allocated: rounded up to a multiple of 32
    /// with a floor of 64 bytes.
    #[must_use]
    pub const fn event_log_size(&self) -> usize {
        let rounded = self.logging_size.div_ceil(32).saturating_mul(32);
        if rounded < MIN_EVENT_LOG_SIZE {
            MIN_EVENT_LOG_SIZE as usize
        } else {
            rounded as usize
        }
    }

    /// MSI-X vectors to request, clamped to `1..=MAX_MSIX_VECTORS`.
    #[must_use]
    pub const fn msix_vector_limit(&self) -> usize {
        if self.msix_vectors == 0 {
            1
        } else if self.msix_vectors > MAX_MSIX_VECTORS {
            MAX_MSIX_VECTORS
        } else {
            self.msix_vectors
        }
    }
}

impl Default for HbaParams {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed table sizes of an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HbaLimits {
    /// Command slots in the CCB pool.
    pub max_ccb: usize,
    /// Entries in the device table.
    pub max_devices: usize,
    /// Entries per inbound/outbound MPI queue.
    pub mpi_queue: usize,
    /// Commands the SCSI host may queue.
    pub can_queue: u32,
}

impl HbaLimits {
    /// Limits of the SPC 8001.
    pub const SPC: Self = Self {
        max_ccb: 512,
        max_devices: 1024,
        mpi_queue: 1024,
        can_queue: 508,
    };
}

impl Default for HbaLimits {
    fn default() -> Self {
        Self::SPC
    }
}
