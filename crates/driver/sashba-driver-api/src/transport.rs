//! The SCSI/SAS midlayer seen from an adapter driver.
//!
//! The adapter allocates a host, adds it to the SCSI core, and registers
//! its phys with the SAS domain layer. Everything above that (command
//! queueing, discovery, error handling) stays on the transport's side.

use core::fmt;

use sashba_core::id::HbaId;

use crate::error::DriverError;
use crate::pci::PciAddress;

/// Handle to a host allocated by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct HostHandle(u64);

impl HostHandle {
    /// Creates a new `HostHandle`.
    #[must_use]
    pub const fn new(val: u64) -> Self {
        Self(val)
    }

    /// Returns the raw `u64` value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HostHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "host{}", self.0)
    }
}

/// Limits advertised to the SCSI core when a host is allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostConfig {
    /// Unique host number (the adapter id).
    pub unique_id: HbaId,
    /// Highest target id.
    pub max_id: u32,
    /// Highest LUN.
    pub max_lun: u32,
    /// Highest channel.
    pub max_channel: u32,
    /// Longest CDB accepted.
    pub max_cmd_len: u16,
    /// Commands the host can have outstanding.
    pub can_queue: u32,
    /// Commands per LUN.
    pub cmd_per_lun: u16,
    /// Whether the SCSI error handler thread runs for this host.
    pub error_handler: bool,
}

/// What the SAS domain layer learns about a registered adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HaInfo {
    /// Adapter-wide SAS address (that of phy 0).
    pub sas_addr: u64,
    /// Number of phys registered.
    pub num_phys: u8,
}

/// Trait implemented by the SCSI/SAS transport the adapter registers with.
pub trait SasTransport: Send + Sync {
    /// Allocates a host described by `config`.
    fn alloc_host(&self, name: &str, config: &HostConfig) -> Result<HostHandle, DriverError>;

    /// Drops the last reference to a host.
    fn release_host(&self, host: HostHandle);

    /// Makes the host visible to the SCSI core.
    fn add_host(&self, host: HostHandle, parent: PciAddress) -> Result<(), DriverError>;

    /// Removes the host from the SCSI core.
    fn remove_host(&self, host: HostHandle);

    /// Registers the adapter's phys and ports with the SAS domain layer.
    fn register_ha(&self, host: HostHandle, info: &HaInfo) -> Result<(), DriverError>;

    /// Undoes [`register_ha`](Self::register_ha).
    fn unregister_ha(&self, host: HostHandle);

    /// Starts target discovery.
    fn scan_host(&self, host: HostHandle);

    /// Stops the midlayer from issuing new commands.
    fn block_requests(&self, host: HostHandle);

    /// Allows the midlayer to issue commands again.
    fn unblock_requests(&self, host: HostHandle);
}
