//! PCI bus types used by adapter drivers: addressing, ID matching, decoded
//! BARs, command register bits, DMA masks and power states.

use bitflags::bitflags;

/// PCI bus/device/function address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PciAddress {
    /// Bus number (0-255).
    pub bus: u8,
    /// Device number (0-31).
    pub device: u8,
    /// Function number (0-7).
    pub function: u8,
}

impl PciAddress {
    /// Creates a new bus/device/function address.
    #[must_use]
    pub const fn new(bus: u8, device: u8, function: u8) -> Self {
        Self {
            bus,
            device,
            function,
        }
    }
}

impl core::fmt::Display for PciAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:02x}:{:02x}.{}", self.bus, self.device, self.function)
    }
}

/// Wildcard value for PCI ID matching: matches any vendor/device ID.
pub const PCI_ANY_ID: u16 = 0xFFFF;

/// PCI device ID for driver-to-device matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PciDeviceId {
    /// Vendor ID (`PCI_ANY_ID` = wildcard).
    pub vendor: u16,
    /// Device ID (`PCI_ANY_ID` = wildcard).
    pub device: u16,
    /// Subsystem vendor ID (`PCI_ANY_ID` = wildcard).
    pub subvendor: u16,
    /// Subsystem device ID (`PCI_ANY_ID` = wildcard).
    pub subdevice: u16,
}

impl PciDeviceId {
    /// Creates an ID entry matching a specific vendor/device pair.
    #[must_use]
    pub const fn new(vendor: u16, device: u16) -> Self {
        Self {
            vendor,
            device,
            subvendor: PCI_ANY_ID,
            subdevice: PCI_ANY_ID,
        }
    }

    /// Returns `true` if this ID entry matches the given device info.
    #[must_use]
    pub fn matches(&self, info: &PciDeviceInfo) -> bool {
        let field = |want: u16, have: u16| want == PCI_ANY_ID || want == have;
        field(self.vendor, info.vendor_id)
            && field(self.device, info.device_id)
            && field(self.subvendor, info.subsystem_vendor_id)
            && field(self.subdevice, info.subsystem_device_id)
    }
}

/// Mask applied to a memory BAR's base to strip the type/prefetch flag bits.
pub const PCI_BASE_ADDRESS_MEM_MASK: u64 = !0xF;

/// Decoded PCI Base Address Register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PciBar {
    /// Memory-mapped BAR.
    Memory {
        /// Base physical address.
        base: u64,
        /// Size in bytes.
        size: u64,
        /// Whether the region is prefetchable.
        prefetchable: bool,
        /// Whether this is a 64-bit BAR (consumes two BAR slots).
        is_64bit: bool,
    },
    /// I/O port BAR.
    Io {
        /// Base I/O port address.
        base: u32,
        /// Size in bytes.
        size: u32,
    },
    /// BAR slot is unused or consumed by the upper half of a 64-bit BAR.
    Unused,
}

impl PciBar {
    /// Returns `true` for a memory BAR.
    #[must_use]
    pub const fn is_memory(&self) -> bool {
        matches!(self, Self::Memory { .. })
    }
}

/// Information about a discovered PCI function, as handed to probe.
#[derive(Debug, Clone, Copy)]
pub struct PciDeviceInfo {
    /// Bus/device/function address.
    pub address: PciAddress,
    /// Vendor ID.
    pub vendor_id: u16,
    /// Device ID.
    pub device_id: u16,
    /// Revision ID.
    pub revision: u8,
    /// Subsystem vendor ID.
    pub subsystem_vendor_id: u16,
    /// Subsystem device ID.
    pub subsystem_device_id: u16,
    /// Legacy interrupt line configured by firmware.
    pub interrupt_line: u8,
    /// Base Address Registers.
    pub bars: [PciBar; 6],
}

bitflags! {
    /// PCI command register bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PciCommand: u16 {
        /// Respond to I/O space accesses.
        const IO_SPACE = 1 << 0;
        /// Respond to memory space accesses.
        const MEMORY_SPACE = 1 << 1;
        /// Act as a bus master.
        const BUS_MASTER = 1 << 2;
        /// Monitor special cycles.
        const SPECIAL_CYCLES = 1 << 3;
        /// Memory write and invalidate.
        const MEMORY_WRITE_INVALIDATE = 1 << 4;
        /// VGA palette snooping.
        const VGA_PALETTE_SNOOP = 1 << 5;
        /// Parity error response.
        const PARITY_ERROR_RESPONSE = 1 << 6;
        /// SERR# driver enable.
        const SERR_ENABLE = 1 << 8;
        /// Fast back-to-back transactions.
        const FAST_BACK_TO_BACK = 1 << 9;
        /// Legacy INTx disable.
        const INTX_DISABLE = 1 << 10;
    }
}

/// Addressing capability of a device's DMA engine, in bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DmaMask(u8);

impl DmaMask {
    /// 32-bit addressing.
    pub const BITS_32: Self = Self(32);
    /// 44-bit addressing.
    pub const BITS_44: Self = Self(44);
    /// 64-bit addressing.
    pub const BITS_64: Self = Self(64);

    /// Returns the number of address bits.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns the mask value (`DMA_BIT_MASK(n)`).
    #[must_use]
    pub const fn mask(self) -> u64 {
        if self.0 >= 64 {
            u64::MAX
        } else {
            (1u64 << self.0) - 1
        }
    }
}

/// PCI device power state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PowerState {
    /// Fully on.
    D0,
    /// Light sleep.
    D1,
    /// Deeper sleep.
    D2,
    /// Off, configuration space still reachable.
    D3Hot,
    /// Off, no power.
    D3Cold,
}

impl PowerState {
    /// Returns the numeric state (`D0` = 0 .. `D3Cold` = 4).
    #[must_use]
    pub const fn index(self) -> u8 {
        self as u8
    }
}

impl core::fmt::Display for PowerState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::D0 => f.write_str("D0"),
            Self::D1 => f.write_str("D1"),
            Self::D2 => f.write_str("D2"),
            Self::D3Hot => f.write_str("D3hot"),
            Self::D3Cold => f.write_str("D3cold"),
        }
    }
}

/// System power transition that triggered a suspend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PmEvent {
    /// Suspend to RAM.
    Suspend,
    /// Quiesce for a snapshot.
    Freeze,
    /// Suspend to disk.
    Hibernate,
}
