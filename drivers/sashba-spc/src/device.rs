//! Attached-device table.

use alloc::boxed::Box;

use sashba_core::id::DeviceId;

/// What occupies a device table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceKind {
    /// Free entry.
    #[default]
    Unused,
    /// SAS end device.
    SasEnd,
    /// SATA device, direct or behind STP.
    Sata,
    /// Edge expander.
    EdgeExpander,
    /// Fanout expander.
    FanoutExpander,
}

/// One device table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceEntry {
    /// What the entry holds.
    pub kind: DeviceKind,
    /// Index in the table.
    pub id: DeviceId,
    /// Firmware-assigned device id, `None` until registered with the chip.
    pub device_id: Option<u32>,
    /// Commands outstanding against the device.
    pub running_req: u32,
}

impl DeviceEntry {
    const fn unused(id: DeviceId) -> Self {
        Self {
            kind: DeviceKind::Unused,
            id,
            device_id: None,
            running_req: 0,
        }
    }
}

/// Fixed-capacity table of devices seen by one adapter.
#[derive(Debug)]
pub struct DeviceTable {
    entries: Box<[DeviceEntry]>,
}

impl DeviceTable {
    /// Creates `capacity` unused entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let entries = (0..capacity)
            .map(|i| DeviceEntry::unused(DeviceId::new(i as u32)))
            .collect();
        Self { entries }
    }

    /// Number of entries.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Returns entry `id`, `None` when out of range.
    #[must_use]
    pub fn get(&self, id: DeviceId) -> Option<&DeviceEntry> {
        self.entries.get(id.as_usize())
    }

    /// Returns entry `id` mutably, `None` when out of range.
    pub fn get_mut(&mut self, id: DeviceId) -> Option<&mut DeviceEntry> {
        self.entries.get_mut(id.as_usize())
    }

    /// Iterates over every entry.
    pub fn iter(&self) -> impl Iterator<Item = &DeviceEntry> {
        self.entries.iter()
    }

    /// Claims the first unused entry for a device of `kind`.
    pub fn allocate(&mut self, kind: DeviceKind) -> Option<DeviceId> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.kind == DeviceKind::Unused)?;
        entry.kind = kind;
        Some(entry.id)
    }

    /// Returns entry `id` to the unused state.
    pub fn free(&mut self, id: DeviceId) {
        if let Some(entry) = self.get_mut(id) {
            *entry = DeviceEntry::unused(id);
        }
    }
}
