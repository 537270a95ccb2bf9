//! Process-wide driver state.
//!
//! One [`DriverContext`] is shared by every adapter the driver binds. It
//! hands out instance ids, holds the load-time parameters and chip
//! registry, and keeps the list of live adapters.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, Ordering};

use sashba_core::id::HbaId;
use sashba_core::sync::SpinLock;
use sashba_driver_api::PciAddress;

use crate::chip::ChipRegistry;
use crate::params::{HbaLimits, HbaParams};
use crate::region::RegionLayout;

/// A live adapter as seen by the context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterRecord {
    /// Instance id.
    pub id: HbaId,
    /// Adapter name (`pm8001<id>`).
    pub name: String,
    /// PCI function.
    pub pci: PciAddress,
}

/// Shared state of the driver.
pub struct DriverContext {
    params: HbaParams,
    limits: HbaLimits,
    chips: ChipRegistry,
    region_layout: Option<RegionLayout>,
    next_id: AtomicU32,
    adapters: SpinLock<Vec<AdapterRecord>>,
}

impl DriverContext {
    /// Creates a context with the SPC limits.
    #[must_use]
    pub fn new(params: HbaParams, chips: ChipRegistry) -> Self {
        Self {
            params,
            limits: HbaLimits::SPC,
            chips,
            region_layout: None,
            next_id: AtomicU32::new(0),
            adapters: SpinLock::named("adapters", Vec::new()),
        }
    }

    /// Overrides the table sizes.
    #[must_use]
    pub fn with_limits(mut self, limits: HbaLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Overrides the DMA region table used by new adapters.
    #[must_use]
    pub fn with_region_layout(mut self, layout: RegionLayout) -> Self {
        self.region_layout = Some(layout);
        self
    }

    /// Load-time parameters.
    #[must_use]
    pub fn params(&self) -> &HbaParams {
        &self.params
    }

    /// Table sizes.
    #[must_use]
    pub fn limits(&self) -> &HbaLimits {
        &self.limits
    }

    /// Registered chip implementations.
    #[must_use]
    pub fn chips(&self) -> &ChipRegistry {
        &self.chips
    }

    /// DMA region table for a new adapter.
    #[must_use]
    pub fn region_layout(&self) -> RegionLayout {
        self.region_layout
            .clone()
            .unwrap_or_else(|| RegionLayout::spc(&self.params, &self.limits))
    }

    /// Allocates the next instance id.
    pub fn next_id(&self) -> HbaId {
        HbaId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Name of adapter `id`.
    #[must_use]
    pub fn adapter_name(id: HbaId) -> String {
        format!("pm8001{}", id.as_u32())
    }

    /// Adds a live adapter.
    pub fn attach(&self, record: AdapterRecord) {
        self.adapters.lock().push(record);
    }

    /// Removes adapter `id` from the live list.
    pub fn detach(&self, id: HbaId) {
        self.adapters.lock().retain(|r| r.id != id);
    }

    /// Snapshot of the live adapters.
    #[must_use]
    pub fn adapters(&self) -> Vec<AdapterRecord> {
        self.adapters.lock().clone()
    }

    /// Number of live adapters.
    #[must_use]
    pub fn adapter_count(&self) -> usize {
        self.adapters.lock().len()
    }
}

impl core::fmt::Debug for DriverContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DriverContext")
            .field("params", &self.params)
            .field("limits", &self.limits)
            .field("chips", &self.chips)
            .field("adapters", &self.adapter_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_sequential_and_named() {
        let ctx = DriverContext::new(HbaParams::new(), ChipRegistry::new());
        let a = ctx.next_id();
        let b = ctx.next_id();
        assert_eq!(a, HbaId::new(0));
        assert_eq!(b, HbaId::new(1));
        assert_eq!(DriverContext::adapter_name(b), "pm80011");
    }

    #[test]
    fn attach_and_detach() {
        let ctx = DriverContext::new(HbaParams::new(), ChipRegistry::new());
        let pci = PciAddress::new(0, 4, 0);
        for i in 0..2 {
            let id = HbaId::new(i);
            ctx.attach(AdapterRecord {
                id,
                name: DriverContext::adapter_name(id),
                pci,
            });
        }
        assert_eq!(ctx.adapter_count(), 2);
        ctx.detach(HbaId::new(0));
        let live = ctx.adapters();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].name, "pm80011");
    }

    #[test]
    fn default_layout_follows_params() {
        let ctx = DriverContext::new(HbaParams::new().with_logging_size(10), ChipRegistry::new());
        let layout = ctx.region_layout();
        assert_eq!(layout.len(), 9);
        assert_eq!(layout.specs()[0].total_len(), Some(64));
    }
}
