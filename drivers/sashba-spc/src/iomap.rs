//! BAR to logical I/O window translation.
//!
//! The chip exposes its register sets through logical windows, each backed
//! by one or more raw BARs (a 64-bit BAR consumes the following slot). The
//! first raw BAR of each group supplies the window's base and size.

use alloc::vec::Vec;

use sashba_core::addr::PhysAddr;
use sashba_driver_api::{HbaServices, MmioRegion, PCI_BASE_ADDRESS_MEM_MASK, PciBar};

use crate::error::HbaError;
use crate::params::LogMask;

/// Smallest usable primary register window.
pub const MIN_PRIMARY_WINDOW: u64 = 1 << 15;

/// Raw BAR indices composing each logical window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowLayout {
    windows: &'static [&'static [usize]],
}

impl WindowLayout {
    /// SPC: BARs 0/1, 2/3 are 64-bit pairs; 4 and 5 stand alone.
    pub const SPC: Self = Self::new(&[&[0, 1], &[2, 3], &[4], &[5]]);

    /// Creates a layout from per-window BAR groups.
    #[must_use]
    pub const fn new(windows: &'static [&'static [usize]]) -> Self {
        Self { windows }
    }

    /// Number of logical windows.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.windows.len()
    }

    /// Returns `true` if the layout has no windows.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Raw BAR that supplies logical window `index`.
    #[must_use]
    pub fn primary_bar(&self, index: usize) -> Option<usize> {
        self.windows.get(index).and_then(|group| group.first().copied())
    }
}

/// One logical window. A zeroed window (no region, zero base and size) is
/// one that was absent, not memory, or failed to map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IoWindow {
    base: PhysAddr,
    size: u64,
    region: Option<MmioRegion>,
}

impl IoWindow {
    /// Bus base address.
    #[must_use]
    pub fn base(&self) -> PhysAddr {
        self.base
    }

    /// Length in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// The CPU mapping, if any.
    #[must_use]
    pub fn region(&self) -> Option<&MmioRegion> {
        self.region.as_ref()
    }

    /// Returns `true` if the window is mapped.
    #[must_use]
    pub fn is_mapped(&self) -> bool {
        self.region.is_some()
    }
}

/// The logical windows of one adapter.
#[derive(Debug, Default)]
pub struct IoWindows {
    windows: Vec<IoWindow>,
}

impl IoWindows {
    /// Maps every logical window of `layout` from `bars`.
    ///
    /// Memory BARs are masked with [`PCI_BASE_ADDRESS_MEM_MASK`] and mapped;
    /// anything else leaves the window zeroed. A mapping failure is logged
    /// and also leaves the window zeroed; whether that is fatal is decided by
    /// [`validate_primary`](Self::validate_primary).
    #[must_use]
    pub fn map(
        layout: &WindowLayout,
        bars: &[PciBar; 6],
        services: &dyn HbaServices,
        log_mask: LogMask,
    ) -> Self {
        let windows = (0..layout.len())
            .map(|logical| {
                let bar = layout.primary_bar(logical).and_then(|raw| bars.get(raw));
                match bar {
                    Some(&PciBar::Memory { base, size, .. }) => {
                        let base = PhysAddr::new_truncate(base & PCI_BASE_ADDRESS_MEM_MASK);
                        match services.map_mmio(base, size) {
                            Ok(region) => {
                                init_dbg!(
                                    log_mask,
                                    "window {logical}: base {base} len {size:#x} virt {}",
                                    region.virt_base()
                                );
                                IoWindow {
                                    base,
                                    size,
                                    region: Some(region),
                                }
                            }
                            Err(err) => {
                                fail_dbg!(log_mask, "window {logical}: map of {base} failed: {err}");
                                IoWindow::default()
                            }
                        }
                    }
                    _ => {
                        init_dbg!(log_mask, "window {logical}: not memory, zeroing out");
                        IoWindow::default()
                    }
                }
            })
            .collect();
        Self { windows }
    }

    /// Returns logical window `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&IoWindow> {
        self.windows.get(index)
    }

    /// Number of logical windows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// Returns `true` if there are no windows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Number of windows currently mapped.
    #[must_use]
    pub fn mapped_count(&self) -> usize {
        self.windows.iter().filter(|w| w.is_mapped()).count()
    }

    /// Checks that window 0 is mapped and at least
    /// [`MIN_PRIMARY_WINDOW`] bytes long.
    pub fn validate_primary(&self) -> Result<(), HbaError> {
        match self.windows.first() {
            Some(w) if w.is_mapped() && w.size >= MIN_PRIMARY_WINDOW => Ok(()),
            Some(w) => Err(HbaError::InvalidDeviceWindow { size: w.size }),
            None => Err(HbaError::InvalidDeviceWindow { size: 0 }),
        }
    }

    /// Unmaps every mapped window. Windows are left zeroed, so a second call
    /// does nothing.
    pub fn unmap(&mut self, services: &dyn HbaServices) {
        for window in &mut self.windows {
            if let Some(region) = window.region.take() {
                // SAFETY: Callers reset the chip or never started it before
                // unmapping, and no pointer into the window outlives this.
                unsafe { services.unmap_mmio(region) };
            }
            *window = IoWindow::default();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockPlatform, spc_device_info};

    #[test]
    fn spc_layout_uses_first_bar_of_each_group() {
        let layout = WindowLayout::SPC;
        assert_eq!(layout.len(), 4);
        assert_eq!(layout.primary_bar(0), Some(0));
        assert_eq!(layout.primary_bar(1), Some(2));
        assert_eq!(layout.primary_bar(2), Some(4));
        assert_eq!(layout.primary_bar(3), Some(5));
        assert_eq!(layout.primary_bar(4), None);
    }

    #[test]
    fn memory_bars_mapped_io_bars_zeroed() {
        let platform = MockPlatform::new();
        let mut info = spc_device_info();
        if let PciBar::Memory { base, .. } = &mut info.bars[0] {
            *base |= 0xC;
        }
        let windows = IoWindows::map(&WindowLayout::SPC, &info.bars, &*platform, LogMask::all());

        assert_eq!(windows.len(), 4);
        assert_eq!(windows.mapped_count(), 3);
        let primary = windows.get(0).unwrap();
        assert!(primary.base().is_aligned(16));
        assert_eq!(primary.size(), 64 * 1024);
        assert_eq!(*windows.get(3).unwrap(), IoWindow::default());
        assert!(windows.validate_primary().is_ok());
        assert_eq!(platform.mmio_map_count(), 3);
    }

    #[test]
    fn small_or_missing_primary_rejected() {
        let platform = MockPlatform::new();
        let mut info = spc_device_info();
        if let PciBar::Memory { size, .. } = &mut info.bars[0] {
            *size = 0x4000;
        }
        let mut windows =
            IoWindows::map(&WindowLayout::SPC, &info.bars, &*platform, LogMask::empty());
        assert_eq!(
            windows.validate_primary(),
            Err(HbaError::InvalidDeviceWindow { size: 0x4000 })
        );
        windows.unmap(&*platform);

        info.bars[0] = PciBar::Unused;
        let windows = IoWindows::map(&WindowLayout::SPC, &info.bars, &*platform, LogMask::empty());
        assert_eq!(
            windows.validate_primary(),
            Err(HbaError::InvalidDeviceWindow { size: 0 })
        );
    }

    #[test]
    fn failed_map_leaves_window_zeroed() {
        let platform = MockPlatform::new();
        platform.fail_map_mmio(true);
        let windows = IoWindows::map(
            &WindowLayout::SPC,
            &spc_device_info().bars,
            &*platform,
            LogMask::empty(),
        );
        assert_eq!(windows.mapped_count(), 0);
        assert!(windows.validate_primary().is_err());
    }

    #[test]
    fn unmap_releases_each_window_once() {
        let platform = MockPlatform::new();
        let mut windows = IoWindows::map(
            &WindowLayout::SPC,
            &spc_device_info().bars,
            &*platform,
            LogMask::empty(),
        );
        windows.unmap(&*platform);
        windows.unmap(&*platform);
        assert_eq!(platform.mmio_unmap_count(), 3);
        assert_eq!(windows.mapped_count(), 0);
    }
}
