//! Hardware resource types representing exclusive claims on MMIO windows
//! and coherent DMA memory.

use sashba_core::addr::{PhysAddr, VirtAddr};

/// An exclusive claim on a memory-mapped I/O region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MmioRegion {
    phys_base: PhysAddr,
    virt_base: VirtAddr,
    size: u64,
}

impl MmioRegion {
    /// Creates a new MMIO region descriptor.
    ///
    /// # Safety
    ///
    /// The caller must ensure that:
    /// - `phys_base` and `virt_base` refer to the same physical region.
    /// - The region is not claimed by another driver.
    /// - The virtual mapping is valid until the region is unmapped.
    #[must_use]
    pub const unsafe fn new(phys_base: PhysAddr, virt_base: VirtAddr, size: u64) -> Self {
        Self {
            phys_base,
            virt_base,
            size,
        }
    }

    /// Returns the physical base address.
    #[must_use]
    pub const fn phys_base(&self) -> PhysAddr {
        self.phys_base
    }

    /// Returns the virtual base address.
    #[must_use]
    pub const fn virt_base(&self) -> VirtAddr {
        self.virt_base
    }

    /// Returns the size of the region in bytes.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Returns a pointer to the given byte offset within the region.
    ///
    /// Returns `None` if the offset is out of bounds.
    #[must_use]
    pub const fn ptr_at(&self, offset: u64) -> Option<*mut u8> {
        if offset < self.size {
            Some((self.virt_base.as_u64() + offset) as usize as *mut u8)
        } else {
            None
        }
    }
}

/// A block of coherent DMA memory granted by the platform.
///
/// The buffer is an ownership token: it is neither `Copy` nor `Clone`, and
/// handing it back to [`HbaServices::free_coherent`] consumes it.
///
/// [`HbaServices::free_coherent`]: crate::services::HbaServices::free_coherent
#[derive(Debug, PartialEq, Eq)]
pub struct DmaBuffer {
    phys: PhysAddr,
    virt: VirtAddr,
    len: usize,
}

impl DmaBuffer {
    /// Creates a new DMA buffer descriptor.
    ///
    /// # Safety
    ///
    /// The caller must ensure that `virt` maps `len` bytes of memory that the
    /// device reaches at `phys`, and that the mapping stays valid and
    /// unaliased until the buffer is freed.
    #[must_use]
    pub const unsafe fn new(phys: PhysAddr, virt: VirtAddr, len: usize) -> Self {
        Self { phys, virt, len }
    }

    /// Returns the bus address the device uses.
    #[must_use]
    pub const fn phys(&self) -> PhysAddr {
        self.phys
    }

    /// Returns the CPU virtual address.
    #[must_use]
    pub const fn virt(&self) -> VirtAddr {
        self.virt
    }

    /// Returns the length in bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` for a zero-length buffer.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the buffer contents as a mutable byte slice.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        if self.len == 0 {
            return &mut [];
        }
        // SAFETY: The constructor contract guarantees `virt` maps `len`
        // bytes owned by this buffer; `&mut self` rules out aliasing.
        unsafe { core::slice::from_raw_parts_mut(self.virt.as_mut_ptr::<u8>(), self.len) }
    }

    /// Fills the whole buffer with zeroes.
    pub fn zero(&mut self) {
        self.as_mut_slice().fill(0);
    }
}
