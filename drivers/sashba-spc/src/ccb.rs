//! Fixed pool of command control blocks.
//!
//! Every slot is bound at initialisation to one element of the CCB region;
//! the slot index doubles as the command tag handed to the firmware. An
//! allocation bitmap tracks which tags are outstanding. The pool never
//! allocates after initialisation, so the command path cannot block on
//! memory.

use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;

use sashba_core::addr::PhysAddr;
use sashba_core::id::{CcbTag, DeviceId, TaskRef};
use sashba_core::sync::IrqSpinLock;

use crate::error::HbaError;
use crate::region::MemoryRegion;

const WORD_BITS: usize = u64::BITS as usize;

/// Snapshot of one command slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSlot {
    /// Bus address of the slot's element in the CCB region.
    pub dma_handle: PhysAddr,
    /// Tag while outstanding, `None` while free.
    pub tag: Option<CcbTag>,
    /// Device the command targets.
    pub device: Option<DeviceId>,
    /// Transport task that issued the command.
    pub task: Option<TaskRef>,
}

impl CommandSlot {
    const fn unused(dma_handle: PhysAddr) -> Self {
        Self {
            dma_handle,
            tag: None,
            device: None,
            task: None,
        }
    }
}

/// What [`CcbPool::acquire`] hands out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotHandle {
    /// Tag identifying the slot until it is released.
    pub tag: CcbTag,
    /// Bus address of the slot's element in the CCB region.
    pub dma_handle: PhysAddr,
}

struct PoolInner {
    /// One bit per slot, set while outstanding. Bits past the capacity are
    /// permanently set.
    bitmap: Vec<u64>,
    slots: Box<[CommandSlot]>,
    outstanding: usize,
}

impl PoolInner {
    fn empty() -> Self {
        Self {
            bitmap: Vec::new(),
            slots: Box::new([]),
            outstanding: 0,
        }
    }

    fn is_set(&self, index: usize) -> bool {
        self.bitmap[index / WORD_BITS] & (1 << (index % WORD_BITS)) != 0
    }

    fn first_free(&self) -> Option<usize> {
        self.bitmap.iter().enumerate().find_map(|(word, bits)| {
            let free = !bits;
            (free != 0).then(|| word * WORD_BITS + free.trailing_zeros() as usize)
        })
    }
}

/// The per-adapter command slot pool.
pub struct CcbPool {
    inner: IrqSpinLock<PoolInner>,
    capacity: usize,
}

impl Default for CcbPool {
    fn default() -> Self {
        Self {
            inner: IrqSpinLock::named("ccb_pool", PoolInner::empty()),
            capacity: 0,
        }
    }
}

impl CcbPool {
    /// Creates a pool over `region` with up to `capacity` slots.
    #[must_use]
    pub fn new(region: &MemoryRegion, capacity: usize) -> Self {
        let mut pool = Self::default();
        pool.initialize(region, capacity);
        pool
    }

    /// (Re)binds slot `i` to element `i` of `region` with no tag and no
    /// bindings. Returns the number of slots initialised, which is
    /// `capacity` clamped to the region's element count.
    pub fn initialize(&mut self, region: &MemoryRegion, capacity: usize) -> usize {
        let count = capacity.min(region.element_count());
        let slots: Box<[CommandSlot]> = (0..count)
            .filter_map(|i| region.element_phys(i))
            .map(CommandSlot::unused)
            .collect();
        let count = slots.len();

        let words = count.div_ceil(WORD_BITS);
        let mut bitmap = vec![0u64; words];
        let tail = count % WORD_BITS;
        if tail != 0 {
            if let Some(last) = bitmap.last_mut() {
                *last = !0u64 << tail;
            }
        }

        *self.inner.get_mut() = PoolInner {
            bitmap,
            slots,
            outstanding: 0,
        };
        self.capacity = count;
        count
    }

    /// Claims the lowest free slot.
    ///
    /// Returns [`HbaError::PoolExhausted`] when every slot is outstanding;
    /// the caller retries later or fails the command.
    pub fn acquire(&self) -> Result<SlotHandle, HbaError> {
        let mut inner = self.inner.lock();
        let index = inner.first_free().ok_or(HbaError::PoolExhausted)?;
        inner.bitmap[index / WORD_BITS] |= 1 << (index % WORD_BITS);
        inner.outstanding += 1;

        #[allow(clippy::cast_possible_truncation)]
        let tag = CcbTag::new(index as u32);
        let slot = &mut inner.slots[index];
        slot.tag = Some(tag);
        Ok(SlotHandle {
            tag,
            dma_handle: slot.dma_handle,
        })
    }

    /// Attaches the target device and issuing task to an outstanding tag.
    pub fn bind(
        &self,
        tag: CcbTag,
        device: Option<DeviceId>,
        task: Option<TaskRef>,
    ) -> Result<(), HbaError> {
        let mut inner = self.inner.lock();
        let index = Self::outstanding_index(&inner, tag)?;
        let slot = &mut inner.slots[index];
        slot.device = device;
        slot.task = task;
        Ok(())
    }

    /// Returns an outstanding tag to the pool, clearing its bindings first.
    ///
    /// A tag that is out of range, was never acquired, or was already
    /// released yields [`HbaError::InvalidTag`] and leaves the pool as it
    /// was.
    pub fn release(&self, tag: CcbTag) -> Result<(), HbaError> {
        let mut inner = self.inner.lock();
        let index = Self::outstanding_index(&inner, tag)?;
        let slot = &mut inner.slots[index];
        slot.task = None;
        slot.device = None;
        slot.tag = None;
        inner.bitmap[index / WORD_BITS] &= !(1 << (index % WORD_BITS));
        inner.outstanding -= 1;
        Ok(())
    }

    fn outstanding_index(inner: &PoolInner, tag: CcbTag) -> Result<usize, HbaError> {
        let index = tag.as_usize();
        if index < inner.slots.len() && inner.is_set(index) {
            Ok(index)
        } else {
            Err(HbaError::InvalidTag(tag))
        }
    }

    /// Number of slots in the pool.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots currently free.
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.capacity - self.outstanding_count()
    }

    /// Number of slots currently outstanding.
    #[must_use]
    pub fn outstanding_count(&self) -> usize {
        self.inner.lock().outstanding
    }

    /// Tags currently outstanding, in ascending order.
    #[must_use]
    pub fn outstanding_tags(&self) -> Vec<CcbTag> {
        let inner = self.inner.lock();
        inner.slots.iter().filter_map(|s| s.tag).collect()
    }

    /// Snapshot of the slot `tag` names, whether or not it is outstanding.
    #[must_use]
    pub fn slot(&self, tag: CcbTag) -> Option<CommandSlot> {
        self.inner.lock().slots.get(tag.as_usize()).copied()
    }
}

impl core::fmt::Debug for CcbPool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CcbPool")
            .field("capacity", &self.capacity)
            .field("outstanding", &self.outstanding_count())
            .finish()
    }
}
