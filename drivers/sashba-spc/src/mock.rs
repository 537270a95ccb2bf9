//! Host-side doubles for the platform, the transport and the chip.
//!
//! [`MockPlatform`] backs coherent DMA with heap memory and fake bus
//! addresses, counts every acquire/release call, and lets tests inject
//! failures at any step.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use sashba_core::addr::{PhysAddr, VirtAddr};
use sashba_core::id::IrqVector;
use sashba_driver_api::{
    BottomHalf, DmaBuffer, DmaMask, DriverError, HaInfo, HbaServices, HostConfig, HostHandle,
    InterruptHandler, IrqFlags, IrqReturn, MmioRegion, PciAddress, PciBar, PciCommand,
    PciDeviceInfo, PmEvent, PowerState, SasTransport,
};

use crate::ccb::CcbPool;
use crate::chip::{ChipHw, ChipOps, NvramRequest, ResetSignature};
use crate::hba::HbaShared;
use crate::iomap::IoWindows;
use crate::params::LogMask;
use crate::region::MemoryMap;

/// Legacy line handed out by the mock platform.
pub const LEGACY_VECTOR: IrqVector = IrqVector::new(11);

const MSIX_BASE_VECTOR: u32 = 40;
const DMA_BASE: u64 = 0x1000_0000;
const MMIO_VIRT_BASE: u64 = 0xFFFF_9000_0000_0000;

/// A PMC-Sierra SPC 8001 function: two 64-bit memory BARs, one 32-bit
/// memory BAR and an I/O BAR.
pub fn spc_device_info() -> PciDeviceInfo {
    PciDeviceInfo {
        address: PciAddress::new(3, 0, 0),
        vendor_id: 0x11F8,
        device_id: 0x8001,
        revision: 1,
        subsystem_vendor_id: 0x11F8,
        subsystem_device_id: 0x0001,
        interrupt_line: 11,
        bars: [
            PciBar::Memory {
                base: 0xFEB0_0000,
                size: 0x1_0000,
                prefetchable: false,
                is_64bit: true,
            },
            PciBar::Unused,
            PciBar::Memory {
                base: 0xFEA0_0000,
                size: 0x1_0000,
                prefetchable: false,
                is_64bit: true,
            },
            PciBar::Unused,
            PciBar::Memory {
                base: 0xFE90_0000,
                size: 0x1000,
                prefetchable: false,
                is_64bit: false,
            },
            PciBar::Io {
                base: 0xE000,
                size: 0x100,
            },
        ],
    }
}

/// Builds a shared adapter state with no memory or windows, for interrupt
/// tests.
pub fn test_shared(platform: &Arc<MockPlatform>, chip: &Arc<MockChip>) -> Arc<HbaShared> {
    Arc::new(HbaShared {
        name: "pm8001-test".into(),
        pci: spc_device_info().address,
        chip: Arc::clone(chip) as Arc<dyn ChipOps>,
        services: Arc::clone(platform) as Arc<dyn HbaServices>,
        windows: IoWindows::default(),
        memory: MemoryMap::default(),
        ccbs: CcbPool::default(),
        log_mask: LogMask::all(),
        log_option: 0,
    })
}

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

/// Transport calls, in the order they succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEvent {
    AllocHost,
    ReleaseHost,
    AddHost,
    RemoveHost,
    RegisterHa,
    UnregisterHa,
    Scan,
    Block,
    Unblock,
}

#[derive(Default)]
struct Faults {
    dma_alloc_at: Option<usize>,
    misalign_at: Option<usize>,
    map_mmio: bool,
    msix_enable: bool,
    msix_request: bool,
    legacy_request: bool,
    dma_mask_44: bool,
    register_ha: bool,
}

struct State {
    faults: Faults,
    msix_capable: bool,
    pm_capable: bool,
    dma_fill: u8,

    dma_calls: usize,
    dma_allocs: usize,
    dma_frees: usize,
    dma_bytes: usize,
    dma_next: u64,
    dma_live: HashMap<u64, Box<[u8]>>,

    mmio_maps: usize,
    mmio_unmaps: usize,
    mmio_live: usize,

    irq_requests: usize,
    irq_frees: usize,
    irq_syncs: usize,
    last_irq_flags: Option<IrqFlags>,
    handlers: HashMap<u32, Arc<dyn InterruptHandler>>,
    msix_disables: usize,
    bottom_halves: Vec<Arc<dyn BottomHalf>>,

    device_enabled: bool,
    regions_claimed: bool,
    command: PciCommand,
    dma_mask: Option<DmaMask>,
    power_state: Option<PowerState>,

    next_host: u64,
    live_hosts: usize,
    host_config: Option<HostConfig>,
    ha_info: Option<HaInfo>,
    blocked: bool,
    events: Vec<TransportEvent>,
}

/// Fault-injecting [`HbaServices`] and [`SasTransport`].
pub struct MockPlatform {
    state: Mutex<State>,
}

impl MockPlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State {
                faults: Faults::default(),
                msix_capable: false,
                pm_capable: true,
                dma_fill: 0xA5,
                dma_calls: 0,
                dma_allocs: 0,
                dma_frees: 0,
                dma_bytes: 0,
                dma_next: DMA_BASE,
                dma_live: HashMap::new(),
                mmio_maps: 0,
                mmio_unmaps: 0,
                mmio_live: 0,
                irq_requests: 0,
                irq_frees: 0,
                irq_syncs: 0,
                last_irq_flags: None,
                handlers: HashMap::new(),
                msix_disables: 0,
                bottom_halves: Vec::new(),
                device_enabled: false,
                regions_claimed: false,
                command: PciCommand::empty(),
                dma_mask: None,
                power_state: None,
                next_host: 0,
                live_hosts: 0,
                host_config: None,
                ha_info: None,
                blocked: false,
                events: Vec::new(),
            }),
        })
    }

    fn with<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    // -- fault injection ----------------------------------------------------

    /// Fails the `k`-th (0-based) coherent allocation.
    pub fn fail_dma_alloc_at(&self, k: usize) {
        self.with(|s| s.faults.dma_alloc_at = Some(k));
    }

    /// Grants the `k`-th allocation at a misaligned bus address.
    pub fn misalign_dma_alloc_at(&self, k: usize) {
        self.with(|s| s.faults.misalign_at = Some(k));
    }

    pub fn set_dma_fill(&self, byte: u8) {
        self.with(|s| s.dma_fill = byte);
    }

    pub fn fail_map_mmio(&self, fail: bool) {
        self.with(|s| s.faults.map_mmio = fail);
    }

    pub fn set_msix_capable(&self, capable: bool) {
        self.with(|s| s.msix_capable = capable);
    }

    pub fn fail_msix_enable(&self, fail: bool) {
        self.with(|s| s.faults.msix_enable = fail);
    }

    pub fn fail_msix_request(&self, fail: bool) {
        self.with(|s| s.faults.msix_request = fail);
    }

    pub fn fail_legacy_request(&self, fail: bool) {
        self.with(|s| s.faults.legacy_request = fail);
    }

    pub fn set_pm_capable(&self, capable: bool) {
        self.with(|s| s.pm_capable = capable);
    }

    pub fn fail_dma_mask_44(&self, fail: bool) {
        self.with(|s| s.faults.dma_mask_44 = fail);
    }

    pub fn fail_register_ha(&self, fail: bool) {
        self.with(|s| s.faults.register_ha = fail);
    }

    // -- observation --------------------------------------------------------

    pub fn dma_alloc_count(&self) -> usize {
        self.with(|s| s.dma_allocs)
    }

    pub fn dma_free_count(&self) -> usize {
        self.with(|s| s.dma_frees)
    }

    pub fn dma_live_count(&self) -> usize {
        self.with(|s| s.dma_live.len())
    }

    pub fn dma_bytes_requested(&self) -> usize {
        self.with(|s| s.dma_bytes)
    }

    /// Current contents of the live buffer at `phys`.
    pub fn dma_bytes(&self, phys: PhysAddr) -> Vec<u8> {
        self.with(|s| {
            s.dma_live
                .get(&phys.as_u64())
                .map(|b| b.to_vec())
                .unwrap_or_default()
        })
    }

    pub fn mmio_map_count(&self) -> usize {
        self.with(|s| s.mmio_maps)
    }

    pub fn mmio_unmap_count(&self) -> usize {
        self.with(|s| s.mmio_unmaps)
    }

    pub fn mmio_live_count(&self) -> usize {
        self.with(|s| s.mmio_live)
    }

    pub fn irq_request_count(&self) -> usize {
        self.with(|s| s.irq_requests)
    }

    pub fn irq_free_count(&self) -> usize {
        self.with(|s| s.irq_frees)
    }

    pub fn irq_sync_count(&self) -> usize {
        self.with(|s| s.irq_syncs)
    }

    pub fn live_irq_count(&self) -> usize {
        self.with(|s| s.handlers.len())
    }

    pub fn last_irq_flags(&self) -> Option<IrqFlags> {
        self.with(|s| s.last_irq_flags)
    }

    pub fn msix_disable_count(&self) -> usize {
        self.with(|s| s.msix_disables)
    }

    pub fn device_enabled(&self) -> bool {
        self.with(|s| s.device_enabled)
    }

    pub fn regions_claimed(&self) -> bool {
        self.with(|s| s.regions_claimed)
    }

    pub fn last_command(&self) -> PciCommand {
        self.with(|s| s.command)
    }

    pub fn dma_mask(&self) -> Option<DmaMask> {
        self.with(|s| s.dma_mask)
    }

    pub fn power_state(&self) -> Option<PowerState> {
        self.with(|s| s.power_state)
    }

    pub fn live_host_count(&self) -> usize {
        self.with(|s| s.live_hosts)
    }

    pub fn host_config(&self) -> Option<HostConfig> {
        self.with(|s| s.host_config)
    }

    pub fn ha_info(&self) -> Option<HaInfo> {
        self.with(|s| s.ha_info)
    }

    pub fn requests_blocked(&self) -> bool {
        self.with(|s| s.blocked)
    }

    pub fn transport_events(&self) -> Vec<TransportEvent> {
        self.with(|s| s.events.clone())
    }

    // -- driving ------------------------------------------------------------

    /// Raises `vector`. Returns `None` if no handler is installed.
    pub fn fire(&self, vector: IrqVector) -> Option<IrqReturn> {
        let handler = self.with(|s| s.handlers.get(&vector.as_u32()).cloned())?;
        Some(handler.handle(vector))
    }

    /// Runs every queued bottom half and returns how many ran.
    pub fn run_bottom_halves(&self) -> usize {
        let mut ran = 0;
        loop {
            let queued = self.with(|s| std::mem::take(&mut s.bottom_halves));
            if queued.is_empty() {
                return ran;
            }
            ran += queued.len();
            for work in queued {
                work.run();
            }
        }
    }
}

impl HbaServices for MockPlatform {
    fn enable_device(&self, _pci: PciAddress) -> Result<(), DriverError> {
        self.with(|s| s.device_enabled = true);
        Ok(())
    }

    fn disable_device(&self, _pci: PciAddress) {
        self.with(|s| s.device_enabled = false);
    }

    fn set_bus_master(&self, _pci: PciAddress) {
        self.with(|s| s.command |= PciCommand::BUS_MASTER);
    }

    fn read_command(&self, _pci: PciAddress) -> PciCommand {
        self.with(|s| s.command)
    }

    fn write_command(&self, _pci: PciAddress, command: PciCommand) {
        self.with(|s| s.command = command);
    }

    fn request_regions(&self, _pci: PciAddress, _owner: &str) -> Result<(), DriverError> {
        self.with(|s| {
            if s.regions_claimed {
                return Err(DriverError::ResourceConflict);
            }
            s.regions_claimed = true;
            Ok(())
        })
    }

    fn release_regions(&self, _pci: PciAddress) {
        self.with(|s| s.regions_claimed = false);
    }

    fn set_dma_mask(&self, _pci: PciAddress, mask: DmaMask) -> Result<(), DriverError> {
        self.with(|s| {
            if mask == DmaMask::BITS_44 && s.faults.dma_mask_44 {
                return Err(DriverError::Unsupported);
            }
            s.dma_mask = Some(mask);
            Ok(())
        })
    }

    fn has_pm_capability(&self, _pci: PciAddress) -> bool {
        self.with(|s| s.pm_capable)
    }

    fn choose_power_state(&self, _pci: PciAddress, _event: PmEvent) -> PowerState {
        PowerState::D3Hot
    }

    fn set_power_state(&self, _pci: PciAddress, state: PowerState) -> Result<(), DriverError> {
        self.with(|s| s.power_state = Some(state));
        Ok(())
    }

    fn enable_wake(&self, _pci: PciAddress, _state: PowerState, _enable: bool) {}

    fn save_state(&self, _pci: PciAddress) {}

    fn restore_state(&self, _pci: PciAddress) {}

    fn map_mmio(&self, phys_base: PhysAddr, size: u64) -> Result<MmioRegion, DriverError> {
        self.with(|s| {
            if s.faults.map_mmio {
                return Err(DriverError::IoError);
            }
            s.mmio_maps += 1;
            s.mmio_live += 1;
            let virt = VirtAddr::new_truncate(MMIO_VIRT_BASE + phys_base.as_u64());
            // SAFETY: The mapping is never dereferenced by the tests.
            Ok(unsafe { MmioRegion::new(phys_base, virt, size) })
        })
    }

    unsafe fn unmap_mmio(&self, _region: MmioRegion) {
        self.with(|s| {
            s.mmio_unmaps += 1;
            s.mmio_live -= 1;
        });
    }

    fn alloc_coherent(&self, len: usize, align: usize) -> Result<DmaBuffer, DriverError> {
        self.with(|s| {
            let call = s.dma_calls;
            s.dma_calls += 1;
            if s.faults.dma_alloc_at == Some(call) {
                return Err(DriverError::NoMemory);
            }

            let align = align.max(64) as u64;
            let mut phys = s.dma_next.next_multiple_of(align);
            s.dma_next = phys + (len as u64).max(1).next_multiple_of(64) + align;
            if s.faults.misalign_at == Some(call) {
                phys += 8;
            }

            let mut backing = vec![s.dma_fill; len].into_boxed_slice();
            let virt = VirtAddr::from_ptr(backing.as_mut_ptr());
            s.dma_live.insert(phys, backing);
            s.dma_allocs += 1;
            s.dma_bytes += len;
            // SAFETY: `backing` stays in `dma_live` until the buffer is freed
            // and its heap storage does not move.
            Ok(unsafe { DmaBuffer::new(PhysAddr::new(phys), virt, len) })
        })
    }

    unsafe fn free_coherent(&self, buffer: DmaBuffer) {
        self.with(|s| {
            let removed = s.dma_live.remove(&buffer.phys().as_u64());
            assert!(removed.is_some(), "free of unknown buffer {}", buffer.phys());
            s.dma_frees += 1;
        });
    }

    fn msix_capable(&self, _pci: PciAddress) -> bool {
        self.with(|s| s.msix_capable)
    }

    fn enable_msix(&self, _pci: PciAddress, max_vectors: usize) -> Result<Vec<IrqVector>, DriverError> {
        self.with(|s| {
            if s.faults.msix_enable {
                return Err(DriverError::Unsupported);
            }
            let count = u32::try_from(max_vectors).unwrap();
            Ok((0..count)
                .map(|i| IrqVector::new(MSIX_BASE_VECTOR + i))
                .collect())
        })
    }

    fn disable_msix(&self, _pci: PciAddress) {
        self.with(|s| s.msix_disables += 1);
    }

    fn legacy_vector(&self, _pci: PciAddress) -> IrqVector {
        LEGACY_VECTOR
    }

    fn request_irq(
        &self,
        vector: IrqVector,
        flags: IrqFlags,
        _name: &str,
        handler: Arc<dyn InterruptHandler>,
    ) -> Result<(), DriverError> {
        self.with(|s| {
            let fail = if vector == LEGACY_VECTOR {
                s.faults.legacy_request
            } else {
                s.faults.msix_request
            };
            if fail {
                return Err(DriverError::Busy);
            }
            if s.handlers.contains_key(&vector.as_u32()) {
                return Err(DriverError::ResourceConflict);
            }
            s.handlers.insert(vector.as_u32(), handler);
            s.irq_requests += 1;
            s.last_irq_flags = Some(flags);
            Ok(())
        })
    }

    fn free_irq(&self, vector: IrqVector) {
        let handler = self.with(|s| {
            s.irq_frees += 1;
            s.handlers.remove(&vector.as_u32())
        });
        assert!(handler.is_some(), "free of unbound vector {}", vector.as_u32());
    }

    fn synchronize_irq(&self, _vector: IrqVector) {
        self.with(|s| s.irq_syncs += 1);
    }

    fn schedule_bottom_half(&self, work: Arc<dyn BottomHalf>) {
        self.with(|s| s.bottom_halves.push(work));
    }

    fn flush_deferred_work(&self) {
        self.run_bottom_halves();
    }
}

impl SasTransport for MockPlatform {
    fn alloc_host(&self, _name: &str, config: &HostConfig) -> Result<HostHandle, DriverError> {
        self.with(|s| {
            let host = HostHandle::new(s.next_host);
            s.next_host += 1;
            s.live_hosts += 1;
            s.host_config = Some(*config);
            s.events.push(TransportEvent::AllocHost);
            Ok(host)
        })
    }

    fn release_host(&self, _host: HostHandle) {
        self.with(|s| {
            s.live_hosts -= 1;
            s.events.push(TransportEvent::ReleaseHost);
        });
    }

    fn add_host(&self, _host: HostHandle, _parent: PciAddress) -> Result<(), DriverError> {
        self.with(|s| s.events.push(TransportEvent::AddHost));
        Ok(())
    }

    fn remove_host(&self, _host: HostHandle) {
        self.with(|s| s.events.push(TransportEvent::RemoveHost));
    }

    fn register_ha(&self, _host: HostHandle, info: &HaInfo) -> Result<(), DriverError> {
        self.with(|s| {
            if s.faults.register_ha {
                return Err(DriverError::IoError);
            }
            s.ha_info = Some(*info);
            s.events.push(TransportEvent::RegisterHa);
            Ok(())
        })
    }

    fn unregister_ha(&self, _host: HostHandle) {
        self.with(|s| s.events.push(TransportEvent::UnregisterHa));
    }

    fn scan_host(&self, _host: HostHandle) {
        self.with(|s| s.events.push(TransportEvent::Scan));
    }

    fn block_requests(&self, _host: HostHandle) {
        self.with(|s| {
            s.blocked = true;
            s.events.push(TransportEvent::Block);
        });
    }

    fn unblock_requests(&self, _host: HostHandle) {
        self.with(|s| {
            s.blocked = false;
            s.events.push(TransportEvent::Unblock);
        });
    }
}

// ---------------------------------------------------------------------------
// Chip
// ---------------------------------------------------------------------------

/// Scriptable [`ChipOps`].
pub struct MockChip {
    phy_count: u8,
    hda_mode: AtomicBool,
    fail_force: AtomicBool,
    fail_init: AtomicBool,
    pending: AtomicBool,
    resets: AtomicUsize,
    inits: AtomicUsize,
    irq_enables: AtomicUsize,
    irq_disables: AtomicUsize,
    serviced: AtomicUsize,
    nvram_writes: AtomicUsize,
    last_reset: Mutex<Option<ResetSignature>>,
    nvram: Mutex<Option<[u8; 128]>>,
    service_hook: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl MockChip {
    pub fn new(phy_count: u8) -> Self {
        Self {
            phy_count,
            hda_mode: AtomicBool::new(false),
            fail_force: AtomicBool::new(false),
            fail_init: AtomicBool::new(false),
            pending: AtomicBool::new(false),
            resets: AtomicUsize::new(0),
            inits: AtomicUsize::new(0),
            irq_enables: AtomicUsize::new(0),
            irq_disables: AtomicUsize::new(0),
            serviced: AtomicUsize::new(0),
            nvram_writes: AtomicUsize::new(0),
            last_reset: Mutex::new(None),
            nvram: Mutex::new(None),
            service_hook: Mutex::new(None),
        }
    }

    pub fn set_hda_mode(&self, on: bool) {
        self.hda_mode.store(on, Ordering::SeqCst);
    }

    pub fn set_fail_force(&self, fail: bool) {
        self.fail_force.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_init(&self, fail: bool) {
        self.fail_init.store(fail, Ordering::SeqCst);
    }

    pub fn set_pending(&self, pending: bool) {
        self.pending.store(pending, Ordering::SeqCst);
    }

    pub fn set_nvram(&self, block: [u8; 128]) {
        *self.nvram.lock().unwrap() = Some(block);
    }

    pub fn nvram(&self) -> Option<[u8; 128]> {
        *self.nvram.lock().unwrap()
    }

    pub fn reset_count(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }

    pub fn last_reset(&self) -> Option<ResetSignature> {
        *self.last_reset.lock().unwrap()
    }

    pub fn init_count(&self) -> usize {
        self.inits.load(Ordering::SeqCst)
    }

    pub fn enable_irq_count(&self) -> usize {
        self.irq_enables.load(Ordering::SeqCst)
    }

    pub fn disable_irq_count(&self) -> usize {
        self.irq_disables.load(Ordering::SeqCst)
    }

    pub fn serviced_count(&self) -> usize {
        self.serviced.load(Ordering::SeqCst)
    }

    pub fn nvram_writes(&self) -> usize {
        self.nvram_writes.load(Ordering::SeqCst)
    }

    /// Runs `hook` from inside the next `service_interrupt`, after the
    /// service has been counted.
    pub fn on_next_service(&self, hook: impl FnOnce() + Send + 'static) {
        *self.service_hook.lock().unwrap() = Some(Box::new(hook));
    }
}

impl ChipOps for MockChip {
    fn name(&self) -> &'static str {
        "mock-spc"
    }

    fn phy_count(&self) -> u8 {
        self.phy_count
    }

    fn query_power_mode(&self, _hw: &ChipHw<'_>) -> bool {
        self.hda_mode.load(Ordering::SeqCst)
    }

    fn force_power_mode(&self, _hw: &ChipHw<'_>) -> Result<(), DriverError> {
        if self.fail_force.load(Ordering::SeqCst) {
            return Err(DriverError::Timeout);
        }
        self.hda_mode.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn reset(&self, _hw: &ChipHw<'_>, signature: ResetSignature) -> Result<(), DriverError> {
        self.resets.fetch_add(1, Ordering::SeqCst);
        *self.last_reset.lock().unwrap() = Some(signature);
        Ok(())
    }

    fn initialize(&self, _hw: &ChipHw<'_>) -> Result<(), DriverError> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        if self.fail_init.load(Ordering::SeqCst) {
            return Err(DriverError::Timeout);
        }
        Ok(())
    }

    fn enable_interrupts(&self, _hw: &ChipHw<'_>) {
        self.irq_enables.fetch_add(1, Ordering::SeqCst);
    }

    fn disable_interrupts(&self, _hw: &ChipHw<'_>) {
        self.irq_disables.fetch_add(1, Ordering::SeqCst);
    }

    fn owns_pending_interrupt(&self, _hw: &ChipHw<'_>) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    fn service_interrupt(&self, _hw: &ChipHw<'_>) -> IrqReturn {
        self.serviced.fetch_add(1, Ordering::SeqCst);
        self.pending.store(false, Ordering::SeqCst);
        let hook = self.service_hook.lock().unwrap().take();
        if let Some(hook) = hook {
            hook();
        }
        IrqReturn::Handled
    }

    fn read_nvram(
        &self,
        _hw: &ChipHw<'_>,
        req: &NvramRequest,
        buf: &mut [u8],
    ) -> Result<(), DriverError> {
        let nvram = self.nvram.lock().unwrap();
        let block = nvram.as_ref().ok_or(DriverError::Unsupported)?;
        let len = req.length.min(buf.len()).min(block.len());
        buf[..len].copy_from_slice(&block[..len]);
        Ok(())
    }

    fn write_nvram(
        &self,
        _hw: &ChipHw<'_>,
        req: &NvramRequest,
        data: &[u8],
    ) -> Result<(), DriverError> {
        let mut nvram = self.nvram.lock().unwrap();
        let block = nvram.as_mut().ok_or(DriverError::Unsupported)?;
        let len = req.length.min(data.len()).min(block.len());
        block[..len].copy_from_slice(&data[..len]);
        self.nvram_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
