//! Adapter lifecycle controller.
//!
//! [`Hba`] is the aggregate root of one bound adapter. [`Hba::probe`] walks
//! the bring-up sequence, recording each acquired resource; on any failure
//! teardown releases exactly what was acquired, in reverse, and the
//! first error is returned. Suspend and resume rerun the chip and interrupt
//! part of the sequence while keeping memory, command slots and tables.
//!
//! State reached by a successful probe:
//!
//! ```text
//! Created -> MemoryReady -> WindowsMapped -> Reset -> Initialized
//!         -> InterruptsBound -> Registered <-> Suspended
//! ```
//!
//! Removal from any state ends in `Removed`.

use alloc::string::String;
use alloc::sync::Arc;
use core::fmt;

use bitflags::bitflags;
use sashba_core::id::{CcbTag, DeviceId, HbaId, TaskRef};
use sashba_driver_api::{
    DmaMask, DriverError, HaInfo, HbaServices, HostConfig, HostHandle, ManagedDriver, PciAddress,
    PciCommand, PciDeviceInfo, PmEvent, PowerState, SasTransport,
};

use crate::ccb::{CcbPool, SlotHandle};
use crate::chip::{ChipHw, ChipOps, ResetSignature};
use crate::context::{AdapterRecord, DriverContext};
use crate::device::DeviceTable;
use crate::error::HbaError;
use crate::ids;
use crate::iomap::IoWindows;
use crate::irq::{InterruptManager, IrqBinding};
use crate::params::LogMask;
use crate::phy::PhyTable;
use crate::region::{MemoryMap, RegionKind};
use crate::sas_addr::{self, AddressSource, DEFAULT_SAS_ADDR};

/// Owner name used when claiming PCI regions.
pub const DRV_NAME: &str = "pm8001";

/// Command register bits the firmware expects set.
pub const FW_COMMAND_BITS: PciCommand = PciCommand::IO_SPACE
    .union(PciCommand::MEMORY_SPACE)
    .union(PciCommand::BUS_MASTER)
    .union(PciCommand::MEMORY_WRITE_INVALIDATE)
    .union(PciCommand::PARITY_ERROR_RESPONSE)
    .union(PciCommand::SERR_ENABLE);

const MAX_LUN: u32 = 8;
const MAX_CMD_LEN: u16 = 16;
const CMD_PER_LUN: u16 = 32;

// ---------------------------------------------------------------------------
// Shared adapter state
// ---------------------------------------------------------------------------

/// The part of an adapter reachable from interrupt context.
///
/// Built once the DMA regions, command slots and I/O windows exist; shared
/// by the lifecycle controller and every registered interrupt handler.
pub struct HbaShared {
    pub(crate) name: String,
    pub(crate) pci: PciAddress,
    pub(crate) chip: Arc<dyn ChipOps>,
    pub(crate) services: Arc<dyn HbaServices>,
    pub(crate) windows: IoWindows,
    pub(crate) memory: MemoryMap,
    pub(crate) ccbs: CcbPool,
    pub(crate) log_mask: LogMask,
    pub(crate) log_option: u32,
}

impl HbaShared {
    /// Adapter name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// PCI function.
    #[must_use]
    pub fn pci(&self) -> PciAddress {
        self.pci
    }

    /// Chip implementation.
    #[must_use]
    pub fn chip(&self) -> &dyn ChipOps {
        &*self.chip
    }

    /// Platform services.
    #[must_use]
    pub fn services(&self) -> &dyn HbaServices {
        &*self.services
    }

    /// Enabled log categories.
    #[must_use]
    pub fn log_mask(&self) -> LogMask {
        self.log_mask
    }

    /// Command slot pool.
    #[must_use]
    pub fn ccb_pool(&self) -> &CcbPool {
        &self.ccbs
    }

    /// DMA regions.
    #[must_use]
    pub fn memory(&self) -> &MemoryMap {
        &self.memory
    }

    /// I/O windows.
    #[must_use]
    pub fn windows(&self) -> &IoWindows {
        &self.windows
    }

    /// Hardware view handed to chip operations.
    #[must_use]
    pub fn hw(&self) -> ChipHw<'_> {
        ChipHw {
            name: &self.name,
            pci: self.pci,
            windows: &self.windows,
            memory: &self.memory,
            services: &*self.services,
            log_option: self.log_option,
        }
    }
}

impl fmt::Debug for HbaShared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HbaShared")
            .field("name", &self.name)
            .field("pci", &self.pci)
            .field("chip", &self.chip.name())
            .field("regions", &self.memory.len())
            .field("ccbs", &self.ccbs)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Lifecycle state of an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HbaState {
    /// Identified, nothing acquired yet.
    Created,
    /// DMA regions and command slots allocated.
    MemoryReady,
    /// Register windows mapped and validated.
    WindowsMapped,
    /// Chip reset (or forced out of HDA mode).
    Reset,
    /// Firmware initialised.
    Initialized,
    /// Interrupt handler bound and chip interrupts enabled.
    InterruptsBound,
    /// Registered with the transport and accepting commands.
    Registered,
    /// Powered down; memory and tables retained.
    Suspended,
    /// Torn down.
    Removed,
}

impl fmt::Display for HbaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::MemoryReady => "memory-ready",
            Self::WindowsMapped => "windows-mapped",
            Self::Reset => "reset",
            Self::Initialized => "initialized",
            Self::InterruptsBound => "interrupts-bound",
            Self::Registered => "registered",
            Self::Suspended => "suspended",
            Self::Removed => "removed",
        };
        f.write_str(name)
    }
}

bitflags! {
    /// Resources currently held, consulted by teardown.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Held: u8 {
        const DEVICE_ENABLED = 1 << 0;
        const REGIONS_CLAIMED = 1 << 1;
        const CHIP_LIVE = 1 << 2;
        const HOST_ADDED = 1 << 3;
        const HA_REGISTERED = 1 << 4;
        const ATTACHED = 1 << 5;
    }
}

/// One bound SPC adapter.
pub struct Hba {
    ctx: Arc<DriverContext>,
    id: HbaId,
    name: String,
    info: PciDeviceInfo,
    state: HbaState,
    held: Held,
    log_mask: LogMask,
    services: Arc<dyn HbaServices>,
    transport: Arc<dyn SasTransport>,
    chip: Arc<dyn ChipOps>,
    shared: Option<Arc<HbaShared>>,
    host: Option<HostHandle>,
    irq: InterruptManager,
    phys: PhyTable,
    devices: DeviceTable,
    reset_signature: ResetSignature,
}

impl Hba {
    /// Binds the adapter described by `info`.
    ///
    /// Runs the full bring-up sequence. On failure every step already
    /// completed is undone in reverse order and the first error is returned;
    /// no memory, interrupt or transport registration stays behind.
    pub fn probe(
        ctx: &Arc<DriverContext>,
        info: PciDeviceInfo,
        services: Arc<dyn HbaServices>,
        transport: Arc<dyn SasTransport>,
    ) -> Result<Self, HbaError> {
        let params = ctx.params();
        if params.disable {
            return Err(HbaError::Disabled);
        }
        let chip_id = ids::match_device(&info).ok_or(DriverError::DeviceNotFound)?;
        let chip = ctx.chips().get(chip_id).ok_or(DriverError::Unsupported)?;

        let id = ctx.next_id();
        let mut hba = Self {
            ctx: Arc::clone(ctx),
            id,
            name: DriverContext::adapter_name(id),
            info,
            state: HbaState::Created,
            held: Held::empty(),
            log_mask: params.logging_level,
            services,
            transport,
            phys: PhyTable::new(id, chip.phy_count()),
            devices: DeviceTable::new(ctx.limits().max_devices),
            chip,
            shared: None,
            host: None,
            irq: InterruptManager::new(),
            reset_signature: ResetSignature::Soft,
        };

        match hba.bring_up() {
            Ok(()) => {
                sashba_core::hba_info!(
                    "{}: {} at {} ready, {} phys",
                    hba.name,
                    hba.chip.name(),
                    hba.info.address,
                    hba.phys.phy_count()
                );
                Ok(hba)
            }
            Err(err) => {
                fail_dbg!(hba.log_mask, "{}: probe failed in state {}: {err}", hba.name, hba.state);
                hba.teardown();
                Err(err)
            }
        }
    }

    fn bring_up(&mut self) -> Result<(), HbaError> {
        let params = *self.ctx.params();
        let limits = *self.ctx.limits();
        let pci = self.info.address;
        let services = Arc::clone(&self.services);
        let chip = Arc::clone(&self.chip);
        let mask = self.log_mask;

        services.enable_device(pci)?;
        self.held |= Held::DEVICE_ENABLED;
        services.set_bus_master(pci);
        let command = services.read_command(pci);
        services.write_command(pci, command | FW_COMMAND_BITS);

        services.request_regions(pci, DRV_NAME)?;
        self.held |= Held::REGIONS_CLAIMED;
        negotiate_dma_mask(&*services, pci, mask)?;

        let config = HostConfig {
            unique_id: self.id,
            max_id: u32::try_from(limits.max_devices).unwrap_or(u32::MAX),
            max_lun: MAX_LUN,
            max_channel: 0,
            max_cmd_len: MAX_CMD_LEN,
            can_queue: limits.can_queue,
            cmd_per_lun: CMD_PER_LUN,
            error_handler: params.scsi_ehandler,
        };
        self.host = Some(self.transport.alloc_host(&self.name, &config)?);

        let layout = self.ctx.region_layout();
        let memory = MemoryMap::allocate(&layout, &*services, mask)?;
        let ccbs = match memory.by_kind(RegionKind::CcbTable) {
            Some(region) => CcbPool::new(region, limits.max_ccb),
            None => CcbPool::default(),
        };
        init_dbg!(
            mask,
            "{}: {} regions, {} command slots",
            self.name,
            memory.len(),
            ccbs.capacity()
        );
        self.state = HbaState::MemoryReady;

        let windows = chip.map_io_windows(&self.info.bars, &*services, mask);
        let shared = Arc::new(HbaShared {
            name: self.name.clone(),
            pci,
            chip: Arc::clone(&chip),
            services: Arc::clone(&services),
            windows,
            memory,
            ccbs,
            log_mask: mask,
            log_option: params.logging_option,
        });
        self.shared = Some(Arc::clone(&shared));
        if let Err(err) = shared.windows.validate_primary() {
            sashba_core::hba_err!("{}: BAR0 access bad: {err}", self.name);
            return Err(err);
        }
        self.state = HbaState::WindowsMapped;

        let hw = shared.hw();
        if chip.query_power_mode(&hw) {
            chip.force_power_mode(&hw)
                .map_err(|_| HbaError::ChipInitFailure(DriverError::Busy))?;
            self.reset_signature = ResetSignature::HdaSoft;
        } else {
            chip.reset(&hw, ResetSignature::Soft)
                .map_err(HbaError::ChipInitFailure)?;
            self.reset_signature = ResetSignature::Soft;
        }
        self.state = HbaState::Reset;

        chip.initialize(&hw).map_err(HbaError::ChipInitFailure)?;
        self.held |= Held::CHIP_LIVE;
        self.state = HbaState::Initialized;

        self.irq
            .bind(&shared, params.delivery, params.msix_vector_limit())?;
        chip.enable_interrupts(&hw);
        self.state = HbaState::InterruptsBound;

        let addrs = sas_addr::provision(
            &*chip,
            &hw,
            AddressSource::from_params(&params),
            &mut self.phys,
            mask,
        );

        let host = self.host.ok_or(HbaError::InvalidState)?;
        self.transport.add_host(host, pci)?;
        self.held |= Held::HOST_ADDED;
        let ha = HaInfo {
            sas_addr: addrs.first().copied().unwrap_or(DEFAULT_SAS_ADDR),
            num_phys: self.phys.phy_count(),
        };
        self.transport.register_ha(host, &ha)?;
        self.held |= Held::HA_REGISTERED;
        self.transport.scan_host(host);

        self.ctx.attach(AdapterRecord {
            id: self.id,
            name: self.name.clone(),
            pci,
        });
        self.held |= Held::ATTACHED;
        self.state = HbaState::Registered;
        Ok(())
    }

    /// Releases everything the adapter holds, newest first. Safe to call from
    /// any state; steps that never happened are skipped.
    fn teardown(&mut self) {
        let services = Arc::clone(&self.services);
        let pci = self.info.address;

        if let Some(host) = self.host {
            if self.held.contains(Held::HA_REGISTERED) {
                self.transport.unregister_ha(host);
            }
            if self.held.contains(Held::HOST_ADDED) {
                self.transport.remove_host(host);
            }
        }
        self.held -= Held::HA_REGISTERED | Held::HOST_ADDED;

        if self.held.contains(Held::ATTACHED) {
            self.ctx.detach(self.id);
            self.held -= Held::ATTACHED;
        }

        if let Some(shared) = self.shared.take() {
            if self.held.contains(Held::CHIP_LIVE) {
                let hw = shared.hw();
                self.chip.disable_interrupts(&hw);
                if let Err(err) = self.chip.reset(&hw, self.reset_signature) {
                    fail_dbg!(self.log_mask, "{}: reset on teardown failed: {err}", self.name);
                }
                self.held -= Held::CHIP_LIVE;
            }
            self.irq.unbind(&shared);
            services.flush_deferred_work();

            match Arc::try_unwrap(shared) {
                Ok(mut shared) => {
                    self.chip.unmap_io_windows(&mut shared.windows, &*services);
                    shared.memory.release(&*services);
                }
                Err(_) => {
                    sashba_core::hba_err!(
                        "{}: adapter state still referenced, DMA regions leaked",
                        self.name
                    );
                }
            }
        }

        if let Some(host) = self.host.take() {
            self.transport.release_host(host);
        }
        if self.held.contains(Held::REGIONS_CLAIMED) {
            services.release_regions(pci);
        }
        if self.held.contains(Held::DEVICE_ENABLED) {
            services.disable_device(pci);
        }
        self.held = Held::empty();
        self.state = HbaState::Removed;
    }

    /// Detaches the adapter and releases everything it holds.
    pub fn remove(mut self) {
        init_dbg!(self.log_mask, "{}: removing from state {}", self.name, self.state);
        self.teardown();
    }

    /// Quiesces the adapter and moves it into the power state the platform
    /// picks for `event`.
    ///
    /// DMA regions, command slots and tables are kept. If the function has no
    /// PCI power-management capability, requests are unblocked again and the
    /// adapter stays registered.
    pub fn suspend(&mut self, event: PmEvent) -> Result<(), HbaError> {
        if self.state != HbaState::Registered {
            return Err(HbaError::InvalidState);
        }
        let shared = self.shared.clone().ok_or(HbaError::InvalidState)?;
        let host = self.host.ok_or(HbaError::InvalidState)?;
        let services = Arc::clone(&self.services);
        let pci = self.info.address;

        services.flush_deferred_work();
        self.transport.block_requests(host);
        if !services.has_pm_capability(pci) {
            sashba_core::hba_err!("{}: PCI PM not supported", self.name);
            self.transport.unblock_requests(host);
            return Err(HbaError::Platform(DriverError::DeviceNotFound));
        }

        let hw = shared.hw();
        self.chip.disable_interrupts(&hw);
        if let Err(err) = self.chip.reset(&hw, self.reset_signature) {
            fail_dbg!(self.log_mask, "{}: reset on suspend failed: {err}", self.name);
        }
        self.held -= Held::CHIP_LIVE;
        self.irq.unbind(&shared);

        let target = services.choose_power_state(pci, event);
        sashba_core::hba_info!("{}: entering operating state [{target}]", self.name);
        services.save_state(pci);
        services.disable_device(pci);
        self.held -= Held::DEVICE_ENABLED;
        if let Err(err) = services.set_power_state(pci, target) {
            fail_dbg!(self.log_mask, "{}: entering {target} failed: {err}", self.name);
        }
        self.state = HbaState::Suspended;
        Ok(())
    }

    /// Powers the adapter back up and re-arms the chip and interrupts.
    ///
    /// On failure the steps resume performed are undone and the adapter
    /// stays [`HbaState::Suspended`].
    pub fn resume(&mut self) -> Result<(), HbaError> {
        if self.state != HbaState::Suspended {
            return Err(HbaError::InvalidState);
        }
        let shared = self.shared.clone().ok_or(HbaError::InvalidState)?;
        let services = Arc::clone(&self.services);
        let pci = self.info.address;

        sashba_core::hba_info!("{}: resuming", self.name);
        if let Err(err) = services.set_power_state(pci, PowerState::D0) {
            fail_dbg!(self.log_mask, "{}: entering D0 failed: {err}", self.name);
        }
        services.enable_wake(pci, PowerState::D0, false);
        services.restore_state(pci);
        if let Err(err) = services.enable_device(pci) {
            sashba_core::hba_err!("{}: enable device failed during resume: {err}", self.name);
            return Err(err.into());
        }
        self.held |= Held::DEVICE_ENABLED;

        match self.rearm(&shared) {
            Ok(()) => {
                self.state = HbaState::Registered;
                Ok(())
            }
            Err(err) => {
                fail_dbg!(self.log_mask, "{}: resume failed: {err}", self.name);
                self.irq.unbind(&shared);
                if self.held.contains(Held::CHIP_LIVE) {
                    let hw = shared.hw();
                    self.chip.disable_interrupts(&hw);
                    if let Err(err) = self.chip.reset(&hw, self.reset_signature) {
                        fail_dbg!(self.log_mask, "{}: reset after failed resume: {err}", self.name);
                    }
                    self.held -= Held::CHIP_LIVE;
                }
                services.disable_device(pci);
                self.held -= Held::DEVICE_ENABLED;
                Err(err)
            }
        }
    }

    fn rearm(&mut self, shared: &Arc<HbaShared>) -> Result<(), HbaError> {
        let params = *self.ctx.params();
        let pci = self.info.address;
        let host = self.host.ok_or(HbaError::InvalidState)?;

        self.services.set_bus_master(pci);
        negotiate_dma_mask(&*self.services, pci, self.log_mask)?;

        let hw = shared.hw();
        self.chip
            .reset(&hw, self.reset_signature)
            .map_err(HbaError::ChipInitFailure)?;
        self.chip.initialize(&hw).map_err(HbaError::ChipInitFailure)?;
        self.held |= Held::CHIP_LIVE;
        self.chip.disable_interrupts(&hw);

        self.irq
            .bind(shared, params.delivery, params.msix_vector_limit())?;
        self.chip.enable_interrupts(&hw);
        self.transport.unblock_requests(host);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Command path
    // -----------------------------------------------------------------------

    /// Claims a command slot. Only a registered adapter accepts commands.
    pub fn acquire_slot(&self) -> Result<SlotHandle, HbaError> {
        if self.state != HbaState::Registered {
            return Err(HbaError::InvalidState);
        }
        self.pool()?.acquire()
    }

    /// Records the target device and issuing task of an outstanding slot.
    pub fn bind_slot(
        &self,
        tag: CcbTag,
        device: Option<DeviceId>,
        task: Option<TaskRef>,
    ) -> Result<(), HbaError> {
        self.pool()?.bind(tag, device, task)
    }

    /// Returns a completed or aborted command's slot to the pool.
    pub fn release_slot(&self, tag: CcbTag) -> Result<(), HbaError> {
        self.pool()?.release(tag)
    }

    fn pool(&self) -> Result<&CcbPool, HbaError> {
        self.shared
            .as_deref()
            .map(HbaShared::ccb_pool)
            .ok_or(HbaError::InvalidState)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> HbaState {
        self.state
    }

    /// Instance id.
    #[must_use]
    pub fn id(&self) -> HbaId {
        self.id
    }

    /// Adapter name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// PCI function.
    #[must_use]
    pub fn pci(&self) -> PciAddress {
        self.info.address
    }

    /// Transport host handle.
    #[must_use]
    pub fn host(&self) -> Option<HostHandle> {
        self.host
    }

    /// Phy and port tables.
    #[must_use]
    pub fn phys(&self) -> &PhyTable {
        &self.phys
    }

    /// Device table.
    #[must_use]
    pub fn devices(&self) -> &DeviceTable {
        &self.devices
    }

    /// Device table, mutably.
    pub fn devices_mut(&mut self) -> &mut DeviceTable {
        &mut self.devices
    }

    /// Command slot pool, once memory is set up.
    #[must_use]
    pub fn ccb_pool(&self) -> Option<&CcbPool> {
        self.shared.as_deref().map(HbaShared::ccb_pool)
    }

    /// DMA regions, once memory is set up.
    #[must_use]
    pub fn memory(&self) -> Option<&MemoryMap> {
        self.shared.as_deref().map(HbaShared::memory)
    }

    /// Interrupt binding.
    #[must_use]
    pub fn irq_binding(&self) -> &IrqBinding {
        self.irq.binding()
    }

    /// Number of interrupt bindings in place (0 or 1).
    #[must_use]
    pub fn bind_count(&self) -> usize {
        self.irq.bind_count()
    }

    /// Reset flavour chosen at bring-up.
    #[must_use]
    pub fn reset_signature(&self) -> ResetSignature {
        self.reset_signature
    }
}

impl fmt::Debug for Hba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hba")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("pci", &self.info.address)
            .field("state", &self.state)
            .field("irq", &self.irq)
            .finish_non_exhaustive()
    }
}

impl ManagedDriver for Hba {
    type Error = HbaError;

    fn suspend(&mut self, event: PmEvent) -> Result<(), HbaError> {
        Hba::suspend(self, event)
    }

    fn resume(&mut self) -> Result<(), HbaError> {
        Hba::resume(self)
    }

    fn shutdown(self) {
        self.remove();
    }
}

/// Sets a 44-bit DMA mask, falling back to 32 bits.
fn negotiate_dma_mask(
    services: &dyn HbaServices,
    pci: PciAddress,
    mask: LogMask,
) -> Result<(), HbaError> {
    if services.set_dma_mask(pci, DmaMask::BITS_44).is_ok() {
        return Ok(());
    }
    init_dbg!(mask, "{pci}: 44-bit DMA unavailable, trying 32-bit");
    services
        .set_dma_mask(pci, DmaMask::BITS_32)
        .map_err(HbaError::from)
}
