//! Per-phy and per-port state.
//!
//! The table always has [`MAX_PHYS`] entries; entries past the chip's phy
//! count exist but stay disabled so phy ids are stable across chip
//! variants.

use alloc::boxed::Box;
use alloc::vec::Vec;

use bitflags::bitflags;
use sashba_core::id::{HbaId, PhyId};

use crate::params::MAX_PHYS;

/// Negotiated link rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkRate {
    /// Not yet negotiated.
    #[default]
    Unknown,
    /// Phy disabled.
    Disabled,
    /// 1.5 Gbit/s.
    Rate1_5G,
    /// 3.0 Gbit/s.
    Rate3_0G,
    /// 6.0 Gbit/s.
    Rate6_0G,
}

bitflags! {
    /// SAS protocols a phy speaks.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SasProtocol: u8 {
        /// Serial Management Protocol.
        const SMP = 0x01;
        /// SATA Tunnelled Protocol.
        const STP = 0x02;
        /// Direct-attached SATA.
        const SATA = 0x04;
        /// Serial SCSI Protocol.
        const SSP = 0x08;
        /// Everything above.
        const ALL = 0x0F;
    }
}

/// Role the phy plays on the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhyRole {
    /// Host side.
    Initiator,
    /// Device side.
    Target,
}

/// Out-of-band signalling state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OobMode {
    /// Nothing attached yet.
    NotConnected,
    /// SAS OOB completed.
    Sas,
    /// SATA OOB completed.
    Sata,
}

/// Physical or virtual phy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhyClass {
    /// A real SAS phy.
    Sas,
    /// An expander's virtual phy.
    Expander,
}

/// State of one phy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhyEntry {
    /// Index in the table.
    pub id: PhyId,
    /// Whether the chip actually has this phy.
    pub enabled: bool,
    /// Negotiated rate.
    pub link_rate: LinkRate,
    /// Raw firmware phy state.
    pub phy_state: u8,
    /// SAS address presented on this phy.
    pub sas_addr: u64,
    /// Link role.
    pub role: PhyRole,
    /// Protocols offered as initiator.
    pub initiator_protocols: SasProtocol,
    /// Protocols offered as target.
    pub target_protocols: SasProtocol,
    /// OOB state.
    pub oob: OobMode,
    /// Phy class.
    pub class: PhyClass,
    /// Adapter the phy belongs to.
    pub owner: HbaId,
}

impl PhyEntry {
    fn new(owner: HbaId, id: PhyId, enabled: bool) -> Self {
        Self {
            id,
            enabled,
            link_rate: LinkRate::Unknown,
            phy_state: 0,
            sas_addr: 0,
            role: PhyRole::Initiator,
            initiator_protocols: SasProtocol::ALL,
            target_protocols: SasProtocol::empty(),
            oob: OobMode::NotConnected,
            class: PhyClass::Sas,
            owner,
        }
    }
}

/// State of one (possibly wide) port.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortEntry {
    /// Whether something is attached.
    pub attached: bool,
    /// Bitmap of phys forming the wide port.
    pub wide_port_phymap: u8,
    /// Raw firmware port state.
    pub state: u8,
    /// Member phys.
    pub members: Vec<PhyId>,
}

impl PortEntry {
    /// Adds `phy` to the port, keeping the phymap in sync.
    pub fn add_member(&mut self, phy: PhyId) {
        if !self.members.contains(&phy) {
            self.members.push(phy);
            self.wide_port_phymap |= 1 << (phy.as_u8() % 8);
        }
    }
}

/// Phy and port tables of one adapter.
#[derive(Debug)]
pub struct PhyTable {
    phys: Box<[PhyEntry]>,
    ports: Box<[PortEntry]>,
    phy_count: u8,
}

impl PhyTable {
    /// Builds [`MAX_PHYS`] phy entries, enabling the first `phy_count`.
    #[must_use]
    pub fn new(owner: HbaId, phy_count: u8) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let phys = (0..MAX_PHYS)
            .map(|i| PhyEntry::new(owner, PhyId::new(i as u8), i < usize::from(phy_count)))
            .collect();
        let ports = (0..MAX_PHYS).map(|_| PortEntry::default()).collect();
        Self {
            phys,
            ports,
            phy_count,
        }
    }

    /// Number of phys the chip reports.
    #[must_use]
    pub fn phy_count(&self) -> u8 {
        self.phy_count
    }

    /// Returns phy `id`.
    #[must_use]
    pub fn get(&self, id: PhyId) -> Option<&PhyEntry> {
        self.phys.get(id.as_usize())
    }

    /// Returns phy `id` mutably.
    pub fn get_mut(&mut self, id: PhyId) -> Option<&mut PhyEntry> {
        self.phys.get_mut(id.as_usize())
    }

    /// Iterates over every phy slot, enabled or not.
    pub fn iter(&self) -> impl Iterator<Item = &PhyEntry> {
        self.phys.iter()
    }

    /// Iterates over the enabled phys.
    pub fn enabled(&self) -> impl Iterator<Item = &PhyEntry> {
        self.phys.iter().filter(|p| p.enabled)
    }

    /// Returns port `index`.
    #[must_use]
    pub fn port(&self, index: usize) -> Option<&PortEntry> {
        self.ports.get(index)
    }

    /// Returns port `index` mutably.
    pub fn port_mut(&mut self, index: usize) -> Option<&mut PortEntry> {
        self.ports.get_mut(index)
    }

    /// All ports.
    #[must_use]
    pub fn ports(&self) -> &[PortEntry] {
        &self.ports
    }

    /// Sets the SAS address of phy `id`. Out-of-range ids are ignored.
    pub fn set_sas_addr(&mut self, id: PhyId, addr: u64) {
        if let Some(phy) = self.get_mut(id) {
            phy.sas_addr = addr;
        }
    }
}
