//! Per-phy SAS address provisioning.
//!
//! Addresses come from one of three places, in priority order: the
//! `wwn_by4` parameter (phys 0-3 get the address, phys 4+ get the address
//! plus one), the `wwn_by8` parameter (every phy gets the address), or the
//! block stored in the adapter's NVRAM. Overrides are persisted to NVRAM;
//! stored addresses are written back only when repairing blank slots
//! changed them.
//!
//! The NVRAM block is 128 bytes of big-endian addresses. Phy `i` lives at
//! byte `NVRAM_SLOT_MAP[i] * 8`.

use alloc::vec::Vec;

use sashba_core::id::PhyId;
use sashba_driver_api::DriverError;

use crate::chip::{ChipHw, ChipOps, NvramRequest};
use crate::params::{HbaParams, LogMask, MAX_PHYS};
use crate::phy::PhyTable;

/// Manufacturing default address.
pub const DEFAULT_SAS_ADDR: u64 = 0x5001_0C60_0047_F9D0;

/// Size of the NVRAM address block.
pub const NVRAM_SAS_PAYLOAD_LEN: usize = 128;

/// NVRAM slot holding phy `i`'s address.
pub const NVRAM_SLOT_MAP: [usize; MAX_PHYS] = [0, 2, 4, 6, 1, 3, 5, 7];

/// An erased NVRAM slot.
const BLANK_ADDR: u64 = u64::MAX;

const SAS_ADDR_SIZE: usize = 8;

/// Where the phy addresses come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressSource {
    /// Split override: phys 0-3 and phys 4+.
    WwnBy4(u64),
    /// Shared override for every phy.
    WwnBy8(u64),
    /// Whatever NVRAM holds.
    Stored,
}

impl AddressSource {
    /// Picks the source selected by `params`. `wwn_by4` wins over `wwn_by8`.
    #[must_use]
    pub fn from_params(params: &HbaParams) -> Self {
        match (params.wwn_by4, params.wwn_by8) {
            (Some(addr), _) => Self::WwnBy4(addr),
            (None, Some(addr)) => Self::WwnBy8(addr),
            (None, None) => Self::Stored,
        }
    }
}

/// Extracts the first `phy_count` addresses from an NVRAM block.
#[must_use]
pub fn decode_payload(payload: &[u8; NVRAM_SAS_PAYLOAD_LEN], phy_count: u8) -> Vec<u64> {
    NVRAM_SLOT_MAP
        .iter()
        .take(usize::from(phy_count))
        .map(|&slot| {
            let mut raw = [0u8; SAS_ADDR_SIZE];
            raw.copy_from_slice(&payload[slot * SAS_ADDR_SIZE..][..SAS_ADDR_SIZE]);
            u64::from_be_bytes(raw)
        })
        .collect()
}

/// Stores `addrs` (phy order) into their NVRAM slots.
pub fn encode_payload(payload: &mut [u8; NVRAM_SAS_PAYLOAD_LEN], addrs: &[u64]) {
    for (&slot, addr) in NVRAM_SLOT_MAP.iter().zip(addrs) {
        payload[slot * SAS_ADDR_SIZE..][..SAS_ADDR_SIZE].copy_from_slice(&addr.to_be_bytes());
    }
}

/// Computes the address of each of the first `phy_count` phys.
///
/// For [`AddressSource::Stored`], a valid stored address is kept and a
/// blank slot inherits the previous phy's address (the manufacturing
/// default for a leading blank). Without a readable NVRAM every phy gets
/// the default.
#[must_use]
pub fn compute(source: AddressSource, stored: Option<&[u64]>, phy_count: u8) -> Vec<u64> {
    let n = usize::from(phy_count);
    match source {
        AddressSource::WwnBy8(addr) => alloc::vec![addr; n],
        AddressSource::WwnBy4(addr) => (0..n)
            .map(|i| if i < 4 { addr } else { addr.wrapping_add(1) })
            .collect(),
        AddressSource::Stored => {
            let mut last = DEFAULT_SAS_ADDR;
            (0..n)
                .map(|i| match stored.and_then(|s| s.get(i)) {
                    Some(&addr) if addr != BLANK_ADDR => {
                        last = addr;
                        addr
                    }
                    _ => last,
                })
                .collect()
        }
    }
}

/// Assigns every enabled phy its SAS address and persists the result.
///
/// NVRAM errors are never fatal: a chip without NVRAM support, or a failed
/// read, falls back to the default address without writing anything.
/// Returns the addresses assigned, in phy order.
pub fn provision(
    chip: &dyn ChipOps,
    hw: &ChipHw<'_>,
    source: AddressSource,
    phys: &mut PhyTable,
    log_mask: LogMask,
) -> Vec<u64> {
    #[allow(clippy::cast_possible_truncation)]
    let phy_count = phys.phy_count().min(MAX_PHYS as u8);
    let req = NvramRequest::TWI_SAS_ADDRESSES;
    let mut payload = [0xFFu8; NVRAM_SAS_PAYLOAD_LEN];

    let (addrs, persist) = match source {
        AddressSource::Stored => match chip.read_nvram(hw, &req, &mut payload) {
            Ok(()) => {
                let stored = decode_payload(&payload, phy_count);
                let addrs = compute(source, Some(stored.as_slice()), phy_count);
                let changed = addrs != stored;
                (addrs, changed)
            }
            Err(DriverError::Unsupported) => (compute(source, None, phy_count), false),
            Err(err) => {
                fail_dbg!(log_mask, "{}: NVRAM read failed: {err}", hw.name);
                (compute(source, None, phy_count), false)
            }
        },
        AddressSource::WwnBy4(addr) => {
            init_dbg!(log_mask, "sas_addr(s) = {addr:016x} and {:016x}", addr.wrapping_add(1));
            (compute(source, None, phy_count), true)
        }
        AddressSource::WwnBy8(addr) => {
            init_dbg!(log_mask, "sas_addr = {addr:016x}");
            (compute(source, None, phy_count), true)
        }
    };

    if persist {
        encode_payload(&mut payload, &addrs);
        match chip.write_nvram(hw, &req, &payload) {
            Ok(()) | Err(DriverError::Unsupported) => {}
            Err(err) => fail_dbg!(log_mask, "{}: NVRAM write failed: {err}", hw.name),
        }
    }

    for (i, &addr) in addrs.iter().enumerate() {
        #[allow(clippy::cast_possible_truncation)]
        let id = PhyId::new(i as u8);
        phys.set_sas_addr(id, addr);
        init_dbg!(log_mask, "{id} sas_addr = {addr:016x}");
    }
    addrs
}
