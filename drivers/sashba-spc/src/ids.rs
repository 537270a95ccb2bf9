//! PCI ids served by this driver.

use sashba_driver_api::{PciDeviceId, PciDeviceInfo};

use crate::chip::ChipId;

/// Supported functions and the chip behind each.
pub const PM8001_ID_TABLE: &[(PciDeviceId, ChipId)] = &[
    (PciDeviceId::new(0x11F8, 0x8001), ChipId::Spc8001),
    (PciDeviceId::new(0x117C, 0x0042), ChipId::Spc8001),
];

/// Looks `info` up in [`PM8001_ID_TABLE`].
#[must_use]
pub fn match_device(info: &PciDeviceInfo) -> Option<ChipId> {
    PM8001_ID_TABLE
        .iter()
        .find(|(id, _)| id.matches(info))
        .map(|&(_, chip)| chip)
}
