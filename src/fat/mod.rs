//! sdmmc-datalogger - FAT on-disk structures
//!
//! Only what is needed to lay down a fresh FAT16 or FAT32 volume and check
//! the result. Reading and writing files is left to `embedded-sdmmc`.

pub mod bios_param_block;
pub mod format;
pub mod fs_info;

pub use self::format::{format_volume, FormatError, FormatOptions, Layout};

#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatType {
    // Fat12
    Fat16,
    Fat32,
}

impl FatType {
    /// Fewer clusters than this is FAT12.
    pub const FAT16_MIN_CLUSTERS: u32 = 4085;
    /// This many clusters or more is FAT32.
    pub const FAT32_MIN_CLUSTERS: u32 = 65525;

    /// `BS_FilSysType`, informational only.
    pub fn label(self) -> &'static [u8; 8] {
        match self {
            FatType::Fat16 => b"FAT16   ",
            FatType::Fat32 => b"FAT32   ",
        }
    }
}

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
