use core::num::{NonZeroU16, NonZeroU32, NonZeroU8};

use embedded_sdmmc::Block;

use super::FatType;

/// A boot sector that passed validation.
#[derive(Debug, Clone)]
pub struct BiosParameterBlock {
    fat_type: FatType,
    fat_size: u32,
    reserved_sector_count: NonZeroU16,
    bytes_per_sector: NonZeroU16,
    sectors_per_cluster: NonZeroU8,
    media: NonZeroU8,
    raw: BiosParameterBlockRaw,
    root_entry_count: u16,
    cluster_count: u32,
}

#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BpbError {
    Fat12NotSupported,
    Fat32Field(&'static str),
    InvalidMedia(u8),
    BothSectorCountsZero,
    BothSectorCountsNotZero,
    RootEntryCountSize,
    Fat32(Fat32BpbError),
    InvalidBytesPerSector(u16),
    InvalidSectorsPerCluster(u8),
    ReservedSectorCountZero,
    /// The FATs and root directory do not fit in the volume.
    MetadataTooLarge,
    InvalidSignature([u8; 2]),
}

#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fat32BpbError {
    Count16NotZero,
    FatSize16NotZero,
    RootEntryCountNotZero,
    FsVerNotZero,
    RootClusterLessThanTwo,
    InvalidBackupBootSector(u16),
}

/// The BPB_Reserved and BS_* fields are not verified.
impl BiosParameterBlock {
    pub const SIGNATURE: [u8; 2] = [0x55, 0xAA];

    /// Size of one directory entry in bytes.
    const DIR_ENTRY_SIZE: u32 = 32;

    pub fn new(block: Block) -> Result<Self, BpbError> {
        let raw = BiosParameterBlockRaw { block };

        let reserved_sector_count =
            NonZeroU16::new(raw.rsvd_sec_cnt()).ok_or(BpbError::ReservedSectorCountZero)?;

        let bytes_per_sector = Self::bytes_per_sector_checked(raw.bytes_per_sec())?;

        let size_16 = raw.fat_sz_16();
        let size_32 = raw.fat_sz_32();

        let fat_size = if size_16 == 0 {
            size_32
        } else {
            size_16 as u32
        };

        let sectors_per_cluster = Self::sectors_per_cluster_checked(raw.sec_per_clus())?;

        let media = Self::media_checked(raw.media())?;

        let root_entry_count = raw.root_ent_cnt();

        let total_sector_count = Self::total_sector_count_checked(&raw)?;

        let root_dir_sectors =
            Self::compute_root_dir_sectors(root_entry_count as u32, bytes_per_sector.get() as u32);
        let data_sectors = Self::compute_data_sectors(
            fat_size,
            total_sector_count.get(),
            reserved_sector_count.get() as u32,
            raw.num_fats() as u32,
            root_dir_sectors,
        )
        .ok_or(BpbError::MetadataTooLarge)?;
        let cluster_count = Self::compute_cluster_count(data_sectors, sectors_per_cluster.into());

        let fat_type = Self::compute_fat_type(cluster_count)?;

        let me = Self {
            fat_type,
            fat_size,
            reserved_sector_count,
            bytes_per_sector,
            sectors_per_cluster,
            media,
            raw,
            root_entry_count,
            cluster_count,
        };

        let verification_error = me
            .verify_signature()
            .or(me.verify_root_entry_count())
            .or(me.verify_total_sector_count())
            .or(me.verify_fat_size());

        if let Some(err) = verification_error {
            Err(err)
        } else {
            Ok(me)
        }
    }

    pub fn reserved_sector_count(&self) -> NonZeroU16 {
        self.reserved_sector_count
    }

    pub fn bytes_per_sector(&self) -> NonZeroU16 {
        self.bytes_per_sector
    }

    pub fn sectors_per_cluster(&self) -> NonZeroU8 {
        self.sectors_per_cluster
    }

    pub fn fat_size(&self) -> u32 {
        self.fat_size
    }

    pub fn fat_type(&self) -> FatType {
        self.fat_type
    }

    pub fn media(&self) -> NonZeroU8 {
        self.media
    }

    /// Sectors taken by a FAT12/16 root directory with `root_entry_count`
    /// entries, rounded up.
    pub fn compute_root_dir_sectors(root_entry_count: u32, bytes_per_sector: u32) -> u32 {
        ((root_entry_count * Self::DIR_ENTRY_SIZE) + (bytes_per_sector - 1)) / bytes_per_sector
    }

    pub fn cluster_count(&self) -> u32 {
        self.cluster_count
    }

    pub fn compute_data_sectors(
        fat_size: u32,
        total_sector_count: u32,
        reserved_sectors: u32,
        num_fats: u32,
        root_dir_sectors: u32,
    ) -> Option<u32> {
        let metadata = num_fats
            .checked_mul(fat_size)?
            .checked_add(reserved_sectors)?
            .checked_add(root_dir_sectors)?;
        total_sector_count.checked_sub(metadata)
    }

    pub fn compute_cluster_count(data_sectors: u32, sectors_per_cluster: NonZeroU32) -> u32 {
        data_sectors / sectors_per_cluster.get()
    }

    /// The FAT type follows from the cluster count alone.
    pub fn compute_fat_type(cluster_count: u32) -> Result<FatType, BpbError> {
        if cluster_count < FatType::FAT16_MIN_CLUSTERS {
            Err(BpbError::Fat12NotSupported)
        } else if cluster_count < FatType::FAT32_MIN_CLUSTERS {
            Ok(FatType::Fat16)
        } else {
            Ok(FatType::Fat32)
        }
    }

    fn sectors_per_cluster_checked(sectors_per_cluster: u8) -> Result<NonZeroU8, BpbError> {
        match NonZeroU8::new(sectors_per_cluster) {
            Some(value) if sectors_per_cluster.is_power_of_two() => Ok(value),
            _ => Err(BpbError::InvalidSectorsPerCluster(sectors_per_cluster)),
        }
    }

    fn total_sector_count_checked(raw: &BiosParameterBlockRaw) -> Result<NonZeroU32, BpbError> {
        let sec_16 = raw.tot_sec_16();
        let sec_32 = raw.tot_sec_32();
        match (sec_16, sec_32) {
            (0, 0) => Err(BpbError::BothSectorCountsZero),
            (0, sec_32) => NonZeroU32::new(sec_32).ok_or(BpbError::BothSectorCountsZero),
            (sec_16, 0) => NonZeroU32::new(sec_16 as u32).ok_or(BpbError::BothSectorCountsZero),
            _ => Err(BpbError::BothSectorCountsNotZero),
        }
    }

    fn bytes_per_sector_checked(bytes_per_sec: u16) -> Result<NonZeroU16, BpbError> {
        match bytes_per_sec {
            512 | 1024 | 2048 | 4096 => {
                NonZeroU16::new(bytes_per_sec).ok_or(BpbError::InvalidBytesPerSector(bytes_per_sec))
            }
            _ => Err(BpbError::InvalidBytesPerSector(bytes_per_sec)),
        }
    }

    fn media_checked(media: u8) -> Result<NonZeroU8, BpbError> {
        match media {
            0xF0 | 0xF8..=0xFF => NonZeroU8::new(media).ok_or(BpbError::InvalidMedia(media)),
            _ => Err(BpbError::InvalidMedia(media)),
        }
    }

    fn verify_total_sector_count(&self) -> Option<BpbError> {
        match self.fat_type {
            FatType::Fat16 => None,
            FatType::Fat32 => {
                if self.raw.tot_sec_16() == 0 {
                    None
                } else {
                    Some(BpbError::Fat32(Fat32BpbError::Count16NotZero))
                }
            }
        }
    }

    fn verify_root_entry_count(&self) -> Option<BpbError> {
        let value = self.root_entry_count;
        match self.fat_type {
            FatType::Fat16 => {
                let bytes_per_sec = self.bytes_per_sector().get() as u32;
                let multiplied = value as u32 * Self::DIR_ENTRY_SIZE;
                if multiplied % bytes_per_sec == 0 {
                    None
                } else {
                    Some(BpbError::RootEntryCountSize)
                }
            }
            FatType::Fat32 => {
                if value != 0 {
                    Some(BpbError::Fat32(Fat32BpbError::RootEntryCountNotZero))
                } else {
                    None
                }
            }
        }
    }

    fn verify_fat_size(&self) -> Option<BpbError> {
        match self.fat_type {
            FatType::Fat16 => None,
            FatType::Fat32 => {
                if self.raw.fat_sz_16() == 0 {
                    None
                } else {
                    Some(BpbError::Fat32(Fat32BpbError::FatSize16NotZero))
                }
            }
        }
    }

    // This procedure is the same for all FATs
    fn verify_signature(&self) -> Option<BpbError> {
        let signature = self.raw.signature_word();
        if signature == Self::SIGNATURE {
            None
        } else {
            Some(BpbError::InvalidSignature(signature))
        }
    }

    // All following functions are fat32 only
    fn fat32_only(&self, field_name: &'static str) -> Result<(), BpbError> {
        if self.fat_type == FatType::Fat32 {
            Ok(())
        } else {
            Err(BpbError::Fat32Field(field_name))
        }
    }

    pub fn fs_version(&self) -> Result<u16, BpbError> {
        self.fat32_only("fs_version")?;
        let value = self.raw.fs_ver();
        if value == 0 {
            Ok(value)
        } else {
            Err(BpbError::Fat32(Fat32BpbError::FsVerNotZero))
        }
    }

    pub fn root_cluster(&self) -> Result<u32, BpbError> {
        self.fat32_only("root_cluster")?;
        let value = self.raw.root_clus();
        if value >= 2 {
            Ok(value)
        } else {
            Err(BpbError::Fat32(Fat32BpbError::RootClusterLessThanTwo))
        }
    }

    pub fn fs_info(&self) -> Result<u16, BpbError> {
        self.fat32_only("fs_info")?;
        Ok(self.raw.fs_info())
    }

    pub fn bk_boot_sector(&self) -> Result<u16, BpbError> {
        self.fat32_only("bk_boot_sector")?;
        let value = self.raw.bk_boot_sec();
        if value == 0 || value == 6 {
            Ok(value)
        } else {
            Err(BpbError::Fat32(Fat32BpbError::InvalidBackupBootSector(
                value,
            )))
        }
    }
}

/// Field access to a boot sector, valid or not.
#[derive(Debug, Clone)]
pub struct BiosParameterBlockRaw {
    block: Block,
}

impl BiosParameterBlockRaw {
    /// An all-zero sector.
    pub fn new() -> Self {
        Self {
            block: Block::new(),
        }
    }

    pub fn into_block(self) -> Block {
        self.block
    }

    fn data(&self) -> &[u8] {
        &self.block.contents
    }

    fn data_mut(&mut self) -> &mut [u8] {
        &mut self.block.contents
    }

    define_field!(jmp_boot, set_jmp_boot, [u8; 3], 0);
    define_field!(oem_name, set_oem_name, [u8; 8], 3);
    define_field!(bytes_per_sec, set_bytes_per_sec, u16, 11);
    define_field!(sec_per_clus, set_sec_per_clus, u8, 13);
    define_field!(rsvd_sec_cnt, set_rsvd_sec_cnt, u16, 14);
    define_field!(num_fats, set_num_fats, u8, 16);
    define_field!(root_ent_cnt, set_root_ent_cnt, u16, 17);
    define_field!(tot_sec_16, set_tot_sec_16, u16, 19);
    define_field!(media, set_media, u8, 21);
    define_field!(fat_sz_16, set_fat_sz_16, u16, 22);
    define_field!(sec_per_trk, set_sec_per_trk, u16, 24);
    define_field!(num_heads, set_num_heads, u16, 26);
    define_field!(hidd_sec, set_hidd_sec, u32, 28);
    define_field!(tot_sec_32, set_tot_sec_32, u32, 32);

    // FAT12/16 extended boot record
    define_field!(fat16_drv_num, set_fat16_drv_num, u8, 36);
    define_field!(fat16_boot_sig, set_fat16_boot_sig, u8, 38);
    define_field!(fat16_vol_id, set_fat16_vol_id, u32, 39);
    define_field!(fat16_vol_lab, set_fat16_vol_lab, [u8; 11], 43);
    define_field!(fat16_fil_sys_type, set_fat16_fil_sys_type, [u8; 8], 54);

    // FAT32 specific structure
    define_field!(fat_sz_32, set_fat_sz_32, u32, 36);
    define_field!(ext_flags, set_ext_flags, u16, 40);
    define_field!(fs_ver, set_fs_ver, u16, 42);
    define_field!(root_clus, set_root_clus, u32, 44);
    define_field!(fs_info, set_fs_info, u16, 48);
    define_field!(bk_boot_sec, set_bk_boot_sec, u16, 50);
    define_field!(fat32_drv_num, set_fat32_drv_num, u8, 64);
    define_field!(fat32_boot_sig, set_fat32_boot_sig, u8, 66);
    define_field!(fat32_vol_id, set_fat32_vol_id, u32, 67);
    define_field!(fat32_vol_lab, set_fat32_vol_lab, [u8; 11], 71);
    define_field!(fat32_fil_sys_type, set_fat32_fil_sys_type, [u8; 8], 82);

    define_field!(signature_word, set_signature_word, [u8; 2], 510);
}

impl Default for BiosParameterBlockRaw {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fat16_raw() -> BiosParameterBlockRaw {
        let mut raw = BiosParameterBlockRaw::new();
        raw.set_bytes_per_sec(512);
        raw.set_sec_per_clus(1);
        raw.set_rsvd_sec_cnt(1);
        raw.set_num_fats(2);
        raw.set_root_ent_cnt(512);
        raw.set_tot_sec_16(8192);
        raw.set_fat_sz_16(32);
        raw.set_media(0xF8);
        raw.set_signature_word(&BiosParameterBlock::SIGNATURE);
        raw
    }

    #[test]
    fn accepts_minimal_fat16() {
        let bpb = BiosParameterBlock::new(fat16_raw().into_block()).unwrap();
        assert_eq!(bpb.fat_type(), FatType::Fat16);
        // 8192 - 1 reserved - 64 FAT - 32 root directory
        assert_eq!(bpb.cluster_count(), 8095);
        assert_eq!(bpb.root_cluster(), Err(BpbError::Fat32Field("root_cluster")));
    }

    #[test]
    fn rejects_fat12_sized_volume() {
        let mut raw = fat16_raw();
        raw.set_tot_sec_16(2048);
        raw.set_fat_sz_16(8);
        assert_eq!(
            BiosParameterBlock::new(raw.into_block()).unwrap_err(),
            BpbError::Fat12NotSupported
        );
    }

    #[test]
    fn rejects_missing_signature_and_bad_fields() {
        let mut raw = fat16_raw();
        raw.set_signature_word(&[0, 0]);
        assert_eq!(
            BiosParameterBlock::new(raw.into_block()).unwrap_err(),
            BpbError::InvalidSignature([0, 0])
        );

        let mut raw = fat16_raw();
        raw.set_sec_per_clus(3);
        assert_eq!(
            BiosParameterBlock::new(raw.into_block()).unwrap_err(),
            BpbError::InvalidSectorsPerCluster(3)
        );

        let mut raw = fat16_raw();
        raw.set_tot_sec_32(8192);
        assert_eq!(
            BiosParameterBlock::new(raw.into_block()).unwrap_err(),
            BpbError::BothSectorCountsNotZero
        );

        let mut raw = fat16_raw();
        raw.set_fat_sz_16(5000);
        assert_eq!(
            BiosParameterBlock::new(raw.into_block()).unwrap_err(),
            BpbError::MetadataTooLarge
        );
    }

    #[test]
    fn fields_round_trip_through_the_block() {
        let mut raw = BiosParameterBlockRaw::new();
        raw.set_fat32_vol_lab(b"DATALOGGER ");
        raw.set_hidd_sec(0x0102_0304);
        let block = raw.into_block();
        assert_eq!(&block.contents[71..82], b"DATALOGGER ");
        assert_eq!(&block.contents[28..32], &[0x04, 0x03, 0x02, 0x01]);
    }
}

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
