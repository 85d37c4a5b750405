//! sdmmc-datalogger - Formatting
//!
//! Partitions a block device with a single MBR partition and lays down an
//! empty FAT16 or FAT32 filesystem in it, the way SD card formatters do:
//! partition aligned to 1 MiB, two FATs, FAT type chosen by cluster count.

use core::{fmt::Debug, slice};

use embedded_sdmmc::{Block, BlockCount, BlockDevice, BlockIdx};

use super::{
    bios_param_block::{BiosParameterBlock, BiosParameterBlockRaw, BpbError},
    fs_info::FsInfoRaw,
    FatType,
};
use crate::mbr::{self, Mbr, Partition, PartitionError, PartitionNumber, PartitionType};

/// First block of the partition.
pub const PARTITION_START: u32 = 2048;

const BYTES_PER_SECTOR: u16 = 512;
const NUM_FATS: u8 = 2;
/// Fixed, non-removable media.
const MEDIA: u8 = 0xF8;
const FAT16_RESERVED_SECTORS: u16 = 1;
const FAT16_ROOT_ENTRIES: u16 = 512;
const FAT32_RESERVED_SECTORS: u16 = 32;
const FAT32_ROOT_CLUSTER: u32 = 2;
const FAT32_FS_INFO_SECTOR: u16 = 1;
const FAT32_BACKUP_BOOT_SECTOR: u16 = 6;
/// Blocks written per request while clearing regions.
const ZERO_BATCH: usize = 8;

#[derive(Debug, PartialEq, Eq)]
pub enum FormatError<E>
where
    E: Debug,
{
    DeviceError(E),
    /// Not a power of two multiple of 512 bytes, or above 64 KiB.
    InvalidAllocationUnit(u32),
    /// Not even FAT16 with one sector per cluster fits.
    TooSmall { blocks: u32 },
    OutOfRange,
    /// Read back verification failures.
    BadPartitionTable,
    Bpb(BpbError),
    LayoutMismatch,
    BadFsInfo,
}

impl<E> From<PartitionError<E>> for FormatError<E>
where
    E: Debug,
{
    fn from(e: PartitionError<E>) -> Self {
        match e {
            PartitionError::DeviceError(e) => Self::DeviceError(e),
            PartitionError::OutOfRange { .. } => Self::OutOfRange,
        }
    }
}

impl<E> From<mbr::Error<E>> for FormatError<E>
where
    E: Debug,
{
    fn from(e: mbr::Error<E>) -> Self {
        match e {
            mbr::Error::DeviceError(e) => Self::DeviceError(e),
            _ => Self::BadPartitionTable,
        }
    }
}

impl<E> From<BpbError> for FormatError<E>
where
    E: Debug,
{
    fn from(e: BpbError) -> Self {
        Self::Bpb(e)
    }
}

#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatOptions {
    /// Preferred cluster size in bytes. Halved as needed on small cards.
    pub allocation_unit_size: u32,
    pub volume_id: u32,
    pub volume_label: [u8; 11],
}

impl FormatOptions {
    pub fn new(allocation_unit_size: u32) -> Self {
        FormatOptions {
            allocation_unit_size,
            volume_id: 0,
            volume_label: *b"NO NAME    ",
        }
    }
}

/// Where everything goes inside the partition. Sector numbers are relative
/// to the partition start.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub fat_type: FatType,
    pub total_sectors: u32,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub root_entries: u16,
    pub fat_size: u32,
    pub cluster_count: u32,
}

impl Layout {
    /// Pick cluster size and FAT type for a partition of `total_sectors`.
    pub fn plan<E>(total_sectors: u32, allocation_unit_size: u32) -> Result<Self, FormatError<E>>
    where
        E: Debug,
    {
        let sectors = allocation_unit_size / BYTES_PER_SECTOR as u32;
        if allocation_unit_size % BYTES_PER_SECTOR as u32 != 0
            || !sectors.is_power_of_two()
            || sectors > 128
        {
            return Err(FormatError::InvalidAllocationUnit(allocation_unit_size));
        }

        let mut sectors_per_cluster = sectors as u8;
        loop {
            if let Some(layout) = Self::with_cluster_size(total_sectors, sectors_per_cluster) {
                return Ok(layout);
            }
            if sectors_per_cluster == 1 {
                return Err(FormatError::TooSmall {
                    blocks: total_sectors,
                });
            }
            sectors_per_cluster /= 2;
        }
    }

    fn with_cluster_size(total_sectors: u32, sectors_per_cluster: u8) -> Option<Self> {
        let fat16 = Self::compute(FatType::Fat16, total_sectors, sectors_per_cluster)?;
        match BiosParameterBlock::compute_fat_type(fat16.cluster_count) {
            Ok(FatType::Fat16) => Some(fat16),
            Ok(FatType::Fat32) => Self::compute(FatType::Fat32, total_sectors, sectors_per_cluster)
                .filter(|fat32| fat32.cluster_count >= FatType::FAT32_MIN_CLUSTERS),
            Err(_) => None,
        }
    }

    fn compute(fat_type: FatType, total_sectors: u32, sectors_per_cluster: u8) -> Option<Self> {
        let (reserved_sectors, root_entries) = match fat_type {
            FatType::Fat16 => (FAT16_RESERVED_SECTORS, FAT16_ROOT_ENTRIES),
            FatType::Fat32 => (FAT32_RESERVED_SECTORS, 0),
        };
        let root_dir_sectors = BiosParameterBlock::compute_root_dir_sectors(
            root_entries as u32,
            BYTES_PER_SECTOR as u32,
        );

        // FAT size estimate from the Microsoft FAT specification. It may be
        // a little too large, never too small.
        let tmp1 = u64::from(total_sectors)
            .checked_sub(u64::from(reserved_sectors) + u64::from(root_dir_sectors))?;
        let mut tmp2 = 256 * u64::from(sectors_per_cluster) + u64::from(NUM_FATS);
        if fat_type == FatType::Fat32 {
            tmp2 /= 2;
        }
        let fat_size = u32::try_from((tmp1 + tmp2 - 1) / tmp2).ok()?;

        let data_sectors = BiosParameterBlock::compute_data_sectors(
            fat_size,
            total_sectors,
            reserved_sectors as u32,
            NUM_FATS as u32,
            root_dir_sectors,
        )?;

        Some(Layout {
            fat_type,
            total_sectors,
            sectors_per_cluster,
            reserved_sectors,
            root_entries,
            fat_size,
            cluster_count: data_sectors / sectors_per_cluster as u32,
        })
    }

    pub fn partition_type(&self) -> PartitionType {
        match self.fat_type {
            FatType::Fat16 => PartitionType::Fat16Lba,
            FatType::Fat32 => PartitionType::Fat32Lba,
        }
    }

    pub fn fat_start(&self, fat: u8) -> u32 {
        self.reserved_sectors as u32 + fat as u32 * self.fat_size
    }

    pub fn root_dir_start(&self) -> u32 {
        self.fat_start(NUM_FATS)
    }

    pub fn data_start(&self) -> u32 {
        self.root_dir_start()
            + BiosParameterBlock::compute_root_dir_sectors(
                self.root_entries as u32,
                BYTES_PER_SECTOR as u32,
            )
    }

    fn boot_sector(&self, options: &FormatOptions, hidden_sectors: u32) -> BiosParameterBlockRaw {
        let mut raw = BiosParameterBlockRaw::new();
        raw.set_oem_name(b"MSWIN4.1");
        raw.set_bytes_per_sec(BYTES_PER_SECTOR);
        raw.set_sec_per_clus(self.sectors_per_cluster);
        raw.set_rsvd_sec_cnt(self.reserved_sectors);
        raw.set_num_fats(NUM_FATS);
        raw.set_root_ent_cnt(self.root_entries);
        raw.set_media(MEDIA);
        raw.set_sec_per_trk(63);
        raw.set_num_heads(255);
        raw.set_hidd_sec(hidden_sectors);

        match self.fat_type {
            FatType::Fat16 => {
                raw.set_jmp_boot(&[0xEB, 0x3C, 0x90]);
                match u16::try_from(self.total_sectors) {
                    Ok(total) => raw.set_tot_sec_16(total),
                    Err(_) => raw.set_tot_sec_32(self.total_sectors),
                }
                raw.set_fat_sz_16(self.fat_size as u16);
                raw.set_fat16_drv_num(0x80);
                raw.set_fat16_boot_sig(0x29);
                raw.set_fat16_vol_id(options.volume_id);
                raw.set_fat16_vol_lab(&options.volume_label);
                raw.set_fat16_fil_sys_type(FatType::Fat16.label());
            }
            FatType::Fat32 => {
                raw.set_jmp_boot(&[0xEB, 0x58, 0x90]);
                raw.set_tot_sec_32(self.total_sectors);
                raw.set_fat_sz_32(self.fat_size);
                raw.set_root_clus(FAT32_ROOT_CLUSTER);
                raw.set_fs_info(FAT32_FS_INFO_SECTOR);
                raw.set_bk_boot_sec(FAT32_BACKUP_BOOT_SECTOR);
                raw.set_fat32_drv_num(0x80);
                raw.set_fat32_boot_sig(0x29);
                raw.set_fat32_vol_id(options.volume_id);
                raw.set_fat32_vol_lab(&options.volume_label);
                raw.set_fat32_fil_sys_type(FatType::Fat32.label());
            }
        }

        raw.set_signature_word(&BiosParameterBlock::SIGNATURE);
        raw
    }

    /// First sector of each FAT: the two reserved entries, plus the end of
    /// chain marker for the FAT32 root directory.
    fn fat_head(&self) -> Block {
        let mut block = Block::new();
        match self.fat_type {
            FatType::Fat16 => {
                block.contents[0..2].copy_from_slice(&(0xFF00 | MEDIA as u16).to_le_bytes());
                block.contents[2..4].copy_from_slice(&0xFFFFu16.to_le_bytes());
            }
            FatType::Fat32 => {
                block.contents[0..4].copy_from_slice(&(0x0FFF_FF00 | MEDIA as u32).to_le_bytes());
                block.contents[4..8].copy_from_slice(&0x0FFF_FFFFu32.to_le_bytes());
                block.contents[8..12].copy_from_slice(&0x0FFF_FFFFu32.to_le_bytes());
            }
        }
        block
    }

    fn write<D>(&self, volume: &D, options: &FormatOptions, hidden_sectors: u32) -> Result<(), D::Error>
    where
        D: BlockDevice,
    {
        let metadata_end = match self.fat_type {
            FatType::Fat16 => self.data_start(),
            FatType::Fat32 => self.data_start() + self.sectors_per_cluster as u32,
        };
        zero_blocks(volume, 0, metadata_end)?;

        let boot = self.boot_sector(options, hidden_sectors).into_block();
        volume.write(slice::from_ref(&boot), BlockIdx(0))?;

        if self.fat_type == FatType::Fat32 {
            // The root directory cluster is already taken.
            let fs_info = FsInfoRaw::new(self.cluster_count - 1, FAT32_ROOT_CLUSTER + 1).into_block();
            let backup = FAT32_BACKUP_BOOT_SECTOR as u32;
            volume.write(slice::from_ref(&fs_info), BlockIdx(FAT32_FS_INFO_SECTOR as u32))?;
            volume.write(slice::from_ref(&boot), BlockIdx(backup))?;
            volume.write(slice::from_ref(&fs_info), BlockIdx(backup + 1))?;
        }

        let fat_head = self.fat_head();
        for fat in 0..NUM_FATS {
            volume.write(slice::from_ref(&fat_head), BlockIdx(self.fat_start(fat)))?;
        }

        Ok(())
    }
}

fn zero_blocks<D>(device: &D, start: u32, count: u32) -> Result<(), D::Error>
where
    D: BlockDevice,
{
    let zeros: [Block; ZERO_BATCH] = core::array::from_fn(|_| Block::new());
    let end = start + count;
    let mut idx = start;
    while idx < end {
        let batch = core::cmp::min(ZERO_BATCH as u32, end - idx);
        device.write(&zeros[..batch as usize], BlockIdx(idx))?;
        idx += batch;
    }
    Ok(())
}

/// Partition and format `device`. Everything on it is lost.
pub fn format_volume<D>(device: &D, options: &FormatOptions) -> Result<Layout, FormatError<D::Error>>
where
    D: BlockDevice,
{
    let BlockCount(total_blocks) = device.num_blocks().map_err(FormatError::DeviceError)?;
    let partition_blocks = total_blocks
        .checked_sub(PARTITION_START)
        .filter(|blocks| *blocks > 0)
        .ok_or(FormatError::TooSmall {
            blocks: total_blocks,
        })?;

    let layout = Layout::plan(partition_blocks, options.allocation_unit_size)?;
    info!(
        "Formatting {} blocks as {:?}, {} clusters of {} blocks",
        partition_blocks,
        layout.fat_type,
        layout.cluster_count,
        layout.sectors_per_cluster
    );

    let partition = Partition {
        ty: layout.partition_type(),
        lba_start: BlockCount(PARTITION_START),
        block_count: BlockCount(partition_blocks),
    };
    Mbr::write_single(device, &partition)?;
    layout.write(&partition.with_block_device(device), options, PARTITION_START)?;

    verify(device, &layout)?;
    debug!("Format verified");
    Ok(layout)
}

/// Read the partition table and boot sector back and check they describe
/// `layout`.
fn verify<D>(device: &D, layout: &Layout) -> Result<(), FormatError<D::Error>>
where
    D: BlockDevice,
{
    let partition = Mbr::read_partition(device, PartitionNumber::One)?;
    if partition.ty != layout.partition_type()
        || partition.lba_start != BlockCount(PARTITION_START)
        || partition.block_count != BlockCount(layout.total_sectors)
    {
        return Err(FormatError::BadPartitionTable);
    }

    let volume = partition.with_block_device(device);
    let mut blocks = [Block::new()];
    volume.read(&mut blocks, BlockIdx(0), "verify_bpb")?;
    let [boot] = blocks;
    let bpb = BiosParameterBlock::new(boot)?;
    if bpb.fat_type() != layout.fat_type
        || bpb.cluster_count() != layout.cluster_count
        || bpb.fat_size() != layout.fat_size
        || bpb.sectors_per_cluster().get() != layout.sectors_per_cluster
        || bpb.reserved_sector_count().get() != layout.reserved_sectors
        || bpb.media().get() != MEDIA
    {
        return Err(FormatError::LayoutMismatch);
    }

    if layout.fat_type == FatType::Fat32 {
        bpb.fs_version()?;
        bpb.root_cluster()?;
        bpb.bk_boot_sector()?;
        let mut blocks = [Block::new()];
        volume.read(&mut blocks, BlockIdx(bpb.fs_info()? as u32), "verify_fs_info")?;
        let [fs_info] = blocks;
        if !FsInfoRaw::from_block(fs_info).is_valid() {
            return Err(FormatError::BadFsInfo);
        }
    }

    Ok(())
}


// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
