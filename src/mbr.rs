//! sdmmc-datalogger - Master Boot Record
//!
//! Reading and writing the classic four-entry partition table in block 0,
//! plus a block device view of a single partition.

use core::{convert::TryInto, fmt::Debug};

use embedded_sdmmc::{Block, BlockCount, BlockDevice, BlockIdx};

#[derive(Debug, PartialEq, Eq)]
pub enum Error<BlockDeviceError>
where
    BlockDeviceError: Debug,
{
    DeviceError(BlockDeviceError),
    InvalidMbrSignature,
    InvalidPartitionStatus,
    InfoTooShort,
}

impl<BDE> From<BDE> for Error<BDE>
where
    BDE: Debug,
{
    fn from(e: BDE) -> Self {
        Self::DeviceError(e)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionNumber {
    One,
    Two,
    Three,
    Four,
}

#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionType {
    Fat32ChsLba,
    Fat32Lba,
    Fat16Lba,
    Fat16,
    Empty,
    Unknown(u8),
}

impl PartitionType {
    /// Marker for a FAT32 partition. What Macosx disk utility (and also SD-Card formatter?)
    /// use.
    const FAT32_CHS_LBA: u8 = 0x0B;
    /// Marker for a FAT32 partition. Sometimes also use for FAT16 formatted
    /// partitions.
    const FAT32_LBA: u8 = 0x0C;
    /// Marker for a FAT16 partition with LBA. Seen on a Raspberry Pi SD card.
    const FAT16_LBA: u8 = 0x0E;
    /// Marker for a FAT16 partition. Seen on a card formatted with the official
    /// SD-Card formatter.
    const FAT16: u8 = 0x06;
    const EMPTY: u8 = 0x00;

    pub fn from_u8(value: u8) -> Self {
        match value {
            Self::FAT32_CHS_LBA => Self::Fat32ChsLba,
            Self::FAT32_LBA => Self::Fat32Lba,
            Self::FAT16_LBA => Self::Fat16Lba,
            Self::FAT16 => Self::Fat16,
            Self::EMPTY => Self::Empty,
            _ => Self::Unknown(value),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::Fat32ChsLba => Self::FAT32_CHS_LBA,
            Self::Fat32Lba => Self::FAT32_LBA,
            Self::Fat16Lba => Self::FAT16_LBA,
            Self::Fat16 => Self::FAT16,
            Self::Empty => Self::EMPTY,
            Self::Unknown(value) => value,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum PartitionError<E>
where
    E: Debug,
{
    DeviceError(E),
    OutOfRange { partition_block_count: BlockCount },
}

/// Block addresses relative to the start of one partition.
pub struct PartitionBlockDevice<'bd, BD>
where
    BD: BlockDevice,
{
    block_device: &'bd BD,
    partition: Partition,
}

impl<'bd, BD> PartitionBlockDevice<'bd, BD>
where
    BD: BlockDevice,
{
    fn range_check(&self, start: u32, len: u32) -> Result<(), PartitionError<BD::Error>> {
        let last_block = start.checked_add(len);

        match last_block {
            Some(last) if last <= self.partition.block_count.0 => Ok(()),
            _ => Err(PartitionError::OutOfRange {
                partition_block_count: self.partition.block_count,
            }),
        }
    }
}

impl<'bd, BD> BlockDevice for PartitionBlockDevice<'bd, BD>
where
    BD: BlockDevice,
{
    type Error = PartitionError<BD::Error>;

    fn read(
        &self,
        blocks: &mut [Block],
        start_block_idx: BlockIdx,
        reason: &str,
    ) -> Result<(), Self::Error> {
        let blocks_to_read = blocks.len() as u32;
        self.range_check(start_block_idx.0, blocks_to_read)?;

        let part_start_block_idx = start_block_idx + self.partition.lba_start;

        self.block_device
            .read(blocks, part_start_block_idx, reason)
            .map_err(PartitionError::DeviceError)
    }

    fn write(&self, blocks: &[Block], start_block_idx: BlockIdx) -> Result<(), Self::Error> {
        let blocks_to_write = blocks.len() as u32;
        self.range_check(start_block_idx.0, blocks_to_write)?;

        let part_start_block_idx = start_block_idx + self.partition.lba_start;

        self.block_device
            .write(blocks, part_start_block_idx)
            .map_err(PartitionError::DeviceError)
    }

    fn num_blocks(&self) -> Result<BlockCount, Self::Error> {
        Ok(self.partition.block_count)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    pub ty: PartitionType,
    pub lba_start: BlockCount,
    pub block_count: BlockCount,
}

impl Partition {
    const STATUS_IDX: usize = 0;
    const CHS_START_IDX: usize = 1;
    const TYPE_IDX: usize = 4;
    const CHS_END_IDX: usize = 5;
    const LBA_START_IDX: usize = 8;
    const NUM_BLOCKS_IDX: usize = 12;
    pub(crate) const PARTITION_INFO_LENGTH: usize = 16;

    /// CHS address meaning "use the LBA fields".
    const CHS_LBA_ONLY: [u8; 3] = [0xFE, 0xFF, 0xFF];

    pub fn from_info<E>(info: &[u8]) -> Result<Self, Error<E>>
    where
        E: Debug,
    {
        if info.len() != Self::PARTITION_INFO_LENGTH {
            return Err(Error::InfoTooShort);
        }

        let pstatus = info[Self::STATUS_IDX];
        if pstatus != 0x80 && pstatus != 0x00 {
            return Err(Error::InvalidPartitionStatus);
        }

        let lba_start = u32::from_le_bytes(
            info[Self::LBA_START_IDX..Self::LBA_START_IDX + 4]
                .try_into()
                .expect("Infallible"),
        );

        let num_blocks = u32::from_le_bytes(
            info[Self::NUM_BLOCKS_IDX..Self::NUM_BLOCKS_IDX + 4]
                .try_into()
                .expect("Infallible"),
        );

        let partition_type = PartitionType::from_u8(info[Self::TYPE_IDX]);

        Ok(Partition {
            ty: partition_type,
            lba_start: BlockCount(lba_start),
            block_count: BlockCount(num_blocks),
        })
    }

    /// Fill in a 16 byte partition table entry. The partition is not marked
    /// bootable.
    pub fn write_info(&self, info: &mut [u8]) {
        info[Self::STATUS_IDX] = 0x00;
        info[Self::CHS_START_IDX..Self::CHS_START_IDX + 3].copy_from_slice(&Self::CHS_LBA_ONLY);
        info[Self::TYPE_IDX] = self.ty.as_u8();
        info[Self::CHS_END_IDX..Self::CHS_END_IDX + 3].copy_from_slice(&Self::CHS_LBA_ONLY);
        info[Self::LBA_START_IDX..Self::LBA_START_IDX + 4]
            .copy_from_slice(&self.lba_start.0.to_le_bytes());
        info[Self::NUM_BLOCKS_IDX..Self::NUM_BLOCKS_IDX + 4]
            .copy_from_slice(&self.block_count.0.to_le_bytes());
    }

    pub fn with_block_device<'bd, BD>(&self, block_device: &'bd BD) -> PartitionBlockDevice<'bd, BD>
    where
        BD: BlockDevice,
    {
        PartitionBlockDevice {
            block_device,
            partition: *self,
        }
    }
}

pub struct Mbr;

impl Mbr {
    const FOOTER_START: usize = 510;
    const FOOTER_VALUE: u16 = 0xAA55;
    const PARTITION1_START: usize = 446;
    const PARTITION2_START: usize = Self::PARTITION1_START + Partition::PARTITION_INFO_LENGTH;
    const PARTITION3_START: usize = Self::PARTITION2_START + Partition::PARTITION_INFO_LENGTH;
    const PARTITION4_START: usize = Self::PARTITION3_START + Partition::PARTITION_INFO_LENGTH;

    fn info_start(partition_num: PartitionNumber) -> usize {
        match partition_num {
            PartitionNumber::One => Self::PARTITION1_START,
            PartitionNumber::Two => Self::PARTITION2_START,
            PartitionNumber::Three => Self::PARTITION3_START,
            PartitionNumber::Four => Self::PARTITION4_START,
        }
    }

    pub fn read_partition<BlockDev>(
        block_dev: &BlockDev,
        partition_num: PartitionNumber,
    ) -> Result<Partition, Error<BlockDev::Error>>
    where
        BlockDev: BlockDevice,
    {
        let mut blocks = [Block::new()];
        block_dev.read(&mut blocks, BlockIdx(0), "read_mbr")?;
        let [first_block] = blocks;

        let footer = u16::from_le_bytes(
            first_block.contents[Self::FOOTER_START..Self::FOOTER_START + 2]
                .try_into()
                .expect("Infallible"),
        );

        if footer != Self::FOOTER_VALUE {
            return Err(Error::InvalidMbrSignature);
        }

        let pinfo_start = Self::info_start(partition_num);
        let pinfo_data = &first_block.contents[pinfo_start..pinfo_start + Partition::PARTITION_INFO_LENGTH];
        Partition::from_info(pinfo_data)
    }

    /// Replace block 0 with a table holding only `partition`, as entry one.
    pub fn write_single<BlockDev>(
        block_dev: &BlockDev,
        partition: &Partition,
    ) -> Result<(), Error<BlockDev::Error>>
    where
        BlockDev: BlockDevice,
    {
        let mut block = Block::new();
        let pinfo_start = Self::info_start(PartitionNumber::One);
        partition.write_info(
            &mut block.contents[pinfo_start..pinfo_start + Partition::PARTITION_INFO_LENGTH],
        );
        block.contents[Self::FOOTER_START..Self::FOOTER_START + 2]
            .copy_from_slice(&Self::FOOTER_VALUE.to_le_bytes());
        block_dev.write(&[block], BlockIdx(0))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_device::MemoryBlockDevice;

    #[test]
    fn write_then_read_single_partition() {
        let mut memory = vec![0u8; 16 * Block::LEN];
        let device = MemoryBlockDevice::new(&mut memory);
        let partition = Partition {
            ty: PartitionType::Fat16Lba,
            lba_start: BlockCount(4),
            block_count: BlockCount(12),
        };
        Mbr::write_single(&device, &partition).unwrap();

        assert_eq!(Mbr::read_partition(&device, PartitionNumber::One), Ok(partition));
        assert_eq!(
            Mbr::read_partition(&device, PartitionNumber::Two).map(|p| p.ty),
            Ok(PartitionType::Empty)
        );

        drop(device);
        assert_eq!(&memory[446..462], &[
            0x00, 0xFE, 0xFF, 0xFF, 0x0E, 0xFE, 0xFF, 0xFF,
            0x04, 0x00, 0x00, 0x00, 0x0C, 0x00, 0x00, 0x00,
        ]);
        assert_eq!(&memory[510..512], &[0x55, 0xAA]);
    }

    #[test]
    fn blank_disk_has_no_signature() {
        let mut memory = vec![0u8; 4 * Block::LEN];
        let device = MemoryBlockDevice::new(&mut memory);
        assert_eq!(
            Mbr::read_partition(&device, PartitionNumber::One),
            Err(Error::InvalidMbrSignature)
        );
    }

    #[test]
    fn bad_status_byte() {
        let mut info = [0u8; 16];
        info[0] = 0x7F;
        assert_eq!(
            Partition::from_info::<()>(&info),
            Err(Error::InvalidPartitionStatus)
        );
        assert_eq!(Partition::from_info::<()>(&info[..8]), Err(Error::InfoTooShort));
    }

    #[test]
    fn partition_view_is_offset_and_bounded() {
        let mut memory = vec![0u8; 8 * Block::LEN];
        let device = MemoryBlockDevice::new(&mut memory);
        let partition = Partition {
            ty: PartitionType::Fat16Lba,
            lba_start: BlockCount(2),
            block_count: BlockCount(4),
        };
        let view = partition.with_block_device(&device);

        let mut block = Block::new();
        block.contents[0] = 0x42;
        view.write(&[block], BlockIdx(1)).unwrap();
        assert_eq!(view.num_blocks(), Ok(BlockCount(4)));
        assert_eq!(
            view.write(&[Block::new(), Block::new()], BlockIdx(3)),
            Err(PartitionError::OutOfRange {
                partition_block_count: BlockCount(4)
            })
        );

        drop(view);
        drop(device);
        assert_eq!(memory[3 * 512], 0x42);
    }
}

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
