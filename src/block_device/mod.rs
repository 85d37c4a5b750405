//! sdmmc-datalogger - Block device support
//!
//! A block device over a borrowed byte slice. Handy for RAM disks and for
//! exercising the whole storage stack on a host.

use core::cell::RefCell;

use embedded_sdmmc::{Block, BlockCount, BlockDevice, BlockIdx};

/// The possible errors `MemoryBlockDevice` can generate.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryError {
    /// The access runs past the end of the backing memory.
    OutOfRange { block: u32 },
}

#[derive(Debug)]
pub struct MemoryBlockDevice<'a> {
    memory: RefCell<&'a mut [u8]>,
}

impl<'a> MemoryBlockDevice<'a> {
    /// Any trailing partial block is ignored.
    pub fn new(memory: &'a mut [u8]) -> Self {
        Self {
            memory: RefCell::new(memory),
        }
    }

    fn block_range(memory: &[u8], block_idx: u32) -> Result<core::ops::Range<usize>, MemoryError> {
        let start = block_idx as usize * Block::LEN;
        let end = start + Block::LEN;
        if end > memory.len() {
            Err(MemoryError::OutOfRange { block: block_idx })
        } else {
            Ok(start..end)
        }
    }
}

impl<'a> BlockDevice for MemoryBlockDevice<'a> {
    type Error = MemoryError;

    fn read(
        &self,
        blocks: &mut [Block],
        start_block_idx: BlockIdx,
        _reason: &str,
    ) -> Result<(), Self::Error> {
        let memory = self.memory.borrow();
        for (idx, block) in blocks.iter_mut().enumerate() {
            let range = Self::block_range(&memory, start_block_idx.0 + idx as u32)?;
            block.contents.copy_from_slice(&memory[range]);
        }
        Ok(())
    }

    fn write(&self, blocks: &[Block], start_block_idx: BlockIdx) -> Result<(), Self::Error> {
        let mut memory = self.memory.borrow_mut();
        for (idx, block) in blocks.iter().enumerate() {
            let range = Self::block_range(&memory, start_block_idx.0 + idx as u32)?;
            memory[range].copy_from_slice(&block.contents);
        }
        Ok(())
    }

    fn num_blocks(&self) -> Result<BlockCount, Self::Error> {
        Ok(BlockCount((self.memory.borrow().len() / Block::LEN) as u32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_land_at_their_offset() {
        let mut memory = vec![0u8; 4 * Block::LEN];
        let device = MemoryBlockDevice::new(&mut memory);

        let mut block = Block::new();
        block.contents[0] = 0xA5;
        block.contents[511] = 0x5A;
        device.write(&[block], BlockIdx(2)).unwrap();

        let mut read_back = [Block::new(), Block::new()];
        device.read(&mut read_back, BlockIdx(1), "test").unwrap();
        assert_eq!(read_back[0].contents, [0u8; 512]);
        assert_eq!(read_back[1].contents[0], 0xA5);
        assert_eq!(read_back[1].contents[511], 0x5A);

        drop(device);
        assert_eq!(memory[2 * 512], 0xA5);
    }

    #[test]
    fn out_of_range_is_an_error() {
        let mut memory = vec![0u8; 2 * Block::LEN + 100];
        let device = MemoryBlockDevice::new(&mut memory);
        assert_eq!(device.num_blocks().unwrap(), BlockCount(2));

        let mut blocks = [Block::new(), Block::new()];
        assert_eq!(
            device.read(&mut blocks, BlockIdx(1), "test"),
            Err(MemoryError::OutOfRange { block: 2 })
        );
        assert_eq!(
            device.write(&[Block::new()], BlockIdx(7)),
            Err(MemoryError::OutOfRange { block: 7 })
        );
    }
}

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
