use embedded_sdmmc::Block;

/// The FAT32 FSInfo sector: a hint of how many clusters are free and where
/// to start looking for one.
#[derive(Debug, Clone)]
pub struct FsInfoRaw {
    block: Block,
}

impl FsInfoRaw {
    pub const LEAD_SIG: u32 = 0x4161_5252;
    pub const STRUC_SIG: u32 = 0x6141_7272;
    pub const TRAIL_SIG: u32 = 0xAA55_0000;
    /// Either count field may hold this to mean "not known".
    pub const UNKNOWN: u32 = 0xFFFF_FFFF;

    /// A sector with all three signatures and both hints set.
    pub fn new(free_count: u32, next_free: u32) -> Self {
        let mut me = Self {
            block: Block::new(),
        };
        me.set_lead_sig(Self::LEAD_SIG);
        me.set_struc_sig(Self::STRUC_SIG);
        me.set_trail_sig(Self::TRAIL_SIG);
        me.set_free_count(free_count);
        me.set_nxt_free(next_free);
        me
    }

    pub fn from_block(block: Block) -> Self {
        Self { block }
    }

    pub fn into_block(self) -> Block {
        self.block
    }

    pub fn is_valid(&self) -> bool {
        self.lead_sig() == Self::LEAD_SIG
            && self.struc_sig() == Self::STRUC_SIG
            && self.trail_sig() == Self::TRAIL_SIG
    }

    fn data(&self) -> &[u8] {
        &self.block.contents
    }

    fn data_mut(&mut self) -> &mut [u8] {
        &mut self.block.contents
    }

    define_field!(lead_sig, set_lead_sig, u32, 0);
    define_field!(struc_sig, set_struc_sig, u32, 484);
    define_field!(free_count, set_free_count, u32, 488);
    define_field!(nxt_free, set_nxt_free, u32, 492);
    define_field!(trail_sig, set_trail_sig, u32, 508);
}

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
