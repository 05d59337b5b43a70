//! Descriptor ring construction
//!
//! A ring is N equal data blocks followed by a stop command. Block i falls
//! through to block i+1; the last block branches back to the first and is
//! the only one that raises an interrupt, once per trip around the ring.

use crate::{
    CommandKind, DESCRIPTOR_SIZE, Direction, DmaError, DmaResult, PhysicalMapper, Policy,
    TransferBlock,
};

/// A complete, closed transfer program
#[derive(Debug, Clone)]
pub struct RingProgram {
    direction: Direction,
    blocks: Vec<TransferBlock>,
    command_base: u32,
    block_size: usize,
    block_count: usize,
}

impl RingProgram {
    /// Build a ring of `block_count` blocks of `block_size` bytes over the
    /// buffer described by `mapper`. `command_base` is the bus address the
    /// descriptor list itself will be loaded at.
    ///
    /// A block's physical address is extrapolated from the previous block
    /// only while both start in the same page; entering a new page resolves
    /// the address through the mapper again. Any failed resolution aborts
    /// the whole build.
    pub fn build(
        direction: Direction,
        mapper: &dyn PhysicalMapper,
        command_base: u32,
        block_size: usize,
        block_count: usize,
    ) -> DmaResult<Self> {
        if block_count == 0 {
            return Err(DmaError::InvalidGeometry("block count is zero".into()));
        }
        if block_size == 0 || block_size > u16::MAX as usize {
            return Err(DmaError::InvalidGeometry(format!(
                "block size {block_size} outside 1..=65535"
            )));
        }
        let ring_bytes = block_size
            .checked_mul(block_count)
            .ok_or_else(|| DmaError::InvalidGeometry("ring size overflows".into()))?;
        if ring_bytes > mapper.len() {
            return Err(DmaError::InvalidGeometry(format!(
                "ring of {ring_bytes} bytes exceeds mapped buffer of {} bytes",
                mapper.len()
            )));
        }
        if command_base as usize % DESCRIPTOR_SIZE != 0 {
            return Err(DmaError::InvalidGeometry(format!(
                "command base {command_base:#x} is not descriptor aligned"
            )));
        }
        let list_bytes = (block_count + 1) * DESCRIPTOR_SIZE;
        if command_base as u64 + list_bytes as u64 > u32::MAX as u64 + 1 {
            return Err(DmaError::InvalidGeometry("command list exceeds 32-bit bus".into()));
        }

        let kind = match direction {
            Direction::Output => CommandKind::OutputMore,
            Direction::Input => CommandKind::InputMore,
        };
        let page_size = mapper.page_size();
        let command_addr = |index: usize| command_base + (index * DESCRIPTOR_SIZE) as u32;

        let mut blocks = Vec::with_capacity(block_count + 1);
        let mut phys = 0u32;
        let mut prev_page = None;

        for i in 0..block_count {
            let offset = i * block_size;
            let page = offset / page_size;

            phys = match prev_page {
                Some(p) if p == page => phys
                    .checked_add(block_size as u32)
                    .ok_or(DmaError::Mapping { block: i, offset })?,
                _ => mapper
                    .physical_address(offset)
                    .ok_or(DmaError::Mapping { block: i, offset })?,
            };
            prev_page = Some(page);

            // A block straddling pages must still be physically contiguous
            let end = offset + block_size - 1;
            if end / page_size != page {
                let tail = mapper
                    .physical_address(end)
                    .ok_or(DmaError::Mapping { block: i, offset: end })?;
                if tail as u64 != phys as u64 + block_size as u64 - 1 {
                    return Err(DmaError::InvalidGeometry(format!(
                        "block {i} straddles discontiguous pages"
                    )));
                }
            }

            let last = i + 1 == block_count;
            let next = if last { command_addr(0) } else { command_addr(i + 1) };
            let mut block = TransferBlock::data(kind, phys, block_size as u16, next);
            if last {
                block.interrupt = Policy::Always;
                block.branch = Policy::Always;
            }
            blocks.push(block);
        }
        blocks.push(TransferBlock::stop());

        log::debug!(
            "Built {:?} ring: {} blocks x {} bytes, commands at {:#x}",
            direction,
            block_count,
            block_size,
            command_base
        );

        Ok(Self {
            direction,
            blocks,
            command_base,
            block_size,
            block_count,
        })
    }

    #[inline]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    #[inline]
    pub fn command_base(&self) -> u32 {
        self.command_base
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    #[inline]
    pub fn block_count(&self) -> usize {
        self.block_count
    }

    /// Ring length in bytes
    #[inline]
    pub fn ring_bytes(&self) -> usize {
        self.block_size * self.block_count
    }

    /// All descriptors, data blocks followed by the stop command
    pub fn descriptors(&self) -> &[TransferBlock] {
        &self.blocks
    }

    pub fn block(&self, index: usize) -> Option<&TransferBlock> {
        self.blocks.get(index).filter(|_| index < self.block_count)
    }

    /// Index of the block the hardware moves to after `index`
    pub fn successor(&self, index: usize) -> Option<usize> {
        let block = self.block(index)?;
        if block.branch == Policy::Always {
            let delta = block.branch_target.checked_sub(self.command_base)? as usize;
            if delta % DESCRIPTOR_SIZE != 0 {
                return None;
            }
            let target = delta / DESCRIPTOR_SIZE;
            (target < self.block_count).then_some(target)
        } else {
            (index + 1 < self.block_count).then_some(index + 1)
        }
    }

    /// Number of data blocks that raise an interrupt
    pub fn interrupt_count(&self) -> usize {
        self.blocks[..self.block_count]
            .iter()
            .filter(|b| b.interrupt_enabled())
            .count()
    }

    /// Encoded descriptor list, ready to copy to `command_base`
    pub fn encode(&self) -> Vec<u8> {
        self.blocks.iter().flat_map(|b| b.encode()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ContiguousMapper, PagedMapper};

    #[test]
    fn test_closed_cycle() {
        let mapper = ContiguousMapper::new(0x8000, 512 * 128, 4096);
        let ring = RingProgram::build(Direction::Output, &mapper, 0x1000, 128, 512).unwrap();

        let mut index = 0;
        for _ in 0..ring.block_count() {
            index = ring.successor(index).unwrap();
        }
        assert_eq!(index, 0);
        assert_eq!(ring.interrupt_count(), 1);
        assert!(ring.block(511).unwrap().interrupt_enabled());
    }

    #[test]
    fn test_stop_terminates_list() {
        let mapper = ContiguousMapper::new(0, 4096, 4096);
        let ring = RingProgram::build(Direction::Input, &mapper, 0, 1024, 4).unwrap();
        assert_eq!(ring.descriptors().len(), 5);
        assert_eq!(ring.descriptors()[4].kind, CommandKind::Stop);
        assert_eq!(ring.descriptors()[0].kind, CommandKind::InputMore);
        assert_eq!(ring.encode().len(), 5 * DESCRIPTOR_SIZE);
    }

    #[test]
    fn test_page_crossing_resolves_again() {
        let mapper = PagedMapper::scattered(0x40_0000, 4, 4096);
        let ring = RingProgram::build(Direction::Output, &mapper, 0, 1024, 16).unwrap();

        for i in 0..16 {
            let offset = i * 1024;
            assert_eq!(
                ring.block(i).unwrap().address,
                mapper.physical_address(offset).unwrap(),
                "block {i}"
            );
        }
    }

    #[test]
    fn test_mapping_failure_aborts() {
        let mut mapper = PagedMapper::scattered(0x40_0000, 4, 4096);
        mapper.unmap(2);
        let err = RingProgram::build(Direction::Output, &mapper, 0, 1024, 16).unwrap_err();
        assert_eq!(err, DmaError::Mapping { block: 8, offset: 8192 });
    }

    #[test]
    fn test_straddling_block_rejected() {
        let mapper = PagedMapper::scattered(0x40_0000, 4, 4096);
        let err = RingProgram::build(Direction::Output, &mapper, 0, 3000, 4).unwrap_err();
        assert!(matches!(err, DmaError::InvalidGeometry(_)));
    }

    #[test]
    fn test_invalid_geometry() {
        let mapper = ContiguousMapper::new(0, 4096, 4096);
        assert!(RingProgram::build(Direction::Output, &mapper, 0, 0, 4).is_err());
        assert!(RingProgram::build(Direction::Output, &mapper, 0, 128, 0).is_err());
        assert!(RingProgram::build(Direction::Output, &mapper, 0, 2048, 4).is_err());
        assert!(RingProgram::build(Direction::Output, &mapper, 8, 128, 4).is_err());
    }

    #[test]
    fn test_single_block_ring_loops_on_itself() {
        let mapper = ContiguousMapper::new(0, 256, 4096);
        let ring = RingProgram::build(Direction::Output, &mapper, 0x100, 256, 1).unwrap();
        assert_eq!(ring.successor(0), Some(0));
        assert_eq!(ring.interrupt_count(), 1);
    }
}
