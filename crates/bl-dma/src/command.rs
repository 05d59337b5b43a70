//! Descriptor encoding
//!
//! Each descriptor is 16 bytes, little-endian:
//!
//! ```text
//! word 0: cmd[31:28] key[26:24] i[21:20] b[19:18] w[17:16] req_count[15:0]
//! word 1: data address
//! word 2: branch target (command dependency)
//! word 3: xfer status[31:16] residual count[15:0]  (hardware writes this)
//! ```

use crate::{DmaError, DmaResult};

/// Size of one encoded descriptor in bytes
pub const DESCRIPTOR_SIZE: usize = 16;

/// Descriptor command kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandKind {
    OutputMore = 0,
    OutputLast = 1,
    InputMore = 2,
    InputLast = 3,
    StoreQuad = 4,
    LoadQuad = 5,
    Nop = 6,
    Stop = 7,
}

impl CommandKind {
    fn from_bits(bits: u32) -> DmaResult<Self> {
        Ok(match bits {
            0 => Self::OutputMore,
            1 => Self::OutputLast,
            2 => Self::InputMore,
            3 => Self::InputLast,
            4 => Self::StoreQuad,
            5 => Self::LoadQuad,
            6 => Self::Nop,
            7 => Self::Stop,
            other => {
                return Err(DmaError::MalformedDescriptor(format!("command kind {other}")));
            }
        })
    }

    /// True for commands that move sample data
    #[inline]
    pub fn is_data(self) -> bool {
        matches!(
            self,
            Self::OutputMore | Self::OutputLast | Self::InputMore | Self::InputLast
        )
    }
}

/// Condition under which interrupt, branch or wait fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Policy {
    Never = 0,
    IfTrue = 1,
    IfFalse = 2,
    Always = 3,
}

impl Policy {
    fn from_bits(bits: u32) -> Self {
        match bits & 0b11 {
            0 => Self::Never,
            1 => Self::IfTrue,
            2 => Self::IfFalse,
            _ => Self::Always,
        }
    }
}

/// One entry of the transfer program
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferBlock {
    pub kind: CommandKind,
    /// Address space key, 3 bits
    pub key: u8,
    pub interrupt: Policy,
    pub branch: Policy,
    pub wait: Policy,
    /// Byte length of the block
    pub req_count: u16,
    pub address: u32,
    pub branch_target: u32,
}

impl TransferBlock {
    /// Plain data block: no interrupt, no branch
    pub fn data(kind: CommandKind, address: u32, length: u16, next: u32) -> Self {
        Self {
            kind,
            key: 0,
            interrupt: Policy::Never,
            branch: Policy::Never,
            wait: Policy::Never,
            req_count: length,
            address,
            branch_target: next,
        }
    }

    /// Terminating stop command
    pub fn stop() -> Self {
        Self {
            kind: CommandKind::Stop,
            key: 0,
            interrupt: Policy::Never,
            branch: Policy::Never,
            wait: Policy::Never,
            req_count: 0,
            address: 0,
            branch_target: 0,
        }
    }

    #[inline]
    pub fn interrupt_enabled(&self) -> bool {
        self.interrupt != Policy::Never
    }

    /// Packed first descriptor word
    pub fn command_word(&self) -> u32 {
        (self.kind as u32) << 28
            | ((self.key & 0x7) as u32) << 24
            | (self.interrupt as u32) << 20
            | (self.branch as u32) << 18
            | (self.wait as u32) << 16
            | self.req_count as u32
    }

    pub fn encode(&self) -> [u8; DESCRIPTOR_SIZE] {
        let mut out = [0u8; DESCRIPTOR_SIZE];
        out[0..4].copy_from_slice(&self.command_word().to_le_bytes());
        out[4..8].copy_from_slice(&self.address.to_le_bytes());
        out[8..12].copy_from_slice(&self.branch_target.to_le_bytes());
        // status word stays zero until the hardware writes it
        out
    }

    pub fn decode(bytes: &[u8; DESCRIPTOR_SIZE]) -> DmaResult<Self> {
        let word = |i: usize| u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
        let cmd = word(0);
        if cmd & (1 << 27) != 0 || cmd & (0b11 << 22) != 0 {
            return Err(DmaError::MalformedDescriptor(format!(
                "reserved bits set in command word {cmd:#010x}"
            )));
        }
        Ok(Self {
            kind: CommandKind::from_bits(cmd >> 28)?,
            key: ((cmd >> 24) & 0x7) as u8,
            interrupt: Policy::from_bits(cmd >> 20),
            branch: Policy::from_bits(cmd >> 18),
            wait: Policy::from_bits(cmd >> 16),
            req_count: (cmd & 0xFFFF) as u16,
            address: word(4),
            branch_target: word(8),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_word_layout() {
        let mut block = TransferBlock::data(CommandKind::OutputMore, 0x1000, 128, 0x2010);
        block.interrupt = Policy::Always;
        block.branch = Policy::Always;

        // cmd 0, key 0, i=3, b=3, w=0, count 128
        assert_eq!(block.command_word(), 0x003C_0080);

        let bytes = block.encode();
        assert_eq!(&bytes[0..4], &[0x80, 0x00, 0x3C, 0x00]);
        assert_eq!(&bytes[4..8], &0x1000u32.to_le_bytes());
        assert_eq!(&bytes[8..12], &0x2010u32.to_le_bytes());
        assert_eq!(&bytes[12..16], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_stop_word() {
        assert_eq!(TransferBlock::stop().command_word(), 0x7000_0000);
    }

    #[test]
    fn test_decode_encoded() {
        let mut block = TransferBlock::data(CommandKind::InputMore, 0xDEAD_B000, 4096, 0x10);
        block.key = 5;
        block.wait = Policy::IfFalse;
        assert_eq!(TransferBlock::decode(&block.encode()).unwrap(), block);
    }

    #[test]
    fn test_decode_rejects_reserved_bits() {
        let mut bytes = TransferBlock::stop().encode();
        bytes[3] |= 0x08; // bit 27
        assert!(matches!(
            TransferBlock::decode(&bytes),
            Err(DmaError::MalformedDescriptor(_))
        ));
    }
}
