//! Outer save container
//!
//! ```text
//! u8   signature   0x16
//! u32  magic       0x00FEDBAC
//! u32  block count (low 14 bits)
//! { u32 size, u8[size] data } * count
//! ```

use crate::error::FramingError;
use binrw::BinRead;
use binrw::io::Cursor;
use tracing::trace;

/// First byte of every save file
pub const FILE_SIGNATURE: u8 = 0x16;

/// Magic following the signature
pub const FILE_MAGIC: u32 = 0x00FE_DBAC;

/// Size of the outer header
pub const FILE_HEADER_SIZE: usize = 9;

/// Bits of the count word holding the block count
pub const BLOCK_COUNT_MASK: u32 = 0x3FFF;

/// Outer file header
#[derive(BinRead, Debug, Clone, Copy, PartialEq, Eq)]
#[br(little)]
pub struct FileHeader {
    /// Signature byte
    pub signature: u8,
    /// Magic
    pub magic: u32,
    /// Block count word; only the low 14 bits are the count
    pub block_count_word: u32,
}

impl FileHeader {
    /// Read and validate the header
    pub fn parse(file: &[u8]) -> Result<Self, FramingError> {
        if file.len() < FILE_HEADER_SIZE {
            return Err(FramingError::HeaderTruncated(file.len()));
        }
        let header = Self::read(&mut Cursor::new(&file[..FILE_HEADER_SIZE]))?;
        if header.signature != FILE_SIGNATURE || header.magic != FILE_MAGIC {
            return Err(FramingError::InvalidMagic {
                signature: header.signature,
                magic: header.magic,
            });
        }
        Ok(header)
    }

    /// Number of blocks
    pub fn block_count(&self) -> usize {
        (self.block_count_word & BLOCK_COUNT_MASK) as usize
    }
}

/// One block's bytes as located by the block table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawBlock<'a> {
    /// Block index
    pub index: usize,
    /// Offset of the block data within the file
    pub offset: usize,
    /// Block data
    pub data: &'a [u8],
}

/// Located blocks of a save file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockTable<'a> {
    /// Outer header
    pub header: FileHeader,
    /// Blocks in file order
    pub blocks: Vec<RawBlock<'a>>,
    /// Bytes after the last block
    pub trailing: usize,
}

impl<'a> BlockTable<'a> {
    /// Locate every block of a save file
    pub fn parse(file: &'a [u8]) -> Result<Self, FramingError> {
        let header = FileHeader::parse(file)?;
        let count = header.block_count();
        let mut blocks = Vec::with_capacity(count.min(file.len() / 4));
        let mut pos = FILE_HEADER_SIZE;

        for index in 0..count {
            let size_bytes = file
                .get(pos..pos + 4)
                .ok_or(FramingError::TruncatedBlockTable { index, offset: pos })?;
            let size = u32::from_le_bytes([size_bytes[0], size_bytes[1], size_bytes[2], size_bytes[3]])
                as usize;
            let offset = pos + 4;
            let available = file.len() - offset;
            if size > available {
                return Err(FramingError::BlockOverrun {
                    index,
                    offset,
                    size,
                    available,
                });
            }

            trace!("Block {} at offset {}: {} bytes", index, offset, size);
            blocks.push(RawBlock {
                index,
                offset,
                data: &file[offset..offset + size],
            });
            pos = offset + size;
        }

        Ok(Self {
            header,
            blocks,
            trailing: file.len() - pos,
        })
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_utils::save_file;

    #[test]
    fn test_parse_blocks() {
        let file = save_file(&[vec![1, 2, 3], Vec::new(), vec![4]]);
        let table = BlockTable::parse(&file).unwrap();

        assert_eq!(table.blocks.len(), 3);
        assert_eq!(table.blocks[0].offset, 13);
        assert_eq!(table.blocks[0].data, &[1, 2, 3]);
        assert!(table.blocks[1].data.is_empty());
        assert_eq!(table.blocks[2].data, &[4]);
        assert_eq!(table.trailing, 0);
    }

    #[test]
    fn test_count_word_is_masked() {
        let mut file = save_file(&[vec![9]]);
        file[5..9].copy_from_slice(&(0xC000_0001u32).to_le_bytes());
        let table = BlockTable::parse(&file).unwrap();
        assert_eq!(table.header.block_count(), 1);
        assert_eq!(table.blocks.len(), 1);
    }

    #[test]
    fn test_trailing_bytes_counted() {
        let mut file = save_file(&[vec![1]]);
        file.extend_from_slice(&[0xAA, 0xBB]);
        assert_eq!(BlockTable::parse(&file).unwrap().trailing, 2);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut file = save_file(&[]);
        file[0] = 0x17;
        assert!(matches!(
            BlockTable::parse(&file),
            Err(FramingError::InvalidMagic {
                signature: 0x17,
                ..
            })
        ));

        let mut file = save_file(&[]);
        file[1] = 0x00;
        assert!(matches!(
            BlockTable::parse(&file),
            Err(FramingError::InvalidMagic { .. })
        ));
        assert!(matches!(
            BlockTable::parse(&file[..4]),
            Err(FramingError::HeaderTruncated(4))
        ));
    }

    #[test]
    fn test_block_overrun_rejected() {
        let mut file = save_file(&[vec![1, 2, 3, 4]]);
        file.truncate(file.len() - 1);
        assert!(matches!(
            BlockTable::parse(&file),
            Err(FramingError::BlockOverrun {
                index: 0,
                size: 4,
                available: 3,
                ..
            })
        ));

        let mut file = save_file(&[vec![1]]);
        file[5] = 2;
        assert!(matches!(
            BlockTable::parse(&file),
            Err(FramingError::TruncatedBlockTable { index: 1, .. })
        ));
    }
}
