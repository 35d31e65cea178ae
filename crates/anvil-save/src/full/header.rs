//! Full-format block header
//!
//! ```text
//! 0x00  u32      magic
//! 0x04  [u8;28]  reserved
//! 0x20  u32      compressed size
//! 0x24  u32      decompressed size
//! 0x28  u32      adler32 of the stored payload
//! 0x2C  payload
//! ```

use super::error::{FullFormatError, FullFormatResult};
use binrw::BinRead;
use binrw::io::Cursor;
use serde::Serialize;

/// Size of the full-format header
pub const FULL_HEADER_SIZE: usize = 44;

/// Full-format block header
#[derive(BinRead, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[br(little)]
pub struct FullFormatHeader {
    /// Block magic
    pub magic: u32,
    /// Unused by the decoder
    #[serde(skip)]
    pub reserved: [u8; 28],
    /// Stored payload size
    pub compressed_size: u32,
    /// Payload size after decompression
    pub decompressed_size: u32,
    /// Adler-32 of the stored payload
    pub checksum: u32,
}

impl FullFormatHeader {
    /// Read the header and check the magic
    pub fn parse(data: &[u8], magic: u32) -> FullFormatResult<Self> {
        if data.len() < FULL_HEADER_SIZE {
            return Err(FullFormatError::HeaderTruncated(data.len()));
        }
        let header = Self::read(&mut Cursor::new(&data[..FULL_HEADER_SIZE]))?;
        if header.magic != magic {
            return Err(FullFormatError::BadMagic {
                expected: magic,
                found: header.magic,
            });
        }
        Ok(header)
    }

    /// Whether the payload needs decompressing
    pub fn is_compressed(&self) -> bool {
        self.compressed_size != self.decompressed_size
    }

    /// Stored payload following the header
    pub fn payload<'a>(&self, data: &'a [u8]) -> FullFormatResult<&'a [u8]> {
        let actual = data.len().saturating_sub(FULL_HEADER_SIZE);
        let declared = self.compressed_size as usize;
        if declared > actual {
            return Err(FullFormatError::PayloadSize { declared, actual });
        }
        Ok(&data[FULL_HEADER_SIZE..FULL_HEADER_SIZE + declared])
    }

    /// Check the stored checksum against `payload`
    pub fn verify_checksum(&self, payload: &[u8]) -> bool {
        adler::adler32_slice(payload) == self.checksum
    }
}
