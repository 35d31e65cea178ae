//! Type-reference prefixes of full-format objects

use super::error::{FullFormatError, FullFormatResult};
use crate::cursor::ByteCursor;
use serde::Serialize;

/// Prefix introducing a nested object
pub const TYPE_REF_NESTED: u8 = 0x00;

/// Prefix introducing a validated `{sub_type, type_hash}` reference
pub const TYPE_REF_VALIDATED: u8 = 0x01;

/// Type reference preceding a full-format object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeRef {
    /// Nested object; the inner prefix follows
    Nested(Box<TypeRef>),
    /// Explicit type hash
    Validated {
        /// Sub-type byte
        sub_type: u8,
        /// Type hash
        type_hash: u32,
    },
    /// Reference to an earlier object by id
    BackReference(u8),
}

impl TypeRef {
    /// Read a prefix, following at most `max_depth` nested markers
    pub fn read(cursor: &mut ByteCursor<'_>, max_depth: usize) -> FullFormatResult<Self> {
        let mut nesting = 0usize;
        loop {
            match cursor.read_u8()? {
                TYPE_REF_NESTED => {
                    nesting += 1;
                    if nesting > max_depth {
                        return Err(FullFormatError::RecursionLimit(max_depth));
                    }
                }
                TYPE_REF_VALIDATED => {
                    let sub_type = cursor.read_u8()?;
                    let type_hash = cursor.read_u32_le()?;
                    return Ok(Self::wrap(Self::Validated { sub_type, type_hash }, nesting));
                }
                id => return Ok(Self::wrap(Self::BackReference(id), nesting)),
            }
        }
    }

    fn wrap(mut inner: Self, nesting: usize) -> Self {
        for _ in 0..nesting {
            inner = Self::Nested(Box::new(inner));
        }
        inner
    }

    /// Innermost reference
    pub fn innermost(&self) -> &Self {
        let mut current = self;
        while let Self::Nested(inner) = current {
            current = inner;
        }
        current
    }

    /// Type hash, when the innermost reference carries one
    pub fn type_hash(&self) -> Option<u32> {
        match self.innermost() {
            Self::Validated { type_hash, .. } => Some(*type_hash),
            _ => None,
        }
    }
}
