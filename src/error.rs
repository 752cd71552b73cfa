use thiserror::Error;

use crate::dwarf::constants::Form;

pub type Result<T> = std::result::Result<T, DwarfError>;

/// Failure while decoding DWARF data.
///
/// Truncation and header errors abort the compilation unit being read;
/// everything else only affects the value, DIE or expression at hand.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DwarfError {
    #[error("truncated section: need {needed} bytes at offset {offset:#x}, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("reserved initial length value {0:#010x}")]
    ReservedInitialLength(u32),

    #[error("unknown attribute form {0:#x}")]
    UnknownForm(u64),

    #[error("unknown abbreviation code {0}")]
    UnknownAbbrev(u64),

    #[error("unsupported DWARF version {0}")]
    UnsupportedVersion(u16),

    #[error("unsupported address size {0}")]
    UnsupportedAddressSize(u8),

    #[error("form {form:?} cannot be read as {expected}")]
    FormMismatch { form: Form, expected: &'static str },

    #[error("attribute {0:#x} not present")]
    MissingAttribute(u64),

    #[error("unsupported reference form {0:?}")]
    UnsupportedReference(Form),

    #[error("unsupported expression operation {0:#04x}")]
    UnsupportedOperation(u8),

    #[error("expression stack underflow at operation {0:#04x}")]
    StackUnderflow(u8),

    #[error("division by zero in expression")]
    DivisionByZero,

    #[error("branch to {0} leaves the expression")]
    InvalidBranch(i64),

    #[error("expression exceeded {0} operations")]
    OperationLimit(usize),

    #[error("unterminated string at offset {0:#x}")]
    UnterminatedString(usize),

    #[error("section {0} is not present")]
    MissingSection(&'static str),

    #[error("offset {offset:#x} is outside {section}")]
    InvalidOffset { section: &'static str, offset: u64 },

    #[error("malformed data: {0}")]
    Malformed(&'static str),
}
