use std::borrow::Cow;

use crate::dwarf::constants::Form;
use crate::error::{DwarfError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Dwarf32,
    Dwarf64,
}

impl Format {
    pub fn offset_size(self) -> usize {
        match self {
            Format::Dwarf32 => 4,
            Format::Dwarf64 => 8,
        }
    }

    /// Size of the initial length field, escape included.
    pub fn initial_length_size(self) -> usize {
        match self {
            Format::Dwarf32 => 4,
            Format::Dwarf64 => 12,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

/// A `[begin, end)` byte range of a host buffer and the encoding used inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Section {
    pub begin: usize,
    pub end: usize,
    pub format: Format,
    pub byte_order: ByteOrder,
    pub address_size: u8,
}

impl Section {
    pub fn new(begin: usize, end: usize, byte_order: ByteOrder) -> Self {
        Self {
            begin,
            end,
            format: Format::Dwarf32,
            byte_order,
            address_size: 8,
        }
    }

    pub fn whole(data: &[u8], byte_order: ByteOrder) -> Self {
        Self::new(0, data.len(), byte_order)
    }

    pub fn with_address_size(mut self, address_size: u8) -> Self {
        self.address_size = address_size;
        self
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.begin)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, offset: usize) -> bool {
        self.begin <= offset && offset < self.end
    }
}

/// Bounds-checked reader bound to one [`Section`].
///
/// Positions are absolute offsets into the host buffer. Every read checks that
/// enough bytes remain before `section.end` and fails with
/// [`DwarfError::Truncated`] otherwise.
#[derive(Clone, Copy)]
pub struct Cursor<'a> {
    data: &'a [u8],
    section: Section,
    limit: usize,
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(data: &'a [u8], section: Section) -> Self {
        Self::at(data, section, section.begin)
    }

    pub fn at(data: &'a [u8], section: Section, pos: usize) -> Self {
        Self {
            data,
            section,
            limit: section.end.min(data.len()),
            pos,
        }
    }

    pub fn section(&self) -> Section {
        self.section
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub fn remaining(&self) -> usize {
        self.limit.saturating_sub(self.pos)
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn ensure(&self, needed: usize) -> Result<()> {
        let available = self.remaining();
        if self.pos > self.limit || available < needed {
            return Err(DwarfError::Truncated {
                offset: self.pos,
                needed,
                available,
            });
        }
        Ok(())
    }

    pub fn skip(&mut self, amount: usize) -> Result<()> {
        self.ensure(amount)?;
        self.pos += amount;
        Ok(())
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.ensure(n)?;
        let start = self.pos;
        self.pos += n;
        Ok(&self.data[start..self.pos])
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut bytes = [0u8; N];
        bytes.copy_from_slice(self.read_bytes(N)?);
        Ok(bytes)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let bytes = self.read_array()?;
        Ok(match self.section.byte_order {
            ByteOrder::Little => u16::from_le_bytes(bytes),
            ByteOrder::Big => u16::from_be_bytes(bytes),
        })
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(self.read_u16()? as i16)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.read_array()?;
        Ok(match self.section.byte_order {
            ByteOrder::Little => u32::from_le_bytes(bytes),
            ByteOrder::Big => u32::from_be_bytes(bytes),
        })
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(self.read_u32()? as i32)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let bytes = self.read_array()?;
        Ok(match self.section.byte_order {
            ByteOrder::Little => u64::from_le_bytes(bytes),
            ByteOrder::Big => u64::from_be_bytes(bytes),
        })
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(self.read_u64()? as i64)
    }

    /// Reads an unsigned integer of 1 to 8 bytes in section byte order.
    pub fn read_uint(&mut self, size: usize) -> Result<u64> {
        if size == 0 || size > 8 {
            return Err(DwarfError::Malformed("integer width must be 1 to 8 bytes"));
        }
        let bytes = self.read_bytes(size)?;
        let value = match self.section.byte_order {
            ByteOrder::Little => bytes
                .iter()
                .rev()
                .fold(0u64, |acc, &b| (acc << 8) | b as u64),
            ByteOrder::Big => bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64),
        };
        Ok(value)
    }

    pub fn offset(&mut self) -> Result<u64> {
        self.read_uint(self.section.format.offset_size())
    }

    pub fn address(&mut self) -> Result<u64> {
        match self.section.address_size {
            size @ (1 | 2 | 4 | 8) => self.read_uint(size as usize),
            other => Err(DwarfError::UnsupportedAddressSize(other)),
        }
    }

    pub fn read_uleb128(&mut self) -> Result<u64> {
        let mut result = 0u64;
        let mut shift = 0u32;
        loop {
            let byte = self.read_u8()?;
            if shift < 64 {
                result |= ((byte & 0x7f) as u64) << shift;
            }
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
        }
        Ok(result)
    }

    pub fn read_sleb128(&mut self) -> Result<i64> {
        let mut result = 0i64;
        let mut shift = 0u32;
        let mut byte;

        loop {
            byte = self.read_u8()?;
            if shift < 64 {
                result |= ((byte & 0x7f) as i64) << shift;
            }
            shift += 7;
            if byte & 0x80 == 0 {
                break;
            }
        }

        if shift < 64 && (byte & 0x40) != 0 {
            result |= (!0i64) << shift;
        }

        Ok(result)
    }

    /// Null-terminated bytes, terminator consumed but not returned.
    pub fn read_cstr(&mut self) -> Result<&'a [u8]> {
        let start = self.pos;
        let window = self
            .data
            .get(start..self.limit)
            .ok_or(DwarfError::UnterminatedString(start))?;
        let len = window
            .iter()
            .position(|&b| b == 0)
            .ok_or(DwarfError::UnterminatedString(start))?;
        self.pos = start + len + 1;
        Ok(&window[..len])
    }

    pub fn read_str(&mut self) -> Result<Cow<'a, str>> {
        Ok(String::from_utf8_lossy(self.read_cstr()?))
    }

    pub fn skip_initial_length(&mut self) -> Result<()> {
        self.skip(self.section.format.initial_length_size())
    }

    /// Reads an initial length at the current position and carves out the unit it
    /// describes. The cursor ends up just past that unit; the returned section
    /// starts at the length field itself.
    pub fn sub_section(&mut self) -> Result<Section> {
        let begin = self.pos;
        let length = self.read_u32()?;
        let (format, total) = if length < 0xffff_fff0 {
            (Format::Dwarf32, length as u64 + 4)
        } else if length == 0xffff_ffff {
            let length = self.read_u64()?;
            (Format::Dwarf64, length.saturating_add(12))
        } else {
            return Err(DwarfError::ReservedInitialLength(length));
        };

        self.pos = begin;
        self.ensure(usize::try_from(total).unwrap_or(usize::MAX))?;
        let end = begin + total as usize;
        self.pos = end;

        Ok(Section {
            begin,
            end,
            format,
            byte_order: self.section.byte_order,
            address_size: self.section.address_size,
        })
    }

    /// Advances past one attribute value without decoding it.
    ///
    /// `version` is the owning unit's version; it decides the width of
    /// `ref_addr`, which was address sized in DWARF 2.
    pub fn skip_form(&mut self, form: Form, version: u16) -> Result<()> {
        let mut form = form;
        loop {
            match form {
                Form::FlagPresent | Form::ImplicitConst => {}
                Form::Addr => {
                    let size = self.section.address_size;
                    if !matches!(size, 1 | 2 | 4 | 8) {
                        return Err(DwarfError::UnsupportedAddressSize(size));
                    }
                    self.skip(size as usize)?;
                }
                Form::Data1 | Form::Ref1 | Form::Flag | Form::Strx1 | Form::Addrx1 => {
                    self.skip(1)?;
                }
                Form::Data2 | Form::Ref2 | Form::Strx2 | Form::Addrx2 => {
                    self.skip(2)?;
                }
                Form::Strx3 | Form::Addrx3 => {
                    self.skip(3)?;
                }
                Form::Data4 | Form::Ref4 | Form::RefSup4 | Form::Strx4 | Form::Addrx4 => {
                    self.skip(4)?;
                }
                Form::Data8 | Form::Ref8 | Form::RefSig8 | Form::RefSup8 => {
                    self.skip(8)?;
                }
                Form::Data16 => {
                    self.skip(16)?;
                }
                Form::Strp | Form::LineStrp | Form::StrpSup | Form::SecOffset => {
                    self.skip(self.section.format.offset_size())?;
                }
                Form::RefAddr => {
                    let size = if version <= 2 {
                        self.section.address_size as usize
                    } else {
                        self.section.format.offset_size()
                    };
                    self.skip(size)?;
                }
                Form::Sdata => {
                    self.read_sleb128()?;
                }
                Form::Udata
                | Form::RefUdata
                | Form::Strx
                | Form::Addrx
                | Form::Loclistx
                | Form::Rnglistx => {
                    self.read_uleb128()?;
                }
                Form::Block1 => {
                    let size = self.read_u8()? as usize;
                    self.skip(size)?;
                }
                Form::Block2 => {
                    let size = self.read_u16()? as usize;
                    self.skip(size)?;
                }
                Form::Block4 => {
                    let size = self.read_u32()? as usize;
                    self.skip(size)?;
                }
                Form::Block | Form::Exprloc => {
                    let size = self.read_uleb128()? as usize;
                    self.skip(size)?;
                }
                Form::String => {
                    self.read_cstr()?;
                }
                Form::Indirect => {
                    form = Form::from_raw(self.read_uleb128()?);
                    continue;
                }
                Form::Unknown(raw) => return Err(DwarfError::UnknownForm(raw)),
            }
            return Ok(());
        }
    }
}
