use crate::dwarf::abbrev::AttributeSpec;
use crate::dwarf::constants::{DwarfAttr, Form, ValueKind};
use crate::dwarf::cursor::Cursor;
use crate::dwarf::expr::Expression;
use crate::dwarf::line::read_string_at;
use crate::dwarf::unit::CompilationUnit;
use crate::dwarf::{DieRef, Dwarf};
use crate::error::{DwarfError, Result};

/// Typed view over one encoded attribute. Nothing is decoded until an
/// accessor runs, and each accessor rejects forms it cannot interpret.
#[derive(Clone, Copy)]
pub struct Value<'u, 'a> {
    unit: &'u CompilationUnit<'a>,
    name: DwarfAttr,
    form: Form,
    offset: usize,
    implicit_const: Option<i64>,
}

impl<'u, 'a> Value<'u, 'a> {
    /// Follows any chain of `DW_FORM_indirect` to the real form.
    pub(crate) fn new(unit: &'u CompilationUnit<'a>, spec: &AttributeSpec, offset: usize) -> Result<Self> {
        let mut form = spec.form;
        let mut offset = offset;
        while form == Form::Indirect {
            let mut cursor = unit.cursor_at(offset);
            form = Form::from_raw(cursor.read_uleb128()?);
            offset = cursor.position();
        }
        Ok(Self {
            unit,
            name: spec.name,
            form,
            offset,
            implicit_const: spec.implicit_const,
        })
    }

    pub fn name(&self) -> DwarfAttr {
        self.name
    }

    pub fn form(&self) -> Form {
        self.form
    }

    pub fn kind(&self) -> ValueKind {
        self.form.value_kind()
    }

    fn cursor(&self) -> Cursor<'a> {
        self.unit.cursor_at(self.offset)
    }

    fn mismatch(&self, expected: &'static str) -> DwarfError {
        DwarfError::FormMismatch {
            form: self.form,
            expected,
        }
    }

    fn implicit(&self) -> Result<i64> {
        self.implicit_const
            .ok_or(DwarfError::Malformed("implicit_const without a stored value"))
    }

    pub fn as_address(&self) -> Result<u64> {
        match self.form {
            Form::Addr => self.cursor().address(),
            _ => Err(self.mismatch("address")),
        }
    }

    pub fn as_uconstant(&self) -> Result<u64> {
        let mut cursor = self.cursor();
        match self.form {
            Form::Data1 => Ok(cursor.read_u8()? as u64),
            Form::Data2 => Ok(cursor.read_u16()? as u64),
            Form::Data4 => Ok(cursor.read_u32()? as u64),
            Form::Data8 => cursor.read_u64(),
            Form::Udata => cursor.read_uleb128(),
            Form::ImplicitConst => Ok(self.implicit()? as u64),
            _ => Err(self.mismatch("unsigned constant")),
        }
    }

    pub fn as_sconstant(&self) -> Result<i64> {
        let mut cursor = self.cursor();
        match self.form {
            Form::Data1 => Ok(cursor.read_i8()? as i64),
            Form::Data2 => Ok(cursor.read_i16()? as i64),
            Form::Data4 => Ok(cursor.read_i32()? as i64),
            Form::Data8 => cursor.read_i64(),
            Form::Sdata => cursor.read_sleb128(),
            Form::ImplicitConst => self.implicit(),
            _ => Err(self.mismatch("signed constant")),
        }
    }

    pub fn as_sec_offset(&self) -> Result<u64> {
        let mut cursor = self.cursor();
        match self.form {
            Form::Data4 => Ok(cursor.read_u32()? as u64),
            Form::Data8 => cursor.read_u64(),
            Form::SecOffset => cursor.offset(),
            _ => Err(self.mismatch("section offset")),
        }
    }

    pub fn as_flag(&self) -> Result<bool> {
        match self.form {
            Form::Flag => Ok(self.cursor().read_u8()? != 0),
            Form::FlagPresent => Ok(true),
            _ => Err(self.mismatch("flag")),
        }
    }

    pub fn as_block(&self) -> Result<&'a [u8]> {
        let mut cursor = self.cursor();
        let size = match self.form {
            Form::Block1 => cursor.read_u8()? as usize,
            Form::Block2 => cursor.read_u16()? as usize,
            Form::Block4 => cursor.read_u32()? as usize,
            Form::Block | Form::Exprloc => cursor.read_uleb128()? as usize,
            _ => return Err(self.mismatch("block")),
        };
        cursor.read_bytes(size)
    }

    pub fn as_expression(&self) -> Result<Expression<'a>> {
        let bytes = self.as_block().map_err(|err| match err {
            DwarfError::FormMismatch { .. } => self.mismatch("expression"),
            other => other,
        })?;
        let section = self.unit.section();
        Ok(Expression::new(
            bytes,
            section.byte_order,
            section.address_size,
            section.format,
        ))
    }

    pub fn as_string(&self) -> Result<String> {
        let sections = self.unit.sections();
        let byte_order = self.unit.section().byte_order;
        match self.form {
            Form::String => Ok(self.cursor().read_str()?.into_owned()),
            Form::Strp => {
                let offset = self.cursor().offset()?;
                let data = sections.str.ok_or(DwarfError::MissingSection(".debug_str"))?;
                read_string_at(data, ".debug_str", offset, byte_order)
            }
            Form::LineStrp => {
                let offset = self.cursor().offset()?;
                let data = sections
                    .line_str
                    .ok_or(DwarfError::MissingSection(".debug_line_str"))?;
                read_string_at(data, ".debug_line_str", offset, byte_order)
            }
            _ => Err(self.mismatch("inline or offset string")),
        }
    }

    /// Resolves a unit-relative reference to a `.debug_info` offset.
    pub fn as_local_reference(&self) -> Result<usize> {
        let mut cursor = self.cursor();
        let relative = match self.form {
            Form::Ref1 => cursor.read_u8()? as u64,
            Form::Ref2 => cursor.read_u16()? as u64,
            Form::Ref4 => cursor.read_u32()? as u64,
            Form::Ref8 => cursor.read_u64()?,
            Form::RefUdata => cursor.read_uleb128()?,
            other => return Err(DwarfError::UnsupportedReference(other)),
        };
        let target = (self.unit.offset() as u64).wrapping_add(relative);
        let target = usize::try_from(target)
            .ok()
            .filter(|&target| self.unit.contains_offset(target))
            .ok_or(DwarfError::InvalidOffset {
                section: ".debug_info",
                offset: target,
            })?;
        Ok(target)
    }

    /// Resolves any supported reference form, including `ref_addr` into
    /// another unit.
    pub fn as_reference(&self, dwarf: &Dwarf<'_>) -> Result<DieRef> {
        match self.form {
            Form::RefAddr => {
                let section = self.unit.section();
                let size = if self.unit.version() <= 2 {
                    section.address_size as usize
                } else {
                    section.format.offset_size()
                };
                let target = self.cursor().read_uint(size)?;
                let unit = usize::try_from(target)
                    .ok()
                    .and_then(|offset| dwarf.unit_containing(offset))
                    .ok_or(DwarfError::InvalidOffset {
                        section: ".debug_info",
                        offset: target,
                    })?;
                Ok(DieRef {
                    unit: unit.index(),
                    offset: target as usize,
                })
            }
            _ => Ok(DieRef {
                unit: self.unit.index(),
                offset: self.as_local_reference()?,
            }),
        }
    }
}
