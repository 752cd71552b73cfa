use std::collections::BTreeMap;
use std::ops::RangeBounds;

use crate::dwarf::constants::*;
use crate::dwarf::cursor::{ByteOrder, Cursor, Section};
use crate::dwarf::DebugSections;
use crate::error::{DwarfError, Result};
use crate::utils::join_path;

// Line table opcodes
const DW_LNS_COPY: u8 = 0x01;
const DW_LNS_ADVANCE_PC: u8 = 0x02;
const DW_LNS_ADVANCE_LINE: u8 = 0x03;
const DW_LNS_SET_FILE: u8 = 0x04;
const DW_LNS_SET_COLUMN: u8 = 0x05;
const DW_LNS_NEGATE_STMT: u8 = 0x06;
const DW_LNS_SET_BASIC_BLOCK: u8 = 0x07;
const DW_LNS_CONST_ADD_PC: u8 = 0x08;
const DW_LNS_FIXED_ADVANCE_PC: u8 = 0x09;
const DW_LNS_SET_PROLOGUE_END: u8 = 0x0a;
const DW_LNS_SET_EPILOGUE_BEGIN: u8 = 0x0b;
const DW_LNS_SET_ISA: u8 = 0x0c;

const DW_LNE_END_SEQUENCE: u8 = 0x01;
const DW_LNE_SET_ADDRESS: u8 = 0x02;
const DW_LNE_DEFINE_FILE: u8 = 0x03;
const DW_LNE_SET_DISCRIMINATOR: u8 = 0x04;

// Entry content types of DWARF 5 directory and file tables
const DW_LNCT_PATH: u64 = 0x1;
const DW_LNCT_DIRECTORY_INDEX: u64 = 0x2;

/// One emitted row, reduced to what source attribution needs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LineEntry {
    pub address: u64,
    pub file: u64,
    pub line: u64,
    pub column: u64,
}

/// Where the line program of a unit lives and how to name its primary file.
#[derive(Clone, Copy, Debug)]
pub struct LineProgramSource<'s> {
    pub offset: u64,
    pub address_size: u8,
    pub byte_order: ByteOrder,
    pub comp_dir: Option<&'s str>,
    pub comp_name: Option<&'s str>,
}

#[derive(Clone, Debug, Default)]
pub struct LineTable {
    pub version: u16,
    pub include_directories: Vec<String>,
    /// Indexed by the file register. Entry 0 is the unit's primary file.
    pub file_names: Vec<String>,
    entries: BTreeMap<u64, LineEntry>,
}

impl LineTable {
    pub fn parse(sections: &DebugSections<'_>, source: LineProgramSource<'_>) -> Result<Self> {
        let data = sections.line.ok_or(DwarfError::MissingSection(".debug_line"))?;
        let offset = usize::try_from(source.offset).map_err(|_| DwarfError::InvalidOffset {
            section: ".debug_line",
            offset: source.offset,
        })?;
        if offset >= data.len() {
            return Err(DwarfError::InvalidOffset {
                section: ".debug_line",
                offset: source.offset,
            });
        }

        let whole = Section::whole(data, source.byte_order).with_address_size(source.address_size);
        let mut outer = Cursor::at(data, whole, offset);
        let unit = outer.sub_section()?;
        let mut cursor = Cursor::new(data, unit);
        cursor.skip_initial_length()?;

        let version = cursor.read_u16()?;
        if !(2..=5).contains(&version) {
            return Err(DwarfError::UnsupportedVersion(version));
        }
        if version >= 5 {
            let address_size = cursor.read_u8()?;
            let _segment_selector_size = cursor.read_u8()?;
            let section = unit.with_address_size(address_size);
            let position = cursor.position();
            cursor = Cursor::at(data, section, position);
        }

        let header_length = usize::try_from(cursor.offset()?)
            .map_err(|_| DwarfError::Malformed("line program header length"))?;
        cursor.ensure(header_length)?;
        let program_start = cursor.position() + header_length;

        let minimum_instruction_length = cursor.read_u8()?;
        if version >= 4 {
            let _maximum_operations_per_instruction = cursor.read_u8()?;
        }
        let default_is_stmt = cursor.read_u8()? != 0;
        let line_base = cursor.read_i8()?;
        let line_range = cursor.read_u8()?;
        if line_range == 0 {
            return Err(DwarfError::Malformed("line_range of zero"));
        }
        let opcode_base = cursor.read_u8()?;
        let standard_opcode_lengths = cursor
            .read_bytes(opcode_base.saturating_sub(1) as usize)?
            .to_vec();
        let header = ProgramHeader {
            minimum_instruction_length,
            default_is_stmt,
            line_base,
            line_range,
            opcode_base,
            standard_opcode_lengths,
        };

        let comp_dir = source.comp_dir.unwrap_or_default();
        let mut table = LineTable {
            version,
            ..Default::default()
        };

        if version >= 5 {
            let directories = read_entry_table(&mut cursor, sections)?;
            table.include_directories = directories
                .iter()
                .map(|entry| join_path(comp_dir, &entry.path))
                .collect();
            let files = read_entry_table(&mut cursor, sections)?;
            for entry in files {
                let dir = table
                    .include_directories
                    .get(entry.directory as usize)
                    .map(String::as_str)
                    .unwrap_or(comp_dir);
                table.file_names.push(join_path(dir, &entry.path));
            }
        } else {
            loop {
                let dir = cursor.read_str()?;
                if dir.is_empty() {
                    break;
                }
                table.include_directories.push(join_path(comp_dir, &dir));
            }
            let primary = source.comp_name.unwrap_or_default();
            table.file_names.push(join_path(comp_dir, primary));
            loop {
                let name = cursor.read_str()?;
                if name.is_empty() {
                    break;
                }
                let file = read_legacy_file(&mut cursor, &name, &table.include_directories, comp_dir)?;
                table.file_names.push(file);
            }
        }

        cursor.set_position(program_start);
        table.run_program(&mut cursor, &header, comp_dir)?;
        Ok(table)
    }

    pub fn file_name(&self, index: u64) -> Option<&str> {
        self.file_names.get(index as usize).map(String::as_str)
    }

    /// Rows keyed by address. The last row at an address wins and
    /// end-of-sequence rows are not included.
    pub fn entries(&self) -> &BTreeMap<u64, LineEntry> {
        &self.entries
    }

    pub fn entries_in(&self, range: impl RangeBounds<u64>) -> impl Iterator<Item = &LineEntry> {
        self.entries.range(range).map(|(_, entry)| entry)
    }

    fn run_program(
        &mut self,
        cursor: &mut Cursor<'_>,
        header: &ProgramHeader,
        comp_dir: &str,
    ) -> Result<()> {
        let mut registers = LineTableState::new(header.default_is_stmt);

        while !cursor.is_empty() {
            let opcode = cursor.read_u8()?;

            let emitted = if opcode == 0 {
                self.execute_extended_opcode(cursor, &mut registers, comp_dir)?
            } else if opcode < header.opcode_base {
                execute_standard_opcode(cursor, &mut registers, header, opcode)?
            } else {
                let adjusted = opcode - header.opcode_base;
                let address_increment = (adjusted / header.line_range) as u64;
                let line_increment = header.line_base as i64 + (adjusted % header.line_range) as i64;
                registers.advance_address(address_increment, header);
                registers.line = registers.line.wrapping_add(line_increment as u64);
                true
            };

            if emitted {
                if !registers.end_sequence {
                    self.entries.insert(
                        registers.address,
                        LineEntry {
                            address: registers.address,
                            file: registers.file,
                            line: registers.line,
                            column: registers.column,
                        },
                    );
                } else {
                    registers = LineTableState::new(header.default_is_stmt);
                }
            }
        }
        Ok(())
    }

    fn execute_extended_opcode(
        &mut self,
        cursor: &mut Cursor<'_>,
        registers: &mut LineTableState,
        comp_dir: &str,
    ) -> Result<bool> {
        let len = usize::try_from(cursor.read_uleb128()?)
            .map_err(|_| DwarfError::Malformed("extended opcode length"))?;
        cursor.ensure(len)?;
        let end = cursor.position() + len;
        if len == 0 {
            return Ok(false);
        }
        let opcode = cursor.read_u8()?;
        let mut emitted = false;
        match opcode {
            DW_LNE_END_SEQUENCE => {
                registers.end_sequence = true;
                emitted = true;
            }
            DW_LNE_SET_ADDRESS => {
                registers.address = cursor.read_uint(len - 1)?;
            }
            DW_LNE_DEFINE_FILE => {
                let name = cursor.read_str()?;
                let file = read_legacy_file(cursor, &name, &self.include_directories, comp_dir)?;
                self.file_names.push(file);
            }
            DW_LNE_SET_DISCRIMINATOR => {
                cursor.read_uleb128()?;
            }
            _ => {}
        }
        cursor.ensure(end.saturating_sub(cursor.position()))?;
        cursor.set_position(end);
        Ok(emitted)
    }
}

struct ProgramHeader {
    minimum_instruction_length: u8,
    default_is_stmt: bool,
    line_base: i8,
    line_range: u8,
    opcode_base: u8,
    standard_opcode_lengths: Vec<u8>,
}

#[derive(Clone)]
struct LineTableState {
    address: u64,
    file: u64,
    line: u64,
    column: u64,
    is_stmt: bool,
    end_sequence: bool,
}

impl LineTableState {
    fn new(default_is_stmt: bool) -> Self {
        Self {
            address: 0,
            file: 1,
            line: 1,
            column: 0,
            is_stmt: default_is_stmt,
            end_sequence: false,
        }
    }

    fn advance_address(&mut self, operation_advance: u64, header: &ProgramHeader) {
        let delta = operation_advance.wrapping_mul(header.minimum_instruction_length as u64);
        self.address = self.address.wrapping_add(delta);
    }
}

fn execute_standard_opcode(
    cursor: &mut Cursor<'_>,
    registers: &mut LineTableState,
    header: &ProgramHeader,
    opcode: u8,
) -> Result<bool> {
    match opcode {
        DW_LNS_COPY => return Ok(true),
        DW_LNS_ADVANCE_PC => {
            let advance = cursor.read_uleb128()?;
            registers.advance_address(advance, header);
        }
        DW_LNS_ADVANCE_LINE => {
            let advance = cursor.read_sleb128()?;
            registers.line = registers.line.wrapping_add(advance as u64);
        }
        DW_LNS_SET_FILE => {
            registers.file = cursor.read_uleb128()?;
        }
        DW_LNS_SET_COLUMN => {
            registers.column = cursor.read_uleb128()?;
        }
        DW_LNS_NEGATE_STMT => {
            registers.is_stmt = !registers.is_stmt;
        }
        DW_LNS_SET_BASIC_BLOCK | DW_LNS_SET_PROLOGUE_END | DW_LNS_SET_EPILOGUE_BEGIN => {}
        DW_LNS_CONST_ADD_PC => {
            let adjust = ((255 - header.opcode_base) / header.line_range) as u64;
            registers.advance_address(adjust, header);
        }
        DW_LNS_FIXED_ADVANCE_PC => {
            let advance = cursor.read_u16()? as u64;
            registers.address = registers.address.wrapping_add(advance);
        }
        DW_LNS_SET_ISA => {
            cursor.read_uleb128()?;
        }
        _ => {
            // Unknown standard opcode: skip its declared ULEB128 operands.
            let operands = header
                .standard_opcode_lengths
                .get(opcode as usize - 1)
                .copied()
                .unwrap_or(0);
            for _ in 0..operands {
                cursor.read_uleb128()?;
            }
        }
    }
    Ok(false)
}

fn read_legacy_file(
    cursor: &mut Cursor<'_>,
    name: &str,
    include_directories: &[String],
    comp_dir: &str,
) -> Result<String> {
    let dir_index = cursor.read_uleb128()? as usize;
    let _modification_time = cursor.read_uleb128()?;
    let _file_length = cursor.read_uleb128()?;

    let dir = match dir_index {
        0 => comp_dir,
        n => include_directories
            .get(n - 1)
            .map(String::as_str)
            .unwrap_or(comp_dir),
    };
    Ok(join_path(dir, name))
}

#[derive(Default)]
struct EntryRecord {
    path: String,
    directory: u64,
}

fn read_entry_table(cursor: &mut Cursor<'_>, sections: &DebugSections<'_>) -> Result<Vec<EntryRecord>> {
    let format_count = cursor.read_u8()?;
    let mut formats = Vec::with_capacity(format_count as usize);
    for _ in 0..format_count {
        let content_type = cursor.read_uleb128()?;
        let form = Form::from_raw(cursor.read_uleb128()?);
        formats.push((content_type, form));
    }

    let count = cursor.read_uleb128()?;
    let mut records = Vec::new();
    for _ in 0..count {
        let mut record = EntryRecord::default();
        for &(content_type, form) in &formats {
            match content_type {
                DW_LNCT_PATH => record.path = read_entry_string(cursor, form, sections)?,
                DW_LNCT_DIRECTORY_INDEX => record.directory = read_entry_number(cursor, form)?,
                _ => cursor.skip_form(form, 5)?,
            }
        }
        records.push(record);
    }
    Ok(records)
}

fn read_entry_string(cursor: &mut Cursor<'_>, form: Form, sections: &DebugSections<'_>) -> Result<String> {
    let (data, name) = match form {
        Form::String => return Ok(cursor.read_str()?.into_owned()),
        Form::LineStrp => (sections.line_str, ".debug_line_str"),
        Form::Strp => (sections.str, ".debug_str"),
        other => {
            return Err(DwarfError::FormMismatch {
                form: other,
                expected: "string",
            })
        }
    };
    let offset = cursor.offset()?;
    let data = data.ok_or(DwarfError::MissingSection(name))?;
    read_string_at(data, name, offset, cursor.section().byte_order)
}

fn read_entry_number(cursor: &mut Cursor<'_>, form: Form) -> Result<u64> {
    match form {
        Form::Data1 => Ok(cursor.read_u8()? as u64),
        Form::Data2 => Ok(cursor.read_u16()? as u64),
        Form::Data4 => Ok(cursor.read_u32()? as u64),
        Form::Data8 => cursor.read_u64(),
        Form::Udata => cursor.read_uleb128(),
        other => Err(DwarfError::FormMismatch {
            form: other,
            expected: "constant",
        }),
    }
}

/// Reads the null-terminated string at `offset` of a string section.
pub(crate) fn read_string_at(
    data: &[u8],
    section: &'static str,
    offset: u64,
    byte_order: ByteOrder,
) -> Result<String> {
    let start = usize::try_from(offset)
        .ok()
        .filter(|&start| start < data.len())
        .ok_or(DwarfError::InvalidOffset { section, offset })?;
    let mut cursor = Cursor::at(data, Section::whole(data, byte_order), start);
    Ok(cursor.read_str()?.into_owned())
}
