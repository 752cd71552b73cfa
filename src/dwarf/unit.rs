use std::cell::{Cell, OnceCell};

use log::{debug, warn};

use crate::dwarf::abbrev::AbbreviationTable;
use crate::dwarf::constants::*;
use crate::dwarf::cursor::{Cursor, Format, Section};
use crate::dwarf::die::{Die, ReadMode};
use crate::dwarf::line::{LineProgramSource, LineTable};
use crate::dwarf::DebugSections;
use crate::error::{DwarfError, Result};

/// One unit of `.debug_info` and the state derived from it.
///
/// The header is decoded eagerly. The abbreviation table, root DIE, line table
/// and DIE list are each built on first use and never change afterwards.
pub struct CompilationUnit<'a> {
    index: usize,
    sections: DebugSections<'a>,
    info: &'a [u8],
    section: Section,
    version: u16,
    unit_type: u8,
    abbrev_offset: u64,
    first_die: usize,

    abbrevs: OnceCell<AbbreviationTable>,
    root: OnceCell<Die>,
    line_table: OnceCell<Option<LineTable>>,
    dies: OnceCell<Vec<Die>>,
    pc_bounds: OnceCell<Option<(u64, u64)>>,
    base_address: OnceCell<u64>,
    dies_read: Cell<usize>,
}

impl<'a> CompilationUnit<'a> {
    /// Decodes the unit header found at `section.begin` of `.debug_info`.
    pub(crate) fn parse(
        index: usize,
        sections: DebugSections<'a>,
        info: &'a [u8],
        section: Section,
    ) -> Result<Self> {
        let mut cursor = Cursor::new(info, section);
        cursor.skip_initial_length()?;

        let version = cursor.read_u16()?;
        if !(2..=5).contains(&version) {
            return Err(DwarfError::UnsupportedVersion(version));
        }

        let (unit_type, abbrev_offset, address_size) = if version >= 5 {
            let unit_type = cursor.read_u8()?;
            let address_size = cursor.read_u8()?;
            let abbrev_offset = cursor.offset()?;
            match unit_type {
                DW_UT_SKELETON | DW_UT_SPLIT_COMPILE => cursor.skip(8)?,
                DW_UT_TYPE | DW_UT_SPLIT_TYPE => {
                    cursor.skip(8)?;
                    cursor.offset()?;
                }
                _ => {}
            }
            (unit_type, abbrev_offset, address_size)
        } else {
            let abbrev_offset = cursor.offset()?;
            let address_size = cursor.read_u8()?;
            (0, abbrev_offset, address_size)
        };

        if !matches!(address_size, 1 | 2 | 4 | 8) {
            return Err(DwarfError::UnsupportedAddressSize(address_size));
        }

        Ok(Self {
            index,
            sections,
            info,
            section: section.with_address_size(address_size),
            version,
            unit_type,
            abbrev_offset,
            first_die: cursor.position(),
            abbrevs: OnceCell::new(),
            root: OnceCell::new(),
            line_table: OnceCell::new(),
            dies: OnceCell::new(),
            pc_bounds: OnceCell::new(),
            base_address: OnceCell::new(),
            dies_read: Cell::new(0),
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Offset of the unit's initial length field in `.debug_info`.
    pub fn offset(&self) -> usize {
        self.section.begin
    }

    pub fn section(&self) -> Section {
        self.section
    }

    pub fn format(&self) -> Format {
        self.section.format
    }

    pub fn version(&self) -> u16 {
        self.version
    }

    pub fn unit_type(&self) -> u8 {
        self.unit_type
    }

    pub fn address_size(&self) -> u8 {
        self.section.address_size
    }

    pub fn abbrev_offset(&self) -> u64 {
        self.abbrev_offset
    }

    pub fn root_offset(&self) -> usize {
        self.first_die
    }

    pub(crate) fn data(&self) -> &'a [u8] {
        self.info
    }

    pub(crate) fn sections(&self) -> &DebugSections<'a> {
        &self.sections
    }

    pub(crate) fn cursor_at(&self, offset: usize) -> Cursor<'a> {
        Cursor::at(self.info, self.section, offset)
    }

    /// True when `offset` can hold a DIE of this unit.
    pub fn contains_offset(&self, offset: usize) -> bool {
        offset >= self.first_die && offset < self.section.end
    }

    /// Number of DIE decodes performed so far, full and fast alike.
    pub fn dies_read(&self) -> usize {
        self.dies_read.get()
    }

    pub(crate) fn record_read(&self) {
        self.dies_read.set(self.dies_read.get() + 1);
    }

    pub fn abbreviations(&self) -> Result<&AbbreviationTable> {
        if let Some(table) = self.abbrevs.get() {
            return Ok(table);
        }
        let data = self
            .sections
            .abbrev
            .ok_or(DwarfError::MissingSection(".debug_abbrev"))?;
        let start = usize::try_from(self.abbrev_offset)
            .ok()
            .filter(|&start| start < data.len())
            .ok_or(DwarfError::InvalidOffset {
                section: ".debug_abbrev",
                offset: self.abbrev_offset,
            })?;
        let section = Section::whole(data, self.section.byte_order);
        let table = AbbreviationTable::parse(&mut Cursor::at(data, section, start))?;
        Ok(self.abbrevs.get_or_init(|| table))
    }

    pub fn root(&self) -> Result<&Die> {
        if let Some(root) = self.root.get() {
            return Ok(root);
        }
        let root = Die::read(self, self.first_die, ReadMode::Full)?;
        Ok(self.root.get_or_init(|| root))
    }

    pub fn read_die(&self, offset: usize, mode: ReadMode) -> Result<Die> {
        Die::read(self, offset, mode)
    }

    /// The unit's line table, or `None` when it has none or it cannot be decoded.
    pub fn line_table(&self) -> Option<&LineTable> {
        self.line_table
            .get_or_init(|| match self.load_line_table() {
                Ok(table) => table,
                Err(err) => {
                    warn!(
                        "unit at {:#x}: line table unavailable: {err}",
                        self.offset()
                    );
                    None
                }
            })
            .as_ref()
    }

    fn load_line_table(&self) -> Result<Option<LineTable>> {
        // Fast read: resolving the root in full may itself need the line table.
        let root = Die::read(self, self.first_die, ReadMode::Fast)?;
        if !root.has(DW_AT_STMT_LIST) {
            return Ok(None);
        }
        if self.sections.line.is_none() {
            debug!("unit at {:#x}: no .debug_line section", self.offset());
            return Ok(None);
        }

        let offset = root.attribute(self, DW_AT_STMT_LIST)?.as_sec_offset()?;
        let comp_dir = root.string_attribute(self, DW_AT_COMP_DIR);
        let comp_name = root.string_attribute(self, DW_AT_NAME);

        let table = LineTable::parse(
            &self.sections,
            LineProgramSource {
                offset,
                address_size: self.address_size(),
                byte_order: self.section.byte_order,
                comp_dir: comp_dir.as_deref(),
                comp_name: comp_name.as_deref(),
            },
        )?;
        debug!(
            "unit at {:#x}: line table v{} with {} files, {} rows",
            self.offset(),
            table.version,
            table.file_names.len(),
            table.entries().len()
        );
        Ok(Some(table))
    }

    /// Every DIE of the unit in pre-order, with depth set. Decoding stops at the
    /// first DIE whose attributes cannot be located; earlier DIEs are kept.
    pub fn dies(&self) -> &[Die] {
        self.dies.get_or_init(|| self.traverse())
    }

    fn traverse(&self) -> Vec<Die> {
        let mut dies = Vec::new();
        let mut offset = self.first_die;
        let mut depth = 0usize;

        while offset < self.section.end {
            let mut die = match Die::read(self, offset, ReadMode::Full) {
                Ok(die) => die,
                Err(err) => {
                    warn!(
                        "unit at {:#x}: stopping at DIE {offset:#x}: {err}",
                        self.offset()
                    );
                    break;
                }
            };
            offset = die.next_offset();

            if die.is_terminator() {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    break;
                }
                continue;
            }

            die.depth = depth;
            let has_children = die.has_children();
            dies.push(die);
            if has_children {
                depth += 1;
            } else if depth == 0 {
                break;
            }
        }

        debug!(
            "unit at {:#x}: {} DIEs, max depth {}",
            self.offset(),
            dies.len(),
            dies.iter().map(|die| die.depth).max().unwrap_or(0)
        );
        dies
    }

    /// Lowest and highest PC over all DIEs of the unit.
    pub fn pc_bounds(&self) -> Option<(u64, u64)> {
        *self.pc_bounds.get_or_init(|| {
            self.dies()
                .iter()
                .filter_map(Die::pc_range)
                .fold(None, |bounds, (low, high)| match bounds {
                    None => Some((low, high)),
                    Some((lo, hi)) => Some((lo.min(low), hi.max(high))),
                })
        })
    }

    /// Base for range lists: the root's `low_pc`, or zero.
    pub fn base_address(&self) -> u64 {
        *self.base_address.get_or_init(|| {
            Die::read(self, self.first_die, ReadMode::Fast)
                .and_then(|root| root.attribute(self, DW_AT_LOW_PC)?.as_address())
                .unwrap_or(0)
        })
    }

    /// Decodes a DWARF 2-4 range list at `offset` in `.debug_ranges`.
    pub fn range_list(&self, offset: u64, base: u64) -> Result<Vec<(u64, u64)>> {
        let data = self
            .sections
            .ranges
            .ok_or(DwarfError::MissingSection(".debug_ranges"))?;
        let start = usize::try_from(offset)
            .ok()
            .filter(|&start| start < data.len())
            .ok_or(DwarfError::InvalidOffset {
                section: ".debug_ranges",
                offset,
            })?;

        let address_size = self.address_size();
        let section = Section::whole(data, self.section.byte_order).with_address_size(address_size);
        let mut cursor = Cursor::at(data, section, start);
        let max_address = match address_size {
            8 => u64::MAX,
            size => (1u64 << (size as u32 * 8)) - 1,
        };

        let mut base = base;
        let mut ranges = Vec::new();
        loop {
            let begin = cursor.address()?;
            let end = cursor.address()?;
            if begin == 0 && end == 0 {
                break;
            }
            if begin == max_address {
                base = end;
                continue;
            }
            if begin < end {
                ranges.push((base.wrapping_add(begin), base.wrapping_add(end)));
            }
        }
        Ok(ranges)
    }
}
