use std::fmt;
use std::rc::Rc;

use log::debug;

use crate::dwarf::abbrev::Abbreviation;
use crate::dwarf::constants::*;
use crate::dwarf::expr::ExpressionResult;
use crate::dwarf::unit::CompilationUnit;
use crate::dwarf::value::Value;
use crate::error::{DwarfError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// Locate attributes and resolve name, declaration and PC range.
    Full,
    /// Locate attributes only; used to step over entries.
    Fast,
}

/// A debugging information entry, addressed by its `.debug_info` offset.
///
/// Attribute values stay encoded; only their offsets are recorded. Children and
/// siblings are reached by reading again from computed offsets.
#[derive(Clone)]
pub struct Die {
    unit: usize,
    offset: usize,
    next_offset: usize,
    abbrev: Option<Rc<Abbreviation>>,
    attr_offsets: Vec<usize>,

    pub name: Option<String>,
    pub path: Option<String>,
    pub line: u64,
    pub column: u64,
    pub low_pc: Option<u64>,
    pub high_pc: Option<u64>,
    /// Every `[low, high)` pair when the PC range came from `DW_AT_ranges`.
    pub ranges: Vec<(u64, u64)>,
    pub depth: usize,
}

impl fmt::Debug for Die {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Die")
            .field("offset", &format_args!("{:#x}", self.offset))
            .field("tag", &self.tag())
            .field("name", &self.name)
            .field("depth", &self.depth)
            .finish()
    }
}

impl Die {
    pub fn read(unit: &CompilationUnit<'_>, offset: usize, mode: ReadMode) -> Result<Die> {
        unit.record_read();
        if !unit.contains_offset(offset) {
            return Err(DwarfError::InvalidOffset {
                section: ".debug_info",
                offset: offset as u64,
            });
        }

        let mut cursor = unit.cursor_at(offset);
        let code = cursor.read_uleb128()?;
        if code == 0 {
            return Ok(Die::blank(unit.index(), offset, cursor.position(), None, Vec::new()));
        }

        let abbrev = Rc::clone(unit.abbreviations()?.get(code)?);
        let mut attr_offsets = Vec::with_capacity(abbrev.specs.len());
        for spec in abbrev.specs.iter() {
            attr_offsets.push(cursor.position());
            cursor.skip_form(spec.form, unit.version())?;
        }

        let mut die = Die::blank(
            unit.index(),
            offset,
            cursor.position(),
            Some(abbrev),
            attr_offsets,
        );
        if mode == ReadMode::Full {
            die.resolve(unit);
        }
        Ok(die)
    }

    fn blank(
        unit: usize,
        offset: usize,
        next_offset: usize,
        abbrev: Option<Rc<Abbreviation>>,
        attr_offsets: Vec<usize>,
    ) -> Die {
        Die {
            unit,
            offset,
            next_offset,
            abbrev,
            attr_offsets,
            name: None,
            path: None,
            line: 0,
            column: 0,
            low_pc: None,
            high_pc: None,
            ranges: Vec::new(),
            depth: 0,
        }
    }

    pub fn unit_index(&self) -> usize {
        self.unit
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Offset just past the last attribute: the first child, or the next
    /// sibling when there are no children.
    pub fn next_offset(&self) -> usize {
        self.next_offset
    }

    pub fn is_terminator(&self) -> bool {
        self.abbrev.is_none()
    }

    pub fn abbreviation(&self) -> Option<&Abbreviation> {
        self.abbrev.as_deref()
    }

    pub fn tag(&self) -> Option<DwarfTag> {
        self.abbrev.as_ref().map(|a| a.tag)
    }

    pub fn has_children(&self) -> bool {
        self.abbrev.as_ref().is_some_and(|a| a.has_children)
    }

    pub fn has(&self, name: DwarfAttr) -> bool {
        self.attr_index(name).is_some()
    }

    fn attr_index(&self, name: DwarfAttr) -> Option<usize> {
        self.abbrev.as_ref().and_then(|a| a.position(name))
    }

    pub fn attribute<'u, 'a>(
        &self,
        unit: &'u CompilationUnit<'a>,
        name: DwarfAttr,
    ) -> Result<Value<'u, 'a>> {
        let (abbrev, index) = self
            .abbrev
            .as_ref()
            .and_then(|a| a.position(name).map(|index| (a, index)))
            .ok_or(DwarfError::MissingAttribute(name))?;
        Value::new(unit, &abbrev.specs[index], self.attr_offsets[index])
    }

    pub(crate) fn string_attribute(&self, unit: &CompilationUnit<'_>, name: DwarfAttr) -> Option<String> {
        if !self.has(name) {
            return None;
        }
        match self.attribute(unit, name).and_then(|value| value.as_string()) {
            Ok(text) => Some(text),
            Err(err) => {
                debug!("DIE {:#x}: attribute {name:#x}: {err}", self.offset);
                None
            }
        }
    }

    pub fn pc_range(&self) -> Option<(u64, u64)> {
        Some((self.low_pc?, self.high_pc?))
    }

    pub fn contains(&self, address: u64) -> bool {
        if !self.ranges.is_empty() {
            return self
                .ranges
                .iter()
                .any(|&(low, high)| low <= address && address < high);
        }
        matches!(self.pc_range(), Some((low, high)) if low <= address && address < high)
    }

    /// Reads the entry following this one at the same depth. A terminator
    /// comes back when this was the last sibling.
    pub fn next(&self, unit: &CompilationUnit<'_>, mode: ReadMode) -> Result<Die> {
        let offset = self.next_sibling_offset(unit)?;
        let mut die = Die::read(unit, offset, mode)?;
        die.depth = self.depth;
        Ok(die)
    }

    /// Offset of the next sibling, stepping over the whole subtree. Descendants
    /// are fast-read at most once each, and subtrees carrying `DW_AT_sibling`
    /// are jumped over without reading them.
    pub fn next_sibling_offset(&self, unit: &CompilationUnit<'_>) -> Result<usize> {
        if !self.has_children() {
            return Ok(self.next_offset);
        }
        if let Some(target) = self.sibling_target(unit) {
            return Ok(target);
        }

        let mut offset = self.next_offset;
        let mut depth = 1usize;
        loop {
            let entry = Die::read(unit, offset, ReadMode::Fast)?;
            if entry.is_terminator() {
                depth -= 1;
                if depth == 0 {
                    return Ok(entry.next_offset);
                }
            } else if entry.has_children() {
                if let Some(target) = entry.sibling_target(unit) {
                    offset = target;
                    continue;
                }
                depth += 1;
            }
            offset = entry.next_offset;
        }
    }

    fn sibling_target(&self, unit: &CompilationUnit<'_>) -> Option<usize> {
        if !self.has(DW_AT_SIBLING) {
            return None;
        }
        match self
            .attribute(unit, DW_AT_SIBLING)
            .and_then(|value| value.as_local_reference())
        {
            Ok(target) if target > self.offset && unit.contains_offset(target) => Some(target),
            Ok(target) => {
                debug!("DIE {:#x}: ignoring sibling {target:#x}", self.offset);
                None
            }
            Err(err) => {
                debug!("DIE {:#x}: unusable sibling: {err}", self.offset);
                None
            }
        }
    }

    /// Direct children, terminator excluded.
    pub fn children(&self, unit: &CompilationUnit<'_>, mode: ReadMode) -> Result<Vec<Die>> {
        let mut children = Vec::new();
        if !self.has_children() {
            return Ok(children);
        }
        let mut child = Die::read(unit, self.next_offset, mode)?;
        child.depth = self.depth + 1;
        while !child.is_terminator() {
            let next = child.next(unit, mode)?;
            children.push(child);
            child = next;
        }
        Ok(children)
    }

    fn resolve(&mut self, unit: &CompilationUnit<'_>) {
        self.name = self.string_attribute(unit, DW_AT_NAME);

        if self.has(DW_AT_DECL_FILE) && self.has(DW_AT_DECL_LINE) {
            if let Err(err) = self.resolve_declaration(unit) {
                debug!("DIE {:#x}: declaration unresolved: {err}", self.offset);
            }
        }

        if let Err(err) = self.resolve_pc(unit) {
            debug!("DIE {:#x}: PC range unresolved: {err}", self.offset);
        }
    }

    fn resolve_declaration(&mut self, unit: &CompilationUnit<'_>) -> Result<()> {
        let file = self.attribute(unit, DW_AT_DECL_FILE)?.as_uconstant()?;
        let line = self.attribute(unit, DW_AT_DECL_LINE)?.as_uconstant()?;
        let column = if self.has(DW_AT_DECL_COLUMN) {
            self.attribute(unit, DW_AT_DECL_COLUMN)?.as_uconstant()?
        } else {
            0
        };

        let Some(table) = unit.line_table() else {
            return Ok(());
        };
        match table.file_name(file) {
            Some(path) => {
                self.path = Some(path.to_string());
                self.line = line;
                self.column = column;
            }
            None => debug!("DIE {:#x}: file index {file} out of range", self.offset),
        }
        Ok(())
    }

    fn resolve_pc(&mut self, unit: &CompilationUnit<'_>) -> Result<()> {
        if self.has(DW_AT_RANGES) {
            let value = self.attribute(unit, DW_AT_RANGES)?;
            if unit.version() >= 5 || value.form() == Form::Rnglistx {
                debug!("DIE {:#x}: .debug_rnglists is not decoded", self.offset);
                return Ok(());
            }
            let offset = value.as_sec_offset()?;
            let base = if self.offset == unit.root_offset() {
                match self.attribute(unit, DW_AT_LOW_PC) {
                    Ok(low) => low.as_address()?,
                    Err(_) => 0,
                }
            } else {
                unit.base_address()
            };
            let ranges = unit.range_list(offset, base)?;
            let low = ranges.iter().map(|&(low, _)| low).min();
            let high = ranges.iter().map(|&(_, high)| high).max();
            if let (Some(low), Some(high)) = (low, high) {
                self.low_pc = Some(low);
                self.high_pc = Some(high);
                self.ranges = ranges;
            }
            return Ok(());
        }

        if self.has(DW_AT_LOW_PC) {
            let low = self.attribute(unit, DW_AT_LOW_PC)?.as_address()?;
            let high = if self.has(DW_AT_HIGH_PC) {
                let value = self.attribute(unit, DW_AT_HIGH_PC)?;
                if value.form() == Form::Addr {
                    value.as_address()?
                } else {
                    low.wrapping_add(value.as_uconstant()?)
                }
            } else {
                low.wrapping_add(1)
            };
            self.low_pc = Some(low);
            self.high_pc = Some(high);
            return Ok(());
        }

        if self.has(DW_AT_LOCATION) {
            let value = self.attribute(unit, DW_AT_LOCATION)?;
            let address = match value.kind() {
                ValueKind::Address => value.as_address()?,
                ValueKind::Block | ValueKind::Expression => {
                    match value.as_expression()?.evaluate(&[])? {
                        ExpressionResult::Address(address) => address,
                        _ => return Ok(()),
                    }
                }
                // Location lists describe ranges of PCs, not a single address.
                _ => return Ok(()),
            };
            if address != 0 {
                self.low_pc = Some(address);
                self.high_pc = Some(address.wrapping_add(1));
            }
        }
        Ok(())
    }
}
