//! DWARF decoding and address-to-source attribution.
//!
//! Units are carved out of `.debug_info` up front; everything inside a unit
//! (abbreviations, DIEs, line table) is decoded lazily and cached once.

pub mod abbrev;
pub mod constants;
pub mod cursor;
pub mod die;
pub mod expr;
pub mod line;
pub mod unit;
pub mod value;

use std::collections::BTreeMap;

use log::{debug, info, warn};

use crate::error::{DwarfError, Result};
use crate::types::{SourceLocation, SymbolKind, SymbolTable};

pub use abbrev::{Abbreviation, AbbreviationTable, AttributeSpec};
pub use cursor::{ByteOrder, Cursor, Format, Section};
pub use die::{Die, ReadMode};
pub use expr::{Expression, ExpressionResult};
pub use line::{LineEntry, LineTable};
pub use unit::CompilationUnit;
pub use value::Value;

/// How far past a line-table row a symbol may start and still be attributed
/// to that row.
pub const LINE_TABLE_MAX_DISTANCE: u64 = 5;

/// Byte ranges of the debug sections. Absent sections disable the features
/// that depend on them.
#[derive(Debug, Clone, Copy, Default)]
pub struct DebugSections<'a> {
    pub info: Option<&'a [u8]>,
    pub abbrev: Option<&'a [u8]>,
    pub loc: Option<&'a [u8]>,
    pub line: Option<&'a [u8]>,
    pub line_str: Option<&'a [u8]>,
    pub str: Option<&'a [u8]>,
    pub ranges: Option<&'a [u8]>,
}

/// Location of a DIE: owning unit index and `.debug_info` offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DieRef {
    pub unit: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchStats {
    pub from_dies: usize,
    pub from_line_table: usize,
    pub unmatched: usize,
}

pub struct Dwarf<'a> {
    sections: DebugSections<'a>,
    units: Vec<CompilationUnit<'a>>,
}

impl<'a> Dwarf<'a> {
    /// Scans `.debug_info` for unit headers. A unit whose header cannot be
    /// decoded is skipped; the scan stops only when unit lengths stop making
    /// sense.
    pub fn new(sections: DebugSections<'a>, byte_order: ByteOrder) -> Result<Self> {
        let info = sections
            .info
            .ok_or(DwarfError::MissingSection(".debug_info"))?;

        let mut units = Vec::new();
        let mut cursor = Cursor::new(info, Section::whole(info, byte_order));
        while !cursor.is_empty() {
            let start = cursor.position();
            let section = match cursor.sub_section() {
                Ok(section) => section,
                Err(err) => {
                    warn!("stopping unit scan at {start:#x}: {err}");
                    break;
                }
            };
            match CompilationUnit::parse(units.len(), sections, info, section) {
                Ok(unit) => units.push(unit),
                Err(err) => warn!("skipping unit at {start:#x}: {err}"),
            }
        }

        debug!("found {} compilation units", units.len());
        Ok(Self { sections, units })
    }

    pub fn sections(&self) -> &DebugSections<'a> {
        &self.sections
    }

    pub fn units(&self) -> &[CompilationUnit<'a>] {
        &self.units
    }

    /// The last unit starting at or before `offset`.
    pub fn unit_containing(&self, offset: usize) -> Option<&CompilationUnit<'a>> {
        let index = self.units.partition_point(|unit| unit.offset() <= offset);
        index.checked_sub(1).map(|index| &self.units[index])
    }

    pub fn die(&self, reference: DieRef, mode: ReadMode) -> Result<Die> {
        let unit = self.units.get(reference.unit).ok_or(DwarfError::InvalidOffset {
            section: ".debug_info",
            offset: reference.offset as u64,
        })?;
        Die::read(unit, reference.offset, mode)
    }

    /// Attributes symbols to source locations, from DIE ranges first and the
    /// line tables second.
    pub fn match_debug_info(&self, symbols: &mut SymbolTable) -> MatchStats {
        let index = DieIndex::build(&self.units);
        let lines = self.collect_line_locations();
        debug!(
            "matching {} symbols against {} DIEs and {} line rows",
            symbols.len(),
            index.len(),
            lines.len()
        );

        let mut stats = MatchStats::default();
        for i in 0..symbols.len() {
            let eligible = symbols.get(i).is_some_and(|symbol| {
                symbol.value > 0
                    && symbols.section_is_known(symbol.section_index)
                    && symbol.kind != SymbolKind::Section
            });
            if !eligible {
                continue;
            }
            let Some(symbol) = symbols.get_mut(i) else {
                continue;
            };
            let address = symbol.value;

            if let Some(span) = index.find(address) {
                symbol.source = Some(SourceLocation {
                    path: span.path.clone(),
                    line: span.line,
                    column: (span.column > 0).then_some(span.column),
                });
                symbol.from_dies = true;
                symbol.debug_address = Some(span.low);
                stats.from_dies += 1;
                continue;
            }

            let row = if symbol.kind == SymbolKind::Func {
                lines.range(..=address).next_back()
            } else {
                lines.get_key_value(&address)
            };
            match row {
                Some((&row_address, location))
                    if address - row_address <= LINE_TABLE_MAX_DISTANCE =>
                {
                    symbol.source = Some(location.clone());
                    symbol.from_dies = false;
                    symbol.debug_address = Some(row_address);
                    stats.from_line_table += 1;
                }
                _ => stats.unmatched += 1,
            }
        }

        info!(
            "debug info: {} symbols from DIEs, {} from line tables, {} unattributed",
            stats.from_dies, stats.from_line_table, stats.unmatched
        );
        stats
    }

    fn collect_line_locations(&self) -> BTreeMap<u64, SourceLocation> {
        let mut lines = BTreeMap::new();
        for unit in &self.units {
            let Some(table) = unit.line_table() else {
                continue;
            };
            for (&address, entry) in table.entries() {
                let Some(path) = table.file_name(entry.file) else {
                    continue;
                };
                lines.insert(
                    address,
                    SourceLocation {
                        path: path.to_string(),
                        line: entry.line,
                        column: (entry.column > 0).then_some(entry.column),
                    },
                );
            }
        }
        lines
    }
}

struct DieSpan<'d> {
    low: u64,
    path: &'d String,
    line: u64,
    column: u64,
    die: &'d Die,
}

/// DIEs with both a source path and a PC range, sorted by low PC.
struct DieIndex<'d> {
    spans: Vec<DieSpan<'d>>,
    /// `max_high[i]` is the highest `high_pc` among `spans[..=i]`.
    max_high: Vec<u64>,
}

impl<'d> DieIndex<'d> {
    fn build(units: &'d [CompilationUnit<'_>]) -> Self {
        let mut spans: Vec<DieSpan<'d>> = units
            .iter()
            .flat_map(|unit| unit.dies())
            .filter_map(|die| {
                let path = die.path.as_ref()?;
                let (low, _) = die.pc_range()?;
                Some(DieSpan {
                    low,
                    path,
                    line: die.line,
                    column: die.column,
                    die,
                })
            })
            .collect();
        spans.sort_by_key(|span| span.low);

        let mut max_high = Vec::with_capacity(spans.len());
        let mut highest = 0u64;
        for span in &spans {
            highest = highest.max(span.die.high_pc.unwrap_or(span.low));
            max_high.push(highest);
        }
        Self { spans, max_high }
    }

    fn len(&self) -> usize {
        self.spans.len()
    }

    /// The containing DIE with the closest low PC at or below `address`.
    fn find(&self, address: u64) -> Option<&DieSpan<'d>> {
        let end = self.spans.partition_point(|span| span.low <= address);
        (0..end)
            .rev()
            .take_while(|&i| self.max_high[i] > address)
            .map(|i| &self.spans[i])
            .find(|span| span.die.contains(address))
    }
}
