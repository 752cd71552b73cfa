mod common;

use anyhow::{Context, Result};
use common::{line_program, simple_image, AbbrevBuilder, DebugImage, UnitBuilder};
use dwarfstack::dwarf::constants::*;
use dwarfstack::dwarf::line::LineProgramSource;
use dwarfstack::dwarf::{ByteOrder, DebugSections, Dwarf, LineTable, MatchStats};
use dwarfstack::types::{Symbol, SymbolKind, SymbolTable};

fn table(symbols: &[(&str, u64, SymbolKind)]) -> SymbolTable {
    let mut table = SymbolTable::new(4);
    for &(name, value, kind) in symbols {
        let mut symbol = Symbol::new(name, value, 0x10, kind);
        symbol.section_index = 1;
        table.push(symbol);
    }
    table
}

fn source_of(table: &SymbolTable, name: &str) -> Option<(String, u64)> {
    let symbol = table.by_name(name).next()?;
    let source = symbol.source.as_ref()?;
    Some((source.path.clone(), source.line))
}

#[test]
fn line_table_decodes_rows_and_files() -> Result<()> {
    let image = simple_image(&[], &[(0x100, 3), (0x108, 5), (0x110, 4)]);
    let dwarf = Dwarf::new(image.sections(), ByteOrder::Little)?;
    let lines = dwarf.units()[0].line_table().context("line table")?;

    assert_eq!(lines.version, 4);
    assert_eq!(lines.file_names, ["/src/main.c", "/src/main.c"]);
    let rows: Vec<(u64, u64)> = lines
        .entries()
        .values()
        .map(|entry| (entry.address, entry.line))
        .collect();
    assert_eq!(rows, [(0x100, 3), (0x108, 5), (0x110, 4)]);
    assert_eq!(lines.entries_in(0x104..0x110).count(), 1);
    Ok(())
}

#[test]
fn covering_die_wins_over_line_table() -> Result<()> {
    let image = simple_image(&[("compute", 0x100, 0x100, 7)], &[(0x150, 42)]);
    let dwarf = Dwarf::new(image.sections(), ByteOrder::Little)?;
    let mut symbols = table(&[("compute", 0x150, SymbolKind::Func)]);

    let stats = dwarf.match_debug_info(&mut symbols);
    assert_eq!(
        stats,
        MatchStats {
            from_dies: 1,
            from_line_table: 0,
            unmatched: 0
        }
    );
    assert_eq!(source_of(&symbols, "compute"), Some(("/src/main.c".into(), 7)));
    let symbol = symbols.by_name("compute").next().context("symbol")?;
    assert!(symbol.from_dies);
    assert_eq!(symbol.debug_address, Some(0x100));
    Ok(())
}

#[test]
fn line_table_fallback_tolerates_five_bytes() -> Result<()> {
    let image = simple_image(&[("elsewhere", 0x400, 0x10, 1)], &[(0x150, 42)]);
    let dwarf = Dwarf::new(image.sections(), ByteOrder::Little)?;
    let mut symbols = table(&[
        ("near", 0x153, SymbolKind::Func),
        ("far", 0x160, SymbolKind::Func),
        ("exact_object", 0x150, SymbolKind::Object),
        ("offset_object", 0x152, SymbolKind::Object),
    ]);

    let stats = dwarf.match_debug_info(&mut symbols);
    assert_eq!(stats.from_line_table, 2);
    assert_eq!(stats.unmatched, 2);

    assert_eq!(source_of(&symbols, "near"), Some(("/src/main.c".into(), 42)));
    assert_eq!(source_of(&symbols, "far"), None);
    assert_eq!(source_of(&symbols, "exact_object"), Some(("/src/main.c".into(), 42)));
    assert_eq!(source_of(&symbols, "offset_object"), None);

    let near = symbols.by_name("near").next().context("symbol")?;
    assert!(!near.from_dies);
    assert_eq!(near.debug_address, Some(0x150));
    Ok(())
}

#[test]
fn ineligible_symbols_are_left_alone() -> Result<()> {
    let image = simple_image(&[("compute", 0x100, 0x100, 7)], &[]);
    let dwarf = Dwarf::new(image.sections(), ByteOrder::Little)?;

    let mut symbols = SymbolTable::new(4);
    let mut undefined = Symbol::new("printf", 0x120, 0, SymbolKind::Func);
    undefined.section_index = 0;
    symbols.push(undefined);
    let mut section = Symbol::new(".text", 0x120, 0, SymbolKind::Section);
    section.section_index = 1;
    symbols.push(section);
    let mut zero = Symbol::new("zero", 0, 0, SymbolKind::Func);
    zero.section_index = 1;
    symbols.push(zero);

    let stats = dwarf.match_debug_info(&mut symbols);
    assert_eq!(stats, MatchStats::default());
    assert!(symbols.iter().all(|symbol| symbol.source.is_none()));
    Ok(())
}

#[test]
fn discontiguous_ranges_are_matched_entry_by_entry() -> Result<()> {
    let mut abbrev = AbbrevBuilder::default();
    abbrev
        .add(
            1,
            DW_TAG_COMPILE_UNIT,
            true,
            &[
                (DW_AT_NAME, DW_FORM_STRING),
                (DW_AT_COMP_DIR, DW_FORM_STRING),
                (DW_AT_STMT_LIST, DW_FORM_SEC_OFFSET),
                (DW_AT_LOW_PC, DW_FORM_ADDR),
            ],
        )
        .add(
            2,
            DW_TAG_SUBPROGRAM,
            false,
            &[
                (DW_AT_NAME, DW_FORM_STRING),
                (DW_AT_DECL_FILE, DW_FORM_DATA1),
                (DW_AT_DECL_LINE, DW_FORM_DATA1),
                (DW_AT_RANGES, DW_FORM_SEC_OFFSET),
            ],
        );

    let mut unit = UnitBuilder::new(4);
    unit.code(1).str("main.c").str("/src").u32(0).u64(0x1000);
    unit.code(2).str("split").u8(1).u8(12).u32(0);
    unit.end();

    let mut ranges = Vec::new();
    for value in [0x100u64, 0x120, 0x300, 0x320, u64::MAX, 0x5000, 0x10, 0x20, 0, 0] {
        ranges.extend(value.to_le_bytes());
    }

    let image = DebugImage {
        info: unit.finish(),
        abbrev: abbrev.finish(),
        line: line_program("main.c", &[], 0x10),
        ranges,
        ..Default::default()
    };
    let dwarf = Dwarf::new(image.sections(), ByteOrder::Little)?;

    let dies = dwarf.units()[0].dies();
    let split = dies.iter().find(|die| die.name.as_deref() == Some("split")).context("die")?;
    assert_eq!(split.ranges, [(0x1100, 0x1120), (0x1300, 0x1320), (0x5010, 0x5020)]);
    assert_eq!(split.pc_range(), Some((0x1100, 0x5020)));
    assert!(split.contains(0x1310));
    assert!(!split.contains(0x1200));

    let mut symbols = table(&[
        ("inside", 0x1310, SymbolKind::Func),
        ("gap", 0x1200, SymbolKind::Func),
    ]);
    let stats = dwarf.match_debug_info(&mut symbols);
    assert_eq!(stats.from_dies, 1);
    assert_eq!(source_of(&symbols, "inside"), Some(("/src/main.c".into(), 12)));
    assert_eq!(source_of(&symbols, "gap"), None);
    Ok(())
}

fn parse_line_program(line: &[u8]) -> dwarfstack::error::Result<LineTable> {
    let sections = DebugSections {
        line: Some(line),
        ..Default::default()
    };
    let source = LineProgramSource {
        offset: 0,
        address_size: 8,
        byte_order: ByteOrder::Little,
        comp_dir: Some("/src"),
        comp_name: Some("main.c"),
    };
    LineTable::parse(&sections, source)
}

#[test]
fn oversized_lengths_in_line_program_are_rejected() -> Result<()> {
    let valid = line_program("main.c", &[], 0x10);
    assert!(parse_line_program(&valid).is_ok());

    // Replace the program with an extended opcode whose length is u64::MAX.
    let mut huge_opcode = valid[..valid.len() - 14].to_vec();
    huge_opcode.push(0);
    huge_opcode.extend([0xff; 9]);
    huge_opcode.push(0x01);
    let length = (huge_opcode.len() - 4) as u32;
    huge_opcode[..4].copy_from_slice(&length.to_le_bytes());
    assert!(parse_line_program(&huge_opcode).is_err());

    let mut huge_header = valid.clone();
    huge_header[6..10].copy_from_slice(&u32::MAX.to_le_bytes());
    assert!(parse_line_program(&huge_header).is_err());

    // The unit still decodes; only its line table is lost.
    let mut image = simple_image(&[("compute", 0x100, 0x100, 7)], &[]);
    image.line = huge_opcode;
    let dwarf = Dwarf::new(image.sections(), ByteOrder::Little)?;
    assert!(dwarf.units()[0].line_table().is_none());
    let mut symbols = table(&[("compute", 0x150, SymbolKind::Func)]);
    let stats = dwarf.match_debug_info(&mut symbols);
    assert_eq!(stats.from_line_table, 0);
    Ok(())
}
