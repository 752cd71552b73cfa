mod common;

use anyhow::{Context, Result};
use common::{build_elf64, simple_image, TestSymbol};
use dwarfstack::dwarf::ByteOrder;
use dwarfstack::elf::{Elf, ElfClass};
use dwarfstack::types::{SymbolBinding, SymbolKind};

#[test]
fn reads_header_and_sections() -> Result<()> {
    let elf = Elf::from_bytes(build_elf64(&[(".data", vec![1, 2, 3, 4])], &[]))?;
    assert_eq!(elf.class(), ElfClass::Elf64);
    assert_eq!(elf.byte_order(), ByteOrder::Little);
    assert_eq!(elf.machine(), 62);

    let names: Vec<&str> = elf.sections().iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["", ".text", ".data", ".symtab", ".strtab", ".shstrtab"]);
    assert_eq!(elf.section_bytes(".data"), Some(&[1u8, 2, 3, 4][..]));
    assert!(elf.section(".bss").is_none());
    assert!(!elf.has_debug_info());
    Ok(())
}

#[test]
fn loads_symbols_with_section_labels() -> Result<()> {
    let symbols = [
        TestSymbol::func("main", 0x10, 0x20),
        TestSymbol::object("counter", 0x100, 4),
        TestSymbol {
            name: "printf",
            value: 0,
            size: 0,
            info: 0x12,
            shndx: 0,
        },
        TestSymbol {
            name: "absolute",
            value: 0x1234,
            size: 0,
            info: 0x20,
            shndx: 0xfff1,
        },
        TestSymbol {
            name: "",
            value: 0,
            size: 0,
            info: 0x03,
            shndx: 1,
        },
        TestSymbol {
            name: "",
            value: 0,
            size: 0,
            info: 0x00,
            shndx: 1,
        },
    ];
    let elf = Elf::from_bytes(build_elf64(&[], &symbols))?;
    let table = elf.symbol_table()?;

    // The unnamed NOTYPE entry is dropped.
    assert_eq!(table.len(), 5);
    assert_eq!(table.section_count(), elf.sections().len());

    let main = table.by_name("main").next().context("main")?;
    assert_eq!(main.kind, SymbolKind::Func);
    assert_eq!(main.binding, SymbolBinding::Global);
    assert_eq!((main.value, main.size), (0x10, 0x20));
    assert_eq!(main.section_name.as_deref(), Some(".text"));
    assert!(table.section_is_known(main.section_index));

    let counter = table.by_name("counter").next().context("counter")?;
    assert_eq!(counter.kind, SymbolKind::Object);

    let printf = table.by_name("printf").next().context("printf")?;
    assert_eq!(printf.section_name.as_deref(), Some("UND"));
    assert!(!table.section_is_known(printf.section_index));

    let absolute = table.by_name("absolute").next().context("absolute")?;
    assert_eq!(absolute.binding, SymbolBinding::Weak);
    assert_eq!(absolute.section_name.as_deref(), Some("ABS"));
    assert!(!table.section_is_known(absolute.section_index));

    let section = table.by_name(".text").next().context("section symbol")?;
    assert_eq!(section.kind, SymbolKind::Section);
    assert_eq!(section.binding, SymbolBinding::Local);
    Ok(())
}

#[test]
fn exposes_debug_sections() -> Result<()> {
    let image = simple_image(&[("main", 0x10, 0x20, 3)], &[(0x10, 3)]);
    let bytes = build_elf64(
        &[
            (".debug_info", image.info.clone()),
            (".debug_abbrev", image.abbrev.clone()),
            (".debug_line", image.line.clone()),
        ],
        &[TestSymbol::func("main", 0x10, 0x20)],
    );
    let elf = Elf::from_bytes(bytes)?;
    assert!(elf.has_debug_info());

    let sections = elf.debug_sections();
    assert_eq!(sections.info, Some(image.info.as_slice()));
    assert_eq!(sections.abbrev, Some(image.abbrev.as_slice()));
    assert_eq!(sections.line, Some(image.line.as_slice()));
    assert!(sections.str.is_none());
    assert!(sections.ranges.is_none());
    Ok(())
}

#[test]
fn rejects_other_files() {
    assert!(Elf::from_bytes(b"#!/bin/sh\necho hello\n".to_vec()).is_err());
    assert!(Elf::from_bytes(b"\x7fELF".to_vec()).is_err());

    let mut bad_class = build_elf64(&[], &[]);
    bad_class[4] = 9;
    assert!(Elf::from_bytes(bad_class).is_err());

    let mut truncated = build_elf64(&[], &[]);
    truncated.truncate(40);
    assert!(Elf::from_bytes(truncated).is_err());
}

#[test]
fn section_counts_beyond_the_file_are_rejected() -> Result<()> {
    let image = build_elf64(&[], &[]);
    let shoff = u64::from_le_bytes(image[40..48].try_into()?) as usize;

    // Extended numbering with an absurd count in section header 0.
    let mut extended = image.clone();
    extended[60..62].copy_from_slice(&0u16.to_le_bytes());
    extended[shoff + 32..shoff + 40].copy_from_slice(&u64::MAX.to_le_bytes());
    assert!(Elf::from_bytes(extended).is_err());

    let mut too_many = image.clone();
    too_many[60..62].copy_from_slice(&0xfff0u16.to_le_bytes());
    assert!(Elf::from_bytes(too_many).is_err());

    let mut far_offset = image;
    far_offset[40..48].copy_from_slice(&(u64::MAX - 8).to_le_bytes());
    assert!(Elf::from_bytes(far_offset).is_err());
    Ok(())
}
