#![allow(dead_code)]

use dwarfstack::dwarf::constants::*;
use dwarfstack::dwarf::DebugSections;

pub fn uleb(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

pub fn sleb(out: &mut Vec<u8>, mut value: i64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        let done = (value == 0 && byte & 0x40 == 0) || (value == -1 && byte & 0x40 != 0);
        if done {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

#[derive(Default)]
pub struct AbbrevBuilder {
    bytes: Vec<u8>,
}

impl AbbrevBuilder {
    pub fn add(&mut self, code: u64, tag: DwarfTag, children: bool, specs: &[(DwarfAttr, DwarfForm)]) -> &mut Self {
        uleb(&mut self.bytes, code);
        uleb(&mut self.bytes, tag);
        self.bytes.push(children as u8);
        for &(name, form) in specs {
            uleb(&mut self.bytes, name);
            uleb(&mut self.bytes, form);
        }
        self.bytes.extend([0, 0]);
        self
    }

    pub fn finish(&self) -> Vec<u8> {
        let mut bytes = self.bytes.clone();
        bytes.push(0);
        bytes
    }
}

/// One unit's DIE bytes, little endian. Offsets passed around by tests are
/// relative to the start of `.debug_info`.
pub struct UnitBuilder {
    pub version: u16,
    pub address_size: u8,
    pub dwarf64: bool,
    body: Vec<u8>,
}

impl UnitBuilder {
    pub fn new(version: u16) -> Self {
        Self {
            version,
            address_size: 8,
            dwarf64: false,
            body: Vec::new(),
        }
    }

    pub fn header_size(&self) -> usize {
        let length = if self.dwarf64 { 12 } else { 4 };
        let offset = if self.dwarf64 { 8 } else { 4 };
        let extra = if self.version >= 5 { 1 } else { 0 };
        length + 2 + offset + 1 + extra
    }

    /// Offset the next byte written will have inside a unit starting at 0.
    pub fn position(&self) -> usize {
        self.header_size() + self.body.len()
    }

    pub fn code(&mut self, code: u64) -> &mut Self {
        uleb(&mut self.body, code);
        self
    }

    pub fn u8(&mut self, value: u8) -> &mut Self {
        self.body.push(value);
        self
    }

    pub fn u16(&mut self, value: u16) -> &mut Self {
        self.body.extend(value.to_le_bytes());
        self
    }

    pub fn u32(&mut self, value: u32) -> &mut Self {
        self.body.extend(value.to_le_bytes());
        self
    }

    pub fn u64(&mut self, value: u64) -> &mut Self {
        self.body.extend(value.to_le_bytes());
        self
    }

    pub fn uleb(&mut self, value: u64) -> &mut Self {
        uleb(&mut self.body, value);
        self
    }

    pub fn sleb(&mut self, value: i64) -> &mut Self {
        sleb(&mut self.body, value);
        self
    }

    pub fn str(&mut self, value: &str) -> &mut Self {
        self.body.extend(value.as_bytes());
        self.body.push(0);
        self
    }

    pub fn bytes(&mut self, value: &[u8]) -> &mut Self {
        self.body.extend(value);
        self
    }

    /// Null entry closing a sibling list.
    pub fn end(&mut self) -> &mut Self {
        self.body.push(0);
        self
    }

    pub fn finish(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let offset_size = if self.dwarf64 { 8 } else { 4 };
        let extra = if self.version >= 5 { 1 } else { 0 };
        let length = (2 + offset_size + 1 + extra + self.body.len()) as u64;
        if self.dwarf64 {
            out.extend(0xffff_ffffu32.to_le_bytes());
            out.extend(length.to_le_bytes());
        } else {
            out.extend((length as u32).to_le_bytes());
        }
        out.extend(self.version.to_le_bytes());
        if self.version >= 5 {
            out.push(0x01); // DW_UT_compile
            out.push(self.address_size);
            out.extend(vec![0; offset_size]);
        } else {
            out.extend(vec![0; offset_size]);
            out.push(self.address_size);
        }
        out.extend(&self.body);
        out
    }
}

/// A version 4 line program for one file, `rows` being `(address, line)`.
pub fn line_program(file: &str, rows: &[(u64, u64)], end_address: u64) -> Vec<u8> {
    let mut header = Vec::new();
    header.push(1); // minimum_instruction_length
    header.push(1); // maximum_operations_per_instruction
    header.push(1); // default_is_stmt
    header.push((-5i8) as u8); // line_base
    header.push(14); // line_range
    header.push(13); // opcode_base
    header.extend([0, 1, 1, 1, 1, 0, 0, 0, 1, 0, 0, 1]);
    header.push(0); // no include directories
    header.extend(file.as_bytes());
    header.extend([0, 0, 0, 0]); // terminator, dir, mtime, length
    header.push(0);

    let mut program = Vec::new();
    let mut line = 1i64;
    for &(address, row_line) in rows {
        set_address(&mut program, address);
        program.push(3); // DW_LNS_advance_line
        sleb(&mut program, row_line as i64 - line);
        line = row_line as i64;
        program.push(1); // DW_LNS_copy
    }
    set_address(&mut program, end_address);
    program.extend([0, 1, 1]); // DW_LNE_end_sequence

    let mut out = Vec::new();
    let length = 2 + 4 + header.len() + program.len();
    out.extend((length as u32).to_le_bytes());
    out.extend(4u16.to_le_bytes());
    out.extend((header.len() as u32).to_le_bytes());
    out.extend(header);
    out.extend(program);
    out
}

fn set_address(program: &mut Vec<u8>, address: u64) {
    program.extend([0, 9, 2]);
    program.extend(address.to_le_bytes());
}

/// Owned debug sections of a synthetic object.
#[derive(Default, Clone)]
pub struct DebugImage {
    pub info: Vec<u8>,
    pub abbrev: Vec<u8>,
    pub line: Vec<u8>,
    pub str: Vec<u8>,
    pub ranges: Vec<u8>,
}

impl DebugImage {
    pub fn sections(&self) -> DebugSections<'_> {
        DebugSections {
            info: some(&self.info),
            abbrev: some(&self.abbrev),
            line: some(&self.line),
            str: some(&self.str),
            ranges: some(&self.ranges),
            ..Default::default()
        }
    }
}

fn some(bytes: &[u8]) -> Option<&[u8]> {
    (!bytes.is_empty()).then_some(bytes)
}

/// A compile unit for `main.c` in `/src` with one subprogram per entry of
/// `functions`: `(name, low_pc, size, decl_line)`. Line rows come from `rows`.
pub fn simple_image(functions: &[(&str, u64, u32, u8)], rows: &[(u64, u64)]) -> DebugImage {
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
                (DW_AT_LOW_PC, DW_FORM_ADDR),
                (DW_AT_HIGH_PC, DW_FORM_DATA4),
            ],
        );

    let mut unit = UnitBuilder::new(4);
    unit.code(1).str("main.c").str("/src").u32(0);
    for &(name, low, size, line) in functions {
        unit.code(2).str(name).u8(1).u8(line).u64(low).u32(size);
    }
    unit.end();

    let end = rows.iter().map(|&(address, _)| address).max().unwrap_or(0) + 0x10;
    DebugImage {
        info: unit.finish(),
        abbrev: abbrev.finish(),
        line: line_program("main.c", rows, end),
        ..Default::default()
    }
}

pub struct TestSymbol {
    pub name: &'static str,
    pub value: u64,
    pub size: u64,
    /// `st_info`: binding in the high nibble, type in the low one.
    pub info: u8,
    pub shndx: u16,
}

impl TestSymbol {
    pub fn func(name: &'static str, value: u64, size: u64) -> Self {
        Self {
            name,
            value,
            size,
            info: 0x12,
            shndx: 1,
        }
    }

    pub fn object(name: &'static str, value: u64, size: u64) -> Self {
        Self {
            name,
            value,
            size,
            info: 0x11,
            shndx: 1,
        }
    }
}

/// A little-endian ELF64 relocatable image. Section 1 is `.text` at address 0;
/// `sections` follow from index 2, then `.symtab`, `.strtab` and `.shstrtab`.
pub fn build_elf64(sections: &[(&str, Vec<u8>)], symbols: &[TestSymbol]) -> Vec<u8> {
    let mut all: Vec<(String, u32, Vec<u8>)> = vec![(".text".to_string(), 1, vec![0x90; 0x400])];
    for (name, data) in sections {
        all.push((name.to_string(), 1, data.clone()));
    }

    let mut strtab = vec![0u8];
    let mut symtab = vec![0u8; 24];
    for symbol in symbols {
        let name = strtab.len() as u32;
        strtab.extend(symbol.name.as_bytes());
        strtab.push(0);
        symtab.extend(name.to_le_bytes());
        symtab.push(symbol.info);
        symtab.push(0);
        symtab.extend(symbol.shndx.to_le_bytes());
        symtab.extend(symbol.value.to_le_bytes());
        symtab.extend(symbol.size.to_le_bytes());
    }
    let symtab_index = all.len() + 1;
    all.push((".symtab".to_string(), 2, symtab));
    all.push((".strtab".to_string(), 3, strtab));

    let mut shstrtab = vec![0u8];
    let mut name_offsets = Vec::new();
    for (name, _, _) in &all {
        name_offsets.push(shstrtab.len() as u32);
        shstrtab.extend(name.as_bytes());
        shstrtab.push(0);
    }
    name_offsets.push(shstrtab.len() as u32);
    shstrtab.extend(b".shstrtab\0");
    all.push((".shstrtab".to_string(), 3, shstrtab));

    let mut image = vec![0u8; 64];
    let mut offsets = Vec::new();
    for (_, _, data) in &all {
        while image.len() % 8 != 0 {
            image.push(0);
        }
        offsets.push(image.len() as u64);
        image.extend(data);
    }
    while image.len() % 8 != 0 {
        image.push(0);
    }
    let shoff = image.len() as u64;

    image.extend([0u8; 64]);
    for (i, (_, kind, data)) in all.iter().enumerate() {
        let (link, info, entsize) = if i + 1 == symtab_index {
            (symtab_index as u32 + 1, 1u32, 24u64)
        } else {
            (0, 0, 0)
        };
        image.extend(name_offsets[i].to_le_bytes());
        image.extend(kind.to_le_bytes());
        image.extend(0u64.to_le_bytes()); // flags
        image.extend(0u64.to_le_bytes()); // addr
        image.extend(offsets[i].to_le_bytes());
        image.extend((data.len() as u64).to_le_bytes());
        image.extend(link.to_le_bytes());
        image.extend(info.to_le_bytes());
        image.extend(8u64.to_le_bytes()); // addralign
        image.extend(entsize.to_le_bytes());
    }

    let shnum = (all.len() + 1) as u16;
    let header = &mut image[..64];
    header[..4].copy_from_slice(b"\x7fELF");
    header[4] = 2; // ELFCLASS64
    header[5] = 1; // little endian
    header[6] = 1;
    header[16..18].copy_from_slice(&1u16.to_le_bytes()); // ET_REL
    header[18..20].copy_from_slice(&62u16.to_le_bytes()); // EM_X86_64
    header[20..24].copy_from_slice(&1u32.to_le_bytes());
    header[40..48].copy_from_slice(&shoff.to_le_bytes());
    header[52..54].copy_from_slice(&64u16.to_le_bytes());
    header[58..60].copy_from_slice(&64u16.to_le_bytes());
    header[60..62].copy_from_slice(&shnum.to_le_bytes());
    header[62..64].copy_from_slice(&(shnum - 1).to_le_bytes());
    image
}
