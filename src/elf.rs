use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::fs::File;
use std::ops::Deref;
use std::path::{Path, PathBuf};

use log::debug;
use memmap2::Mmap;

use crate::dwarf::{ByteOrder, Cursor, DebugSections, Section};
use crate::types::{
    Symbol, SymbolBinding, SymbolKind, SymbolTable, SHN_ABS, SHN_COMMON, SHN_UNDEF,
};

const ELF_MAGIC: &[u8; 4] = b"\x7fELF";
const ELFCLASS32: u8 = 1;
const ELFCLASS64: u8 = 2;
const ELFDATA2LSB: u8 = 1;
const ELFDATA2MSB: u8 = 2;

const SHN_XINDEX: u16 = 0xffff;
const SHT_NOBITS: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElfClass {
    Elf32,
    Elf64,
}

/// One section header, widened to 64 bits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionHeader {
    pub name: String,
    pub name_offset: u32,
    pub kind: u32,
    pub flags: u64,
    pub addr: u64,
    pub offset: u64,
    pub size: u64,
    pub link: u32,
    pub info: u32,
    pub entsize: u64,
}

enum Backing {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Deref for Backing {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Backing::Mapped(map) => map,
            Backing::Owned(bytes) => bytes,
        }
    }
}

pub struct Elf {
    pub path: Option<PathBuf>,
    data: Backing,
    class: ElfClass,
    byte_order: ByteOrder,
    machine: u16,
    sections: Vec<SectionHeader>,
    section_map: HashMap<String, usize>,
}

impl Elf {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;

        // SAFETY: the map is read-only and lives as long as `Elf`; the file is
        // not expected to change while it is analysed.
        let map = unsafe { Mmap::map(&file) }
            .with_context(|| format!("mapping {}", path.display()))?;

        let mut elf = Self::parse(Backing::Mapped(map))?;
        elf.path = Some(path.to_path_buf());
        Ok(elf)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::parse(Backing::Owned(bytes))
    }

    fn parse(data: Backing) -> Result<Self> {
        if data.len() < 16 || &data[..4] != ELF_MAGIC {
            bail!("not an ELF file");
        }
        let class = match data[4] {
            ELFCLASS32 => ElfClass::Elf32,
            ELFCLASS64 => ElfClass::Elf64,
            other => bail!("unsupported ELF class {other}"),
        };
        let byte_order = match data[5] {
            ELFDATA2LSB => ByteOrder::Little,
            ELFDATA2MSB => ByteOrder::Big,
            other => bail!("unsupported ELF data encoding {other}"),
        };

        let mut elf = Self {
            path: None,
            data,
            class,
            byte_order,
            machine: 0,
            sections: Vec::new(),
            section_map: HashMap::new(),
        };
        elf.parse_headers()?;
        Ok(elf)
    }

    fn cursor_at(&self, offset: u64) -> Result<Cursor<'_>> {
        let section = Section::whole(&self.data, self.byte_order).with_address_size(self.word_size());
        let offset = usize::try_from(offset).context("offset out of range")?;
        if offset > self.data.len() {
            bail!("offset {offset:#x} beyond end of file");
        }
        Ok(Cursor::at(&self.data, section, offset))
    }

    fn word_size(&self) -> u8 {
        match self.class {
            ElfClass::Elf32 => 4,
            ElfClass::Elf64 => 8,
        }
    }

    fn parse_headers(&mut self) -> Result<()> {
        let mut cursor = self.cursor_at(16)?;
        let _kind = cursor.read_u16()?;
        let machine = cursor.read_u16()?;
        let _version = cursor.read_u32()?;
        let _entry = cursor.address()?;
        let _phoff = cursor.address()?;
        let shoff = cursor.address()?;
        let _flags = cursor.read_u32()?;
        let _ehsize = cursor.read_u16()?;
        let _phentsize = cursor.read_u16()?;
        let _phnum = cursor.read_u16()?;
        let shentsize = cursor.read_u16()?;
        let shnum = cursor.read_u16()?;
        let shstrndx = cursor.read_u16()?;
        self.machine = machine;

        if shoff == 0 {
            debug!("no section headers");
            return Ok(());
        }
        let expected = match self.class {
            ElfClass::Elf32 => 40,
            ElfClass::Elf64 => 64,
        };
        if shentsize != expected {
            bail!("unexpected section header size {shentsize}");
        }

        // Extended numbering keeps the real values in section header 0.
        let first = self.read_section_header(shoff)?;
        let count = if shnum == 0 { first.size } else { u64::from(shnum) };
        let table_end = count
            .checked_mul(u64::from(shentsize))
            .and_then(|size| size.checked_add(shoff))
            .context("section header table size overflows")?;
        if table_end > self.data.len() as u64 {
            bail!("{count} section headers at {shoff:#x} run past the end of the file");
        }
        let count = count as usize;
        let names_index = if shstrndx == SHN_XINDEX {
            first.link as usize
        } else {
            shstrndx as usize
        };

        let mut sections = Vec::with_capacity(count);
        for i in 0..count {
            let offset = shoff + i as u64 * u64::from(shentsize);
            sections.push(self.read_section_header(offset)?);
        }

        if let Some(names) = sections.get(names_index).cloned() {
            for section in &mut sections {
                section.name = self
                    .string_at(&names, section.name_offset)
                    .unwrap_or_default();
            }
        }

        self.section_map = sections
            .iter()
            .enumerate()
            .filter(|(_, section)| !section.name.is_empty())
            .map(|(i, section)| (section.name.clone(), i))
            .collect();
        self.sections = sections;
        debug!("{} sections", self.sections.len());
        Ok(())
    }

    fn read_section_header(&self, offset: u64) -> Result<SectionHeader> {
        let mut cursor = self.cursor_at(offset)?;
        let header = match self.class {
            ElfClass::Elf32 => SectionHeader {
                name_offset: cursor.read_u32()?,
                kind: cursor.read_u32()?,
                flags: u64::from(cursor.read_u32()?),
                addr: u64::from(cursor.read_u32()?),
                offset: u64::from(cursor.read_u32()?),
                size: u64::from(cursor.read_u32()?),
                link: cursor.read_u32()?,
                info: cursor.read_u32()?,
                entsize: {
                    let _align = cursor.read_u32()?;
                    u64::from(cursor.read_u32()?)
                },
                ..Default::default()
            },
            ElfClass::Elf64 => SectionHeader {
                name_offset: cursor.read_u32()?,
                kind: cursor.read_u32()?,
                flags: cursor.read_u64()?,
                addr: cursor.read_u64()?,
                offset: cursor.read_u64()?,
                size: cursor.read_u64()?,
                link: cursor.read_u32()?,
                info: cursor.read_u32()?,
                entsize: {
                    let _align = cursor.read_u64()?;
                    cursor.read_u64()?
                },
                ..Default::default()
            },
        };
        Ok(header)
    }

    fn string_at(&self, table: &SectionHeader, offset: u32) -> Option<String> {
        let bytes = self.bytes_of(table)?;
        let start = offset as usize;
        let tail = bytes.get(start..)?;
        let end = tail.iter().position(|&b| b == 0)?;
        Some(String::from_utf8_lossy(&tail[..end]).into_owned())
    }

    fn bytes_of(&self, section: &SectionHeader) -> Option<&[u8]> {
        if section.kind == SHT_NOBITS {
            return None;
        }
        let start = usize::try_from(section.offset).ok()?;
        let end = start.checked_add(usize::try_from(section.size).ok()?)?;
        self.data.get(start..end)
    }

    pub fn class(&self) -> ElfClass {
        self.class
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn machine(&self) -> u16 {
        self.machine
    }

    pub fn sections(&self) -> &[SectionHeader] {
        &self.sections
    }

    pub fn section(&self, name: &str) -> Option<&SectionHeader> {
        self.section_map.get(name).map(|&i| &self.sections[i])
    }

    /// Raw contents of a named section; `None` when absent or truncated.
    pub fn section_bytes(&self, name: &str) -> Option<&[u8]> {
        self.bytes_of(self.section(name)?)
    }

    pub fn debug_sections(&self) -> DebugSections<'_> {
        DebugSections {
            info: self.section_bytes(".debug_info"),
            abbrev: self.section_bytes(".debug_abbrev"),
            loc: self.section_bytes(".debug_loc"),
            line: self.section_bytes(".debug_line"),
            line_str: self.section_bytes(".debug_line_str"),
            str: self.section_bytes(".debug_str"),
            ranges: self.section_bytes(".debug_ranges"),
        }
    }

    pub fn has_debug_info(&self) -> bool {
        self.section_bytes(".debug_info").is_some()
    }

    /// Loads `.symtab`, or `.dynsym` for stripped files.
    pub fn symbol_table(&self) -> Result<SymbolTable> {
        let mut table = SymbolTable::new(self.sections.len());
        let Some(symtab) = self
            .section(".symtab")
            .or_else(|| self.section(".dynsym"))
        else {
            debug!("no symbol table");
            return Ok(table);
        };

        let strings = self
            .sections
            .get(symtab.link as usize)
            .context("symbol table has no string table")?;
        let entsize = match (symtab.entsize, self.class) {
            (0, ElfClass::Elf32) => 16,
            (0, ElfClass::Elf64) => 24,
            (size, _) => size,
        };
        let count = symtab.size / entsize;

        // Entry 0 is reserved.
        for i in 1..count {
            let mut cursor = self.cursor_at(symtab.offset + i * entsize)?;
            let (name_offset, value, size, info, other, shndx) = match self.class {
                ElfClass::Elf32 => {
                    let name = cursor.read_u32()?;
                    let value = u64::from(cursor.read_u32()?);
                    let size = u64::from(cursor.read_u32()?);
                    let info = cursor.read_u8()?;
                    let other = cursor.read_u8()?;
                    (name, value, size, info, other, cursor.read_u16()?)
                }
                ElfClass::Elf64 => {
                    let name = cursor.read_u32()?;
                    let info = cursor.read_u8()?;
                    let other = cursor.read_u8()?;
                    let shndx = cursor.read_u16()?;
                    let value = cursor.read_u64()?;
                    (name, value, cursor.read_u64()?, info, other, shndx)
                }
            };

            let kind = SymbolKind::from_info(info);
            let section_name = self.section_label(shndx);
            let name = match self.string_at(strings, name_offset) {
                Some(name) if !name.is_empty() => name,
                _ if kind == SymbolKind::Section => section_name.clone().unwrap_or_default(),
                _ => continue,
            };

            let mut symbol = Symbol::new(name, value, size, kind);
            symbol.binding = SymbolBinding::from_info(info);
            symbol.visibility = other & 0x3;
            symbol.section_index = shndx;
            symbol.section_name = section_name;
            table.push(symbol);
        }

        debug!("loaded {} symbols from {}", table.len(), symtab.name);
        Ok(table)
    }

    fn section_label(&self, index: u16) -> Option<String> {
        match index {
            SHN_UNDEF => Some("UND".to_string()),
            SHN_ABS => Some("ABS".to_string()),
            SHN_COMMON => Some("COM".to_string()),
            _ => self
                .sections
                .get(index as usize)
                .map(|section| section.name.clone()),
        }
    }
}
