use std::collections::HashMap;
use std::fmt;

pub const SHN_UNDEF: u16 = 0;
pub const SHN_ABS: u16 = 0xfff1;
pub const SHN_COMMON: u16 = 0xfff2;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    #[default]
    NoType,
    Object,
    Func,
    Section,
    File,
    Common,
    Tls,
    Other(u8),
}

impl SymbolKind {
    /// From the low four bits of `st_info`.
    pub fn from_info(info: u8) -> Self {
        match info & 0xf {
            0 => SymbolKind::NoType,
            1 => SymbolKind::Object,
            2 => SymbolKind::Func,
            3 => SymbolKind::Section,
            4 => SymbolKind::File,
            5 => SymbolKind::Common,
            6 => SymbolKind::Tls,
            other => SymbolKind::Other(other),
        }
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolKind::NoType => write!(f, "NOTYPE"),
            SymbolKind::Object => write!(f, "OBJECT"),
            SymbolKind::Func => write!(f, "FUNC"),
            SymbolKind::Section => write!(f, "SECTION"),
            SymbolKind::File => write!(f, "FILE"),
            SymbolKind::Common => write!(f, "COMMON"),
            SymbolKind::Tls => write!(f, "TLS"),
            SymbolKind::Other(value) => write!(f, "<{value}>"),
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum SymbolBinding {
    #[default]
    Local,
    Global,
    Weak,
    Other(u8),
}

impl SymbolBinding {
    /// From the high four bits of `st_info`.
    pub fn from_info(info: u8) -> Self {
        match info >> 4 {
            0 => SymbolBinding::Local,
            1 => SymbolBinding::Global,
            2 => SymbolBinding::Weak,
            other => SymbolBinding::Other(other),
        }
    }
}

impl fmt::Display for SymbolBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolBinding::Local => write!(f, "LOCAL"),
            SymbolBinding::Global => write!(f, "GLOBAL"),
            SymbolBinding::Weak => write!(f, "WEAK"),
            SymbolBinding::Other(value) => write!(f, "<{value}>"),
        }
    }
}

/// How a function takes part in recursion. Ordered by severity; a recorded
/// value only ever moves up.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecursionType {
    #[default]
    NoRecursion,
    ReachesRecursion,
    GraphLoop,
    SelfRecursive,
}

impl RecursionType {
    pub fn escalate(&mut self, candidate: RecursionType) {
        *self = (*self).max(candidate);
    }

    pub fn is_recursive(self) -> bool {
        self != RecursionType::NoRecursion
    }
}

impl fmt::Display for RecursionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RecursionType::NoRecursion => "-",
            RecursionType::ReachesRecursion => "reaches",
            RecursionType::GraphLoop => "loop",
            RecursionType::SelfRecursive => "self",
        };
        f.write_str(text)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceLocation {
    pub path: String,
    pub line: u64,
    pub column: Option<u64>,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.path, self.line)?;
        if let Some(column) = self.column {
            write!(f, ":{column}")?;
        }
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum NameSource {
    #[default]
    Raw,
    Demangler,
    StackUsage,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Symbol {
    /// Name as stored in the string table; possibly mangled.
    pub name: String,
    pub demangled: Option<String>,
    pub name_source: NameSource,
    pub value: u64,
    pub size: u64,
    pub kind: SymbolKind,
    pub binding: SymbolBinding,
    pub visibility: u8,
    pub section_index: u16,
    pub section_name: Option<String>,

    pub source: Option<SourceLocation>,
    pub from_dies: bool,
    pub debug_address: Option<u64>,

    pub local_stack: Option<u64>,
    pub graph_stack: Option<u64>,
    pub stack_depth: Option<usize>,
    pub recursion: RecursionType,
    pub callees: Vec<String>,
}

impl Symbol {
    pub fn new(name: impl Into<String>, value: u64, size: u64, kind: SymbolKind) -> Self {
        Self {
            name: name.into(),
            value,
            size,
            kind,
            ..Default::default()
        }
    }

    pub fn display_name(&self) -> &str {
        self.demangled.as_deref().unwrap_or(&self.name)
    }

    pub fn is_function(&self) -> bool {
        self.kind == SymbolKind::Func
    }

    /// Carries any metadata beyond what the ELF symbol itself holds.
    pub fn has_metadata(&self) -> bool {
        self.source.is_some()
            || self.local_stack.is_some()
            || self.graph_stack.is_some()
            || self.recursion.is_recursive()
    }
}

/// Symbols of one object file, annotated in place by the analysis passes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    section_count: usize,
    by_name: HashMap<String, Vec<usize>>,
}

impl SymbolTable {
    pub fn new(section_count: usize) -> Self {
        Self {
            section_count,
            ..Default::default()
        }
    }

    pub fn push(&mut self, symbol: Symbol) -> usize {
        let index = self.symbols.len();
        self.by_name
            .entry(symbol.name.clone())
            .or_default()
            .push(index);
        self.symbols.push(symbol);
        index
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn section_count(&self) -> usize {
        self.section_count
    }

    /// A regular section of the file, not `UND`, `ABS` or `COM`.
    pub fn section_is_known(&self, index: u16) -> bool {
        index != SHN_UNDEF && (index as usize) < self.section_count
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn get(&self, index: usize) -> Option<&Symbol> {
        self.symbols.get(index)
    }

    /// Names are indexed on insertion; do not rename through this.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Symbol> {
        self.symbols.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Symbol> {
        self.symbols.iter_mut()
    }

    /// Indices of every symbol whose raw name is `name`.
    pub fn indices_by_name(&self, name: &str) -> &[usize] {
        self.by_name.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn by_name(&self, name: &str) -> impl Iterator<Item = &Symbol> {
        self.indices_by_name(name)
            .iter()
            .map(|&index| &self.symbols[index])
    }
}
