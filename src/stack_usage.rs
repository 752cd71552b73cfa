//! GCC `-fstack-usage` reports.
//!
//! Each line reads `path:line:column:function<TAB>bytes<TAB>qualifier`. Only
//! `static` frames are trusted; `dynamic` ones depend on runtime input.

use std::collections::{BTreeSet, HashMap};

use log::{debug, warn};

use crate::demangle::is_mangled;
use crate::types::{NameSource, SymbolTable};
use crate::utils::paths_match;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StackUsage {
    pub stack: u64,
    pub qualifier: String,
    pub path: String,
    pub line: u64,
    pub column: u64,
    /// Extra entries for the same function name.
    pub duplicates: usize,
    /// Symbol names the call graph matched to this entry.
    pub mangled_names: BTreeSet<String>,
}

/// Entries keyed by the function name as the compiler printed it.
pub type StackUsageMap = HashMap<String, StackUsage>;

pub fn parse_su(text: &str) -> StackUsageMap {
    let mut map = StackUsageMap::new();

    for raw in text.lines() {
        let line = raw.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        let Some(entry) = parse_line(line) else {
            debug!("ignoring stack usage line: {line}");
            continue;
        };
        let (name, usage) = entry;

        match map.get_mut(&name) {
            Some(existing) => {
                existing.duplicates += 1;
                if existing.stack != usage.stack {
                    warn!(
                        "{name}: conflicting stack usage {} and {} in {}",
                        existing.stack, usage.stack, usage.path
                    );
                }
                if usage.stack > existing.stack {
                    let duplicates = existing.duplicates;
                    *existing = StackUsage {
                        duplicates,
                        ..usage
                    };
                }
            }
            None => {
                map.insert(name, usage);
            }
        }
    }
    map
}

fn parse_line(line: &str) -> Option<(String, StackUsage)> {
    let mut fields = line.split('\t');
    let location = fields.next()?;
    let stack = fields.next()?.trim().parse::<u64>().ok()?;
    let qualifier = fields.next().unwrap_or_default().trim();
    if qualifier != "static" {
        return None;
    }

    // The directory may contain ':' (drive letters); the name may contain "::".
    let split = location.rfind(['/', '\\']).map_or(0, |i| i + 1);
    let (dir, rest) = location.split_at(split);
    let mut parts = rest.splitn(4, ':');
    let file = parts.next()?;
    let line_no = parts.next()?.parse().ok()?;
    let column = parts.next()?.parse().ok()?;
    let name = parts.next()?;
    if name.is_empty() {
        return None;
    }

    Some((
        name.to_string(),
        StackUsage {
            stack,
            qualifier: qualifier.to_string(),
            path: format!("{dir}{file}"),
            line: line_no,
            column,
            duplicates: 0,
            mangled_names: BTreeSet::new(),
        },
    ))
}

/// Combines the per-file maps. A name reported with different sizes by
/// several files keeps the entry whose path matches the DWARF path of a symbol
/// with that name; without debug info the largest size wins.
pub fn merge_stack_usage(
    maps: impl IntoIterator<Item = StackUsageMap>,
    symbols: &SymbolTable,
    has_debug_info: bool,
) -> StackUsageMap {
    let mut merged = StackUsageMap::new();

    for map in maps {
        for (name, usage) in map {
            let Some(existing) = merged.get_mut(&name) else {
                merged.insert(name, usage);
                continue;
            };

            let mut mangled_names = std::mem::take(&mut existing.mangled_names);
            mangled_names.extend(usage.mangled_names.iter().cloned());

            if existing.stack != usage.stack {
                let replace = if has_debug_info {
                    !declared_in(symbols, &name, &existing.path)
                        && declared_in(symbols, &name, &usage.path)
                } else {
                    usage.stack > existing.stack
                };
                if replace {
                    let duplicates = existing.duplicates;
                    *existing = StackUsage {
                        duplicates,
                        ..usage
                    };
                }
            }
            existing.duplicates += 1;
            existing.mangled_names = mangled_names;
        }
    }
    merged
}

fn declared_in(symbols: &SymbolTable, name: &str, su_path: &str) -> bool {
    symbols.iter().any(|symbol| {
        symbol.display_name() == name
            && symbol
                .source
                .as_ref()
                .is_some_and(|source| paths_match(&source.path, su_path))
    })
}

/// Writes local stack sizes and `.su` names onto the symbols the call graph
/// linked to each entry. Returns how many symbols were updated.
pub fn apply_stack_usage(merged: &StackUsageMap, symbols: &mut SymbolTable) -> usize {
    let mut updated = 0;
    for (name, usage) in merged {
        for mangled in &usage.mangled_names {
            let indices = symbols.indices_by_name(mangled).to_vec();
            for index in indices {
                let Some(symbol) = symbols.get_mut(index) else {
                    continue;
                };
                if is_mangled(mangled) {
                    symbol.demangled = Some(name.clone());
                    symbol.name_source = NameSource::StackUsage;
                }
                if usage.stack > 0 {
                    symbol.local_stack = Some(usage.stack);
                }
                updated += 1;
            }
        }
    }
    updated
}
