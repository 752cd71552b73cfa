use cpp_demangle::{DemangleOptions, Symbol as CppSymbol};
use rustc_demangle::try_demangle;

use crate::types::{NameSource, SymbolTable};

/// Itanium C++ (`_Z`, `__Z` on Mach-O) or Rust v0 (`_R`) mangling.
pub fn is_mangled(name: &str) -> bool {
    name.starts_with("_Z") || name.starts_with("__Z") || name.starts_with("_R")
}

/// Demangles one symbol name, keeping version (`@@GLIBC_2.2.5`) and clone
/// (`.constprop.0`) suffixes verbatim after the demangled base.
pub fn demangle(name: &str) -> Option<String> {
    if !is_mangled(name) {
        return None;
    }

    let (base, suffix) = split_suffix(name);

    if base.starts_with("_R") {
        let demangled = try_demangle(base).ok()?;
        return Some(format!("{demangled:#}{suffix}"));
    }

    let itanium = base.strip_prefix('_').filter(|b| b.starts_with("_Z")).unwrap_or(base);
    if let Ok(symbol) = CppSymbol::new(itanium) {
        if let Ok(demangled) = symbol.demangle(&DemangleOptions::default()) {
            return Some(format!("{demangled}{suffix}"));
        }
    }

    // Legacy Rust symbols use the `_ZN...E` shape too.
    let demangled = try_demangle(name).ok()?;
    Some(format!("{demangled:#}"))
}

fn split_suffix(name: &str) -> (&str, &str) {
    let version = name.find("@@").unwrap_or(name.len());
    let clone = name[..version].find('.').unwrap_or(version);
    name.split_at(clone)
}

/// Fills in the demangled name of every mangled symbol.
pub fn demangle_symbols(symbols: &mut SymbolTable) -> usize {
    let mut count = 0;
    for symbol in symbols.iter_mut() {
        if symbol.demangled.is_some() {
            continue;
        }
        if let Some(demangled) = demangle(&symbol.name) {
            symbol.demangled = Some(demangled);
            symbol.name_source = NameSource::Demangler;
            count += 1;
        }
    }
    count
}
