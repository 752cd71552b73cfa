//! End-to-end driver: ELF symbols, DWARF attribution, then the compiler's
//! stack-usage and call-graph reports found next to the build output.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Instant;

use anyhow::{Context, Result};
use log::{debug, info, warn};

use crate::callgraph::CallGraph;
use crate::demangle::demangle_symbols;
use crate::dwarf::{Dwarf, MatchStats};
use crate::elf::Elf;
use crate::stack_usage::{apply_stack_usage, merge_stack_usage, parse_su, StackUsageMap};
use crate::types::SymbolTable;

#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    pub elf_path: PathBuf,
    /// Where to look for `.su` and `.cgraph` files. Defaults to the ELF's
    /// directory.
    pub stack_dir: Option<PathBuf>,
    pub debug_info: bool,
}

impl AnalysisOptions {
    pub fn new(elf_path: impl Into<PathBuf>) -> Self {
        Self {
            elf_path: elf_path.into(),
            stack_dir: None,
            debug_info: true,
        }
    }
}

/// A stack-usage report and the call graph dumped for the same source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFilePair {
    pub su: PathBuf,
    pub cgraph: Option<PathBuf>,
}

pub struct Analysis {
    pub symbols: SymbolTable,
    pub match_stats: Option<MatchStats>,
    pub has_debug_info: bool,
    pub has_stack_usage: bool,
    pub has_call_graph: bool,
}

/// Directory searched for stack files. Zephyr builds put the ELF under
/// `<build>/zephyr/` while object files live all over `<build>`, so the search
/// starts before the last `zephyr` in the path.
pub fn stack_search_root(elf_path: &Path, stack_dir: Option<&Path>) -> PathBuf {
    if let Some(dir) = stack_dir {
        return dir.to_path_buf();
    }
    let dir = match elf_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let text = dir.to_string_lossy();
    match text.rfind("zephyr") {
        Some(0) => PathBuf::from("."),
        Some(at) => PathBuf::from(&text[..at]),
        None => dir,
    }
}

pub fn find_stack_files(root: &Path) -> Result<Vec<StackFilePair>> {
    let mut su_files = Vec::new();
    let mut graph_files = Vec::new();
    collect_files(root, &mut su_files, &mut graph_files)?;
    su_files.sort();
    graph_files.sort();

    let pairs = su_files
        .into_iter()
        .map(|su| {
            let text = su.to_string_lossy();
            // "foo.c.su" -> "foo.c."
            let prefix = &text[..text.len() - "su".len()];
            let cgraph = graph_files
                .iter()
                .find(|graph| graph.to_string_lossy().starts_with(prefix))
                .cloned();
            if cgraph.is_none() {
                warn!("no call graph for {}", su.display());
            }
            StackFilePair { su, cgraph }
        })
        .collect::<Vec<_>>();

    debug!("found {} stack usage files under {}", pairs.len(), root.display());
    Ok(pairs)
}

fn collect_files(dir: &Path, su: &mut Vec<PathBuf>, graphs: &mut Vec<PathBuf>) -> Result<()> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("reading directory {}", dir.display()))?;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let kind = entry.file_type()?;
        if kind.is_dir() {
            collect_files(&path, su, graphs)?;
        } else if kind.is_file() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.ends_with(".su") {
                su.push(path);
            } else if name.ends_with(".cgraph") {
                graphs.push(path);
            }
        }
    }
    Ok(())
}

/// Stack data of one source file, with graph nodes already matched to the
/// file's `.su` entries.
#[derive(Debug, Default)]
pub struct FileStackData {
    pub stack_usage: StackUsageMap,
    pub graph: Option<CallGraph>,
}

pub fn analyse_stack_file(pair: &StackFilePair) -> Result<FileStackData> {
    let text = fs::read_to_string(&pair.su)
        .with_context(|| format!("reading {}", pair.su.display()))?;
    let mut stack_usage = parse_su(&text);

    let graph = match &pair.cgraph {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let mut graph = CallGraph::parse(&text)
                .with_context(|| format!("parsing {}", path.display()))?;
            graph.compute(&mut stack_usage);
            graph.print_nodes();
            Some(graph)
        }
        None => None,
    };

    Ok(FileStackData { stack_usage, graph })
}

/// Processes every pair on scoped worker threads. Failed files are logged and
/// left out; the order of the results follows `pairs`.
pub fn analyse_stack_files(pairs: &[StackFilePair]) -> Vec<FileStackData> {
    if pairs.is_empty() {
        return Vec::new();
    }
    let workers = thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let chunk_size = pairs.len().div_ceil(workers);

    let run = |chunk: &[StackFilePair]| -> Vec<FileStackData> {
        chunk
            .iter()
            .filter_map(|pair| match analyse_stack_file(pair) {
                Ok(data) => Some(data),
                Err(err) => {
                    warn!("skipping {}: {err:#}", pair.su.display());
                    None
                }
            })
            .collect()
    };

    thread::scope(|scope| {
        let handles: Vec<_> = pairs
            .chunks(chunk_size)
            .map(|chunk| (chunk.len(), scope.spawn(move || run(chunk))))
            .collect();
        handles
            .into_iter()
            .flat_map(|(files, handle)| {
                handle.join().unwrap_or_else(|_| {
                    warn!("stack file worker panicked, {files} files lost");
                    Vec::new()
                })
            })
            .collect()
    })
}

pub fn analyse(options: &AnalysisOptions) -> Result<Analysis> {
    let started = Instant::now();
    let elf = Elf::open(&options.elf_path)?;
    let mut symbols = elf.symbol_table()?;
    let demangled = demangle_symbols(&mut symbols);
    debug!("{} symbols, {} demangled", symbols.len(), demangled);

    let has_debug_info = options.debug_info && elf.has_debug_info();
    let match_stats = if has_debug_info {
        match Dwarf::new(elf.debug_sections(), elf.byte_order()) {
            Ok(dwarf) => Some(dwarf.match_debug_info(&mut symbols)),
            Err(err) => {
                warn!("skipping debug info: {err}");
                None
            }
        }
    } else {
        None
    };
    debug!("symbols and debug info loaded in {:?}", started.elapsed());

    let root = stack_search_root(&options.elf_path, options.stack_dir.as_deref());
    let pairs = match find_stack_files(&root) {
        Ok(pairs) => pairs,
        Err(err) => {
            warn!("no stack files: {err:#}");
            Vec::new()
        }
    };
    let results = analyse_stack_files(&pairs);

    let has_stack_usage = !results.is_empty();
    let mut graphs = Vec::new();
    let mut maps = Vec::new();
    for data in results {
        maps.push(data.stack_usage);
        if let Some(graph) = data.graph {
            graphs.push(graph);
        }
    }
    let has_call_graph = !graphs.is_empty();

    let merged = merge_stack_usage(maps, &symbols, match_stats.is_some());
    let applied = apply_stack_usage(&merged, &mut symbols);
    let mut updated = 0;
    for graph in &graphs {
        updated += graph.merge_into(&mut symbols);
    }
    info!(
        "stack data: {} entries, {} symbols sized, {} updated from {} call graphs",
        merged.len(),
        applied,
        updated,
        graphs.len()
    );
    debug!("analysis finished in {:?}", started.elapsed());

    Ok(Analysis {
        symbols,
        match_stats,
        has_debug_info: match_stats.is_some(),
        has_stack_usage,
        has_call_graph,
    })
}
