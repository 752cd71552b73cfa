use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use dwarfstack::analysis::{analyse, AnalysisOptions};
use dwarfstack::types::Symbol;

/// Per-symbol source locations and worst-case stack usage of an ELF file.
#[derive(Parser, Debug)]
#[command(name = "dwarfstack", version, about, long_about = None)]
struct Cli {
    /// ELF file to analyse.
    elf: PathBuf,

    /// Directory searched for `.su` and `.cgraph` files. Defaults to the ELF's
    /// directory.
    #[arg(long)]
    stack_dir: Option<PathBuf>,

    /// Skip DWARF source attribution.
    #[arg(long, default_value_t = false)]
    no_debug_info: bool,

    #[arg(long, value_enum, default_value_t = SortKey::Address)]
    sort: SortKey,

    /// Also list symbols without any source or stack information.
    #[arg(long, default_value_t = false)]
    all: bool,

    /// More log output; repeat for more.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SortKey {
    Address,
    Name,
    Stack,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let options = AnalysisOptions {
        elf_path: cli.elf.clone(),
        stack_dir: cli.stack_dir.clone(),
        debug_info: !cli.no_debug_info,
    };
    let analysis = analyse(&options)?;

    let mut rows: Vec<&Symbol> = analysis
        .symbols
        .iter()
        .filter(|symbol| cli.all || symbol.has_metadata())
        .collect();
    match cli.sort {
        SortKey::Address => rows.sort_by_key(|symbol| symbol.value),
        SortKey::Name => rows.sort_by(|a, b| a.display_name().cmp(b.display_name())),
        SortKey::Stack => rows.sort_by_key(|symbol| {
            std::cmp::Reverse(symbol.graph_stack.or(symbol.local_stack).unwrap_or(0))
        }),
    }

    println!(
        "{:>18} {:>8} {:<7} {:<6} {:<10} {:>6} {:>6} {:>5} {:<7} {:<40} NAME",
        "ADDRESS", "SIZE", "TYPE", "BIND", "SECTION", "LOCAL", "GRAPH", "DEPTH", "RECURSE", "SOURCE"
    );
    for symbol in rows {
        println!("{}", format_row(symbol));
    }

    if !analysis.has_debug_info {
        eprintln!("note: no debug information used");
    }
    if !analysis.has_stack_usage {
        eprintln!("note: no stack usage files found");
    } else if !analysis.has_call_graph {
        eprintln!("note: no call graph files found");
    }
    Ok(())
}

fn format_row(symbol: &Symbol) -> String {
    let optional = |value: Option<u64>| value.map_or_else(|| "-".to_string(), |v| v.to_string());
    let source = symbol
        .source
        .as_ref()
        .map_or_else(|| "-".to_string(), ToString::to_string);

    format!(
        "{:#18x} {:>8} {:<7} {:<6} {:<10} {:>6} {:>6} {:>5} {:<7} {:<40} {}",
        symbol.value,
        symbol.size,
        symbol.kind.to_string(),
        symbol.binding.to_string(),
        symbol.section_name.as_deref().unwrap_or("-"),
        optional(symbol.local_stack),
        optional(symbol.graph_stack),
        optional(symbol.stack_depth.map(|depth| depth as u64)),
        symbol.recursion.to_string(),
        source,
        symbol.display_name()
    )
}
