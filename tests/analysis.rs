mod common;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use common::{build_elf64, simple_image, TestSymbol};
use dwarfstack::analysis::{analyse, find_stack_files, stack_search_root, AnalysisOptions};
use dwarfstack::types::RecursionType;

const SU: &str = "main.c:3:5:main\t16\tstatic\nmain.c:10:13:helper\t32\tstatic\n";

const CGRAPH: &str = "\
Optimized Symbol table:
main/0 (main) @0x7f0000000010
  Type: function definition analyzed
  Calls: helper/1 (1.00 per call)
helper/1 (helper) @0x7f0000000020
  Type: function definition analyzed
";

fn write_elf(dir: &Path) -> Result<PathBuf> {
    let image = simple_image(
        &[("main", 0x100, 0x40, 3), ("helper", 0x200, 0x20, 10)],
        &[(0x100, 3), (0x200, 10)],
    );
    let bytes = build_elf64(
        &[
            (".debug_info", image.info),
            (".debug_abbrev", image.abbrev),
            (".debug_line", image.line),
        ],
        &[
            TestSymbol::func("main", 0x100, 0x40),
            TestSymbol::func("helper", 0x200, 0x20),
            TestSymbol::object("table", 0x300, 8),
        ],
    );
    let path = dir.join("app.elf");
    fs::write(&path, bytes)?;
    Ok(path)
}

#[test]
fn search_root_rules() {
    assert_eq!(
        stack_search_root(Path::new("/work/build/zephyr/zephyr.elf"), None),
        PathBuf::from("/work/build/")
    );
    assert_eq!(
        stack_search_root(Path::new("/work/out/app.elf"), None),
        PathBuf::from("/work/out")
    );
    assert_eq!(stack_search_root(Path::new("app.elf"), None), PathBuf::from("."));
    assert_eq!(
        stack_search_root(Path::new("zephyr/zephyr.elf"), None),
        PathBuf::from(".")
    );
    assert_eq!(
        stack_search_root(Path::new("/work/build/zephyr/zephyr.elf"), Some(Path::new("/objs"))),
        PathBuf::from("/objs")
    );
}

#[test]
fn pairs_reports_with_their_call_graphs() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let nested = dir.path().join("obj").join("sub");
    fs::create_dir_all(&nested)?;
    fs::write(nested.join("x.c.su"), "")?;
    fs::write(nested.join("x.c.081i.cgraph"), "")?;
    fs::write(dir.path().join("y.c.su"), "")?;
    fs::write(dir.path().join("notes.txt"), "")?;

    let pairs = find_stack_files(dir.path())?;
    assert_eq!(pairs.len(), 2);

    let x = pairs
        .iter()
        .find(|pair| pair.su.ends_with("obj/sub/x.c.su"))
        .context("x.c.su")?;
    assert_eq!(x.cgraph.as_deref(), Some(nested.join("x.c.081i.cgraph").as_path()));

    let y = pairs
        .iter()
        .find(|pair| pair.su.ends_with("y.c.su"))
        .context("y.c.su")?;
    assert!(y.cgraph.is_none());
    Ok(())
}

#[test]
fn full_analysis_combines_every_source() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let elf_path = write_elf(dir.path())?;
    let objects = dir.path().join("CMakeFiles");
    fs::create_dir_all(&objects)?;
    fs::write(objects.join("main.c.su"), SU)?;
    fs::write(objects.join("main.c.000i.cgraph"), CGRAPH)?;

    let analysis = analyse(&AnalysisOptions::new(&elf_path))?;
    assert!(analysis.has_debug_info);
    assert!(analysis.has_stack_usage);
    assert!(analysis.has_call_graph);

    let stats = analysis.match_stats.context("match stats")?;
    assert_eq!(stats.from_dies, 2);

    let symbols = &analysis.symbols;
    let main = symbols.by_name("main").next().context("main")?;
    assert_eq!(main.source.as_ref().map(|s| s.line), Some(3));
    assert_eq!(main.local_stack, Some(16));
    assert_eq!(main.graph_stack, Some(48));
    assert_eq!(main.stack_depth, Some(1));
    assert_eq!(main.recursion, RecursionType::NoRecursion);
    assert_eq!(main.callees, ["helper"]);

    let helper = symbols.by_name("helper").next().context("helper")?;
    assert_eq!(helper.source.as_ref().map(|s| s.line), Some(10));
    assert_eq!(helper.graph_stack, Some(32));

    let table = symbols.by_name("table").next().context("table")?;
    assert_eq!(table.local_stack, None);
    Ok(())
}

#[test]
fn debug_info_can_be_disabled() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let elf_path = write_elf(dir.path())?;

    let mut options = AnalysisOptions::new(&elf_path);
    options.debug_info = false;
    let analysis = analyse(&options)?;

    assert!(!analysis.has_debug_info);
    assert!(analysis.match_stats.is_none());
    assert!(!analysis.has_stack_usage);
    assert!(analysis.symbols.iter().all(|symbol| symbol.source.is_none()));
    Ok(())
}

#[test]
fn missing_file_is_an_error() {
    let options = AnalysisOptions::new("/nonexistent/dir/app.elf");
    assert!(analyse(&options).is_err());
}
