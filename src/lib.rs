//! Source attribution and worst-case stack analysis for ELF files, from DWARF
//! debug information and GCC's `-fstack-usage` / `-fdump-ipa-cgraph` output.

pub mod analysis;
pub mod callgraph;
pub mod demangle;
pub mod dwarf;
pub mod elf;
pub mod error;
pub mod stack_usage;
pub mod types;
pub mod utils;
