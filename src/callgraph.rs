//! Call graphs from GCC `-fdump-ipa-cgraph` dumps and worst-case stack
//! analysis over them.
//!
//! Only the "Optimized Symbol table" section of a dump is read. A node line
//! looks like
//!
//! ```text
//! _Z3foov/12 (foo()) @0x7f0a2c1d2e00
//!   Type: function definition analyzed
//!   Calls: _Z3barv/13 (inlined) (1.00 per call) printf/4 (1.00 per call)
//! ```

use std::collections::{BTreeSet, HashMap};
use std::fmt::Write as _;

use anyhow::{Context, Result};
use log::{debug, error, warn};

use crate::stack_usage::StackUsageMap;
use crate::types::{RecursionType, SymbolTable};

const TABLE_START: &str = "Optimized Symbol table:";
const TABLE_END: &str = "Materializing clones";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GraphCall {
    pub name: String,
    pub symbol_nr: u64,
    pub inlined: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GraphNode {
    pub name: String,
    pub mangled_name: String,
    pub symbol_nr: u64,
    pub address: String,
    pub node_type: String,
    pub local_stack: u64,
    /// Worst cumulative stack of any call chain starting here.
    pub graph_stack: u64,
    /// Functions below this one on the worst chain.
    pub depth: usize,
    pub calls: Vec<GraphCall>,
    /// Resolved targets of `calls`, self-calls excluded.
    pub callees: Vec<usize>,
    pub recursion: RecursionType,
}

/// Call graph of one translation unit.
#[derive(Clone, Debug, Default)]
pub struct CallGraph {
    nodes: Vec<GraphNode>,
    by_symbol: HashMap<u64, usize>,
}

impl CallGraph {
    pub fn parse(text: &str) -> Result<Self> {
        let mut graph = CallGraph::default();
        let mut in_table = false;
        let mut current: Option<usize> = None;

        for raw in text.lines() {
            let line = raw.trim_end_matches('\r');
            if !in_table {
                in_table = line.starts_with(TABLE_START);
                continue;
            }
            if line.starts_with(TABLE_END) {
                break;
            }

            if let Some(rest) = line.strip_prefix("  Calls: ") {
                if let Some(index) = current {
                    graph.nodes[index].calls.extend(parse_calls(rest));
                }
                continue;
            }
            if let Some(rest) = line.strip_prefix("  Type: ") {
                if let Some(index) = current {
                    graph.nodes[index].node_type = rest.trim().to_string();
                }
                continue;
            }
            if line.starts_with(char::is_whitespace) {
                continue;
            }

            match parse_node_line(line) {
                Some((mangled_name, symbol_nr, name, address)) => {
                    let node = GraphNode {
                        mangled_name: mangled_name.to_string(),
                        symbol_nr: symbol_nr.parse().context("symbol number")?,
                        name: name.to_string(),
                        address: address.to_string(),
                        ..Default::default()
                    };
                    current = Some(graph.add_node(node));
                }
                // Anything else of substance means the table is over.
                None if line.len() > 2 => break,
                None => {}
            }
        }

        debug!("parsed call graph with {} nodes", graph.nodes.len());
        Ok(graph)
    }

    pub fn add_node(&mut self, node: GraphNode) -> usize {
        let index = self.nodes.len();
        if let Some(&existing) = self.by_symbol.get(&node.symbol_nr) {
            error!(
                "symbol number {} used by both {} and {}",
                node.symbol_nr, self.nodes[existing].mangled_name, node.mangled_name
            );
        } else {
            self.by_symbol.insert(node.symbol_nr, index);
        }
        self.nodes.push(node);
        index
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn node_by_symbol(&self, symbol_nr: u64) -> Option<&GraphNode> {
        self.by_symbol.get(&symbol_nr).map(|&index| &self.nodes[index])
    }

    pub fn node_by_name(&self, mangled_name: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|node| node.mangled_name == mangled_name)
    }

    /// Resolves calls, takes local stack sizes from `stack_usage` and computes
    /// the worst-case stack and recursion class of every node. Matched entries
    /// of `stack_usage` learn the mangled names of their nodes.
    pub fn compute(&mut self, stack_usage: &mut StackUsageMap) {
        for index in 0..self.nodes.len() {
            let node = &mut self.nodes[index];
            match stack_usage.get_mut(&node.name) {
                Some(usage) => {
                    node.local_stack = node.local_stack.max(usage.stack);
                    usage.mangled_names.insert(node.mangled_name.clone());
                }
                None => debug!("{}: no stack usage entry", node.name),
            }

            let mut callees = Vec::new();
            let mut recursion = node.recursion;
            for call in &node.calls {
                match self.by_symbol.get(&call.symbol_nr) {
                    Some(&target) if target == index => {
                        recursion.escalate(RecursionType::SelfRecursive);
                    }
                    Some(&target) => {
                        if !callees.contains(&target) {
                            callees.push(target);
                        }
                    }
                    None => warn!(
                        "{}: call to unknown symbol {}/{}",
                        node.mangled_name, call.name, call.symbol_nr
                    ),
                }
            }
            node.callees = callees;
            node.recursion = recursion;
        }

        let mut walker = Walker::new(&self.nodes);
        let reports: Vec<BranchReport> = (0..self.nodes.len())
            .map(|index| walker.analyse(index))
            .collect();

        for (index, report) in reports.iter().enumerate() {
            let node = &mut self.nodes[index];
            node.graph_stack = report.stack;
            node.depth = report.frames.saturating_sub(1);
            if !report.recursion_points.is_empty() {
                node.recursion.escalate(RecursionType::ReachesRecursion);
            }
        }
        for report in &reports {
            for &point in &report.recursion_points {
                self.nodes[point]
                    .recursion
                    .escalate(RecursionType::GraphLoop);
            }
        }
    }

    /// Merges results into `symbols` by mangled name. Recursion only escalates
    /// and stack figures are replaced only by a larger worst case, so merging
    /// the same graph twice changes nothing the second time.
    pub fn merge_into(&self, symbols: &mut SymbolTable) -> usize {
        let mut changed = 0;
        for node in &self.nodes {
            if node.graph_stack == 0 && !node.recursion.is_recursive() {
                continue;
            }
            let callee_names: Vec<&str> = node
                .callees
                .iter()
                .map(|&callee| self.nodes[callee].mangled_name.as_str())
                .collect();

            let indices = symbols.indices_by_name(&node.mangled_name).to_vec();
            for index in indices {
                let Some(symbol) = symbols.get_mut(index) else {
                    continue;
                };
                let before = (symbol.recursion, symbol.graph_stack, symbol.callees.len());

                symbol.recursion.escalate(node.recursion);
                if symbol.graph_stack.map_or(true, |stack| node.graph_stack > stack) {
                    symbol.graph_stack = Some(node.graph_stack);
                    symbol.stack_depth = Some(node.depth);
                    if node.local_stack > 0 {
                        symbol.local_stack = Some(node.local_stack);
                    }
                }
                for name in &callee_names {
                    if !symbol.callees.iter().any(|known| known == name) {
                        symbol.callees.push(name.to_string());
                    }
                }

                if before != (symbol.recursion, symbol.graph_stack, symbol.callees.len()) {
                    changed += 1;
                }
            }
        }
        changed
    }

    /// Text rendering of the call tree below `mangled_name`. Recursion points
    /// are marked `(STOP)`.
    pub fn render_tree(&self, mangled_name: &str) -> Option<String> {
        let root = self
            .nodes
            .iter()
            .position(|node| node.mangled_name == mangled_name)?;
        let mut out = String::new();
        let mut on_path = vec![false; self.nodes.len()];
        self.render_node(root, 0, &mut on_path, &mut out);
        Some(out)
    }

    fn render_node(&self, index: usize, indent: usize, on_path: &mut [bool], out: &mut String) {
        let node = &self.nodes[index];
        if on_path[index] {
            let _ = writeln!(out, "{:indent$}{} (STOP)", "", node.name);
            return;
        }
        let _ = writeln!(
            out,
            "{:indent$}{} local={} graph={}",
            "", node.name, node.local_stack, node.graph_stack
        );
        on_path[index] = true;
        for &callee in &node.callees {
            self.render_node(callee, indent + 2, on_path, out);
        }
        on_path[index] = false;
    }

    pub fn print_nodes(&self) {
        if !log::log_enabled!(log::Level::Debug) {
            return;
        }
        for node in &self.nodes {
            if let Some(tree) = self.render_tree(&node.mangled_name) {
                debug!("call tree:\n{tree}");
            }
        }
    }
}

/// Splits `mangled/nr` into its parts; the number must be all digits.
fn split_symbol(token: &str) -> Option<(&str, &str)> {
    let (name, number) = token.rsplit_once('/')?;
    if name.is_empty() || number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((name, number))
}

/// `mangled/nr (name) address`. The name may hold spaces and parentheses, so
/// it runs up to the last `") "`.
fn parse_node_line(line: &str) -> Option<(&str, &str, &str, &str)> {
    let (symbol, rest) = line.split_once(' ')?;
    let (mangled_name, symbol_nr) = split_symbol(symbol)?;
    let rest = rest.strip_prefix('(')?;
    let close = rest.rfind(") ")?;
    let name = &rest[..close];
    let address = rest[close + 2..].split_whitespace().next()?;
    if name.is_empty() {
        return None;
    }
    Some((mangled_name, symbol_nr, name, address))
}

/// Calls are `mangled/nr` tokens, each followed by parenthesised notes such as
/// `(inlined)` or `(1.00 per call)`.
fn parse_calls(text: &str) -> Vec<GraphCall> {
    let mut calls: Vec<GraphCall> = Vec::new();
    let mut rest = text.trim_start();

    while !rest.is_empty() {
        if rest.starts_with('(') {
            let mut depth = 0usize;
            let mut end = rest.len();
            for (i, c) in rest.char_indices() {
                match c {
                    '(' => depth += 1,
                    ')' => {
                        depth -= 1;
                        if depth == 0 {
                            end = i + 1;
                            break;
                        }
                    }
                    _ => {}
                }
            }
            if &rest[..end] == "(inlined)" {
                if let Some(last) = calls.last_mut() {
                    last.inlined = true;
                }
            }
            rest = rest[end..].trim_start();
            continue;
        }

        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        let token = &rest[..end];
        match split_symbol(token).and_then(|(name, nr)| Some((name, nr.parse().ok()?))) {
            Some((name, symbol_nr)) => calls.push(GraphCall {
                name: name.to_string(),
                symbol_nr,
                inlined: false,
            }),
            None => debug!("ignoring call token {token}"),
        }
        rest = rest[end..].trim_start();
    }
    calls
}

/// Worst branch found below one node.
#[derive(Clone, Debug, Default)]
struct BranchReport {
    stack: u64,
    /// Functions on the branch, the start node included.
    frames: usize,
    /// Nodes reached again while already on the branch.
    recursion_points: BTreeSet<usize>,
}

/// Depth-first search with explicit backtracking: a node is marked on entry
/// and unmarked on exit, so sibling branches never see each other's marks.
struct Walker<'g> {
    nodes: &'g [GraphNode],
    on_path: Vec<bool>,
    /// Results of subtrees that reached no recursion; those do not depend on
    /// the path leading to them.
    settled: Vec<Option<(u64, usize)>>,
}

impl<'g> Walker<'g> {
    fn new(nodes: &'g [GraphNode]) -> Self {
        Self {
            nodes,
            on_path: vec![false; nodes.len()],
            settled: vec![None; nodes.len()],
        }
    }

    fn analyse(&mut self, root: usize) -> BranchReport {
        let mut recursion_points = BTreeSet::new();
        let (stack, frames) = self.walk(root, &mut recursion_points);
        BranchReport {
            stack,
            frames,
            recursion_points,
        }
    }

    fn walk(&mut self, index: usize, recursion_points: &mut BTreeSet<usize>) -> (u64, usize) {
        if self.on_path[index] {
            recursion_points.insert(index);
            return (0, 0);
        }
        if let Some(result) = self.settled[index] {
            return result;
        }

        let hits_before = recursion_points.len();
        let mut loop_found = false;
        // A self-call is not kept as an edge, so it is recorded here.
        if self.nodes[index].recursion == RecursionType::SelfRecursive {
            recursion_points.insert(index);
        }
        self.on_path[index] = true;

        let mut best = (0u64, 0usize);
        for &callee in &self.nodes[index].callees {
            let mut branch_points = BTreeSet::new();
            let result = self.walk(callee, &mut branch_points);
            loop_found |= !branch_points.is_empty();
            recursion_points.extend(branch_points);
            if result.0 > best.0 || (result.0 == best.0 && result.1 > best.1) {
                best = result;
            }
        }

        self.on_path[index] = false;
        let result = (self.nodes[index].local_stack + best.0, best.1 + 1);
        if !loop_found && recursion_points.len() == hits_before {
            self.settled[index] = Some(result);
        }
        result
    }
}
