/*
 ═══════════════════════════════════════════════════════════════════════════════
  SENTINEL SHIELD - Taint Engine (C6)

  Computes a sound-biased reaching-taint dataflow over the CFG (§4.6): a
  pointwise-union fixpoint over per-block abstract state (stack taint bits,
  one memory bit, a storage-slot bitset) locates every SSTORE that writes a
  tainted value into a key variable's slot, then a separate bounded BFS/DFS
  enumerates the literal block-start paths from each taint-source block to
  that sink so the Guard Classifier gets per-path evidence instead of a
  collapsed join-point fact.
 ═══════════════════════════════════════════════════════════════════════════════
*/

use std::collections::{BTreeSet, HashMap, HashSet};

use indexmap::IndexMap;

use crate::cfg::{BasicBlock, Cfg};
use crate::disassembler::Instruction;
use crate::opcode::Opcode;

/// "64 is sufficient in practice" (§4.6).
const MAX_STACK_DEPTH: usize = 64;
const MAX_PATH_LENGTH: usize = 50;
const MAX_VISITS_PER_BLOCK: usize = 2;
const MAX_PATHS_PER_SINK: usize = 256;
const SLOT_RESOLUTION_WINDOW: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockTaintState {
    pub stack: Vec<bool>,
    pub memory: bool,
    pub storage: BTreeSet<usize>,
}

impl BlockTaintState {
    fn union(&self, other: &Self) -> Self {
        BlockTaintState {
            stack: union_stack(&self.stack, &other.stack),
            memory: self.memory || other.memory,
            storage: self.storage.union(&other.storage).copied().collect(),
        }
    }
}

fn union_stack(a: &[bool], b: &[bool]) -> Vec<bool> {
    let (longer, shorter) = if a.len() >= b.len() { (a, b) } else { (b, a) };
    let offset = longer.len() - shorter.len();
    let mut result = longer.to_vec();
    for (i, t) in shorter.iter().enumerate() {
        result[offset + i] |= *t;
    }
    result
}

#[derive(Debug, Clone)]
struct SinkEvent {
    block_start: usize,
    instr_offset: usize,
    slot: Option<usize>,
}

/// A tainted-reaching path from a source block to a sink SSTORE (§4.6).
#[derive(Debug, Clone)]
pub struct TaintPath {
    pub blocks: Vec<usize>,
    pub sink_offset: usize,
    pub slot: Option<usize>,
    /// Set when a §4.6 bound (path length, visits, or path count) truncated
    /// the search for this sink (§7 path-bound-hit).
    pub incomplete: bool,
}

enum PushKind {
    None,
    Untainted,
    AlwaysTainted,
    TaintedIfAnyPopped,
    FromMemory,
}

pub struct TaintEngine;

impl TaintEngine {
    /// Run the full C6 pipeline: fixpoint, sink discovery restricted to
    /// `key_slots`, then bounded path enumeration per sink.
    pub fn analyze(cfg: &Cfg, key_slots: &HashSet<usize>) -> Vec<TaintPath> {
        let in_states = Self::fixpoint(cfg);
        let sinks = Self::find_sinks(cfg, &in_states, key_slots);
        let sources = Self::find_source_blocks(cfg);

        let mut paths = Vec::new();
        for sink in &sinks {
            paths.extend(Self::enumerate_paths(cfg, &sources, sink));
        }
        tracing::debug!(
            sink_count = sinks.len(),
            path_count = paths.len(),
            "taint analysis complete"
        );
        paths
    }

    fn predecessors(cfg: &Cfg) -> IndexMap<usize, Vec<usize>> {
        let mut preds: IndexMap<usize, Vec<usize>> = cfg.blocks.keys().map(|&s| (s, Vec::new())).collect();
        for (&start, succs) in &cfg.successors {
            for &succ in succs {
                preds.entry(succ).or_default().push(start);
            }
        }
        preds
    }

    fn merge_inputs(
        start: usize,
        preds: &IndexMap<usize, Vec<usize>>,
        out_states: &IndexMap<usize, BlockTaintState>,
    ) -> BlockTaintState {
        let mut acc = BlockTaintState::default();
        if let Some(ps) = preds.get(&start) {
            for p in ps {
                acc = acc.union(&out_states[p]);
            }
        }
        acc
    }

    /// Iterative worklist fixpoint over the pointwise-union lattice (§4.6
    /// "Merge rule at joins").
    fn fixpoint(cfg: &Cfg) -> IndexMap<usize, BlockTaintState> {
        let preds = Self::predecessors(cfg);
        let mut out_states: IndexMap<usize, BlockTaintState> =
            cfg.blocks.keys().map(|&s| (s, BlockTaintState::default())).collect();
        let mut worklist: std::collections::VecDeque<usize> = cfg.blocks.keys().copied().collect();
        let mut queued: HashSet<usize> = worklist.iter().copied().collect();
        let mut scratch = Vec::new();

        while let Some(start) = worklist.pop_front() {
            queued.remove(&start);
            let in_state = Self::merge_inputs(start, &preds, &out_states);
            let block = &cfg.blocks[&start];
            scratch.clear();
            let new_out = Self::simulate(block, &in_state, &mut scratch);
            if new_out != out_states[&start] {
                out_states.insert(start, new_out);
                for succ in cfg.successors_of(start) {
                    if queued.insert(succ) {
                        worklist.push_back(succ);
                    }
                }
            }
        }

        cfg.blocks
            .keys()
            .map(|&s| (s, Self::merge_inputs(s, &preds, &out_states)))
            .collect()
    }

    fn find_sinks(
        cfg: &Cfg,
        in_states: &IndexMap<usize, BlockTaintState>,
        key_slots: &HashSet<usize>,
    ) -> Vec<SinkEvent> {
        let mut sinks = Vec::new();
        for (start, block) in &cfg.blocks {
            let mut local = Vec::new();
            let _ = Self::simulate(block, &in_states[start], &mut local);
            for event in local {
                if let Some(slot) = event.slot {
                    if key_slots.contains(&slot) {
                        sinks.push(event);
                    }
                }
            }
        }
        sinks.sort_by_key(|s| (s.block_start, s.instr_offset));
        sinks
    }

    fn find_source_blocks(cfg: &Cfg) -> Vec<usize> {
        cfg.blocks
            .iter()
            .filter(|(_, b)| b.instructions.iter().any(|i| i.opcode.is_taint_source()))
            .map(|(&start, _)| start)
            .collect()
    }

    /// Bounded BFS/DFS path enumeration per §4.6. Not the fixpoint itself -
    /// the fixpoint already proved this sink reaches tainted data; this just
    /// recovers literal block sequences for per-path guard evidence.
    fn enumerate_paths(cfg: &Cfg, sources: &[usize], sink: &SinkEvent) -> Vec<TaintPath> {
        let mut block_paths: Vec<Vec<usize>> = Vec::new();
        let mut truncated = false;

        for &src in sources {
            if block_paths.len() >= MAX_PATHS_PER_SINK {
                truncated = true;
                break;
            }
            let mut visits: HashMap<usize, usize> = HashMap::new();
            let mut path = Vec::new();
            dfs(
                cfg,
                src,
                sink.block_start,
                &mut path,
                &mut visits,
                &mut block_paths,
                &mut truncated,
            );
        }

        block_paths
            .into_iter()
            .map(|blocks| TaintPath {
                blocks,
                sink_offset: sink.instr_offset,
                slot: sink.slot,
                incomplete: truncated,
            })
            .collect()
    }

    /// Simulate one block's instructions against `in_state`, returning the
    /// outgoing abstract state and recording any tainted SSTORE as a sink
    /// candidate (slot resolution best-effort, per §4.3-style backward scan).
    fn simulate(block: &BasicBlock, in_state: &BlockTaintState, sinks_out: &mut Vec<SinkEvent>) -> BlockTaintState {
        let mut stack = in_state.stack.clone();
        let mut memory = in_state.memory;
        let mut storage = in_state.storage.clone();
        let instrs = &block.instructions;

        for (idx, instr) in instrs.iter().enumerate() {
            match instr.opcode {
                Opcode::Dup(n) => {
                    let n = n as usize;
                    let t = if n <= stack.len() { stack[stack.len() - n] } else { false };
                    push(&mut stack, t);
                }
                Opcode::Swap(n) => {
                    let n = n as usize;
                    let len = stack.len();
                    if len >= n + 1 {
                        stack.swap(len - 1, len - 1 - n);
                    }
                }
                Opcode::MStore | Opcode::MStore8 => {
                    let v = pop(&mut stack);
                    let _offset = pop(&mut stack);
                    if v {
                        memory = true;
                    }
                }
                Opcode::SLoad => {
                    let slot = resolve_slot_operand(instrs, idx);
                    let _key = pop(&mut stack);
                    let tainted = match slot {
                        Some(s) => storage.contains(&s),
                        None => !storage.is_empty(),
                    };
                    push(&mut stack, tainted);
                }
                Opcode::SStore => {
                    let slot = resolve_slot_operand(instrs, idx);
                    let _key = pop(&mut stack);
                    let value_tainted = pop(&mut stack);
                    if value_tainted {
                        storage.insert(slot.unwrap_or(usize::MAX));
                        sinks_out.push(SinkEvent {
                            block_start: block.start_offset,
                            instr_offset: instr.offset,
                            slot,
                        });
                    }
                }
                Opcode::CallDataCopy => {
                    for _ in 0..3 {
                        pop(&mut stack);
                    }
                    memory = true;
                }
                _ => {
                    let (pops, kind) = stack_effect(&instr.opcode);
                    let mut any_tainted = false;
                    for _ in 0..pops {
                        if pop(&mut stack) {
                            any_tainted = true;
                        }
                    }
                    match kind {
                        PushKind::None => {}
                        PushKind::Untainted => push(&mut stack, false),
                        PushKind::AlwaysTainted => push(&mut stack, true),
                        PushKind::TaintedIfAnyPopped => push(&mut stack, any_tainted),
                        PushKind::FromMemory => push(&mut stack, memory),
                    }
                }
            }
        }

        BlockTaintState { stack, memory, storage }
    }
}

fn dfs(
    cfg: &Cfg,
    current: usize,
    target: usize,
    path: &mut Vec<usize>,
    visits: &mut HashMap<usize, usize>,
    results: &mut Vec<Vec<usize>>,
    truncated: &mut bool,
) {
    if results.len() >= MAX_PATHS_PER_SINK {
        *truncated = true;
        return;
    }
    if path.len() >= MAX_PATH_LENGTH {
        *truncated = true;
        return;
    }
    let visit_count = visits.entry(current).or_insert(0);
    *visit_count += 1;
    if *visit_count > MAX_VISITS_PER_BLOCK {
        *visits.get_mut(&current).unwrap() -= 1;
        return;
    }

    path.push(current);
    if current == target {
        results.push(path.clone());
    } else {
        for succ in cfg.successors_of(current) {
            dfs(cfg, succ, target, path, visits, results, truncated);
            if results.len() >= MAX_PATHS_PER_SINK {
                break;
            }
        }
    }
    path.pop();
    *visits.get_mut(&current).unwrap() -= 1;
}

fn pop(stack: &mut Vec<bool>) -> bool {
    stack.pop().unwrap_or(false)
}

fn push(stack: &mut Vec<bool>, tainted: bool) {
    if stack.len() >= MAX_STACK_DEPTH {
        stack.remove(0);
    }
    stack.push(tainted);
}

/// Backward scan for the literal operand feeding SLOAD/SSTORE's top-of-stack
/// slot argument - same window and blocking-opcode rule as §4.3's jump
/// target resolution, reused here for slot numbers instead of offsets.
fn resolve_slot_operand(instrs: &[Instruction], idx: usize) -> Option<usize> {
    let window_start = idx.saturating_sub(SLOT_RESOLUTION_WINDOW);
    for instr in instrs[window_start..idx].iter().rev() {
        if let Opcode::Push(_) = instr.opcode {
            return instr.push_as_offset();
        }
        if instr.opcode.blocks_static_resolution() {
            return None;
        }
    }
    None
}

fn stack_effect(op: &Opcode) -> (usize, PushKind) {
    use Opcode::*;
    match op {
        Stop | Return | Revert | SelfDestruct | Invalid | JumpDest | Unassigned(_) => (0, PushKind::None),
        Add | Sub | Mul | Div | Sdiv | Mod | Smod | Exp | SignExtend | Lt | Gt | Slt | Sgt | Eq | And | Or | Xor
        | Byte | Shl | Shr | Sar | Sha3 => (2, PushKind::TaintedIfAnyPopped),
        Addmod | Mulmod => (3, PushKind::TaintedIfAnyPopped),
        IsZero | Not => (1, PushKind::TaintedIfAnyPopped),
        Balance | ExtCodeSize | ExtCodeHash | BlockHash => (1, PushKind::TaintedIfAnyPopped),
        Address | CodeSize | ReturnDataSize | Coinbase | Timestamp | Number | Difficulty | GasLimit | ChainId
        | SelfBalance | BaseFee | Pc | MSize | Gas => (0, PushKind::Untainted),
        Origin | Caller | CallValue | CallDataSize | GasPrice => (0, PushKind::AlwaysTainted),
        CallDataLoad => (1, PushKind::AlwaysTainted),
        CodeCopy => (3, PushKind::None),
        ExtCodeCopy => (4, PushKind::None),
        ReturnDataCopy => (3, PushKind::None),
        Pop => (1, PushKind::None),
        MLoad => (1, PushKind::FromMemory),
        Jump => (1, PushKind::None),
        Jumpi => (2, PushKind::None),
        Push(_) => (0, PushKind::Untainted),
        Log(n) => (2 + *n as usize, PushKind::None),
        Create => (3, PushKind::AlwaysTainted),
        Call | CallCode => (7, PushKind::AlwaysTainted),
        DelegateCall | StaticCall => (6, PushKind::AlwaysTainted),
        Create2 => (4, PushKind::AlwaysTainted),
        // Dup, Swap, MStore, MStore8, SLoad, SStore, CallDataCopy handled
        // as special cases before this table is ever consulted.
        Dup(_) | Swap(_) | MStore | MStore8 | SLoad | SStore | CallDataCopy => (0, PushKind::None),
    }
}
