/*
 ═══════════════════════════════════════════════════════════════════════════════
  SENTINEL SHIELD - Basic-Block Builder (C2) & CFG Builder (C3)

  Partitions the instruction stream into basic blocks at JUMPDEST offsets and
  after control-transfer instructions (§4.2), then connects them with
  successor edges, giving JUMPI both its taken and fall-through edge and
  falling back to a conservative over-approximation for unresolved dynamic
  jumps (§4.3). The dual-edge JUMPI treatment is load-bearing: dropping the
  taken branch is the classic way to under-approximate a CFG and miss a
  modifier guard.
 ═══════════════════════════════════════════════════════════════════════════════
*/

use std::collections::{BTreeSet, HashSet};

use indexmap::IndexMap;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::disassembler::{Disassembly, Instruction};
use crate::opcode::Opcode;

/// How many instructions the backward scan for a static jump target may
/// look at before giving up (§4.3).
const STATIC_RESOLUTION_WINDOW: usize = 10;

#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub start_offset: usize,
    pub end_offset: usize,
    pub instructions: Vec<Instruction>,
}

impl BasicBlock {
    pub fn terminator(&self) -> Option<&Instruction> {
        self.instructions.last()
    }

    pub fn contains_offset(&self, offset: usize) -> bool {
        offset >= self.start_offset && offset < self.end_offset
    }
}

/// Bookkeeping surfaced to the report for §7's `dynamic_jumps` counter.
#[derive(Debug, Clone, Default)]
pub struct CfgStats {
    pub dynamic_jumps: usize,
}

/// A mapping from block-start offset to its successor set, plus the blocks
/// themselves and a parallel `petgraph` graph for algorithms that want real
/// graph traversal primitives.
pub struct Cfg {
    pub blocks: IndexMap<usize, BasicBlock>,
    pub successors: IndexMap<usize, BTreeSet<usize>>,
    pub graph: DiGraph<usize, ()>,
    pub node_of: IndexMap<usize, NodeIndex>,
    pub stats: CfgStats,
}

impl Cfg {
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn block_at(&self, offset: usize) -> Option<&BasicBlock> {
        self.blocks.get(&offset)
    }

    pub fn successors_of(&self, offset: usize) -> impl Iterator<Item = usize> + '_ {
        self.successors
            .get(&offset)
            .into_iter()
            .flat_map(|s| s.iter().copied())
    }
}

pub struct CfgBuilder;

impl CfgBuilder {
    pub fn build(disasm: &Disassembly) -> Cfg {
        let blocks = Self::build_blocks(disasm);
        let mut successors: IndexMap<usize, BTreeSet<usize>> = IndexMap::new();
        let mut stats = CfgStats::default();

        let block_starts: Vec<usize> = blocks.keys().copied().collect();

        for (idx, start) in block_starts.iter().enumerate() {
            let block = &blocks[start];
            let next_block_start = block_starts.get(idx + 1).copied();
            let succ = Self::resolve_successors(
                block,
                next_block_start,
                &disasm.valid_jumpdests,
                &block_starts,
                &mut stats,
            );
            successors.insert(*start, succ);
        }

        let mut graph = DiGraph::<usize, ()>::new();
        let mut node_of: IndexMap<usize, NodeIndex> = IndexMap::new();
        for start in &block_starts {
            node_of.insert(*start, graph.add_node(*start));
        }
        for start in &block_starts {
            let from = node_of[start];
            for succ in successors.get(start).into_iter().flatten() {
                if let Some(&to) = node_of.get(succ) {
                    graph.add_edge(from, to, ());
                }
            }
        }

        tracing::debug!(
            block_count = blocks.len(),
            dynamic_jumps = stats.dynamic_jumps,
            "built control-flow graph"
        );

        Cfg {
            blocks,
            successors,
            graph,
            node_of,
            stats,
        }
    }

    /// Basic-block partitioning per §4.2.
    fn build_blocks(disasm: &Disassembly) -> IndexMap<usize, BasicBlock> {
        let mut leaders: BTreeSet<usize> = BTreeSet::new();
        if let Some(first) = disasm.instructions.first() {
            leaders.insert(first.offset);
        }
        for (idx, instr) in disasm.instructions.iter().enumerate() {
            if matches!(instr.opcode, Opcode::JumpDest) {
                leaders.insert(instr.offset);
            }
            if instr.opcode.is_terminator() {
                if let Some(next) = disasm.instructions.get(idx + 1) {
                    leaders.insert(next.offset);
                }
            }
        }

        let mut blocks: IndexMap<usize, BasicBlock> = IndexMap::new();
        let leader_list: Vec<usize> = leaders.into_iter().collect();
        for (i, &start) in leader_list.iter().enumerate() {
            let end_of_window = leader_list.get(i + 1).copied();
            let instrs: Vec<Instruction> = disasm
                .instructions
                .iter()
                .filter(|instr| {
                    instr.offset >= start && end_of_window.map_or(true, |e| instr.offset < e)
                })
                .cloned()
                .collect();
            let end_offset = instrs
                .last()
                .map(|i| i.offset + 1 + i.opcode.push_size())
                .unwrap_or(start);
            blocks.insert(
                start,
                BasicBlock {
                    start_offset: start,
                    end_offset,
                    instructions: instrs,
                },
            );
        }
        blocks
    }

    /// Successor resolution per §4.3.
    fn resolve_successors(
        block: &BasicBlock,
        fall_through: Option<usize>,
        valid_jumpdests: &HashSet<usize>,
        all_block_starts: &[usize],
        stats: &mut CfgStats,
    ) -> BTreeSet<usize> {
        let mut succ = BTreeSet::new();
        let terminator = match block.terminator() {
            Some(t) => t,
            None => return succ,
        };

        match terminator.opcode {
            Opcode::Stop | Opcode::Return | Opcode::Revert | Opcode::SelfDestruct | Opcode::Invalid => {
                // No successors (§3 invariant, §4.3).
            }
            Opcode::Jump => {
                match Self::resolve_static_target(block, valid_jumpdests) {
                    Some(target) => {
                        succ.insert(target);
                    }
                    None => {
                        stats.dynamic_jumps += 1;
                        succ.extend(valid_jumpdests.iter().copied());
                        tracing::warn!(
                            block_start = block.start_offset,
                            "unresolved dynamic JUMP target; falling back to all valid JUMPDESTs"
                        );
                    }
                }
            }
            Opcode::Jumpi => {
                // Taken branch, if resolvable.
                match Self::resolve_static_target(block, valid_jumpdests) {
                    Some(target) => {
                        succ.insert(target);
                    }
                    None => {
                        stats.dynamic_jumps += 1;
                        succ.extend(valid_jumpdests.iter().copied());
                        tracing::warn!(
                            block_start = block.start_offset,
                            "unresolved dynamic JUMPI target; falling back to all valid JUMPDESTs"
                        );
                    }
                }
                // Fall-through branch always present (§4.3, dual-edge rule).
                if let Some(ft) = fall_through {
                    succ.insert(ft);
                }
            }
            _ => {
                // No explicit terminator (block ended because the next
                // JUMPDEST began): a single fall-through edge.
                if let Some(ft) = fall_through {
                    succ.insert(ft);
                } else if let Some(&first) = all_block_starts.first() {
                    // Defensive: a block with no terminator and no following
                    // block only happens on a single-block program with a
                    // non-halting last instruction; nothing sound to link to.
                    let _ = first;
                }
            }
        }
        succ
    }

    /// Scan backwards from just before the terminator for a PUSH immediate,
    /// stopping at the first stack-mutating arithmetic instruction (§4.3).
    fn resolve_static_target(
        block: &BasicBlock,
        valid_jumpdests: &HashSet<usize>,
    ) -> Option<usize> {
        let instrs = &block.instructions;
        if instrs.len() < 2 {
            return None;
        }
        let before_terminator = &instrs[..instrs.len() - 1];
        let window_start = before_terminator.len().saturating_sub(STATIC_RESOLUTION_WINDOW);
        for instr in before_terminator[window_start..].iter().rev() {
            if let Opcode::Push(_) = instr.opcode {
                if let Some(target) = instr.push_as_offset() {
                    if valid_jumpdests.contains(&target) {
                        return Some(target);
                    }
                }
                return None;
            }
            if instr.opcode.blocks_static_resolution() {
                return None;
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disassembler::Disassembler;

    #[test]
    fn single_block_for_stop_only() {
        let d = Disassembler::disassemble(&[0x00]);
        let cfg = CfgBuilder::build(&d);
        assert_eq!(cfg.block_count(), 1);
    }

    #[test]
    fn jump_to_jumpdest_splits_blocks() {
        // PUSH1 0x04 JUMP JUMPDEST STOP
        let d = Disassembler::disassemble(&[0x60, 0x04, 0x56, 0x5b, 0x00]);
        let cfg = CfgBuilder::build(&d);
        assert_eq!(cfg.block_count(), 2);
        let succ: Vec<_> = cfg.successors_of(0).collect();
        assert_eq!(succ, vec![4]);
    }

    #[test]
    fn jumpi_has_taken_and_fallthrough_edges() {
        // PUSH1 0x00 PUSH1 0x08 JUMPI PUSH1 0x01 STOP JUMPDEST STOP
        let d = Disassembler::disassemble(&[
            0x60, 0x00, 0x60, 0x08, 0x57, 0x60, 0x01, 0x00, 0x5b, 0x00,
        ]);
        let cfg = CfgBuilder::build(&d);
        let succ: Vec<_> = cfg.successors_of(0).collect();
        assert_eq!(succ, vec![5, 8]);
    }

    #[test]
    fn unresolved_dynamic_jump_falls_back_to_all_jumpdests() {
        // SLOAD blocks resolution, then JUMP: PUSH1 0x00 SLOAD JUMP JUMPDEST STOP JUMPDEST STOP
        let d = Disassembler::disassemble(&[
            0x60, 0x00, 0x54, 0x56, 0x5b, 0x00, 0x5b, 0x00,
        ]);
        let cfg = CfgBuilder::build(&d);
        assert_eq!(cfg.stats.dynamic_jumps, 1);
        let succ: Vec<_> = cfg.successors_of(0).collect();
        assert_eq!(succ, vec![4, 6]);
    }

    #[test]
    fn halting_terminators_have_no_successors() {
        let d = Disassembler::disassemble(&[0x00]); // STOP
        let cfg = CfgBuilder::build(&d);
        assert!(cfg.successors_of(0).next().is_none());
    }

    #[test]
    fn fallthrough_block_with_no_terminator() {
        // ADD JUMPDEST STOP - first block has no terminator, falls through.
        let d = Disassembler::disassemble(&[0x01, 0x5b, 0x00]);
        let cfg = CfgBuilder::build(&d);
        let succ: Vec<_> = cfg.successors_of(0).collect();
        assert_eq!(succ, vec![1]);
    }
}
