/*
 ═══════════════════════════════════════════════════════════════════════════════
  SENTINEL SHIELD - Guard Classifier (C7)
 ═══════════════════════════════════════════════════════════════════════════════
*/

use std::collections::{BTreeSet, HashSet};

use serde::Serialize;

use crate::cfg::Cfg;
use crate::opcode::Opcode;
use crate::taint::TaintPath;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum GuardTag {
    ConditionalJump,
    Comparison,
    Revert,
    AccessControl,
}

#[derive(Debug, Clone, Default)]
pub struct GuardEvidence {
    pub tags: BTreeSet<GuardTag>,
    pub evidence_count: usize,
}

impl GuardEvidence {
    pub fn has_access_control(&self) -> bool {
        self.tags.contains(&GuardTag::AccessControl)
    }
}

pub struct GuardClassifier;

impl GuardClassifier {
    /// Walk every instruction in every block of `path` and collect guard
    /// tags per §4.7. `access-control` needs both a caller-identity load and
    /// a comparison somewhere on the same path - order doesn't matter.
    pub fn classify(path: &TaintPath, cfg: &Cfg) -> GuardEvidence {
        let block_set: HashSet<usize> = path.blocks.iter().copied().collect();
        let mut tags = BTreeSet::new();
        let mut evidence_count = 0usize;
        let mut has_caller_or_origin = false;
        let mut has_comparison = false;

        for &start in &path.blocks {
            let block = match cfg.block_at(start) {
                Some(b) => b,
                None => continue,
            };
            for instr in &block.instructions {
                match instr.opcode {
                    Opcode::Jumpi => {
                        tags.insert(GuardTag::ConditionalJump);
                        evidence_count += 1;
                    }
                    Opcode::Caller | Opcode::Origin => has_caller_or_origin = true,
                    _ => {}
                }
                if instr.opcode.is_comparison() {
                    tags.insert(GuardTag::Comparison);
                    has_comparison = true;
                    evidence_count += 1;
                }
            }

            // Side-branch revert detection (§4.7): the branch of a JUMPI not
            // taken by this path leads straight into a REVERT, the shape a
            // compiled `require(...)` guard takes.
            let ends_in_jumpi = matches!(block.terminator().map(|t| t.opcode), Some(Opcode::Jumpi));
            if ends_in_jumpi {
                for succ in cfg.successors_of(start) {
                    if block_set.contains(&succ) {
                        continue;
                    }
                    if let Some(succ_block) = cfg.block_at(succ) {
                        if succ_block.instructions.iter().any(|i| i.opcode.is_revert()) {
                            tags.insert(GuardTag::Revert);
                            evidence_count += 1;
                        }
                    }
                }
            }
        }

        if has_caller_or_origin && has_comparison {
            tags.insert(GuardTag::AccessControl);
            evidence_count += 1;
        }

        GuardEvidence { tags, evidence_count }
    }
}
