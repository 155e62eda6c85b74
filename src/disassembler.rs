/*
 ═══════════════════════════════════════════════════════════════════════════════
  SENTINEL SHIELD - Disassembler (C1)

  Decodes runtime bytecode into an instruction sequence and the set of valid
  JUMPDEST offsets. Malformed or truncated bytecode degrades gracefully
  (§4.1, §7 decode-truncated) rather than failing the run.
 ═══════════════════════════════════════════════════════════════════════════════
*/

use std::collections::HashSet;

use crate::opcode::Opcode;

/// One decoded instruction. Immutable once produced (§3).
#[derive(Debug, Clone)]
pub struct Instruction {
    pub offset: usize,
    pub opcode: Opcode,
    pub push_data: Option<Vec<u8>>,
}

impl Instruction {
    /// PUSH argument interpreted as an offset, used for static jump-target
    /// resolution in §4.3. Values wider than a usize saturate rather than
    /// wrap, which is conservative: an out-of-range offset simply fails
    /// `valid_jumpdests` lookup.
    pub fn push_as_offset(&self) -> Option<usize> {
        let bytes = self.push_data.as_ref()?;
        if bytes.len() > (usize::BITS / 8) as usize {
            // Wider than a native pointer: definitely not a real in-program
            // offset, but also not zero - so no point pretending it resolves.
            return Some(usize::MAX);
        }
        let mut acc: usize = 0;
        for b in bytes {
            acc = (acc << 8) | (*b as usize);
        }
        Some(acc)
    }

    /// First 4 bytes of a PUSH argument, used for function-selector
    /// detection (kept from the decompiler's selector-sniffing heritage,
    /// used here only for report annotations, not for taint/guard logic).
    pub fn push_as_selector(&self) -> Option<String> {
        let bytes = self.push_data.as_ref()?;
        if bytes.len() > 4 {
            return None;
        }
        let mut arr = [0u8; 4];
        let start = 4 - bytes.len();
        arr[start..].copy_from_slice(bytes);
        Some(format!("0x{}", hex::encode(arr)))
    }
}

/// Output of a disassembly pass: the ordered instruction list and which
/// offsets are legal JUMP/JUMPI targets.
#[derive(Debug, Clone, Default)]
pub struct Disassembly {
    pub instructions: Vec<Instruction>,
    pub valid_jumpdests: HashSet<usize>,
    /// Set when the bytecode ended mid-PUSH-immediate (§7 decode-truncated).
    pub truncated: bool,
}

impl Disassembly {
    pub fn instruction_at(&self, offset: usize) -> Option<&Instruction> {
        // Linear scan is fine here: callers that need repeated lookups build
        // their own offset index (see cfg.rs); this stays simple for the
        // occasional one-off query.
        self.instructions.iter().find(|i| i.offset == offset)
    }
}

pub struct Disassembler;

impl Disassembler {
    /// Decode runtime bytecode into instructions per §4.1. Empty or
    /// thoroughly malformed input yields an empty, non-truncated
    /// disassembly; downstream components tolerate this (§4.1 Failure).
    pub fn disassemble(bytecode: &[u8]) -> Disassembly {
        let mut instructions = Vec::new();
        let mut valid_jumpdests = HashSet::new();
        let mut truncated = false;

        let mut i = 0usize;
        while i < bytecode.len() {
            let raw = bytecode[i];
            let opcode = Opcode::from_byte(raw);
            let arg_size = opcode.push_size();

            if arg_size > 0 {
                if i + arg_size >= bytecode.len() {
                    // Immediate runs past end-of-code: stop decoding
                    // gracefully, per §4.1. The partial PUSH itself is not
                    // emitted as an instruction since its data is incomplete.
                    truncated = true;
                    break;
                }
                let data = bytecode[i + 1..=i + arg_size].to_vec();
                instructions.push(Instruction {
                    offset: i,
                    opcode,
                    push_data: Some(data),
                });
                i += 1 + arg_size;
                continue;
            }

            if matches!(opcode, Opcode::JumpDest) {
                valid_jumpdests.insert(i);
            }
            instructions.push(Instruction {
                offset: i,
                opcode,
                push_data: None,
            });
            i += 1;
        }

        tracing::debug!(
            bytecode_len = bytecode.len(),
            instruction_count = instructions.len(),
            jumpdest_count = valid_jumpdests.len(),
            truncated,
            "disassembled bytecode"
        );
        if truncated {
            tracing::warn!("bytecode ended mid-PUSH immediate; decoding stopped early");
        }

        Disassembly {
            instructions,
            valid_jumpdests,
            truncated,
        }
    }
}
