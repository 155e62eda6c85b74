/*
 ═══════════════════════════════════════════════════════════════════════════════
  SENTINEL SHIELD - Source-Mapper (C8, mapping half)

  Parses the compiler's colon-separated instruction-indexed source map
  (§6 "Source map") and resolves a bytecode instruction offset to a 1-based
  source line, tolerating the inherit-from-previous-entry shorthand that
  solc-style source maps use for unchanged fields.
 ═══════════════════════════════════════════════════════════════════════════════
*/

use std::collections::HashMap;

use crate::disassembler::Instruction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceMapEntry {
    pub start: usize,
    pub length: usize,
    pub file_index: i64,
    pub jump: char,
}

impl Default for SourceMapEntry {
    fn default() -> Self {
        SourceMapEntry {
            start: 0,
            length: 0,
            file_index: -1,
            jump: '-',
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SourceMap {
    pub entries: Vec<SourceMapEntry>,
}

impl SourceMap {
    /// Parse a `start:length:file:jump;...` string. A field left empty
    /// (including a whole entry left empty between two `;`) inherits the
    /// previous entry's value (§6).
    pub fn parse(raw: &str) -> Self {
        let mut entries = Vec::with_capacity(raw.matches(';').count() + 1);
        let mut last = SourceMapEntry::default();
        for part in raw.split(';') {
            let fields: Vec<&str> = part.split(':').collect();
            let start = field(&fields, 0).and_then(|s| s.parse().ok()).unwrap_or(last.start);
            let length = field(&fields, 1).and_then(|s| s.parse().ok()).unwrap_or(last.length);
            let file_index = field(&fields, 2).and_then(|s| s.parse().ok()).unwrap_or(last.file_index);
            let jump = field(&fields, 3).and_then(|s| s.chars().next()).unwrap_or(last.jump);
            let entry = SourceMapEntry {
                start,
                length,
                file_index,
                jump,
            };
            entries.push(entry);
            last = entry;
        }
        SourceMap { entries }
    }

    pub fn entry_for_instruction(&self, instruction_index: usize) -> Option<&SourceMapEntry> {
        self.entries.get(instruction_index)
    }
}

fn field<'a>(fields: &[&'a str], idx: usize) -> Option<&'a str> {
    fields.get(idx).filter(|s| !s.is_empty()).copied()
}

/// Joins a parsed source map to the disassembled instruction stream and the
/// raw source text, so callers can go from a bytecode byte offset straight
/// to a source line number.
pub struct SourceMapper {
    map: SourceMap,
    offset_to_index: HashMap<usize, usize>,
    line_starts: Vec<usize>,
}

impl SourceMapper {
    pub fn new(instructions: &[Instruction], raw_map: &str, source_text: &str) -> Self {
        let map = SourceMap::parse(raw_map);
        let offset_to_index = instructions.iter().enumerate().map(|(i, ins)| (ins.offset, i)).collect();
        let line_starts = line_starts(source_text);
        SourceMapper {
            map,
            offset_to_index,
            line_starts,
        }
    }

    /// Resolve the 1-based source line for the instruction at `byte_offset`,
    /// or `None` if the offset has no instruction or no mapped entry.
    pub fn line_for_offset(&self, byte_offset: usize) -> Option<usize> {
        let idx = *self.offset_to_index.get(&byte_offset)?;
        let entry = self.map.entry_for_instruction(idx)?;
        Some(self.char_offset_to_line(entry.start))
    }

    fn char_offset_to_line(&self, char_offset: usize) -> usize {
        self.line_starts.partition_point(|&s| s <= char_offset).max(1)
    }
}

fn line_starts(text: &str) -> Vec<usize> {
    let mut starts = vec![0usize];
    for (i, c) in text.char_indices() {
        if c == '\n' {
            starts.push(i + 1);
        }
    }
    starts
}
