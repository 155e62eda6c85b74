/*
 ═══════════════════════════════════════════════════════════════════════════════
  SENTINEL SHIELD - Source-level analysis (C4, C5)
 ═══════════════════════════════════════════════════════════════════════════════
*/

pub mod parser;
pub mod storage;

pub use parser::{ContractInfo, Function, Mutability, ParsedSource, Usage, UsageKind, Visibility};
pub use storage::{StorageBinding, StorageResolver, VariableType};
