/*
 ═══════════════════════════════════════════════════════════════════════════════
  SENTINEL SHIELD - Error Taxonomy
 ═══════════════════════════════════════════════════════════════════════════════
*/

use thiserror::Error;

/// Conditions that abort a run outright (§7). Everything else degrades into
/// annotated partial results carried on the data itself - see
/// `CfgStats::dynamic_jumps`, `StorageBinding::Ambiguous`, and
/// `TaintPath::incomplete`.
#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("input malformed: {0}")]
    InputMalformed(String),

    #[error("compilation failed: {0}")]
    CompileFailed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DetectorError>;
