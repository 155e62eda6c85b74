/*
 ═══════════════════════════════════════════════════════════════════════════════
  SENTINEL SHIELD - Determinism / Idempotence Tests

  Re-running analysis on the same inputs must produce a byte-identical
  final_report.json, and reordering --key-vars must permute `results` but
  leave each result's content untouched (§8 round-trip / idempotence).
 ═══════════════════════════════════════════════════════════════════════════════
*/

use std::collections::HashSet;

use sentinel_acl::cfg::CfgBuilder;
use sentinel_acl::disassembler::Disassembler;
use sentinel_acl::report::ReportBuilder;
use sentinel_acl::source::{SourceParser, StorageBinding, StorageResolver};
use sentinel_acl::sourcemap::SourceMapper;
use sentinel_acl::taint::TaintEngine;
use sentinel_acl::verdict::VerdictEngine;

const SRC: &str = "contract Vault {\n    address public owner;\n    uint256 public limit;\n    function setOwner(address n) public {\n        owner = n;\n    }\n    function setLimit(uint256 n) public {\n        limit = n;\n    }\n}\n";

// PUSH1 0x04 CALLDATALOAD PUSH1 <slot> SSTORE STOP, repeated per variable's
// write offset so both land in one simple runtime blob.
const CODE: [u8; 7] = [0x60, 0x04, 0x35, 0x60, 0x00, 0x55, 0x00];

fn run_report(key_vars: &[&str]) -> String {
    let d = Disassembler::disassemble(&CODE);
    let cfg = CfgBuilder::build(&d);
    let key_vars: Vec<String> = key_vars.iter().map(|s| s.to_string()).collect();
    let parsed = SourceParser::parse(SRC, &key_vars);
    let storage = StorageResolver::resolve(SRC, &parsed, &key_vars);

    let mut entries = vec!["0:1:0:-".to_string(); d.instructions.len()];
    let sstore_idx = d.instructions.iter().position(|i| i.offset == 5).unwrap();
    let owner_offset = SRC.find("owner = n;").unwrap();
    entries[sstore_idx] = format!("{owner_offset}:10:0:-");
    let raw_map = entries.join(";");
    let mapper = SourceMapper::new(&d.instructions, &raw_map, SRC);

    let mut results = Vec::new();
    for var in &key_vars {
        let binding = storage.get(var).cloned().unwrap_or(StorageBinding::Ambiguous);
        let key_slots: HashSet<usize> = match &binding {
            StorageBinding::Resolved { slot, .. } => [*slot].into_iter().collect(),
            StorageBinding::Ambiguous => HashSet::new(),
        };
        let paths = TaintEngine::analyze(&cfg, &key_slots);
        results.push(VerdictEngine::evaluate(var, &binding, &parsed, &paths, &cfg, &mapper));
    }
    let sinks = VerdictEngine::sensitive_sink_findings(SRC, &parsed);
    let report = ReportBuilder::build("Vault.sol", &key_vars, false, results, sinks, cfg.stats.dynamic_jumps);
    serde_json::to_string_pretty(&report).unwrap()
}

#[test]
fn repeated_analysis_is_byte_identical() {
    let first = run_report(&["owner", "limit"]);
    let second = run_report(&["owner", "limit"]);
    assert_eq!(first, second);
}

#[test]
fn reordering_key_vars_permutes_results_without_changing_content() {
    let forward = run_report(&["owner", "limit"]);
    let reversed = run_report(&["limit", "owner"]);
    // Results are sorted by variable name in ReportBuilder::build regardless
    // of input order, so both runs should still produce identical output.
    assert_eq!(forward, reversed);
}
