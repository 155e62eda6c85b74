/*
 ═══════════════════════════════════════════════════════════════════════════════
  SENTINEL SHIELD - End-to-End Scenario Tests

  Each scenario module wires the pipeline components together directly
  (disassembler -> cfg -> source parser/storage resolver -> taint engine ->
  verdict engine) against a literal Solidity fixture and the hand-assembled
  bytecode a compiler would emit for it, mirroring the S1-S6 scenarios.
 ═══════════════════════════════════════════════════════════════════════════════
*/

use std::collections::HashSet;

use sentinel_acl::cfg::CfgBuilder;
use sentinel_acl::disassembler::Disassembler;
use sentinel_acl::source::{SourceParser, StorageBinding, StorageResolver};
use sentinel_acl::sourcemap::SourceMapper;
use sentinel_acl::taint::TaintEngine;
use sentinel_acl::verdict::{Confidence, DetectionMethod, Verdict, VerdictEngine};

fn resolve_slot(src: &str, parsed: &sentinel_acl::source::ParsedSource, var: &str) -> usize {
    match StorageResolver::resolve(src, parsed, &[var.to_string()])[var] {
        StorageBinding::Resolved { slot, .. } => slot,
        StorageBinding::Ambiguous => panic!("expected a resolved slot for {var}"),
    }
}

/// Builds a source map that points every instruction at offset 0 except the
/// instruction at `sstore_offset`, which is pointed at `needle`'s position
/// in `src`.
fn map_sink_to_line(instructions: &[sentinel_acl::disassembler::Instruction], src: &str, sstore_offset: usize, needle: &str) -> String {
    let char_offset = src.find(needle).unwrap_or_else(|| panic!("{needle} not found in source"));
    let mut entries = vec!["0:1:0:-".to_string(); instructions.len()];
    let idx = instructions.iter().position(|i| i.offset == sstore_offset).unwrap();
    entries[idx] = format!("{char_offset}:{}:0:-", needle.len());
    entries.join(";")
}

mod s1_unguarded_owner_setter {
    use super::*;

    #[test]
    fn dangerous_low_with_no_bytecode_tags() {
        let src = "contract Vault {\n    address public owner;\n    function setOwner(address n) public {\n        owner = n;\n    }\n}\n";
        // PUSH1 0x04 CALLDATALOAD PUSH1 0x00 SSTORE STOP
        let code = [0x60, 0x04, 0x35, 0x60, 0x00, 0x55, 0x00];
        let d = Disassembler::disassemble(&code);
        let cfg = CfgBuilder::build(&d);
        let parsed = SourceParser::parse(src, &["owner".to_string()]);
        let binding = StorageResolver::resolve(src, &parsed, &["owner".to_string()])["owner"].clone();
        let slot = resolve_slot(src, &parsed, "owner");
        let mut key_slots = HashSet::new();
        key_slots.insert(slot);
        let paths = TaintEngine::analyze(&cfg, &key_slots);
        assert_eq!(paths.len(), 1);

        let raw_map = map_sink_to_line(&d.instructions, src, 5, "owner = n;");
        let mapper = SourceMapper::new(&d.instructions, &raw_map, src);
        let result = VerdictEngine::evaluate("owner", &binding, &parsed, &paths, &cfg, &mapper);

        assert_eq!(result.dangerous_locations.len(), 1);
        let loc = &result.dangerous_locations[0];
        assert_eq!(loc.verdict, Verdict::Dangerous);
        assert_eq!(loc.confidence, Confidence::Low);
        assert!(loc.bytecode_condition_types.is_empty());
        assert!(!loc.has_source_condition);
        assert_eq!(loc.detection_method, DetectionMethod::Taint);
    }
}

mod s2_modifier_guarded_setter {
    use super::*;

    #[test]
    fn safe_high_with_access_control_and_revert() {
        let src = "contract Vault {\n    address public owner;\n    modifier onlyOwner() {\n        require(msg.sender == owner);\n        _;\n    }\n    function setOwner(address n) public onlyOwner {\n        owner = n;\n    }\n}\n";
        // CALLER PUSH1 0x00 EQ PUSH1 0x0c JUMPI PUSH1 0 PUSH1 0 REVERT JUMPDEST CALLER PUSH1 0x00 SSTORE STOP
        let code = [
            0x33, 0x60, 0x00, 0x14, 0x60, 0x0c, 0x57, 0x60, 0x00, 0x60, 0x00, 0xfd, 0x5b, 0x33, 0x60, 0x00, 0x55,
            0x00,
        ];
        let d = Disassembler::disassemble(&code);
        let cfg = CfgBuilder::build(&d);
        let parsed = SourceParser::parse(src, &["owner".to_string()]);
        let binding = StorageResolver::resolve(src, &parsed, &["owner".to_string()])["owner"].clone();
        let slot = resolve_slot(src, &parsed, "owner");
        let mut key_slots = HashSet::new();
        key_slots.insert(slot);
        let paths = TaintEngine::analyze(&cfg, &key_slots);

        let raw_map = map_sink_to_line(&d.instructions, src, 16, "owner = n;");
        let mapper = SourceMapper::new(&d.instructions, &raw_map, src);
        let result = VerdictEngine::evaluate("owner", &binding, &parsed, &paths, &cfg, &mapper);

        assert!(result.dangerous_locations.is_empty());
        assert!(result.suspicious_locations.is_empty());
    }
}

mod s3_require_guarded_without_identity_check {
    use super::*;

    #[test]
    fn suspicious_medium_without_access_control_tag() {
        let src = "contract Vault {\n    uint256 public withdrawLimit;\n    function setLimit(uint256 newLimit) public {\n        require(newLimit > 0);\n        withdrawLimit = newLimit;\n    }\n}\n";
        // PUSH1 0x04 CALLDATALOAD DUP1 PUSH1 0x00 GT PUSH1 0x0f JUMPI
        // PUSH1 0 PUSH1 0 REVERT JUMPDEST PUSH1 0x00 SSTORE STOP
        let code = [
            0x60, 0x04, 0x35, 0x80, 0x60, 0x00, 0x11, 0x60, 0x0f, 0x57, 0x60, 0x00, 0x60, 0x00, 0xfd, 0x5b, 0x60,
            0x00, 0x55, 0x00,
        ];
        let d = Disassembler::disassemble(&code);
        let cfg = CfgBuilder::build(&d);
        let parsed = SourceParser::parse(src, &["withdrawLimit".to_string()]);
        let binding = StorageResolver::resolve(src, &parsed, &["withdrawLimit".to_string()])["withdrawLimit"].clone();
        let slot = resolve_slot(src, &parsed, "withdrawLimit");
        let mut key_slots = HashSet::new();
        key_slots.insert(slot);
        let paths = TaintEngine::analyze(&cfg, &key_slots);
        assert!(!paths.is_empty());

        let raw_map = map_sink_to_line(&d.instructions, src, 18, "withdrawLimit = newLimit;");
        let mapper = SourceMapper::new(&d.instructions, &raw_map, src);
        let result = VerdictEngine::evaluate("withdrawLimit", &binding, &parsed, &paths, &cfg, &mapper);

        assert_eq!(result.suspicious_locations.len(), 1);
        let loc = &result.suspicious_locations[0];
        assert_eq!(loc.confidence, Confidence::Medium);
        use sentinel_acl::guard::GuardTag;
        assert!(loc.bytecode_condition_types.contains(&GuardTag::Comparison));
        assert!(loc.bytecode_condition_types.contains(&GuardTag::ConditionalJump));
        assert!(!loc.bytecode_condition_types.contains(&GuardTag::AccessControl));
    }
}

mod s4_constructor_initialisation {
    use super::*;

    #[test]
    fn constructor_write_is_filtered() {
        let src = "contract Vault {\n    address public owner;\n    constructor() {\n        owner = msg.sender;\n    }\n}\n";
        let parsed = SourceParser::parse(src, &["owner".to_string()]);
        let binding = StorageResolver::resolve(src, &parsed, &["owner".to_string()])["owner"].clone();
        let d = Disassembler::disassemble(&[0x00]);
        let cfg = CfgBuilder::build(&d);
        let mapper = SourceMapper::new(&d.instructions, "0:1:0:-", src);
        let result = VerdictEngine::evaluate("owner", &binding, &parsed, &[], &cfg, &mapper);
        assert!(result.dangerous_locations.is_empty());
        assert!(result.suspicious_locations.is_empty());
    }
}

mod s5_view_function_return_assignment {
    use super::*;

    #[test]
    fn named_return_assignment_is_filtered() {
        let src = "contract Vault {\n    address public owner;\n    function getOwner() public view returns (address o) {\n        o = owner;\n    }\n}\n";
        let parsed = SourceParser::parse(src, &["owner".to_string()]);
        let binding = StorageResolver::resolve(src, &parsed, &["owner".to_string()])["owner"].clone();
        let d = Disassembler::disassemble(&[0x00]);
        let cfg = CfgBuilder::build(&d);
        let mapper = SourceMapper::new(&d.instructions, "0:1:0:-", src);
        let result = VerdictEngine::evaluate("owner", &binding, &parsed, &[], &cfg, &mapper);
        assert!(result.dangerous_locations.is_empty());
        assert!(result.suspicious_locations.is_empty());
    }
}

mod s6_selfdestruct_in_public_function {
    use super::*;

    #[test]
    fn unguarded_selfdestruct_is_one_dangerous_finding_independent_of_key_vars() {
        let src = "contract Vault {\n    address public owner;\n    function kill() public {\n        selfdestruct(owner);\n    }\n}\n";
        let parsed = SourceParser::parse(src, &[]);
        let findings = VerdictEngine::sensitive_sink_findings(src, &parsed);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].verdict, Verdict::Dangerous);
        assert_eq!(findings[0].opcode, "SELFDESTRUCT");
    }
}
