/*
 ═══════════════════════════════════════════════════════════════════════════════
  SENTINEL SHIELD - Verdict Fusion (C8, verdict half)

  Combines bytecode guard evidence (TaintPath + GuardEvidence, mapped to
  source lines by sourcemap.rs) with source-side evidence (Usage,
  Function) into the three-level verdict table of §4.8, plus the
  source-supplement path for writes the taint engine never reached and the
  sensitive-sink addendum.
 ═══════════════════════════════════════════════════════════════════════════════
*/

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use crate::cfg::Cfg;
use crate::guard::{GuardEvidence, GuardTag};
use crate::source::{ParsedSource, StorageBinding, Usage, UsageKind};
use crate::sourcemap::SourceMapper;
use crate::taint::TaintPath;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Safe,
    Suspicious,
    Dangerous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetectionMethod {
    Taint,
    SourceSupplement,
}

#[derive(Debug, Clone, Serialize)]
pub struct Location {
    pub line: usize,
    pub code: String,
    pub function: String,
    pub has_source_condition: bool,
    pub has_bytecode_condition: bool,
    pub bytecode_condition_types: Vec<GuardTag>,
    pub confidence: Confidence,
    pub detection_method: DetectionMethod,
    pub verdict: Verdict,
    pub warning: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct BytecodeEvidence {
    tags: BTreeSet<GuardTag>,
    incomplete: bool,
}

impl BytecodeEvidence {
    fn has_guard(&self) -> bool {
        !self.tags.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct KeyVariableResult {
    pub variable: String,
    pub storage_slot: Option<usize>,
    pub has_vulnerability: bool,
    pub dangerous_paths_count: usize,
    pub suspicious_paths_count: usize,
    pub dangerous_locations: Vec<Location>,
    pub suspicious_locations: Vec<Location>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SensitiveSinkFinding {
    pub line: usize,
    pub code: String,
    pub function: String,
    pub opcode: String,
    pub verdict: Verdict,
    pub confidence: Confidence,
}

pub struct VerdictEngine;

impl VerdictEngine {
    /// Associate each bytecode sink line with the union of tags across
    /// every TaintPath reaching it (§4.8 `bytecode_tags`).
    fn aggregate_bytecode_evidence(
        taint_paths: &[TaintPath],
        cfg: &Cfg,
        mapper: &SourceMapper,
    ) -> HashMap<usize, BytecodeEvidence> {
        let mut by_line: HashMap<usize, BytecodeEvidence> = HashMap::new();
        for path in taint_paths {
            let line = match mapper.line_for_offset(path.sink_offset) {
                Some(l) => l,
                None => continue,
            };
            let evidence = crate::guard::GuardClassifier::classify(path, cfg);
            let entry = by_line.entry(line).or_default();
            entry.tags.extend(evidence.tags);
            entry.incomplete |= path.incomplete;
        }
        by_line
    }

    /// Evaluate every Usage of `variable`, applying the §4.8 filter, fusing
    /// bytecode and source evidence per the verdict table, and appending
    /// source-supplement findings for writes the taint engine never saw.
    pub fn evaluate(
        variable: &str,
        binding: &StorageBinding,
        parsed: &ParsedSource,
        taint_paths: &[TaintPath],
        cfg: &Cfg,
        mapper: &SourceMapper,
    ) -> KeyVariableResult {
        let bytecode_by_line = Self::aggregate_bytecode_evidence(taint_paths, cfg, mapper);
        let mut dangerous = Vec::new();
        let mut suspicious = Vec::new();

        for usage in parsed.usages.iter().filter(|u| u.variable == variable) {
            if usage.kind != UsageKind::Write {
                continue;
            }
            if Self::is_filtered(usage, parsed) {
                continue;
            }

            let function = parsed.function_at(usage.line);
            let has_source_guard = Self::has_source_guard(usage, function);

            if let Some(evidence) = bytecode_by_line.get(&usage.line) {
                let location = Self::classify_taint_location(usage, function, evidence, has_source_guard);
                Self::push(&mut dangerous, &mut suspicious, location);
            } else if Self::is_public_or_external(function) {
                let location = Self::classify_supplement_location(usage, function, has_source_guard);
                Self::push(&mut dangerous, &mut suspicious, location);
            }
        }

        dangerous.sort_by(|a, b| a.line.cmp(&b.line));
        suspicious.sort_by(|a, b| a.line.cmp(&b.line));

        KeyVariableResult {
            variable: variable.to_string(),
            storage_slot: match binding {
                StorageBinding::Resolved { slot, .. } => Some(*slot),
                StorageBinding::Ambiguous => None,
            },
            has_vulnerability: !dangerous.is_empty() || !suspicious.is_empty(),
            dangerous_paths_count: dangerous.len(),
            suspicious_paths_count: suspicious.len(),
            dangerous_locations: dangerous,
            suspicious_locations: suspicious,
        }
    }

    fn push(dangerous: &mut Vec<Location>, suspicious: &mut Vec<Location>, location: Location) {
        match location.verdict {
            Verdict::Dangerous => dangerous.push(location),
            Verdict::Suspicious => suspicious.push(location),
            Verdict::Safe => {}
        }
    }

    /// §4.8 filtering: constructor, view/pure/constant, fallback/receive,
    /// modifier bodies, and type declarations are not runtime attack surface.
    fn is_filtered(usage: &Usage, parsed: &ParsedSource) -> bool {
        if usage.kind == UsageKind::Declaration {
            return true;
        }
        match parsed.function_at(usage.line) {
            Some(f) => {
                f.is_constructor || f.mutability.is_view_or_pure() || f.is_fallback_or_receive || f.is_modifier
            }
            None => false,
        }
    }

    fn has_source_guard(usage: &Usage, function: Option<&crate::source::Function>) -> bool {
        usage.source_has_condition
            || function.is_some_and(|f| !f.modifiers.is_empty())
            || function.is_some_and(|f| f.has_condition)
    }

    fn is_public_or_external(function: Option<&crate::source::Function>) -> bool {
        function.is_some_and(|f| {
            matches!(
                f.visibility,
                crate::source::Visibility::Public | crate::source::Visibility::External
            )
        })
    }

    /// The §4.8 verdict table, fed by bytecode-guard/source-guard/access-control.
    fn classify_verdict(has_bytecode_guard: bool, has_source_guard: bool, access_control: bool) -> (Verdict, Confidence) {
        match (has_bytecode_guard, has_source_guard, access_control) {
            (true, true, true) => (Verdict::Safe, Confidence::High),
            (true, true, false) => (Verdict::Suspicious, Confidence::Medium),
            (true, false, true) => (Verdict::Suspicious, Confidence::Medium),
            (true, false, false) => (Verdict::Suspicious, Confidence::Low),
            (false, true, _) => (Verdict::Suspicious, Confidence::Medium),
            (false, false, _) => (Verdict::Dangerous, Confidence::Low),
        }
    }

    fn classify_taint_location(
        usage: &Usage,
        function: Option<&crate::source::Function>,
        evidence: &BytecodeEvidence,
        has_source_guard: bool,
    ) -> Location {
        let access_control = evidence.tags.contains(&GuardTag::AccessControl);
        let (verdict, confidence) = Self::classify_verdict(evidence.has_guard(), has_source_guard, access_control);
        let warning = evidence.incomplete.then(|| "path enumeration bound hit; evidence may be partial".to_string());
        Location {
            line: usage.line,
            code: usage.code.clone(),
            function: function.map(|f| f.name.clone()).unwrap_or_default(),
            has_source_condition: has_source_guard,
            has_bytecode_condition: evidence.has_guard(),
            bytecode_condition_types: evidence.tags.iter().copied().collect(),
            confidence,
            detection_method: DetectionMethod::Taint,
            verdict,
            warning,
        }
    }

    /// Supplementary findings (§4.8): a write the taint engine never
    /// reached in a public/external function. Capped at `Confidence::Medium`
    /// even when source evidence looks strong, since there is no bytecode
    /// corroboration at all (invariant 7: `safe`/`high` requires a
    /// bytecode guard).
    fn classify_supplement_location(
        usage: &Usage,
        function: Option<&crate::source::Function>,
        has_source_guard: bool,
    ) -> Location {
        let has_access_control = function.is_some_and(|f| f.has_access_control);
        let (verdict, confidence) = if has_access_control {
            (Verdict::Safe, Confidence::Medium)
        } else if has_source_guard {
            (Verdict::Suspicious, Confidence::Medium)
        } else {
            (Verdict::Dangerous, Confidence::Low)
        };
        Location {
            line: usage.line,
            code: usage.code.clone(),
            function: function.map(|f| f.name.clone()).unwrap_or_default(),
            has_source_condition: has_source_guard,
            has_bytecode_condition: false,
            bytecode_condition_types: Vec::new(),
            confidence,
            detection_method: DetectionMethod::SourceSupplement,
            verdict,
            warning: None,
        }
    }

    /// Sensitive-sink addendum (§4.8): independent of key-variable
    /// membership, a scan for selfdestruct/suicide/delegatecall/callcode.
    pub fn sensitive_sink_findings(source: &str, parsed: &ParsedSource) -> Vec<SensitiveSinkFinding> {
        const SINKS: &[(&str, &str)] = &[
            ("selfdestruct", "SELFDESTRUCT"),
            ("suicide", "SELFDESTRUCT"),
            ("delegatecall", "DELEGATECALL"),
            ("callcode", "CALLCODE"),
        ];
        let mut findings = Vec::new();
        for (idx, line) in source.lines().enumerate() {
            let line_no = idx + 1;
            for (needle, opcode) in SINKS {
                if !line.contains(needle) {
                    continue;
                }
                let function = parsed.function_at(line_no);
                let has_access_control = function.is_some_and(|f| f.has_access_control);
                let (verdict, confidence) = if has_access_control {
                    (Verdict::Suspicious, Confidence::Medium)
                } else {
                    (Verdict::Dangerous, Confidence::Medium)
                };
                findings.push(SensitiveSinkFinding {
                    line: line_no,
                    code: line.trim().to_string(),
                    function: function.map(|f| f.name.clone()).unwrap_or_default(),
                    opcode: opcode.to_string(),
                    verdict,
                    confidence,
                });
            }
        }
        findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::CfgBuilder;
    use crate::disassembler::Disassembler;
    use crate::source::SourceParser;
    use crate::taint::TaintEngine;
    use std::collections::HashSet;

    fn build(code: &[u8], src: &str, var: &str) -> (Cfg, Vec<TaintPath>, ParsedSource, StorageBinding) {
        let d = Disassembler::disassemble(code);
        let cfg = CfgBuilder::build(&d);
        let parsed = SourceParser::parse(src, &[var.to_string()]);
        let binding = crate::source::StorageResolver::resolve(src, &parsed, &[var.to_string()])
            .remove(var)
            .unwrap();
        let slot = match &binding {
            StorageBinding::Resolved { slot, .. } => *slot,
            StorageBinding::Ambiguous => 0,
        };
        let mut key_slots = HashSet::new();
        key_slots.insert(slot);
        let paths = TaintEngine::analyze(&cfg, &key_slots);
        (cfg, paths, parsed, binding)
    }

    #[test]
    fn fully_guarded_write_is_safe_high() {
        let src = "contract Vault {\n    address public owner;\n    function setOwner(address n) public {\n        require(msg.sender == owner);\n        owner = n;\n    }\n}\n";
        // CALLER PUSH1 0x00 EQ PUSH1 0x0c JUMPI PUSH1 0 PUSH1 0 REVERT JUMPDEST CALLER PUSH1 0x00 SSTORE STOP
        let code = [
            0x33, 0x60, 0x00, 0x14, 0x60, 0x0c, 0x57, 0x60, 0x00, 0x60, 0x00, 0xfd, 0x5b, 0x33, 0x60, 0x00, 0x55,
            0x00,
        ];
        let (cfg, paths, parsed, binding) = build(&code, src, "owner");
        let d = Disassembler::disassemble(&code);
        // Map every instruction to source offset 0 except the SSTORE at
        // offset 16, which maps to the char offset of "owner = n;" (line 5).
        let owner_assign_offset = src.find("owner = n;").unwrap();
        let mut entries = vec!["0:1:0:-".to_string(); d.instructions.len()];
        let sstore_idx = d.instructions.iter().position(|i| i.offset == 16).unwrap();
        entries[sstore_idx] = format!("{}:10:0:-", owner_assign_offset);
        let raw_map = entries.join(";");
        let mapper = SourceMapper::new(&d.instructions, &raw_map, src);
        let result = VerdictEngine::evaluate("owner", &binding, &parsed, &paths, &cfg, &mapper);
        assert_eq!(result.dangerous_locations.len(), 0);
        assert_eq!(result.suspicious_locations.len(), 0);
    }

    #[test]
    fn unprotected_public_write_not_reached_by_taint_is_dangerous_supplement() {
        let src = r#"
contract Vault {
    uint256 public limit;
    function setLimit(uint256 n) public {
        limit = n;
    }
}
"#;
        let parsed = SourceParser::parse(src, &["limit".to_string()]);
        let binding = crate::source::StorageResolver::resolve(src, &parsed, &["limit".to_string()])
            .remove("limit")
            .unwrap();
        let d = Disassembler::disassemble(&[0x00]);
        let cfg = CfgBuilder::build(&d);
        let mapper = SourceMapper::new(&d.instructions, "0:1:0:-", src);
        let result = VerdictEngine::evaluate("limit", &binding, &parsed, &[], &cfg, &mapper);
        assert_eq!(result.dangerous_locations.len(), 1);
        assert_eq!(result.dangerous_locations[0].detection_method, DetectionMethod::SourceSupplement);
    }

    #[test]
    fn view_function_assignment_is_filtered() {
        let src = r#"
contract Vault {
    address public owner;
    function getOwner() public view returns (address o) {
        o = owner;
    }
}
"#;
        let parsed = SourceParser::parse(src, &["owner".to_string()]);
        let binding = crate::source::StorageResolver::resolve(src, &parsed, &["owner".to_string()])
            .remove("owner")
            .unwrap();
        let d = Disassembler::disassemble(&[0x00]);
        let cfg = CfgBuilder::build(&d);
        let mapper = SourceMapper::new(&d.instructions, "0:1:0:-", src);
        let result = VerdictEngine::evaluate("owner", &binding, &parsed, &[], &cfg, &mapper);
        assert!(result.dangerous_locations.is_empty());
        assert!(result.suspicious_locations.is_empty());
    }

    #[test]
    fn selfdestruct_without_access_control_is_dangerous() {
        let src = r#"
contract Vault {
    function kill() public {
        selfdestruct(payable(msg.sender));
    }
}
"#;
        let parsed = SourceParser::parse(src, &[]);
        let findings = VerdictEngine::sensitive_sink_findings(src, &parsed);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].verdict, Verdict::Dangerous);
        assert_eq!(findings[0].opcode, "SELFDESTRUCT");
    }

    #[test]
    fn selfdestruct_guarded_by_access_control_is_suspicious() {
        let src = r#"
contract Vault {
    address public owner;
    modifier onlyOwner() {
        require(msg.sender == owner);
        _;
    }
    function kill() public onlyOwner {
        selfdestruct(payable(owner));
    }
}
"#;
        let parsed = SourceParser::parse(src, &[]);
        let findings = VerdictEngine::sensitive_sink_findings(src, &parsed);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].verdict, Verdict::Suspicious);
    }
}
