/*
 ═══════════════════════════════════════════════════════════════════════════════
  SENTINEL SHIELD - Report Builder (C9)

  Assembles the final verdict report plus the intermediate debugging
  artefacts (§6 "Report outputs") and writes them under `--output-dir`.
  Determinism (§9): `results` sorted by variable name, each variable's
  locations sorted by line.
 ═══════════════════════════════════════════════════════════════════════════════
*/

use std::path::Path;

use serde::Serialize;

use crate::cfg::Cfg;
use crate::disassembler::Disassembly;
use crate::error::Result;
use crate::source::StorageBinding;
use crate::taint::TaintPath;
use crate::verdict::{KeyVariableResult, SensitiveSinkFinding};

#[derive(Debug, Serialize)]
pub struct ReportSummary {
    pub total_dangerous: usize,
    pub total_suspicious: usize,
    pub dynamic_jumps: usize,
    pub sensitive_sink_count: usize,
}

#[derive(Debug, Serialize)]
pub struct FinalReport {
    pub contract_path: String,
    pub key_variables: Vec<String>,
    pub compilation_failed: bool,
    pub summary: ReportSummary,
    pub results: Vec<KeyVariableResult>,
    pub sensitive_sinks: Vec<SensitiveSinkFinding>,
}

#[derive(Debug, Serialize)]
struct InstructionDto {
    offset: usize,
    mnemonic: String,
    push_data: Option<String>,
}

#[derive(Debug, Serialize)]
struct DisassemblyDto {
    instruction_count: usize,
    truncated: bool,
    instructions: Vec<InstructionDto>,
}

#[derive(Debug, Serialize)]
struct CfgEdgeDto {
    from: usize,
    to: usize,
}

#[derive(Debug, Serialize)]
struct CfgDto {
    block_count: usize,
    dynamic_jumps: usize,
    edges: Vec<CfgEdgeDto>,
}

#[derive(Debug, Serialize)]
struct StorageMappingEntryDto {
    variable: String,
    slot: Option<usize>,
    var_type: Option<String>,
}

#[derive(Debug, Serialize)]
struct TaintPathDto {
    blocks: Vec<usize>,
    sink_offset: usize,
    slot: Option<usize>,
    incomplete: bool,
}

pub struct ReportBuilder;

impl ReportBuilder {
    pub fn build(
        contract_path: &str,
        key_variables: &[String],
        compilation_failed: bool,
        results: Vec<KeyVariableResult>,
        sensitive_sinks: Vec<SensitiveSinkFinding>,
        dynamic_jumps: usize,
    ) -> FinalReport {
        let mut results = results;
        results.sort_by(|a, b| a.variable.cmp(&b.variable));
        for r in &mut results {
            r.dangerous_locations.sort_by(|a, b| a.line.cmp(&b.line));
            r.suspicious_locations.sort_by(|a, b| a.line.cmp(&b.line));
        }

        let summary = ReportSummary {
            total_dangerous: results.iter().map(|r| r.dangerous_paths_count).sum(),
            total_suspicious: results.iter().map(|r| r.suspicious_paths_count).sum(),
            dynamic_jumps,
            sensitive_sink_count: sensitive_sinks.len(),
        };

        FinalReport {
            contract_path: contract_path.to_string(),
            key_variables: key_variables.to_vec(),
            compilation_failed,
            summary,
            results,
            sensitive_sinks,
        }
    }

    /// Writes `final_report.json` plus the debugging artefacts under
    /// `output_dir`, creating the directory if needed (§6, §A.6).
    pub fn write_all(
        output_dir: &Path,
        report: &FinalReport,
        disasm: &Disassembly,
        cfg: &Cfg,
        storage: &indexmap::IndexMap<String, StorageBinding>,
        taint_paths: &[TaintPath],
    ) -> Result<()> {
        std::fs::create_dir_all(output_dir)?;

        Self::write_json(&output_dir.join("final_report.json"), report)?;
        Self::write_json(&output_dir.join("disassembly.json"), &Self::disassembly_dto(disasm))?;
        Self::write_json(&output_dir.join("cfg.json"), &Self::cfg_dto(cfg))?;
        Self::write_json(&output_dir.join("storage_mapping.json"), &Self::storage_dto(storage))?;
        Self::write_json(&output_dir.join("taint_paths.json"), &Self::taint_dto(taint_paths))?;

        tracing::info!(dir = %output_dir.display(), "wrote report artefacts");
        Ok(())
    }

    fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(file, value)?;
        Ok(())
    }

    fn disassembly_dto(disasm: &Disassembly) -> DisassemblyDto {
        DisassemblyDto {
            instruction_count: disasm.instructions.len(),
            truncated: disasm.truncated,
            instructions: disasm
                .instructions
                .iter()
                .map(|i| InstructionDto {
                    offset: i.offset,
                    mnemonic: i.opcode.mnemonic(),
                    push_data: i.push_data.as_ref().map(hex::encode),
                })
                .collect(),
        }
    }

    fn cfg_dto(cfg: &Cfg) -> CfgDto {
        let mut edges = Vec::new();
        for (&from, succs) in &cfg.successors {
            for &to in succs {
                edges.push(CfgEdgeDto { from, to });
            }
        }
        CfgDto {
            block_count: cfg.block_count(),
            dynamic_jumps: cfg.stats.dynamic_jumps,
            edges,
        }
    }

    fn storage_dto(storage: &indexmap::IndexMap<String, StorageBinding>) -> Vec<StorageMappingEntryDto> {
        storage
            .iter()
            .map(|(var, binding)| match binding {
                StorageBinding::Resolved { slot, var_type } => StorageMappingEntryDto {
                    variable: var.clone(),
                    slot: Some(*slot),
                    var_type: Some(format!("{var_type:?}")),
                },
                StorageBinding::Ambiguous => StorageMappingEntryDto {
                    variable: var.clone(),
                    slot: None,
                    var_type: None,
                },
            })
            .collect()
    }

    fn taint_dto(paths: &[TaintPath]) -> Vec<TaintPathDto> {
        paths
            .iter()
            .map(|p| TaintPathDto {
                blocks: p.blocks.clone(),
                sink_offset: p.sink_offset,
                slot: p.slot,
                incomplete: p.incomplete,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verdict::KeyVariableResult;

    fn sample_result(variable: &str) -> KeyVariableResult {
        KeyVariableResult {
            variable: variable.to_string(),
            storage_slot: Some(0),
            has_vulnerability: false,
            dangerous_paths_count: 0,
            suspicious_paths_count: 0,
            dangerous_locations: Vec::new(),
            suspicious_locations: Vec::new(),
        }
    }

    #[test]
    fn results_are_sorted_by_variable_name() {
        let results = vec![sample_result("zeta"), sample_result("alpha")];
        let report = ReportBuilder::build("Vault.sol", &["zeta".into(), "alpha".into()], false, results, Vec::new(), 0);
        assert_eq!(report.results[0].variable, "alpha");
        assert_eq!(report.results[1].variable, "zeta");
    }

    #[test]
    fn summary_sums_across_variables() {
        let mut a = sample_result("a");
        a.dangerous_paths_count = 2;
        let mut b = sample_result("b");
        b.suspicious_paths_count = 3;
        let report = ReportBuilder::build("Vault.sol", &["a".into(), "b".into()], false, vec![a, b], Vec::new(), 1);
        assert_eq!(report.summary.total_dangerous, 2);
        assert_eq!(report.summary.total_suspicious, 3);
        assert_eq!(report.summary.dynamic_jumps, 1);
    }
}
