/*
 ═══════════════════════════════════════════════════════════════════════════════
  SENTINEL SHIELD - Driver

  Orchestrates one analysis end-to-end, enforcing the §5 ordering guarantee
  (C1 before C2 before C3; C4 before C5; C3 and C5 before C6; C6 before C7;
  C7 before C8; C8 before C9) and the §7 propagation policy: only
  input-malformed and compile-failed abort the run; everything else degrades
  into annotated partial results that flow through to the report. Also owns
  the two synchronous boundary operations §5 calls out: loading the external
  compiler's artifacts and writing report files.
 ═══════════════════════════════════════════════════════════════════════════════
*/

use std::collections::HashSet;
use std::path::Path;

use crate::cfg::{Cfg, CfgBuilder};
use crate::compiler::CompilerArtifacts;
use crate::config::CliArgs;
use crate::disassembler::{Disassembly, Disassembler};
use crate::error::{DetectorError, Result};
use crate::report::{FinalReport, ReportBuilder};
use crate::source::{SourceParser, StorageBinding, StorageResolver};
use crate::sourcemap::SourceMapper;
use crate::taint::{TaintEngine, TaintPath};
use crate::verdict::VerdictEngine;

pub struct Driver;

impl Driver {
    /// Runs one full analysis and writes its artefacts under
    /// `args.output_dir`. Returns the final report so callers (tests,
    /// `main`) can inspect it without re-reading the files back.
    pub fn run(args: &CliArgs) -> Result<FinalReport> {
        let span = tracing::info_span!("analysis", contract = %args.contract.display());
        let _enter = span.enter();

        args.validate()?;

        let source = std::fs::read_to_string(&args.contract)
            .map_err(|e| DetectorError::InputMalformed(format!("reading {}: {e}", args.contract.display())))?;
        let key_vars: Vec<String> = args
            .key_vars
            .iter()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect();

        let artifacts_path = args.artifacts_path();
        let artifacts = match CompilerArtifacts::load(&artifacts_path) {
            Ok(a) => a,
            Err(e) => {
                tracing::warn!(error = %e, "compilation failed; emitting empty analysis");
                let report = Self::compilation_failed_report(&args.contract, &key_vars);
                let empty = Disassembly::default();
                let empty_cfg = CfgBuilder::build(&empty);
                ReportBuilder::write_all(
                    &args.output_dir,
                    &report,
                    &empty,
                    &empty_cfg,
                    &indexmap::IndexMap::new(),
                    &[],
                )?;
                return Ok(report);
            }
        };

        let outcome = Self::analyze(&args.contract, &source, &key_vars, &artifacts)?;
        ReportBuilder::write_all(
            &args.output_dir,
            &outcome.report,
            &outcome.disasm,
            &outcome.cfg,
            &outcome.storage,
            &outcome.taint_paths,
        )?;
        Ok(outcome.report)
    }

    fn compilation_failed_report(contract: &Path, key_vars: &[String]) -> FinalReport {
        ReportBuilder::build(&contract.display().to_string(), key_vars, true, Vec::new(), Vec::new(), 0)
    }

    fn analyze(contract_path: &Path, source: &str, key_vars: &[String], artifacts: &CompilerArtifacts) -> Result<AnalysisOutcome> {
        let bytecode = artifacts.bytecode_bytes()?;

        // C1 -> C2 -> C3
        let disasm = Disassembler::disassemble(&bytecode);
        let cfg = CfgBuilder::build(&disasm);

        // C4 -> C5
        let parsed = SourceParser::parse(source, key_vars);
        let storage = StorageResolver::resolve(source, &parsed, key_vars);

        let mapper = SourceMapper::new(&disasm.instructions, &artifacts.source_map, source);

        let mut results = Vec::with_capacity(key_vars.len());
        let mut all_taint_paths = Vec::new();
        for var in key_vars {
            let binding = storage.get(var).cloned().unwrap_or(StorageBinding::Ambiguous);
            let key_slots: HashSet<usize> = match &binding {
                StorageBinding::Resolved { slot, .. } => [*slot].into_iter().collect(),
                StorageBinding::Ambiguous => HashSet::new(),
            };

            // C3 and C5 feed C6; C6 -> C7 (invoked inside VerdictEngine per
            // sink) -> C8.
            let taint_paths = TaintEngine::analyze(&cfg, &key_slots);
            let result = VerdictEngine::evaluate(var, &binding, &parsed, &taint_paths, &cfg, &mapper);
            results.push(result);
            all_taint_paths.extend(taint_paths);
        }

        let sensitive_sinks = VerdictEngine::sensitive_sink_findings(source, &parsed);

        // C8 -> C9
        let report = ReportBuilder::build(
            &contract_path.display().to_string(),
            key_vars,
            false,
            results,
            sensitive_sinks,
            cfg.stats.dynamic_jumps,
        );

        Ok(AnalysisOutcome {
            report,
            disasm,
            cfg,
            storage,
            taint_paths: all_taint_paths,
        })
    }
}

struct AnalysisOutcome {
    report: FinalReport,
    disasm: Disassembly,
    cfg: Cfg,
    storage: indexmap::IndexMap<String, StorageBinding>,
    taint_paths: Vec<TaintPath>,
}
