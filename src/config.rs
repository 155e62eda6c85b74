/*
 ═══════════════════════════════════════════════════════════════════════════════
  SENTINEL SHIELD - CLI Arguments
 ═══════════════════════════════════════════════════════════════════════════════
*/

use std::path::PathBuf;

use clap::Parser;

use crate::error::{DetectorError, Result};

#[derive(Parser, Debug)]
#[command(name = "sentinel-acl")]
#[command(author = "SENTINEL Team")]
#[command(version)]
#[command(about = "Static access-control vulnerability detector for EVM contract bytecode")]
pub struct CliArgs {
    /// Solidity source file to analyse.
    #[arg(long)]
    pub contract: PathBuf,

    /// Comma-separated list of key state variables to track.
    #[arg(long, value_delimiter = ',')]
    pub key_vars: Vec<String>,

    /// Compiler version string used to produce the artifacts (e.g. 0.8.21).
    #[arg(long)]
    pub solc_version: String,

    /// Directory the report artefacts are written to.
    #[arg(long, default_value = "./output")]
    pub output_dir: PathBuf,

    /// JSON file holding the externally-produced compiler artifacts
    /// (runtime bytecode, source map, ABI). Defaults to
    /// `<contract-stem>.solc.json` beside the contract.
    #[arg(long)]
    pub artifacts: Option<PathBuf>,

    /// Enable debug-level logging.
    #[arg(short, long)]
    pub verbose: bool,
}

impl CliArgs {
    pub fn validate(&self) -> Result<()> {
        if !self.contract.exists() {
            return Err(DetectorError::InputMalformed(format!(
                "contract file not found: {}",
                self.contract.display()
            )));
        }
        if self.key_vars.is_empty() || self.key_vars.iter().all(|v| v.trim().is_empty()) {
            return Err(DetectorError::InputMalformed("--key-vars must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn artifacts_path(&self) -> PathBuf {
        self.artifacts.clone().unwrap_or_else(|| {
            let stem = self.contract.file_stem().and_then(|s| s.to_str()).unwrap_or("contract");
            self.contract
                .parent()
                .unwrap_or_else(|| std::path::Path::new("."))
                .join(format!("{stem}.solc.json"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_key_vars_is_input_malformed() {
        let args = CliArgs {
            contract: std::env::current_exe().unwrap(),
            key_vars: vec![],
            solc_version: "0.8.21".to_string(),
            output_dir: PathBuf::from("./output"),
            artifacts: None,
            verbose: false,
        };
        assert!(args.validate().is_err());
    }

    #[test]
    fn default_artifacts_path_is_beside_contract() {
        let args = CliArgs {
            contract: PathBuf::from("/tmp/Vault.sol"),
            key_vars: vec!["owner".to_string()],
            solc_version: "0.8.21".to_string(),
            output_dir: PathBuf::from("./output"),
            artifacts: None,
            verbose: false,
        };
        assert_eq!(args.artifacts_path(), PathBuf::from("/tmp/Vault.solc.json"));
    }
}
