/*
 ═══════════════════════════════════════════════════════════════════════════════
  SENTINEL SHIELD - Compiler Artifact Ingestion

  Reads the Combined-JSON-shaped output produced by the external compiler
  driver (§6 "Compiler inputs consumed by the core"): runtime bytecode,
  source map, and an ABI fragment list used only to annotate reports with
  method names. Invoking `solc` itself is out of scope - that's the
  external driver's job; this module only deserialises what it hands back.
 ═══════════════════════════════════════════════════════════════════════════════
*/

use std::path::Path;

use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

use crate::error::{DetectorError, Result};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AbiFragment {
    pub name: String,
    pub selector: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CompilerArtifacts {
    /// Hex string (ASCII, optionally `0x`-prefixed) of the deployed
    /// (runtime) bytecode.
    pub bytecode: String,
    /// Colon-separated instruction-indexed source map (§6).
    #[serde(default)]
    pub source_map: String,
    #[serde(default)]
    pub abi: Vec<AbiFragment>,
}

impl CompilerArtifacts {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| DetectorError::CompileFailed(format!("reading {}: {e}", path.display())))?;
        let artifacts: CompilerArtifacts = serde_json::from_str(&text)
            .map_err(|e| DetectorError::CompileFailed(format!("parsing {}: {e}", path.display())))?;
        if artifacts.bytecode.trim().is_empty() {
            return Err(DetectorError::CompileFailed(
                "compiler artifacts contain no runtime bytecode".to_string(),
            ));
        }
        Ok(artifacts)
    }

    pub fn bytecode_bytes(&self) -> Result<Vec<u8>> {
        let clean = self.bytecode.strip_prefix("0x").unwrap_or(&self.bytecode);
        hex::decode(clean).map_err(|e| DetectorError::CompileFailed(format!("decoding bytecode hex: {e}")))
    }

    pub fn bytecode_hash(&self) -> Result<String> {
        let bytes = self.bytecode_bytes()?;
        let mut hasher = Keccak256::new();
        hasher.update(&bytes);
        Ok(format!("0x{}", hex::encode(hasher.finalize())))
    }

    /// Best-effort method-name lookup for a 4-byte selector, used only to
    /// annotate reports (§6); absent a match, callers fall back to the
    /// bare selector string.
    pub fn function_name_for_selector(&self, selector: &str) -> Option<&str> {
        self.abi
            .iter()
            .find(|f| f.selector.eq_ignore_ascii_case(selector))
            .map(|f| f.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_bytecode_field_is_compile_failed() {
        let dir = std::env::temp_dir().join(format!(
            "sentinel-acl-empty-bytecode-{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("artifacts.json");
        std::fs::write(&path, r#"{"bytecode": "", "source_map": "", "abi": []}"#).unwrap();

        let result = CompilerArtifacts::load(&path);
        assert!(matches!(result, Err(DetectorError::CompileFailed(_))));

        std::fs::remove_file(&path).unwrap();
        std::fs::remove_dir(&dir).unwrap();
    }

    #[test]
    fn bytecode_hex_with_0x_prefix_decodes() {
        let artifacts = CompilerArtifacts {
            bytecode: "0x6000".to_string(),
            source_map: String::new(),
            abi: Vec::new(),
        };
        assert_eq!(artifacts.bytecode_bytes().unwrap(), vec![0x60, 0x00]);
    }

    #[test]
    fn selector_lookup_is_case_insensitive() {
        let artifacts = CompilerArtifacts {
            bytecode: "0x00".to_string(),
            source_map: String::new(),
            abi: vec![AbiFragment {
                name: "setOwner".to_string(),
                selector: "0xA6F9DAE1".to_string(),
            }],
        };
        assert_eq!(
            artifacts.function_name_for_selector("0xa6f9dae1"),
            Some("setOwner")
        );
    }
}
