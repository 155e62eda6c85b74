/*
 ═══════════════════════════════════════════════════════════════════════════════
  SENTINEL SHIELD - Access-Control Vulnerability Detector

  A static analyser for EVM contract bytecode + Solidity source: disassembles
  runtime bytecode, builds its control-flow graph, resolves key state
  variables to storage slots, runs a taint dataflow from call-data/sender
  sources to storage writes, classifies the guards along each path, and
  fuses bytecode and source evidence into a per-location verdict.
 ═══════════════════════════════════════════════════════════════════════════════
*/

pub mod cfg;
pub mod compiler;
pub mod config;
pub mod disassembler;
pub mod driver;
pub mod error;
pub mod guard;
pub mod opcode;
pub mod report;
pub mod source;
pub mod sourcemap;
pub mod taint;
pub mod verdict;
