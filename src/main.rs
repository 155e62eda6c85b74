/*
 ═══════════════════════════════════════════════════════════════════════════════
  SENTINEL SHIELD - Access-Control Vulnerability Detector (CLI entry point)
 ═══════════════════════════════════════════════════════════════════════════════
*/

use clap::Parser;
use sentinel_acl::config::CliArgs;
use sentinel_acl::driver::Driver;
use sentinel_acl::error::DetectorError;

fn main() {
    let args = CliArgs::parse();

    let filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .init();

    match Driver::run(&args) {
        Ok(report) if report.compilation_failed => {
            eprintln!("compilation failed: {}", report.contract_path);
            std::process::exit(1);
        }
        Ok(report) => {
            if report.summary.total_dangerous > 0 {
                tracing::warn!(
                    dangerous = report.summary.total_dangerous,
                    suspicious = report.summary.total_suspicious,
                    "analysis complete with findings"
                );
            } else {
                tracing::info!("analysis complete, no dangerous findings");
            }
            std::process::exit(0);
        }
        Err(DetectorError::InputMalformed(msg)) => {
            eprintln!("input malformed: {msg}");
            std::process::exit(2);
        }
        Err(DetectorError::CompileFailed(msg)) => {
            eprintln!("compilation failed: {msg}");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("analysis failed: {e}");
            std::process::exit(1);
        }
    }
}
