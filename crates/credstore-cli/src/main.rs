//! credstore - local credential store for the API Forge platform.
//!
//! Generates, verifies, backs up and restores service secrets and the
//! internal PKI used for service-to-service TLS.

use std::process::ExitCode;

fn main() -> ExitCode {
    credstore_cli::run()
}
