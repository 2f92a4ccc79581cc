//! Output helpers shared by the subcommands.
//!
//! Global flags are carried in env vars so every module can check them
//! without threading a flags struct through the call tree.

/// Whether `--json` was passed.
pub fn is_json() -> bool {
    std::env::var("PROSPECT_JSON").is_ok()
}

/// Whether `--verbose` was passed.
pub fn is_verbose() -> bool {
    std::env::var("PROSPECT_VERBOSE").is_ok()
}

/// Print a serde value as one JSON line.
pub fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(line) => println!("{line}"),
        Err(e) => eprintln!("json encode failed: {e}"),
    }
}
