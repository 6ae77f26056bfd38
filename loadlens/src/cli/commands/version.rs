//! Version information display.

use serde_json::json;

use crate::cli::args::{OutputFormat, VersionArgs};

/// Print version information, including the built-in toggle keys.
pub fn run(args: &VersionArgs) {
    let name = env!("CARGO_PKG_NAME");
    let version = env!("CARGO_PKG_VERSION");

    match args.format {
        OutputFormat::Human => {
            println!("{name} {version}");
        }
        OutputFormat::Json => {
            let toggles: Vec<&str> = loadlens_core::ScenarioModel::builtin().keys().collect();
            println!(
                "{}",
                json!({ "name": name, "version": version, "toggles": toggles })
            );
        }
    }
}
