//! `toggles`: list the registry in application order.

use std::path::Path;

use loadlens_core::OptimizationToggle;

use crate::cli::args::{OutputFormat, TogglesArgs};
use crate::error::Result;
use crate::output::{print_json, render_toggles};

use super::load_config;

/// Print every registered toggle with its adjustments.
///
/// # Errors
///
/// Returns a config error if the configuration is invalid.
pub fn run(args: &TogglesArgs, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path, false)?;
    let model = config.scenarios.build_model()?;

    match args.format {
        OutputFormat::Human => {
            print!("{}", render_toggles(model.toggles()));
            Ok(())
        }
        OutputFormat::Json => {
            let toggles: Vec<&OptimizationToggle> = model.toggles().collect();
            print_json(&toggles)
        }
    }
}
