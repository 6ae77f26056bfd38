//! `scenario encode` and `scenario decode`.

use std::path::Path;

use serde_json::json;

use loadlens_core::{ReportAssembler, ScenarioError, ScenarioState};

use crate::cli::args::{OutputFormat, ScenarioDecodeArgs, ScenarioEncodeArgs};
use crate::error::Result;
use crate::output::print_json;

use super::{load_config, permalink};

/// Print the query string (or permalink) for the enabled toggles.
///
/// # Errors
///
/// Returns a usage error for an unknown toggle key or invalid base URL.
pub fn encode(args: &ScenarioEncodeArgs, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path, false)?;
    let model = config.scenarios.build_model()?;

    let mut state = ScenarioState::all_off(&model);
    for key in &args.enable {
        state.enable(model.resolve(key.trim())?.key.clone());
    }

    let output = match (&args.permalink_base, &args.url) {
        (Some(base), Some(url)) => permalink(&model, base, url, &state)?,
        _ => ReportAssembler::new(&model).encode_scenario(&state),
    };
    println!("{output}");
    Ok(())
}

/// Print the toggle states carried by a query string.
///
/// # Errors
///
/// With `--strict`, returns the first unknown key as a usage error.
pub fn decode(args: &ScenarioDecodeArgs, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path, false)?;
    let model = config.scenarios.build_model()?;
    let decoded = ReportAssembler::new(&model).decode_scenario(&args.query);

    if args.strict
        && let Some(unknown) = decoded.unknown.first()
    {
        return Err(ScenarioError::UnknownToggle {
            key: unknown.key.clone(),
            suggestion: unknown.suggestion.clone(),
        }
        .into());
    }
    for unknown in &decoded.unknown {
        tracing::warn!("ignoring {unknown}");
    }

    match args.format {
        OutputFormat::Json => {
            let unknown: Vec<_> = decoded
                .unknown
                .iter()
                .map(|u| json!({ "key": u.key, "suggestion": u.suggestion }))
                .collect();
            print_json(&json!({
                "url": decoded.target_url,
                "scenario": decoded.state,
                "unknown": unknown,
            }))
        }
        OutputFormat::Human => {
            if let Some(url) = &decoded.target_url {
                println!("url: {url}");
            }
            for key in model.keys() {
                let state = if decoded.state.is_active(key) { "on" } else { "off" };
                println!("{key}: {state}");
            }
            Ok(())
        }
    }
}
