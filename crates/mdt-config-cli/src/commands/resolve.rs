//! Effective settings of a single model

use std::fs;
use std::path::Path;

use mdt_config::{ConfigNode, ConfigStore};

use crate::error::Result;

/// Print the resolved settings of `model` as YAML, or JSON with `json`
pub fn run_resolve(
    store: &ConfigStore,
    model: &str,
    cascade_hint: Option<&Path>,
    json: bool,
) -> Result<()> {
    let hint = cascade_hint.map(read_hint).transpose()?;
    let resolved = store.resolve_with_cascade(model, hint.as_ref())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&resolved)?);
        return Ok(());
    }

    println!("# model: {}", resolved.model_name());
    if resolved.contributing_patterns().is_empty() {
        println!("# rules: (none)");
    } else {
        for pattern in resolved.contributing_patterns() {
            println!("# rule: {pattern}");
        }
    }
    if let Some(path) = cascade_hint {
        println!("# cascade hint: {}", path.display());
    }

    let config = ConfigNode::Mapping(resolved.into_config());
    print!("{}", config.to_yaml_string()?);
    Ok(())
}

fn read_hint(path: &Path) -> Result<ConfigNode> {
    let content = fs::read_to_string(path).map_err(|e| mdt_config::Error::io(path, e))?;
    Ok(ConfigNode::parse(&path.display().to_string(), &content)?)
}
