//! Single option lookup

use mdt_config::{ConfigNode, ConfigStore};

use crate::error::{CliError, Result};

/// Print the option at `path` of the loaded document.
///
/// Strings are printed bare, other scalars as written, collections as YAML.
pub fn run_get(store: &ConfigStore, path: &str) -> Result<()> {
    let node = store
        .get_option(path)?
        .ok_or_else(|| CliError::user(format!("No option found at '{path}'")))?;

    match (&node, node.as_str()) {
        (_, Some(s)) => println!("{s}"),
        (ConfigNode::Scalar(scalar), None) => println!("{scalar}"),
        _ => print!("{}", node.to_yaml_string()?),
    }
    Ok(())
}
