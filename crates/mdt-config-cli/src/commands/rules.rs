//! Listing of single model rules

use colored::Colorize;
use mdt_config::ConfigStore;

use crate::error::Result;

/// List every rule in declared order, marking those matching `model`
pub fn run_rules(store: &ConfigStore, model: Option<&str>) -> Result<()> {
    let snapshot = store.snapshot()?;
    let rules = snapshot.resolver().rules();

    if rules.is_empty() {
        println!("{}", "No single model rules configured".dimmed());
        return Ok(());
    }

    match model {
        Some(model) => println!("{} {}", "Single model rules for".bold(), model.cyan()),
        None => println!("{}", "Single model rules".bold()),
    }
    println!();

    for (index, rule) in rules.iter().enumerate() {
        let marker = match model {
            Some(model) if rule.matches(model) => "+".green(),
            Some(_) => "-".dimmed(),
            None => " ".normal(),
        };
        let keys: Vec<_> = rule.config().keys().collect();
        println!(
            "  {} [{}] {}  {}",
            marker,
            index,
            rule.pattern(),
            keys.join(", ").dimmed()
        );
    }
    Ok(())
}
