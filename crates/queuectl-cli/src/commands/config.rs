use console::style;
use queuectl_shared::ConfigStore;

use crate::error::CliError;

pub fn set(config: &mut ConfigStore, key: &str, value: &str) -> Result<(), CliError> {
    config.set(key, value)?;
    println!(
        "{} {} = {}",
        style("✓").green().bold(),
        style(key).cyan(),
        value
    );
    Ok(())
}

pub fn get(config: &ConfigStore, key: &str) -> Result<(), CliError> {
    match config.get(key) {
        Some(value) => println!("{value}"),
        None => return Err(CliError::Config(queuectl_shared::ConfigError::UnknownKey(key.to_string()))),
    }
    Ok(())
}

pub fn show(config: &ConfigStore) -> Result<(), CliError> {
    println!("{}", style("Configuration").cyan().bold());
    for (key, value) in config.all() {
        println!("  {key:<20} {value}");
    }
    Ok(())
}

pub fn reset(config: &mut ConfigStore) -> Result<(), CliError> {
    config.reset()?;
    println!("{} configuration reset to defaults", style("✓").green().bold());
    Ok(())
}
