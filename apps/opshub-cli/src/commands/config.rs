use anyhow::{Context, Result};
use clap::Subcommand;

use super::AppContext;

#[derive(Subcommand)]
pub enum ConfigCmd {
    /// Print the JSON schema for the config file
    Schema,
    /// Print the effective configuration (file, env overrides, defaults)
    Show,
}

pub fn execute(ctx: &AppContext, cmd: ConfigCmd) -> Result<()> {
    match cmd {
        ConfigCmd::Schema => super::util::print_json(&opshub_core::config_schema_json(), true),
        ConfigCmd::Show => {
            if ctx.json {
                return ctx.emit_json(&ctx.config);
            }
            let text = toml::to_string_pretty(&ctx.config).context("rendering config as TOML")?;
            print!("{}", text);
            Ok(())
        }
    }
}
