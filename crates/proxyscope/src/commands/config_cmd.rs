//! Config subcommand handlers.

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::config;
use crate::error::CliError;
use crate::output;

const REDACTED: &str = "<redacted>";

pub fn handle(args: &ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            output::print_output(&config::config_path().display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Show => {
            let mut cfg = proxyscope_config::load_config()?;
            for profile in cfg.profiles.values_mut() {
                if profile.access_key.is_some() {
                    profile.access_key = Some(REDACTED.into());
                }
            }

            let rendered = match global.output {
                OutputFormat::Table => {
                    toml::to_string_pretty(&cfg).map_err(|e| CliError::Config {
                        message: format!("failed to render config: {e}"),
                    })?
                }
                OutputFormat::Json => output::render_json(&cfg, false)?,
                OutputFormat::JsonCompact => output::render_json(&cfg, true)?,
            };
            output::print_output(rendered.trim_end(), global.quiet);
            Ok(())
        }
    }
}
