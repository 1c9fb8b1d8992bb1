//! Config subcommand handlers.

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

use super::{config_error, config_file, load_config};

pub fn handle(args: &ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            output::print_output(&config_file(global).display().to_string(), global.quiet);
        }

        ConfigCommand::Show => {
            let (_, cfg) = load_config(global)?;
            let shown = cfg.redacted();
            let text = match global.output {
                OutputFormat::Table | OutputFormat::Plain => toml::to_string_pretty(&shown)?,
                OutputFormat::Json => output::render_json(&shown, false)?,
                OutputFormat::JsonCompact => output::render_json(&shown, true)?,
            };
            output::print_output(text.trim_end(), global.quiet);
        }

        ConfigCommand::Init { force } => {
            let path = config_file(global);
            meater_config::init_config(&path, force).map_err(|e| config_error(&path, e))?;
            if !global.quiet {
                eprintln!("Wrote starter configuration to {}", path.display());
                eprintln!(
                    "Set username, and keep the password in password_env or the system keyring."
                );
            }
        }
    }
    Ok(())
}
