//! Config subcommand handlers.

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::config;
use crate::error::CliError;
use crate::output;

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let path = config::config_file(global);

    match args.command {
        ConfigCommand::Init { force } => {
            tripwire_config::init_config(&path, force).map_err(|e| CliError::config(&path, e))?;
            if !global.quiet {
                eprintln!("wrote {}", path.display());
            }
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = config::load(global)?;
            let rendered = match global.output {
                OutputFormat::Table | OutputFormat::Plain => {
                    tripwire_config::to_toml(&cfg).map_err(|e| CliError::config(&path, e))?
                }
                _ => output::render_single(&global.output, &cfg, |_| String::new(), |_| {
                    String::new()
                })?,
            };
            output::print_output(rendered.trim_end(), global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(&path.display().to_string(), global.quiet);
            Ok(())
        }
    }
}
