use clap::{Args, Subcommand};
use serde::Serialize;

use botdeploy::config::{Settings, SECRET_KEYS};

use super::{CmdResult, SettingsArgs};

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Display resolved settings and which secrets are present
    Show {
        #[command(flatten)]
        settings: SettingsArgs,

        /// Show only built-in defaults (ignore botdeploy.toml)
        #[arg(long)]
        builtin: bool,
    },
}

#[derive(Debug, Serialize)]
pub struct SecretStatus {
    pub key: &'static str,
    pub set: bool,
}

#[derive(Debug, Serialize)]
pub struct ConfigOutput {
    command: String,
    settings: Settings,
    secrets: Vec<SecretStatus>,
}

pub fn run(args: ConfigArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<ConfigOutput> {
    match args.command {
        ConfigCommand::Show { settings, builtin } => show(&settings, builtin),
    }
}

fn show(args: &SettingsArgs, builtin: bool) -> CmdResult<ConfigOutput> {
    let settings = if builtin {
        Settings::default()
    } else {
        args.resolve()?
    };

    Ok((
        ConfigOutput {
            command: "config.show".to_string(),
            settings,
            secrets: secret_status(|key| std::env::var_os(key).is_some_and(|v| !v.is_empty())),
        },
        0,
    ))
}

/// Presence only; values are never read into the output.
fn secret_status(is_set: impl Fn(&str) -> bool) -> Vec<SecretStatus> {
    SECRET_KEYS
        .iter()
        .map(|&key| SecretStatus {
            key,
            set: is_set(key),
        })
        .collect()
}
