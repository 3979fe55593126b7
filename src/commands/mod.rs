use clap::Args;
use std::io::Read;
use std::path::PathBuf;

use botdeploy::config::Settings;
use botdeploy::trigger::TriggerEvent;

pub type CmdResult<T> = botdeploy::Result<(T, i32)>;

pub(crate) struct GlobalArgs {}

/// Where the run's settings come from, plus per-invocation overrides.
#[derive(Args, Default, Debug)]
pub struct SettingsArgs {
    /// Settings file (defaults to ./botdeploy.toml when present)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Local artifact path (overrides artifact.path). With no trigger.watch,
    /// changed paths are matched against it relative to the working directory
    #[arg(long, value_name = "PATH")]
    pub artifact: Option<String>,

    /// systemd unit to restart (overrides remote.service)
    #[arg(long, value_name = "UNIT")]
    pub service: Option<String>,

    /// Branch that deploys (overrides trigger.branch)
    #[arg(long, value_name = "BRANCH")]
    pub branch_filter: Option<String>,
}

impl SettingsArgs {
    /// Load settings and apply flag overrides, then validate the result.
    pub fn resolve(&self) -> botdeploy::Result<Settings> {
        let mut settings = Settings::load(self.config.as_deref())?;

        if let Some(artifact) = &self.artifact {
            settings.artifact.path = artifact.clone();
        }
        if let Some(service) = &self.service {
            settings.remote.service = service.clone();
        }
        if let Some(branch) = &self.branch_filter {
            settings.trigger.branch = branch.clone();
        }

        settings.validate()?;
        Ok(settings)
    }
}

/// The trigger event, from flags or the CI environment.
///
/// Without `--branch`, `GITHUB_REF` (then `GITHUB_REF_NAME`) is used; without
/// `--commit`, `GITHUB_SHA`.
#[derive(Args, Default, Debug)]
pub struct TriggerArgs {
    /// Branch (or ref) the event targets
    #[arg(long)]
    pub branch: Option<String>,

    /// Changed path, repeatable
    #[arg(long = "changed", value_name = "PATH")]
    pub changed: Vec<String>,

    /// File with one changed path per line (`-` for stdin)
    #[arg(long, value_name = "FILE")]
    pub changed_from: Option<String>,

    /// Commit reference
    #[arg(long)]
    pub commit: Option<String>,
}

impl TriggerArgs {
    pub fn event(&self) -> botdeploy::Result<TriggerEvent> {
        let branch = self
            .branch
            .clone()
            .or_else(|| env_value("GITHUB_REF"))
            .or_else(|| env_value("GITHUB_REF_NAME"))
            .ok_or_else(|| {
                botdeploy::Error::validation_missing_argument(vec!["branch".to_string()])
                    .with_hint("Pass --branch or run under CI with GITHUB_REF set")
            })?;

        let mut changed_paths = self.changed.clone();
        if let Some(source) = &self.changed_from {
            changed_paths.extend(read_changed_paths(source)?);
        }

        Ok(TriggerEvent {
            branch,
            changed_paths,
            commit: self.commit.clone().or_else(|| env_value("GITHUB_SHA")),
        })
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn read_changed_paths(source: &str) -> botdeploy::Result<Vec<String>> {
    let raw = if source.trim() == "-" {
        if crate::tty::is_stdin_tty() {
            return Err(botdeploy::Error::validation_invalid_argument(
                "changed_from",
                "Cannot read changed paths from stdin when stdin is a TTY",
                None,
                None,
            ));
        }
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf).map_err(|e| {
            botdeploy::Error::internal_io(e.to_string(), Some("read stdin".to_string()))
        })?;
        buf
    } else {
        std::fs::read_to_string(source).map_err(|e| {
            botdeploy::Error::internal_io(e.to_string(), Some(format!("read {}", source)))
        })?
    };

    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

pub mod check;
pub mod config;
pub mod inspect;
pub mod run;
pub mod stamp;

/// Dispatch a command to its handler and map result to JSON.
macro_rules! dispatch {
    ($args:expr, $global:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($args, $global))
    };
}

pub(crate) fn run_json(
    command: crate::Commands,
    global: &GlobalArgs,
) -> (botdeploy::Result<serde_json::Value>, i32) {
    crate::tty::status("botdeploy is working...");

    match command {
        crate::Commands::Run(args) => dispatch!(args, global, run),
        crate::Commands::Check(args) => dispatch!(args, global, check),
        crate::Commands::Stamp(args) => dispatch!(args, global, stamp),
        crate::Commands::Inspect(args) => dispatch!(args, global, inspect),
        crate::Commands::Config(args) => dispatch!(args, global, config),
    }
}
