use clap::Args;

use botdeploy::clock::SystemClock;
use botdeploy::config::{DeployConfig, Secrets};
use botdeploy::lock::RunLock;
use botdeploy::pipeline::{Pipeline, RunReport};
use botdeploy::ssh::SshConnector;

use super::{CmdResult, SettingsArgs, TriggerArgs};

#[derive(Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub settings: SettingsArgs,

    #[command(flatten)]
    pub trigger: TriggerArgs,

    /// Refuse to start while another local run targets the same host and service
    #[arg(long)]
    pub lock: bool,
}

pub fn run(args: RunArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<RunReport> {
    let settings = args.settings.resolve()?;
    let event = args.trigger.event()?;
    let secrets = Secrets::from_env()?;
    let config = DeployConfig::new(settings, secrets);

    let _lock = if args.lock {
        Some(RunLock::acquire(&config.target_identity()?)?)
    } else {
        None
    };

    let connector = SshConnector;
    let clock = SystemClock;
    let report = Pipeline::new(config, &connector, &clock).run(event);
    let exit_code = report.exit_code();

    Ok((report, exit_code))
}
