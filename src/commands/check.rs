use clap::Args;
use serde::Serialize;

use botdeploy::trigger::{TriggerDecision, TriggerEvent, TriggerPolicy};

use super::{CmdResult, SettingsArgs, TriggerArgs};

#[derive(Args)]
pub struct CheckArgs {
    #[command(flatten)]
    pub settings: SettingsArgs,

    #[command(flatten)]
    pub trigger: TriggerArgs,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckOutput {
    pub event: TriggerEvent,
    pub policy: TriggerPolicy,
    pub proceed: bool,
    pub decision: TriggerDecision,
}

/// Exit 0 either way; a skip is not an error.
pub fn run(args: CheckArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<CheckOutput> {
    let settings = args.settings.resolve()?;
    let event = args.trigger.event()?;
    let policy = settings.trigger_policy();
    let decision = policy.evaluate(&event);

    Ok((
        CheckOutput {
            proceed: decision.proceeds(),
            event,
            policy,
            decision,
        },
        0,
    ))
}
