use clap::Args;
use serde::Serialize;
use std::path::Path;

use botdeploy::clock::{format_stamp, Clock, SystemClock};
use botdeploy::marker::Marker;
use botdeploy::utils::io;

use super::{CmdResult, SettingsArgs};

#[derive(Args)]
pub struct StampArgs {
    #[command(flatten)]
    pub settings: SettingsArgs,

    /// Print the stamped text instead of writing the file
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StampOutput {
    pub path: String,
    pub line: usize,
    pub previous: String,
    pub stamp: String,
    pub written: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

pub fn run(args: StampArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<StampOutput> {
    let settings = args.settings.resolve()?;
    let path = Path::new(&settings.artifact.path);

    let marker = Marker::new(&settings.artifact.marker_key)?;
    let original = io::read_file(path, "read artifact")?;
    let previous = marker.locate(&original)?;

    let stamp = format_stamp(SystemClock.now());
    let stamped = marker.inject(&original, &stamp)?;

    let written = !args.dry_run && stamped != original;
    if written {
        io::write_file_atomic(path, &stamped, "write stamped artifact")?;
    }

    Ok((
        StampOutput {
            path: settings.artifact.path.clone(),
            line: previous.line,
            previous: previous.value,
            stamp,
            written,
            content: args.dry_run.then_some(stamped),
        },
        0,
    ))
}
