use clap::Args;
use serde::Serialize;
use std::path::Path;

use botdeploy::marker::Marker;
use botdeploy::transfer::sha256_hex;
use botdeploy::utils::io;

use super::{CmdResult, SettingsArgs};

#[derive(Args)]
pub struct InspectArgs {
    #[command(flatten)]
    pub settings: SettingsArgs,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectOutput {
    pub path: String,
    pub key: String,
    pub line: usize,
    pub value: String,
    pub bytes: usize,
    pub sha256: String,
}

pub fn run(args: InspectArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<InspectOutput> {
    let settings = args.settings.resolve()?;
    let marker = Marker::new(&settings.artifact.marker_key)?;
    let text = io::read_file(Path::new(&settings.artifact.path), "read artifact")?;
    let found = marker.locate(&text)?;

    Ok((
        InspectOutput {
            path: settings.artifact.path.clone(),
            key: marker.key().to_string(),
            line: found.line,
            value: found.value,
            bytes: text.len(),
            sha256: sha256_hex(text.as_bytes()),
        },
        0,
    ))
}
