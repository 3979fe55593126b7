use clap::{Parser, Subcommand};

use commands::GlobalArgs;

mod commands;
mod output;
mod tty;

use commands::{check, config, inspect, run, stamp};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "botdeploy")]
#[command(version = VERSION)]
#[command(about = "Stamp, ship and restart a single-file bot on its host")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the deploy pipeline for one trigger event
    Run(run::RunArgs),
    /// Evaluate the trigger filter without deploying
    Check(check::CheckArgs),
    /// Stamp the current time into the local artifact
    Stamp(stamp::StampArgs),
    /// Show the marker line of the local artifact
    Inspect(inspect::InspectArgs),
    /// Inspect resolved configuration
    Config(config::ConfigArgs),
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let global = GlobalArgs {};

    let (json_result, exit_code) = commands::run_json(cli.command, &global);
    let _ = output::print_json_result(json_result, exit_code);

    std::process::ExitCode::from(exit_code_to_u8(exit_code))
}

fn exit_code_to_u8(code: i32) -> u8 {
    if code <= 0 {
        0
    } else if code >= 255 {
        255
    } else {
        code as u8
    }
}
