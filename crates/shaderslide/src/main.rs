mod cli;
mod paths;
mod run;
mod settings;

use anyhow::Result;
use cli::Command;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    match cli.command {
        Some(Command::Frames(args)) => run::frames(cli.run, args),
        Some(Command::Effects(args)) => run::effects(cli.run, args),
        Some(Command::Check(args)) => run::check(args),
        None => run::run_window(cli.run),
    }
}
