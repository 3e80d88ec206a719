mod app;
mod cli;

use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = cli::parse();
    app::run(cli)
}
