use clap::Parser;

use tick_array::cli::Cli;
use tick_array::commands;
use tick_array::lang::Signal;
use tick_array::release::session_header;
use tick_array::session::Session;

fn main() -> Result<(), Signal> {
    let cli = Cli::parse();
    let command = cli.command.clone();
    let session = Session::from(cli);

    env_logger::Builder::new()
        .filter_level(session.log_filter())
        .parse_default_env()
        .init();

    log::info!("{}", session_header());
    let backend = session.install();
    log::debug!("using {backend} vector backend with {} threads", session.pool().n_threads());

    println!("{}", commands::run(&session, &command)?);
    Ok(())
}
