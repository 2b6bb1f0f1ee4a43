use anyhow::Result;
use env_logger::{Builder, Env};
use log::error;

mod cli;
mod cmd_checkpoint;
mod cmd_cleanup;
mod cmd_init;
mod cmd_status;

fn init_logger() {
    // Уровень берём из RUST_LOG, иначе дефолт - info.
    // Пример: RUST_LOG=debug quivergist cleanup --path ./idx
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn main() {
    init_logger();

    if let Err(e) = run() {
        error!("{:?}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = cli::Cli::parse();
    match cli.cmd {
        cli::Cmd::Init { path, page_size, unlogged } =>
            cmd_init::exec(path, page_size, unlogged),

        cli::Cmd::Cleanup { path, heap_tuples, json } =>
            cmd_cleanup::exec(path, heap_tuples, json),

        cli::Cmd::Status { path, json } =>
            cmd_status::exec(path, json),

        cli::Cmd::Checkpoint { path } =>
            cmd_checkpoint::exec(path),
    }
}
