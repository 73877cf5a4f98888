use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = booking_ledger_cli::Cli::parse();
    booking_ledger_cli::init_tracing(cli.log_level());
    booking_ledger_cli::run_cli(cli)
}
