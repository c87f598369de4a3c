use clap::Parser;

use pp_cli::{run, summary, Cli};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli.init_tracing();

    let result = run(&cli)?;
    println!("{}", summary(&result));
    Ok(())
}
