use anyhow::Result;
use clap::Parser;
use satin_config::cli::{self, Args};

fn main() -> Result<()> {
    let _logging = satin_logging::init_subscriber();
    let args = Args::parse();
    cli::execute(args)
}
