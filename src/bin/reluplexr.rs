//! Command-line front end: solves a query file.

use std::{io::Read, path::PathBuf, time::Duration};

use anyhow::Context;
use clap::Parser;
use reluplexr::{query::parse_query, FinalStatus};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "reluplexr")]
#[command(version, about = "Linear real arithmetic solver with ReLU constraints", long_about = None)]
struct Cli {
    /// Query file, standard input if absent
    input: Option<PathBuf>,

    /// Write the solver's progress messages to this file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print the tableau on every split and backtrack
    #[arg(long)]
    dump_states: bool,

    /// Fix ReLU pairs whose bounds almost force a phase
    #[arg(long)]
    almost_broken: bool,

    /// Stop the search after this many seconds
    #[arg(long)]
    timeout: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    let input = match &cli.input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("could not read {}", path.display()))?,
        None => {
            eprintln!("c waiting for data on standard input");
            let mut input = String::new();
            std::io::stdin().read_to_string(&mut input)?;
            input
        }
    };

    let mut solver = parse_query(&input)?;
    solver.set_logging(cli.verbose >= 2);
    solver.set_dump_states(cli.dump_states);
    solver.toggle_almost_broken_relu_elimination(cli.almost_broken);

    let token = solver.cancellation_token();
    ctrlc::set_handler(move || token.cancel())
        .context("could not install the Ctrl-C handler")?;
    if let Some(seconds) = cli.timeout {
        let token = solver.cancellation_token();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_secs(seconds));
            token.cancel();
        });
    }

    let status = match &cli.output {
        Some(path) => solver.solve_with_output(path)?,
        None => solver.solve(),
    };

    println!("s {status}");
    if status == FinalStatus::Sat {
        for (var, value) in solver.assignments().unwrap_or_default().iter().enumerate() {
            println!("v x{var} = {value}");
        }
    }
    if let Some(err) = solver.error() {
        eprintln!("error {}: {err}", err.code());
    }
    Ok(())
}
