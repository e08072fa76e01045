//! Assay CLI - report processing pipeline.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing(verbose: bool, log_json: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    if log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let db = cli.db;
    let result = match cli.command {
        Commands::Submit {
            file,
            provider,
            model,
            json,
        } => commands::submit::run(&db, file, provider, model, json).await,

        Commands::Get { id, metrics, json } => commands::get::run(&db, &id, metrics, json).await,

        Commands::List {
            status,
            filename,
            offset,
            limit,
            json,
        } => commands::list::run(&db, status, filename, offset, limit, json).await,

        Commands::Retry {
            id,
            file,
            provider,
            model,
            json,
        } => commands::retry::run(&db, &id, file, provider, model, json).await,

        Commands::Recover { json } => commands::recover::run(&db, json).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
