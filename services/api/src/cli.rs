use crate::demo::{run_demo, DemoArgs};
use crate::infra::run_catalog_import;
use crate::server;
use assessment_workflow::error::AppError;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "Assessment Workflow",
    about = "Run the compliance assessment service or exercise it from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Manage the pillar/question/choice catalog
    Catalog {
        #[command(subcommand)]
        command: CatalogCommand,
    },
    /// Walk a company and an auditor through a full assessment against an in-memory store
    Demo(DemoArgs),
}

#[derive(Subcommand, Debug)]
enum CatalogCommand {
    /// Import a catalog CSV into the configured database
    Import(ImportArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Override the configured SQLite database path
    #[arg(long)]
    pub(crate) database: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct ImportArgs {
    /// Catalog CSV with pillar_key,pillar_name,pillar_weight,question,question_detail,choice,point columns
    pub(crate) path: PathBuf,
    /// SQLite database to write to (defaults to APP_DATABASE_PATH; validates only when unset)
    #[arg(long)]
    pub(crate) database: Option<PathBuf>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Catalog {
            command: CatalogCommand::Import(args),
        } => run_catalog_import(args),
        Command::Demo(args) => run_demo(args),
    }
}
