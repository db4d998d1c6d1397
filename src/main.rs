use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nl2sql_engine::db::{QueryParam, SyntaxCheck};
use nl2sql_engine::{logging, AppConfig, QueryWorkflow, WorkflowFailure};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "nl2sql")]
#[command(about = "Answer natural-language questions with validated, read-only SQL")]
struct Args {
    /// SQLite database file (or set DATABASE_PATH)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// LLM provider: openai or google (or set LLM_PROVIDER)
    #[arg(long, global = true)]
    provider: Option<String>,

    /// Log level (or set LOG_LEVEL / RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate, validate and execute SQL for a question
    Ask { question: String },
    /// Print the live schema description
    Schema,
    /// Generate SQL for a question without executing it
    Generate { question: String },
    /// Check the syntax of a SELECT statement
    Check { sql: String },
    /// Validate and execute a SELECT statement
    Execute {
        sql: String,
        /// Positional bind parameter, parsed as JSON when possible
        #[arg(long = "param")]
        params: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let database = args.database.clone();
    let provider = args.provider.clone();
    let config = AppConfig::from_lookup(|key| match key {
        "DATABASE_PATH" => database
            .as_ref()
            .map(|p| p.display().to_string())
            .or_else(|| std::env::var(key).ok()),
        "LLM_PROVIDER" => provider.clone().or_else(|| std::env::var(key).ok()),
        _ => std::env::var(key).ok(),
    })
    .context("Failed to load configuration")?;

    logging::init(args.log_level.as_deref().unwrap_or(&config.log_level));
    info!("nl2sql starting (provider: {})", config.llm.provider);

    let workflow = QueryWorkflow::from_config(&config).context("Failed to initialize the query workflow")?;

    match args.command {
        Command::Ask { question } => {
            let response = workflow.answer(&question).await;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Schema => match workflow.schema_description().await {
            Ok(schema) => println!("{}", schema),
            Err(e) => print_failure(&e)?,
        },
        Command::Generate { question } => match workflow.generate_sql(&question).await {
            Ok(sql) => println!("{}", sql),
            Err(e) => print_failure(&e)?,
        },
        Command::Check { sql } => match workflow.check_query(&sql).await {
            Ok(SyntaxCheck::Valid) => println!("SQL syntax is valid."),
            Ok(SyntaxCheck::Invalid(diagnostic)) => println!("SQL syntax error: {}", diagnostic),
            Err(e) => print_failure(&e)?,
        },
        Command::Execute { sql, params } => {
            let params: Vec<QueryParam> = params.iter().map(|p| parse_param(p)).collect();
            match workflow.validate_and_execute(&sql, &params).await {
                Ok(rows) => println!("{}", serde_json::to_string_pretty(&rows)?),
                Err(e) => print_failure(&e)?,
            }
        }
    }

    Ok(())
}

fn parse_param(raw: &str) -> QueryParam {
    serde_json::from_str(raw).unwrap_or_else(|_| QueryParam::String(raw.to_string()))
}

fn print_failure(error: &nl2sql_engine::WorkflowError) -> Result<()> {
    let failure = WorkflowFailure::from(error);
    eprintln!("{}", serde_json::to_string_pretty(&failure)?);
    std::process::exit(1);
}
