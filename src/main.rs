use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use catalogsql::config::Config;
use catalogsql::db::{create_client, PostgresStorage};
use catalogsql::mapping::{MappingFile, MappingSet, SchemaStore};
use catalogsql::translation::{translate_offline, Translator};
use clap::{ArgAction, Parser, Subcommand};
use tracing::{info, Level};

/// Translate logical business-data queries into PostgreSQL
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Translate one query read from a file or stdin
    Translate {
        /// Use a JSON mapping file instead of the database
        #[arg(long)]
        mappings: Option<PathBuf>,
        /// Query file; `-` or nothing reads stdin
        query: Option<PathBuf>,
    },
    /// Replace the stored mappings with the contents of a JSON mapping file
    WriteMappings { file: PathBuf },
    /// Print the stored mapping of a logical table
    Show { table: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Translate { mappings, query } => {
            let sql = read_query(query.as_deref())?;
            let output = match mappings {
                Some(path) => {
                    let file = MappingFile::load(&path)?;
                    let set = MappingSet::new(file.tables)?;
                    set.validate()?;
                    translate_offline(&sql, &set)?
                }
                None => {
                    let store = open_store(cli.config.as_deref()).await?;
                    Translator::new(Arc::new(store)).translate(&sql).await?
                }
            };
            println!("{}", output);
        }
        Command::WriteMappings { file } => {
            let file = MappingFile::load(&file)?;
            MappingSet::new(file.tables.iter().cloned())?.validate()?;
            let store = open_store(cli.config.as_deref()).await?;
            store.write_table_mappings(&file.tables).await?;
            store.write_enum_mappings(&file.enums).await?;
            info!(
                tables = file.tables.len(),
                enums = file.enums.len(),
                "mappings written"
            );
        }
        Command::Show { table } => {
            let store = open_store(cli.config.as_deref()).await?;
            match store.resolve_by_logical_name(&table).await? {
                Some(mapping) => println!("{}", serde_json::to_string_pretty(mapping.as_ref())?),
                None => bail!("no mapping for table [{}]", table),
            }
        }
    }

    Ok(())
}

async fn open_store(config_path: Option<&Path>) -> Result<SchemaStore<PostgresStorage>> {
    let config = Config::load(config_path)?;
    let client = create_client(&config.database).await?;
    Ok(SchemaStore::new(PostgresStorage::new(client)))
}

fn read_query(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read query file: {}", path.display())),
        _ => {
            let mut sql = String::new();
            std::io::stdin()
                .read_to_string(&mut sql)
                .context("Failed to read query from stdin")?;
            Ok(sql)
        }
    }
}
