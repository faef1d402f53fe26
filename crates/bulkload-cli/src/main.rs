//! bulkload CLI (loadctl)
//!
//! Command-line front end for the CSV import pipeline.
//!
//! ## Quick Start
//!
//! ```bash
//! # Transform three CSV files into a backup under /tmp/backup
//! loadctl import \
//!     --schema 'CREATE TABLE users (id INT PRIMARY KEY, name TEXT)' \
//!     --temp file:///tmp/backup \
//!     file:///data/users-1.csv file:///data/users-2.csv
//!
//! # Same, but the schema lives next to the data
//! loadctl import --table users \
//!     --schema-file file:///data/users.sql \
//!     --temp file:///tmp/backup \
//!     file:///data/users-1.csv
//!
//! # Pipe-separated input with a NULL sentinel and smaller segments
//! loadctl import --schema "$DDL" --temp file:///tmp/backup \
//!     --delimiter '|' --nullif 'NA' --sstsize 16MiB file:///data/rows.csv
//! ```
//!
//! The command runs in transform-only mode: it stops after writing the
//! backup descriptor and prints the summary row as JSON. Restoring the
//! backup into a cluster is a separate operation.
//!
//! Logging goes to stderr and honors `RUST_LOG` (e.g.
//! `RUST_LOG=bulkload_pipeline=debug`).

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use bulkload_pipeline::{ImportRequest, Importer, StaticCluster};

#[derive(Parser)]
#[command(name = "loadctl")]
#[command(about = "bulkload command-line tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert CSV files into backup format
    Import {
        /// Target table name (defaults to the name in the schema)
        #[arg(long, default_value = "")]
        table: String,

        /// Inline CREATE TABLE statement
        #[arg(long, conflicts_with = "schema_file")]
        schema: Option<String>,

        /// URI of a file holding the CREATE TABLE statement
        #[arg(long)]
        schema_file: Option<String>,

        /// Working directory URI for segments and the descriptor
        #[arg(long)]
        temp: String,

        /// CSV field separator (single character)
        #[arg(long)]
        delimiter: Option<String>,

        /// Line-comment prefix (single character)
        #[arg(long)]
        comment: Option<String>,

        /// Exact string treated as NULL
        #[arg(long)]
        nullif: Option<String>,

        /// Maximum SST segment size, human readable (e.g. 32MiB)
        #[arg(long)]
        sstsize: Option<String>,

        /// Run the distributed topology across synthetic local workers
        #[arg(long)]
        distributed: bool,

        /// Worker count for --distributed
        #[arg(long, default_value_t = 4)]
        nodes: u32,

        /// CSV data file URIs
        #[arg(required = true)]
        files: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Import {
            table,
            schema,
            schema_file,
            temp,
            delimiter,
            comment,
            nullif,
            sstsize,
            distributed,
            nodes,
            files,
        } => {
            if schema.is_none() && schema_file.is_none() {
                bail!("one of --schema or --schema-file is required");
            }

            let mut options = BTreeMap::new();
            options.insert("temp".to_string(), temp);
            // The CLI always stops after the transform; restoring is a
            // separate operation against the produced backup.
            options.insert("transform_only".to_string(), String::new());
            if let Some(delimiter) = delimiter {
                options.insert("delimiter".to_string(), delimiter);
            }
            if let Some(comment) = comment {
                options.insert("comment".to_string(), comment);
            }
            if let Some(nullif) = nullif {
                options.insert("nullif".to_string(), nullif);
            }
            if let Some(sstsize) = sstsize {
                options.insert("sstsize".to_string(), sstsize);
            }
            if distributed {
                options.insert("distributed".to_string(), String::new());
            }

            let mut importer = Importer::new();
            if distributed {
                importer = importer.with_cluster(Arc::new(StaticCluster::local(nodes)));
            }

            let summary = importer
                .import(ImportRequest {
                    table,
                    create_table: schema,
                    create_file: schema_file,
                    files,
                    options,
                })
                .await
                .context("import failed")?;

            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
    }
}
