use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::anyhow;
use clap::Parser as ClapParser;
use clap::Subcommand;
use indexmap::IndexMap;
use rayon::prelude::*;
use serde::Serialize;
use sqlineage::analyzer::SqlAnalyzer;
use sqlineage::model::{FieldLineage, ParseResult};

#[derive(clap::Parser)]
#[command(name = "sqlineage")]
#[command(about = "SQL structure parser and field lineage analyzer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze the structure and field lineage of one or more SQL files.
    Analyze(AnalyzeCommand),
}

#[derive(clap::Args)]
struct AnalyzeCommand {
    /// Path to the SQL file or directory containing SQL files, `-` for stdin.
    #[arg(value_name = "SQL_[FILE|DIR]|-")]
    sql: PathBuf,
    /// Output only the lineage of each statement.
    #[arg(long)]
    lineage_only: bool,
    /// Pretty-print the output.
    #[arg(long)]
    pretty: bool,
}

#[derive(Serialize)]
#[serde(untagged)]
enum OutAnalysis {
    Full(Box<ParseResult>),
    Lineage {
        success: bool,
        lineage: Option<Vec<FieldLineage>>,
        error: Option<String>,
    },
}

impl OutAnalysis {
    fn new(result: ParseResult, lineage_only: bool) -> Self {
        if lineage_only {
            OutAnalysis::Lineage {
                success: result.success,
                lineage: result.lineage,
                error: result.error,
            }
        } else {
            OutAnalysis::Full(Box::new(result))
        }
    }
}

fn read_sql(sql_path: &Path) -> anyhow::Result<String> {
    if sql_path == Path::new("-") {
        let mut sql = String::new();
        std::io::stdin()
            .read_to_string(&mut sql)
            .map_err(|err| anyhow!("Failed to read sql from stdin due to error: {}", err))?;
        return Ok(sql);
    }
    std::fs::read_to_string(sql_path)
        .map_err(|_| anyhow!("Failed to read sql file {}", sql_path.display()))
}

fn to_json<T: Serialize>(value: &T, pretty: bool) -> anyhow::Result<String> {
    let out_str = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(out_str)
}

fn main() -> anyhow::Result<()> {
    let now = Instant::now();

    env_logger::init();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Analyze(analyze_command) => {
            let analyzer = SqlAnalyzer::new();
            let sql_file_or_dir = &analyze_command.sql;

            let out_str = if sql_file_or_dir.is_dir() {
                let mut sql_in_dir: Vec<_> = std::fs::read_dir(sql_file_or_dir)?
                    .filter_map(|res| res.ok())
                    .map(|entry| entry.path())
                    .filter(|file| file.extension().is_some_and(|ext| ext == "sql"))
                    .collect();
                sql_in_dir.sort();
                log::info!("Analyzing {} sql files", sql_in_dir.len());

                let analyses = sql_in_dir
                    .par_iter()
                    .map(|sql_file| {
                        let sql = read_sql(sql_file)?;
                        let key = std::path::absolute(sql_file)?.display().to_string();
                        let result = analyzer.analyze(&sql);
                        anyhow::Ok((key, OutAnalysis::new(result, analyze_command.lineage_only)))
                    })
                    .collect::<anyhow::Result<Vec<_>>>()?;
                let file_analyses: IndexMap<String, OutAnalysis> = analyses.into_iter().collect();

                to_json(&file_analyses, analyze_command.pretty)?
            } else {
                let sql = read_sql(sql_file_or_dir)?;
                let result = analyzer.analyze(&sql);
                if !result.success {
                    log::warn!(
                        "Could not analyze sql: {}",
                        result.error.as_deref().unwrap_or_default()
                    );
                }
                to_json(
                    &OutAnalysis::new(result, analyze_command.lineage_only),
                    analyze_command.pretty,
                )?
            };
            println!("{}", out_str);
        }
    }

    let elapsed = now.elapsed();
    log::info!("Elapsed: {:.2?}", elapsed);

    Ok(())
}
