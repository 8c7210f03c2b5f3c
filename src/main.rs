use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{ArgGroup, Args, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};
use uuid::Uuid;

use groupscholar_cohort_network::table::load_csv;
use groupscholar_cohort_network::{
    analyze_cached, db, export, report, AbortSignal, AnalysisOptions, AnalysisResult,
    ClosenessMode, ResultCache, StudentId, StudentKey, SuggestedMapping, WeightMode,
};

#[derive(Parser)]
#[command(name = "cohort-network")]
#[command(about = "Peer-nomination network analysis for Group Scholar cohorts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct OptionArgs {
    /// TOML file with analysis options
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, value_enum)]
    weight_mode: Option<WeightMode>,
    #[arg(long, value_enum)]
    closeness_mode: Option<ClosenessMode>,
    #[arg(long)]
    similarity_threshold: Option<f64>,
    #[arg(long)]
    isolation_threshold: Option<usize>,
    #[arg(long)]
    allow_self_loops: bool,
}

impl OptionArgs {
    fn resolve(&self) -> anyhow::Result<AnalysisOptions> {
        let mut options = AnalysisOptions::load(self.config.as_deref())?;
        if let Some(mode) = self.weight_mode {
            options.weight_mode = mode;
        }
        if let Some(mode) = self.closeness_mode {
            options.closeness_mode = mode;
        }
        if let Some(threshold) = self.similarity_threshold {
            options.similarity_threshold = threshold;
        }
        if let Some(threshold) = self.isolation_threshold {
            options.isolation_threshold = threshold;
        }
        if self.allow_self_loops {
            options.allow_self_loops = true;
        }
        options.validate()?;
        Ok(options)
    }
}

#[derive(Args, Clone)]
struct InputArgs {
    #[arg(long)]
    csv: PathBuf,
    /// JSON object of column name to role
    #[arg(long)]
    mapping: PathBuf,
    #[command(flatten)]
    options: OptionArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Analyze one or more survey CSVs
    Analyze {
        #[arg(long, required = true, num_args = 1..)]
        csv: Vec<PathBuf>,
        #[arg(long)]
        mapping: PathBuf,
        #[command(flatten)]
        options: OptionArgs,
        /// Directory for nodes.csv, edges.csv and result.json
        #[arg(long)]
        out: Option<PathBuf>,
        /// Save each snapshot to Postgres
        #[arg(long)]
        persist: bool,
        #[arg(long)]
        label: Option<String>,
    },
    /// Show one student's scores and relationships
    #[command(group(
        ArgGroup::new("who")
            .args(["id", "name"])
            .required(true)
            .multiple(false)
    ))]
    Student {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long)]
        id: Option<u32>,
        #[arg(long)]
        name: Option<String>,
    },
    /// Write node, edge and JSON exports
    Export {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long, default_value = "network-export")]
        out: PathBuf,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long)]
        label: Option<String>,
        #[arg(long, default_value = "network-report.md")]
        out: PathBuf,
    },
    /// List saved runs, or print one saved run's summary
    Show {
        #[arg(long)]
        id: Option<Uuid>,
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

/// Loads one CSV and analyzes it on the blocking pool.
async fn run_one(
    csv: PathBuf,
    mapping: SuggestedMapping,
    options: AnalysisOptions,
    cache: ResultCache,
    abort: AbortSignal,
) -> anyhow::Result<Arc<AnalysisResult>> {
    tokio::task::spawn_blocking(move || {
        let table = load_csv(&csv)?;
        analyze_cached(&cache, &table, &mapping, &options, &abort)
            .with_context(|| format!("analysis of {} failed", csv.display()))
    })
    .await
    .context("analysis task panicked")?
}

/// Aborts in-flight analyses when Ctrl-C arrives.
fn watch_interrupt(abort: AbortSignal) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, aborting analysis");
            abort.abort();
        }
    })
}

async fn analyze_input(input: &InputArgs) -> anyhow::Result<Arc<AnalysisResult>> {
    let mapping = SuggestedMapping::from_json_path(&input.mapping)?;
    let options = input.options.resolve()?;
    let abort = AbortSignal::new();
    let watcher = watch_interrupt(abort.clone());
    let result = run_one(input.csv.clone(), mapping, options, ResultCache::new(), abort).await;
    watcher.abort();
    result
}

fn print_summary(source: impl std::fmt::Display, result: &AnalysisResult) {
    let summary = result.summary();
    let diagnostics = result.diagnostics();
    println!("{} (run {})", source, result.run_id());
    println!(
        "- {} students, {} connections, density {:.3}, reciprocity {:.2}",
        summary.node_count, summary.edge_count, summary.density, summary.reciprocity
    );
    println!(
        "- {} communities (modularity {:.3}), {} isolated",
        summary.community_count, summary.modularity, summary.isolated_count
    );
    if diagnostics.rows_skipped > 0 || diagnostics.ambiguous_count() > 0 {
        println!(
            "- {} rows skipped, {} ambiguous names kept separate",
            diagnostics.rows_skipped,
            diagnostics.ambiguous_count()
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::InitDb => {
            let pool = connect().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Analyze {
            csv,
            mapping,
            options,
            out,
            persist,
            label,
        } => {
            let mapping = SuggestedMapping::from_json_path(&mapping)?;
            let options = options.resolve()?;
            let pool = if persist { Some(connect().await?) } else { None };

            let cache = ResultCache::new();
            let abort = AbortSignal::new();
            let watcher = watch_interrupt(abort.clone());

            let mut tasks = Vec::new();
            for path in csv {
                let task = tokio::spawn(run_one(
                    path.clone(),
                    mapping.clone(),
                    options.clone(),
                    cache.clone(),
                    abort.clone(),
                ));
                tasks.push((path, task));
            }

            let mut failures = 0usize;
            for (path, task) in tasks {
                let result = match task.await.context("analysis task panicked")? {
                    Ok(result) => result,
                    Err(err) => {
                        failures += 1;
                        eprintln!("{}: {err:#}", path.display());
                        continue;
                    }
                };
                print_summary(path.display(), &result);

                if let Some(dir) = &out {
                    let stem = path
                        .file_stem()
                        .map(|stem| stem.to_string_lossy().into_owned())
                        .unwrap_or_else(|| result.run_id().to_string());
                    export::export_all(&result, &dir.join(stem))?;
                }
                if let Some(pool) = &pool {
                    let id = db::save_result(pool, &result, label.as_deref()).await?;
                    println!("- saved as {id}");
                }
            }
            watcher.abort();

            if failures > 0 {
                anyhow::bail!("{failures} of the inputs could not be analyzed");
            }
        }
        Commands::Student { input, id, name } => {
            let result = analyze_input(&input).await?;
            let key = match (&id, &name) {
                (Some(id), _) => StudentKey::Id(StudentId(*id)),
                (None, Some(name)) => StudentKey::Name(name),
                (None, None) => anyhow::bail!("pass --id or --name"),
            };
            let Some(profile) = result.profile(key) else {
                println!("No matching student in this network.");
                return Ok(());
            };

            let student = &profile.student;
            println!("{} ({})", student.display_name, student.id);
            if student.aliases.len() > 1 {
                println!("- also written as: {}", student.aliases.join(", "));
            }
            println!(
                "- degree {} ({} in / {} out), centrality {:.3}",
                student.degree, student.in_degree, student.out_degree, student.degree_centrality
            );
            println!(
                "- closeness {:.3}, betweenness {:.3}, community {}{}",
                student.closeness,
                student.betweenness,
                student.community + 1,
                if student.isolated { ", isolated" } else { "" }
            );
            for counts in &profile.by_relation {
                println!(
                    "- {}: gave {}, received {}",
                    counts.relation, counts.given, counts.received
                );
            }
            let flagged = result
                .avoidance()
                .warnings
                .iter()
                .filter(|warning| warning.students().contains(&student.id))
                .count();
            if flagged > 0 {
                println!("- named in {flagged} avoidance warnings (see the report)");
            }
        }
        Commands::Export { input, out } => {
            let result = analyze_input(&input).await?;
            let written = export::export_all(&result, &out)?;
            for path in written {
                println!("Wrote {}.", path.display());
            }
        }
        Commands::Report { input, label, out } => {
            let result = analyze_input(&input).await?;
            let report = report::build_report(label.as_deref(), &result);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Show { id, limit } => {
            let pool = connect().await?;
            match id {
                Some(id) => {
                    let Some(stored) = db::fetch_result(&pool, id).await? else {
                        println!("No saved run {id}.");
                        return Ok(());
                    };
                    println!(
                        "{} saved {} (updated {})",
                        stored.label.as_deref().unwrap_or("unlabelled run"),
                        stored.created_at,
                        stored.updated_at
                    );
                    print_summary(id, &stored.result);
                }
                None => {
                    let runs = db::list_runs(&pool, limit).await?;
                    if runs.is_empty() {
                        println!("No saved runs.");
                        return Ok(());
                    }
                    for run in runs {
                        println!(
                            "- {} {} on {}: {} students, {} connections, {} communities, {} isolated",
                            run.id,
                            run.label.as_deref().unwrap_or("unlabelled"),
                            run.created_at,
                            run.node_count,
                            run.edge_count,
                            run.community_count,
                            run.isolated_count
                        );
                    }
                }
            }
        }
    }

    Ok(())
}
