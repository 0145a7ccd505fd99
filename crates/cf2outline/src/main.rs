use std::path::PathBuf;

use anyhow::Result;
use cf2outline_core::clean::{CleanOptions, clean_collection};
use cf2outline_core::config::load_config;
use cf2outline_core::migrate::{MigrateOptions, run_migration};
use cf2outline_core::runtime::{
    PathOverrides, ResolutionContext, ResolvedPaths, normalize_for_display, resolve_paths,
};
use clap::{Args, CommandFactory, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "cf2outline",
    version,
    about = "Migrate a Confluence space into an Outline collection"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    project_root: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH", help = "Directory for exported pages awaiting import")]
    staging_dir: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH", help = "Directory for urlMap.json and review lists")]
    output_dir: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        value_name = "LEVEL",
        default_value = "info",
        value_parser = ["trace", "debug", "info", "warn", "error"],
        help = "Log level when RUST_LOG is unset"
    )]
    log_level: String,
    #[arg(long, global = true, help = "Print resolved runtime diagnostics")]
    diagnostics: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    project_root: Option<PathBuf>,
    config: Option<PathBuf>,
    staging_dir: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    diagnostics: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            project_root: cli.project_root.clone(),
            config: cli.config.clone(),
            staging_dir: cli.staging_dir.clone(),
            output_dir: cli.output_dir.clone(),
            diagnostics: cli.diagnostics,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Import a space's page tree and rewrite its internal links")]
    Migrate(MigrateArgs),
    #[command(about = "Delete every document in a collection")]
    Clean(CleanArgs),
}

#[derive(Debug, Args)]
struct MigrateArgs {
    #[arg(long, value_name = "SPACE_KEY", help = "Confluence space key")]
    from: String,
    #[arg(long, value_name = "COLLECTION_ID", help = "Outline collection UUID")]
    to: String,
    #[arg(long, value_name = "REGEX", help = "List documents matching this pattern in Marked.json")]
    mark: Option<String>,
}

#[derive(Debug, Args)]
struct CleanArgs {
    #[arg(long, value_name = "COLLECTION_ID", help = "Outline collection UUID")]
    collection: String,
    #[arg(long, help = "List documents without deleting them")]
    dry_run: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);
    let runtime = RuntimeOptions::from_cli(&cli);

    match cli.command {
        Some(Commands::Migrate(args)) => run_migrate(&runtime, args),
        Some(Commands::Clean(args)) => run_clean(&runtime, args),
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run_migrate(runtime: &RuntimeOptions, args: MigrateArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    let report = run_migration(
        &paths,
        &config,
        &MigrateOptions {
            space_key: args.from,
            collection_id: args.to,
            review_pattern: args.mark,
        },
    )?;

    println!("migrate");
    println!("space: {} ({})", report.space_key, report.space_name);
    println!(
        "collection: {} ({})",
        report.collection_id, report.collection_name
    );
    println!("imported: {}", report.imported);
    println!("url_map_entries: {}", report.url_map_entries);
    println!("rewritten: {}", report.rewritten);
    println!("changed: {}", report.changed);
    println!("broken_links: {}", report.broken_links);
    println!("marked: {}", report.marked);
    println!("confluence_requests: {}", report.source_request_count);
    println!("outline_requests: {}", report.destination_request_count);
    println!("url_map: {}", normalize_for_display(&report.url_map_path));
    println!(
        "broken_links_file: {}",
        normalize_for_display(&report.broken_links_path)
    );
    println!("marked_file: {}", normalize_for_display(&report.marked_path));
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }

    Ok(())
}

fn run_clean(runtime: &RuntimeOptions, args: CleanArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    let report = clean_collection(
        &config,
        &args.collection,
        &CleanOptions {
            dry_run: args.dry_run,
        },
    )?;

    println!("clean");
    println!(
        "collection: {} ({})",
        report.collection_id, report.collection_name
    );
    println!("dry_run: {}", format_flag(report.dry_run));
    println!("found: {}", report.found);
    println!("deleted: {}", report.deleted.len());
    println!("removed_with_parent: {}", report.removed_with_parent);
    println!("outline_requests: {}", report.request_count);
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }

    Ok(())
}

fn resolve_runtime_paths(runtime: &RuntimeOptions) -> Result<ResolvedPaths> {
    dotenvy::dotenv().ok();

    let context = ResolutionContext::from_process()?;
    let overrides = PathOverrides {
        project_root: runtime.project_root.clone(),
        config: runtime.config.clone(),
        staging_dir: runtime.staging_dir.clone(),
        output_dir: runtime.output_dir.clone(),
    };

    let initial = resolve_paths(&context, &overrides)?;
    let project_env = initial.project_root.join(".env");
    if project_env.exists() {
        let _ = dotenvy::from_path_override(&project_env);
    }

    resolve_paths(&context, &overrides)
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
