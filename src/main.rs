use clap::{Parser, Subcommand, builder::styling};
use databuilder::cli;
use eyre::Result;
use owo_colors::OwoColorize;
use std::path::PathBuf;

// CLI Styling
const STYLES: styling::Styles = styling::Styles::styled()
    .header(styling::AnsiColor::BrightWhite.on_default())
    .usage(styling::AnsiColor::BrightWhite.on_default())
    .literal(styling::AnsiColor::Green.on_default())
    .placeholder(styling::AnsiColor::Cyan.on_default());

/// Databuilder: stage catalog metadata and publish it to Neo4j and Elasticsearch
#[derive(Parser)]
#[command(name = "databuilder", version, styles = STYLES)]
struct Cli {
    /// The dotenv file to source credentials from (ignored when missing)
    #[arg(short, long, global = true, default_value = ".env")]
    env: String,

    /// More verbose logging
    #[arg(long, global = true)]
    debug: bool,

    /// Command to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a job: extract, transform, stage and publish
    Run {
        /// Job config file (YAML, JSON or JSON5)
        config: PathBuf,
    },

    /// Publish files staged by an earlier run without extracting again
    Publish {
        /// Job config file (YAML, JSON or JSON5)
        config: PathBuf,
    },

    /// Delete Neo4j entities the latest publish did not refresh
    RemoveStale {
        /// Job config file with a task.remove_stale_data section
        config: PathBuf,

        /// Report what would be deleted without deleting anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Test the connection to Neo4j
    Ping {
        /// Job config file holding the Neo4j settings
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match dotenvy::from_filename(&cli.env) {
        Ok(_) => {}
        Err(err) if err.not_found() => {}
        Err(err) => return Err(err.into()),
    }

    let log_level = match cli.debug {
        true => "debug",
        false => "info",
    };
    let env = env_logger::Env::default().filter_or("LOG_LEVEL", log_level);
    env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .init();

    match cli.command {
        Commands::Run { config } => {
            log::info!("Running job from {}", config.display().bright_black());
            let conf = cli::load_job_config(&config)?;
            let report = cli::run_job(&conf).await?;
            log::info!(
                "Extracted {}, loaded {}, filtered {} in {:.2?}",
                report.task.extracted.cyan(),
                report.task.loaded.green(),
                report.task.filtered.yellow(),
                report.elapsed
            );
        }
        Commands::Publish { config } => {
            log::info!("Publishing staged files from {}", config.display().bright_black());
            let conf = cli::load_job_config(&config)?;
            cli::publish_staged(&conf).await?;
            log::info!("{}", "Publish complete".green());
        }
        Commands::RemoveStale { config, dry_run } => {
            log::info!(
                "Removing stale data{} using {}",
                match dry_run {
                    true => " (dry run)",
                    false => "",
                }
                .cyan(),
                config.display().bright_black()
            );
            let conf = cli::load_job_config(&config)?;
            let report = cli::remove_stale(&conf, dry_run).await?;
            for stat in &report.stats {
                log::info!(
                    "{} {}: {} of {} stale ({:.1}%), {} deleted",
                    stat.kind,
                    stat.name.cyan(),
                    stat.stale.yellow(),
                    stat.total,
                    stat.stale_pct(),
                    stat.deleted.red()
                );
            }
            match report.dry_run {
                true => log::info!("Dry run, nothing deleted"),
                false => log::info!("Deleted {} stale entities", report.deleted().red()),
            }
        }
        Commands::Ping { config } => {
            let conf = cli::load_job_config(&config)?;
            match cli::ping(&conf).await? {
                Some(version) => log::info!("Connected to Neo4j {}", version.green()),
                None => log::info!("Connected to Neo4j (version not reported)"),
            }
        }
    }

    Ok(())
}
