//! dawid-skene CLI - estimate true item classes from noisy labels.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dawid_skene::models::{InitStrategy, OutputFormat};
use dawid_skene::{Config, LabelingPipeline};
use std::path::PathBuf;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "dawid-skene")]
#[command(version)]
#[command(about = "Dawid-Skene EM estimation of true item classes from noisy labels")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "dawid-skene.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run EM over a label file and write per-item labels
    Run {
        /// Path to input label file
        #[arg(short, long)]
        input: PathBuf,

        /// Path to output label file
        #[arg(short, long)]
        output: PathBuf,

        /// Label type name (must be configured in [[label_types]])
        #[arg(short, long)]
        label_type: String,

        /// Path for a JSON run report
        #[arg(long)]
        report: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,

        /// Initialization strategy
        #[arg(long, value_enum)]
        init: Option<InitStrategy>,

        /// Seed for the random initializer
        #[arg(long)]
        seed: Option<u64>,

        /// Iteration bound
        #[arg(long)]
        max_iterations: Option<usize>,

        /// Convergence tolerance
        #[arg(long)]
        tolerance: Option<f64>,
    },

    /// Validate configuration file
    Validate,

    /// Show example configuration
    Example,
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");
}

fn print_example_config() {
    let example = r#"# dawid-skene configuration file

[em]
tolerance = 1e-5
max_iterations = 100
init = "average"  # average | random | majority
# seed = 42

[input]
classes = [0, 1]

[output]
format = "csv"  # csv | jsonl
# report = "output/report.json"

# am_noise: 0 = class-1 labels are trusted, 1 = no overrides, 2 = gold class-1 labels are trusted
[[label_types]]
name = "observed"
am_noise = 0

[[label_types]]
name = "crowd"
am_noise = 1

[[label_types]]
name = "reviewed"
am_noise = 2
description = "gold reviews override the estimate"
"#;
    println!("{example}");
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Example => {
            print_example_config();
            return Ok(());
        }

        Commands::Validate => {
            let config = Config::from_file(&cli.config)
                .with_context(|| format!("Failed to load config from {:?}", cli.config))?;

            info!("Configuration is valid");
            info!(
                "  EM: tolerance {:e}, max {} iterations, {} init",
                config.em.tolerance, config.em.max_iterations, config.em.init
            );
            info!("  Classes: {:?}", config.input.classes);
            for label_type in &config.label_types {
                info!(
                    "  Label type '{}': am_noise {}{}",
                    label_type.name,
                    u8::from(label_type.am_noise),
                    label_type
                        .description
                        .as_deref()
                        .map(|d| format!(" ({d})"))
                        .unwrap_or_default()
                );
            }
            return Ok(());
        }

        Commands::Run {
            input,
            output,
            label_type,
            report,
            format,
            init,
            seed,
            max_iterations,
            tolerance,
        } => {
            let mut config = Config::from_file(&cli.config)
                .with_context(|| format!("Failed to load config from {:?}", cli.config))?;

            // CLI overrides
            if let Some(report) = report {
                config.output.report = Some(report);
            }
            if let Some(format) = format {
                config.output.format = format;
            }
            if let Some(init) = init {
                config.em.init = init;
            }
            if seed.is_some() {
                config.em.seed = seed;
            }
            if let Some(max_iterations) = max_iterations {
                config.em.max_iterations = max_iterations;
            }
            if let Some(tolerance) = tolerance {
                config.em.tolerance = tolerance;
            }

            let pipeline = LabelingPipeline::new(config, &label_type)
                .context("Failed to set up labeling pipeline")?;
            let data = pipeline
                .load_responses(&input)
                .with_context(|| format!("Failed to read labels from {input:?}"))?;
            let stats = pipeline.run(&data, &output)?;

            println!("\n=== Dawid-Skene Estimation Complete ===");
            println!("Label type:  {} (am_noise {})", stats.label_type, u8::from(stats.am_noise));
            if let Some(description) = &pipeline.label_type().description {
                println!("             {description}");
            }
            println!("Items:       {}", stats.items);
            println!("Observers:   {}", stats.observers);
            println!("Reviewed:    {:?}", stats.review_counts);
            println!("Blind spots: {}", stats.reviewed_blind_spots);
            println!("Iterations:  {} ({})", stats.iterations, stats.termination);
            if let Some(log_likelihood) = stats.log_likelihood {
                println!("Log-lik:     {log_likelihood:.4}");
            }
            let marginals: Vec<String> = stats
                .class_marginals
                .iter()
                .map(|p| format!("{p:.2}"))
                .collect();
            println!("Marginals:   [{}]", marginals.join(", "));
            println!("Runtime:     {:.1}s", stats.runtime_secs);
            println!("Output:      {output:?}");
            if let Some(report) = &pipeline.config().output.report {
                println!("Report:      {report:?}");
            }
        }
    }

    Ok(())
}
