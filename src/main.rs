//! restyle - formatter step pipeline with idempotence diagnostics

#![warn(clippy::all)]
#![warn(clippy::pedantic)]

use std::path::Path;

use restyle::process::{
    apply_files, check_files, padded_cell_message, CheckOutcome, FileFailure, TaskOptions,
};
use restyle::{parse_args, CliArgs, Config, Formatter, Result};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = parse_args();
    init_logging(&args);

    if args.files.is_empty() {
        print_usage();
        return Ok(());
    }

    // Configure thread pool if --jobs specified
    if let Some(jobs) = args.jobs {
        if jobs > 0 {
            if let Err(e) = rayon::ThreadPoolBuilder::new()
                .num_threads(jobs)
                .build_global()
            {
                eprintln!("Warning: failed to configure thread pool: {e}");
            }
        }
    }

    let root_dir = std::env::current_dir()?;
    let config = build_config(&args, &root_dir)?;
    let formatter = config.build_formatter(&root_dir)?;
    let options = config.task_options(&root_dir);
    debug!("Pipeline: {:?}", formatter.fingerprints());

    if args.check {
        run_check(&formatter, &args, &options)
    } else {
        run_apply(&formatter, &args, &options)
    }
}

/// `--debug` logs at debug level, otherwise only warnings. `RUST_LOG` wins over both.
fn init_logging(args: &CliArgs) {
    let level = if args.debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Build configuration from CLI args and the config file(s)
fn build_config(args: &CliArgs, root_dir: &Path) -> Result<Config> {
    let mut config = if let Some(config_path) = &args.config {
        debug!("Using explicit config file: {}", config_path.display());
        Config::from_toml_file(config_path)?
    } else {
        let discovered = Config::discover_config_files(root_dir);
        if discovered.is_empty() {
            debug!("No config files discovered in {}", root_dir.display());
        }
        for f in &discovered {
            debug!("Discovered config file {}", f.display());
        }
        Config::from_discovered_files(root_dir)
    };

    args.apply_to(&mut config);
    debug!("Configuration: {config:?}");

    if let Some(error) = config.validate() {
        anyhow::bail!("Invalid configuration: {error}");
    }
    if config.steps.is_empty() {
        warn!("No steps configured, only line endings are normalized");
    }
    Ok(config)
}

fn report_failures(formatter: &Formatter, failures: &[FileFailure]) {
    for failure in failures {
        eprintln!(
            "Error formatting {}: {}",
            formatter.relativize(&failure.file).display(),
            failure.error
        );
    }
}

fn run_check(
    formatter: &Formatter,
    args: &CliArgs,
    options: &TaskOptions,
) -> Result<()> {
    let report = check_files(formatter, &args.files, options);
    report_failures(formatter, &report.failures);

    match &report.outcome {
        CheckOutcome::Clean => {
            if !report.failures.is_empty() {
                anyhow::bail!("{} files could not be checked", report.failures.len());
            }
            if !args.silent {
                eprintln!("Checked {} files, all formatted.", report.checked);
            }
            Ok(())
        }
        CheckOutcome::Violations(files) => {
            if !args.silent {
                eprintln!("The following files are not formatted:");
                for file in files {
                    eprintln!("  {}", formatter.relativize(file).display());
                }
            }
            anyhow::bail!(
                "{} of {} files are not formatted, run restyle without --check to fix them",
                files.len(),
                report.checked
            )
        }
        CheckOutcome::PaddedCellRecommended { cell, trace } => {
            eprintln!("{}", padded_cell_message(formatter, cell, trace));
            anyhow::bail!(
                "{} misbehaves under the configured steps",
                formatter.relativize(cell.file()).display()
            )
        }
    }
}

fn run_apply(
    formatter: &Formatter,
    args: &CliArgs,
    options: &TaskOptions,
) -> Result<()> {
    let report = apply_files(formatter, &args.files, options);
    report_failures(formatter, &report.failures);

    if !args.silent {
        for file in &report.changed {
            eprintln!("Formatted: {}", formatter.relativize(file).display());
        }
    }
    if let Some((cell, trace)) = &report.padded_cell_recommended {
        eprintln!("{}", padded_cell_message(formatter, cell, trace));
    }
    if let Some(summary) = report.unsettled_summary(formatter) {
        eprintln!("{summary}");
        eprintln!(
            "Intermediate results are in {}",
            options.diagnose_dir.display()
        );
    }

    if report.is_success() {
        if !args.silent {
            eprintln!(
                "Formatted {} of {} files.",
                report.changed.len(),
                args.files.len()
            );
        }
        Ok(())
    } else {
        anyhow::bail!(
            "{} files could not be formatted",
            report.failures.len() + report.cycles.len() + report.divergences.len()
        )
    }
}

fn print_usage() {
    println!("restyle {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Runs the formatting steps configured in restyle.toml and diagnoses");
    println!("steps that do not settle on a single result.");
    println!();
    println!("Usage:");
    println!("  restyle [OPTIONS] <FILE>...");
    println!();
    println!("Examples:");
    println!("  restyle src/*.txt                    # Format files in-place");
    println!("  restyle --check src/*.txt            # Fail if any file is not formatted");
    println!("  restyle --padded-cell --check a.txt  # Accept the canonical state of a cycle");
    println!("  restyle -c ci.toml a.txt             # Use an explicit config file");
    println!();
    println!("Options:");
    println!("      --check                 Report unformatted files, do not rewrite them");
    println!("      --padded-cell           Settle cycling files on a canonical result");
    println!("  -c, --config <FILE>         Config file (disables auto-discovery)");
    println!("      --line-endings <POLICY> unix, windows, platform-native, preserve");
    println!("      --encoding <NAME>       utf-8, latin-1");
    println!("      --max-attempts <NUM>    Applications before declaring divergence [default: 10]");
    println!("      --diagnose-dir <DIR>    Where misbehaving states are written");
    println!("  -j, --jobs <NUM>            Parallel jobs (0=auto, 1=sequential)");
    println!("  -D, --debug                 Debug logging");
    println!("  -S, --silent                No progress output");
    println!("  -h, --help                  Print help");
    println!("  -V, --version               Print version");
}
