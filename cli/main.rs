#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::process;

use survmed::bootstrap::{BootstrapSummary, FailurePolicy, run_bootstrap};
use survmed::config::SimulationConfig;
use survmed::cox::NewtonCox;
use survmed::estimate::estimate_mediation_fits;
use survmed::io::{read_dataset_file, write_dataset_file, write_replicates_file};
use survmed::pipeline::{run_analysis, simulate_population};
use survmed::seeding::RngStreams;

#[derive(Clone, Copy, ValueEnum)]
enum FailurePolicyCli {
    Exclude,
    Abort,
}

impl From<FailurePolicyCli> for FailurePolicy {
    fn from(policy: FailurePolicyCli) -> Self {
        match policy {
            FailurePolicyCli::Exclude => FailurePolicy::Exclude,
            FailurePolicyCli::Abort => FailurePolicy::Abort,
        }
    }
}

#[derive(Args)]
struct ConfigArgs {
    /// TOML configuration file (defaults are used when omitted)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Master seed for every random stream
    #[arg(long)]
    seed: Option<u64>,

    /// Number of simulated individuals
    #[arg(long, value_name = "N")]
    sample_size: Option<usize>,
}

#[derive(Args)]
struct BootstrapArgs {
    /// Number of bootstrap replicates
    #[arg(long, value_name = "B")]
    replicates: Option<usize>,

    /// What to do with a replicate whose estimate cannot be used
    #[arg(long, value_enum)]
    failure_policy: Option<FailurePolicyCli>,

    /// Write per-replicate estimates to this TSV
    #[arg(long, value_name = "PATH")]
    replicates_out: Option<PathBuf>,
}

#[derive(Parser)]
#[command(
    name = "survmed",
    version,
    about = "Bootstrap mediation analysis on simulated survival data",
    long_about = "Simulates a cohort with correlated exposure and confounders, a mediator \
                 and Weibull event times, then estimates the proportion of the exposure \
                 effect mediated, with a log-scale bootstrap interval."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate, estimate and bootstrap; prints `point lower upper`
    Run {
        #[command(flatten)]
        config: ConfigArgs,

        #[command(flatten)]
        bootstrap: BootstrapArgs,

        /// Write the simulated population to this TSV
        #[arg(long, value_name = "PATH")]
        population_out: Option<PathBuf>,
    },

    /// Simulate a population and write it as TSV
    Simulate {
        #[command(flatten)]
        config: ConfigArgs,

        /// Output TSV path
        #[arg(value_name = "OUTPUT")]
        output: PathBuf,
    },

    /// Estimate the mediated proportion of an existing population TSV
    Estimate {
        /// TSV with id, exposure, confounder1, confounder2, mediator, eventtime, status
        #[arg(value_name = "DATA")]
        data: PathBuf,

        #[command(flatten)]
        config: ConfigArgs,

        /// Also bootstrap a confidence interval
        #[arg(long)]
        bootstrap: bool,

        #[command(flatten)]
        replicates: BootstrapArgs,
    },

    /// Print the default configuration as TOML, or write it to a file
    Config {
        #[arg(value_name = "OUTPUT")]
        output: Option<PathBuf>,
    },
}

fn load_config(args: &ConfigArgs) -> Result<SimulationConfig, Box<dyn Error>> {
    let mut config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from {}", path.display());
            SimulationConfig::load(&path.to_string_lossy())?
        }
        None => SimulationConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(n) = args.sample_size {
        config.sample_size = n;
    }
    Ok(config)
}

fn apply_bootstrap_args(config: &mut SimulationConfig, args: &BootstrapArgs) {
    if let Some(b) = args.replicates {
        config.bootstrap.replicates = b;
    }
    if let Some(policy) = args.failure_policy {
        config.bootstrap.failure_policy = policy.into();
    }
}

fn write_replicates(summary: &BootstrapSummary, path: Option<&Path>) -> Result<(), Box<dyn Error>> {
    if let Some(path) = path {
        write_replicates_file(summary, path)?;
        log::info!("Wrote {} replicates to {}", summary.replicates.len(), path.display());
    }
    Ok(())
}

fn print_interval(summary: &BootstrapSummary) {
    println!(
        "{}\t{}\t{}",
        summary.point.mediated_proportion, summary.lower, summary.upper
    );
}

fn run(
    config: ConfigArgs,
    bootstrap: BootstrapArgs,
    population_out: Option<PathBuf>,
) -> Result<(), Box<dyn Error>> {
    let mut settings = load_config(&config)?;
    apply_bootstrap_args(&mut settings, &bootstrap);

    let report = run_analysis(&settings)?;
    if let Some(path) = &population_out {
        write_dataset_file(&report.cohort.dataset, path)?;
        log::info!("Wrote population to {}", path.display());
    }
    write_replicates(&report.summary, bootstrap.replicates_out.as_deref())?;
    print_interval(&report.summary);
    Ok(())
}

fn simulate(config: ConfigArgs, output: PathBuf) -> Result<(), Box<dyn Error>> {
    let settings = load_config(&config)?;
    let plan = settings.plan()?;
    let cohort = simulate_population(&plan, &RngStreams::new(settings.seed))?;
    write_dataset_file(&cohort.dataset, &output)?;
    log::info!(
        "Wrote {} individuals ({} events, {} clamped event times) to {}",
        cohort.dataset.len(),
        cohort.dataset.event_count(),
        cohort.clamped,
        output.display()
    );
    Ok(())
}

fn estimate(
    data: PathBuf,
    config: ConfigArgs,
    bootstrap: bool,
    replicates: BootstrapArgs,
) -> Result<(), Box<dyn Error>> {
    let mut settings = load_config(&config)?;
    apply_bootstrap_args(&mut settings, &replicates);
    settings.validate()?;

    let population = read_dataset_file(&data)?;
    log::info!(
        "Loaded {} individuals with {} events from {}",
        population.len(),
        population.event_count(),
        data.display()
    );
    let regression = NewtonCox::new(settings.regression);

    if bootstrap {
        let streams = RngStreams::new(settings.seed);
        let summary = run_bootstrap(&population, &regression, &settings.bootstrap, &streams)?;
        write_replicates(&summary, replicates.replicates_out.as_deref())?;
        print_interval(&summary);
    } else {
        let fits = estimate_mediation_fits(&population, &regression)?;
        for (label, fit) in [
            ("with mediator", &fits.mediator_adjusted),
            ("without mediator", &fits.mediator_omitted),
        ] {
            for ((covariate, beta), se) in fit
                .covariates
                .iter()
                .zip(fit.coefficients.iter())
                .zip(fit.standard_errors.iter())
            {
                log::info!("Model {label}: {covariate} = {beta:.4} (se {se:.4})");
            }
        }
        let result = fits.result;
        println!(
            "{}\t{}\t{}",
            result.direct_effect, result.total_effect, result.mediated_proportion
        );
    }
    Ok(())
}

fn print_config(output: Option<PathBuf>) -> Result<(), Box<dyn Error>> {
    let config = SimulationConfig::default();
    match output {
        Some(path) => {
            config.save(&path.to_string_lossy())?;
            log::info!("Wrote default configuration to {}", path.display());
        }
        None => print!("{}", config.to_toml()?),
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Cli { command } = Cli::parse();

    let result = match command {
        Some(Commands::Run {
            config,
            bootstrap,
            population_out,
        }) => run(config, bootstrap, population_out),
        Some(Commands::Simulate { config, output }) => simulate(config, output),
        Some(Commands::Estimate {
            data,
            config,
            bootstrap,
            replicates,
        }) => estimate(data, config, bootstrap, replicates),
        Some(Commands::Config { output }) => print_config(output),
        None => Cli::command().print_help().map_err(Into::into),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
