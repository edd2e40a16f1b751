//! Technology Data CLI
//!
//! Checks, derives and projects technologies read from JSON files

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use technology_data::growth::{project_with_registry, ModelRegistry, ModelSpec, Year};
use technology_data::technology::{DerivationMode, DerivationRegistry, ParameterRequest};
use technology_data::{EngineConfig, Technology, TechnologyCollection};

#[derive(Parser)]
#[command(author, version, about = "Check, derive and project techno-economic technology data")]
struct Cli {
    /// Engine configuration (JSON); defaults apply when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Report consistency warnings
    Check { input: PathBuf },
    /// Derive missing (or the named) parameters and print the result as JSON
    Derive {
        input: PathBuf,
        /// Parameters to derive; all missing ones when omitted
        #[arg(long, value_delimiter = ',')]
        parameters: Vec<String>,
        /// Read only the input parameters, do not chain derived values
        #[arg(long)]
        single_pass: bool,
    },
    /// Project parameters with a growth model and write CSV rows
    Project {
        input: PathBuf,
        /// Model name, e.g. `linear` or `LogisticGrowth`
        #[arg(long)]
        model: String,
        /// Model keyword as `name=value`, repeatable
        #[arg(long = "kwarg", value_parser = parse_kwarg)]
        kwargs: Vec<(String, f64)>,
        /// Parameters to scale
        #[arg(long, value_delimiter = ',', required = true)]
        affected: Vec<String>,
        #[arg(long, value_delimiter = ',', required = true)]
        years: Vec<String>,
        /// Output file; stdout when omitted
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

/// A file holds either one technology or a list of them
#[derive(Deserialize)]
#[serde(untagged)]
enum Input {
    Many(Vec<Technology>),
    One(Box<Technology>),
}

#[derive(Serialize)]
struct ProjectionRow<'a> {
    year: i32,
    parameter: &'a str,
    magnitude: f64,
    units: String,
}

fn parse_kwarg(text: &str) -> Result<(String, f64), String> {
    let (name, value) = text.split_once('=').ok_or_else(|| format!("expected name=value, got '{}'", text))?;
    let value: f64 = value.trim().parse().map_err(|e| format!("invalid value in '{}': {}", text, e))?;
    Ok((name.trim().to_string(), value))
}

fn load_collection(path: &Path) -> anyhow::Result<TechnologyCollection> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let input: Input = serde_json::from_reader(io::BufReader::new(file))
        .with_context(|| format!("Failed to parse technologies from {}", path.display()))?;
    Ok(match input {
        Input::Many(items) => TechnologyCollection::new(items),
        Input::One(tech) => TechnologyCollection::new(vec![*tech]),
    })
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::from_json_path(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => EngineConfig::default(),
    };

    match cli.cmd {
        Command::Check { input } => {
            let collection = load_collection(&input)?;
            let report = collection.check_consistency();
            for (tech, warnings) in collection.iter().zip(&report.warnings) {
                for warning in warnings {
                    println!("{}: {}", tech, warning);
                }
            }
            println!("{} technologies checked, {} warnings", collection.len(), report.total());
        }
        Command::Derive { input, parameters, single_pass } => {
            let collection = load_collection(&input)?;
            let request = if parameters.is_empty() {
                ParameterRequest::Missing
            } else {
                ParameterRequest::Named(parameters)
            };
            let mut derivation = config.derivation.clone();
            if single_pass {
                derivation.mode = DerivationMode::SinglePass;
            }
            let result = collection.calculate_parameters_with(&request, &derivation, &DerivationRegistry::default());
            for (tech, report) in result.technologies.iter().zip(&result.reports) {
                eprintln!("{}: derived [{}]", tech, report.derived.join(", "));
                for skipped in &report.skipped {
                    eprintln!("  skipped {}: {}", skipped.target, skipped.reason);
                }
            }
            println!("{}", serde_json::to_string_pretty(&result.technologies)?);
        }
        Command::Project { input, model, kwargs, affected, years, output } => {
            let collection = load_collection(&input)?;
            if collection.is_empty() {
                bail!("{} contains no technologies", input.display());
            }

            let registry = ModelRegistry::default().with_fit_config(config.fit.clone());
            let kwargs: BTreeMap<String, f64> = kwargs.into_iter().collect();
            let years: Vec<Year> = years.into_iter().map(Year::Text).collect();
            let affected: Vec<&str> = affected.iter().map(String::as_str).collect();

            let writer: Box<dyn Write> = match &output {
                Some(path) => Box::new(
                    File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
                ),
                None => Box::new(io::stdout()),
            };
            let mut csv_writer = csv::Writer::from_writer(writer);

            for tech in &collection {
                let spec = ModelSpec::Named { name: model.clone(), kwargs: kwargs.clone() };
                let projected = project_with_registry(tech, spec, &affected, &years, &registry)
                    .with_context(|| format!("Failed to project {}", tech))?;
                for snapshot in &projected {
                    for name in &affected {
                        if let Some(parameter) = snapshot.get(name) {
                            csv_writer.serialize(ProjectionRow {
                                year: snapshot.year(),
                                parameter: name,
                                magnitude: parameter.magnitude(),
                                units: parameter.units().to_string(),
                            })?;
                        }
                    }
                }
            }
            csv_writer.flush()?;

            if let Some(path) = output {
                println!("Projection written to {}", path.display());
            }
        }
    }

    Ok(())
}
