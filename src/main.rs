//! Evograph CLI - Evolve a network against a dataset from JSON configuration.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use evograph::{
    methods::Loss,
    population::NeatPopulation,
    schema::{ActivateOptions, NeatConfig, Sample},
};

/// Everything one run needs: the evolution settings plus the dataset the
/// genomes are scored against.
#[derive(Debug, Serialize, Deserialize)]
struct ExperimentConfig {
    #[serde(flatten)]
    evolution: NeatConfig,
    #[serde(default)]
    loss: Loss,
    dataset: Vec<Sample>,
}

fn xor_example() -> ExperimentConfig {
    let mut evolution = NeatConfig::new(2, 1);
    evolution.base.population_size = 100;
    evolution.base.iterations = 200;
    evolution.base.random_seed = Some(42);
    ExperimentConfig {
        evolution,
        loss: Loss::Mse,
        dataset: vec![
            Sample { input: vec![0.0, 0.0], output: vec![0.0] },
            Sample { input: vec![0.0, 1.0], output: vec![1.0] },
            Sample { input: vec![1.0, 0.0], output: vec![1.0] },
            Sample { input: vec![1.0, 1.0], output: vec![0.0] },
        ],
    }
}

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <experiment.json>", args[0]);
        eprintln!();
        eprintln!("Evolve a network genome against a dataset.");
        eprintln!();
        eprintln!("Arguments:");
        eprintln!("  experiment.json  Path to experiment configuration file");
        eprintln!();
        eprintln!("Example configuration is generated with --example flag.");
        std::process::exit(1);
    }

    if args[1] == "--example" {
        print_example_config();
        return;
    }

    let config_path = PathBuf::from(&args[1]);
    let config_str = fs::read_to_string(&config_path).unwrap_or_else(|e| {
        eprintln!("Error reading config file: {}", e);
        std::process::exit(1);
    });
    let experiment: ExperimentConfig = serde_json::from_str(&config_str).unwrap_or_else(|e| {
        eprintln!("Error parsing config: {}", e);
        std::process::exit(1);
    });

    println!("Evograph");
    println!("========");
    println!(
        "Shape: {} in / {} out",
        experiment.evolution.base.input_size, experiment.evolution.base.output_size
    );
    println!("Population: {}", experiment.evolution.base.population_size);
    println!("Generations: {}", experiment.evolution.base.iterations);
    println!("Samples: {}", experiment.dataset.len());
    println!();

    let mut population = NeatPopulation::new(experiment.evolution).unwrap_or_else(|e| {
        eprintln!("Error building population: {}", e);
        std::process::exit(1);
    });
    population.set_dataset(experiment.dataset.clone(), experiment.loss);

    println!("Evolving...");
    let start = Instant::now();
    let mut best = population.evolve().unwrap_or_else(|e| {
        eprintln!("Evolution failed: {}", e);
        std::process::exit(1);
    });
    let elapsed = start.elapsed();

    println!();
    println!("Best genome:");
    println!("  Fitness: {:.6}", best.score.unwrap_or(f64::NEG_INFINITY));
    println!("  Nodes: {}", best.node_count());
    println!("  Connections: {}", best.connection_count());
    println!("  Gates: {}", best.gate_count());
    println!(
        "Time: {:.2}s ({} generations)",
        elapsed.as_secs_f32(),
        population.generation() + 1
    );
    println!();

    let mut rng = StdRng::seed_from_u64(0);
    println!("Outputs:");
    for sample in &experiment.dataset {
        match best.activate(&sample.input, &ActivateOptions::inference(), &mut rng) {
            Ok(output) => println!("  {:?} -> {:?} (want {:?})", sample.input, output, sample.output),
            Err(e) => eprintln!("  activation failed: {}", e),
        }
    }
    println!();
    println!("{}", serde_json::to_string_pretty(&best.to_json()).expect("genome serializes"));
}

fn print_example_config() {
    println!("Example configuration (experiment.json):");
    println!("{}", serde_json::to_string_pretty(&xor_example()).unwrap());
}
