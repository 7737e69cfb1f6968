//! Example: CEGAR on a random network with Z3 as the oracle.
//!
//! Usage: cargo run --example demo -p arnn-cegar -- [seed] [config.json]
//!
//! Asks whether some input in the unit box makes `y0` beat `y1`.

use arnn_abstraction::{CompleteAbstractionLeftToRight, RefineByMaxLoss};
use arnn_cegar::{Cegar, CegarConfig};
use arnn_core::random_network;
use arnn_property::{AdversarialProperty, BasicConstraint, Property};
use arnn_smt::{Z3Oracle, Z3OracleConfig, Z3Presolver};
use std::env;
use std::time::Duration;

fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let seed: u64 = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(7);
    let config = match args.get(2) {
        Some(path) => match CegarConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        },
        None => CegarConfig::default(),
    };

    let network = match random_network(2, &[8, 8, 8], 2, seed) {
        Ok(network) => network,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    println!("Network: {}", network.info());

    let property = Property::Adversarial(AdversarialProperty {
        input_constraints: vec![
            BasicConstraint::lower("x0", 0.0),
            BasicConstraint::upper("x0", 1.0),
            BasicConstraint::lower("x1", 0.0),
            BasicConstraint::upper("x1", 1.0),
        ],
        output_constraints: vec![BasicConstraint::lower("y0", 1.0), BasicConstraint::lower("y1", 0.0)],
        minimal_is_the_winner: false,
        slack: 0.0,
    });

    let z3_config = Z3OracleConfig {
        timeout: Duration::from_secs(30),
        ..Z3OracleConfig::default()
    };
    let mut cegar = Cegar::new(config).with_presolver(Z3Presolver::new(z3_config.clone()));
    let result = cegar.run(
        &network,
        &property,
        &mut Z3Oracle::with_config(z3_config),
        &mut CompleteAbstractionLeftToRight::new(),
        &mut RefineByMaxLoss::default(),
    );

    match result {
        Ok(report) => {
            println!("\n=== CEGAR Finished ===");
            println!("Status: {}", report.status);
            println!("Iterations: {}", report.iterations);
            println!("Spurious examples: {}", report.spurious_examples);
            println!("Refinement steps: {}", report.total_refinement_steps());
            println!("Initial abstraction: {}", report.networks.abstracted);
            println!("Final network: {}", report.networks.last);
            if let Some(cex) = &report.counterexample {
                println!("Counterexample: {cex:?}");
            }
            println!("Elapsed: {:?}", report.elapsed);
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
