use std::{process, str::FromStr};

use argh::FromArgs;
use mpc::{config::ProtocolConfig, dealer::CryptoProvider, Ring, Z128, Z64};
use mpc_nn::{material_plan, Architecture, Model, ModelError, Workload};
use rand::{prelude::StdRng, SeedableRng};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Comma-separated layer sizes, e.g. `784,500,10`.
struct LayerSizes(Vec<usize>);

impl FromStr for LayerSizes {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split(',')
            .map(|size| size.trim().parse::<usize>())
            .collect::<Result<Vec<_>, _>>()
            .map(LayerSizes)
            .map_err(|err| format!("Invalid layer sizes: {}", err))
    }
}

struct WorkloadType(Workload);

impl FromStr for WorkloadType {
    type Err = &'static str;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "classify" => Ok(WorkloadType(Workload::Classify)),
            "evaluate" => Ok(WorkloadType(Workload::Evaluate)),
            _ => Err("Unsupported workload. Available options: classify, evaluate"),
        }
    }
}

#[derive(FromArgs)]
/// Offline crypto provider: writes per-party precomputed material for secure inference.
struct Options {
    /// protocol configuration file (JSON); overrides ring, precision, parties and batch size
    #[argh(option)]
    config: Option<String>,

    /// number of parties participating in protocol
    #[argh(option, default = "2")]
    parties: usize,

    /// ring size in bits: 64 or 128
    #[argh(option, default = "64")]
    ring: u32,

    /// number of fractional bits of fixed-point values
    #[argh(option, default = "16")]
    precision: u32,

    /// number of samples per batch
    #[argh(option, default = "10")]
    batch_size: usize,

    /// number of batches to prepare material for
    #[argh(option, default = "1")]
    batches: usize,

    /// layer sizes of a dense network, e.g. 784,500,10
    #[argh(option)]
    layers: Option<LayerSizes>,

    /// model file (JSON) to take the architecture from
    #[argh(option)]
    model: Option<String>,

    /// computation to prepare for: classify or evaluate
    #[argh(option, default = "WorkloadType(Workload::Classify)")]
    workload: WorkloadType,

    /// output path pattern ('#' is replaced with party ID)
    #[argh(option)]
    output: String,

    /// seed for reproducible material; random if omitted
    #[argh(option)]
    seed: Option<u64>,
}

impl Options {
    fn protocol_config(&self) -> Result<ProtocolConfig, ModelError> {
        let config = match &self.config {
            Some(path) => ProtocolConfig::load(path)?,
            None => ProtocolConfig {
                ring_bits: self.ring,
                precision: self.precision,
                num_parties: self.parties,
                batch_size: self.batch_size,
                ..Default::default()
            },
        };
        config.validate()?;
        Ok(config)
    }

    fn architecture(&self) -> Result<Architecture, ModelError> {
        match (&self.model, &self.layers) {
            (Some(path), None) => Model::load(path)?.architecture(),
            (None, Some(sizes)) => Architecture::dense(&sizes.0),
            _ => Err(ModelError::InvalidModel(
                "exactly one of --model and --layers is required".to_string(),
            )),
        }
    }
}

fn generate<R: Ring>(
    options: &Options,
    config: &ProtocolConfig,
    architecture: &Architecture,
) -> Result<(), ModelError> {
    let plan = material_plan::<R>(
        architecture,
        config.batch_size,
        options.batches,
        options.workload.0,
    );
    let rng = match options.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let data = CryptoProvider::new(config.num_parties, rng).generate::<R>(&plan, config.precision);

    for (id, party_data) in data.into_iter().enumerate() {
        let output_path = options.output.replace('#', &format!("{id}"));
        party_data.save_file(&output_path)?;
        info!(party = id, path = %output_path, "Saved precomputed material");
    }
    Ok(())
}

fn run(options: Options) -> Result<(), ModelError> {
    let config = options.protocol_config()?;
    let architecture = options.architecture()?;
    info!(
        parties = config.num_parties,
        ring = config.ring_bits,
        batch_size = config.batch_size,
        batches = options.batches,
        "Preparing material"
    );
    match config.ring_bits {
        64 => generate::<Z64>(&options, &config, &architecture),
        _ => generate::<Z128>(&options, &config, &architecture),
    }
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let options: Options = argh::from_env();
    if let Err(err) = run(options) {
        error!(%err, "Dealer failed");
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use mpc::dealer::{PrecomputedDealer, RemainingMaterial};

    use super::*;

    fn options(args: &[&str]) -> Options {
        Options::from_args(&["dealer"], args).unwrap()
    }

    #[test]
    fn test_writes_material_for_every_party() {
        let dir = std::env::temp_dir().join(format!("dealer-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let output = dir.join("party#.bin");
        let output = output.to_str().unwrap();

        let args = [
            "--parties", "3", "--layers", "6,4,3", "--batch-size", "2", "--batches", "2",
            "--workload", "evaluate", "--seed", "5", "--output", output,
        ];
        run(options(&args)).unwrap();

        let architecture = Architecture::dense(&[6, 4, 3]).unwrap();
        let plan = material_plan::<Z64>(&architecture, 2, 2, Workload::Evaluate);
        for id in 0..3 {
            let path = output.replace('#', &id.to_string());
            let dealer = PrecomputedDealer::<Z64>::from_file(&path).unwrap();
            assert_eq!(dealer.precision(), 16);
            assert_eq!(
                dealer.remaining(),
                RemainingMaterial {
                    beaver_triples: plan.beaver_triples,
                    matrix_triples: plan.matrix_triples.len(),
                    truncation_pairs: plan.truncation_pairs,
                    comparison_masks: plan.comparison_masks,
                }
            );
        }
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_architecture_source_is_required() {
        let err = run(options(&["--output", "unused#.bin"])).unwrap_err();
        assert!(matches!(err, ModelError::InvalidModel(_)));
    }
}
