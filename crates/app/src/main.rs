use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use showgen_core::{
    default_catalog,
    random::{from_entropy, seeded},
    GenerateShowArgs, Libraries, Param, ShowGenerator,
};
use tracing_subscriber::EnvFilter;

fn main() -> showgen_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Generate {
            args,
            libraries,
            seed,
            output,
        } => run_generate(&args, &libraries, seed, output.as_deref()),
        Commands::Templates => run_templates(),
    }
}

fn run_generate(
    args_path: &Path,
    libraries_path: &Path,
    seed: Option<u64>,
    output: Option<&Path>,
) -> showgen_core::Result<()> {
    tracing::info!(?args_path, ?libraries_path, seed, "loading inputs");
    let args = GenerateShowArgs::from_path(args_path)?;
    let libraries = Libraries::from_path(libraries_path)?;
    let catalog = default_catalog()?;

    let mut generator = ShowGenerator::new(&catalog, &libraries);
    let mut rng = match seed {
        Some(seed) => {
            generator = generator.with_seed(seed);
            seeded(seed)
        }
        None => from_entropy(),
    };
    let show = generator.generate(&args, &mut rng)?;

    let json = serde_json::to_string_pretty(&show)?;
    match output {
        Some(path) => {
            std::fs::write(path, json)?;
            tracing::info!(?path, "show written");
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn run_templates() -> showgen_core::Result<()> {
    let catalog = default_catalog()?;
    println!("catalog `{}`", catalog.name());
    for template in catalog.iter() {
        let weight = match &template.weight {
            Param::Constant(weight) => weight.to_string(),
            Param::Computed(_) => "computed".to_string(),
        };
        let features = if template.required_features.is_empty() {
            "-".to_string()
        } else {
            template.required_features.join(", ")
        };
        println!(
            "{:<12} {:<12} weight {:<9} requires {}",
            template.name,
            template.label(),
            weight,
            features
        );
    }
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Procedural show generator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate one show and write it as JSON.
    Generate {
        /// Path to the generation arguments.
        #[arg(short, long)]
        args: PathBuf,
        /// Path to the scene, audio and projection libraries.
        #[arg(short, long)]
        libraries: PathBuf,
        /// Seed for a reproducible show.
        #[arg(short, long)]
        seed: Option<u64>,
        /// Output file; stdout when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List the templates of the built-in catalog.
    Templates,
}
