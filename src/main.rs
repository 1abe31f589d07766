use faces::{
    cli::{commands, ImageOptions},
    Builder, Config, Identity,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "faces")]
#[command(about = "Detect, identify, and register faces")]
struct Cli {
    /// Increase verbosity
    #[arg(long, global = true)]
    verbose: bool,

    /// Configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to the faces database
    #[arg(long, global = true)]
    registry_path: Option<PathBuf>,

    /// Only show faces whose likelihood exceeds the given threshold
    #[arg(long, global = true)]
    probability_threshold: Option<f32>,

    /// Only identify faces whose distance is below the given threshold
    #[arg(long, global = true)]
    distance_threshold: Option<f32>,

    /// Scale the longer image side to this many pixels
    #[arg(long, global = true, default_value = "1000")]
    target_size: u32,

    /// Rotate images counter-clockwise by 0, 90, 180 or 270 degrees
    #[arg(long, global = true, default_value = "0")]
    rotate: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect faces in images
    Detect {
        /// Colour each face by its probability
        #[arg(long)]
        show_probability: bool,
        /// Where annotated images are written
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    /// Identify faces in images
    Identify {
        /// Where annotated images are written
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    /// Query or manipulate the faces database
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
}

#[derive(Subcommand)]
enum DbCommands {
    /// Add faces to the registry
    Add {
        /// Set the name manually instead of deriving it from the path
        #[arg(short, long)]
        identity: Option<String>,
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// List the faces database
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove identities from the registry
    Remove {
        #[arg(required = true)]
        identities: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::default(),
    };
    if let Some(path) = &cli.registry_path {
        config.registry.path = path.clone();
    }
    if let Some(threshold) = cli.probability_threshold {
        config.detector.probability_threshold = threshold;
    }
    if let Some(threshold) = cli.distance_threshold {
        config.identifier.distance_threshold = threshold;
    }

    let mut builder = Builder::from_config(config)?;
    let options = ImageOptions {
        target_size: cli.target_size,
        rotate: cli.rotate,
    };

    match cli.command {
        Commands::Detect { show_probability, output_dir, images } => {
            for path in &images {
                let saved = commands::detect(&mut builder, path, show_probability, &output_dir, &options)
                    .with_context(|| format!("Failed to detect faces in {}", path.display()))?;
                println!("Saved annotated image to {}", saved.display());
            }
        }
        Commands::Identify { output_dir, images } => {
            for path in &images {
                let (faces, saved) = commands::identify(&mut builder, path, &output_dir, &options)
                    .with_context(|| format!("Failed to identify faces in {}", path.display()))?;
                println!("{}:", path.display());
                for (bbox, identity) in faces {
                    println!("  {}: {}", bbox, identity);
                }
                println!("Saved annotated image to {}", saved.display());
            }
        }
        Commands::Db { command } => match command {
            DbCommands::Add { identity, paths } => {
                let identity = identity.map(Identity::from);
                for path in &paths {
                    let report = commands::add(&mut builder, path, identity.as_ref(), &options)?;
                    println!(
                        "{}: {} added, {} skipped",
                        path.display(),
                        report.added,
                        report.skipped
                    );
                }
            }
            DbCommands::List { json } => {
                println!("{}", commands::list(&builder, json)?);
            }
            DbCommands::Remove { identities } => {
                let identities: Vec<Identity> = identities.into_iter().map(Identity::from).collect();
                commands::remove(&builder, &identities)?;
            }
        },
    }

    Ok(())
}

fn setup_logging(verbose: bool) {
    if verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_file(true)
            .with_line_number(true)
            .init();
    } else {
        tracing_subscriber::fmt::init();
    }
}
