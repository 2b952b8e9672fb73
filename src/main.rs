use facecheck::{anti_spoofing, verify_faces, Config, OnnxEngine};

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "facecheck")]
#[command(about = "Face verification and anti-spoofing toolkit")]
struct Cli {
    /// Path to the configuration file
    #[arg(long, global = true, default_value = "configs/facecheck.toml")]
    config: PathBuf,

    /// Emit the report as JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify that two images show the same person
    Verify {
        #[arg(long)]
        first: PathBuf,
        #[arg(long)]
        second: PathBuf,
        /// Directory to write the annotated images into
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Check a single image for presentation attacks
    AntiSpoof {
        #[arg(long)]
        image: PathBuf,
    },
    /// Rebuild the reference-database embedding index
    IndexDb,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let config = Config::load_from_path(&cli.config)?;

    match cli.command {
        Commands::Verify { first, second, out } => {
            let engine = OnnxEngine::new(&config)?;
            let first_img = image::open(&first)?;
            let second_img = image::open(&second)?;

            let response = verify_faces(&engine, &config, &first_img, &second_img);

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&response.report)?);
            } else {
                println!("{}", response.report.text);
            }

            if let Some(out) = out {
                fs::create_dir_all(&out)?;
                let first_out = out.join("img1_annotated.jpg");
                let second_out = out.join("img2_annotated.jpg");
                response.first.to_rgb8().save(&first_out)?;
                response.second.to_rgb8().save(&second_out)?;
                println!("Annotated images written to {} and {}", first_out.display(), second_out.display());
            }
        }
        Commands::AntiSpoof { image } => {
            let engine = OnnxEngine::new(&config)?;
            let img = image::open(&image)?;

            let response = anti_spoofing(&engine, &config, &img);

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&response.report)?);
            } else {
                println!("{}", response.report.text);
            }
        }
        Commands::IndexDb => {
            let engine = OnnxEngine::new(&config)?;
            let count = engine.index_database()?;
            println!("Indexed {} reference images", count);
        }
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
