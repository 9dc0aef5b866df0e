use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use rootcause::Report;

use forzabin::export::manifest::ManifestSink;
use forzabin::import::{ImportOptions, LodSelection, import_car_folder};
use forzabin::log::LogLevel;

/// Import a Forza car folder and report what would be created
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Car folder containing `.modelbin` files
    car_dir: PathBuf,

    /// Extracted game media directory substituted for `Game:` paths
    #[clap(short, long)]
    media_root: Option<PathBuf>,

    /// LOD level to import (0-7); may be repeated. Defaults to LOD 0
    #[clap(short, long = "lod")]
    lods: Vec<u8>,

    /// Import geometry only
    #[clap(long)]
    no_materials: bool,

    /// Name materials by their internal name instead of the materialbin file
    #[clap(long)]
    internal_names: bool,

    /// Fill missing texture channels from folders named like the material
    #[clap(long)]
    auto_textures: bool,

    /// Write a JSON manifest of created meshes, materials and textures
    #[clap(long)]
    manifest: Option<PathBuf>,

    /// Convert swatchbin textures to PNG files in this directory
    #[clap(long)]
    extract_textures: Option<PathBuf>,

    /// Also print debug log entries
    #[clap(short, long)]
    verbose: bool,
}

fn run(args: Args) -> Result<bool, Report> {
    let lods = if args.lods.is_empty() {
        LodSelection::default()
    } else {
        LodSelection::try_from(args.lods.as_slice()).map_err(|e| rootcause::report!("{e}"))?
    };

    let options = ImportOptions::builder()
        .lods(lods)
        .import_materials(!args.no_materials)
        .use_materialbin_names(!args.internal_names)
        .auto_assign_textures(args.auto_textures)
        .maybe_media_root(args.media_root)
        .build();

    let mut sink = ManifestSink::new();
    if let Some(dir) = args.extract_textures {
        sink = sink.extract_textures_to(dir);
    }

    let outcome =
        import_car_folder(&args.car_dir, &options, &mut sink).map_err(|e| rootcause::report!("{e}"))?;

    let min_level = if args.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    for entry in outcome.log.entries().filter(|e| e.level >= min_level) {
        println!("{entry}");
    }

    if let Some(path) = args.manifest {
        let file = File::create(&path)
            .map_err(|e| rootcause::report!("could not create '{}': {e}", path.display()))?;
        sink.finish(outcome.summary).write_json(BufWriter::new(file))?;
        println!("manifest written to '{}'", path.display());
    }

    Ok(outcome.summary.files_failed == 0)
}

fn main() -> ExitCode {
    let args = Args::parse();

    match run(args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
