//! Render an image through a lamina pipeline from the command line.
//!
//! The pipeline comes from a JSON file holding the stage list, in the
//! same shape [`Pipeline`] serializes to; the input stage is replaced
//! by the image given on the command line. Without a pipeline file the
//! image is rendered as-is.

use std::path::PathBuf;

use clap::Parser;
use lamina_pipeline::{
    BuiltinBackend, Dimensions, InputStage, Pipeline, PreviewQuality, Renderer,
};

/// Render an image through a lamina pipeline.
#[derive(Parser)]
#[command(version)]
struct Args {
    /// Input image path.
    input: PathBuf,

    /// Output image path (PNG recommended).
    #[arg(short, long, required_unless_present = "predict")]
    output: Option<PathBuf>,

    /// Pipeline description: a JSON file with the stage list.
    #[arg(short, long)]
    pipeline: Option<PathBuf>,

    /// Render a preview fitted to this viewport instead of the full
    /// result.
    #[arg(long, value_name = "WIDTHxHEIGHT")]
    preview: Option<String>,

    /// Use the fast preview stage order (scale early, color work after).
    #[arg(long)]
    fast: bool,

    /// Print the predicted output size and exit without rendering.
    #[arg(long)]
    predict: bool,
}

// ---------------------------------------------------------------------------
// Preview size parsing
// ---------------------------------------------------------------------------

/// Parse `--preview "WIDTHxHEIGHT"` into viewport dimensions.
fn parse_dimensions(s: &str) -> Result<Dimensions, String> {
    let (w_str, h_str) = s
        .split_once('x')
        .ok_or_else(|| format!("preview size must be 'WIDTHxHEIGHT', got: '{s}'"))?;

    let width: u32 = w_str
        .trim()
        .parse()
        .map_err(|e| format!("invalid preview width '{w_str}': {e}"))?;
    let height: u32 = h_str
        .trim()
        .parse()
        .map_err(|e| format!("invalid preview height '{h_str}': {e}"))?;

    if width == 0 || height == 0 {
        return Err(format!(
            "preview size must be positive, got {width}x{height}"
        ));
    }
    Ok(Dimensions::new(width, height))
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut pipeline = match &args.pipeline {
        Some(path) => {
            eprintln!("Reading pipeline from {}", path.display());
            let json = std::fs::read_to_string(path)?;
            serde_json::from_str(&json)?
        }
        None => Pipeline::new(),
    };
    pipeline.set_input(InputStage::from_path(&args.input));
    if args.fast {
        pipeline.set_quality(PreviewQuality::Fast);
    }

    let names: Vec<&str> = pipeline.stages().iter().map(|stage| stage.name()).collect();
    eprintln!("Pipeline: {}", names.join(" -> "));

    let mut renderer = Renderer::new(BuiltinBackend);

    if args.predict {
        let Some(size) = pipeline.predicted_size(&mut renderer)? else {
            return Err("the pipeline is empty".into());
        };
        println!("{size}");
        return Ok(());
    }

    let Some(output) = &args.output else {
        return Err("--output is required when rendering".into());
    };

    let result = match &args.preview {
        Some(spec) => {
            let viewport = parse_dimensions(spec).map_err(|e| format!("--preview: {e}"))?;
            let result = pipeline.render_at_size(&mut renderer, viewport)?;
            eprintln!("Preview zoom: {}", pipeline.zoom());
            result
        }
        None => pipeline.render_full(&mut renderer)?,
    };

    let Some(bitmap) = result else {
        return Err("the pipeline is empty".into());
    };

    eprintln!("Saving {} to {}", bitmap.dimensions(), output.display());
    bitmap.pixels().save(output)?;
    eprintln!("Done.");
    Ok(())
}
