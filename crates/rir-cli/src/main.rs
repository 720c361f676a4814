//! RIR CLI — Command-line interface for room impulse response synthesis.
//!
//! Renders mono or binaural impulse responses of a room scene to WAV, and
//! inspects band plans and material tables.
//!
//! # Usage
//!
//! ```bash
//! rir mono -o room.wav
//! rir mono --scene scene.json --freq-dep --bands 10 --filter sm57 --filter air_stft -o room.wav
//! rir binaural --head-direction 0,-1,0 --hrtf cipic.json -o room_binaural.wav
//! rir bands --bands 8 --json
//! rir materials
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};

use rir_dsp::{
    AirAbsorptionBandpass, AirAbsorptionStft, BitDepth, CharacteristicFilter, CompositorConfig,
    FilterChain, LinearFilter, OutputBuffer,
};
use rir_room::{
    absorption_for_t60, plan_bands, BandLayout, BandingConfig, Directivity, ImageSourceSimulator, MaterialTable,
    RoomScene, Vec3,
};
use rir_spatial::{
    AbsorptionModel, HeadPose, HrirLookup, HrtfDataset, HrtfGrid, RenderOptions, RenderedIr,
    Renderer, SourceDirection,
};

// ───────────────────────────── CLI definition ─────────────────────────────

/// Top-level CLI entry point for the `rir` binary.
#[derive(Parser)]
#[command(
    name = "rir",
    about = "Room impulse response synthesis with material, filter and HRTF stages",
    version
)]
struct Cli {
    /// Enable verbose (debug-level) logging and per-filter timings.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available sub-commands.
#[derive(Subcommand)]
enum Commands {
    /// Render one impulse response per receiver.
    Mono {
        #[command(flatten)]
        render: RenderArgs,

        /// Write each mono response as an identical stereo pair.
        #[arg(long)]
        dual_mono: bool,
    },

    /// Render a two-channel binaural impulse response.
    Binaural {
        #[command(flatten)]
        render: RenderArgs,

        /// Head centre as x,y,z metres. Defaults to the scene's first receiver.
        #[arg(long, value_parser = parse_vec3)]
        head_position: Option<Vec3>,

        /// Facing direction as x,y,z.
        #[arg(long, value_parser = parse_vec3, default_value = "0,-1,0")]
        head_direction: Vec3,

        /// Polar pattern of the simulated ear receivers.
        #[arg(long, default_value = "homni")]
        ear_pattern: Directivity,

        /// HRTF dataset (JSON). Defaults to a synthetic spherical-head set.
        #[arg(long)]
        hrtf: Option<PathBuf>,
    },

    /// Print the frequency bands a scene would be rendered with.
    Bands {
        #[command(flatten)]
        scene: SceneArgs,

        #[command(flatten)]
        banding: BandArgs,

        /// Print the band plan as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List the material absorption table.
    Materials {
        /// Material table (JSON). Defaults to the built-in table.
        #[arg(long)]
        materials: Option<PathBuf>,

        /// Print the table as JSON.
        #[arg(long)]
        json: bool,
    },
}

/// Scene source and overrides.
#[derive(Args)]
struct SceneArgs {
    /// Scene description (JSON). Defaults to the built-in 5 x 4 x 3 m demo room.
    #[arg(long)]
    scene: Option<PathBuf>,

    /// Override the scene's sample rate in Hz.
    #[arg(long)]
    sample_rate: Option<u32>,

    /// Target reverberation time in seconds. Rescales the broadband wall
    /// absorption to match by Sabine's formula, keeping the ratios between
    /// walls.
    #[arg(long)]
    t60: Option<f64>,

    /// Material table (JSON) for frequency-dependent absorption.
    #[arg(long)]
    materials: Option<PathBuf>,
}

/// Frequency band settings.
#[derive(Args)]
struct BandArgs {
    /// Number of equal-width bands.
    #[arg(long, default_value_t = 10)]
    bands: usize,

    /// Width of the first band in Hz. Switches to progressively wider bands.
    #[arg(long, conflicts_with = "bands")]
    band_width: Option<f64>,

    /// Width ratio between consecutive progressive bands.
    #[arg(long, requires = "band_width", default_value_t = 1.1)]
    band_growth: f64,

    /// Linkwitz-Riley crossover order (even).
    #[arg(long, default_value_t = BandingConfig::DEFAULT_ORDER)]
    order: u32,

    /// Simulate bands one after another.
    #[arg(long)]
    sequential: bool,
}

/// Options shared by the render commands.
#[derive(Args)]
struct RenderArgs {
    #[command(flatten)]
    scene: SceneArgs,

    /// Derive absorption per frequency band from the scene's materials.
    #[arg(long)]
    freq_dep: bool,

    #[command(flatten)]
    banding: BandArgs,

    /// Append a filter to the chain (sm57, tiny_speaker, linear, air_bandpass, air_stft).
    #[arg(long = "filter")]
    filters: Vec<String>,

    /// Peak ceiling below full scale in dB.
    #[arg(long, default_value_t = 3.0)]
    ceiling: f64,

    /// Output sample width (8, 16 or 32). Defaults to the scene's.
    #[arg(long)]
    bit_depth: Option<u16>,

    /// Output WAV file path.
    #[arg(short, long)]
    output: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing subscriber with env-filter support.
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let options = RenderOptions {
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Mono { render, dual_mono } => cmd_mono(&render, dual_mono, options),

        Commands::Binaural {
            render,
            head_position,
            head_direction,
            ear_pattern,
            hrtf,
        } => cmd_binaural(
            &render,
            head_position,
            head_direction,
            ear_pattern,
            hrtf.as_deref(),
            options,
        ),

        Commands::Bands {
            scene,
            banding,
            json,
        } => cmd_bands(&scene, &banding, json),

        Commands::Materials { materials, json } => cmd_materials(materials.as_deref(), json),
    }
}

// ───────────────────────────── mono ───────────────────────────────

fn cmd_mono(args: &RenderArgs, dual_mono: bool, options: RenderOptions) -> Result<()> {
    let scene = load_render_scene(args)?;
    let table = load_materials(args.scene.materials.as_deref())?;
    let chain = build_chain(&args.filters, scene.sample_rate)?;
    let simulator = ImageSourceSimulator::new();

    println!("\n  RIR Renderer (mono)");
    println!("  ============================================");
    print_scene(&scene);
    print_chain(&chain);

    let renderer = Renderer::new(&simulator, &table)
        .with_absorption(absorption_model(args))
        .with_compositor(compositor_config(args, dual_mono))
        .with_options(options);
    let rendered = renderer
        .render_mono(&scene, &chain)
        .context("Failed to render impulse response")?;

    println!("  --------------------------------------------");
    let count = rendered.len();
    for (index, ir) in rendered.iter().enumerate() {
        let path = if count == 1 {
            args.output.clone()
        } else {
            receiver_path(&args.output, index)
        };
        write_ir(&path, ir)?;
    }
    println!("  Done!\n");
    Ok(())
}

// ───────────────────────────── binaural ───────────────────────────────

fn cmd_binaural(
    args: &RenderArgs,
    head_position: Option<Vec3>,
    head_direction: Vec3,
    ear_pattern: Directivity,
    hrtf: Option<&Path>,
    options: RenderOptions,
) -> Result<()> {
    let scene = load_render_scene(args)?;
    let table = load_materials(args.scene.materials.as_deref())?;
    let chain = build_chain(&args.filters, scene.sample_rate)?;
    let simulator = ImageSourceSimulator::new();

    let position = match head_position {
        Some(position) => position,
        None => match scene.receivers.first() {
            Some(receiver) => *receiver,
            None => bail!("Scene has no receiver to place the head at; pass --head-position"),
        },
    };
    let head = HeadPose::new(position, head_direction).context("Invalid head pose")?;

    let dataset: Arc<dyn HrirLookup> = match hrtf {
        Some(path) => Arc::new(
            HrtfDataset::load(path)
                .with_context(|| format!("Failed to load HRTF dataset: {}", path.display()))?,
        ),
        None => Arc::new(
            HrtfDataset::spherical_head(
                HrtfGrid::cipic(),
                scene.sample_rate,
                HrtfDataset::DEFAULT_LENGTH,
            )
            .context("Failed to synthesize spherical-head HRTF")?,
        ),
    };

    println!("\n  RIR Renderer (binaural)");
    println!("  ============================================");
    print_scene(&scene);
    println!(
        "  Head:     ({:.2}, {:.2}, {:.2}) facing ({:.2}, {:.2}, {:.2})",
        position.x, position.y, position.z, head_direction.x, head_direction.y, head_direction.z
    );
    println!(
        "  HRTF:     {}",
        hrtf.map_or_else(|| "spherical head".to_string(), |p| p.display().to_string())
    );
    if let Some(source) = scene.sources.first() {
        if let Ok(direction) = SourceDirection::from_geometry(*source, &head) {
            println!(
                "  Angles:   elevation {:.2} deg, azimuth {:.2} deg{}",
                direction.elevation_deg,
                direction.azimuth_deg,
                if direction.behind { " (behind)" } else { "" }
            );
        }
    }
    print_chain(&chain);

    let renderer = Renderer::new(&simulator, &table)
        .with_absorption(absorption_model(args))
        .with_compositor(compositor_config(args, false))
        .with_options(options);
    let ir = renderer
        .render_binaural(&scene, &head, ear_pattern, &chain, dataset)
        .context("Failed to render binaural impulse response")?;

    println!("  --------------------------------------------");
    write_ir(&args.output, &ir)?;
    println!("  Done!\n");
    Ok(())
}

// ───────────────────────────── bands ───────────────────────────────

fn cmd_bands(scene_args: &SceneArgs, banding: &BandArgs, json: bool) -> Result<()> {
    let scene = load_scene(scene_args)?;
    let table = load_materials(scene_args.materials.as_deref())?;
    let bands = plan_bands(&scene, &banding_config(banding), &table)
        .context("Failed to plan frequency bands")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&bands)?);
        return Ok(());
    }

    println!();
    println!("  Frequency Bands");
    println!("  ============================================");
    println!("  Rate:     {} Hz", scene.sample_rate);
    println!("  Order:    {}", banding.order);
    println!("  Bands:    {}", bands.len());
    println!("  --------------------------------------------");
    for band in &bands {
        let coefficients: Vec<String> = band
            .absorption
            .as_array()
            .iter()
            .map(|a| format!("{a:.3}"))
            .collect();
        println!(
            "  [{:>3}] {:>9.1} - {:>9.1} Hz  alpha [{}]",
            band.index,
            band.lower_hz,
            band.upper_hz,
            coefficients.join(", ")
        );
    }
    println!();
    Ok(())
}

// ───────────────────────────── materials ───────────────────────────────

fn cmd_materials(path: Option<&Path>, json: bool) -> Result<()> {
    let table = load_materials(path)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&table)?);
        return Ok(());
    }

    println!();
    println!("  Materials ({})", table.len());
    println!("  ============================================");
    for name in table.names() {
        let Some(curve) = table.get(name) else {
            continue;
        };
        let points: Vec<String> = curve
            .frequencies_hz
            .iter()
            .zip(&curve.coefficients)
            .map(|(f, a)| format!("{f:.0}: {a:.2}"))
            .collect();
        println!("  {name}");
        println!("      {}", points.join("  "));
    }
    println!();
    Ok(())
}

// ───────────────────────────── helpers ───────────────────────────────

/// Parses `x,y,z` into a vector.
fn parse_vec3(value: &str) -> std::result::Result<Vec3, String> {
    let parts: Vec<f64> = value
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| format!("invalid coordinate in '{value}': {e}"))?;
    match parts.as_slice() {
        [x, y, z] => Ok(Vec3::new(*x, *y, *z)),
        _ => Err(format!("expected three comma-separated values, got '{value}'")),
    }
}

fn load_scene(args: &SceneArgs) -> Result<RoomScene> {
    let mut scene = match &args.scene {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read scene file: {}", path.display()))?;
            RoomScene::from_json(&json)
                .with_context(|| format!("Invalid scene file: {}", path.display()))?
        }
        None => RoomScene::demo().context("Failed to build the demo scene")?,
    };
    if let Some(sample_rate) = args.sample_rate {
        scene.sample_rate = sample_rate;
    }
    if let Some(t60) = args.t60 {
        let current = scene.absorption.as_array();
        let weights = if current.iter().any(|&a| a > 0.0) {
            current
        } else {
            [1.0; 6]
        };
        scene.absorption = absorption_for_t60(&scene.dimensions, t60, weights)
            .with_context(|| format!("Cannot fit wall absorption to a T60 of {t60} s"))?;
        scene.t60 = t60;
    }
    scene.validate().context("Invalid scene")?;
    Ok(scene)
}

fn load_render_scene(args: &RenderArgs) -> Result<RoomScene> {
    let mut scene = load_scene(&args.scene)?;
    if let Some(bits) = args.bit_depth {
        scene.bit_depth = BitDepth::from_bits(bits)?;
    }
    Ok(scene)
}

fn load_materials(path: Option<&Path>) -> Result<MaterialTable> {
    match path {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read material table: {}", path.display()))?;
            MaterialTable::from_json(&json)
                .with_context(|| format!("Invalid material table: {}", path.display()))
        }
        None => Ok(MaterialTable::builtin()),
    }
}

fn banding_config(args: &BandArgs) -> BandingConfig {
    let layout = match args.band_width {
        Some(initial_width_hz) => BandLayout::Progressive {
            initial_width_hz,
            growth_factor: args.band_growth,
        },
        None => BandLayout::EqualWidth { count: args.bands },
    };
    BandingConfig {
        layout,
        order: args.order,
        parallel: !args.sequential,
    }
}

fn absorption_model(args: &RenderArgs) -> AbsorptionModel {
    if args.freq_dep {
        AbsorptionModel::FrequencyDependent(banding_config(&args.banding))
    } else {
        AbsorptionModel::Broadband
    }
}

fn compositor_config(args: &RenderArgs, dual_mono: bool) -> CompositorConfig {
    CompositorConfig {
        ceiling_db: args.ceiling,
        dual_mono,
        ..CompositorConfig::default()
    }
}

/// Builds the filter chain from its command-line names, in order.
fn build_chain(names: &[String], sample_rate: u32) -> Result<FilterChain> {
    let mut chain = FilterChain::new();
    for name in names {
        chain = match name.as_str() {
            "sm57" | "tiny_speaker" => chain.with_filter(CharacteristicFilter::builtin(name, sample_rate)?),
            "linear" => chain.with_filter(speech_band_filter(sample_rate)?),
            "air_bandpass" => chain.with_filter(AirAbsorptionBandpass::with_defaults(sample_rate)?),
            "air_stft" => chain.with_filter(AirAbsorptionStft::with_defaults(sample_rate)?),
            other => bail!(
                "Unknown filter '{other}' (available: sm57, tiny_speaker, linear, air_bandpass, air_stft)"
            ),
        };
    }
    Ok(chain)
}

/// A 101-tap band-pass from 150 Hz up to 7 kHz (or 90 % of Nyquist).
fn speech_band_filter(sample_rate: u32) -> Result<LinearFilter> {
    let nyquist = sample_rate as f64 / 2.0;
    let top = 7000.0f64.min(0.9 * nyquist);
    if top <= 150.0 {
        bail!("Sample rate {sample_rate} Hz is too low for the linear band-pass filter");
    }
    Ok(LinearFilter::new(
        101,
        &[0.0, 100.0, 150.0, top, top + 1.0, nyquist],
        &[0.0, 0.0, 1.0, 1.0, 0.0, 0.0],
        sample_rate,
    )?)
}

fn receiver_path(output: &Path, index: usize) -> PathBuf {
    let stem = output
        .file_stem()
        .map_or_else(|| "rir".to_string(), |s| s.to_string_lossy().into_owned());
    let extension = output
        .extension()
        .map_or_else(|| "wav".to_string(), |e| e.to_string_lossy().into_owned());
    output.with_file_name(format!("{stem}_r{index}.{extension}"))
}

fn print_scene(scene: &RoomScene) {
    let d = scene.dimensions;
    println!(
        "  Room:     {:.2} x {:.2} x {:.2} m, {} source(s), {} receiver(s)",
        d.x,
        d.y,
        d.z,
        scene.sources.len(),
        scene.receivers.len()
    );
    println!("  Rate:     {} Hz, {}-bit", scene.sample_rate, scene.bit_depth.bits());
    println!(
        "  T60:      {:.2}s ({:.2}s simulated)",
        scene.t60,
        scene.simulation_length()
    );
}

fn print_chain(chain: &FilterChain) {
    if chain.is_empty() {
        println!("  Filters:  (none)");
    } else {
        println!("  Filters:  {}", chain.names().join(" -> "));
    }
}

fn write_ir(path: &Path, ir: &RenderedIr) -> Result<()> {
    write_wav(path, &ir.output)
        .with_context(|| format!("Failed to write WAV file: {}", path.display()))?;
    let duration = ir.output.frames() as f64 / ir.output.sample_rate as f64;
    println!(
        "  Output:   {} ({:.2}s, {}ch, {}-bit, gain {:.3e})",
        path.display(),
        duration,
        ir.output.channels,
        ir.output.bit_depth.bits(),
        ir.output.gain
    );
    if !ir.tag.is_empty() {
        println!("  Chain:    {}", ir.tag);
    }
    Ok(())
}

/// Writes interleaved integer PCM as a WAV file.
fn write_wav(path: &Path, buffer: &OutputBuffer) -> Result<()> {
    let spec = hound::WavSpec {
        channels: buffer.channels,
        sample_rate: buffer.sample_rate,
        bits_per_sample: buffer.bit_depth.bits(),
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("Cannot create WAV file: {}", path.display()))?;
    for &sample in &buffer.samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vec3() {
        assert_eq!(parse_vec3("1.5, -1,0").unwrap(), Vec3::new(1.5, -1.0, 0.0));
        assert!(parse_vec3("1,2").is_err());
        assert!(parse_vec3("a,b,c").is_err());
    }

    #[test]
    fn test_build_chain_order_and_unknown() {
        let names = vec!["linear".to_string(), "sm57".to_string()];
        let chain = build_chain(&names, 16000).unwrap();
        assert_eq!(chain.names(), vec!["LinearFilter", "sm57"]);
        assert!(build_chain(&["reverb".to_string()], 16000).is_err());
    }

    fn scene_args(t60: Option<f64>) -> SceneArgs {
        SceneArgs {
            scene: None,
            sample_rate: None,
            t60,
            materials: None,
        }
    }

    #[test]
    fn test_t60_refits_absorption() {
        let demo = load_scene(&scene_args(None)).unwrap();
        let scene = load_scene(&scene_args(Some(0.3))).unwrap();
        assert_eq!(scene.t60, 0.3);
        let fitted = rir_room::sabine_t60(&scene.dimensions, &scene.absorption).unwrap();
        assert!((fitted - 0.3).abs() < 1e-9);
        let floor = rir_room::Surface::Floor;
        assert!(scene.absorption.get(floor) > demo.absorption.get(floor));
        assert!(load_scene(&scene_args(Some(0.01))).is_err());
    }

    #[test]
    fn test_progressive_band_args() {
        let cli = Cli::try_parse_from(["rir", "bands", "--band-width", "100"]).unwrap();
        let Commands::Bands { banding, .. } = cli.command else {
            panic!("expected the bands command");
        };
        assert_eq!(
            banding_config(&banding).layout,
            BandLayout::Progressive {
                initial_width_hz: 100.0,
                growth_factor: 1.1
            }
        );
        assert!(Cli::try_parse_from(["rir", "bands", "--band-growth", "1.5"]).is_err());
        assert!(Cli::try_parse_from(["rir", "bands", "--bands", "4", "--band-width", "100"]).is_err());
    }

    #[test]
    fn test_receiver_path() {
        let path = receiver_path(Path::new("/tmp/out/room.wav"), 2);
        assert_eq!(path, PathBuf::from("/tmp/out/room_r2.wav"));
    }
}
