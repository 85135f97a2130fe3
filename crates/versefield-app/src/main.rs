use std::fs;
use std::io;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand, ValueEnum};
use owo_colors::OwoColorize;
use tracing::info;
use versefield_app::{Host, RunSummary, ScriptedInput, catalog, parse_script};
use versefield_core::{CameraDescriptor, Vec3, VignetteDescriptor};
use versefield_render::{AsciiRenderer, JsonLinesRenderer, NullRenderer, Renderer, TraceRenderer};

#[derive(Parser, Debug)]
#[command(
    name = "versefield",
    version,
    about = "Run interactive physics vignettes headlessly"
)]
struct Cli {
    /// Frame sink for simulated ticks.
    #[arg(long, env = "VERSEFIELD_RENDERER", value_enum, default_value_t = RendererKind::Trace)]
    renderer: RendererKind,

    /// Only present every Nth tick (trace and ascii renderers).
    #[arg(long, env = "VERSEFIELD_EVERY", default_value_t = 1)]
    every: u64,

    /// Magnification of the fitted ascii view, clamped to 0.25..=8.
    #[arg(long, env = "VERSEFIELD_ZOOM", value_parser = parse_zoom, default_value_t = 1.0)]
    zoom: f32,

    /// Camera eye used to turn pointer coordinates into pick rays, as `X,Y,Z`.
    #[arg(long, env = "VERSEFIELD_CAMERA_EYE", value_parser = parse_vec3, default_value = "0,12,12")]
    camera_eye: Vec3,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one vignette for a fixed number of ticks.
    Run {
        /// Built-in vignette name or path to a JSON descriptor.
        vignette: String,
        #[arg(long, env = "VERSEFIELD_TICKS", default_value_t = 120)]
        ticks: u64,
        /// Scripted input such as `10:click:0,0` or `40:control:reset`; repeatable.
        #[arg(long = "input", short = 'i')]
        inputs: Vec<ScriptedInput>,
        /// File with one scripted input per line.
        #[arg(long)]
        script: Option<std::path::PathBuf>,
        /// Override the vignette's RNG seed.
        #[arg(long)]
        seed: Option<u64>,
        /// Print the run summary as JSON on stderr.
        #[arg(long)]
        summary: bool,
    },
    /// List the built-in vignettes.
    List,
    /// Print a vignette descriptor as JSON.
    Show {
        vignette: String,
    },
    /// Run every built-in vignette in sequence.
    Tour {
        #[arg(long, env = "VERSEFIELD_TICKS", default_value_t = 60)]
        ticks: u64,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum RendererKind {
    Trace,
    Jsonl,
    Ascii,
    Null,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let camera = CameraDescriptor::look_at(cli.camera_eye, Vec3::ZERO);

    match cli.command {
        Command::Run {
            vignette,
            ticks,
            inputs,
            script,
            seed,
            summary,
        } => {
            let mut descriptor = load_vignette(&vignette)?;
            if seed.is_some() {
                descriptor.seed = seed;
            }
            let mut script_inputs = match script {
                Some(path) => read_script(&path)?,
                None => Vec::new(),
            };
            script_inputs.extend(inputs);

            let renderer = build_renderer(cli.renderer, cli.every, cli.zoom);
            let mut host = Host::new(renderer).with_camera(camera);
            let result = host
                .run(descriptor, ticks, &script_inputs)
                .with_context(|| format!("failed to activate vignette `{vignette}`"))?;
            if summary {
                print_summary(&result)?;
            }
        }
        Command::List => list_command(),
        Command::Show { vignette } => {
            let descriptor = load_vignette(&vignette)?;
            let json = descriptor
                .to_json()
                .context("failed to format vignette descriptor")?;
            println!("{json}");
        }
        Command::Tour { ticks } => {
            let renderer = build_renderer(cli.renderer, cli.every, cli.zoom);
            let mut host = Host::new(renderer).with_camera(camera);
            let summaries = host
                .tour(catalog::entries().iter().map(|entry| entry.descriptor()), ticks)
                .context("tour aborted")?;
            info!(vignettes = summaries.len(), "tour finished");
        }
    }

    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .try_init();
}

fn build_renderer(kind: RendererKind, every: u64, zoom: f32) -> Box<dyn Renderer> {
    match kind {
        RendererKind::Trace => Box::new(TraceRenderer::new(every)),
        RendererKind::Jsonl => Box::new(JsonLinesRenderer::new(io::stdout().lock())),
        RendererKind::Ascii => Box::new(
            AsciiRenderer::new(io::stdout().lock(), 64, 24)
                .every(every)
                .zoom(zoom),
        ),
        RendererKind::Null => Box::new(NullRenderer),
    }
}

fn load_vignette(name: &str) -> Result<VignetteDescriptor> {
    if let Some(descriptor) = catalog::builtin(name) {
        return Ok(descriptor);
    }
    let path = Path::new(name);
    if !path.exists() {
        return Err(anyhow!(
            "`{name}` is neither a built-in vignette nor a file (try `versefield list`)"
        ));
    }
    let json = fs::read_to_string(path)
        .with_context(|| format!("failed to read vignette descriptor {}", path.display()))?;
    VignetteDescriptor::from_json(&json)
        .with_context(|| format!("failed to parse vignette descriptor {}", path.display()))
}

fn read_script(path: &Path) -> Result<Vec<ScriptedInput>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read script {}", path.display()))?;
    parse_script(&text)
        .map_err(|(line, err)| anyhow!("{}:{line}: {err}", path.display()))
}

fn print_summary(summary: &RunSummary) -> Result<()> {
    let json = serde_json::to_string_pretty(summary).context("failed to format run summary")?;
    eprintln!("{json}");
    Ok(())
}

fn list_command() {
    println!(
        "{:<20} {}",
        "VIGNETTE".bold().cyan(),
        "SUMMARY".bold().cyan()
    );
    println!("{}", "-".repeat(80).dimmed());
    for entry in catalog::entries() {
        println!("{:<20} {}", entry.name.bold(), entry.summary.italic());
    }
}

fn parse_zoom(raw: &str) -> Result<f32, String> {
    match raw.trim().parse::<f32>() {
        Ok(zoom) if zoom.is_finite() && zoom > 0.0 => Ok(zoom),
        _ => Err(format!("expected a positive zoom factor, got `{raw}`")),
    }
}

fn parse_vec3(raw: &str) -> Result<Vec3, String> {
    let parts: Vec<f32> = raw
        .split(',')
        .map(|part| part.trim().parse::<f32>())
        .collect::<Result<_, _>>()
        .map_err(|err| format!("invalid coordinate in `{raw}`: {err}"))?;
    match parts.as_slice() {
        &[x, y, z] if x.is_finite() && y.is_finite() && z.is_finite() => Ok(Vec3::new(x, y, z)),
        _ => Err(format!("expected `X,Y,Z`, got `{raw}`")),
    }
}
