use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "backdrop", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Filter the background of a single frame around a subject mask and write a PNG.
    Frame(FrameArgs),
    /// Report whether the filter is active at a playback position.
    Gate(GateArgs),
}

#[derive(Parser, Debug)]
struct FrameArgs {
    /// Input frame image.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Subject mask image (alpha if it has transparency, luma otherwise).
    #[arg(long)]
    mask: PathBuf,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    /// Filter to apply; overrides the config file.
    #[arg(long)]
    filter: Option<backdrop::FilterKind>,

    /// Filter configuration JSON.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Mask feathering half-width in pixels (0 disables).
    #[arg(long, default_value_t = backdrop::composite_cpu::DEFAULT_FEATHER_RADIUS)]
    feather: u32,

    /// Downscale frames wider than this (0 keeps the input size).
    #[arg(long, default_value_t = backdrop::pipeline::DEFAULT_MAX_WIDTH)]
    max_width: u32,
}

#[derive(Parser, Debug)]
struct GateArgs {
    /// Filter configuration JSON.
    #[arg(long)]
    config: PathBuf,

    /// Playback position in seconds.
    #[arg(long)]
    at: f64,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Frame(args) => cmd_frame(args),
        Command::Gate(args) => cmd_gate(args),
    }
}

fn read_config_json(path: &Path) -> anyhow::Result<backdrop::FilterConfig> {
    let f = File::open(path).with_context(|| format!("open config '{}'", path.display()))?;
    let config = backdrop::FilterConfig::from_json_reader(BufReader::new(f))
        .with_context(|| "parse config JSON")?;
    Ok(config)
}

fn cmd_frame(args: FrameArgs) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => read_config_json(path)?,
        None => backdrop::FilterConfig::default(),
    };
    let kind = match (args.filter, config.enabled) {
        (Some(kind), _) => kind,
        (None, true) => config.kind,
        (None, false) => backdrop::FilterKind::None,
    };

    let frame = image::open(&args.in_path)
        .with_context(|| format!("read frame '{}'", args.in_path.display()))?
        .to_rgba8();
    let frame = backdrop::FrameRgba::from_image(frame);
    let mask = image::open(&args.mask)
        .with_context(|| format!("read mask '{}'", args.mask.display()))?;
    let mask = backdrop::SegmentationMask::from_image(&mask);

    let opts = backdrop::ProcessOptions {
        max_width: (args.max_width > 0).then_some(args.max_width),
        feather_radius: args.feather,
    };
    let out = backdrop::process_frame(&frame, &mask, kind, opts)?;

    if let Some(parent) = args.out.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }

    image::save_buffer_with_format(
        &args.out,
        &out.data,
        out.width,
        out.height,
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", args.out.display()))?;

    eprintln!("wrote {} ({kind})", args.out.display());
    Ok(())
}

fn cmd_gate(args: GateArgs) -> anyhow::Result<()> {
    let config = read_config_json(&args.config)?;
    let active = config.active_at(args.at);
    println!(
        "{} at {} ({})",
        if active { "active" } else { "inactive" },
        backdrop::PlayerStatus::format_time(args.at),
        config.kind
    );
    Ok(())
}
