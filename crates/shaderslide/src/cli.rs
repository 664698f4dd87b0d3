use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use slideconfig::{parse_backend, parse_duration, parse_easing, BackendSetting, EasingSetting};

#[derive(Parser, Debug)]
#[command(
    name = "shaderslide",
    author,
    version,
    about = "Image carousel with GPU shader transitions",
    arg_required_else_help = false
)]
pub struct Cli {
    #[command(flatten)]
    pub run: RunArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Settings shared by the window and frame export paths. Every flag
/// overrides the matching config file value.
#[derive(Parser, Debug, Default)]
pub struct RunArgs {
    /// Image paths or URLs (`file://`, `http://`, `https://`).
    #[arg(value_name = "IMAGES")]
    pub images: Vec<String>,

    /// Configuration file; defaults to `config.toml` in the config directory.
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Transition effect name (see `shaderslide effects`).
    #[arg(long, global = true, value_name = "NAME")]
    pub effect: Option<String>,

    /// Transition duration (`750ms`, `2s`, or seconds).
    #[arg(long, global = true, value_name = "DURATION", value_parser = parse_duration)]
    pub duration: Option<Duration>,

    /// Autoplay interval between transitions.
    #[arg(long, global = true, value_name = "DURATION", value_parser = parse_duration)]
    pub interval: Option<Duration>,

    /// Start paused.
    #[arg(long, global = true)]
    pub no_autoplay: bool,

    /// Stop at the first and last image instead of wrapping.
    #[arg(long, global = true)]
    pub no_loop: bool,

    /// Rendering backend: `auto`, `modern`, `legacy`, or `raster`.
    #[arg(long, global = true, value_name = "BACKEND", value_parser = parse_backend)]
    pub backend: Option<BackendSetting>,

    /// Surface size (e.g. `1280x720`).
    #[arg(long, global = true, value_name = "WIDTHxHEIGHT", value_parser = parse_size)]
    pub size: Option<(u32, u32)>,

    /// Progress curve: `linear`, `smoothstep`, or `ease-in-out`.
    #[arg(long, global = true, value_name = "EASING", value_parser = parse_easing)]
    pub easing: Option<EasingSetting>,

    /// Extra effect manifest to register (repeatable).
    #[arg(long = "effect-manifest", value_name = "FILE", global = true)]
    pub effect_manifests: Vec<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Render transitions offscreen and write every frame as PNG.
    Frames(FramesArgs),
    /// List registered effects.
    Effects(EffectsArgs),
    /// Validate a configuration file and print a summary.
    Check(CheckArgs),
}

#[derive(Parser, Debug)]
pub struct FramesArgs {
    /// Images to record; falls back to the configured list.
    #[arg(value_name = "IMAGES")]
    pub images: Vec<String>,

    /// Directory the PNG frames are written to.
    #[arg(long, value_name = "DIR")]
    pub out: PathBuf,

    /// Frames per second of simulated time.
    #[arg(long, value_name = "FPS", default_value_t = 30, value_parser = clap::value_parser!(u32).range(1..=240))]
    pub fps: u32,

    /// Number of transitions to record.
    #[arg(long, value_name = "COUNT", default_value_t = 1)]
    pub transitions: u32,
}

#[derive(Parser, Debug)]
pub struct EffectsArgs {
    /// Also run each effect's shaders through the GLSL validator.
    #[arg(long)]
    pub validate: bool,
}

#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Configuration file to validate.
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let (w, h) = value
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(|| "expected WIDTHxHEIGHT".to_string())?;
    let width = w
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid width '{w}'"))?;
    let height = h
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid height '{h}'"))?;
    if width == 0 || height == 0 {
        return Err("surface dimensions must be greater than zero".into());
    }
    Ok((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_surface_sizes() {
        assert_eq!(parse_size("1280x720").unwrap(), (1280, 720));
        assert_eq!(parse_size(" 64X32 ").unwrap(), (64, 32));
        assert!(parse_size("0x10").is_err());
        assert!(parse_size("1280").is_err());
    }

    #[test]
    fn run_flags_parse_alongside_images() {
        let cli = Cli::try_parse_from([
            "shaderslide",
            "a.png",
            "b.png",
            "--effect",
            "wipe",
            "--duration",
            "750ms",
            "--backend",
            "raster",
            "--no-loop",
        ])
        .unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.run.images, vec!["a.png", "b.png"]);
        assert_eq!(cli.run.effect.as_deref(), Some("wipe"));
        assert_eq!(cli.run.duration, Some(Duration::from_millis(750)));
        assert_eq!(cli.run.backend, Some(BackendSetting::Raster));
        assert!(cli.run.no_loop);
    }

    #[test]
    fn frames_subcommand_defaults() {
        let cli = Cli::try_parse_from(["shaderslide", "frames", "--out", "/tmp/frames"]).unwrap();
        match cli.command {
            Some(Command::Frames(args)) => {
                assert_eq!(args.fps, 30);
                assert_eq!(args.transitions, 1);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
