use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use renderer::{check_effect, Carousel, CarouselEvent, DrawSurface, ManualClock, WindowConfig};
use tracing_subscriber::EnvFilter;

use crate::cli::{CheckArgs, EffectsArgs, FramesArgs, RunArgs};
use crate::settings;

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

pub fn run_window(args: RunArgs) -> Result<()> {
    let settings = settings::resolve(&args)?;
    if settings.config.images.is_empty() {
        bail!("no images given; pass image paths or set `images` in the config file");
    }
    tracing::info!(
        images = settings.config.images.len(),
        effect = %settings.config.effect,
        backend = ?settings.config.backend,
        "starting shaderslide window"
    );
    let options = settings.carousel_options();
    let config = WindowConfig {
        size: settings.surface_size(),
        ..WindowConfig::default()
    };
    renderer::run_window(options, config, settings.registry)
}

/// Drives a carousel with a manual clock and writes one PNG per frame.
pub fn frames(run: RunArgs, args: FramesArgs) -> Result<()> {
    let mut run = run;
    if !args.images.is_empty() {
        run.images = args.images.clone();
    }
    let settings = settings::resolve(&run)?;
    if settings.config.images.is_empty() {
        bail!("no images to record");
    }

    fs::create_dir_all(&args.out)
        .with_context(|| format!("failed to create output directory {}", args.out.display()))?;

    let mut options = settings.carousel_options();
    options.autoplay = false;
    let (width, height) = settings.surface_size();
    let surface = DrawSurface::offscreen(width, height);
    let clock = ManualClock::new();
    let mut carousel = Carousel::builder(options, surface)
        .clock(Box::new(clock.clone()))
        .registry(settings.registry)
        .build();
    let events = carousel.subscribe();
    carousel
        .initialize()
        .map_err(|err| anyhow!("failed to start carousel: {err}"))?;
    tracing::info!(
        backend = ?carousel.backend_kind(),
        width,
        height,
        fps = args.fps,
        "recording frames"
    );

    let step = Duration::from_secs_f64(1.0 / f64::from(args.fps));
    let frame_cap = max_frames_per_transition(settings.config.transition_duration, args.fps);
    let mut recorder = FrameRecorder::new(&args.out);
    recorder.write(&carousel)?;

    for transition in 0..args.transitions {
        if !carousel.next() {
            tracing::info!(transition, "no further image to show; stopping");
            break;
        }
        let mut frames = 0;
        while carousel.is_transitioning() && frames < frame_cap {
            clock.advance(step);
            carousel.tick();
            recorder.write(&carousel)?;
            frames += 1;
        }
        tracing::debug!(transition, frames, index = carousel.current_index(), "transition recorded");
    }

    for event in events.try_iter() {
        if let CarouselEvent::Error(err) = event {
            tracing::warn!(error = %err, "carousel reported an error while recording");
        }
    }
    carousel.dispose();
    println!(
        "Wrote {} frame(s) to {}",
        recorder.written,
        args.out.display()
    );
    Ok(())
}

fn max_frames_per_transition(duration: Duration, fps: u32) -> u32 {
    let frames = (duration.as_secs_f64() * f64::from(fps)).ceil() as u32;
    frames.saturating_add(2)
}

struct FrameRecorder {
    dir: PathBuf,
    written: usize,
}

impl FrameRecorder {
    fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            written: 0,
        }
    }

    fn write(&mut self, carousel: &Carousel) -> Result<()> {
        let path = self.dir.join(frame_file_name(self.written));
        carousel
            .surface()
            .canvas()
            .snapshot()
            .save(&path)
            .with_context(|| format!("failed to write frame {}", path.display()))?;
        self.written += 1;
        Ok(())
    }
}

fn frame_file_name(index: usize) -> String {
    format!("frame_{index:05}.png")
}

pub fn effects(run: RunArgs, args: EffectsArgs) -> Result<()> {
    let config = match &run.config {
        Some(path) => Some(settings::load_config(path)?),
        None => None,
    };
    let mut manifests = config
        .map(|config| config.effect_manifests)
        .unwrap_or_default();
    manifests.extend(run.effect_manifests.iter().cloned());
    let registry = settings::build_registry(&manifests)?;

    let mut failures = 0;
    for name in registry.list() {
        let Some(effect) = registry.get(&name) else {
            continue;
        };
        let mut line = name.clone();
        if effect.requirements().needs_advanced_backend() {
            line.push_str(" [advanced]");
        }
        if let Some(description) = effect.description() {
            line.push_str(&format!(" - {description}"));
        }
        println!("{line}");

        if args.validate {
            let outcome = effect
                .mesh()
                .map_or(Ok(()), |mesh| mesh.validate())
                .map_err(|message| anyhow!(message))
                .and_then(|()| check_effect(&effect).map_err(anyhow::Error::from));
            match outcome {
                Ok(_) => println!("  ok"),
                Err(err) => {
                    failures += 1;
                    println!("  invalid: {err}");
                }
            }
        }
    }

    if failures > 0 {
        bail!("{failures} effect(s) failed validation");
    }
    Ok(())
}

pub fn check(args: CheckArgs) -> Result<()> {
    let config = settings::load_config(&args.file)?;
    let registry = settings::build_registry(&config.effect_manifests)?;
    if !registry.has(&config.effect) {
        bail!(
            "{}: unknown effect '{}'; available: {}",
            args.file.display(),
            config.effect,
            registry.list().join(", ")
        );
    }

    println!("{}: ok", args.file.display());
    println!("  images: {}", config.images.len());
    println!("  effect: {}", config.effect);
    println!("  backend: {:?}", config.backend);
    println!(
        "  transition: {}ms, autoplay: {} every {}ms",
        config.transition_duration.as_millis(),
        config.autoplay,
        config.autoplay_interval.as_millis()
    );
    println!(
        "  surface: {}x{}, loop: {}",
        config.surface.width, config.surface.height, config.loop_enabled
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_names_sort_lexically() {
        assert_eq!(frame_file_name(0), "frame_00000.png");
        assert_eq!(frame_file_name(42), "frame_00042.png");
        assert!(frame_file_name(9) < frame_file_name(10));
    }

    #[test]
    fn frame_cap_covers_the_whole_transition() {
        assert_eq!(max_frames_per_transition(Duration::from_secs(1), 30), 32);
        assert_eq!(max_frames_per_transition(Duration::from_millis(100), 24), 5);
    }
}
