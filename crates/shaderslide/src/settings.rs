use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use effects::{EffectManifest, EffectRegistry};
use renderer::{BackendPreference, CarouselOptions, Easing};
use slideconfig::{BackendSetting, EasingSetting, SlideConfig};

use crate::cli::RunArgs;
use crate::paths::AppPaths;

/// Everything a run needs after merging the config file with CLI flags.
pub struct Settings {
    pub config: SlideConfig,
    pub registry: EffectRegistry,
}

impl Settings {
    pub fn carousel_options(&self) -> CarouselOptions {
        let config = &self.config;
        CarouselOptions {
            images: config.images.clone(),
            effect: config.effect.clone(),
            autoplay: config.autoplay,
            autoplay_interval: config.autoplay_interval,
            transition_duration: config.transition_duration,
            loop_enabled: config.loop_enabled,
            allow_raster_fallback: config.allow_raster_fallback,
            start_index: config.start_index,
            easing: map_easing(config.easing),
            backend: map_backend(config.backend),
            decode_timeout: config.decode_timeout(),
        }
    }

    pub fn surface_size(&self) -> (u32, u32) {
        (self.config.surface.width, self.config.surface.height)
    }
}

/// Reads a config file, resolving relative manifest paths against its
/// directory.
pub fn load_config(path: &Path) -> Result<SlideConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let mut config = SlideConfig::from_toml_str(&raw)
        .with_context(|| format!("invalid config {}", path.display()))?;
    if let Some(parent) = path.parent() {
        config.resolve_relative_to(parent);
    }
    Ok(config)
}

/// Explicit `--config` must exist; the discovered default is optional.
fn locate_config(args: &RunArgs) -> Result<Option<PathBuf>> {
    if let Some(path) = &args.config {
        return Ok(Some(path.clone()));
    }
    let paths = AppPaths::discover()?;
    tracing::debug!(config_dir = %paths.config_dir().display(), "resolved shaderslide paths");
    let discovered = paths.config_file();
    if discovered.is_file() {
        tracing::debug!(path = %discovered.display(), "using discovered config file");
        Ok(Some(discovered))
    } else {
        Ok(None)
    }
}

pub fn resolve(args: &RunArgs) -> Result<Settings> {
    let mut config = match locate_config(args)? {
        Some(path) => load_config(&path)?,
        None => SlideConfig::default(),
    };
    apply_overrides(&mut config, args);
    config.validate().context("invalid settings after applying flags")?;
    let registry = build_registry(&config.effect_manifests)?;
    if !registry.has(&config.effect) {
        bail!(
            "unknown effect '{}'; available: {}",
            config.effect,
            registry.list().join(", ")
        );
    }
    Ok(Settings { config, registry })
}

pub fn apply_overrides(config: &mut SlideConfig, args: &RunArgs) {
    if !args.images.is_empty() {
        config.images = args.images.clone();
        if config.start_index >= config.images.len() {
            config.start_index = 0;
        }
    }
    if let Some(effect) = &args.effect {
        config.effect = effect.clone();
    }
    if let Some(duration) = args.duration {
        config.transition_duration = duration;
    }
    if let Some(interval) = args.interval {
        config.autoplay_interval = interval;
    }
    if args.no_autoplay {
        config.autoplay = false;
    }
    if args.no_loop {
        config.loop_enabled = false;
    }
    if let Some(backend) = args.backend {
        config.backend = backend;
    }
    if let Some((width, height)) = args.size {
        config.surface.width = width;
        config.surface.height = height;
    }
    if let Some(easing) = args.easing {
        config.easing = easing;
    }
    config
        .effect_manifests
        .extend(args.effect_manifests.iter().cloned());
}

/// Built-in effects plus every manifest, later manifests overriding earlier
/// names.
pub fn build_registry(manifests: &[PathBuf]) -> Result<EffectRegistry> {
    let mut registry = EffectRegistry::with_builtins();
    for path in manifests {
        let effect = EffectManifest::load(path)
            .with_context(|| format!("failed to load effect manifest {}", path.display()))?;
        let name = effect.name().to_string();
        registry.register(effect)?;
        tracing::debug!(effect = %name, manifest = %path.display(), "registered effect manifest");
    }
    Ok(registry)
}

fn map_easing(setting: EasingSetting) -> Easing {
    match setting {
        EasingSetting::Linear => Easing::Linear,
        EasingSetting::Smoothstep => Easing::Smoothstep,
        EasingSetting::EaseInOut => Easing::EaseInOut,
    }
}

fn map_backend(setting: BackendSetting) -> BackendPreference {
    match setting {
        BackendSetting::Auto => BackendPreference::Auto,
        BackendSetting::Modern => BackendPreference::Modern,
        BackendSetting::Legacy => BackendPreference::Legacy,
        BackendSetting::Raster => BackendPreference::Raster,
    }
}
