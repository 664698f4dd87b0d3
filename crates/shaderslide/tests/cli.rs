use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use image::{Rgba, RgbaImage};
use tempfile::TempDir;

fn shaderslide(config_dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_shaderslide"))
        .env("SHADERSLIDE_CONFIG_DIR", config_dir)
        .env("RUST_LOG", "warn")
        .args(args)
        .output()
        .expect("failed to run shaderslide")
}

fn write_image(path: &Path, color: [u8; 4]) {
    RgbaImage::from_pixel(8, 6, Rgba(color)).save(path).unwrap();
}

#[test]
fn effects_lists_builtin_transitions() {
    let root = TempDir::new().unwrap();
    let output = shaderslide(root.path(), &["effects"]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.lines().any(|line| line.starts_with("fade")));
    assert!(stdout.lines().any(|line| line.starts_with("wipe")));
}

#[test]
fn effects_includes_manifest_effects() {
    let root = TempDir::new().unwrap();
    fs::write(
        root.path().join("tint.frag"),
        "void main() { gl_FragColor = texture2D(texture0, vUv); }\n",
    )
    .unwrap();
    let manifest = root.path().join("tint.toml");
    fs::write(
        &manifest,
        "name = \"tint\"\nfragment = \"tint.frag\"\ndescription = \"Plain copy\"\n",
    )
    .unwrap();

    let output = shaderslide(
        root.path(),
        &["effects", "--effect-manifest", manifest.to_str().unwrap()],
    );
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("tint - Plain copy"));
}

#[test]
fn check_accepts_a_valid_config() {
    let root = TempDir::new().unwrap();
    let config = root.path().join("slides.toml");
    fs::write(
        &config,
        r#"
version = 1
images = ["one.png", "two.png"]
effect = "wipe"
transition_duration = "500ms"
"#,
    )
    .unwrap();

    let output = shaderslide(root.path(), &["check", config.to_str().unwrap()]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("images: 2"));
    assert!(stdout.contains("effect: wipe"));
}

#[test]
fn check_rejects_unknown_effects_and_versions() {
    let root = TempDir::new().unwrap();
    let unknown = root.path().join("unknown.toml");
    fs::write(&unknown, "version = 1\neffect = \"sparkle\"\n").unwrap();
    let output = shaderslide(root.path(), &["check", unknown.to_str().unwrap()]);
    assert!(!output.status.success());

    let future = root.path().join("future.toml");
    fs::write(&future, "version = 2\n").unwrap();
    let output = shaderslide(root.path(), &["check", future.to_str().unwrap()]);
    assert!(!output.status.success());
}

#[test]
fn frames_exports_a_raster_transition() {
    let root = TempDir::new().unwrap();
    let first = root.path().join("red.png");
    let second = root.path().join("blue.png");
    write_image(&first, [255, 0, 0, 255]);
    write_image(&second, [0, 0, 255, 255]);
    let out = root.path().join("frames");

    let output = shaderslide(
        root.path(),
        &[
            "frames",
            first.to_str().unwrap(),
            second.to_str().unwrap(),
            "--out",
            out.to_str().unwrap(),
            "--fps",
            "10",
            "--duration",
            "200ms",
            "--backend",
            "raster",
            "--size",
            "16x12",
        ],
    );
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let frames = fs::read_dir(&out).unwrap().count();
    assert!(frames >= 3, "expected a steady frame plus transition frames, got {frames}");

    let first_frame = image::open(out.join("frame_00000.png")).unwrap().to_rgba8();
    assert_eq!(first_frame.dimensions(), (16, 12));
    assert_eq!(first_frame.get_pixel(8, 6).0, [255, 0, 0, 255]);

    let last_frame = image::open(out.join(format!("frame_{:05}.png", frames - 1)))
        .unwrap()
        .to_rgba8();
    assert_eq!(last_frame.get_pixel(8, 6).0, [0, 0, 255, 255]);
}
