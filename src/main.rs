use std::env;
use std::fs;
use std::rc::Rc;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};

use touch_controls::{
    print_final_state, Camera, ControlsConfig, FrameLoop, ManualClock, PadLayouts, Scene,
    ScriptedInput, SimulatedFrames, TouchControls, Viewport, HEADLESS_VIEWPORT,
};

const FRAME_RATE: u32 = 60;
const DEFAULT_FRAMES: u64 = 60;

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

#[cfg(target_arch = "wasm32")]
fn main() {}

fn run() -> Result<()> {
    let options = CliOptions::parse()?;
    let xml = fs::read_to_string(&options.scene)
        .with_context(|| format!("failed to read scene {}", options.scene))?;
    let scene = Scene::from_xml(&xml).context("failed to parse scene XML")?;
    println!("Loaded scene with {} objects", scene.object_count());
    for object in scene.objects() {
        println!(" - {} ({})", object.name, object.shape.name());
    }

    let config = match &options.config {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("failed to read config {path}"))?;
            ControlsConfig::from_json(&json).with_context(|| format!("invalid config {path}"))?
        }
        None => ControlsConfig::default(),
    };
    let mut script = match &options.script {
        Some(path) => {
            let source = fs::read_to_string(path)
                .with_context(|| format!("failed to read script {path}"))?;
            ScriptedInput::parse(&source).with_context(|| format!("invalid script {path}"))?
        }
        None => ScriptedInput::default(),
    };

    let clock = Arc::new(ManualClock::new());
    let layouts = PadLayouts::for_viewport(Viewport::new(HEADLESS_VIEWPORT.x, HEADLESS_VIEWPORT.y));
    let mut controls = TouchControls::new(Camera::default(), config, layouts, clock.clone())?;
    if let Some(spawn) = scene.spawn() {
        controls.set_position(spawn.position);
        controls.set_rotation(Some(spawn.pitch.to_radians()), Some(spawn.yaw.to_radians()));
    }
    controls.add_to_scene(Rc::new(scene));

    let mut frames = SimulatedFrames::at_rate(clock, FRAME_RATE, Some(options.frames));
    let mut frame_loop = FrameLoop::new();
    let count = frame_loop.run(&mut frames, |frame| -> Result<()> {
        script.apply(frame.index, &mut controls);
        controls
            .tick()
            .with_context(|| format!("frame {} failed", frame.index))
    })?;
    println!("Ran {count} frame(s)");

    print_final_state(&controls);
    Ok(())
}

struct CliOptions {
    scene: String,
    config: Option<String>,
    script: Option<String>,
    frames: u64,
}

impl CliOptions {
    fn parse() -> Result<Self> {
        let mut args = env::args().skip(1);
        let Some(scene) = args.next() else {
            return Err(anyhow!(
                "Usage: touch-controls <scene.xml> [--config FILE] [--script FILE] [--frames N]"
            ));
        };
        let mut options = Self {
            scene,
            config: None,
            script: None,
            frames: DEFAULT_FRAMES,
        };
        while let Some(arg) = args.next() {
            let mut value = |flag: &str| {
                args.next()
                    .ok_or_else(|| anyhow!("{flag} expects a value"))
            };
            match arg.as_str() {
                "--config" => options.config = Some(value("--config")?),
                "--script" => options.script = Some(value("--script")?),
                "--frames" => {
                    let frames = value("--frames")?;
                    options.frames = frames
                        .parse()
                        .with_context(|| format!("invalid frame count `{frames}`"))?;
                }
                other => {
                    return Err(anyhow!(
                        "Unknown argument: {other}. Expected --config, --script or --frames"
                    ));
                }
            }
        }
        Ok(options)
    }
}
