//! Command line front end: retarget a .bvh clip onto a rig description and print the result.

use clap::Parser;
use mocap_retarget::{
    parse, rig_file, FrameUpdater, HumanoidRig, MotionClip, RetargetConfig, RetargetError, TickOutcome,
};
use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

#[derive(Parser, Debug)]
#[command(name = "mocap_retarget", version, about = "Retarget a .bvh motion capture clip onto a humanoid rig")]
struct Cli {
    /// Humanoid rig description (.json)
    #[arg(long)]
    rig: PathBuf,

    /// Motion capture clip (.bvh)
    #[arg(long)]
    motion: PathBuf,

    /// Retargeting configuration (.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of frames to play
    #[arg(long, default_value_t = 1)]
    frames: usize,

    /// Ticks per second, defaults to the clip's own frame rate
    #[arg(long)]
    fps: Option<f64>,

    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<(), RetargetError> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config = match &cli.config {
        Some(path) => RetargetConfig::from_file(path)?,
        None => RetargetConfig::default(),
    };
    let mut updater = FrameUpdater::new(config);

    //// deliver the assets
    let rig = rig_file::load_rig_from_file(&cli.rig).map(|rig| Rc::new(RefCell::new(rig)));
    let motion = parse::load_bvh_from_file(&cli.motion).map(|clip| Rc::new(RefCell::new(clip)));
    updater.rig_slot().complete(rig);
    updater.motion_slot().complete(motion);
    if let Some(err) = updater.take_load_error() {
        return Err(err);
    }

    updater.build_correspondence()?;
    updater.bind()?;

    let (Some(target), Some(source)) = (updater.target(), updater.source()) else {
        return Err(RetargetError::AssetsPending("assets"));
    };
    let fps = cli.fps.unwrap_or_else(|| source.borrow().frame_rate());
    if !fps.is_finite() || fps <= 0.0 {
        return Err(mocap_retarget::ConfigError::Invalid {
            field: "fps",
            reason: format!("must be a positive number, got {fps}"),
        }
        .into());
    }

    //// play
    let mut last = TickOutcome::Idle;
    for _ in 0..cli.frames {
        last = updater.tick(1.0 / fps);
    }
    log::info!("after {} frames: {last:?}", cli.frames);

    print_report(&updater, &target.borrow(), &source.borrow());
    Ok(())
}

fn print_report(updater: &FrameUpdater, rig: &HumanoidRig, clip: &MotionClip) {
    let Some(binding) = updater.binding() else {
        return;
    };
    println!("{:<24} {:<28} {:<28} {: ^44}", "SLOT", "SOURCE", "TARGET", "WORLD ROTATION (w, x, y, z)");
    for entry in binding.entries() {
        let (Some(source), Some(target)) = (clip.skeleton().bone(entry.source), rig.skeleton().bone(entry.target))
        else {
            continue;
        };
        let q = target.world.rot;
        println!(
            "{:<24} {:<28} {:<28} {: ^44}",
            entry.slot.to_string(),
            source.name,
            target.name,
            format!("({:6.3}, {:6.3}, {:6.3}, {:6.3})", q.s, q.v.x, q.v.y, q.v.z)
        );
    }
    println!(
        "{} of {} humanoid slots driven, clock at {:.3}s",
        binding.len(),
        rig.populated_count(),
        binding.clock().elapsed()
    );
}
