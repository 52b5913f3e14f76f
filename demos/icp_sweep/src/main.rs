use argh::FromArgs;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::path::PathBuf;

use framesync::icp::{
    sweep::{symmetric_offsets, OffsetSweep},
    IcpConfig, IcpConvergenceCriteria, RegistrationMode, RigidTransform,
};
use framesync::k3d::{
    normalize::{flip_axes, normalize_points, trajectory_scale},
    pointset::PointSet,
    skeleton::{bone_segments, OPENPOSE_BODY25_BONES, OPENPOSE_BODY25_NUM_JOINTS, OPENPOSE_MID_HIP},
};

#[derive(FromArgs)]
/// Recover the temporal offset between two synthetic skeleton streams
struct Args {
    /// transform family, either rigid or affine
    #[argh(option, default = "String::from(\"rigid\")")]
    mode: String,

    /// maximum number of ICP iterations per candidate
    #[argh(option, default = "100")]
    max_iterations: usize,

    /// lag of the second stream in frames
    #[argh(option, default = "7")]
    true_offset: i64,

    /// largest offset tried in each direction
    #[argh(option, default = "12")]
    range: i64,

    /// spacing between candidate offsets
    #[argh(option, default = "1")]
    step: i64,

    /// number of frames of each stream
    #[argh(option, default = "240")]
    num_frames: usize,

    /// number of key frames stacked into each point set
    #[argh(option, default = "8")]
    num_key_frames: usize,

    /// amplitude of the uniform marker noise of the second stream, in millimetres
    #[argh(option, default = "2.0")]
    noise: f64,

    /// seed of the synthetic streams
    #[argh(option, default = "42")]
    seed: u64,

    /// JSON file with the registration parameters, overrides mode and max-iterations
    #[argh(option)]
    config: Option<PathBuf>,

    /// JSON file receiving every evaluated candidate
    #[argh(option)]
    output: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let config = match &args.config {
        Some(path) => serde_json::from_str::<IcpConfig>(&std::fs::read_to_string(path)?)?,
        None => {
            let mode = match args.mode.as_str() {
                "rigid" => RegistrationMode::Rigid,
                "affine" => RegistrationMode::Affine,
                other => return Err(format!("unknown mode: {other}").into()),
            };
            IcpConfig {
                mode,
                criteria: IcpConvergenceCriteria {
                    max_iterations: args.max_iterations,
                    ..Default::default()
                },
                ..Default::default()
            }
        }
    };
    log::info!("registration parameters: {}", serde_json::to_string(&config)?);

    let offsets = symmetric_offsets(args.range, args.step)?;
    let margin = offsets.iter().map(|o| o.unsigned_abs() as usize).max().unwrap_or(0);
    if args.num_key_frames == 0 || args.num_frames <= 2 * margin + args.num_key_frames {
        return Err(format!(
            "{} frames cannot hold {} key frames with a margin of {margin}",
            args.num_frames, args.num_key_frames
        )
        .into());
    }

    let mut rng = StdRng::seed_from_u64(args.seed);
    let (pose_stream, mut mocap_stream) = synthesize_streams(&args, &mut rng);

    // the optical rig is left handed
    for frame in mocap_stream.iter_mut() {
        flip_axes(frame, [false, false, true]);
    }

    let reference_frames = normalize_stream(&pose_stream)?;
    let source_frames = normalize_stream(&mocap_stream)?;
    log::info!(
        "mean bone length: reference {:.4}, source {:.4}",
        mean_bone_length(&reference_frames[0])?,
        mean_bone_length(&source_frames[0])?
    );

    let span = args.num_frames - 2 * margin;
    let key_frames = (0..args.num_key_frames)
        .map(|i| margin + i * span / args.num_key_frames)
        .collect::<Vec<_>>();

    let sweep = OffsetSweep::new(config);
    let result = sweep.run(&offsets, |offset| {
        let mut reference = Vec::with_capacity(key_frames.len());
        let mut source = Vec::with_capacity(key_frames.len());
        for &k in key_frames.iter() {
            let shifted = k as i64 - offset;
            let frame = usize::try_from(shifted)
                .ok()
                .and_then(|i| source_frames.get(i))
                .ok_or_else(|| format!("frame {shifted} is outside of the source stream"))?;
            reference.push(reference_frames[k].clone());
            source.push(frame.clone());
        }
        Ok::<_, String>((PointSet::concat(&reference), PointSet::concat(&source)))
    });

    match result.best() {
        Some(best) => println!(
            "best offset: {} (cost {:.6e}, {} iterations), expected {}",
            best.offset, best.cost, best.num_iterations, args.true_offset
        ),
        None => println!("no candidate could be registered"),
    }

    if let Some(path) = &args.output {
        std::fs::write(path, serde_json::to_string_pretty(&result)?)?;
        println!("candidates written to {}", path.display());
    }

    Ok(())
}

/// Build the pose-estimation stream and the lagged motion-capture stream of the same walk.
fn synthesize_streams(args: &Args, rng: &mut StdRng) -> (Vec<Vec<[f64; 3]>>, Vec<Vec<[f64; 3]>>) {
    let lag = args.true_offset.unsigned_abs() as usize;
    let rest = rest_pose(rng);
    let frames = walk(&rest, args.num_frames + 2 * lag, rng);

    let pose_stream = frames[lag..lag + args.num_frames].to_vec();

    // mocap frame t shows the walk at pose frame t + true_offset, in millimetres
    let (s, c) = 0.1f64.sin_cos();
    let rig = RigidTransform {
        rotation: [[c, -s, 0.0], [s, c, 0.0], [0.0, 0.0, 1.0]],
        translation: [0.25, -0.1, 0.03],
    };
    let mocap_stream = (0..args.num_frames)
        .map(|t| {
            let idx = (lag as i64 + t as i64 + args.true_offset) as usize;
            rig.apply(&frames[idx])
                .into_iter()
                .map(|p| {
                    let mut q = [0.0; 3];
                    for (qk, pk) in q.iter_mut().zip(p) {
                        *qk = 1000.0 * pk + args.noise * rng.random_range(-1.0..1.0);
                    }
                    q[2] = -q[2];
                    q
                })
                .collect()
        })
        .collect();

    (pose_stream, mocap_stream)
}

/// Random BODY_25 rest pose grown along the bone table from the neck.
fn rest_pose(rng: &mut StdRng) -> Vec<[f64; 3]> {
    let mut pose = vec![[0.0; 3]; OPENPOSE_BODY25_NUM_JOINTS];
    pose[1] = [0.0, 0.0, 1.4];
    for &[parent, child] in OPENPOSE_BODY25_BONES.iter() {
        let bone = [
            rng.random_range(-0.25..0.25),
            rng.random_range(-0.25..0.25),
            rng.random_range(-0.3..0.1),
        ];
        let p = pose[parent];
        pose[child] = [p[0] + bone[0], p[1] + bone[1], p[2] + bone[2]];
    }
    pose
}

/// Move the rest pose along a curved path while every joint swings with its own phase.
fn walk(rest: &[[f64; 3]], num_frames: usize, rng: &mut StdRng) -> Vec<Vec<[f64; 3]>> {
    let phases = rest
        .iter()
        .map(|_| rng.random_range(0.0..std::f64::consts::TAU))
        .collect::<Vec<_>>();

    (0..num_frames)
        .map(|t| {
            let t = t as f64;
            let root = [0.01 * t, 0.4 * (0.03 * t).sin(), 0.0];
            rest.iter()
                .zip(phases.iter())
                .map(|(p, phase)| {
                    let swing = 0.08 * (0.15 * t + phase).sin();
                    [p[0] + root[0] + swing, p[1] + root[1], p[2] + 0.5 * swing]
                })
                .collect()
        })
        .collect()
}

/// Express every frame in the unit frame of the mid-hip trajectory.
fn normalize_stream(stream: &[Vec<[f64; 3]>]) -> Result<Vec<PointSet>, Box<dyn std::error::Error>> {
    let track = stream
        .iter()
        .map(|frame| frame[OPENPOSE_MID_HIP])
        .collect::<Vec<_>>();
    let scale = trajectory_scale(&track)?;
    log::debug!("trajectory radius {:.4} around {:?}", scale.radius, scale.center);

    let frames = stream
        .iter()
        .map(|frame| normalize_points(frame, &scale).map(PointSet::new))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(frames)
}

fn mean_bone_length(frame: &PointSet) -> Result<f64, Box<dyn std::error::Error>> {
    let segments = bone_segments(frame.points(), &OPENPOSE_BODY25_BONES, OPENPOSE_BODY25_NUM_JOINTS)?;
    let total = segments
        .iter()
        .map(|(a, b)| ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)).sqrt())
        .sum::<f64>();
    Ok(total / segments.len() as f64)
}
