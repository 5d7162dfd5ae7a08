//! .bvh (Biovision Hierarchy) loader producing a [`MotionClip`].

use crate::clip::MotionClip;
use crate::error::AssetLoadError;
use crate::skeleton::Skeleton;
use crate::types::*;
use crate::utils;
use log::debug;
use regex::Regex;
use std::path::Path;

///////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////

/// Upper bound on frames reserved up front from the `Frames:` header.
const PREALLOCATED_FRAMES: usize = 4096;

#[derive(Debug, Clone, Copy)]
enum Channel {
    Position(Axis),
    Rotation(Axis),
}

/// Joint as declared in the HIERARCHY section, before it becomes a [`Bone`].
#[derive(Debug)]
struct JointDecl {
    name: String,
    parent: Option<Index>,
    offset: Position,
    /// (channel, column in a motion line)
    channels: Vec<(Channel, usize)>,
}

/// What the next `{` opens.
#[derive(Debug, Clone, Copy)]
enum Scope {
    Joint(Index),
    EndSite,
}

fn parse_floats(values: &str, line_no: usize) -> Result<Vec<f64>, AssetLoadError> {
    values
        .split_whitespace()
        .map(|s| {
            s.parse::<f64>()
                .map_err(|_| AssetLoadError::parse(line_no, format!("'{s}' is not a number")))
        })
        .collect()
}

fn parse_channel(name: &str) -> Option<Channel> {
    let mut chars = name.chars();
    let axis = Axis::from_channel_prefix(chars.next()?)?;
    match chars.as_str().to_ascii_lowercase().as_str() {
        "position" => Some(Channel::Position(axis)),
        "rotation" => Some(Channel::Rotation(axis)),
        _ => None,
    }
}

///////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////

fn parse_bvh(contents: &str) -> Result<MotionClip, AssetLoadError> {
    let re_joint = Regex::new(r"^(ROOT|JOINT)\s+(\S+)").expect("valid regex");
    let re_offset = Regex::new(r"^OFFSET\s+(.+)").expect("valid regex");
    let re_channels = Regex::new(r"^CHANNELS\s+(\d+)\s*(.*)").expect("valid regex");

    let mut joints: Vec<JointDecl> = Vec::new();
    let mut stack: Vec<Scope> = Vec::new();
    let mut pending: Option<Scope> = None;
    let mut num_channels = 0;

    let mut num_frames: Option<usize> = None;
    let mut frame_time: Option<f64> = None;

    //// PARSING HIERARCHY LINE BY LINE
    let mut it = contents.lines().enumerate().map(|(i, l)| (i + 1, l.trim()));
    loop {
        let Some((line_no, line)) = it.next() else {
            return Err(AssetLoadError::parse(
                contents.lines().count(),
                "unexpected end of file (no 'Frame Time:' line)",
            ));
        };

        if line.is_empty() || line.starts_with("HIERARCHY") || line.starts_with("MOTION") {
            continue;
        } else if let Some(captures) = re_joint.captures(line) {
            //// Create joint, its parent is the innermost open joint
            let is_root = &captures[1] == "ROOT";
            let parent = match stack.last() {
                Some(Scope::Joint(p)) => Some(*p),
                Some(Scope::EndSite) => {
                    return Err(AssetLoadError::parse(line_no, "joint declared inside an End Site"))
                }
                None => None,
            };
            if is_root != parent.is_none() {
                return Err(AssetLoadError::parse(
                    line_no,
                    "ROOT must be top level and JOINT must be nested in another joint",
                ));
            }
            pending = Some(Scope::Joint(joints.len()));
            joints.push(JointDecl {
                name: captures[2].to_string(),
                parent,
                offset: Position::new(0.0, 0.0, 0.0),
                channels: Vec::new(),
            });
        } else if line.to_lowercase().starts_with("end") {
            //// End sites only mark the tip of a leaf joint
            pending = Some(Scope::EndSite);
        } else if line == "{" {
            let scope = pending
                .take()
                .ok_or_else(|| AssetLoadError::parse(line_no, "'{' without a joint"))?;
            stack.push(scope);
        } else if line == "}" {
            stack
                .pop()
                .ok_or_else(|| AssetLoadError::parse(line_no, "unbalanced '}'"))?;
        } else if let Some(captures) = re_offset.captures(line) {
            //// Parse offset
            let values = parse_floats(&captures[1], line_no)?;
            if values.len() != 3 {
                return Err(AssetLoadError::parse(line_no, "OFFSET needs three values"));
            }
            if let Some(Scope::Joint(index)) = stack.last() {
                joints[*index].offset = Position::new(values[0], values[1], values[2]);
            }
        } else if let Some(captures) = re_channels.captures(line) {
            //// Parse channels, columns are numbered across all joints in declaration order
            let Some(Scope::Joint(index)) = stack.last().copied() else {
                return Err(AssetLoadError::parse(line_no, "CHANNELS outside of a joint"));
            };
            let declared: usize = captures[1]
                .parse()
                .map_err(|_| AssetLoadError::parse(line_no, "invalid channel count"))?;
            let names: Vec<&str> = captures[2].split_whitespace().collect();
            if names.len() != declared {
                return Err(AssetLoadError::parse(
                    line_no,
                    format!("{declared} channels declared but {} listed", names.len()),
                ));
            }
            for name in names {
                let channel = parse_channel(name)
                    .ok_or_else(|| AssetLoadError::parse(line_no, format!("unknown channel '{name}'")))?;
                joints[index].channels.push((channel, num_channels));
                num_channels += 1;
            }
        } else if let Some(rest) = line.strip_prefix("Frames:") {
            //// Parse number of frames
            num_frames = Some(
                rest.trim()
                    .parse::<usize>()
                    .map_err(|_| AssetLoadError::parse(line_no, "invalid frame count"))?,
            );
        } else if let Some(rest) = line.strip_prefix("Frame Time:") {
            //// Parse frame time
            frame_time = Some(
                rest.trim()
                    .parse::<f64>()
                    .map_err(|_| AssetLoadError::parse(line_no, "invalid frame time"))?,
            );
            break; // jump to parsing Motion
        } else {
            return Err(AssetLoadError::parse(line_no, format!("unexpected line '{line}'")));
        }
    }

    if !stack.is_empty() {
        return Err(AssetLoadError::parse(0, "unclosed '{' in HIERARCHY"));
    }
    let num_frames = num_frames.ok_or_else(|| AssetLoadError::parse(0, "missing 'Frames:' line"))?;
    let frame_time = frame_time.unwrap_or_default();

    /////////////////////////////////// PARSING MOTION ///////////////////////////////////

    let mut motion: Vec<Vec<f64>> = Vec::with_capacity(num_frames.min(PREALLOCATED_FRAMES));
    for (line_no, line) in it {
        if line.is_empty() {
            continue;
        }
        let values = parse_floats(line, line_no)?;
        if values.len() != num_channels {
            return Err(AssetLoadError::parse(
                line_no,
                format!("expected {num_channels} values, found {}", values.len()),
            ));
        }
        motion.push(values);
    }
    if motion.len() != num_frames {
        return Err(AssetLoadError::parse(
            contents.lines().count(),
            format!("header announces {num_frames} frames but {} were found", motion.len()),
        ));
    }

    build_clip(joints, motion, frame_time)
}

/// Turn declarations + raw motion columns into a skeleton and per-joint tracks.
fn build_clip(joints: Vec<JointDecl>, motion: Vec<Vec<f64>>, frame_time: f64) -> Result<MotionClip, AssetLoadError> {
    let mut builder = Skeleton::builder();
    for joint in joints.iter() {
        let rest = Transform {
            scale: 1.0,
            rot: utils::identity_rotation(),
            disp: joint.offset,
        };
        builder
            .add_bone(joint.name.clone(), joint.parent, rest)
            .map_err(|e| AssetLoadError::Skeleton(e.to_string()))?;
    }
    let skeleton = builder.build().map_err(|e| AssetLoadError::Skeleton(e.to_string()))?;

    //// rotations, composed in the order the channels are listed
    let local_rotations: Vec<Vec<Quaternion>> = joints
        .iter()
        .map(|joint| {
            motion
                .iter()
                .map(|frame| {
                    let angles: Vec<(Axis, f64)> = joint
                        .channels
                        .iter()
                        .filter_map(|&(channel, column)| match channel {
                            Channel::Rotation(axis) => Some((axis, frame[column])),
                            Channel::Position(_) => None,
                        })
                        .collect();
                    utils::from_euler_degrees(&angles)
                })
                .collect()
        })
        .collect();

    //// root translation, other joints only ever use their offset
    let mut root_columns = [None; 3];
    for (i, joint) in joints.iter().enumerate() {
        for &(channel, column) in joint.channels.iter() {
            if let Channel::Position(axis) = channel {
                if i == 0 {
                    root_columns[axis as usize] = Some(column);
                } else {
                    debug!("ignoring position channel of non-root joint '{}'", joint.name);
                }
            }
        }
    }
    let root_positions = match root_columns {
        [None, None, None] => Vec::new(),
        columns => {
            let offset = joints[0].offset;
            let value = |frame: &Vec<f64>, axis: usize, fallback: f64| columns[axis].map_or(fallback, |c| frame[c]);
            motion
                .iter()
                .map(|frame| {
                    Position::new(
                        value(frame, 0, offset.x),
                        value(frame, 1, offset.y),
                        value(frame, 2, offset.z),
                    )
                })
                .collect()
        }
    };

    MotionClip::new(skeleton, frame_time, local_rotations, root_positions)
}

//////////////////////////////////////////////////////////////// PUBLIC ///////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////

/// load a bvh file from a file path
pub fn load_bvh_from_file(file_path: impl AsRef<Path>) -> Result<MotionClip, AssetLoadError> {
    let contents = std::fs::read_to_string(file_path)?;
    load_bvh_from_string(&contents)
}

/// load a bvh file from a string
pub fn load_bvh_from_string(bvh_string: &str) -> Result<MotionClip, AssetLoadError> {
    let clip = parse_bvh(bvh_string)?;
    debug!(
        "loaded bvh: {} joints, {} frames at {} fps",
        clip.skeleton().len(),
        clip.num_frames(),
        clip.fps()
    );
    Ok(clip)
}
