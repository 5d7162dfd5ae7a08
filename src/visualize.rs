use crate::types::{Position, Quaternion};
use crate::{FrameUpdater, Skeleton, TickOutcome, UpdaterState};
use bevy::prelude::*;
use bevy_panorbit_camera::{PanOrbitCamera, PanOrbitCameraPlugin};

///////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////

/// Viewer state. Lives in a non-send resource because the updater shares its assets through `Rc`.
pub struct ViewerState {
    pub updater: FrameUpdater,
    pub playing: bool,
    pub show_source: bool,
    pub debug_text: bool,
    /// Source clips are usually authored in centimeters, rigs in meters.
    pub source_scale: f32,
    /// Where the source skeleton is drawn, next to the target.
    pub source_offset: Vec3,
    last_outcome: Option<TickOutcome>,
}

impl ViewerState {
    pub fn new(updater: FrameUpdater, source_scale: f32) -> Self {
        ViewerState {
            updater,
            playing: true,
            show_source: true,
            debug_text: false,
            source_scale,
            source_offset: Vec3::new(1.5, 0.0, 0.0),
            last_outcome: None,
        }
    }
}

///////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////

pub fn run_viewer(state: ViewerState) {
    App::new()
        .insert_non_send_resource(state)
        .add_plugins(DefaultPlugins)
        .add_plugins(PanOrbitCameraPlugin)
        .add_systems(Startup, setup)
        // the pose is written before anything reads it
        .add_systems(Update, (update_main, draw_skeletons, update_debug_text).chain())
        .run();
}

#[derive(Component)]
struct DebugText;

///////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////

fn setup(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    //// Orbit camera
    commands.spawn((
        Camera3dBundle {
            transform: Transform::from_xyz(0.75, 1.5, 4.).looking_at(Vec3::new(0.75, 1.0, 0.0), Vec3::Y),
            ..default()
        },
        PanOrbitCamera::default(),
    ));
    // floor
    commands.spawn(PbrBundle {
        mesh: meshes.add(Plane3d::default().mesh().size(5.0, 5.0)),
        material: materials.add(StandardMaterial {
            base_color: Color::rgba(1., 1., 1., 0.5),
            alpha_mode: AlphaMode::Blend,
            double_sided: true,
            cull_mode: None,
            ..default()
        }),
        ..default()
    });

    commands.spawn(
        TextBundle::from_section(
            "Press 'Space' to pause\n\
            Press 'S' to toggle the source skeleton\n\
            Press 'B' to rebind\n\
            Press 'D' to toggle debug text\n\
            Hold 'Up' or 'Down' to change the line width\n",
            TextStyle {
                font_size: 15.,
                ..default()
            },
        )
        .with_style(Style {
            position_type: PositionType::Absolute,
            bottom: Val::Px(12.0),
            right: Val::Px(12.0),
            ..default()
        }),
    );

    commands.spawn((
        TextBundle::from_section(
            "",
            TextStyle {
                font_size: 17.,
                color: Color::rgba(1.0, 1.0, 1.0, 0.5),
                ..default()
            },
        )
        .with_style(Style {
            position_type: PositionType::Absolute,
            top: Val::Px(12.0),
            left: Val::Px(12.0),
            ..default()
        }),
        DebugText,
    ));
}

///////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////

fn to_vec3(p: &Position) -> Vec3 {
    Vec3::new(p.x as f32, p.y as f32, p.z as f32)
}

/// Draw joint axes (red, green, blue) at the joint position.
fn draw_joint_axes(gizmos: &mut Gizmos, rotation: &Quaternion, position: Vec3, length: f32) {
    let m = cgmath::Matrix3::from(*rotation);
    let axis = |c: cgmath::Vector3<f64>| Vec3::new(c.x as f32, c.y as f32, c.z as f32) * length + position;
    gizmos.line(position, axis(m.x), Color::RED);
    gizmos.line(position, axis(m.y), Color::GREEN);
    gizmos.line(position, axis(m.z), Color::BLUE);
}

/// Bones as lines from their parents, joints as small spheres.
fn draw_skeleton(gizmos: &mut Gizmos, skeleton: &Skeleton, scale: f32, offset: Vec3, color: Color) {
    let at = |p: &Position| to_vec3(p) * scale + offset;
    for bone in skeleton.bones() {
        let position = at(&bone.world.disp);
        if let Some(parent) = bone.parent.and_then(|p| skeleton.bone(p)) {
            gizmos.line(at(&parent.world.disp), position, color);
        }
        gizmos.sphere(position, Quat::IDENTITY, 0.01, Color::WHITE);
        draw_joint_axes(gizmos, &bone.world.rot, position, 0.05);
    }
}

fn draw_skeletons(mut gizmos: Gizmos, state: NonSend<ViewerState>) {
    if let Some(target) = state.updater.target() {
        if let Ok(rig) = target.try_borrow() {
            draw_skeleton(&mut gizmos, rig.skeleton(), 1.0, Vec3::ZERO, Color::YELLOW);
        }
    }
    if state.show_source {
        if let Some(source) = state.updater.source() {
            if let Ok(clip) = source.try_borrow() {
                draw_skeleton(&mut gizmos, clip.skeleton(), state.source_scale, state.source_offset, Color::CYAN);
            }
        }
    }
}

///////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////

fn update_main(
    mut config_store: ResMut<GizmoConfigStore>,
    keyboard: Res<ButtonInput<KeyCode>>,
    time: Res<Time>,
    mut state: NonSendMut<ViewerState>,
) {
    let (config, _) = config_store.config_mut::<DefaultGizmoConfigGroup>();
    if keyboard.pressed(KeyCode::ArrowUp) {
        config.line_width += 5. * time.delta_seconds();
        config.line_width = config.line_width.clamp(0., 50.);
    }
    if keyboard.pressed(KeyCode::ArrowDown) {
        config.line_width -= 5. * time.delta_seconds();
        config.line_width = config.line_width.clamp(0., 50.);
    }

    if keyboard.just_released(KeyCode::Space) {
        state.playing = !state.playing;
    }
    if keyboard.just_released(KeyCode::KeyS) {
        state.show_source = !state.show_source;
    }
    if keyboard.just_released(KeyCode::KeyD) {
        state.debug_text = !state.debug_text;
    }
    if keyboard.just_released(KeyCode::KeyB) {
        if let Err(err) = state.updater.rebind() {
            error!("rebind failed: {err}");
        }
    }

    if state.playing && state.updater.state() != UpdaterState::Stopped {
        let outcome = state.updater.tick(time.delta_seconds_f64());
        state.last_outcome = Some(outcome);
    }
}

fn update_debug_text(mut query: Query<&mut Text, With<DebugText>>, state: NonSend<ViewerState>) {
    let mut t = String::new();
    if state.debug_text {
        t += &format!("{:?}\n", state.last_outcome);
        if let (Some(binding), Some(target)) = (state.updater.binding(), state.updater.target()) {
            if let Ok(rig) = target.try_borrow() {
                for entry in binding.entries() {
                    let Some(bone) = rig.skeleton().bone(entry.target) else {
                        continue;
                    };
                    t += &format!("{:.<24} {: ^40}\n", entry.slot.to_string(), format!("{:6.2?}", bone.world.rot));
                }
            }
        }
    }
    for mut text in &mut query {
        text.sections[0].value = t.clone();
    }
}
