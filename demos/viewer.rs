use mocap_retarget::parse::load_bvh_from_file;
use mocap_retarget::rig_file::load_rig_from_file;
use mocap_retarget::visualize::{run_viewer, ViewerState};
use mocap_retarget::{FrameUpdater, RetargetConfig};
use std::cell::RefCell;
use std::rc::Rc;

fn main() {
    ////////////////////////////// configuration ///////////////////////////////////////////
    // aliases map the clip's "LeftArm"-style names onto humanoid slots
    let config = RetargetConfig::from_file("./demos/retarget.json").unwrap();
    let updater = FrameUpdater::new(config);

    ////////////////////////////// loading assets ///////////////////////////////////////////
    // a failed load is logged and leaves the updater idle
    let rig = load_rig_from_file("./demos/avatar.json").map(|rig| Rc::new(RefCell::new(rig)));
    let clip = load_bvh_from_file("./demos/walk.bvh").map(|clip| Rc::new(RefCell::new(clip)));
    updater.rig_slot().complete(rig);
    updater.motion_slot().complete(clip);

    ////////////////////////////// viewing ///////////////////////////////////////////
    // binding happens on the first frame; the clip is in centimeters
    run_viewer(ViewerState::new(updater, 0.01));
}
