//! Bottom vision on a simulated part rigidly offset on its nozzle.

use std::cell::RefCell;
use std::rc::Rc;

use approx::assert_relative_eq;
use pnpcal::bottom_vision::{
    AlignmentMode, AlignmentRig, BottomVisionAligner, BottomVisionSettings, Footprint, Part,
    PartSizeCheck,
};
use pnpcal::machine::{MachineError, Movable, Nozzle};
use pnpcal::vision::{Camera, PipelineResult, RotatedRect, VisionPipeline, VisionRequest};
use pnpcal::{LengthUnit, Pose};

/// Part pose relative to the nozzle: XY offset at nozzle rotation 0 and
/// angle error.
struct World {
    nozzle: Pose,
    part_offset: [f64; 2],
    part_angle: f64,
    measurements: usize,
}

struct SimNozzle(Rc<RefCell<World>>);

impl Movable for SimNozzle {
    fn id(&self) -> &str {
        "N2"
    }
    fn location(&self) -> Pose {
        self.0.borrow().nozzle
    }
    fn move_to(&mut self, pose: &Pose, _speed: f64) -> Result<(), MachineError> {
        self.0.borrow_mut().nozzle = *pose;
        Ok(())
    }
    fn move_to_safe_z(&mut self) -> Result<(), MachineError> {
        Ok(())
    }
}

impl Nozzle for SimNozzle {
    fn loaded_tip(&self) -> Option<&str> {
        Some("CN140")
    }
}

/// Reports the outline of the held part, 3.2 × 1.6 mm.
struct OutlineVision(Rc<RefCell<World>>);

impl VisionPipeline for OutlineVision {
    fn process(
        &mut self,
        camera: &Camera,
        _request: &VisionRequest,
    ) -> Result<Option<PipelineResult>, MachineError> {
        let mut w = self.0.borrow_mut();
        w.measurements += 1;
        let offset = Pose::mm(w.part_offset[0], w.part_offset[1], 0.0, 0.0)
            .rotate_xy(w.nozzle.rotation);
        let center = Pose::mm(w.nozzle.x + offset.x, w.nozzle.y + offset.y, 0.0, 0.0);
        let upp = camera.units_per_pixel.x;
        Ok(Some(PipelineResult::RotatedRect(RotatedRect {
            center: camera.to_pixels(&center.subtract(&camera.location)),
            size: [3.2 / upp, 1.6 / upp],
            angle: camera.location.rotation - (w.nozzle.rotation + w.part_angle),
        })))
    }
}

fn part() -> Part {
    Part {
        id: "C1206".to_string(),
        height: Some(pnpcal::Length::mm(1.0)),
        footprint: Footprint {
            units: LengthUnit::Millimeters,
            body_width: 3.2,
            body_height: 1.6,
            pads: Vec::new(),
        },
    }
}

fn align(
    camera_rotation: f64,
    placement_angle: f64,
    settings: &BottomVisionSettings,
) -> (pnpcal::bottom_vision::PartAlignmentOffset, Rc<RefCell<World>>) {
    let world = Rc::new(RefCell::new(World {
        nozzle: Pose::mm(0.0, 0.0, 0.0, 0.0),
        part_offset: [0.3, -0.2],
        part_angle: 5.0,
        measurements: 0,
    }));
    let camera = Camera::new(
        "bottom",
        Pose::mm(300.0, 40.0, -20.0, camera_rotation),
        Pose::mm(0.025, 0.025, 0.0, 0.0),
        640,
        480,
    );
    let mut nozzle = SimNozzle(world.clone());
    let mut vision = OutlineVision(world.clone());
    let rig = AlignmentRig {
        nozzle: &mut nozzle,
        camera: &camera,
        vision: &mut vision,
        auto_focus: None,
    };
    let result = BottomVisionAligner::default()
        .find_offsets(
            rig,
            &part(),
            &Pose::mm(10.0, 20.0, 0.0, placement_angle),
            settings,
        )
        .unwrap();
    (result, world)
}

#[test]
fn pre_rotate_converges_in_two_passes() {
    let settings = BottomVisionSettings {
        part_size_check: PartSizeCheck::BodySize,
        ..Default::default()
    };
    for camera_rotation in [0.0, 180.0] {
        let (result, world) = align(camera_rotation, 30.0, &settings);
        assert!(result.pre_rotated && result.applied);
        assert_eq!(result.passes, 2);
        assert_eq!(world.borrow().measurements, 2);

        // Nozzle turned to 30° − 5°: the part offset shows up rotated by 25°.
        let expected = Pose::mm(0.3, -0.2, 0.0, 0.0).rotate_xy(25.0);
        assert_relative_eq!(result.offset.x, expected.x, epsilon = 1e-6);
        assert_relative_eq!(result.offset.y, expected.y, epsilon = 1e-6);
        assert_relative_eq!(result.offset.rotation, 5.0, epsilon = 1e-6);
        assert_relative_eq!(world.borrow().nozzle.rotation, 25.0, epsilon = 1e-6);
    }
}

#[test]
fn post_rotate_reports_raw_offset_at_zero() {
    let settings = BottomVisionSettings {
        mode: AlignmentMode::PostRotate,
        ..Default::default()
    };
    let (result, world) = align(0.0, 30.0, &settings);
    assert!(!result.pre_rotated);
    assert_eq!(world.borrow().measurements, 1);
    assert_relative_eq!(result.offset.x, 0.3, epsilon = 1e-6);
    assert_relative_eq!(result.offset.y, -0.2, epsilon = 1e-6);
    assert_relative_eq!(result.offset.rotation, 5.0, epsilon = 1e-6);
}

#[test]
fn part_height_lifts_the_nozzle() {
    let (_, world) = align(0.0, 0.0, &BottomVisionSettings::default());
    assert_relative_eq!(world.borrow().nozzle.z, -19.0, epsilon = 1e-12);
}
