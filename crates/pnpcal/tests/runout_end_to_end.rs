//! Runout calibration driven by rendered frames and the symmetry detector.
//!
//! A simulated nozzle carries a tip whose center orbits the rotation axis.
//! Each captured frame shows the tip as a bright disc; the calibrator has to
//! recover the runout circle from the detector output alone.

use std::cell::RefCell;
use std::rc::Rc;

use image::{GrayImage, Luma};
use pnpcal::machine::{CancelToken, MachineError, Movable, Nozzle};
use pnpcal::runout::{
    CompensationTable, NozzleRunoutCalibrator, RunoutCalibrationConfig, RunoutMethod,
    RunoutOutcome, RunoutRig,
};
use pnpcal::vision::{Camera, FrameSource, SymmetryPipeline};
use pnpcal::{Pose, SymmetryParams};

const UPP: f64 = 0.02;
const TIP_DIAMETER_PX: f64 = 30.0;

struct World {
    commanded: Pose,
    axis_offset: [f64; 2],
    runout_radius: f64,
    runout_phase: f64,
}

impl World {
    /// True tip offset from the nozzle axis at rotation `angle`.
    fn tip_offset(&self, angle: f64) -> [f64; 2] {
        let (s, c) = (angle + self.runout_phase).to_radians().sin_cos();
        [
            self.axis_offset[0] + self.runout_radius * c,
            self.axis_offset[1] + self.runout_radius * s,
        ]
    }
}

struct SimNozzle(Rc<RefCell<World>>);

impl Movable for SimNozzle {
    fn id(&self) -> &str {
        "N1"
    }

    fn location(&self) -> Pose {
        self.0.borrow().commanded
    }

    fn move_to(&mut self, pose: &Pose, _speed: f64) -> Result<(), MachineError> {
        self.0.borrow_mut().commanded = *pose;
        Ok(())
    }

    fn move_to_safe_z(&mut self) -> Result<(), MachineError> {
        self.0.borrow_mut().commanded.z = 0.0;
        Ok(())
    }
}

impl Nozzle for SimNozzle {
    fn loaded_tip(&self) -> Option<&str> {
        Some("CN065")
    }
}

/// Up-looking camera rendering the tip as a disc.
struct TipFrames(Rc<RefCell<World>>);

impl FrameSource for TipFrames {
    fn capture(&mut self, camera: &Camera) -> Result<GrayImage, MachineError> {
        let w = self.0.borrow();
        let [ox, oy] = w.tip_offset(w.commanded.rotation);
        let tip = Pose::mm(w.commanded.x + ox, w.commanded.y + oy, 0.0, 0.0);
        let [cx, cy] = camera.to_pixels(&tip.subtract(&camera.location));
        let r = TIP_DIAMETER_PX / 2.0;
        Ok(GrayImage::from_fn(camera.width, camera.height, |x, y| {
            let d = (x as f64 - cx).hypot(y as f64 - cy);
            Luma([if d < r { 235 } else { 25 }])
        }))
    }
}

fn detector_params() -> SymmetryParams {
    SymmetryParams {
        max_diameter: 40,
        min_diameter: 20,
        max_search_distance: 20,
        sub_sampling: 2,
    }
}

#[test]
fn model_recovered_from_rendered_frames() {
    let world = Rc::new(RefCell::new(World {
        commanded: Pose::mm(0.0, 0.0, 0.0, 0.0),
        axis_offset: [0.05, -0.03],
        runout_radius: 0.2,
        runout_phase: 35.0,
    }));
    let mut camera = Camera::new(
        "bottom",
        Pose::mm(150.0, 80.0, -12.0, 0.0),
        Pose::mm(UPP, UPP, 0.0, 0.0),
        200,
        200,
    );
    let mut nozzle = SimNozzle(world.clone());
    let mut vision = SymmetryPipeline::new(TipFrames(world.clone()), detector_params());
    let mut table = CompensationTable::new();
    let calibrator = NozzleRunoutCalibrator::new(
        "CN065",
        RunoutCalibrationConfig {
            method: RunoutMethod::Model,
            subdivisions: 12,
            ..Default::default()
        },
    );

    let rig = RunoutRig {
        nozzle: &mut nozzle,
        camera: &mut camera,
        vision: &mut vision,
        table: &mut table,
        machine_homed: true,
        cancel: CancelToken::new(),
    };
    let outcome = calibrator.calibrate(rig, false, false).unwrap();
    let model = match outcome {
        RunoutOutcome::Stored(model) => model,
        other => panic!("expected a stored model, got {other:?}"),
    };

    let circle = model.circle().expect("model variant carries a circle");
    assert!((circle.radius - 0.2).abs() < 0.03, "{circle:?}");
    assert!((circle.center_x - 0.05).abs() < 0.03, "{circle:?}");
    assert!((circle.center_y + 0.03).abs() < 0.03, "{circle:?}");

    let w = world.borrow();
    for angle in [-150.0, -60.0, 0.0, 45.0, 120.0] {
        let predicted = table.offset("N1", angle).expect("table holds the model");
        let [tx, ty] = w.tip_offset(angle);
        let err = (predicted.x - tx).hypot(predicted.y - ty);
        assert!(err < 0.05, "angle {angle}: predicted {predicted}, true ({tx}, {ty})");
    }

    // The nozzle is left at the calibration pose at safe Z.
    assert_eq!(w.commanded.x, 150.0);
    assert_eq!(w.commanded.y, 80.0);
    assert_eq!(w.commanded.z, 0.0);
}

#[test]
fn table_variant_interpolates_measured_offsets() {
    let world = Rc::new(RefCell::new(World {
        commanded: Pose::mm(0.0, 0.0, 0.0, 0.0),
        axis_offset: [0.0, 0.0],
        runout_radius: 0.15,
        runout_phase: -20.0,
    }));
    let mut camera = Camera::new(
        "bottom",
        Pose::mm(150.0, 80.0, -12.0, 0.0),
        Pose::mm(UPP, UPP, 0.0, 0.0),
        200,
        200,
    );
    let mut nozzle = SimNozzle(world.clone());
    let mut vision = SymmetryPipeline::new(TipFrames(world.clone()), detector_params());
    let mut table = CompensationTable::new();
    let calibrator = NozzleRunoutCalibrator::new(
        "CN065",
        RunoutCalibrationConfig {
            method: RunoutMethod::Table,
            subdivisions: 8,
            ..Default::default()
        },
    );
    let rig = RunoutRig {
        nozzle: &mut nozzle,
        camera: &mut camera,
        vision: &mut vision,
        table: &mut table,
        machine_homed: true,
        cancel: CancelToken::new(),
    };
    calibrator.calibrate(rig, false, false).unwrap();

    let model = table.get("N1").unwrap();
    assert_eq!(model.method(), RunoutMethod::Table);
    assert!(model.axis_offset().is_none());
    let w = world.borrow();
    // Sampled angles reproduce the detection.
    let at_sample = table.offset("N1", -90.0).unwrap();
    let [tx, ty] = w.tip_offset(-90.0);
    assert!((at_sample.x - tx).hypot(at_sample.y - ty) < 2.5 * UPP);
}
