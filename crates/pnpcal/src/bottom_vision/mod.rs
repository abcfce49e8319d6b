//! Bottom-vision part alignment.
//!
//! A part picked by a nozzle is seldom centered or square on it. The
//! [`BottomVisionAligner`] holds the part over an up-looking camera, measures
//! its outline and reports the offset the placement has to apply. In
//! pre-rotate mode the part is turned to its placement angle first and the
//! nozzle pose is corrected pass by pass; post-rotate mode measures once at 0°.

mod aligner;
mod footprint;
mod settings;

pub use aligner::{
    pre_rotate_step, AlignerConfig, AlignmentRig, AutoFocus, BottomVisionAligner,
    OutlineMeasurement, PartAlignmentOffset, PassStep,
};
pub use footprint::{Footprint, Pad, Part};
pub use settings::{resolve_settings, AlignmentMode, BottomVisionSettings, MaxRotation, PartSizeCheck};
