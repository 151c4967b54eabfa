//! Reading composition lists and writing model output.

mod compositions;
mod trajectory;

pub use compositions::CompositionIO;
pub use trajectory::{write_npy, TrajectoryWriter};
