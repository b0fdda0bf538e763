//! Depth fusion.
//!
//! Each detection's box is projected into a co-registered depth image and
//! assigned the median of the samples it covers. Depth arrives either from a
//! depth-estimation network (`DepthMap`) or a hardware sensor
//! (`SensorDepth`); both are read through the [`DepthSource`] accessor.

mod fuse;
mod source;

pub use fuse::{fuse, DepthProjection, PixelRegion};
pub use source::{DepthMap, DepthSource, SensorDepth};
