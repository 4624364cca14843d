use std::fmt;

use nalgebra as na;
use serde::{Deserialize, Serialize};

pub type Vector2d = na::Vector2<f64>;
pub type Vector3d = na::Vector3<f64>;
pub type Matrix2d = na::Matrix2<f64>;
pub type Matrix3d = na::Matrix3<f64>;
pub type Matrix23d = na::Matrix2x3<f64>;
pub type Matrixd = na::DMatrix<f64>;
pub type Isometry3d = na::Isometry3<f64>;

/// (width, height) in pixels
pub type ImageShape = (usize, usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FrameId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LandmarkId(pub usize);

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame#{}", self.0)
    }
}

impl fmt::Display for LandmarkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "landmark#{}", self.0)
    }
}
