//! Synthetic image sequences with known landmark positions.
//!
//! Landmarks are rendered as gaussian blobs over a flat background, seen by a
//! camera translating sideways while slowly turning.

use std::sync::Arc;

use anyhow::Result;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::camera::*;
use crate::double_sphere::DoubleSphereModel;
use crate::frame::Frame;
use crate::image::Image;
use crate::landmark::{Landmark, Observation};
use crate::my_types::*;
use crate::pinhole::PinholeModel;

const BACKGROUND: f64 = 40.;
const BLOB_SIGMA: f64 = 3.;

#[derive(Clone, Debug)]
pub struct SceneConfig {
    pub landmark_count: usize,
    pub seed: u64,
    pub stereo: bool,
    /// Distance between the two cameras of the rig, in meters
    pub baseline: f64,
    /// Sideways motion per frame, in meters
    pub speed: f64,
    /// Landmark depth range, in meters
    pub depth: (f64, f64),
    /// Each ground truth coordinate is off by up to this much, in meters
    pub ground_truth_noise: f64,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            landmark_count: 200,
            seed: 0,
            stereo: false,
            baseline: 0.1,
            speed: 0.01,
            depth: (3., 8.),
            ground_truth_noise: 0.,
        }
    }
}

/// Camera used by the demo sequences, 640 x 480
pub fn synthetic_camera(kind: CameraKind) -> Camera {
    let model: Box<dyn CameraModel> = match kind {
        CameraKind::Pinhole => Box::new(PinholeModel::new(Matrix3d::new(
            400., 0., 319.5, 0., 400., 239.5, 0., 0., 1.,
        ))),
        CameraKind::DoubleSphere => Box::new(DoubleSphereModel::new(220., 220., 319.5, 239.5, -0.2, 0.6)),
    };
    Camera {
        kind,
        model,
        image_shape: (640, 480),
    }
}

#[derive(Debug)]
pub struct SyntheticScene {
    camera: Arc<Camera>,
    config: SceneConfig,
    points: Vec<Vector3d>,
    intensities: Vec<f64>,
    ground_truth: Vec<Vector3d>,
}

impl SyntheticScene {
    /// Scatter landmarks so that all of them are visible from the first frame
    pub fn new(camera: Arc<Camera>, config: SceneConfig) -> Self {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(config.seed);
        let (width, height) = camera.image_shape;
        let margin = 4. * BLOB_SIGMA;

        let mut points = vec![];
        let mut intensities = vec![];
        let mut ground_truth = vec![];
        while points.len() < config.landmark_count {
            let pixel = Vector2d::new(
                rng.gen_range(margin..width as f64 - margin),
                rng.gen_range(margin..height as f64 - margin),
            );
            let ray = match camera.model.back_project(pixel) {
                Some(ray) => ray.normalize(),
                None => continue,
            };
            let point = rng.gen_range(config.depth.0..config.depth.1) * ray;
            let noise = if config.ground_truth_noise > 0. {
                let n = config.ground_truth_noise;
                Vector3d::new(rng.gen_range(-n..n), rng.gen_range(-n..n), rng.gen_range(-n..n))
            } else {
                Vector3d::zeros()
            };
            points.push(point);
            intensities.push(rng.gen_range(120.0..230.0));
            ground_truth.push(point + noise);
        }

        Self {
            camera,
            config,
            points,
            intensities,
            ground_truth,
        }
    }

    pub fn camera(&self) -> &Arc<Camera> {
        &self.camera
    }

    /// Pose of the (left) camera when taking frame `frame_number`
    pub fn world_from_camera(&self, frame_number: usize) -> Isometry3d {
        let n = frame_number as f64;
        let translation = Vector3d::new(self.config.speed * n, 0.002 * n.sin(), 0.);
        let rotation = Vector3d::new(0., -0.001 * n, 0.);
        Isometry3d::new(translation, rotation)
    }

    fn left_from_right(&self) -> Isometry3d {
        Isometry3d::translation(self.config.baseline, 0., 0.)
    }

    pub fn render(&self, world_from_camera: &Isometry3d) -> Image {
        let (width, height) = self.camera.image_shape;
        let mut buffer = vec![BACKGROUND; width * height];
        let radius = (4. * BLOB_SIGMA).ceil() as i64;
        for (point, intensity) in self.points.iter().zip(&self.intensities) {
            let center = match self.camera.project_world_point(world_from_camera, *point) {
                Some(center) => center,
                None => continue,
            };
            let (cx, cy) = (center[0].round() as i64, center[1].round() as i64);
            for y in (cy - radius).max(0)..(cy + radius + 1).min(height as i64) {
                for x in (cx - radius).max(0)..(cx + radius + 1).min(width as i64) {
                    let d2 = (Vector2d::new(x as f64, y as f64) - center).norm_squared();
                    let v = (intensity - BACKGROUND) * (-d2 / (2. * BLOB_SIGMA * BLOB_SIGMA)).exp();
                    buffer[y as usize * width + x as usize] += v;
                }
            }
        }
        Image {
            data: buffer.iter().map(|v| v.round().clamp(0., 255.) as u8).collect(),
            width,
            height,
        }
    }

    pub fn frame(&self, frame_number: usize) -> Frame {
        let pose = self.world_from_camera(frame_number);
        let frame = Frame::new(self.render(&pose), self.camera.clone()).with_pose(pose);
        if self.config.stereo {
            frame.with_stereo_image(self.render(&(pose * self.left_from_right())))
        } else {
            frame
        }
    }

    /// One landmark per point visible in `frame`, observed where it projects
    pub fn landmarks(&self, frame: &Frame) -> Result<Vec<Landmark>> {
        let pose = match frame.pose() {
            Some(pose) => *pose,
            None => return Ok(vec![]),
        };
        let right_pose = pose * self.left_from_right();
        let mut landmarks = vec![];
        for (i, (point, ground_truth)) in self.points.iter().zip(&self.ground_truth).enumerate() {
            let pixel = match self.camera.project_world_point(&pose, *point) {
                Some(pixel) => pixel,
                None => continue,
            };
            let mut landmark = Landmark::new(LandmarkId(i)).with_ground_truth(*ground_truth);
            let size = 2. * BLOB_SIGMA;
            landmark.add_observation(Observation::new(frame.id(), pixel, size))?;
            if frame.has_stereo_image() {
                if let Some(right_pixel) = self.camera.project_world_point(&right_pose, *point) {
                    landmark.add_stereo_observation(Observation::new(frame.id(), right_pixel, size))?;
                }
            }
            landmarks.push(landmark);
        }
        Ok(landmarks)
    }

    /// Where landmark `id` truly projects in `frame`
    pub fn true_projection(&self, id: LandmarkId, frame: &Frame) -> Option<Vector2d> {
        let point = self.points.get(id.0)?;
        self.camera.project_world_point(frame.pose()?, *point)
    }
}
