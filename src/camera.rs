use std::fmt::Debug;

use crate::my_types::*;

#[derive(Debug)]
pub struct Camera {
    pub kind: CameraKind,
    pub model: Box<dyn CameraModel>,
    pub image_shape: ImageShape,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum CameraKind {
    Pinhole,
    DoubleSphere,
}

pub trait CameraModel: Debug + Send + Sync {
    /// Ray through the pixel, not necessarily normalized
    fn back_project(&self, pixel: Vector2d) -> Option<Vector3d>;

    fn project_with_derivative(
        &self,
        ray: Vector3d,
        compute_derivative: bool,
    ) -> (Option<Vector2d>, Option<Matrix23d>);

    fn project(&self, ray: Vector3d) -> Option<Vector2d> {
        self.project_with_derivative(ray, false).0
    }
}

impl Camera {
    /// Project a point given in this camera's frame to a pixel. Fails when the
    /// model cannot project the point or the pixel falls outside the image.
    pub fn project_to_image(&self, point: Vector3d) -> Option<Vector2d> {
        let pixel = self.model.project(point)?;
        let (width, height) = self.image_shape;
        let inside = pixel[0] >= 0.
            && pixel[1] >= 0.
            && pixel[0] <= (width - 1) as f64
            && pixel[1] <= (height - 1) as f64;
        inside.then_some(pixel)
    }

    /// Project a world point seen from a camera placed at `world_from_camera`
    pub fn project_world_point(&self, world_from_camera: &Isometry3d, point: Vector3d) -> Option<Vector2d> {
        let camera_from_world = world_from_camera.inverse();
        self.project_to_image(transform_point(&camera_from_world, &point))
    }
}

pub fn transform_point(transform: &Isometry3d, point: &Vector3d) -> Vector3d {
    transform.transform_point(&(*point).into()).coords
}
