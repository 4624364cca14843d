use crate::camera::*;
use crate::my_types::*;

/// Double sphere model for wide field of view lenses.
/// ref https://arxiv.org/abs/1807.08957
#[derive(Debug)]
pub struct DoubleSphereModel {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    pub xi: f64,
    pub alpha: f64,
}

impl DoubleSphereModel {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64, xi: f64, alpha: f64) -> Self {
        Self {
            fx,
            fy,
            cx,
            cy,
            xi,
            alpha,
        }
    }

    /// Points with z below `-w2 * |p|` are outside the valid projection cone, eq. 43
    fn projection_cone(&self) -> f64 {
        let w1 = if self.alpha <= 0.5 {
            self.alpha / (1. - self.alpha)
        } else {
            (1. - self.alpha) / self.alpha
        };
        (w1 + self.xi) / (2. * w1 * self.xi + self.xi * self.xi + 1.).sqrt()
    }
}

impl CameraModel for DoubleSphereModel {
    fn back_project(&self, pixel: Vector2d) -> Option<Vector3d> {
        let mx = (pixel[0] - self.cx) / self.fx;
        let my = (pixel[1] - self.cy) / self.fy;
        let r2 = mx * mx + my * my;
        let a = self.alpha;
        if a > 0.5 && r2 > 1. / (2. * a - 1.) {
            return None;
        }
        let mz = (1. - a * a * r2) / (a * (1. - (2. * a - 1.) * r2).sqrt() + 1. - a);
        let mz2 = mz * mz;
        let scale = (mz * self.xi + (mz2 + (1. - self.xi * self.xi) * r2).sqrt()) / (mz2 + r2);
        Some(Vector3d::new(scale * mx, scale * my, scale * mz - self.xi))
    }

    fn project_with_derivative(
        &self,
        ray: Vector3d,
        compute_derivative: bool,
    ) -> (Option<Vector2d>, Option<Matrix23d>) {
        let (x, y, z) = (ray[0], ray[1], ray[2]);
        let d1 = ray.norm();
        if z <= -self.projection_cone() * d1 {
            return (None, None);
        }
        let a = self.alpha;
        let k = self.xi * d1 + z;
        let d2 = (x * x + y * y + k * k).sqrt();
        let denom = a * d2 + (1. - a) * k;
        if denom <= 0. {
            return (None, None);
        }
        let pixel = Vector2d::new(
            self.fx * x / denom + self.cx,
            self.fy * y / denom + self.cy,
        );
        let pixel_derivative = if compute_derivative {
            // d(denom)/d(x, y, z)
            let dk = Vector3d::new(self.xi * x / d1, self.xi * y / d1, self.xi * z / d1 + 1.);
            let dd2 = (Vector3d::new(x, y, 0.) + k * dk) / d2;
            let ddenom = a * dd2 + (1. - a) * dk;
            let inv = 1. / denom;
            let mut m = Matrix23d::zeros();
            for j in 0..3 {
                let dx = if j == 0 { 1. } else { 0. };
                let dy = if j == 1 { 1. } else { 0. };
                m[(0, j)] = self.fx * (dx * inv - x * ddenom[j] * inv * inv);
                m[(1, j)] = self.fy * (dy * inv - y * ddenom[j] * inv * inv);
            }
            Some(m)
        } else {
            None
        };
        (Some(pixel), pixel_derivative)
    }
}
