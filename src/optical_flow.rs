use anyhow::{bail, Result};
use nalgebra as na;
use serde::{Deserialize, Serialize};

use crate::image::*;
use crate::my_types::*;
use crate::pyramid::PyramidFrame;

type Range = [[i32; 2]; 2];

/// Windows whose normalized minimum eigenvalue of the spatial gradient matrix
/// is below this have too little texture to track.
const MIN_EIGENVALUE: f64 = 1e-4;

/// Stop iterating at a level after `max_iterations` or once the update is
/// shorter than `epsilon` pixels, whichever comes first.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TermCriteria {
    pub max_iterations: usize,
    pub epsilon: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FlowParams {
    /// Number of downscaled levels on top of the original image
    pub level_count: usize,
    /// The integration window is `2 * half_window + 1` pixels wide on every level
    pub half_window: usize,
    pub term: TermCriteria,
}

/// Outcome for one seed point
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FlowEstimate {
    /// Position in the target image
    pub point: Vector2d,
    pub success: bool,
    /// Mean absolute intensity difference over the window, only meaningful on success
    pub error: f64,
}

/// Estimates where points of a reference image moved to in a target image.
/// Results have the same order and length as `seeds`.
pub trait OpticalFlow {
    fn calc(
        &mut self,
        reference: &Image,
        target: &Image,
        seeds: &[Vector2d],
        initial_guess: Option<&[Vector2d]>,
        params: &FlowParams,
    ) -> Result<Vec<FlowEstimate>>;
}

/// Iterative pyramidal Lucas-Kanade
#[derive(Debug)]
pub struct PyramidalLucasKanade {
    ix: Matrixd,
    iy: Matrixd,
    it: Matrixd,
    grid: Matrixd,
}

impl Default for PyramidalLucasKanade {
    fn default() -> Self {
        Self::new()
    }
}

impl OpticalFlow for PyramidalLucasKanade {
    fn calc(
        &mut self,
        reference: &Image,
        target: &Image,
        seeds: &[Vector2d],
        initial_guess: Option<&[Vector2d]>,
        params: &FlowParams,
    ) -> Result<Vec<FlowEstimate>> {
        if let Some(guess) = initial_guess {
            if guess.len() != seeds.len() {
                bail!(
                    "got {} initial guesses for {} seed points",
                    guess.len(),
                    seeds.len()
                );
            }
        }
        let pyramid_frame0 = PyramidFrame::new(reference, params.level_count);
        let pyramid_frame1 = PyramidFrame::new(target, params.level_count);

        let estimates = seeds
            .iter()
            .enumerate()
            .map(|(i, seed)| {
                let guess = initial_guess.map(|g| g[i]);
                match self.process_point(&pyramid_frame0, &pyramid_frame1, *seed, guess, params) {
                    Some((point, error)) => FlowEstimate {
                        point,
                        success: true,
                        error,
                    },
                    None => FlowEstimate {
                        point: guess.unwrap_or(*seed),
                        success: false,
                        error: f64::INFINITY,
                    },
                }
            })
            .collect();
        Ok(estimates)
    }
}

impl PyramidalLucasKanade {
    pub fn new() -> Self {
        PyramidalLucasKanade {
            ix: na::DMatrix::zeros(0, 0),
            iy: na::DMatrix::zeros(0, 0),
            it: na::DMatrix::zeros(0, 0),
            grid: na::DMatrix::zeros(0, 0),
        }
    }

    /// ref http://robots.stanford.edu/cs223b04/algo_tracking.pdf
    fn process_point(
        &mut self,
        pyramid_frame0: &PyramidFrame,
        pyramid_frame1: &PyramidFrame,
        point0: Vector2d,
        point1_in: Option<Vector2d>,
        params: &FlowParams,
    ) -> Option<(Vector2d, f64)> {
        let levels = params
            .level_count
            .min(pyramid_frame0.level_count() - 1)
            .min(pyramid_frame1.level_count() - 1);
        let term2 = params.term.epsilon.powi(2);
        let r = params.half_window;

        // initial guess
        let mut g = point1_in
            .map(|p| p - point0)
            .unwrap_or(Vector2d::zeros())
            / u32::pow(2, levels as u32) as f64;
        let mut d = Vector2d::zeros();
        let mut finest_range = [[0, 0], [0, 0]];
        for level in (0..levels + 1).rev() {
            let level0 = pyramid_frame0.get_image_at_level(level);
            let level1 = pyramid_frame1.get_image_at_level(level);
            let u = point0 / u32::pow(2, level as u32) as f64;
            let range = integration_range(level0, u, r, 1)?;
            // compute the derivative
            scharr(level0, u, range, &mut self.ix, &mut self.iy, &mut self.grid);
            let gradient = spatial_gradient(&self.ix, &self.iy);
            let min_eig = gradient.symmetric_eigenvalues().min() / self.ix.len() as f64;
            if min_eig < MIN_EIGENVALUE {
                return None;
            }
            let mut nu = Vector2d::zeros();
            for _ in 0..params.term.max_iterations {
                image_difference(range, r, &self.grid, &mut self.it, level1, u + g + nu)?;
                let eta = flow_vector(&gradient, &self.ix, &self.iy, &self.it)?;
                nu += eta;
                if eta.norm_squared() < term2 {
                    break;
                }
            }

            d = nu;
            if level > 0 {
                g = 2. * (g + d)
            }
            finest_range = range;
        }

        let point1 = point0 + g + d;
        image_difference(
            finest_range,
            r,
            &self.grid,
            &mut self.it,
            pyramid_frame1.get_image_at_level(0),
            point1,
        )?;
        let error = self.it.iter().map(|v| v.abs()).sum::<f64>() / self.it.len() as f64;
        Some((point1, error))
    }
}

fn flow_vector(gradient: &Matrix2d, ix: &Matrixd, iy: &Matrixd, it: &Matrixd) -> Option<Vector2d> {
    let mut b = Vector2d::zeros();

    for y in 0..iy.nrows() {
        for x in 0..ix.ncols() {
            b[0] += it[(y, x)] * ix[(y, x)];
            b[1] += it[(y, x)] * iy[(y, x)];
        }
    }

    gradient.try_inverse().map(|inv_g| inv_g * b)
}

/// Fill `it` with the reference window minus the target window around `center`.
/// Fails if the target window is clipped differently than the reference one.
fn image_difference(
    prev_range: Range,
    r: usize,
    i0: &Matrixd,
    it: &mut Matrixd,
    level: &Image,
    center: Vector2d,
) -> Option<()> {
    let range = integration_range(level, center, r, 0)?;
    if range != prev_range {
        return None;
    }
    fill_grid(level, range, center, it);
    *it *= -1.;
    *it += i0.view((1, 1), (it.nrows(), it.ncols()));
    Some(())
}

fn spatial_gradient(ix: &Matrixd, iy: &Matrixd) -> Matrix2d {
    let mut x2 = 0.;
    let mut y2 = 0.;
    let mut xy = 0.;

    for y in 0..iy.nrows() {
        for x in 0..ix.ncols() {
            x2 += ix[(y, x)] * ix[(y, x)];
            y2 += iy[(y, x)] * iy[(y, x)];
            xy += ix[(y, x)] * iy[(y, x)];
        }
    }

    Matrix2d::new(x2, xy, xy, y2)
}

/// ref https://theailearner.com/tag/scharr-operator/
fn scharr(
    level: &Image,
    center: Vector2d,
    range: Range,
    out_x: &mut Matrixd,
    out_y: &mut Matrixd,
    grid: &mut Matrixd,
) {
    let grange = [
        [range[0][0] - 1, range[0][1] + 1],
        [range[1][0] - 1, range[1][1] + 1],
    ];
    fill_grid(level, grange, center, grid);

    *out_x = Matrixd::zeros(grid.nrows() - 2, grid.ncols() - 2);
    *out_y = Matrixd::zeros(grid.nrows() - 2, grid.ncols() - 2);
    for y in 1..(grid.nrows() - 1) {
        for x in 1..(grid.ncols() - 1) {
            out_x[(y - 1, x - 1)] =
                (10. * grid[(y, x + 1)] + 3. * grid[(y + 1, x + 1)] + 3. * grid[(y - 1, x + 1)]
                    - 10. * grid[(y, x - 1)]
                    - 3. * grid[(y + 1, x - 1)]
                    - 3. * grid[(y - 1, x - 1)])
                    / 32.;
            out_y[(y - 1, x - 1)] =
                (10. * grid[(y + 1, x)] + 3. * grid[(y + 1, x + 1)] + 3. * grid[(y + 1, x - 1)]
                    - 10. * grid[(y - 1, x)]
                    - 3. * grid[(y - 1, x + 1)]
                    - 3. * grid[(y - 1, x - 1)])
                    / 32.;
        }
    }
}

fn fill_grid(level: &Image, range: Range, center: Vector2d, grid: &mut Matrixd) {
    *grid = na::DMatrix::zeros(
        (range[1][1] - range[1][0] + 1) as usize,
        (range[0][1] - range[0][0] + 1) as usize,
    );

    for (y_ind, y) in (range[1][0]..=range[1][1]).enumerate() {
        for (x_ind, x) in (range[0][0]..=range[0][1]).enumerate() {
            grid[(y_ind, x_ind)] = bilinear(level, center + Vector2d::new(x as f64, y as f64));
        }
    }
}

/// Returns closed range of integer steps that can be taken without going outside
/// the image borders. Returns None if the center point is outside the level
/// boundaries.
fn integration_range(level: &Image, center: Vector2d, r: usize, padding: i32) -> Option<Range> {
    let r = r as i32;
    let mut range = [[0, 0], [0, 0]];
    for i in 0..2 {
        let s = level.size(i);
        if !(center[i] >= 0. && center[i] <= (s as f64 - 1.)) {
            return None;
        }
        let n = center[i] as i32;
        let fract = if center[i].fract() > 0. { 1 } else { 0 };
        range[i] = [
            i32::max(-r, -n + padding),
            i32::min(r, s as i32 - n - padding - 1 - fract),
        ];
        if range[i][0] > range[i][1] {
            return None;
        }
    }
    Some(range)
}
