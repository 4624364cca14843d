use anyhow::{bail, Result};
use log::{debug, trace};
use tracing::instrument;

use crate::camera::transform_point;
use crate::config::TrackerConfig;
use crate::frame::{Frame, FrameStore};
use crate::image::Image;
use crate::landmark::{Landmark, Observation};
use crate::my_types::*;
use crate::optical_flow::{FlowEstimate, FlowParams, OpticalFlow, PyramidalLucasKanade};

/// One landmark to be tracked from the template frame into the current frame
#[derive(Clone, Copy, Debug)]
struct Candidate {
    /// Index into the landmark slice
    landmark: usize,
    /// Observation in the template frame
    seed: Observation,
    /// Position in the previous frame
    guess: Vector2d,
}

/// Keeps 2D correspondences of landmarks alive from frame to frame with
/// optical flow against a periodically refreshed template frame.
///
/// Frames are referred to by id only; the caller owns them in a [`FrameStore`].
/// Use one tracker per camera stream.
#[derive(Debug)]
pub struct Tracker<F: OpticalFlow = PyramidalLucasKanade> {
    flow: F,
    flow_params: FlowParams,
    err_thresh: f64,
    delta_pix_err_thresh: f64,
    template_update_rate: usize,
    /// `track` calls since `init`
    frame_num: usize,
    prev_id: Option<FrameId>,
    template_id: Option<FrameId>,
    template_image: Option<Image>,
    template_stereo_image: Option<Image>,
}

impl Tracker<PyramidalLucasKanade> {
    pub fn new(config: &TrackerConfig) -> Result<Self> {
        Self::with_flow(config, PyramidalLucasKanade::new())
    }
}

impl<F: OpticalFlow> Tracker<F> {
    pub fn with_flow(config: &TrackerConfig, flow: F) -> Result<Self> {
        if config.template_update_rate == 0 {
            bail!("template update rate must be at least 1");
        }
        if config.window_half_size == 0 {
            bail!("window half size must be at least 1");
        }
        Ok(Self {
            flow,
            flow_params: FlowParams {
                level_count: config.num_scales,
                half_window: config.level_half_window(),
                term: config.term_criteria(),
            },
            err_thresh: config.err_thresh,
            delta_pix_err_thresh: config.delta_pix_err_thresh,
            template_update_rate: config.template_update_rate,
            frame_num: 0,
            prev_id: None,
            template_id: None,
            template_image: None,
            template_stereo_image: None,
        })
    }

    pub fn is_ready(&self) -> bool {
        self.template_image.is_some()
    }

    pub fn frame_num(&self) -> usize {
        self.frame_num
    }

    pub fn prev_id(&self) -> Option<FrameId> {
        self.prev_id
    }

    pub fn template_id(&self) -> Option<FrameId> {
        self.template_id
    }

    /// Start over with `frame_id` as both the previous and the template frame
    pub fn init(&mut self, frames: &mut FrameStore, frame_id: FrameId) -> Result<()> {
        let frame = frames.frame_mut(frame_id)?;
        let was_compressed = frame.is_compressed();
        frame.decompress_images()?;

        self.frame_num = 0;
        self.prev_id = Some(frame_id);
        self.template_id = Some(frame_id);
        self.template_image = Some(frame.image()?.clone());
        self.template_stereo_image = frame.stereo_image()?.cloned();

        if was_compressed {
            frame.compress_images()?;
        }
        debug!("tracker initialized on {}", frame_id);
        Ok(())
    }

    /// Track `landmarks` into frame `frame_id`, appending an observation in that
    /// frame to every landmark that was followed successfully.
    ///
    /// Returns the number of new primary observations; `errors` receives their
    /// flow residuals in the same order. Landmarks already observed in the frame
    /// are left alone. Does nothing before [`Tracker::init`].
    #[instrument(skip_all, fields(frame = %frame_id))]
    pub fn track(
        &mut self,
        landmarks: &mut [Landmark],
        frames: &mut FrameStore,
        frame_id: FrameId,
        errors: &mut Vec<f64>,
    ) -> Result<usize> {
        errors.clear();
        let (prev_id, template_id) = match (self.prev_id, self.template_id, self.is_ready()) {
            (Some(prev_id), Some(template_id), true) => (prev_id, template_id),
            _ => {
                debug!("no template yet, ignoring {}", frame_id);
                return Ok(0);
            }
        };

        let frame = frames.frame_mut(frame_id)?;
        let was_compressed = frame.is_compressed();
        frame.decompress_images()?;

        let accepted = self.correspond(landmarks, frames, frame_id, prev_id, template_id, errors);

        // advance and recompress even when correspondence failed
        let frame = frames.frame_mut(frame_id)?;
        let advanced = self.advance(frame);
        if was_compressed {
            frame.compress_images()?;
        }
        advanced?;
        accepted
    }

    fn correspond(
        &mut self,
        landmarks: &mut [Landmark],
        frames: &FrameStore,
        frame_id: FrameId,
        prev_id: FrameId,
        template_id: FrameId,
        errors: &mut Vec<f64>,
    ) -> Result<usize> {
        let current = frames.frame(frame_id)?;
        let current_stereo_image = current.stereo_image()?;
        let use_stereo = current_stereo_image.is_some() && self.template_stereo_image.is_some();

        let mut candidates = vec![];
        let mut stereo_candidates = vec![];
        for (index, landmark) in landmarks.iter().enumerate() {
            if landmark.is_observed_in_frame(frame_id) {
                continue;
            }
            if let (Some(seed), Some(prev)) = (
                landmark.observation(template_id),
                landmark.observation(prev_id),
            ) {
                candidates.push(Candidate {
                    landmark: index,
                    seed: *seed,
                    guess: prev.point,
                });
            }
            if use_stereo && landmark.stereo_observation(frame_id).is_none() {
                if let (Some(seed), Some(prev)) = (
                    landmark.stereo_observation(template_id),
                    landmark.stereo_observation(prev_id),
                ) {
                    stereo_candidates.push(Candidate {
                        landmark: index,
                        seed: *seed,
                        guess: prev.point,
                    });
                }
            }
        }
        if candidates.is_empty() {
            debug!("nothing to track into {}", frame_id);
            return Ok(0);
        }

        // the previous positions only help convergence, the seeds stay the same
        let use_initial_guess = prev_id != template_id;
        let (template_image, current_image) = match &self.template_image {
            Some(image) => (image, current.image()?),
            None => return Ok(0),
        };
        let estimates = flow_candidates(
            &mut self.flow,
            template_image,
            current_image,
            &candidates,
            use_initial_guess,
            &self.flow_params,
        )?;
        let stereo_estimates = match (&self.template_stereo_image, current_stereo_image) {
            (Some(template_stereo_image), Some(current_stereo_image)) if !stereo_candidates.is_empty() => {
                flow_candidates(
                    &mut self.flow,
                    template_stereo_image,
                    current_stereo_image,
                    &stereo_candidates,
                    use_initial_guess,
                    &self.flow_params,
                )?
            }
            _ => vec![],
        };

        let template = frames.get(template_id);
        let mut accepted = 0;
        let mut tracked = vec![false; landmarks.len()];
        for (candidate, estimate) in candidates.iter().zip(&estimates) {
            let landmark = &mut landmarks[candidate.landmark];
            if !self.ground_truth_consistent(landmark, current, template, candidate, estimate) {
                continue;
            }
            if estimate.success && estimate.error <= self.err_thresh {
                landmark.add_observation(Observation::new(
                    frame_id,
                    estimate.point,
                    candidate.seed.size,
                ))?;
                errors.push(estimate.error);
                tracked[candidate.landmark] = true;
                accepted += 1;
            }
        }

        // no stereo-only updates
        for (candidate, estimate) in stereo_candidates.iter().zip(&stereo_estimates) {
            if !tracked[candidate.landmark] {
                continue;
            }
            let landmark = &mut landmarks[candidate.landmark];
            if estimate.success && estimate.error <= self.err_thresh {
                landmark.add_stereo_observation(Observation::new(
                    frame_id,
                    estimate.point,
                    candidate.seed.size,
                ))?;
            }
        }

        debug!(
            "tracked {} of {} candidates ({} stereo) from {} into {}",
            accepted,
            candidates.len(),
            stereo_candidates.len(),
            template_id,
            frame_id
        );
        Ok(accepted)
    }

    /// False when the track drifted away from the ground truth projection by
    /// more than the allowed amount, or the ground truth cannot be projected.
    /// Always true when the filter is disabled or there is nothing to compare with.
    fn ground_truth_consistent(
        &self,
        landmark: &Landmark,
        current: &Frame,
        template: Option<&Frame>,
        candidate: &Candidate,
        estimate: &FlowEstimate,
    ) -> bool {
        if self.delta_pix_err_thresh <= 0. {
            return true;
        }
        let (ground_truth, current_from_world) = match (landmark.ground_truth(), current.inverse_pose()) {
            (Some(ground_truth), Some(current_from_world)) => (ground_truth, current_from_world),
            _ => return true,
        };
        let pixel_gnd = current
            .camera()
            .project_to_image(transform_point(&current_from_world, ground_truth));
        let pixel_gnd_prev = template.and_then(|template| {
            let template_from_world = template.inverse_pose()?;
            template
                .camera()
                .project_to_image(transform_point(&template_from_world, ground_truth))
        });
        let (pixel_gnd, pixel_gnd_prev) = match (pixel_gnd, pixel_gnd_prev) {
            (Some(pixel_gnd), Some(pixel_gnd_prev)) => (pixel_gnd, pixel_gnd_prev),
            _ => {
                trace!("ground truth of {} does not project, excluded", landmark.id);
                return false;
            }
        };
        let cur_error = (estimate.point - pixel_gnd).norm();
        let prev_error = (candidate.seed.point - pixel_gnd_prev).norm();
        if cur_error - prev_error > self.delta_pix_err_thresh {
            trace!(
                "{} drifted from ground truth by {:.2} px, rejected",
                landmark.id,
                cur_error - prev_error
            );
            return false;
        }
        true
    }

    fn advance(&mut self, frame: &Frame) -> Result<()> {
        self.prev_id = Some(frame.id());
        self.frame_num += 1;
        if self.frame_num % self.template_update_rate == 0 {
            self.template_id = Some(frame.id());
            self.template_image = Some(frame.image()?.clone());
            self.template_stereo_image = frame.stereo_image()?.cloned();
            trace!("template is now {}", frame.id());
        }
        Ok(())
    }
}

fn flow_candidates<F: OpticalFlow>(
    flow: &mut F,
    reference: &Image,
    target: &Image,
    candidates: &[Candidate],
    use_initial_guess: bool,
    params: &FlowParams,
) -> Result<Vec<FlowEstimate>> {
    let seeds: Vec<Vector2d> = candidates.iter().map(|c| c.seed.point).collect();
    let guesses: Vec<Vector2d> = if use_initial_guess {
        candidates.iter().map(|c| c.guess).collect()
    } else {
        vec![]
    };
    let estimates = flow.calc(
        reference,
        target,
        &seeds,
        use_initial_guess.then_some(guesses.as_slice()),
        params,
    )?;
    if estimates.len() != candidates.len() {
        bail!(
            "optical flow returned {} estimates for {} points",
            estimates.len(),
            candidates.len()
        );
    }
    Ok(estimates)
}
