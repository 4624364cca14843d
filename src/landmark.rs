use std::collections::BTreeMap;

use anyhow::{bail, Result};

use crate::my_types::*;

/// Where a landmark was seen in one frame
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Observation {
    pub frame_id: FrameId,
    pub point: Vector2d,
    /// Diameter of the neighbourhood the point was detected with
    pub size: f64,
}

impl Observation {
    pub fn new(frame_id: FrameId, point: Vector2d, size: f64) -> Self {
        Self {
            frame_id,
            point,
            size,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Landmark {
    pub id: LandmarkId,
    observations: BTreeMap<FrameId, Observation>,
    stereo_observations: BTreeMap<FrameId, Observation>,
    /// Position in the world frame, when known
    ground_truth: Option<Vector3d>,
}

impl Landmark {
    pub fn new(id: LandmarkId) -> Self {
        Self {
            id,
            observations: BTreeMap::new(),
            stereo_observations: BTreeMap::new(),
            ground_truth: None,
        }
    }

    pub fn with_ground_truth(mut self, ground_truth: Vector3d) -> Self {
        self.ground_truth = Some(ground_truth);
        self
    }

    pub fn has_ground_truth(&self) -> bool {
        self.ground_truth.is_some()
    }

    pub fn ground_truth(&self) -> Option<&Vector3d> {
        self.ground_truth.as_ref()
    }

    pub fn observation(&self, frame_id: FrameId) -> Option<&Observation> {
        self.observations.get(&frame_id)
    }

    pub fn stereo_observation(&self, frame_id: FrameId) -> Option<&Observation> {
        self.stereo_observations.get(&frame_id)
    }

    pub fn is_observed_in_frame(&self, frame_id: FrameId) -> bool {
        self.observations.contains_key(&frame_id)
    }

    /// Observations ordered by frame id
    pub fn observations(&self) -> impl Iterator<Item = &Observation> {
        self.observations.values()
    }

    pub fn stereo_observations(&self) -> impl Iterator<Item = &Observation> {
        self.stereo_observations.values()
    }

    pub fn add_observation(&mut self, observation: Observation) -> Result<()> {
        insert_unique(&mut self.observations, observation, self.id, "")
    }

    pub fn add_stereo_observation(&mut self, observation: Observation) -> Result<()> {
        insert_unique(&mut self.stereo_observations, observation, self.id, "stereo ")
    }
}

fn insert_unique(
    map: &mut BTreeMap<FrameId, Observation>,
    observation: Observation,
    landmark_id: LandmarkId,
    label: &str,
) -> Result<()> {
    if map.contains_key(&observation.frame_id) {
        bail!(
            "{} already has a {}observation in {}",
            landmark_id,
            label,
            observation.frame_id
        );
    }
    map.insert(observation.frame_id, observation);
    Ok(())
}
