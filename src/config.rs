use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};

use crate::optical_flow::TermCriteria;

/// Tracker parameters, fixed once the tracker is built
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[derive(clap::Parser)]
#[serde(default)]
pub struct TrackerConfig {
    /// Integration window half extent at full resolution, in pixels.
    /// The window is `2 * window_half_size + 1` pixels wide.
    #[clap(long, default_value = "32")]
    pub window_half_size: usize,

    /// Number of downscaled pyramid levels
    #[clap(long, default_value = "3")]
    pub num_scales: usize,

    /// Largest accepted optical flow residual
    #[clap(long, default_value = "20.0")]
    pub err_thresh: f64,

    /// Reject a track whose ground truth pixel error grew by more than this; 0 disables
    #[clap(long, default_value = "0.0")]
    pub delta_pix_err_thresh: f64,

    /// Refresh the template frame every this many tracked frames
    #[clap(long, default_value = "1")]
    pub template_update_rate: usize,

    #[clap(long, default_value = "30")]
    pub term_count: usize,

    #[clap(long, default_value = "0.01")]
    pub term_eps: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            window_half_size: 32,
            num_scales: 3,
            err_thresh: 20.,
            delta_pix_err_thresh: 0.,
            template_update_rate: 1,
            term_count: 30,
            term_eps: 0.01,
        }
    }
}

impl TrackerConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
        let config = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("invalid tracker config in {}", path.display()))?;
        Ok(config)
    }

    pub fn term_criteria(&self) -> TermCriteria {
        TermCriteria {
            max_iterations: self.term_count,
            epsilon: self.term_eps,
        }
    }

    /// Window half extent used on every pyramid level
    pub fn level_half_window(&self) -> usize {
        usize::max(1, self.window_half_size >> self.num_scales.min(usize::BITS as usize - 1))
    }
}
