use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as AnyhowContext, Result};
use clap::Parser;
use indicatif::ProgressStyle;
use serde::Serialize;
use tracing::{info, info_span};
use tracing_indicatif::span_ext::IndicatifSpanExt;
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use omni_track::camera::CameraKind;
use omni_track::config::TrackerConfig;
use omni_track::frame::FrameStore;
use omni_track::my_types::*;
use omni_track::simulation::{synthetic_camera, SceneConfig, SyntheticScene};
use omni_track::tracker::Tracker;

/// Track landmarks through a synthetic image sequence
#[derive(Parser)]
pub struct Args {
    #[clap(long, default_value = "100")]
    pub frames: usize,
    #[clap(long, default_value = "200")]
    pub landmarks: usize,
    #[clap(long, default_value = "0")]
    pub seed: u64,
    /// Render a second camera and track it as well
    #[clap(long)]
    pub stereo: bool,
    /// Keep frames png compressed while they are not being tracked
    #[clap(long)]
    pub compress: bool,
    #[clap(long, value_enum, default_value = "pinhole")]
    pub camera: CameraKind,
    /// Perturb ground truth landmark positions by up to this many meters
    #[clap(long, default_value = "0.0")]
    pub ground_truth_noise: f64,
    /// Read the tracker parameters from a json file instead of the command line
    #[clap(long)]
    pub config_file: Option<PathBuf>,
    /// Write per frame statistics as json lines
    #[clap(long)]
    pub output: Option<PathBuf>,
    #[clap(flatten)]
    pub config: TrackerConfig,
}

#[derive(Serialize)]
struct FrameStats {
    frame_number: usize,
    frame_id: FrameId,
    template_id: Option<FrameId>,
    tracked: usize,
    mean_error: f64,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // setup logging
    let indicatif_layer = IndicatifLayer::new();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(indicatif_layer.get_stdout_writer()))
        .with(indicatif_layer)
        .with(LevelFilter::INFO)
        .init();

    let config = match &args.config_file {
        Some(path) => TrackerConfig::from_json_file(path)?,
        None => args.config.clone(),
    };
    info!("tracker config {:?}", config);

    let camera = Arc::new(synthetic_camera(args.camera));
    let scene = SyntheticScene::new(
        camera,
        SceneConfig {
            landmark_count: args.landmarks,
            seed: args.seed,
            stereo: args.stereo,
            ground_truth_noise: args.ground_truth_noise,
            ..SceneConfig::default()
        },
    );
    info!("{:?} camera, {:?}", scene.camera().kind, scene.camera().image_shape);

    let mut output = match &args.output {
        Some(path) => Some(BufWriter::new(
            File::create(path).with_context(|| format!("cannot create {}", path.display()))?,
        )),
        None => None,
    };

    let mut frames = FrameStore::new();
    let first = frames.insert(scene.frame(0));
    let mut landmarks = scene.landmarks(frames.frame(first)?)?;
    let mut tracker = Tracker::new(&config)?;
    tracker.init(&mut frames, first)?;
    if args.compress {
        frames.frame_mut(first)?.compress_images()?;
    }
    info!("{} landmarks visible in the first frame", landmarks.len());

    let header_span = info_span!("header");
    header_span.pb_set_style(&ProgressStyle::default_bar());
    header_span.pb_set_length(args.frames.saturating_sub(1) as u64);
    let header_span_enter = header_span.enter();

    let mut errors = vec![];
    for frame_number in 1..args.frames {
        let mut frame = scene.frame(frame_number);
        if args.compress {
            frame.compress_images()?;
        }
        let frame_id = frames.insert(frame);
        let tracked = tracker.track(&mut landmarks, &mut frames, frame_id, &mut errors)?;

        // only the previous and the template frame are needed from here on
        let keep = [tracker.prev_id(), tracker.template_id()];
        frames.retain(|id| keep.contains(&Some(id)));

        if let Some(writer) = output.as_mut() {
            let stats = FrameStats {
                frame_number,
                frame_id,
                template_id: tracker.template_id(),
                tracked,
                mean_error: if errors.is_empty() {
                    0.
                } else {
                    errors.iter().sum::<f64>() / errors.len() as f64
                },
            };
            serde_json::to_writer(&mut *writer, &stats)?;
            writeln!(writer)?;
        }
        header_span.pb_inc(1);
    }

    std::mem::drop(header_span_enter);
    std::mem::drop(header_span);

    if let Some(mut writer) = output {
        writer.flush()?;
    }
    let last = tracker.prev_id();
    let alive = landmarks
        .iter()
        .filter(|l| last.map_or(false, |id| l.is_observed_in_frame(id)))
        .count();
    info!(
        "{} of {} landmarks tracked through {} frames",
        alive,
        landmarks.len(),
        args.frames
    );

    Ok(())
}
