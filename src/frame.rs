use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};

use crate::camera::Camera;
use crate::image::Image;
use crate::my_types::*;

static NEXT_FRAME_ID: AtomicUsize = AtomicUsize::new(0);

/// Pixel storage of a frame, either raw or png compressed
#[derive(Clone, Debug)]
enum ImageBuffer {
    Raw(Image),
    Compressed(Vec<u8>),
}

impl ImageBuffer {
    fn compress(&mut self) -> Result<()> {
        if let ImageBuffer::Raw(image) = self {
            *self = ImageBuffer::Compressed(image.to_png()?);
        }
        Ok(())
    }

    fn decompress(&mut self) -> Result<()> {
        if let ImageBuffer::Compressed(bytes) = self {
            *self = ImageBuffer::Raw(Image::from_png(bytes)?);
        }
        Ok(())
    }

    fn raw(&self) -> Option<&Image> {
        match self {
            ImageBuffer::Raw(image) => Some(image),
            ImageBuffer::Compressed(_) => None,
        }
    }
}

/// A captured image (or stereo pair) together with where it was taken from
#[derive(Debug)]
pub struct Frame {
    id: FrameId,
    image: ImageBuffer,
    stereo_image: Option<ImageBuffer>,
    /// Takes a point from the camera frame to the world frame
    pose: Option<Isometry3d>,
    camera: Arc<Camera>,
}

impl Frame {
    /// Ids are unique and increase with every constructed frame
    pub fn new(image: Image, camera: Arc<Camera>) -> Self {
        Self {
            id: FrameId(NEXT_FRAME_ID.fetch_add(1, Ordering::Relaxed)),
            image: ImageBuffer::Raw(image),
            stereo_image: None,
            pose: None,
            camera,
        }
    }

    pub fn with_stereo_image(mut self, stereo_image: Image) -> Self {
        self.stereo_image = Some(ImageBuffer::Raw(stereo_image));
        self
    }

    pub fn with_pose(mut self, world_from_camera: Isometry3d) -> Self {
        self.pose = Some(world_from_camera);
        self
    }

    pub fn id(&self) -> FrameId {
        self.id
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn has_pose(&self) -> bool {
        self.pose.is_some()
    }

    pub fn pose(&self) -> Option<&Isometry3d> {
        self.pose.as_ref()
    }

    /// Takes a point from the world frame to the camera frame
    pub fn inverse_pose(&self) -> Option<Isometry3d> {
        self.pose.map(|pose| pose.inverse())
    }

    pub fn has_stereo_image(&self) -> bool {
        self.stereo_image.is_some()
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self.image, ImageBuffer::Compressed(_))
    }

    /// Primary image. Fails while the frame is compressed.
    pub fn image(&self) -> Result<&Image> {
        self.image
            .raw()
            .ok_or_else(|| anyhow!("{} is compressed, decompress before reading pixels", self.id))
    }

    pub fn stereo_image(&self) -> Result<Option<&Image>> {
        match &self.stereo_image {
            None => Ok(None),
            Some(buffer) => buffer.raw().map(Some).ok_or_else(|| {
                anyhow!("{} is compressed, decompress before reading pixels", self.id)
            }),
        }
    }

    pub fn compress_images(&mut self) -> Result<()> {
        self.image.compress()?;
        if let Some(stereo_image) = &mut self.stereo_image {
            stereo_image.compress()?;
        }
        Ok(())
    }

    pub fn decompress_images(&mut self) -> Result<()> {
        self.image.decompress()?;
        if let Some(stereo_image) = &mut self.stereo_image {
            stereo_image.decompress()?;
        }
        Ok(())
    }
}

/// Caller owned frames, addressed by id
#[derive(Debug, Default)]
pub struct FrameStore {
    frames: BTreeMap<FrameId, Frame>,
}

impl FrameStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, frame: Frame) -> FrameId {
        let id = frame.id();
        self.frames.insert(id, frame);
        id
    }

    pub fn get(&self, id: FrameId) -> Option<&Frame> {
        self.frames.get(&id)
    }

    pub fn frame(&self, id: FrameId) -> Result<&Frame> {
        match self.frames.get(&id) {
            Some(frame) => Ok(frame),
            None => bail!("unknown {}", id),
        }
    }

    pub fn frame_mut(&mut self, id: FrameId) -> Result<&mut Frame> {
        match self.frames.get_mut(&id) {
            Some(frame) => Ok(frame),
            None => bail!("unknown {}", id),
        }
    }

    pub fn remove(&mut self, id: FrameId) -> Option<Frame> {
        self.frames.remove(&id)
    }

    /// Drop every frame whose id fails `keep`
    pub fn retain(&mut self, mut keep: impl FnMut(FrameId) -> bool) {
        self.frames.retain(|id, _| keep(*id));
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
