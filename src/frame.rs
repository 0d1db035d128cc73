//! Frames and the ordered sources that produce them.

use ndarray::Array2;

use crate::header::Header;

/// One calibrated image with its header.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Identity used to align stars across extractions (usually the file path).
    pub id: String,
    /// Pixel values, `rows × cols`.
    pub data: Array2<f64>,
    pub header: Header,
}

impl Frame {
    pub fn new(id: impl Into<String>, data: Array2<f64>, header: Header) -> Self {
        Self {
            id: id.into(),
            data,
            header,
        }
    }
}

/// An ordered, re-readable sequence of frames.
///
/// Each star is extracted with a separate pass over the source, so frames
/// are loaded on demand and dropped after use.
pub trait FrameSource {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Identity of frame `index` without loading its pixels.
    fn frame_id(&self, index: usize) -> String;

    fn load(&self, index: usize) -> anyhow::Result<Frame>;
}

/// Frames held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFrames {
    frames: Vec<Frame>,
}

impl InMemoryFrames {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self { frames }
    }

    pub fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }
}

impl FromIterator<Frame> for InMemoryFrames {
    fn from_iter<I: IntoIterator<Item = Frame>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl FrameSource for InMemoryFrames {
    fn len(&self) -> usize {
        self.frames.len()
    }

    fn frame_id(&self, index: usize) -> String {
        self.frames
            .get(index)
            .map(|f| f.id.clone())
            .unwrap_or_default()
    }

    fn load(&self, index: usize) -> anyhow::Result<Frame> {
        self.frames
            .get(index)
            .cloned()
            .ok_or_else(|| {
                anyhow::anyhow!("frame index {index} out of range ({})", self.frames.len())
            })
    }
}
