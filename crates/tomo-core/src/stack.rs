//! The acquired projection series and the frame-source seam that produces it.

use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Axis};

use crate::error::{Result, TomoError};

/// Ordered stack of projections, laid out `(frame, row, column)`.
///
/// Frame order is acquisition order and therefore encodes the rotation
/// angle progression. The stack is never mutated once built.
#[derive(Debug, Clone)]
pub struct ProjectionStack {
    data: Array3<f32>,
}

impl ProjectionStack {
    /// Wrap an existing `(frame, row, column)` array.
    pub fn new(data: Array3<f32>) -> Result<Self> {
        let (frames, height, width) = data.dim();
        if frames == 0 {
            return Err(TomoError::input("projection stack contains no frames"));
        }
        if height == 0 || width == 0 {
            return Err(TomoError::input(format!(
                "frames have empty geometry {}x{}",
                width, height
            )));
        }
        Ok(Self { data })
    }

    /// Build a stack from individual frames, which must share one shape.
    pub fn from_frames(frames: Vec<Array2<f32>>) -> Result<Self> {
        let first = frames
            .first()
            .ok_or_else(|| TomoError::input("projection stack contains no frames"))?;
        let (height, width) = first.dim();

        for (idx, frame) in frames.iter().enumerate() {
            if frame.dim() != (height, width) {
                return Err(TomoError::input(format!(
                    "frame {} has shape {:?}, expected {:?}",
                    idx,
                    frame.dim(),
                    (height, width)
                )));
            }
        }

        let views: Vec<ArrayView2<'_, f32>> = frames.iter().map(|f| f.view()).collect();
        let data = ndarray::stack(Axis(0), &views)
            .map_err(|e| TomoError::input(e.to_string()))?;
        Self::new(data)
    }

    /// Frame height in pixels.
    pub fn height(&self) -> usize {
        self.data.dim().1
    }

    /// Frame width in pixels.
    pub fn width(&self) -> usize {
        self.data.dim().2
    }

    /// Number of acquired frames.
    pub fn frame_count(&self) -> usize {
        self.data.dim().0
    }

    /// View a single frame.
    pub fn frame(&self, index: usize) -> Result<ArrayView2<'_, f32>> {
        if index >= self.frame_count() {
            return Err(TomoError::bounds(
                format!("frame {}", index),
                format!("{} frames", self.frame_count()),
            ));
        }
        Ok(self.data.index_axis(Axis(0), index))
    }

    /// View the whole stack.
    pub fn view(&self) -> ArrayView3<'_, f32> {
        self.data.view()
    }

    /// Pixel-intensity histogram of one projection over `[min, max]`.
    ///
    /// Useful for checking exposure before calibrating.
    pub fn histogram(&self, index: usize, bins: usize) -> Result<Histogram> {
        let frame = self.frame(index)?;
        Ok(Histogram::from_values(frame.iter().copied(), bins))
    }
}

/// Equal-width histogram of pixel intensities.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    pub counts: Vec<usize>,
    pub min: f32,
    pub max: f32,
}

impl Histogram {
    fn from_values(values: impl Iterator<Item = f32> + Clone, bins: usize) -> Self {
        let bins = bins.max(1);
        let (min, max) = values
            .clone()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });

        let mut counts = vec![0usize; bins];
        let span = max - min;
        for v in values {
            let bin = if span > 0.0 {
                (((v - min) / span) * bins as f32) as usize
            } else {
                0
            };
            // The maximum value belongs to the last bin
            counts[bin.min(bins - 1)] += 1;
        }

        Self { counts, min, max }
    }

    /// Total number of samples counted.
    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }
}

/// Anything that can produce an ordered sequence of equally-sized frames.
///
/// A directory of image files and a live camera are two implementations;
/// the pipeline only ever sees the resulting [`ProjectionStack`].
pub trait FrameSource {
    /// Read every frame, in acquisition order.
    fn load(&mut self) -> Result<ProjectionStack>;
}

/// Frame source over frames already held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    frames: Vec<Array2<f32>>,
}

impl InMemorySource {
    pub fn new(frames: Vec<Array2<f32>>) -> Self {
        Self { frames }
    }
}

impl FrameSource for InMemorySource {
    fn load(&mut self) -> Result<ProjectionStack> {
        ProjectionStack::from_frames(std::mem::take(&mut self.frames))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_frames_geometry() {
        let frames = vec![Array2::<f32>::zeros((4, 6)); 3];
        let stack = ProjectionStack::from_frames(frames).unwrap();

        assert_eq!(stack.height(), 4);
        assert_eq!(stack.width(), 6);
        assert_eq!(stack.frame_count(), 3);
    }

    #[test]
    fn test_from_frames_rejects_mismatch() {
        let frames = vec![Array2::<f32>::zeros((4, 6)), Array2::<f32>::zeros((4, 5))];
        let err = ProjectionStack::from_frames(frames).unwrap_err();
        assert!(matches!(err, TomoError::Input(_)));
    }

    #[test]
    fn test_from_frames_rejects_empty() {
        let err = ProjectionStack::from_frames(Vec::new()).unwrap_err();
        assert!(matches!(err, TomoError::Input(_)));
    }

    #[test]
    fn test_frame_out_of_range() {
        let stack = ProjectionStack::new(Array3::zeros((2, 3, 3))).unwrap();
        assert!(stack.frame(1).is_ok());
        assert!(matches!(stack.frame(2), Err(TomoError::Bounds { .. })));
    }

    #[test]
    fn test_histogram_counts_every_pixel() {
        let frame = Array2::from_shape_fn((10, 10), |(r, c)| (r * 10 + c) as f32);
        let stack = ProjectionStack::from_frames(vec![frame]).unwrap();
        let hist = stack.histogram(0, 255).unwrap();

        assert_eq!(hist.counts.len(), 255);
        assert_eq!(hist.total(), 100);
        assert_eq!(hist.min, 0.0);
        assert_eq!(hist.max, 99.0);
        assert_eq!(hist.counts[254], 1);
    }

    #[test]
    fn test_in_memory_source() {
        let mut source = InMemorySource::new(vec![Array2::<f32>::ones((2, 2)); 4]);
        let stack = source.load().unwrap();
        assert_eq!(stack.frame_count(), 4);
    }
}
