//! Image views, buffers and raster operations.
//!
//! `ImageView` is a borrowed 2D view into a 1D buffer with an explicit
//! stride, so ROI slices are zero-copy views into the same backing slice.
//! `GrayBuffer` owns a contiguous grayscale raster. `BgrFrame` is the
//! caller-facing borrowed view over an interleaved BGR capture; it is the
//! only place frame shape validation happens.

use crate::util::{AlignError, AlignResult};

pub mod mask;
pub mod warp;

/// Borrowed 2D image view with an explicit stride.
#[derive(Copy, Clone)]
pub struct ImageView<'a, T> {
    data: &'a [T],
    width: usize,
    height: usize,
    stride: usize,
}

impl<'a, T> ImageView<'a, T> {
    /// Creates a contiguous view with `stride == width`.
    pub fn from_slice(data: &'a [T], width: usize, height: usize) -> AlignResult<Self> {
        Self::new(data, width, height, width)
    }

    /// Creates a view with an explicit stride.
    pub fn new(data: &'a [T], width: usize, height: usize, stride: usize) -> AlignResult<Self> {
        if width == 0 || height == 0 {
            return Err(AlignError::InvalidDimensions { width, height });
        }
        if stride < width {
            return Err(AlignError::InvalidStride { width, stride });
        }
        let needed = (height - 1)
            .checked_mul(stride)
            .and_then(|v| v.checked_add(width))
            .ok_or(AlignError::InvalidDimensions { width, height })?;
        if data.len() < needed {
            return Err(AlignError::BufferTooSmall {
                needed,
                got: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            stride,
        })
    }

    /// Returns the view width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the view height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns the stride in elements between row starts.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Returns the element at `(x, y)` if it is within bounds.
    pub fn get(&self, x: usize, y: usize) -> Option<&'a T> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data.get(y * self.stride + x)
    }

    /// Returns a contiguous slice for row `y` with length `width`.
    pub fn row(&self, y: usize) -> Option<&'a [T]> {
        if y >= self.height {
            return None;
        }
        let start = y * self.stride;
        self.data.get(start..start + self.width)
    }

    /// Returns a zero-copy sub-view; the rectangle must be in bounds.
    pub fn sub_view(
        &self,
        x: usize,
        y: usize,
        width: usize,
        height: usize,
    ) -> AlignResult<ImageView<'a, T>> {
        if width == 0
            || height == 0
            || x.saturating_add(width) > self.width
            || y.saturating_add(height) > self.height
        {
            return Err(AlignError::InvalidDimensions { width, height });
        }
        ImageView::new(&self.data[y * self.stride + x..], width, height, self.stride)
    }
}

/// A clipped region of interest together with its offset in the parent frame.
///
/// Coordinates recovered inside `view` must be shifted by `offset` to land
/// back in parent-frame space.
pub struct ClippedRoi<'a> {
    pub view: ImageView<'a, u8>,
    pub offset: (usize, usize),
}

/// Extracts the ROI of `size` pixels centred on `center`, clipped to the
/// image boundary. Returns `None` when the window lies fully outside.
pub fn clip_roi<'a>(
    image: ImageView<'a, u8>,
    center: (f32, f32),
    size: (f32, f32),
) -> Option<ClippedRoi<'a>> {
    let half_w = size.0.max(1.0) * 0.5;
    let half_h = size.1.max(1.0) * 0.5;
    let x0 = (center.0 - half_w).floor();
    let y0 = (center.1 - half_h).floor();
    let x1 = (center.0 + half_w).ceil();
    let y1 = (center.1 + half_h).ceil();

    if x1 <= 0.0 || y1 <= 0.0 || x0 >= image.width() as f32 || y0 >= image.height() as f32 {
        return None;
    }

    let cx0 = x0.max(0.0) as usize;
    let cy0 = y0.max(0.0) as usize;
    let cx1 = (x1 as usize).min(image.width());
    let cy1 = (y1 as usize).min(image.height());
    if cx1 <= cx0 || cy1 <= cy0 {
        return None;
    }

    let view = image
        .sub_view(cx0, cy0, cx1 - cx0, cy1 - cy0)
        .expect("clipped rectangle is in bounds");
    Some(ClippedRoi {
        view,
        offset: (cx0, cy0),
    })
}

/// Owned contiguous grayscale image buffer.
#[derive(Clone, Debug)]
pub struct GrayBuffer {
    data: Vec<u8>,
    width: usize,
    height: usize,
}

impl GrayBuffer {
    /// Creates a buffer from a contiguous grayscale vector.
    pub fn new(data: Vec<u8>, width: usize, height: usize) -> AlignResult<Self> {
        if width == 0 || height == 0 {
            return Err(AlignError::InvalidDimensions { width, height });
        }
        let needed = width
            .checked_mul(height)
            .ok_or(AlignError::InvalidDimensions { width, height })?;
        if data.len() != needed {
            return Err(AlignError::BufferTooSmall {
                needed,
                got: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Returns the buffer width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the buffer height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns the raw pixel data in row-major order.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns a borrowed view of the whole buffer.
    pub fn view(&self) -> ImageView<'_, u8> {
        ImageView {
            data: &self.data,
            width: self.width,
            height: self.height,
            stride: self.width,
        }
    }
}

/// Borrowed view over an interleaved 8-bit BGR frame.
#[derive(Copy, Clone)]
pub struct BgrFrame<'a> {
    data: &'a [u8],
    width: usize,
    height: usize,
}

impl<'a> BgrFrame<'a> {
    /// Wraps a `height x width x 3` interleaved buffer.
    ///
    /// This is where invalid frames are caught: zero dimensions or a buffer
    /// whose length does not match three channels per pixel.
    pub fn from_slice(data: &'a [u8], width: usize, height: usize) -> AlignResult<Self> {
        if width == 0 || height == 0 {
            return Err(AlignError::InvalidFrame {
                reason: "zero-size frame",
            });
        }
        let needed = width
            .checked_mul(height)
            .and_then(|v| v.checked_mul(3))
            .ok_or(AlignError::InvalidFrame {
                reason: "frame dimensions overflow",
            })?;
        if data.len() != needed {
            return Err(AlignError::InvalidFrame {
                reason: "buffer length does not match width*height*3",
            });
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Returns the frame width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the frame height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Converts to grayscale with integer BT.601 weights.
    pub fn to_gray(&self) -> GrayBuffer {
        let mut out = Vec::with_capacity(self.width * self.height);
        for px in self.data.chunks_exact(3) {
            let b = px[0] as u32;
            let g = px[1] as u32;
            let r = px[2] as u32;
            out.push(((29 * b + 150 * g + 77 * r + 128) >> 8) as u8);
        }
        GrayBuffer::new(out, self.width, self.height).expect("conversion preserves dimensions")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_image(width: usize, height: usize) -> GrayBuffer {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(((x + y * width) & 0xFF) as u8);
            }
        }
        GrayBuffer::new(data, width, height).unwrap()
    }

    #[test]
    fn sub_view_keeps_parent_stride() {
        let img = gradient_image(8, 6);
        let view = img.view().sub_view(2, 1, 4, 3).unwrap();
        assert_eq!(view.stride(), 8);
        assert_eq!(*view.get(0, 0).unwrap(), *img.view().get(2, 1).unwrap());
        assert_eq!(*view.get(3, 2).unwrap(), *img.view().get(5, 3).unwrap());
    }

    #[test]
    fn clip_roi_clips_at_image_corner() {
        let img = gradient_image(20, 20);
        let roi = clip_roi(img.view(), (0.0, 0.0), (10.0, 10.0)).unwrap();
        assert_eq!(roi.offset, (0, 0));
        assert_eq!(roi.view.width(), 5);
        assert_eq!(roi.view.height(), 5);
    }

    #[test]
    fn clip_roi_interior_window_is_unclipped() {
        let img = gradient_image(40, 40);
        let roi = clip_roi(img.view(), (20.0, 20.0), (10.0, 8.0)).unwrap();
        assert_eq!(roi.offset, (15, 16));
        assert_eq!(roi.view.width(), 10);
        assert_eq!(roi.view.height(), 8);
    }

    #[test]
    fn clip_roi_outside_frame_is_none() {
        let img = gradient_image(20, 20);
        assert!(clip_roi(img.view(), (100.0, 100.0), (10.0, 10.0)).is_none());
        assert!(clip_roi(img.view(), (-30.0, 10.0), (10.0, 10.0)).is_none());
    }

    #[test]
    fn bgr_frame_rejects_bad_shapes() {
        assert!(BgrFrame::from_slice(&[], 0, 0).is_err());
        let short = vec![0u8; 10];
        assert!(BgrFrame::from_slice(&short, 2, 2).is_err());
        let ok = vec![0u8; 12];
        assert!(BgrFrame::from_slice(&ok, 2, 2).is_ok());
    }

    #[test]
    fn gray_conversion_weights_green_highest() {
        let data = vec![
            255, 0, 0, // pure blue
            0, 255, 0, // pure green
            0, 0, 255, // pure red
        ];
        let frame = BgrFrame::from_slice(&data, 3, 1).unwrap();
        let gray = frame.to_gray();
        let g = gray.data();
        assert!(g[1] > g[2] && g[2] > g[0]);
    }
}
