//! Raw I420 frames exchanged with native shells.
//!
//! Planes are tightly packed: the luma stride is the width, chroma strides
//! are half the width rounded up.

use livekit::webrtc::prelude::{I420Buffer, VideoBuffer};

use crate::errors::ConsultError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct I420Frame {
    pub width: u32,
    pub height: u32,
    pub y: Vec<u8>,
    pub u: Vec<u8>,
    pub v: Vec<u8>,
}

/// Chroma plane dimensions `(width, height)` for a frame of `width`×`height`.
pub fn chroma_size(width: u32, height: u32) -> (usize, usize) {
    (width.div_ceil(2) as usize, height.div_ceil(2) as usize)
}

impl I420Frame {
    /// Check dimensions and plane lengths.
    pub fn validate(&self) -> Result<(), ConsultError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConsultError::InvalidInput(format!(
                "empty frame {}x{}",
                self.width, self.height
            )));
        }
        let luma = self.width as usize * self.height as usize;
        let (cw, ch) = chroma_size(self.width, self.height);
        if self.y.len() != luma || self.u.len() != cw * ch || self.v.len() != cw * ch {
            return Err(ConsultError::InvalidInput(format!(
                "plane sizes {}/{}/{} do not match a {}x{} I420 frame",
                self.y.len(),
                self.u.len(),
                self.v.len(),
                self.width,
                self.height
            )));
        }
        Ok(())
    }

    /// Copy into a WebRTC buffer, honoring its strides.
    pub fn to_buffer(&self) -> Result<I420Buffer, ConsultError> {
        self.validate()?;
        let (cw, ch) = chroma_size(self.width, self.height);
        let mut buffer = I420Buffer::new(self.width, self.height);
        let (sy, su, sv) = buffer.strides();
        let (y_dst, u_dst, v_dst) = buffer.data_mut();
        copy_plane(y_dst, sy as usize, &self.y, self.width as usize, self.height as usize);
        copy_plane(u_dst, su as usize, &self.u, cw, ch);
        copy_plane(v_dst, sv as usize, &self.v, cw, ch);
        Ok(buffer)
    }

    /// Pack a decoded WebRTC buffer for the shell.
    pub fn from_buffer(buffer: &I420Buffer) -> Self {
        let (width, height) = (buffer.width(), buffer.height());
        let (cw, ch) = chroma_size(width, height);
        let (sy, su, sv) = buffer.strides();
        let (y, u, v) = buffer.data();
        Self {
            width,
            height,
            y: pack_plane(y, sy as usize, width as usize, height as usize),
            u: pack_plane(u, su as usize, cw, ch),
            v: pack_plane(v, sv as usize, cw, ch),
        }
    }
}

/// Copy `rows` packed rows of `width` bytes into a strided plane.
fn copy_plane(dst: &mut [u8], dst_stride: usize, src: &[u8], width: usize, rows: usize) {
    for (row, line) in src.chunks_exact(width).take(rows).enumerate() {
        let start = row * dst_stride;
        dst[start..start + width].copy_from_slice(line);
    }
}

/// Drop the stride padding of a plane.
fn pack_plane(src: &[u8], src_stride: usize, width: usize, rows: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(width * rows);
    for row in 0..rows {
        let start = row * src_stride;
        out.extend_from_slice(&src[start..start + width]);
    }
    out
}
