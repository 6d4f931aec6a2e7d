//! Image/video I/O: single-frame PNG/EXR and multi-frame planar YUV
//! 4:2:0.

pub mod image_io;
pub mod yuv;
