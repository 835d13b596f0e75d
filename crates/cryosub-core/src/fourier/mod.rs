pub mod fft;
pub mod grid;
pub mod slice;
pub mod volume;

pub use fft::{irfft2_centered, rfft2_centered, ImageTransform, Spectrum};
pub use grid::FrequencyGrid;
pub use slice::interpolate_slice;
pub use volume::FourierVolume;
