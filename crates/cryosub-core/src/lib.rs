pub mod consts;
pub mod correlation;
pub mod ctf;
pub mod error;
pub mod fourier;
pub mod geometry;
pub mod io;
pub mod metadata;
pub mod particle;
pub mod pipeline;
pub mod subtract;
