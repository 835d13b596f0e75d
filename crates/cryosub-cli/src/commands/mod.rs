pub mod config;
pub mod fourier;
pub mod info;
pub mod run;
