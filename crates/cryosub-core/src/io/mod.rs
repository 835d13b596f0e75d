pub mod mrc;
pub mod mrc_writer;
pub mod npy;
pub mod star;
