//! Core building blocks: band selection, window resolution, output assembly and
//! retrieval parameters. These are pure computations consumed by the high-level
//! `api` module; all raster I/O lives in `io`.
pub mod assemble;
pub mod params;
pub mod selector;
pub mod window;
