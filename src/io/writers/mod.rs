//! Output writers: the virtual (VRT) description of a window, the materialized
//! in-memory copy, and the final encoding into the destination format.
pub mod copy;
pub mod materialize;
pub mod vrt;

pub use copy::{Progress, StagedOutput, create_copy, resolve_output_driver};
pub use materialize::materialize;
pub use vrt::{VirtualDataset, render_vrt};
