//! Media reconciliation: pure audio track operations, the reassembly
//! algorithm, and the video container boundary.

pub mod reassembly;
pub mod track;
pub mod video;

pub use reassembly::{align_to_video, build_dubbed_track};
pub use track::AudioTrack;
pub use video::{FfmpegVideoProcessor, MockVideoProcessor, SplitMedia, VideoProcessor};
