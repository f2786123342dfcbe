//! Audio subsystem module

pub mod demux;
pub mod device;
pub mod meter;
pub mod output;
pub mod resample;

pub use demux::{ChannelSelect, FrameDemuxer, MonoBuffer};
pub use meter::LevelMeter;
pub use output::{OutputRoute, PlaybackScheduler};
pub use resample::{PcmConverter, SingleShotConverter};
