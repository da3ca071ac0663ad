//! Linux capture backend
//!
//! - `X11Sources`: screens from `xrandr`, windows from `wmctrl`
//! - `FfmpegDevices`: x11grab / PulseAudio inputs for the acquired streams
//! - `FfmpegEncoderFactory`: one ffmpeg process per pipeline, WebM on stdout

mod ffmpeg;
mod sources;

pub use ffmpeg::{
    encoder_args, parse_encoders, FfmpegConfig, FfmpegDevices, FfmpegEncoder, FfmpegEncoderFactory,
};
pub use sources::{parse_monitors, parse_windows, SourceTarget, X11Sources};
