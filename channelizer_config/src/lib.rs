/*
 * Copyright 2020 The Regents of the University of California
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 *
 */

extern crate clap;
extern crate log;
extern crate serde;
extern crate toml;

mod cli;
mod custom_de;

use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use crate::cli::config_from_command_line;

/// A configuration file for the channelizer engine
#[derive(Debug, Serialize, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
pub struct Config {
    /// Front-end (shared fast-convolution engine) settings
    pub front_end: FrontEnd,
    /// Application user interface settings (optional)
    #[serde(default)]
    pub ui: UserInterface,
    /// Channels to demodulate (at least one required)
    ///
    /// An entry whose `frequency` is `0.0` is a template: it is not spawned as a running
    /// channel, but its other fields become the defaults for channels created later at
    /// runtime from the same prototype.
    #[serde(rename = "channel")]
    #[serde(deserialize_with = "crate::custom_de::deserialize_non_empty_vec")]
    pub channels: Vec<ChannelConfig>,
}

/// Settings for the shared fast-convolution front end
#[derive(Debug, Serialize, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
pub struct FrontEnd {
    /// Input sample rate, hertz
    pub sample_rate: f64,
    /// Forward transform size (N), in samples
    pub fft_size: u32,
    /// Overlap-save fraction, in the range `[0, 1)`
    ///
    /// The discarded (history) portion of each forward-transform block is
    /// `fft_size * overlap` samples; the new-sample stride `L` is `fft_size * (1 - overlap)`.
    #[serde(default = "default_overlap")]
    #[serde(deserialize_with = "crate::custom_de::deserialize_0_1")]
    pub overlap: f32,
    /// Where to read input samples from, and in what format
    pub input: Input,
}

fn default_overlap() -> f32 {
    0.5
}

/// Information about where to read input samples, and their on-wire representation
#[derive(Debug, Serialize, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum Input {
    /// Read samples from standard input
    Stdin {
        format: SampleFormat,
        #[serde(default)]
        kind: InputKind,
    },
    /// Read samples from a file (which may be a named pipe)
    File {
        path: PathBuf,
        format: SampleFormat,
        #[serde(default)]
        kind: InputKind,
    },
}

impl Input {
    /// The input sample kind, regardless of which variant this is
    pub fn kind(&self) -> InputKind {
        match self {
            Input::Stdin { kind, .. } | Input::File { kind, .. } => *kind,
        }
    }
}

/// The on-wire representation of one input sample
#[derive(Debug, Serialize, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
#[serde(rename_all = "snake_case")]
pub enum SampleFormat {
    /// Signed 8-bit integer components
    I8,
    /// Signed 16-bit integer components
    I16,
    /// 32-bit floating-point components
    F32,
}

/// Whether input samples are real-valued or complex I/Q pairs
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    Real,
    Complex,
}

impl Default for InputKind {
    fn default() -> Self {
        InputKind::Complex
    }
}

/// A channel to demodulate: tuning, filter, gain and destination settings
#[derive(Debug, Serialize, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
pub struct ChannelConfig {
    /// Demodulation mode
    pub mode: DemodMode,
    /// Tuning frequency, hertz relative to the front end's center frequency
    ///
    /// `0.0` marks this entry as a prototype template rather than a channel to spawn.
    #[serde(default)]
    pub frequency: f64,
    /// Passband edges, hertz relative to `frequency`
    pub passband: Passband,
    /// Kaiser window shape parameter for the channel filter mask
    #[serde(default = "default_kaiser_beta")]
    pub kaiser_beta: f32,
    /// Static gain applied after filtering, decibels
    #[serde(default)]
    pub gain_db: f32,
    /// Output channel count: `false` for mono, `true` for stereo (I/Q or SSB-left/AM-right,
    /// depending on `mode`) per `spec.md` §4.5 Pass D
    #[serde(default)]
    pub stereo: bool,
    /// Automatic gain control settings
    #[serde(default)]
    pub agc: Agc,
    /// Phase-locked loop settings; absent disables carrier tracking
    #[serde(default)]
    pub pll: Option<Pll>,
    /// Where to send demodulated audio
    pub destination: Output,
    /// Synchronization source identifier carried in status events
    #[serde(default)]
    pub ssrc: Option<u32>,
}

fn default_kaiser_beta() -> f32 {
    5.0
}

/// Linear demodulation modes
#[derive(Debug, Serialize, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
#[serde(rename_all = "snake_case")]
pub enum DemodMode {
    /// Upper sideband
    Usb,
    /// Lower sideband
    Lsb,
    /// Double sideband, envelope detected
    Am,
    /// Continuous wave (offset carrier, narrow passband)
    Cw,
}

/// Passband edges relative to a channel's tuning frequency
#[derive(Debug, Serialize, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
pub struct Passband {
    /// Low edge, hertz
    pub low: f32,
    /// High edge, hertz
    pub high: f32,
}

/// Automatic gain control settings
#[derive(Debug, Serialize, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
pub struct Agc {
    /// Target output level, decibels relative to full scale
    #[serde(default = "default_agc_threshold")]
    pub threshold_dbfs: f32,
    /// Gain recovery rate while in the recover state, decibels per second
    #[serde(default = "default_agc_recover_rate")]
    pub recover_rate_db_s: f32,
    /// Time to hold gain after a strong signal disappears, milliseconds
    #[serde(default = "default_agc_hang_time")]
    pub hang_time_ms: u32,
}

impl Default for Agc {
    fn default() -> Self {
        Agc {
            threshold_dbfs: default_agc_threshold(),
            recover_rate_db_s: default_agc_recover_rate(),
            hang_time_ms: default_agc_hang_time(),
        }
    }
}

fn default_agc_threshold() -> f32 {
    -6.0
}

fn default_agc_recover_rate() -> f32 {
    20.0
}

fn default_agc_hang_time() -> u32 {
    500
}

/// Phase-locked loop settings for carrier tracking
#[derive(Debug, Serialize, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
pub struct Pll {
    /// Loop noise bandwidth, hertz
    pub bandwidth_hz: f32,
    /// Damping factor
    #[serde(default = "default_pll_damping")]
    pub damping: f32,
    /// Minimum tracked SNR for the loop to report lock, decibels
    #[serde(default = "default_pll_lock_threshold")]
    pub lock_threshold_db: f32,
    /// Use a squaring phase detector (ambiguous modulo pi) instead of a direct one
    #[serde(default)]
    pub squaring: bool,
}

fn default_pll_damping() -> f32 {
    0.707
}

fn default_pll_lock_threshold() -> f32 {
    6.0
}

/// User interface options
#[derive(Debug, Serialize, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
pub struct UserInterface {
    /// Minimum log level to print
    #[serde(default = "log_level_warn")]
    pub log_level: LevelFilter,
}

impl Default for UserInterface {
    fn default() -> Self {
        UserInterface {
            log_level: log_level_warn(),
        }
    }
}

fn log_level_warn() -> LevelFilter {
    LevelFilter::Warn
}

/// Where a channel's demodulated audio is written
#[derive(Debug, Serialize, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum Output {
    /// Discard the audio
    Null,
    /// Write interleaved `f32` samples to standard output
    Stdout,
    /// Write interleaved `f32` samples to a file
    File { path: PathBuf },
    /// Write a `.wav` file
    WavFile { path: PathBuf },
}
