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

use std::error::Error;
use std::fs::File;
use std::io::{self, BufReader, BufWriter};

use log::LevelFilter;

use channelizer_config::{
    Agc as AgcConfig, ChannelConfig, Config, DemodMode, Input, InputKind as ConfigInputKind,
    Output, Passband, Pll as PllConfig, SampleFormat,
};
use sdr_channelizer::channel::{AgcParams, ChannelPrototype, Filter, Flags, OutputParams, PllParams};
use sdr_channelizer::front_end::{FrontEnd, InputKind};
use sdr_channelizer::leg::leg_sizes;
use sdr_channelizer::sink::{FrameSink, NullFrameSink, WavFileSink};
use sdr_channelizer::source::{PackedF32Source, PackedI16Source, PackedI8Source, SampleSource};

/// One channel ready to be spawned: the prototype it was built from, its tuning frequency, and
/// its destination
pub struct ChannelSetup {
    pub prototype: ChannelPrototype,
    pub frequency: f64,
    pub destination: Box<dyn FrameSink>,
}

/// Everything [`crate::run`] needs, translated from a [`Config`]
pub struct Setup {
    pub source: Box<dyn SampleSource>,
    pub front_end: FrontEnd,
    pub log_level: LevelFilter,
    pub channels: Vec<ChannelSetup>,
}

impl Setup {
    pub fn from_config(config: &Config) -> Result<Self, Box<dyn Error>> {
        let input_kind = match config.front_end.input.kind() {
            ConfigInputKind::Real => InputKind::Real,
            ConfigInputKind::Complex => InputKind::Complex,
        };
        let front_end = FrontEnd::new(
            config.front_end.sample_rate,
            config.front_end.fft_size as usize,
            config.front_end.overlap,
            input_kind,
        )?;

        let source = source_from_input(&config.front_end.input)?;

        let channels = config
            .channels
            .iter()
            .filter(|c| c.frequency != 0.0)
            .map(|c| ChannelSetup::from_config(c, &front_end))
            .collect::<Result<Vec<ChannelSetup>, Box<dyn Error>>>()?;
        if channels.is_empty() {
            return Err(Box::new(io::Error::new(
                io::ErrorKind::InvalidInput,
                "configuration lists no channel with a nonzero frequency to spawn",
            )));
        }

        Ok(Setup {
            source,
            front_end,
            log_level: config.ui.log_level,
            channels,
        })
    }
}

fn source_from_input(input: &Input) -> Result<Box<dyn SampleSource>, Box<dyn Error>> {
    let kind = match input.kind() {
        ConfigInputKind::Real => InputKind::Real,
        ConfigInputKind::Complex => InputKind::Complex,
    };
    Ok(match input {
        Input::Stdin { format, .. } => {
            let stdin: &'static io::Stdin = Box::leak(Box::new(io::stdin()));
            let lock = stdin.lock();
            match format {
                SampleFormat::I8 => Box::new(PackedI8Source::new(lock, kind)),
                SampleFormat::I16 => Box::new(PackedI16Source::new(lock, kind)),
                SampleFormat::F32 => Box::new(PackedF32Source::new(lock, kind)),
            }
        }
        Input::File { path, format, .. } => {
            let file = BufReader::new(File::open(path)?);
            match format {
                SampleFormat::I8 => Box::new(PackedI8Source::new(file, kind)),
                SampleFormat::I16 => Box::new(PackedI16Source::new(file, kind)),
                SampleFormat::F32 => Box::new(PackedF32Source::new(file, kind)),
            }
        }
    })
}

impl ChannelSetup {
    fn from_config(config: &ChannelConfig, front_end: &FrontEnd) -> Result<Self, Box<dyn Error>> {
        let fs = front_end.sample_rate();
        let bandwidth = (config.passband.high - config.passband.low).abs();
        let fo = select_output_rate(fs, bandwidth.max(config.passband.high.abs()));
        leg_sizes(front_end.n(), front_end.m(), fs, fo)?;

        let filter = filter_for_mode(&config.mode, &config.passband, config.kaiser_beta);
        let flags = flags_for_mode(&config.mode, &config.pll);
        let agc = agc_params(&config.agc, fo, front_end, fs)?;
        let pll = pll_params(&config.pll);
        let channels: u8 = if config.stereo { 2 } else { 1 };
        let output = OutputParams {
            channels,
            fo,
            headroom: 1.0,
            gain: db_to_linear(config.gain_db),
            ssrc: config.ssrc.unwrap_or(0),
        };

        let prototype = ChannelPrototype::new(filter, output, agc, pll, flags);
        let destination = destination_from_output(&config.destination, fo, channels)?;

        Ok(ChannelSetup {
            prototype,
            frequency: config.frequency,
            destination,
        })
    }
}

/// Picks the smallest exact integer divisor of `fs` whose resulting rate still clears twice the
/// channel's passband width
///
/// `spec.md` leaves a channel's output rate unspecified; the config format configures passband
/// width instead and leaves the rate implicit, so it is derived here.
fn select_output_rate(fs: f64, bandwidth: f32) -> f64 {
    let target = (f64::from(bandwidth) * 2.2).max(6_000.0);
    let divisor = (fs / target).floor().max(1.0);
    fs / divisor
}

fn filter_for_mode(mode: &DemodMode, passband: &Passband, beta: f32) -> Filter {
    let (min_if, max_if) = match mode {
        DemodMode::Usb | DemodMode::Cw => (passband.low, passband.high),
        DemodMode::Lsb => (-passband.high, -passband.low),
        DemodMode::Am => (-passband.high, passband.high),
    };
    Filter {
        min_if,
        max_if,
        beta,
        isb: false,
    }
    .normalized()
}

fn flags_for_mode(mode: &DemodMode, pll: &Option<PllConfig>) -> Flags {
    Flags {
        pll: pll.is_some(),
        square: pll.as_ref().map_or(false, |p| p.squaring),
        env: matches!(mode, DemodMode::Am),
        agc: true,
    }
}

fn db_to_linear(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

/// Converts a decibel SNR threshold into the linear `signal/noise - 1` ratio
/// [`sdr_channelizer::demod`] computes, with a fixed 3 dB hysteresis band between lock and
/// unlock thresholds (`spec.md` §9 Open Questions leaves squelch hysteresis unspecified)
fn snr_linear(lock_threshold_db: f32) -> (f32, f32) {
    let open = 10f32.powf(lock_threshold_db / 10.0) - 1.0;
    let close = 10f32.powf((lock_threshold_db - 3.0) / 10.0) - 1.0;
    (open, close.max(0.0))
}

fn pll_params(pll: &Option<PllConfig>) -> PllParams {
    match pll {
        Some(pll) => {
            let (squelch_open, squelch_close) = snr_linear(pll.lock_threshold_db);
            PllParams {
                loop_bandwidth: pll.bandwidth_hz,
                damping: pll.damping,
                lock_time: 0.1,
                squelch_open,
                squelch_close,
            }
        }
        None => PllParams {
            loop_bandwidth: 0.0,
            damping: 0.707,
            lock_time: 0.1,
            squelch_open: 0.0,
            squelch_close: 0.0,
        },
    }
}

fn agc_params(
    agc: &AgcConfig,
    fo: f64,
    front_end: &FrontEnd,
    fs: f64,
) -> Result<AgcParams, Box<dyn Error>> {
    let (no, mo) = leg_sizes(front_end.n(), front_end.m(), fs, fo)?;
    let lo = (no - mo + 1).max(1);
    let block_time_s = lo as f64 / fo;
    let hang_time_blocks = ((agc.hang_time_ms as f64 / 1000.0 / block_time_s).round() as u32).max(1);
    let recovery_rate_per_sample = 10f32.powf(agc.recover_rate_db_s / 20.0 / fo as f32);
    Ok(AgcParams {
        threshold: db_to_linear(agc.threshold_dbfs),
        recovery_rate_per_sample,
        hang_time_blocks,
    })
}

fn destination_from_output(
    output: &Output,
    fo: f64,
    channels: u8,
) -> Result<Box<dyn FrameSink>, Box<dyn Error>> {
    Ok(match output {
        Output::Null => Box::new(NullFrameSink),
        Output::Stdout => Box::new(sdr_channelizer::sink::WriterFrameSink::new(
            BufWriter::new(io::stdout()),
        )),
        Output::File { path } => Box::new(sdr_channelizer::sink::WriterFrameSink::new(
            BufWriter::new(File::create(path)?),
        )),
        Output::WavFile { path } => {
            Box::new(WavFileSink::create(path, fo as u32, channels as u16)?)
        }
    })
}
