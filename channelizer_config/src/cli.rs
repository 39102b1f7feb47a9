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

//!
//! Configuration from command-line arguments
//!

use std::error::Error;
use std::ffi::OsStr;
use std::fs;

use clap::{crate_authors, crate_name, crate_version, App, Arg, ArgMatches};

use crate::{
    Agc, ChannelConfig, Config, DemodMode, FrontEnd, Input, InputKind, Output, Passband,
    SampleFormat, UserInterface,
};

const ABOUT: &str = "This program reads a wideband I/Q (or real) stream from a file or standard \
input, channelizes it into one or more independently tuned receivers with a shared fast-\
convolution front end, and demodulates each one. Command-line arguments set up a single USB \
channel reading from a file or standard input; for multiple channels or other modes, a \
configuration file must be used.";

/// Reads command-line options and either reads a configuration from a file or builds a
/// configuration from the command-line options
///
/// This function returns an error if the configuration file could not be read or could not be
/// parsed. It causes the process to exit if a command-line argument is invalid, or if `--help`
/// or `--version` is passed.
pub fn config_from_command_line() -> Result<Config, Box<dyn Error>> {
    let matches = build_app().get_matches();

    if let Some(config_path) = matches.value_of_os("config_file") {
        read_config_file(config_path)
    } else {
        Ok(config_from_matches(&matches))
    }
}

fn build_app() -> App<'static, 'static> {
    App::new(crate_name!())
        .version(crate_version!())
        .about(ABOUT)
        .author(crate_authors!())
        .arg(
            Arg::with_name("config_file")
                .long("config-file")
                .short("c")
                .takes_value(true)
                .value_name("path")
                .help(
                    "The path to a configuration file to read. This can be used to set up \
                    multiple channels and options not available on the command line. If this \
                    option is used, no other command-line arguments are permitted.",
                )
                .conflicts_with_all(&[
                    "source",
                    "destination",
                    "sample_rate",
                    "fft_size",
                    "frequency",
                    "low",
                    "high",
                    "log_level",
                    "sample_format",
                ]),
        )
        .arg(
            Arg::with_name("source")
                .long("source")
                .takes_value(true)
                .value_name("path")
                .help(
                    "A file to read I/Q samples from. If no file is specified, samples are read \
                    from standard input.",
                ),
        )
        .arg(
            Arg::with_name("destination")
                .long("destination")
                .takes_value(true)
                .value_name("path")
                .help(
                    "A file to write demodulated audio to. If no file is specified, audio is \
                    written to standard output.",
                ),
        )
        .arg(
            Arg::with_name("sample_rate")
                .long("sample-rate")
                .takes_value(true)
                .required(true)
                .value_name("hertz")
                .validator(validate::<f64>)
                .help("The input sample rate"),
        )
        .arg(
            Arg::with_name("fft_size")
                .long("fft-size")
                .takes_value(true)
                .default_value("2048")
                .validator(validate::<u32>)
                .help("The shared forward transform size"),
        )
        .arg(
            Arg::with_name("frequency")
                .long("frequency")
                .takes_value(true)
                .default_value("0")
                .value_name("hertz")
                .validator(validate::<f64>)
                .help("The tuning frequency of the one channel to demodulate, relative to the front end's reference"),
        )
        .arg(
            Arg::with_name("low")
                .long("low")
                .takes_value(true)
                .default_value("300")
                .value_name("hertz")
                .validator(validate::<f32>)
                .help("The channel's low passband edge, relative to its tuning frequency"),
        )
        .arg(
            Arg::with_name("high")
                .long("high")
                .takes_value(true)
                .default_value("2700")
                .value_name("hertz")
                .validator(validate::<f32>)
                .help("The channel's high passband edge, relative to its tuning frequency"),
        )
        .arg(
            Arg::with_name("log_level")
                .long("log-level")
                .takes_value(true)
                .default_value("WARN")
                .possible_values(&["OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE"])
                .help("The level of logging to enable"),
        )
        .arg(
            Arg::with_name("sample_format")
                .long("format")
                .takes_value(true)
                .default_value("i16")
                .possible_values(&["i8", "i16", "f32"])
                .help("The on-wire representation of an input sample component"),
        )
        .arg(
            Arg::with_name("stereo")
                .long("stereo")
                .help(
                    "Produce two output channels per block instead of one (I/Q stereo, or \
                    SSB-left/AM-right for envelope-detected modes)",
                ),
        )
}

fn read_config_file(path: &OsStr) -> Result<Config, Box<dyn Error>> {
    let file_bytes = fs::read(path)?;
    let config = toml::from_slice(&file_bytes)?;
    Ok(config)
}

fn config_from_matches(matches: &ArgMatches) -> Config {
    Config {
        front_end: front_end_from_matches(matches),
        ui: ui_from_matches(matches),
        channels: vec![channel_from_matches(matches)],
    }
}

fn front_end_from_matches(matches: &ArgMatches) -> FrontEnd {
    let format = match matches.value_of("sample_format").unwrap() {
        "i8" => SampleFormat::I8,
        "i16" => SampleFormat::I16,
        "f32" => SampleFormat::F32,
        other => unreachable!("Invalid sample format name \"{}\"", other),
    };
    let input = match matches.value_of_os("source") {
        Some(path) => Input::File {
            path: path.into(),
            format,
            kind: InputKind::Complex,
        },
        None => Input::Stdin {
            format,
            kind: InputKind::Complex,
        },
    };
    FrontEnd {
        // This can't panic: the argument is required and validated.
        sample_rate: matches.value_of("sample_rate").unwrap().parse().unwrap(),
        fft_size: matches.value_of("fft_size").unwrap().parse().unwrap(),
        overlap: 0.5,
        input,
    }
}

fn ui_from_matches(matches: &ArgMatches) -> UserInterface {
    UserInterface {
        // This can't panic because the argument is required and has restricted values.
        log_level: matches.value_of("log_level").unwrap().parse().unwrap(),
    }
}

fn channel_from_matches(matches: &ArgMatches) -> ChannelConfig {
    ChannelConfig {
        mode: DemodMode::Usb,
        frequency: matches.value_of("frequency").unwrap().parse().unwrap(),
        passband: Passband {
            low: matches.value_of("low").unwrap().parse().unwrap(),
            high: matches.value_of("high").unwrap().parse().unwrap(),
        },
        kaiser_beta: 5.0,
        gain_db: 0.0,
        stereo: matches.is_present("stereo"),
        agc: Agc::default(),
        pll: None,
        destination: match matches.value_of_os("destination") {
            Some(path) => Output::File { path: path.into() },
            None => Output::Stdout,
        },
        ssrc: None,
    }
}

/// Validates that a string can be parsed into a value of type T
// As required by clap, this function accepts a String.
#[allow(clippy::needless_pass_by_value)]
fn validate<T>(s: String) -> Result<(), String>
where
    T: std::str::FromStr,
    T::Err: ToString,
{
    s.parse::<T>().map(|_| ()).map_err(|e| e.to_string())
}
