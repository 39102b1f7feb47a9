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

extern crate channelizer_config;
extern crate toml;

use std::path::PathBuf;

use channelizer_config::{
    Agc, ChannelConfig, Config, DemodMode, FrontEnd, Input, InputKind, Output, Passband, Pll,
    SampleFormat, UserInterface,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let test_config_1 = Config {
        front_end: FrontEnd {
            sample_rate: 2_880_000.0,
            fft_size: 4096,
            overlap: 0.5,
            input: Input::Stdin {
                format: SampleFormat::I16,
                kind: InputKind::Complex,
            },
        },
        ui: UserInterface::default(),
        channels: vec![
            ChannelConfig {
                mode: DemodMode::Usb,
                frequency: 146_520_000.0,
                passband: Passband {
                    low: 300.0,
                    high: 2700.0,
                },
                kaiser_beta: 5.0,
                gain_db: 0.0,
                stereo: false,
                agc: Agc::default(),
                pll: None,
                destination: Output::Stdout,
                ssrc: None,
            },
            ChannelConfig {
                mode: DemodMode::Lsb,
                frequency: 7_045_000.0,
                passband: Passband {
                    low: -2700.0,
                    high: -300.0,
                },
                kaiser_beta: 5.0,
                gain_db: 0.0,
                stereo: false,
                agc: Agc::default(),
                pll: None,
                destination: Output::File {
                    path: PathBuf::from("/tmp/file"),
                },
                ssrc: None,
            },
        ],
    };
    println!("{}", toml::to_string(&test_config_1)?);

    let test_config_2 = Config {
        front_end: FrontEnd {
            sample_rate: 1_440_000.0,
            fft_size: 2048,
            overlap: 0.5,
            input: Input::File {
                path: PathBuf::from("/some/absolute/path.iq"),
                format: SampleFormat::F32,
                kind: InputKind::Complex,
            },
        },
        ui: UserInterface::default(),
        channels: vec![
            ChannelConfig {
                mode: DemodMode::Cw,
                frequency: 14_050_000.0,
                passband: Passband {
                    low: -200.0,
                    high: 200.0,
                },
                kaiser_beta: 7.0,
                gain_db: 6.0,
                stereo: false,
                agc: Agc {
                    threshold_dbfs: -10.0,
                    recover_rate_db_s: 15.0,
                    hang_time_ms: 250,
                },
                pll: Some(Pll {
                    bandwidth_hz: 20.0,
                    damping: 0.707,
                    lock_threshold_db: 10.0,
                    squaring: false,
                }),
                destination: Output::WavFile {
                    path: PathBuf::from("/tmp/cw.wav"),
                },
                ssrc: Some(7),
            },
            ChannelConfig {
                mode: DemodMode::Am,
                frequency: 88_500_000.0,
                passband: Passband {
                    low: -5000.0,
                    high: 5000.0,
                },
                kaiser_beta: 5.0,
                gain_db: 0.0,
                stereo: false,
                agc: Agc::default(),
                pll: None,
                destination: Output::Null,
                ssrc: None,
            },
        ],
    };
    println!("{}", toml::to_string(&test_config_2)?);

    Ok(())
}
