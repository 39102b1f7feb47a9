/*
 * Copyright 2019 The Regents of the University of California
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
//! This binary reads a wideband I/Q stream, splits it into independently tuned channels with a
//! shared fast-convolution front end, and demodulates each one.
//!

#![warn(
    bad_style,
    const_err,
    dead_code,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    private_in_public,
    unconditional_recursion,
    unused,
    unused_allocation,
    unused_comparisons,
    unused_parens,
    while_true,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    bad_style,
    future_incompatible,
    nonstandard_style,
    rust_2018_compatibility,
    rust_2018_idioms
)]
#![warn(clippy::all)]

mod setup;

use std::error::Error;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::unbounded;
use num_complex::Complex32;
use num_traits::Zero;
use signal_hook::{flag::register, SIGHUP, SIGINT};
use simplelog::{Config as LogConfig, SimpleLogger, TermLogger, TerminalMode};

use sdr_channelizer::coordinator::ChannelCoordinator;
use sdr_channelizer::error::EngineError;
use sdr_channelizer::forward::ForwardStage;
use sdr_channelizer::source::estimate_n0;
use sdr_channelizer::status::{StatusEvent, StatusKind};

use self::setup::Setup;

fn run() -> Result<(), Box<dyn Error>> {
    let config = channelizer_config::config_from_command_line()?;

    let log_status =
        TermLogger::init(config.ui.log_level, LogConfig::default(), TerminalMode::Stderr)
            .or_else(|_| SimpleLogger::init(config.ui.log_level, LogConfig::default()));
    if let Err(e) = log_status {
        eprintln!("Failed to set up a logger: {}", e);
    }

    let setup = Setup::from_config(&config)?;

    // Notes about signals on Linux:
    // SIGINT or SIGHUP sets the stop flag to true, but does not interrupt a read call that is
    // already in progress; the block-clock loop below only checks the flag between blocks.
    let stop_flag = Arc::new(AtomicBool::new(false));
    register(SIGINT, Arc::clone(&stop_flag))?;
    register(SIGHUP, Arc::clone(&stop_flag))?;

    let forward = Arc::new(ForwardStage::new(setup.front_end));
    let mut source = setup.source;

    let outcome = crossbeam::thread::scope(|scope| -> Result<(), Box<dyn Error>> {
        let mut coordinator = ChannelCoordinator::new(Arc::clone(&forward));
        let (status_tx, status_rx) = unbounded::<StatusEvent>();

        scope.spawn(move |_| {
            for event in status_rx.iter() {
                event.log();
            }
        });

        for channel in setup.channels {
            coordinator.spawn_channel(
                scope,
                &channel.prototype,
                channel.frequency,
                channel.destination,
                status_tx.clone(),
            )?;
        }

        let l = forward.front_end().l();
        let mut buf = vec![Complex32::zero(); l];
        while !stop_flag.load(Ordering::Relaxed) {
            match source.read_block(&mut buf) {
                Ok(()) => {
                    let n0 = estimate_n0(&buf);
                    forward.run_block(&buf, n0)?;
                }
                Err(EngineError::FrontEndStalled) => {
                    let _ = status_tx.send(StatusEvent::new(
                        None,
                        StatusKind::FrontEndStalled,
                        "no samples available from the front end; stopping",
                    ));
                    break;
                }
                Err(e) => return Err(Box::new(e)),
            }
            coordinator.reap_finished();
        }

        coordinator.join_all();
        drop(status_tx);
        Ok(())
    });

    match outcome {
        Ok(inner) => inner,
        Err(_) => Err("a worker thread panicked".into()),
    }
}

fn main() {
    match run() {
        Ok(()) => {}
        Err(e) => {
            eprintln!("{}", e);
            process::exit(-1);
        }
    }
}
