// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright © 2026 Adrian <adrian.eddy at gmail>

pub use flowtrack_core as core;
pub mod util;
pub mod sinks;
mod cli;

fn main() {
    let opts: cli::Opts = argh::from_env();
    if opts.version {
        println!("flowtrack v{}", util::get_version());
        return;
    }

    util::init_logging(opts.verbose, opts.log_file.as_deref(), opts.json);

    if let Err(e) = cli::run(opts) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}
