// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright © 2026 Adrian <adrian.eddy at gmail>

use simplelog::{ ColorChoice, CombinedLogger, ConfigBuilder, LevelFilter, SharedLogger, TermLogger, TerminalMode, WriteLogger };

pub fn get_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

fn terminal_mode(stderr_only: bool) -> TerminalMode {
    if stderr_only { TerminalMode::Stderr } else { TerminalMode::Mixed }
}

/// With `stderr_only` all terminal output goes to stderr, leaving stdout to machine readable output.
pub fn init_logging(verbose: bool, log_file: Option<&str>, stderr_only: bool) {
    let level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };
    let config = ConfigBuilder::new()
        .set_target_level(LevelFilter::Error)
        .set_location_level(LevelFilter::Off)
        .build();

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(level, config.clone(), terminal_mode(stderr_only), ColorChoice::Auto)];
    if let Some(path) = log_file {
        match std::fs::File::create(path) {
            Ok(file) => loggers.push(WriteLogger::new(LevelFilter::Debug, config, file)),
            Err(e) => eprintln!("Failed to create log file {}: {}", path, e),
        }
    }
    let _ = CombinedLogger::init(loggers);
    log_panics::init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_matches_manifest() {
        assert_eq!(get_version(), "0.1.0");
    }

    #[test]
    fn json_mode_keeps_logs_off_stdout() {
        assert!(matches!(terminal_mode(true), TerminalMode::Stderr));
        assert!(matches!(terminal_mode(false), TerminalMode::Mixed));
    }
}
