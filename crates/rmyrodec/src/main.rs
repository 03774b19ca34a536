use std::io;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use log::{info, LevelFilter};

use rmyro::{ChannelSource, WeatherReceiverBuilder, ZeroRead};

mod app;
mod cli;

use cli::{Args, CliError};

fn main() {
    match rmyrodec() {
        Ok(()) => {}
        Err(cli_error) => cli_error.exit(),
    }
}

fn rmyrodec() -> Result<(), CliError> {
    // Parse options and start logging
    let args = Args::try_parse()?;
    log_setup(&args);

    // create the decoder
    let mut rx = WeatherReceiverBuilder::new()
        .with_gust_window(Duration::from_millis(args.gust_window_ms))
        .with_gust_min_samples(args.gust_min_samples)
        .with_warmup(
            args.warmup_frames,
            args.warmup_majority,
            args.warmup_rounds,
        )
        .with_redetect_after(args.redetect_after)
        .with_max_frame_len(args.max_frame_len as usize)
        .with_separator(args.separator)
        .with_read_timeout(Duration::from_millis(args.read_timeout_ms))
        .build();

    // processing: decode until end of input, reopening files on failure
    let stats = app::run_with_retry(&args, &mut rx, !args.input_is_stdin(), || {
        file_setup(&args)
    })
    .context("receiver stopped")?;
    info!("decoder statistics: {}", stats);

    Ok(())
}

fn log_setup(args: &Args) {
    if args.quiet {
        // no logging
        return;
    } else if std::env::var_os("RUST_LOG").is_none() {
        // parameter controls
        let log_filter = match args.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            3 | _ => LevelFilter::Trace,
        };

        pretty_env_logger::formatted_builder()
            .filter_module("rmyro", log_filter)
            .filter_module("rmyrodec", log_filter)
            .init();
    } else {
        // environment controls
        pretty_env_logger::init();
    }
}

fn file_setup(args: &Args) -> Result<ChannelSource, anyhow::Error> {
    let (reader, zero_read): (Box<dyn io::Read + Send>, ZeroRead) = if args.input_is_stdin() {
        info!("weather decoder reading standard input");
        (Box::new(io::stdin()), ZeroRead::Closed)
    } else {
        info!("weather decoder reading file: \"{}\"", &args.file);
        let file = std::fs::File::open(&args.file)
            .with_context(|| format!("Unable to open --file \"{}\"", args.file))?;
        let zero_read = zero_read_policy(&file);
        (Box::new(file), zero_read)
    };

    ChannelSource::spawn_with(reader, 64, zero_read).context("Unable to start reader thread")
}

// Regular files end; devices like serial ttys return nothing when quiet
fn zero_read_policy(file: &std::fs::File) -> ZeroRead {
    match file.metadata() {
        Ok(meta) if !meta.file_type().is_file() => ZeroRead::TimedOut,
        _ => ZeroRead::Closed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_read_policy() {
        let file = std::fs::File::open(concat!(env!("CARGO_MANIFEST_DIR"), "/src/main.rs"))
            .expect("no source file");
        assert_eq!(ZeroRead::Closed, zero_read_policy(&file));

        #[cfg(unix)]
        {
            let dev = std::fs::File::open("/dev/null").expect("no /dev/null");
            assert_eq!(ZeroRead::TimedOut, zero_read_policy(&dev));
        }
    }
}
