use std::fmt::Display;

use clap::{error::ErrorKind, value_parser, CommandFactory, Parser};

/// Standard input filename
const STDIN_FILE: &str = "-";

const USAGE_SHORT: &str = r#"
This program reads the ASCII output of an RM Young ResponseOne weather transmitter and prints one line per observation. The transmitter must be in auto-transmit ASCII mode.

See --help for more details.
"#;

const USAGE_LONG: &str = r#"
This program reads the ASCII output of an RM Young ResponseOne weather transmitter and prints one line per observation. The transmitter must be in auto-transmit ASCII mode.

Configure the serial port first, then read it with --file:

    stty -F /dev/ttyUSB0 9600 raw -echo
    rmyrodec --file /dev/ttyUSB0

Or pipe in a capture:

    cat capture.txt | rmyrodec

The first few frames are used to detect whether the rain bucket channel is present. No observations are printed until detection completes.

Each observation is printed with its UTC receive time. Gusts are the peak wind speed over the --gust-window and are marked "(low density)" if too few samples were available.

Serial devices and other special files are read with a timeout. A quiet transmitter never ends the program. If the device fails, it is reopened after --retry-wait seconds, up to --max-tries times.

The program exits with status 0 at the end of input and 1 if the input fails for good or the frame layout cannot be detected.
"#;

const ADVANCED: &str = "Advanced Decoder Options";

/// Top-level program arguments
#[derive(Parser, Clone, Debug)]
#[command(version)]
#[command(about, long_about = None)]
#[command(after_help = USAGE_SHORT, after_long_help = USAGE_LONG)]
#[command(max_term_width = 100)]
pub struct Args {
    /// Verbosity level (-vvv for more)
    #[arg(short, long, default_value_t = 0, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Print NOTHING, not even observations
    #[arg(short, long)]
    pub quiet: bool,

    /// Input file or device (or "-" for stdin)
    ///
    /// Serial devices must be configured beforehand, for example
    /// with stty.
    #[arg(short, long, default_value_t = STDIN_FILE.to_string())]
    pub file: String,

    /// Gust window (milliseconds)
    ///
    /// Gusts are the peak wind speed over this trailing window.
    #[arg(long, default_value_t = 1000)]
    #[arg(value_parser = value_parser!(u64).range(1..))]
    pub gust_window_ms: u64,

    /// Read timeout (milliseconds)
    #[arg(long, default_value_t = 500)]
    #[arg(value_parser = value_parser!(u64).range(1..))]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = ADVANCED)]
    pub read_timeout_ms: u64,

    /// Minimum samples for a full-density gust
    #[arg(long, default_value_t = 2)]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = ADVANCED)]
    pub gust_min_samples: usize,

    /// Frames per warm-up round
    #[arg(long, default_value_t = 10)]
    #[arg(value_parser = value_parser!(u32).range(1..))]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = ADVANCED)]
    pub warmup_frames: u32,

    /// Fraction of warm-up frames req'd to lock (0.51 ≤ F ≤ 1.0)
    #[arg(long, default_value_t = 0.8)]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = ADVANCED)]
    pub warmup_majority: f32,

    /// Warm-up rounds before giving up
    #[arg(long, default_value_t = 3)]
    #[arg(value_parser = value_parser!(u32).range(1..))]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = ADVANCED)]
    pub warmup_rounds: u32,

    /// Consecutive frames of the other layout which restart warm-up
    #[arg(long, default_value_t = 5)]
    #[arg(value_parser = value_parser!(u32).range(1..))]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = ADVANCED)]
    pub redetect_after: u32,

    /// Longest permitted frame (bytes)
    #[arg(long, default_value_t = 256)]
    #[arg(value_parser = value_parser!(u64).range(8..=65536))]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = ADVANCED)]
    pub max_frame_len: u64,

    /// Attempts to read the input before giving up
    ///
    /// When reading fails, --file is reopened after --retry-wait
    /// seconds. Standard input is never reopened. The count of
    /// attempts resets whenever data is received.
    #[arg(long, default_value_t = 5)]
    #[arg(value_parser = value_parser!(u32).range(1..))]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = ADVANCED)]
    pub max_tries: u32,

    /// Wait between attempts (seconds)
    #[arg(long, default_value_t = 10)]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = ADVANCED)]
    pub retry_wait: u64,

    /// Field separator
    #[arg(long, default_value_t = ' ')]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = ADVANCED)]
    pub separator: char,
}

impl Args {
    /// Return true if the user requests input from stdin
    pub fn input_is_stdin(&self) -> bool {
        self.file == STDIN_FILE
    }
}

/// A program-level error with exit code
#[derive(Debug)]
pub struct CliError {
    error: anyhow::Error,
    exit_code: i32,
}

impl CliError {
    /// Create new error with a custom exit code
    pub fn new(error: anyhow::Error, code: i32) -> CliError {
        CliError {
            error,
            exit_code: code,
        }
    }

    /// Print this error to the terminal
    ///
    /// Errors from clap are printed verbatim. Other types of errors
    /// are printed indirectly via clap's fancy formatter.
    pub fn print(&self) -> std::io::Result<()> {
        if let Some(e) = self.error.downcast_ref::<clap::Error>() {
            e.print()
        } else {
            Args::command()
                .error(ErrorKind::Format, self.to_string())
                .print()
        }
    }

    /// Print this error to the terminal and exit
    pub fn exit(&self) -> ! {
        drop(self.print());
        std::process::exit(self.exit_code);
    }
}

impl Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#}", self.error)
    }
}

impl std::error::Error for CliError {}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> CliError {
        CliError::new(err, 1)
    }
}

impl From<clap::Error> for CliError {
    fn from(err: clap::Error) -> CliError {
        let code = if err.use_stderr() { 1 } else { 0 };
        CliError::new(err.into(), code)
    }
}
