use clap::{Parser, Subcommand};
use std::io;
use std::path::PathBuf;

use twinscope::config::{Settings, VizConfig, DEFAULT_OSC_FREQ_HZ};
use twinscope::decode::decode_wav;
use twinscope::error::VizError;
use twinscope::graph::AudioSource;
use twinscope::host::CpalHost;
use twinscope::render;
use twinscope::session::Session;
use twinscope::terminal::Terminal;
use twinscope::DebugLogger;

#[derive(Parser)]
#[command(name = "twinscope")]
#[command(version = "0.1.0")]
#[command(about = "Live stereo audio visualizer: frequency, waveform, and level panels", long_about = None)]
struct Cli {
    /// FFT window size (power of two); half as many bars are drawn
    #[arg(short = 'f', long)]
    fft_size: Option<usize>,

    /// Gap between bars
    #[arg(short, long)]
    gap: Option<f32>,

    /// Horizontal padding around the bar panels
    #[arg(short, long)]
    padding: Option<f32>,

    /// Seconds per frame
    #[arg(short, long)]
    time: Option<f32>,

    /// Viewport pixel width above which numeric labels are drawn
    #[arg(short = 'W', long)]
    wide_threshold: Option<f32>,

    /// Write diagnostics to the debug log file
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Visualize two test oscillators, one per channel
    Oscillator {
        /// Left channel frequency in Hz
        #[arg(short, long, default_value_t = DEFAULT_OSC_FREQ_HZ)]
        left_freq: f32,

        /// Right channel frequency in Hz
        #[arg(short, long, default_value_t = DEFAULT_OSC_FREQ_HZ)]
        right_freq: f32,
    },

    /// Visualize the default microphone
    Microphone,

    /// Visualize a WAV file, played once
    File {
        /// Path to the WAV file
        path: PathBuf,
    },
}

fn main() -> io::Result<()> {
    let cli = Cli::parse();

    let mut config = VizConfig::default();
    Settings::load().apply(&mut config);
    if let Some(v) = cli.fft_size {
        config.fft_size = v;
    }
    if let Some(v) = cli.gap {
        config.gap = v;
    }
    if let Some(v) = cli.padding {
        config.padding = v;
    }
    if let Some(v) = cli.time {
        config.frame_time = v;
    }
    if let Some(v) = cli.wide_threshold {
        config.wide_threshold = v;
    }
    config.debug = cli.debug;
    config.validate()?;

    // Decode before taking over the terminal so failures print normally.
    let source = match cli.command {
        Commands::Oscillator {
            left_freq,
            right_freq,
        } => AudioSource::Oscillator {
            left_freq_hz: left_freq,
            right_freq_hz: right_freq,
        },
        Commands::Microphone => AudioSource::Microphone,
        Commands::File { path } => AudioSource::FileBuffer(decode_wav(&path)?),
    };

    let mut log = DebugLogger::new(config.debug);
    log.log(format_args!("twinscope starting, fft_size={}", config.fft_size));

    let mut term = Terminal::new(true)?;
    let mut session = Session::new(CpalHost::new(), config.fft_size);

    match session.start_visualization(source, &mut log) {
        Ok(()) => {
            render::run(&mut term, &mut session, &config, &mut log)?;
        }
        Err(err) => {
            display_error_and_wait(&mut term, &err)?;
        }
    }

    session.teardown(&mut log);
    Ok(())
}

/// Show a start-up failure inside the raw-mode screen and wait for a key,
/// so the message is readable before the terminal is restored.
fn display_error_and_wait(term: &mut Terminal, err: &VizError) -> io::Result<()> {
    term.clear_screen()?;
    let (width, height) = term.size();
    let msg = match err {
        VizError::PermissionDenied(_) => format!("{} (microphone access denied)", err),
        _ => err.to_string(),
    };
    let x = (width as i32 - msg.len() as i32) / 2;
    term.set_str(x.max(0), height as i32 / 2, &msg, None);
    term.set_str(
        x.max(0),
        height as i32 / 2 + 2,
        "press any key to exit",
        None,
    );
    term.present()?;

    loop {
        if term.check_key()?.is_some() {
            return Ok(());
        }
        term.sleep(0.05);
    }
}
