use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "respiro",
    about = "Mel-spectrogram extraction and analysis for respiratory recordings"
)]
pub struct Cli {
    /// Config file (defaults to ./respiro.toml or ~/.config/respiro/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub features: FeatureArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Overrides for the `[features]` and `[render]` config sections.
#[derive(Args, Debug, Default)]
pub struct FeatureArgs {
    /// Samples per analysis frame
    #[arg(long, global = true)]
    pub frame_length: Option<usize>,

    /// Samples between frame starts
    #[arg(long, global = true)]
    pub hop_length: Option<usize>,

    /// Number of mel bands
    #[arg(long, global = true)]
    pub n_mels: Option<usize>,

    /// Upper filterbank edge in Hz (clamped to Nyquist)
    #[arg(long, global = true)]
    pub f_max: Option<f32>,

    /// Decibel floor below the loudest cell, e.g. -80
    #[arg(long, global = true, allow_hyphen_values = true)]
    pub floor_db: Option<f32>,

    /// Output image width in pixels
    #[arg(long, global = true)]
    pub width: Option<u32>,

    /// Output image height in pixels
    #[arg(long, global = true)]
    pub height: Option<u32>,

    /// Color map (magma, gray)
    #[arg(long, global = true)]
    pub color_map: Option<String>,

    /// One pixel per frame and mel band instead of a fixed size
    #[arg(long, global = true)]
    pub native: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Render one recording to a PNG spectrogram
    Spectrogram {
        /// Input audio file (WAV, MP3, FLAC, OGG)
        input: PathBuf,

        /// Output PNG file
        #[arg(short, long, default_value = "spectrogram.png")]
        output: PathBuf,
    },
    /// Render every audio file in a directory, in parallel
    Batch {
        /// Directory of audio files
        input_dir: PathBuf,

        /// Directory for PNG spectrograms
        #[arg(short, long, default_value = "spectrograms")]
        output_dir: PathBuf,
    },
    /// Extract, classify and store a recording as a patient report
    Analyze {
        /// Input audio file
        input: PathBuf,

        #[arg(long)]
        patient_name: String,

        #[arg(long)]
        patient_age: String,
    },
    /// List the most recent reports
    History {
        /// Maximum number of reports (defaults to storage.history_limit)
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Delete one report
    Delete {
        patient_name: String,
        report_id: String,
    },
}
