use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{ArgAction, CommandFactory, ErrorKind, Parser, Subcommand};

use introseek::audio::{self, FingerprintConfig, Segment};
use introseek::util;

#[derive(clap::Args, Debug)]
struct ClipArgs {
    #[clap(
        long,
        default_value_t = 0.0,
        value_parser = clap::value_parser!(f32),
        help = "Position (in seconds) at which the clip starts in the given file."
    )]
    start: f32,

    #[clap(
        long,
        value_parser = clap::value_parser!(f32),
        help = "Duration (in seconds) of the clip. By default, the clip runs until the end of the file."
    )]
    duration: Option<f32>,

    #[clap(
        long,
        default_value_t = audio::DEFAULT_WINDOW_SIZE,
        value_parser = clap::value_parser!(usize),
        help = "Number of samples in each analysis window. Windows do not overlap, so this also sets the time resolution of a match."
    )]
    window_size: usize,

    #[clap(
        long,
        default_value_t = audio::DEFAULT_TOP_K,
        value_parser = clap::value_parser!(usize),
        help = "Number of loudest frequencies kept for each window. Cannot exceed window_size / 2 + 1."
    )]
    top_k: usize,
}

impl ClipArgs {
    fn config(&self) -> FingerprintConfig {
        FingerprintConfig::new(self.window_size, self.top_k)
    }

    fn fingerprint(&self, path: &Path) -> introseek::Result<audio::Fingerprint> {
        let source = audio::open_file(path, audio::DEFAULT_SAMPLE_RATE)?;
        let clip = Segment::from_time(
            source,
            Duration::from_secs_f32(self.start),
            self.duration.map(Duration::from_secs_f32),
        )?;
        audio::build_fingerprint(clip, &self.config())
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[clap(after_help = "Displays info about introseek and its dependencies.")]
    Info,

    #[clap(
        arg_required_else_help = true,
        after_help = "Build the fingerprint of an audio clip and print a summary of it. This is useful to check that a clip is long enough and that its windows look distinct."
    )]
    Fingerprint {
        #[clap(
            value_parser = clap::value_parser!(PathBuf),
            help = "Audio file to fingerprint."
        )]
        path: PathBuf,

        #[clap(flatten)]
        clip: ClipArgs,

        #[clap(
            long,
            default_value = "false",
            action(ArgAction::SetTrue),
            help = "Print the frequencies of every window."
        )]
        windows: bool,
    },

    #[clap(
        arg_required_else_help = true,
        after_help = "Search for an intro among a group of audio files. The intro is cut from the reference file using --start and --duration, and is then located in each target by sliding its fingerprint over the fingerprint of the target."
    )]
    Search {
        #[clap(
            value_parser = clap::value_parser!(PathBuf),
            help = "File that contains the intro."
        )]
        reference: PathBuf,

        #[clap(
            required = true,
            multiple_values = true,
            value_parser = clap::value_parser!(PathBuf),
            help = "Audio files or directories to search for the intro in."
        )]
        paths: Vec<PathBuf>,

        #[clap(flatten)]
        clip: ClipArgs,

        #[clap(
            long,
            default_value_t = audio::DEFAULT_SEARCH_PERCENTAGE,
            value_parser = clap::value_parser!(f32),
            help = "Specifies which portion of the start of each target the intro should be in. For example, if set to 0.25, only the first 25% of each target is searched."
        )]
        search_percentage: f32,

        #[clap(
            long,
            default_value_t = audio::DEFAULT_TIME_PADDING,
            value_parser = clap::value_parser!(f32),
            help = "Amount of time (in seconds) to add to the detected intro start time and deduct from the detected intro end time."
        )]
        time_padding: f32,

        #[clap(
            long,
            default_value = "false",
            action(ArgAction::SetTrue),
            help = "Search targets in parallel."
        )]
        threading: bool,

        #[clap(
            long,
            default_value = "false",
            action(ArgAction::SetTrue),
            help = "Ignore match files on disk. These are JSON files that store the result of the search alongside each target. By default, a target with an up-to-date match file is skipped."
        )]
        ignore_match_files: bool,

        #[clap(
            long,
            default_value = "false",
            action(ArgAction::SetTrue),
            help = "Write a match file alongside each target once it has been searched."
        )]
        write_match_files: bool,

        #[clap(
            long,
            default_value = "false",
            action(ArgAction::SetTrue),
            help = "Do not display results of the search in stdout."
        )]
        no_display: bool,
    },
}

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,

    #[clap(
        long,
        global = true,
        default_value = "false",
        action(ArgAction::SetTrue),
        help = "By default, audio files are validated by opening them, which is accurate. Setting this flag will switch to just checking file headers."
    )]
    file_headers_only: bool,

    #[clap(
        short,
        long,
        global = true,
        default_value = "false",
        action(ArgAction::SetTrue),
        help = "Enable debug logging."
    )]
    verbose: bool,
}

impl ClipArgs {
    /// Checks the clip range and the fingerprint parameters.
    fn check(&self) -> Result<(), String> {
        if !self.start.is_finite() || self.start < 0.0 {
            return Err("start must be a finite, non-negative number".to_string());
        }
        if matches!(self.duration, Some(d) if !d.is_finite() || d <= 0.0) {
            return Err("duration must be a finite, positive number".to_string());
        }
        self.config().validate().map_err(|e| e.to_string())
    }
}

/// Checks the options that only apply to `search`.
fn check_search_options(search_percentage: f32, time_padding: f32) -> Result<(), String> {
    // NaN fails both comparisons.
    if !(search_percentage > 0.0 && search_percentage <= 1.0) {
        return Err("search_percentage must be in the range (0.0, 1.0]".to_string());
    }
    if !time_padding.is_finite() || time_padding < 0.0 {
        return Err("time_padding must be a finite, non-negative number".to_string());
    }
    Ok(())
}

impl Cli {
    fn check(&self) -> Result<(), String> {
        match self.command {
            Commands::Info => Ok(()),
            Commands::Fingerprint { ref clip, .. } => clip.check(),
            Commands::Search {
                ref clip,
                search_percentage,
                time_padding,
                ..
            } => clip
                .check()
                .and_then(|_| check_search_options(search_percentage, time_padding)),
        }
    }

    fn validate(&self) {
        if let Err(msg) = self.check() {
            let mut cmd = Cli::command();
            cmd.error(ErrorKind::InvalidValue, msg).exit();
        }
    }

    fn find_audio_files(&self, paths: &[PathBuf]) -> Vec<PathBuf> {
        match util::find_audio_files(paths, !self.file_headers_only) {
            Err(e) => {
                let mut cmd = Cli::command();
                cmd.error(ErrorKind::InvalidValue, e.to_string()).exit();
            }
            Ok(v) => v,
        }
    }
}

fn main() -> introseek::Result<()> {
    let args = Cli::parse();

    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(level)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    args.validate();

    match args.command {
        Commands::Fingerprint {
            ref path,
            ref clip,
            windows,
        } => {
            let fingerprint = clip.fingerprint(path)?;
            println!(
                "{}: {} windows ({}) at {} Hz",
                path.display(),
                fingerprint.len(),
                util::format_time(fingerprint.duration()),
                fingerprint.sample_rate()
            );
            if windows {
                for (i, window) in fingerprint.windows().iter().enumerate() {
                    println!(
                        "{:>6} {} {:?}",
                        i,
                        util::format_time(fingerprint.window_offset(i)),
                        window.frequencies()
                    );
                }
            }
        }
        Commands::Search {
            ref reference,
            ref paths,
            ref clip,
            search_percentage,
            time_padding,
            threading,
            ignore_match_files,
            write_match_files,
            no_display,
        } => {
            let fingerprint = clip.fingerprint(reference)?;
            if fingerprint.is_empty() {
                let mut cmd = Cli::command();
                cmd.error(
                    ErrorKind::InvalidValue,
                    format!(
                        "the intro clip is shorter than a single window ({} samples)",
                        clip.window_size
                    ),
                )
                .exit();
            }
            tracing::info!(
                windows = fingerprint.len(),
                "built intro fingerprint from {}",
                reference.display()
            );

            let targets = args.find_audio_files(paths);
            if targets.is_empty() {
                let mut cmd = Cli::command();
                cmd.error(
                    ErrorKind::InvalidValue,
                    "no valid audio files found in provided paths",
                )
                .exit();
            }

            let searcher = audio::Searcher::from_files(fingerprint, targets)
                .with_config(clip.config())
                .with_search_percentage(search_percentage)
                .with_time_padding(Duration::from_secs_f32(time_padding));
            searcher.run(
                !no_display,
                !ignore_match_files,
                write_match_files,
                threading,
            )?;
        }
        Commands::Info => {
            println!("introseek version: {}", env!("CARGO_PKG_VERSION"));
            #[cfg(feature = "ffmpeg")]
            println!("FFmpeg version: {}", util::ffmpeg_version_string());
        }
    }

    Ok(())
}
