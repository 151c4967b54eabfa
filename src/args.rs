use clap::Parser;

#[derive(Parser, Debug)]
#[clap(
    author,
    version,
    about,
    long_about = None,
    name = "households",
)]
pub struct Args {
    /// Path to settings (yaml file).
    #[clap(long)]
    pub settings: String,

    /// Output directory.
    #[clap(long, short, default_value = "output")]
    pub outdir: String,

    /// Path to log file.
    #[clap(long, default_value = "households.log")]
    pub log_file: String,

    /// Increase logging verbosity.
    #[clap(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Number of threads used to assemble the household population.
    #[clap(long)]
    pub threads: Option<usize>,

    /// Disable progress bars.
    #[clap(long, default_value_t = false)]
    pub disable_progress_bar: bool,
}
