use clap::Parser;
use households::args::Args;
use households::runner::Runner;

fn main() {
    let args = Args::parse();
    let mut runner = Runner::new(args).unwrap_or_else(|err| {
        eprintln!("Unable to set up model: {err:#}");
        std::process::exit(1);
    });
    if let Err(err) = runner.start() {
        eprintln!("Unable to complete run: {err:#}");
        std::process::exit(1);
    }
}
