use clap::CommandFactory;
use clap_complete::{generate_to, shells::Bash, shells::Fish};
use std::env;
use std::io::Error;
use std::path::Path;

include!("src/args.rs");

fn main() -> Result<(), Error> {
    let mut cmd = Args::command();
    let home_dir = match env::var_os("HOME") {
        None => return Ok(()),
        Some(d) => d,
    };

    // Fish completions, if fish is installed for user.
    let fish_completions_dir = Path::new(&home_dir).join(".config/fish/completions");
    if fish_completions_dir.exists() {
        let path = generate_to(Fish, &mut cmd, "households", fish_completions_dir)?;
        println!("cargo:warning=completion file is generated for fish: {path:?}");
    }

    // Bash completions, if the user keeps a local completion directory.
    let bash_completions_dir = Path::new(&home_dir).join(".local/share/bash-completion/completions");
    if bash_completions_dir.exists() {
        let path = generate_to(Bash, &mut cmd, "households", bash_completions_dir)?;
        println!("cargo:warning=completion file is generated for bash: {path:?}");
    }

    Ok(())
}
