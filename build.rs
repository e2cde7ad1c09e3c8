//! Build script for generating the `dropship` man pages.
//!
//! Packaging picks the pages up from the build output directory: one page
//! for the top-level command and one `dropship-<subcommand>.1` page per
//! subcommand, rendered with clap-mangen.

use std::env;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Command, CommandFactory};
use clap_mangen::Man;

#[path = "src/cli/mod.rs"]
mod cli;

use cli::Cli;

fn render(command: Command, title: &str, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let mut buffer = Vec::new();
    Man::new(command).title(title).render(&mut buffer)?;
    File::create(path)?.write_all(&buffer)?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut stdout = std::io::stdout();
    writeln!(stdout, "cargo:rerun-if-changed=build.rs")?;
    writeln!(stdout, "cargo:rerun-if-changed=src/cli/mod.rs")?;

    let out_dir =
        PathBuf::from(env::var_os("OUT_DIR").ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "OUT_DIR was not set")
        })?);

    let command = Cli::command();
    for subcommand in command.get_subcommands() {
        let name = format!("dropship-{}", subcommand.get_name());
        render(subcommand.clone(), &name, &out_dir.join(format!("{name}.1")))?;
    }
    render(command, "dropship", &out_dir.join("dropship.1"))?;

    Ok(())
}
