use std::env;
use std::fs;
use std::path::Path;

use clap::CommandFactory;

// cli.rs is written against clap + clap_complete only, so it compiles
// here without the rest of the crate (both are also listed under
// build-dependencies).
#[path = "src/cli.rs"]
mod cli;

fn main() {
    println!("cargo::rerun-if-changed=src/cli.rs");

    let out_dir = env::var_os("OUT_DIR").expect("OUT_DIR not set by Cargo");
    let man_dir = Path::new(&out_dir).join("man");
    fs::create_dir_all(&man_dir).expect("failed to create man output directory");

    write_man_pages(&cli::Cli::command(), None, &man_dir);
}

/// One page per visible command: `groundwork.1`, `groundwork-base.1`,
/// `groundwork-secrets-rekey.1`, and so on down the subcommand tree.
fn write_man_pages(cmd: &clap::Command, prefix: Option<&str>, dir: &Path) {
    let name = match prefix {
        Some(prefix) => format!("{prefix}-{}", cmd.get_name()),
        None => cmd.get_name().to_owned(),
    };

    let mut page = Vec::new();
    let man = clap_mangen::Man::new(cmd.clone().name(name.clone()));
    man.render(&mut page)
        .unwrap_or_else(|e| panic!("failed to render {name}.1: {e}"));
    let path = dir.join(format!("{name}.1"));
    fs::write(&path, page).unwrap_or_else(|e| panic!("failed to write {}: {e}", path.display()));

    for sub in cmd.get_subcommands().filter(|s| !s.is_hide_set()) {
        write_man_pages(sub, Some(&name), dir);
    }
}
