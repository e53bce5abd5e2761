use std::env;
use std::process::Command;

/// Log to cargo's warning output
///
/// Only enabled if environment variable "LOG" is set.
///
/// ```
/// LOG=1 cargo build
/// ```
///
macro_rules! log {
    ($($tokens: tt)*) => {
        env::var("LOG")
            .and_then(|_| Ok(print!("cargo:warning={}\n", format!($($tokens)*))))
            .unwrap_or_default();
    }
}

fn git_hash() -> String {
    let unknown = String::from("unknown");

    // uncommitted, staged changes mean the hash does not describe the build
    let changes = Command::new("git")
        .args(["diff", "--cached", "--exit-code"])
        .status()
        .map_or(true, |status| !status.success());

    if changes {
        return unknown;
    }

    Command::new("git")
        .arg("rev-parse")
        .arg("--verify")
        .arg("HEAD")
        .output()
        .ok()
        .filter(|o| o.status.success())
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map(|hash| hash.trim().to_string())
        .unwrap_or(unknown)
}

fn main() {
    // embed git hash as environment variable GIT_HASH for use in --version
    let hash = git_hash();
    log!("Embedding git hash {hash}");
    println!("cargo:rustc-env=GIT_HASH={hash}");
    println!("cargo:rerun-if-changed=build.rs");
}
