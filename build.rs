use std::process::Command;

/// Embeds `MEDIAPROBE_GIT_HASH` and `MEDIAPROBE_BUILD_DATE` for `mediaprobe version`.
///
/// Either value may be supplied through the environment (container builds
/// usually have no `.git` directory); otherwise it is read from `git` and
/// `date`, falling back to "unknown".
fn main() {
    let git_hash = std::env::var("MEDIAPROBE_GIT_HASH")
        .ok()
        .or_else(|| command_output("git", &["rev-parse", "--short", "HEAD"]))
        .unwrap_or_else(|| "unknown".to_string());
    println!("cargo:rustc-env=MEDIAPROBE_GIT_HASH={git_hash}");

    let build_date = std::env::var("MEDIAPROBE_BUILD_DATE")
        .ok()
        .or_else(|| command_output("date", &["-u", "+%Y-%m-%d"]))
        .unwrap_or_else(|| "unknown".to_string());
    println!("cargo:rustc-env=MEDIAPROBE_BUILD_DATE={build_date}");

    println!("cargo:rerun-if-env-changed=MEDIAPROBE_GIT_HASH");
    println!("cargo:rerun-if-env-changed=MEDIAPROBE_BUILD_DATE");
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/");
}

fn command_output(program: &str, args: &[&str]) -> Option<String> {
    Command::new(program)
        .args(args)
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        .filter(|s| !s.is_empty())
}
