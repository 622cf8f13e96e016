use std::process::Command;

// Stamps the binary with the checkout it was built from; falls back to
// "unknown" outside a git tree.
fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=../../.git/HEAD");

    let commit = git_output(&["rev-parse", "--short=10", "HEAD"]);
    let date = git_output(&["show", "-s", "--format=%cs", "HEAD"]);
    println!("cargo:rustc-env=RAVENLINK_BUILD_COMMIT={commit}");
    println!("cargo:rustc-env=RAVENLINK_BUILD_DATE={date}");
}

fn git_output(args: &[&str]) -> String {
    Command::new("git")
        .args(args)
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}
