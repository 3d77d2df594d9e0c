//! Secret reference resolver.
//!
//! The `password` value in `config.toml` can point at a secret stored
//! outside the file instead of carrying it inline:
//!
//! - `pass::path/in/store`: runs `pass show path/in/store`, first line wins
//! - `env::VAR_NAME`: reads `$VAR_NAME` from the environment
//! - anything else: used as-is

/// Resolves a value that may carry a secret reference prefix.
pub fn resolve(value: &str) -> Result<String, String> {
    match value.split_once("::") {
        Some(("pass", path)) => resolve_pass(path),
        Some(("env", var)) => resolve_env(var),
        _ => Ok(value.to_string()),
    }
}

/// Runs `pass show <path>` and returns the first line of stdout.
fn resolve_pass(path: &str) -> Result<String, String> {
    let output = std::process::Command::new("pass")
        .arg("show")
        .arg(path)
        .output()
        .map_err(|e| format!("failed to run `pass show {path}`: {e}"))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!(
            "`pass show {path}` failed (exit {}): {}",
            output.status,
            stderr.trim()
        ));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    stdout
        .lines()
        .next()
        .map(|line| line.to_string())
        .ok_or_else(|| format!("`pass show {path}` produced no output"))
}

fn resolve_env(var: &str) -> Result<String, String> {
    std::env::var(var).map_err(|_| format!("environment variable `{var}` is not set"))
}
