//! The `json` subcommand: decode a binary lockfile and print it as JSON.

use std::path::Path;

use anyhow::{Context, Result};

use duck_core::{Lockfile, config};

pub fn run(path: Option<&Path>) -> Result<()> {
    let default = config::LOCKFILE_NAME;
    let path = path.unwrap_or_else(|| Path::new(default));
    let lockfile = Lockfile::load(path)
        .with_context(|| format!("reading lockfile {}", path.display()))?;
    println!("{}", serde_json::to_string_pretty(&lockfile)?);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn dumps_an_existing_lockfile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("package-browser.lock");
        let lockfile = Lockfile {
            hash: 7,
            ..Lockfile::default()
        };
        lockfile.store(&path).unwrap();
        run(Some(&path)).unwrap();
    }

    #[test]
    fn missing_lockfile_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(run(Some(&dir.path().join("nope.lock"))).is_err());
    }
}
