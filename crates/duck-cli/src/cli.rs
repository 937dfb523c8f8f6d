//! Command-line interface for `duck`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Profiling modes accepted by `--profile`.
pub const PROFILE_MODES: &[&str] = &[
    "memory",
    "cpu",
    "trace",
    "goroutine",
    "mutex",
    "thread",
    "block",
    "none",
];

#[derive(Parser, Clone, Debug)]
#[command(name = "duck")]
#[command(version)]
#[command(about = "Resolve package manifests into lockfiles and browser import maps", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Cache location: absolute directory, URL (remote resolver API), or
    /// "none"/"disable"
    #[arg(short = 'c', long, global = true, env = "DUCK_CACHE")]
    pub cache: Option<String>,

    /// Host URL used as the prefix when constructing import-map entries
    #[arg(short = 't', long, global = true)]
    pub to: Option<String>,

    /// Registry manifest URL template with two %s slots, or one of
    /// "npm", "jspm", "skypack"
    #[arg(long, global = true, env = "NPM_PACKAGE_REGISTRAR")]
    pub registrar: Option<String>,

    /// Run with profiling enabled (memory, cpu, trace, goroutine, mutex,
    /// thread, block or none)
    #[arg(long, global = true, default_value = "none")]
    pub profile: String,

    /// Skip TLS certificate verification for registry hosts
    #[arg(long, global = true)]
    pub insecure_registry: bool,

    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Only show errors
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Read a manifest, resolve it, and write the lockfile + import map
    Resolve(ResolveArgs),
    /// Expose resolution over HTTP
    Serve {
        /// Port to listen on
        #[arg(long, default_value_t = 8087)]
        port: u16,
    },
    /// Decode an existing binary lockfile and print it as JSON
    Json {
        /// Lockfile path (defaults to ./package-browser.lock)
        path: Option<PathBuf>,
    },
}

#[derive(Args, Clone, Debug)]
pub struct ResolveArgs {
    /// Path to the root manifest
    #[arg(short = 'p', long, default_value = "./package.json")]
    pub package: PathBuf,

    /// Run the installer alongside resolution
    #[arg(short = 'i', long)]
    pub install: bool,

    /// Before install, remove the target node-modules tree
    #[arg(long)]
    pub nuke: bool,

    /// Force re-resolution even when a valid lockfile exists
    #[arg(short = 'r', long)]
    pub resolve: bool,

    /// Also emit a JSON dump of the lockfile beside the binary file
    #[arg(short = 'j', long)]
    pub json: bool,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn resolve_flags_parse() {
        let cli = Cli::try_parse_from([
            "duck", "resolve", "-p", "./pkg/package.json", "-i", "--nuke", "-j", "-r",
        ])
        .unwrap();
        let Commands::Resolve(args) = cli.command else {
            panic!("expected resolve");
        };
        assert_eq!(args.package, PathBuf::from("./pkg/package.json"));
        assert!(args.install && args.nuke && args.json && args.resolve);
    }

    #[test]
    fn global_flags_parse_anywhere() {
        let cli = Cli::try_parse_from([
            "duck",
            "resolve",
            "--cache",
            "none",
            "--registrar",
            "jspm",
            "-t",
            "https://host.dev/",
        ])
        .unwrap();
        assert_eq!(cli.cache.as_deref(), Some("none"));
        assert_eq!(cli.registrar.as_deref(), Some("jspm"));
        assert_eq!(cli.to.as_deref(), Some("https://host.dev/"));
    }

    #[test]
    fn serve_port_defaults() {
        let cli = Cli::try_parse_from(["duck", "serve"]).unwrap();
        let Commands::Serve { port } = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(port, 8087);
    }

    #[test]
    fn json_takes_optional_path() {
        let cli = Cli::try_parse_from(["duck", "json", "out.lock"]).unwrap();
        let Commands::Json { path } = cli.command else {
            panic!("expected json");
        };
        assert_eq!(path, Some(PathBuf::from("out.lock")));
    }

    #[test]
    fn profile_defaults_to_none() {
        let cli = Cli::try_parse_from(["duck", "serve"]).unwrap();
        assert_eq!(cli.profile, "none");
    }
}
