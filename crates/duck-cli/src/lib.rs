//! duck CLI: resolve manifests locally, serve resolution over HTTP, and
//! inspect lockfiles.

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::warn;

use duck_core::{CacheMode, ParseOptions, Registrar, ResolverConfig};

pub mod cli;
mod commands;
mod logging;

use cli::{Cli, Commands, PROFILE_MODES};

/// Execute the CLI with the current environment.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::initialize_logging(&cli)?;

    if cli.profile != "none" {
        if !PROFILE_MODES.contains(&cli.profile.as_str()) {
            bail!(
                "invalid profile {:?}; expected one of {}",
                cli.profile,
                PROFILE_MODES.join(", ")
            );
        }
        warn!(
            mode = %cli.profile,
            "profiling support is not compiled into this build"
        );
    }

    let config = build_config(&cli).context("invalid configuration")?;
    match cli.command {
        Commands::Resolve(args) => commands::resolve::run(&args, config).await,
        Commands::Serve { port } => commands::serve::run(port, config).await,
        Commands::Json { path } => commands::json_dump::run(path.as_deref()),
    }
}

fn build_config(cli: &Cli) -> Result<ResolverConfig> {
    let registrar = Registrar::normalize(cli.registrar.as_deref().unwrap_or("npm"))?;
    let cache = match cli.cache.as_deref() {
        Some(input) => CacheMode::classify(input),
        None => CacheMode::Local(CacheMode::default_dir()),
    };
    let mut config = ResolverConfig {
        registrar,
        cache,
        accept_invalid_certs: cli.insecure_registry,
        parse: ParseOptions {
            enable_blacklist: true,
            enable_scripts: true,
            disable_cjs: true,
        },
        ..ResolverConfig::default()
    };
    if let Some(host) = &cli.to {
        config.import_map_host.clone_from(host);
    }
    Ok(config)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn cli_from(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn default_config_uses_npm_and_local_cache() {
        let config = build_config(&cli_from(&["duck", "serve"])).unwrap();
        assert_eq!(config.registrar, Registrar::normalize("npm").unwrap());
        assert!(matches!(config.cache, CacheMode::Local(_)));
        assert!(!config.accept_invalid_certs);
        // The CLI keeps scripts so installs can see postinstall hooks.
        assert!(config.parse.enable_scripts);
    }

    #[test]
    fn cache_none_disables_persistence() {
        let config =
            build_config(&cli_from(&["duck", "serve", "--cache", "none"])).unwrap();
        assert_eq!(config.cache, CacheMode::None);
    }

    #[test]
    fn remote_cache_is_classified() {
        let config = build_config(&cli_from(&[
            "duck",
            "resolve",
            "--cache",
            "https://resolver.example",
        ]))
        .unwrap();
        assert_eq!(
            config.cache,
            CacheMode::Remote("https://resolver.example".into())
        );
    }

    #[test]
    fn bad_registrar_fails_before_resolution() {
        assert!(build_config(&cli_from(&["duck", "serve", "--registrar", "gopher://x"])).is_err());
    }
}
