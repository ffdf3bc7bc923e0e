//! Command-line interface parsing for carrera
//!
//! Parses the global cache/origin options and the `install`, `fetch` and
//! `list` subcommands, and turns them into a `ProxyConfig`.

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};
use reqwest::{Method, Url};
use thiserror::Error;

use crate::config::ProxyConfig;

/// Error types for CLI argument parsing
#[derive(Debug, Error)]
pub enum CliError {
    /// The method is not a valid HTTP method token
    #[error("Invalid method: '{0}'. Expected an HTTP method such as GET or POST")]
    InvalidMethod(String),

    /// The origin is not an absolute http(s) URL
    #[error("Invalid origin: '{0}'. Expected an absolute http:// or https:// URL")]
    InvalidOrigin(String),
}

/// carrera - offline asset proxy with cache-first request handling
#[derive(Parser, Debug)]
#[command(name = "carrera")]
#[command(about = "Pre-cache a web app's assets and serve requests cache-first")]
#[command(version)]
pub struct Cli {
    /// Origin that asset paths are resolved against
    #[arg(long, value_name = "URL", global = true)]
    pub origin: Option<String>,

    /// Directory holding the cache generations
    #[arg(long, value_name = "DIR", global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Cache generation name
    #[arg(long, value_name = "NAME", global = true)]
    pub cache_name: Option<String>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch every manifest asset and store it in the cache generation
    Install,

    /// Answer one request from the cache, falling back to the network
    ///
    /// Installs first if the cache generation does not hold the manifest yet.
    Fetch {
        /// Path or URL to request
        path: String,

        /// HTTP method of the request
        #[arg(long, default_value = "GET")]
        method: String,

        /// Write the response body here instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// List cache generations and their entries
    List,
}

/// Parses an HTTP method argument, case-insensitively.
///
/// # Returns
/// * `Ok(Method)` if the string is a valid method token
/// * `Err(CliError::InvalidMethod)` otherwise
pub fn parse_method_arg(s: &str) -> Result<Method, CliError> {
    Method::from_bytes(s.to_ascii_uppercase().as_bytes())
        .map_err(|_| CliError::InvalidMethod(s.to_string()))
}

/// Parses an origin argument.
///
/// A trailing slash is added so relative paths resolve beneath the origin's
/// path instead of replacing its last segment.
pub fn parse_origin_arg(s: &str) -> Result<Url, CliError> {
    let mut url = Url::parse(s).map_err(|_| CliError::InvalidOrigin(s.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(CliError::InvalidOrigin(s.to_string()));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

impl Cli {
    /// Builds the proxy configuration from the defaults and the CLI overrides.
    pub fn proxy_config(&self) -> Result<ProxyConfig, CliError> {
        let mut config = ProxyConfig::default();
        if let Some(origin) = &self.origin {
            config = config.with_origin(parse_origin_arg(origin)?);
        }
        if let Some(name) = &self.cache_name {
            config = config.with_cache_name(name.clone());
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_method_arg_is_case_insensitive() {
        assert_eq!(parse_method_arg("get").unwrap(), Method::GET);
        assert_eq!(parse_method_arg("Post").unwrap(), Method::POST);
        assert_eq!(parse_method_arg("HEAD").unwrap(), Method::HEAD);
    }

    #[test]
    fn test_parse_method_arg_invalid() {
        let err = parse_method_arg("BAD METHOD").unwrap_err();
        assert!(err.to_string().contains("Invalid method"));
        assert!(err.to_string().contains("BAD METHOD"));
    }

    #[test]
    fn test_parse_origin_arg_adds_trailing_slash() {
        let url = parse_origin_arg("https://example.org/app").unwrap();
        assert_eq!(url.as_str(), "https://example.org/app/");
        assert_eq!(url.join("index.html").unwrap().as_str(), "https://example.org/app/index.html");
    }

    #[test]
    fn test_parse_origin_arg_rejects_other_schemes() {
        assert!(parse_origin_arg("ftp://example.org/").is_err());
        assert!(parse_origin_arg("not a url").is_err());
    }

    #[test]
    fn test_cli_parse_install() {
        let cli = Cli::parse_from(["carrera", "install"]);
        assert!(matches!(cli.command, Command::Install));
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn test_cli_parse_fetch_defaults() {
        let cli = Cli::parse_from(["carrera", "fetch", "index.html"]);
        match cli.command {
            Command::Fetch {
                path,
                method,
                output,
            } => {
                assert_eq!(path, "index.html");
                assert_eq!(method, "GET");
                assert!(output.is_none());
            }
            other => panic!("Expected fetch, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_parse_global_options_after_subcommand() {
        let cli = Cli::parse_from([
            "carrera",
            "list",
            "--cache-dir",
            "/tmp/carrera",
            "--cache-name",
            "carrera-cache-v2",
            "-vv",
        ]);
        assert_eq!(cli.cache_dir, Some(PathBuf::from("/tmp/carrera")));
        assert_eq!(cli.cache_name.as_deref(), Some("carrera-cache-v2"));
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_proxy_config_from_cli_defaults() {
        let cli = Cli::parse_from(["carrera", "install"]);
        let config = cli.proxy_config().unwrap();
        assert_eq!(config.cache_name, "carrera-cache-v1");
        assert_eq!(config.origin.as_str(), "http://localhost:8080/");
    }

    #[test]
    fn test_proxy_config_from_cli_overrides() {
        let cli = Cli::parse_from([
            "carrera",
            "--origin",
            "https://example.org/",
            "--cache-name",
            "v2",
            "install",
        ]);
        let config = cli.proxy_config().unwrap();
        assert_eq!(config.cache_name, "v2");
        assert_eq!(config.origin.as_str(), "https://example.org/");
    }

    #[test]
    fn test_proxy_config_from_cli_invalid_origin() {
        let cli = Cli::parse_from(["carrera", "--origin", "ftp://example.org", "install"]);
        assert!(matches!(cli.proxy_config(), Err(CliError::InvalidOrigin(_))));
    }
}
