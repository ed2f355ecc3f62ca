use crate::{cli::actions::Action, collectors::ScraperConfig};
use anyhow::{Context, Result, anyhow};
use clap::ArgMatches;
use secrecy::SecretString;
use std::path::PathBuf;
use std::time::Duration;

pub fn handler(matches: &ArgMatches) -> Result<Action> {
    let port = matches
        .get_one::<u16>("port")
        .copied()
        .ok_or_else(|| anyhow!("Port is required. Please provide it using the --port flag."))?;

    let listen = matches.get_one::<String>("listen").map(ToString::to_string);

    let dsn = resolve_dsn(matches)?;

    let query_timeout = matches
        .get_one::<u64>("query-timeout")
        .copied()
        .map(Duration::from_secs)
        .ok_or_else(|| anyhow!("Query timeout is required."))?;

    let scrape_interval = matches
        .get_one::<u64>("scrape-interval")
        .copied()
        .map(Duration::from_secs)
        .unwrap_or_default();

    let default_metrics = matches
        .get_one::<String>("default-metrics")
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("A metric definition file is required (--default-metrics)."))?;

    // an empty value (e.g. an unset env var template) means "no custom file"
    let custom_metrics = matches
        .get_one::<String>("custom-metrics")
        .filter(|s| !s.is_empty())
        .map(PathBuf::from);

    let config = ScraperConfig {
        dsn,
        max_open_conns: matches.get_one::<u32>("max-open-conns").copied().unwrap_or(10),
        max_idle_conns: matches.get_one::<u32>("max-idle-conns").copied().unwrap_or(0),
        query_timeout,
        default_metrics,
        custom_metrics,
        scrape_interval,
    };

    Ok(Action::Run {
        port,
        listen,
        config,
    })
}

/// `--dsn-file` wins over `--dsn`; trailing whitespace in the file is
/// stripped so a plain `echo dsn > file` works.
fn resolve_dsn(matches: &ArgMatches) -> Result<SecretString> {
    if let Some(path) = matches
        .get_one::<String>("dsn-file")
        .filter(|s| !s.is_empty())
    {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Unable to read DSN from file: {path}"))?;
        return Ok(SecretString::from(content.trim_end().to_string()));
    }

    matches
        .get_one::<String>("dsn")
        .map(|s| SecretString::from(s.to_string()))
        .ok_or_else(|| anyhow!("DSN is required. Please provide it using the --dsn flag."))
}
