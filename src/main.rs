use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use warden::config::{LoggingConfig, WardenConfig};
use warden::ratelimit::RateLimiter;

/// Replay client identifiers through a rate limiter and print each decision.
///
/// Each input line is one identifier, taken exactly as written apart from the
/// line terminator. Whitespace is significant and an empty line is the empty
/// identifier.
#[derive(Debug, Parser)]
#[command(name = "warden", version, about)]
struct Cli {
    /// Settings file (YAML, TOML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Rules file, overriding `rules_path` from the settings
    #[arg(short, long)]
    rules: Option<PathBuf>,

    /// Read client identifiers from this file instead of stdin
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Print admitted/denied totals after the last request
    #[arg(long)]
    summary: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = WardenConfig::load(cli.config.as_deref()).context("loading settings")?;
    if let Some(rules) = &cli.rules {
        config.rules_path = Some(rules.display().to_string());
    }

    init_tracing(&config.logging);
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let rule_set = config.rule_set().context("loading rules")?;
    let limiter = RateLimiter::from_rules(&rule_set).context("building rate limiter")?;
    if limiter.rule_count() == 0 {
        warn!("No rules configured, every request will be admitted");
    }
    info!(rules = limiter.rule_count(), "Rate limiter initialized");

    let reader: Box<dyn BufRead> = match &cli.input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("opening {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let (admitted, denied) = replay(&limiter, reader, &mut out)?;

    if cli.summary {
        writeln!(out, "admitted={} denied={}", admitted, denied)?;
    }
    out.flush()?;

    info!(
        admitted,
        denied,
        clients = limiter.store().len(),
        "Replay finished"
    );
    Ok(())
}

/// Run every line of `reader` through `limiter`, writing `<id>\t<verdict>`.
///
/// Returns the admitted and denied totals.
fn replay<R: BufRead, W: Write>(
    limiter: &RateLimiter,
    reader: R,
    out: &mut W,
) -> anyhow::Result<(u64, u64)> {
    let (mut admitted, mut denied) = (0u64, 0u64);

    for line in reader.lines() {
        let client_id = line.context("reading client identifiers")?;

        let verdict = if limiter.is_allowed(&client_id) {
            admitted += 1;
            "allow"
        } else {
            denied += 1;
            "deny"
        };
        writeln!(out, "{}\t{}", client_id, verdict)?;
    }

    Ok((admitted, denied))
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    // Decisions go to stdout, so logs go to stderr.
    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .with_writer(io::stderr)
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_replay_keeps_identifiers_exact() {
        let limiter = RateLimiter::daily_quota(1);
        let input = Cursor::new("a\na \n\n\na\n");
        let mut out = Vec::new();

        let (admitted, denied) = replay(&limiter, input, &mut out).unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "a\tallow\na \tallow\n\tallow\n\tdeny\na\tdeny\n"
        );
        assert_eq!((admitted, denied), (3, 2));
        assert!(limiter.store().contains(""));
        assert!(limiter.store().contains("a "));
        assert_eq!(limiter.store().len(), 3);
    }
}
