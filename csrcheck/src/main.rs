//! csrcheck: Command-line validator for certificate signing requests.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use csrcheck_lib::{
    HttpFeedSource, PolicyConfig, ReputationError, TcpWhoisClient, Validator, WeakKeyBlacklist,
    WeakKeyVerdict, WhoisLookup, WhoisRecord,
};
use rayon::prelude::*;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Parser)]
#[command(
    name = "csrcheck",
    version,
    about = "Validate certificate signing requests against CA/Browser Forum baseline rules",
    long_about = "csrcheck parses PKCS#10 certificate signing requests in PEM or DER format\n\
                  and runs them through a fixed, ordered list of policy checks: key size,\n\
                  Debian weak keys, subject attributes, Subject Alternative Names, WHOIS\n\
                  registration and remote domain blacklists.\n\n\
                  All commands read from stdin when no file is given.",
    after_help = "EXAMPLES:\n\
                  \n  csrcheck validate request.csr\
                  \n  csrcheck validate --config policy.toml --json request.csr\
                  \n  csrcheck validate --no-whois --no-feeds request.csr\
                  \n  csrcheck inspect request.csr\
                  \n  csrcheck inspect --recurse --failures-only requests/\
                  \n  csrcheck weak-key --blacklist blacklist-rsa-2048.txt request.csr\
                  \n  cat request.csr | csrcheck validate"
)]
struct Cli {
    /// Emit log lines as JSON (filter with RUST_LOG, default: warn)
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full policy (exit 0 = compliant, 1 = not compliant, 2 = unreadable)
    #[command(after_help = "EXIT CODES:\n\
                      \n  0  every check passed (baseline compliant)\
                      \n  1  at least one check failed\
                      \n  2  the request could not be read\
                      \n\nDURATION FORMAT:\n\
                      \n  Plain numbers are treated as seconds. You can also use humantime\
                      \n  notation: 500ms, 15s, 1m, 1m30s.\
                      \n\nEXAMPLES:\n\
                      \n  csrcheck validate request.csr\
                      \n  csrcheck validate --config policy.toml request.csr\
                      \n  csrcheck validate --whois-timeout 5s --feed-timeout 30s request.csr\
                      \n  csrcheck validate --json request.csr")]
    Validate {
        /// Request file (PEM or DER). Reads from stdin if omitted.
        file: Option<PathBuf>,
        /// Policy configuration file (TOML)
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
        /// Output in JSON format
        #[arg(long)]
        json: bool,
        /// Skip WHOIS lookups and treat every domain as registered
        #[arg(long)]
        no_whois: bool,
        /// Skip blacklist feeds and treat the feed list as empty
        #[arg(long)]
        no_feeds: bool,
        /// Timeout for each WHOIS lookup (overrides the configuration)
        #[arg(long, value_name = "DURATION")]
        whois_timeout: Option<String>,
        /// Timeout for each feed download (overrides the configuration)
        #[arg(long, value_name = "DURATION")]
        feed_timeout: Option<String>,
    },
    /// Display request contents offline (subject, key, SAN, domains, hashes)
    #[command(after_help = "EXAMPLES:\n\
                      \n  csrcheck inspect request.csr\
                      \n  csrcheck inspect --json request.der\
                      \n  csrcheck inspect --all request.csr\
                      \n  csrcheck inspect --recurse requests/")]
    Inspect {
        /// Request file or directory. Reads from stdin if omitted.
        file: Option<PathBuf>,
        /// Output in JSON format
        #[arg(long)]
        json: bool,
        /// Show the RSA modulus prefix and its weak-key digest
        #[arg(long)]
        all: bool,
        /// Only print failures (directory mode)
        #[arg(long)]
        failures_only: bool,
        /// Recurse into subdirectories (directory mode)
        #[arg(short, long)]
        recurse: bool,
    },
    /// Check RSA moduli against a Debian weak-key digest file (exit 0 = not listed, 1 = listed)
    #[command(after_help = "The digest file holds one SHA-1 hex digest (or its last 20 hex\n\
                      digits) per line, as distributed by the openssl-blacklist package.\n\
                      \nEXAMPLES:\n\
                      \n  csrcheck weak-key --blacklist blacklist-rsa-2048.txt request.csr\
                      \n  csrcheck weak-key --blacklist blacklist-rsa-2048.txt -r requests/")]
    WeakKey {
        /// Request file or directory. Reads from stdin if omitted.
        file: Option<PathBuf>,
        /// Weak-key digest file
        #[arg(long, value_name = "FILE")]
        blacklist: PathBuf,
        /// Only print failures (directory mode)
        #[arg(long)]
        failures_only: bool,
        /// Recurse into subdirectories (directory mode)
        #[arg(short, long)]
        recurse: bool,
    },
}

/// Maximum file size for request inputs (10 MiB).
const MAX_INPUT_BYTES: u64 = 10 * 1024 * 1024;

fn read_input(file: Option<&PathBuf>) -> Result<Vec<u8>> {
    match file {
        Some(path) => {
            let meta = std::fs::metadata(path)
                .with_context(|| format!("Failed to stat file: {}", path.display()))?;
            if meta.len() > MAX_INPUT_BYTES {
                anyhow::bail!(
                    "File too large ({} bytes, max {} bytes): {}",
                    meta.len(),
                    MAX_INPUT_BYTES,
                    path.display()
                );
            }
            std::fs::read(path).with_context(|| format!("Failed to read file: {}", path.display()))
        }
        None => {
            let mut buf = Vec::new();
            std::io::stdin()
                .take(MAX_INPUT_BYTES)
                .read_to_end(&mut buf)
                .context("Failed to read from stdin")?;
            Ok(buf)
        }
    }
}

/// Parse a duration string using humantime format.
///
/// Plain numbers (e.g. "15") default to seconds. Otherwise, standard
/// humantime units are accepted: `ms`, `s`, `m`, `h`, etc.
fn parse_duration(s: &str) -> Result<Duration> {
    if s.chars().all(|c| c.is_ascii_digit()) {
        let secs: u64 = s.parse().context("Invalid duration value")?;
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(s).with_context(|| format!("Invalid duration: '{s}'"))
}

/// Check if a path has a request file extension (.csr, .req, .pem, .der).
fn is_csr_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some(ext) if ext.eq_ignore_ascii_case("csr") || ext.eq_ignore_ascii_case("req")
            || ext.eq_ignore_ascii_case("pem") || ext.eq_ignore_ascii_case("der")
    )
}

/// Find all request files in a directory, sorted.
fn find_csr_files(dir: &Path, recurse: bool) -> Vec<PathBuf> {
    let walker = if recurse {
        walkdir::WalkDir::new(dir)
    } else {
        walkdir::WalkDir::new(dir).max_depth(1)
    };
    let mut files: Vec<PathBuf> = walker
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_csr_file(e.path()))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

/// A single result from batch processing.
struct BatchResult {
    path: String,
    pass: bool,
    detail: String,
}

/// Process request files in parallel, printing `filename: result`.
///
/// Returns the number of failures.
fn run_batch<F>(files: &[PathBuf], failures_only: bool, op: F) -> usize
where
    F: Fn(&Path) -> BatchResult + Sync,
{
    let results: Vec<BatchResult> = files.par_iter().map(|f| op(f)).collect();

    let mut failures = 0;
    for r in &results {
        if !r.pass {
            failures += 1;
        }
        if failures_only && r.pass {
            continue;
        }
        if r.pass {
            println!("{}: {}", r.path, r.detail);
        } else {
            eprintln!("{}: {}", r.path, r.detail);
        }
    }
    failures
}

/// Read and parse one request for directory mode, or describe why not.
fn load_for_batch(path: &Path) -> std::result::Result<csrcheck_lib::ParsedCsr, String> {
    let data = std::fs::read(path).map_err(|e| format!("FAIL (read error: {})", e))?;
    csrcheck_lib::parse_csr(&data).map_err(|e| format!("FAIL (parse error: {})", e))
}

fn summarize(csr: &csrcheck_lib::ParsedCsr) -> BatchResult {
    let mut problems = Vec::new();
    if let Some(e) = &csr.key_error {
        problems.push(format!("key: {}", e));
    }
    if let Some(e) = &csr.san_error {
        problems.push(format!("SAN: {}", e));
    } else if csr.san.is_empty() {
        problems.push("no SAN entries".to_string());
    }
    let key = csr
        .key
        .as_ref()
        .map(|k| format!("{} {} bit", k.algorithm, k.bit_length))
        .unwrap_or_else(|| "no key".to_string());
    let cn = csr.subject.common_name.as_deref().unwrap_or("-");
    BatchResult {
        path: String::new(),
        pass: problems.is_empty(),
        detail: if problems.is_empty() {
            format!("OK ({}, {}, {} SAN entries)", cn, key, csr.san.len())
        } else {
            format!("FAIL ({})", problems.join("; "))
        },
    }
}

fn weak_key_detail(verdict: WeakKeyVerdict) -> &'static str {
    match verdict {
        WeakKeyVerdict::NotApplicable => "PASS (not an RSA key)",
        WeakKeyVerdict::NotListed => "PASS",
        WeakKeyVerdict::Listed => "FAIL (known weak Debian key)",
        WeakKeyVerdict::BlacklistUnavailable => "PASS (no blacklist)",
    }
}

/// WHOIS adapter selected on the command line.
#[derive(Clone)]
enum CliWhois {
    Tcp(TcpWhoisClient),
    /// `--no-whois`: every domain counts as registered.
    Offline,
}

impl WhoisLookup for CliWhois {
    async fn lookup(&self, domain: &str) -> std::result::Result<WhoisRecord, ReputationError> {
        match self {
            CliWhois::Tcp(client) => client.lookup(domain).await,
            CliWhois::Offline => Ok(WhoisRecord {
                registered: true,
                ..WhoisRecord::default()
            }),
        }
    }
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn run_validate(
    file: Option<&PathBuf>,
    config_path: Option<&PathBuf>,
    json: bool,
    no_whois: bool,
    no_feeds: bool,
    whois_timeout: Option<&str>,
    feed_timeout: Option<&str>,
) -> Result<ExitCode> {
    let mut config = match config_path {
        Some(path) => PolicyConfig::from_file(path)?,
        None => PolicyConfig::default(),
    };
    if let Some(t) = whois_timeout {
        config.whois_timeout_secs = parse_duration(t)?.as_secs_f64();
    }
    if let Some(t) = feed_timeout {
        config.feed_timeout_secs = parse_duration(t)?.as_secs_f64();
    }
    config.validate()?;

    let input = read_input(file)?;

    let whois = if no_whois {
        CliWhois::Offline
    } else {
        CliWhois::Tcp(TcpWhoisClient::new(config.whois_timeout()))
    };
    let feeds = HttpFeedSource::new(config.feed_timeout())?;
    let mut validator = Validator::new(config, whois, feeds);
    if no_feeds {
        validator = validator.with_feed_urls(Vec::new());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let report = runtime.block_on(async {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, cancelling validation");
                let _ = cancel_tx.send(true);
            }
        });
        validator.validate_with_cancel(&input, cancel_rx).await
    })?;

    if json {
        println!("{}", csrcheck_lib::to_json(&report)?);
    } else {
        print!("{}", csrcheck_lib::display_text(&report));
    }

    let code = if report.terminal_failure {
        2
    } else if report.is_baseline_compliant() {
        0
    } else {
        1
    };
    info!(exit_code = code, "done");
    Ok(ExitCode::from(code))
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    match &cli.command {
        Commands::Validate {
            file,
            config,
            json,
            no_whois,
            no_feeds,
            whois_timeout,
            feed_timeout,
        } => run_validate(
            file.as_ref(),
            config.as_ref(),
            *json,
            *no_whois,
            *no_feeds,
            whois_timeout.as_deref(),
            feed_timeout.as_deref(),
        ),
        Commands::Inspect {
            file,
            json,
            all,
            failures_only,
            recurse,
        } => {
            // Directory mode: inspect all request files in parallel
            if let Some(path) = file {
                if path.is_dir() {
                    let files = find_csr_files(path, *recurse);
                    if files.is_empty() {
                        anyhow::bail!(
                            "No request files (.csr, .req, .pem, .der) found in {}",
                            path.display()
                        );
                    }
                    let failures = run_batch(&files, *failures_only, |f| {
                        let label = f.display().to_string();
                        match load_for_batch(f) {
                            Ok(csr) => BatchResult {
                                path: label,
                                ..summarize(&csr)
                            },
                            Err(detail) => BatchResult {
                                path: label,
                                pass: false,
                                detail,
                            },
                        }
                    });
                    return Ok(if failures > 0 {
                        ExitCode::from(1)
                    } else {
                        ExitCode::SUCCESS
                    });
                }
            }

            let input = read_input(file.as_ref())?;
            let csr = csrcheck_lib::parse_csr(&input)?;
            if *json {
                println!("{}", csrcheck_lib::to_json(&csr)?);
            } else {
                print!("{}", csrcheck_lib::display_csr(&csr, *all));
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::WeakKey {
            file,
            blacklist,
            failures_only,
            recurse,
        } => {
            let blacklist = WeakKeyBlacklist::load(blacklist)?;
            info!(entries = blacklist.len(), "weak-key blacklist loaded");

            if let Some(path) = file {
                if path.is_dir() {
                    let files = find_csr_files(path, *recurse);
                    if files.is_empty() {
                        anyhow::bail!(
                            "No request files (.csr, .req, .pem, .der) found in {}",
                            path.display()
                        );
                    }
                    let failures = run_batch(&files, *failures_only, |f| {
                        let label = f.display().to_string();
                        let csr = match load_for_batch(f) {
                            Ok(csr) => csr,
                            Err(detail) => {
                                return BatchResult {
                                    path: label,
                                    pass: false,
                                    detail,
                                }
                            }
                        };
                        match &csr.key {
                            Some(key) => {
                                let verdict = csrcheck_lib::check_weak_key(key, Some(&blacklist));
                                BatchResult {
                                    path: label,
                                    pass: verdict.passes(),
                                    detail: weak_key_detail(verdict).to_string(),
                                }
                            }
                            None => BatchResult {
                                path: label,
                                pass: false,
                                detail: format!(
                                    "FAIL ({})",
                                    csr.key_error.as_deref().unwrap_or("unreadable key")
                                ),
                            },
                        }
                    });
                    return Ok(if failures > 0 {
                        ExitCode::from(1)
                    } else {
                        ExitCode::SUCCESS
                    });
                }
            }

            let input = read_input(file.as_ref())?;
            let csr = csrcheck_lib::parse_csr(&input)?;
            let key = csr.key.as_ref().ok_or_else(|| {
                anyhow::anyhow!(
                    "Malformed public key: {}",
                    csr.key_error.as_deref().unwrap_or("unreadable")
                )
            })?;
            let verdict = csrcheck_lib::check_weak_key(key, Some(&blacklist));
            if let Some(modulus) = &key.modulus {
                println!("{}", csrcheck_lib::modulus_fingerprint(modulus));
            }
            println!("{}", weak_key_detail(verdict));
            Ok(if verdict.passes() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            })
        }
    }
}
