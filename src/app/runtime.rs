use std::fmt::Write as _;
use std::io::{self, BufRead, Write};
use std::sync::LazyLock;
use std::time::Instant;

use regex::Regex;
use tracing::{error, info, warn};

use super::crawl::{Crawler, EXHAUSTION_STREAK, HttpPageSource, StopReason};
use super::data_io::{ExportPaths, export_all, sample_json};
use super::dedup::CrawlState;
use super::error::{CrawlError, Result};
use super::types::{Cli, CrawlConfig, DEFAULT_MAX_PAGES};

static PROFILE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://steamcommunity\.com/(id|profiles)/[^/]+/?").unwrap()
});

const SUMMARY_RULE: &str =
    "============================================================";
const SUMMARY_DIVIDER: &str =
    "------------------------------------------------------------";
const SAMPLE_USERS: usize = 3;

/// Trims, adds `https://` when no scheme is given, and checks the result is
/// a Steam `/id/` or `/profiles/` URL.
pub fn normalize_profile_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CrawlError::InvalidProfileUrl {
            url: String::new(),
            reason: "URL cannot be empty",
        });
    }

    let url = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    if !PROFILE_URL.is_match(&url) {
        return Err(CrawlError::InvalidProfileUrl {
            url,
            reason: "expected https://steamcommunity.com/id/<name>/ or https://steamcommunity.com/profiles/<id>/",
        });
    }
    Ok(url)
}

/// Blank input keeps the default; anything else must be a page count.
pub fn parse_max_pages(input: &str) -> Option<usize> {
    let input = input.trim();
    if input.is_empty() {
        Some(DEFAULT_MAX_PAGES)
    } else {
        input.parse().ok()
    }
}

fn prompt(message: &str) -> Result<String> {
    let mut stdout = io::stdout();
    write!(stdout, "{message}").map_err(CrawlError::Prompt)?;
    stdout.flush().map_err(CrawlError::Prompt)?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(CrawlError::Prompt)?;
    Ok(line.trim().to_string())
}

/// Only `y` (any case, surrounding whitespace ignored) counts as yes.
pub fn is_yes(answer: &str) -> bool {
    answer.trim().eq_ignore_ascii_case("y")
}

fn banner(title: &str) {
    println!("\n{SUMMARY_RULE}\n{title}\n{SUMMARY_RULE}");
}

/// Where the URL and page limit came from.
struct Target {
    profile_url: String,
    max_pages: usize,
    interactive: bool,
}

fn resolve_target(cli: &Cli) -> Result<Target> {
    if let Some(url) = cli.url.as_deref() {
        return Ok(Target {
            profile_url: normalize_profile_url(url)?,
            max_pages: cli.max_pages.unwrap_or(DEFAULT_MAX_PAGES),
            interactive: false,
        });
    }

    banner("STEAM PROFILE COMMENT PARSER");
    println!("\nSupported URL formats:");
    println!("1. https://steamcommunity.com/id/username/");
    println!("2. https://steamcommunity.com/profiles/7656119xxxxxxxxxx/");
    let profile_url = normalize_profile_url(&prompt("\nEnter Steam profile URL: ")?)?;

    let max_pages = match cli.max_pages {
        Some(max_pages) => max_pages,
        None => {
            let answer = prompt(&format!(
                "\nMax pages to parse (Enter for {DEFAULT_MAX_PAGES}): "
            ))?;
            parse_max_pages(&answer).unwrap_or_else(|| {
                warn!(input = %answer, default = DEFAULT_MAX_PAGES, "not a page count, using default");
                DEFAULT_MAX_PAGES
            })
        }
    };

    Ok(Target {
        profile_url,
        max_pages,
        interactive: true,
    })
}

/// Console statistics block: totals plus the most active commenters.
pub fn render_summary(profile_url: &str, state: &CrawlState, top_n: usize) -> String {
    let aggregates = state.aggregates();
    let mut out = String::new();
    let _ = writeln!(out, "{SUMMARY_RULE}\nPARSING STATISTICS\n{SUMMARY_RULE}");
    let _ = writeln!(out, "profile: {profile_url}");
    if let Some(listing_url) = state.base_listing_url() {
        let _ = writeln!(out, "comments base URL: {listing_url}");
    }
    let _ = writeln!(out, "total comments: {}", state.total_comments());
    let _ = writeln!(out, "total users: {}", aggregates.len());

    if !aggregates.is_empty() && top_n > 0 {
        let _ = writeln!(out, "\ntop-{top_n} users by comment count:\n{SUMMARY_DIVIDER}");
        for (rank, (user, aggregate)) in aggregates.top_users(top_n).into_iter().enumerate() {
            let name = user.chars().take(40).collect::<String>();
            let _ = writeln!(
                out,
                "{:3}. {:40} - {:5} comments",
                rank + 1,
                name,
                aggregate.count()
            );
        }
    }
    out
}

pub fn render_timing(state: &CrawlState, elapsed_secs: f64) -> String {
    let mut out = format!("Execution time: {elapsed_secs:.1} seconds\n");
    if elapsed_secs > 0.0 {
        let _ = writeln!(
            out,
            "Parsing speed: {:.1} comments/sec",
            state.total_comments() as f64 / elapsed_secs
        );
    }
    out
}

pub async fn run(cli: Cli) -> Result<()> {
    let target = match resolve_target(&cli) {
        Ok(target) => target,
        Err(err @ CrawlError::InvalidProfileUrl { .. }) => {
            error!(error = %err, "rejected profile URL");
            pause_before_exit(&cli, cli.url.is_none());
            return Err(err);
        }
        Err(err) => {
            error!(error = %err, "could not read input");
            return Err(err);
        }
    };

    let result = crawl_and_export(&cli, &target).await;
    if let Err(err) = &result {
        error!(error = %err, "crawl failed");
    }
    pause_before_exit(&cli, target.interactive);
    result
}

async fn crawl_and_export(cli: &Cli, target: &Target) -> Result<()> {
    let config = CrawlConfig::from_cli(cli, target.max_pages);
    let source = HttpPageSource::new(&config)?;
    let mut crawler = Crawler::new(source, config);

    banner("STARTING PARSING");
    let started = Instant::now();
    let interrupted = tokio::select! {
        _ = crawler.crawl(&target.profile_url) => false,
        signal = tokio::signal::ctrl_c() => {
            if let Err(err) = signal {
                warn!(error = %err, "could not listen for interrupt");
            }
            true
        }
    };
    let elapsed = started.elapsed().as_secs_f64();

    let state = crawler.state();
    if interrupted {
        warn!(
            total_comments = state.total_comments(),
            "parsing interrupted by user, keeping partial results"
        );
    }

    match crawler.stop_reason() {
        Some(StopReason::Exhausted { page }) => println!(
            "\nstopped at page {page}: no new comments on the last {EXHAUSTION_STREAK} pages"
        ),
        Some(StopReason::FirstPageFailed) => println!("\ncould not load the profile page"),
        _ => {}
    }

    if state.aggregates().is_empty() {
        println!("\nFailed to get comments. Check URL and try again.");
        return Ok(());
    }

    let paths = ExportPaths::new(&cli.output_dir, &cli.basename);
    export_all(&paths, &target.profile_url, state)?;
    println!("\nsaved to JSON file: {}", paths.json.display());
    println!("saved to CSV file: {}", paths.csv.display());

    println!("\n{}", render_summary(&target.profile_url, state, cli.top));
    banner("SUMMARY");
    print!("{}", render_timing(state, elapsed));

    let show_sample = cli.sample
        || (target.interactive
            && !interrupted
            && is_yes(&prompt("\nShow sample data? (y/n): ")?));
    if show_sample {
        println!("\nSample data structure (first {SAMPLE_USERS} commenters):");
        println!("{}", sample_json(state.aggregates(), SAMPLE_USERS)?);
    }

    if interrupted {
        println!("\nParsing interrupted by user; partial results were saved.");
    } else {
        info!("parsing completed successfully");
        println!("\nParsing completed successfully!");
    }
    Ok(())
}

fn pause_before_exit(cli: &Cli, interactive: bool) {
    if cli.no_pause || !interactive {
        return;
    }
    let _ = prompt("\nPress Enter to exit...");
}
