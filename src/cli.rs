use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{AppConfig, ScanStrategy};
use crate::record::ScanWindow;

/// Input format of `--ban-to-time`, e.g. 31-10-22T19:30:15
pub const BAN_TO_TIME_FORMAT: &str = "%d-%m-%yT%H:%M:%S";

#[derive(Parser, Debug)]
#[command(name = "banhammer")]
#[command(about = "Find users who joined a group within a time window, review them, then ban them in bulk")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Create default configuration file at ./config/banhammer.toml
    #[arg(long, global = true)]
    pub init: bool,

    /// Verbose logging (-v for debug, -vv for trace). RUST_LOG overrides this.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search for users who joined within a time window and write them to a results file
    Search(SearchArgs),

    /// Delete the history of and ban every user listed in a results file
    Ban(BanArgs),
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Channel or supergroup id, without the -100 prefix
    #[arg(long)]
    pub channel_id: i64,

    /// End of the search window, Unix timestamp
    #[arg(long, conflicts_with = "ban_to_time")]
    pub ban_to_timestamp: Option<i64>,

    /// End of the search window in local time, dd-mm-yyThh:mm:ss (like 31-10-22T19:30:15)
    #[arg(long)]
    pub ban_to_time: Option<String>,

    /// Length of the search window before its end, e.g. 90s, 15m, 2h, 1d or 1h30m
    #[arg(long, value_parser = parse_duration)]
    pub ban_search_duration: chrono::Duration,

    /// Member-list offset to start from (member listing strategy only)
    #[arg(long, default_value = "0")]
    pub ban_search_offset: usize,

    /// Stop after inspecting this many members or messages, 0 is unlimited
    #[arg(long, default_value = "0")]
    pub ban_search_limit: usize,

    /// Do not look up each user's last message
    #[arg(long)]
    pub search_ignore_messages: bool,

    /// Discovery strategy (overrides config)
    #[arg(long, value_enum)]
    pub strategy: Option<ScanStrategy>,

    /// Directory for results files (overrides config)
    #[arg(long)]
    pub results_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct BanArgs {
    /// Channel or supergroup id, without the -100 prefix
    #[arg(long)]
    pub channel_id: i64,

    /// Results file to process. Rewritten with the remaining users if interrupted.
    #[arg(long)]
    pub file: PathBuf,
}

impl SearchArgs {
    pub fn validate(&self) -> Result<(), String> {
        if self.ban_to_timestamp.is_none() && self.ban_to_time.is_none() {
            return Err(
                "--ban-to-timestamp or --ban-to-time must be set when searching for users"
                    .to_string(),
            );
        }
        if self.ban_search_duration <= chrono::Duration::zero() {
            return Err("--ban-search-duration must be greater than zero".to_string());
        }
        self.window().map(|_| ())
    }

    /// End of the window from whichever flag was given
    pub fn ban_to(&self) -> Result<DateTime<Utc>, String> {
        if let Some(text) = &self.ban_to_time {
            return parse_ban_to_time(text);
        }
        match self.ban_to_timestamp {
            Some(ts) => Utc
                .timestamp_opt(ts, 0)
                .single()
                .ok_or_else(|| format!("Invalid --ban-to-timestamp: {}", ts)),
            None => Err("No end of the search window given".to_string()),
        }
    }

    pub fn window(&self) -> Result<ScanWindow, String> {
        ScanWindow::ending_at(self.ban_to()?, self.ban_search_duration).ok_or_else(|| {
            "--ban-search-duration reaches before the earliest supported date".to_string()
        })
    }

    pub fn limit(&self) -> Option<usize> {
        (self.ban_search_limit > 0).then_some(self.ban_search_limit)
    }

    pub fn strategy(&self, config: &AppConfig) -> ScanStrategy {
        self.strategy.unwrap_or(config.search.strategy)
    }

    pub fn results_dir(&self, config: &AppConfig) -> PathBuf {
        self.results_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(&config.search.results_dir))
    }

    pub fn fetch_messages(&self, config: &AppConfig) -> bool {
        config.search.fetch_messages && !self.search_ignore_messages
    }
}

/// Parse `dd-mm-yyThh:mm:ss` in the local timezone
pub fn parse_ban_to_time(text: &str) -> Result<DateTime<Utc>, String> {
    let naive = NaiveDateTime::parse_from_str(text.trim(), BAN_TO_TIME_FORMAT)
        .map_err(|e| format!("Can't parse --ban-to-time '{}': {}", text, e))?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| format!("--ban-to-time '{}' does not exist in the local timezone", text))
}

/// Parse durations like `90s`, `15m`, `2h`, `1d` or combinations such as `1h30m`
pub fn parse_duration(text: &str) -> Result<chrono::Duration, String> {
    let text = text.trim();
    if text.is_empty() {
        return Err("duration cannot be empty".to_string());
    }

    let mut total = chrono::Duration::zero();
    let mut digits = String::new();
    for c in text.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        if digits.is_empty() {
            return Err(format!("invalid duration '{}': expected a number before '{}'", text, c));
        }
        let num: i64 = digits
            .parse()
            .map_err(|_| format!("invalid duration '{}': number too large", text))?;
        let part = match c {
            's' => chrono::Duration::try_seconds(num),
            'm' => chrono::Duration::try_minutes(num),
            'h' => chrono::Duration::try_hours(num),
            'd' => chrono::Duration::try_days(num),
            other => {
                return Err(format!(
                    "invalid duration '{}': unknown unit '{}' (use s, m, h or d)",
                    text, other
                ))
            }
        };
        total = part
            .and_then(|p| total.checked_add(&p))
            .ok_or_else(|| format!("invalid duration '{}': too large", text))?;
        digits.clear();
    }
    if !digits.is_empty() {
        return Err(format!("invalid duration '{}': missing unit after {}", text, digits));
    }
    Ok(total)
}
