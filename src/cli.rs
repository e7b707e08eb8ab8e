// src/cli.rs
use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::adapters::{self, Platform, StandingsRequest};
use crate::config::{RetryPolicy, SyncOptions};
use crate::core::HttpFetcher;
use crate::model::{Contest, ProblemResult, StandingsDocument, StandingsReply, SyncCursor};

#[derive(Parser, Debug)]
#[command(name = "standings-sync", version, about = "Fetch contest standings and sync submissions")]
pub struct Cli {
    #[command(flatten)]
    net: NetArgs,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Args, Debug)]
struct NetArgs {
    /// Concurrent page fetches
    #[arg(long, global = true)]
    workers: Option<usize>,
    /// Attempts per page before giving up
    #[arg(long, global = true)]
    attempts: Option<u32>,
    /// Max submission pages merged per run
    #[arg(long, global = true)]
    page_budget: Option<u32>,
    #[arg(long, env = "STANDINGS_USERNAME", global = true)]
    username: Option<String>,
    #[arg(long, env = "STANDINGS_PASSWORD", global = true, hide_env_values = true)]
    password: Option<String>,
}

#[derive(Args, Debug)]
struct ContestArgs {
    /// leaderboard | yandex | atcoder
    #[arg(long)]
    platform: Platform,
    /// Contest page URL
    #[arg(long)]
    url: String,
    #[arg(long)]
    key: Option<String>,
    /// Standings page, when it does not follow from the contest URL
    #[arg(long)]
    standings_url: Option<String>,
    /// RFC 3339, defaults to the end time
    #[arg(long)]
    start: Option<DateTime<Utc>>,
    /// RFC 3339
    #[arg(long)]
    end: DateTime<Utc>,
    /// e.g. 2021-2022
    #[arg(long)]
    season: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the standings document as JSON
    Standings {
        #[command(flatten)]
        contest: ContestArgs,
        /// Refresh only these members
        #[arg(long, value_delimiter = ',')]
        users: Option<Vec<String>>,
        /// Previous document (JSON) to reconcile with
        #[arg(long)]
        previous: Option<PathBuf>,
        /// Sync cursor file; read before and rewritten after the run
        #[arg(long)]
        cursor: Option<PathBuf>,
    },
    /// Print profile data of the given accounts
    UserInfos {
        #[command(flatten)]
        contest: ContestArgs,
        /// Profile URL with an `{account}` placeholder
        #[arg(long)]
        profile_url: String,
        accounts: Vec<String>,
    },
    /// Print the source of one submission
    Source {
        #[command(flatten)]
        contest: ContestArgs,
        submission_url: String,
    },
}

impl NetArgs {
    fn options(&self) -> SyncOptions {
        let mut opts = SyncOptions::default();
        if let Some(w) = self.workers {
            opts.workers = w.max(1);
        }
        if let Some(a) = self.attempts {
            opts.retry = RetryPolicy { attempts: a.max(1), ..opts.retry };
        }
        opts.page_budget = self.page_budget;
        if let (Some(u), Some(p)) = (&self.username, &self.password) {
            opts = opts.with_credentials(u, p);
        }
        opts
    }
}

impl ContestArgs {
    fn contest(&self) -> Contest {
        let key = self.key.clone().unwrap_or_else(|| s!(crate::core::sanitize::last_segment(&self.url)));
        let mut contest = Contest::new(&key, &self.url, self.start.unwrap_or(self.end), self.end);
        contest.standings_url = self.standings_url.clone();
        contest.season = self.season.clone();
        contest
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let mut out = io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}

fn read_cursor(path: &Path) -> Result<Option<SyncCursor>> {
    if !path.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(path).wrap_err_with(|| format!("reading {}", path.display()))?;
    Ok(Some(serde_json::from_str(&text).wrap_err("bad cursor file")?))
}

fn read_previous(path: &Path) -> Result<StandingsDocument> {
    let text = fs::read_to_string(path).wrap_err_with(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).wrap_err("bad previous document")
}

pub fn run() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let opts = cli.net.options();
    let fetcher = Arc::new(HttpFetcher::new()?);

    match cli.cmd {
        Command::Standings { contest, users, previous, cursor } => {
            let adapter = adapters::build(contest.platform, contest.contest(), fetcher, opts);
            let request = StandingsRequest {
                users: users.map(|u| u.into_iter().collect::<BTreeSet<_>>()),
                previous: previous.as_deref().map(read_previous).transpose()?.map(|d| d.result),
                cursor: cursor.as_deref().map(read_cursor).transpose()?.flatten(),
            };
            let reply = adapter.get_standings(&request)?;
            if let (Some(path), StandingsReply::Document(doc)) = (&cursor, &reply) {
                if let Some(state) = &doc.sync_state {
                    fs::write(path, serde_json::to_string_pretty(state)?)
                        .wrap_err_with(|| format!("writing {}", path.display()))?;
                    info!(path = %path.display(), "cursor saved");
                }
            }
            print_json(&reply)
        }
        Command::UserInfos { contest, profile_url, accounts } => {
            if !profile_url.contains("{account}") {
                return Err(eyre!("--profile-url needs an {{account}} placeholder"));
            }
            let adapter = adapters::build(contest.platform, contest.contest(), fetcher, opts);
            print_json(&adapter.get_user_infos(&accounts, &profile_url)?)
        }
        Command::Source { contest, submission_url } => {
            let adapter = adapters::build(contest.platform, contest.contest(), fetcher, opts);
            let problem = ProblemResult { url: Some(submission_url), ..ProblemResult::default() };
            print_json(&adapter.get_source_code(&problem)?)
        }
    }
}
