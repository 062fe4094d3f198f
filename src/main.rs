use std::fs::File;
use std::io::{self, BufWriter, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;

use chrono::Utc;
use clap::{Args, CommandFactory, Parser, Subcommand};
use miette::{IntoDiagnostic, Result, WrapErr};

use gitrisk_core::{FilterConfig, GitriskConfig, GitriskError, OutputFormat};
use gitrisk_history::cochange::{self, GraphOptions, RetryPolicy};
use gitrisk_history::duration::{parse_date, resolve};
use gitrisk_history::filter::FileFilter;
use gitrisk_history::hotspots::{self, HotspotRow};
use gitrisk_history::mining::{mine_history, MiningOptions};
use gitrisk_history::summary::{summarize, Summary};
use gitrisk_history::table::{CommitTable, Detail, Source};
use gitrisk_history::timeline::{self, TimeBucket, Timeslot};

#[derive(Parser)]
#[command(
    name = "gitrisk",
    version,
    about = "Find maintenance hotspots and co-change networks in git history",
    long_about = "gitrisk mines git history and ranks files by change frequency and\n\
                   contributor spread, and maps which files tend to change together.\n\n\
                   Examples:\n  \
                     gitrisk log . --full | gitrisk hotspot          Rank hotspots in one go\n  \
                     gitrisk log . --full -o repo.csv                Save history for later\n  \
                     gitrisk hotspot -i repo.csv --ignore-files '*.lock'\n  \
                     gitrisk hotgraph -i repo.csv -o graph.dot       Co-change network as DOT\n  \
                     gitrisk plot -i repo.csv -t 1M --csv            Monthly activity data"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (default: .gitrisk.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format for reports
    #[arg(
        long,
        global = true,
        default_value = "text",
        long_help = "Output format for reports.\n\n\
                       Formats:\n  \
                         text      Human-readable tables (default)\n  \
                         json      Machine-readable JSON with camelCase keys\n  \
                         markdown  GitHub-flavored Markdown"
    )]
    format: OutputFormat,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Extract git history as CSV
    #[command(long_about = "Extract git history as CSV.\n\n\
        Walks a branch and writes one row per commit with author, time, and line\n\
        counts. With --full, the touched file names are recorded too; hotspot and\n\
        hotgraph need them.\n\n\
        Examples:\n  gitrisk log . --full > repo.csv\n  gitrisk log ../app --since 2024-01-01 --month 3 -o q1.csv")]
    Log {
        /// Root directory of the git repository
        repo: PathBuf,

        /// Branch, tag, or revision to walk (default: HEAD)
        #[arg(short, long)]
        branch: Option<String>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        window: WindowArgs,

        /// Record the file names touched by each commit
        #[arg(long)]
        full: bool,
    },
    /// Rank files by change frequency and contributor count
    #[command(long_about = "Rank files by change frequency and contributor count.\n\n\
        Score = commits x authors, so files changed often by many people rank\n\
        above files changed often by one owner. Requires --full history.\n\n\
        Examples:\n  gitrisk hotspot -i repo.csv\n  gitrisk hotspot -i repo.csv --allow-files 'src/*' --csv -o hot.csv")]
    Hotspot {
        #[command(flatten)]
        input: InputArgs,

        /// Rows to show (default: 30)
        #[arg(short, long)]
        num: Option<usize>,

        /// Write every row as CSV instead of a report
        #[arg(long)]
        csv: bool,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        files: FileArgs,
    },
    /// Build the co-change network of files that change together
    #[command(long_about = "Build the co-change network of files that change together.\n\n\
        Keeps about the top --rank relationships. If ties leave the graph too\n\
        large to lay out, the threshold is raised automatically unless\n\
        --stop-retry is given. Writes Graphviz DOT by default.\n\n\
        Examples:\n  gitrisk hotgraph -i repo.csv -o graph.dot && dot -Tpng graph.dot -o graph.png\n  gitrisk hotgraph -i repo.csv --rank 30 --csv")]
    Hotgraph {
        #[command(flatten)]
        input: InputArgs,

        /// Number of strongest relationships to keep (default: 70)
        #[arg(short, long)]
        rank: Option<usize>,

        /// Build once, without raising the threshold on large graphs
        #[arg(long)]
        stop_retry: bool,

        /// Write edges as CSV instead of DOT
        #[arg(long)]
        csv: bool,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        files: FileArgs,
    },
    /// Bucket commit activity over time for trend charts
    #[command(long_about = "Bucket commit activity over time for trend charts.\n\n\
        Emits commits, authors, and line counts per time slot (e.g. 2W, 7D, 1M).\n\n\
        Examples:\n  gitrisk plot -i repo.csv\n  gitrisk plot -i repo.csv -t 1M --csv -o monthly.csv")]
    Plot {
        #[command(flatten)]
        input: InputArgs,

        /// Bucket width: <n>D, <n>W or <n>M
        #[arg(short, long, default_value = "2W")]
        timeslot: Timeslot,

        /// Report title
        #[arg(short, long, default_value = "GIT LOG REPORT")]
        name: String,

        /// Write buckets as CSV
        #[arg(long)]
        csv: bool,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        files: FileArgs,
    },
    /// Summarize commits, authors, and line counts
    Info {
        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        files: FileArgs,
    },
    /// Create a default .gitrisk.toml configuration file
    Init,
    /// Generate shell completion scripts
    #[command(hide = true)]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Args)]
struct WindowArgs {
    /// Start of the window (YYYY-MM-DD or RFC 3339)
    #[arg(long)]
    since: Option<String>,

    /// End of the window, exclusive (YYYY-MM-DD or RFC 3339)
    #[arg(long)]
    until: Option<String>,

    /// Window length in months (default: 6)
    #[arg(long, allow_negative_numbers = true)]
    month: Option<i64>,
}

#[derive(Args)]
struct InputArgs {
    /// CSV files produced by `gitrisk log` (default: stdin)
    #[arg(short, long, num_args = 1..)]
    input: Vec<PathBuf>,
}

#[derive(Args)]
struct FileArgs {
    /// Only count files matching these globs (e.g. 'src/*' '*.rb')
    #[arg(long, num_args = 0..)]
    allow_files: Vec<String>,

    /// Ignore files matching these globs (e.g. 'dist/*' '*.gen.java')
    #[arg(long, num_args = 0..)]
    ignore_files: Vec<String>,
}

impl FileArgs {
    fn is_set(&self, config: &FilterConfig) -> bool {
        !(self.allow_files.is_empty()
            && self.ignore_files.is_empty()
            && config.allow.is_empty()
            && config.ignore.is_empty())
    }

    fn build(&self, config: &FilterConfig) -> Result<FileFilter> {
        let allow = if self.allow_files.is_empty() {
            &config.allow
        } else {
            &self.allow_files
        };
        let ignore = if self.ignore_files.is_empty() {
            &config.ignore
        } else {
            &self.ignore_files
        };
        Ok(FileFilter::new(allow, ignore)?)
    }
}

const DEFAULT_CONFIG: &str = r#"# gitrisk configuration

[history]
# branch = "HEAD"
# months = 6
# max_files_per_commit = 0    # 0 = no cap

[filter]
# allow = ["src/*"]
# ignore = ["*.lock", "dist/*"]

[hotspot]
# limit = 30

[hotgraph]
# rank = 70
# edge_limit = 400
# max_retries = 8
"#;

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<GitriskConfig> {
    match path {
        Some(path) => GitriskConfig::from_file(path)
            .into_diagnostic()
            .wrap_err(format!("reading {}", path.display())),
        None => {
            let default_path = Path::new(".gitrisk.toml");
            if default_path.exists() {
                Ok(GitriskConfig::from_file(default_path)?)
            } else {
                Ok(GitriskConfig::default())
            }
        }
    }
}

fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .into_diagnostic()
                .wrap_err(format!("creating {}", path.display()))?;
            Ok(Box::new(BufWriter::new(file)))
        }
        None => Ok(Box::new(io::stdout().lock())),
    }
}

fn load_table(input: &InputArgs) -> Result<CommitTable> {
    let sources = if input.input.is_empty() {
        vec![Source::stdin()]
    } else {
        input
            .input
            .iter()
            .map(|p| Source::open(p))
            .collect::<std::result::Result<Vec<_>, _>>()?
    };
    Ok(CommitTable::load(sources)?)
}

/// Apply file filters to a commit table when any are configured.
fn narrow(table: CommitTable, files: &FileArgs, config: &FilterConfig) -> Result<CommitTable> {
    if !files.is_set(config) {
        return Ok(table);
    }
    let filter = files.build(config)?;
    Ok(table.filter_commit_files(&filter)?)
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))?;
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = load_config(cli.config.as_deref())?;
    tracing::debug!(format = %cli.format, "starting");

    let Some(command) = cli.command else {
        Cli::command().print_help().into_diagnostic()?;
        return Ok(());
    };

    match command {
        Command::Log {
            repo,
            branch,
            output,
            window,
            full,
        } => {
            if git2::Repository::open(&repo).is_err() {
                return Err(miette::miette!(
                    help = "REPO must be the root directory of a git repository",
                    "Not a git repository: {}",
                    repo.display()
                ));
            }

            let since = window.since.as_deref().map(parse_date).transpose()?;
            let until = window.until.as_deref().map(parse_date).transpose()?;
            let months = window.month.or(Some(i64::from(config.history.months)));
            let duration = resolve(since, until, months, Utc::now())?;
            let (start, end) = (duration.start, duration.end);

            let options = MiningOptions {
                duration,
                branch: branch.or_else(|| Some(config.history.branch.clone())),
                detail: if full { Detail::Full } else { Detail::Summary },
                max_files_per_commit: config.history.max_files_per_commit,
            };

            let spinner = io::stderr().is_terminal().then(|| {
                let pb = indicatif::ProgressBar::new_spinner();
                pb.set_style(
                    indicatif::ProgressStyle::with_template("{spinner:.cyan} {msg} ({elapsed})")
                        .unwrap_or_else(|_| indicatif::ProgressStyle::default_spinner()),
                );
                pb.set_message(format!("Mining git history at {}", repo.display()));
                pb.enable_steady_tick(StdDuration::from_millis(100));
                pb
            });
            let table = mine_history(&repo, &options);
            if let Some(pb) = spinner {
                pb.finish_and_clear();
            }
            let table = table?;
            tracing::info!(
                commits = table.len(),
                since = %start,
                until = %end,
                "extracted history"
            );

            let mut out = open_output(output.as_deref())?;
            table.write_csv(&mut out)?;
            out.flush().into_diagnostic()?;
        }
        Command::Hotspot {
            input,
            num,
            csv,
            output,
            files,
        } => {
            let table = load_table(&input)?;
            let filter = files.build(&config.filter)?;
            let expanded = table.expand()?;
            let report = hotspots::aggregate(&expanded.filter_files(filter.predicate()));

            let mut out = open_output(output.as_deref())?;
            if csv {
                hotspots::write_hotspots_csv(&report, &mut out)?;
            } else {
                let limit = num.unwrap_or(config.hotspot.limit);
                let top = &report[..report.len().min(limit)];
                write_hotspots(&mut out, top, cli.format)?;
            }
            out.flush().into_diagnostic()?;
        }
        Command::Hotgraph {
            input,
            rank,
            stop_retry,
            csv,
            output,
            files,
        } => {
            let table = load_table(&input)?;
            let filter = files.build(&config.filter)?;
            let expanded = table
                .expand()?
                .filter_files(filter.predicate());

            let options = GraphOptions {
                rank: rank.unwrap_or(config.hotgraph.rank),
                retry: RetryPolicy::from_stop_retry(stop_retry),
                edge_limit: config.hotgraph.edge_limit,
                max_retries: config.hotgraph.max_retries,
                cancel: None,
            };
            let graph = match cochange::build_with(&expanded, &options) {
                Ok(graph) => graph,
                Err(GitriskError::EmptyGraph) => {
                    eprintln!("Nothing to show: no file changes match the selected history.");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            };
            tracing::info!(
                files = graph.node_count(),
                edges = graph.edge_count(),
                threshold = graph.threshold(),
                escalations = graph.escalations(),
                "built co-change graph"
            );

            let mut out = open_output(output.as_deref())?;
            if csv {
                graph.write_edges_csv(&mut out)?;
            } else if cli.format == OutputFormat::Json {
                serde_json::to_writer_pretty(&mut out, &graph).into_diagnostic()?;
                writeln!(out).into_diagnostic()?;
            } else {
                write!(out, "{}", graph.to_dot()).into_diagnostic()?;
            }
            out.flush().into_diagnostic()?;
        }
        Command::Plot {
            input,
            timeslot,
            name,
            csv,
            output,
            files,
        } => {
            let table = narrow(load_table(&input)?, &files, &config.filter)?;
            let buckets = timeline::timeline(&table, timeslot);

            let mut out = open_output(output.as_deref())?;
            if csv {
                timeline::write_timeline_csv(&buckets, &mut out)?;
            } else {
                write_timeline(&mut out, &name, timeslot, &buckets, cli.format)?;
            }
            out.flush().into_diagnostic()?;
        }
        Command::Info { input, files } => {
            let table = narrow(load_table(&input)?, &files, &config.filter)?;
            let summary = summarize(&table);
            let mut out = io::stdout().lock();
            write_summary(&mut out, &summary, cli.format)?;
        }
        Command::Init => {
            let path = Path::new(".gitrisk.toml");
            if path.exists() {
                miette::bail!(".gitrisk.toml already exists");
            }
            std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
            println!("Created .gitrisk.toml with default configuration");
        }
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "gitrisk", &mut io::stdout());
        }
    }

    Ok(())
}

fn write_hotspots(out: &mut dyn Write, rows: &[HotspotRow], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, rows).into_diagnostic()?;
            writeln!(out).into_diagnostic()?;
        }
        OutputFormat::Markdown => {
            writeln!(out, "# Hotspots\n").into_diagnostic()?;
            if rows.is_empty() {
                writeln!(out, "No hotspots detected.").into_diagnostic()?;
                return Ok(());
            }
            writeln!(out, "| Rank | File | Hotspot | Commits | Authors |").into_diagnostic()?;
            writeln!(out, "|------|------|---------|---------|---------|").into_diagnostic()?;
            for (i, h) in rows.iter().enumerate() {
                writeln!(
                    out,
                    "| {} | `{}` | {:.2} | {} | {} |",
                    i + 1,
                    h.file_name,
                    h.hotspot,
                    h.commits,
                    h.authors
                )
                .into_diagnostic()?;
            }
        }
        OutputFormat::Text => {
            if rows.is_empty() {
                writeln!(out, "No hotspots detected.").into_diagnostic()?;
                return Ok(());
            }
            writeln!(
                out,
                "{:>8} {:>8} {:>8}  {}",
                "hotspot", "commits", "authors", "file_name"
            )
            .into_diagnostic()?;
            for h in rows {
                writeln!(
                    out,
                    "{:>8.2} {:>8} {:>8}  {}",
                    h.hotspot, h.commits, h.authors, h.file_name
                )
                .into_diagnostic()?;
            }
        }
    }
    Ok(())
}

fn write_timeline(
    out: &mut dyn Write,
    name: &str,
    timeslot: Timeslot,
    buckets: &[TimeBucket],
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let value = serde_json::json!({
                "name": name,
                "timeslot": timeslot.to_string(),
                "buckets": buckets,
            });
            serde_json::to_writer_pretty(&mut *out, &value).into_diagnostic()?;
            writeln!(out).into_diagnostic()?;
        }
        OutputFormat::Markdown => {
            writeln!(out, "# {name}\n").into_diagnostic()?;
            writeln!(out, "| Start | Commits | Authors | Added | Deleted | Net |")
                .into_diagnostic()?;
            writeln!(out, "|-------|---------|---------|-------|---------|-----|")
                .into_diagnostic()?;
            for b in buckets {
                writeln!(
                    out,
                    "| {} | {} | {} | {} | {} | {} |",
                    b.start.format("%Y-%m-%d"),
                    b.commits,
                    b.authors,
                    b.insertions,
                    b.deletions,
                    b.net_lines
                )
                .into_diagnostic()?;
            }
        }
        OutputFormat::Text => {
            writeln!(out, "{name} ({timeslot} buckets)").into_diagnostic()?;
            writeln!(
                out,
                "{:<10} {:>7} {:>7} {:>8} {:>8} {:>8}",
                "start", "commits", "authors", "added", "deleted", "net"
            )
            .into_diagnostic()?;
            for b in buckets {
                writeln!(
                    out,
                    "{:<10} {:>7} {:>7} {:>8} {:>8} {:>8}",
                    b.start.format("%Y-%m-%d"),
                    b.commits,
                    b.authors,
                    b.insertions,
                    b.deletions,
                    b.net_lines
                )
                .into_diagnostic()?;
            }
        }
    }
    Ok(())
}

fn write_summary(out: &mut dyn Write, summary: &Summary, format: OutputFormat) -> Result<()> {
    let date = |d: Option<chrono::DateTime<Utc>>| {
        d.map_or_else(|| "-".to_string(), |d| d.format("%Y-%m-%d").to_string())
    };
    match format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, summary).into_diagnostic()?;
            writeln!(out).into_diagnostic()?;
        }
        OutputFormat::Markdown => {
            writeln!(out, "# Repository Summary\n").into_diagnostic()?;
            writeln!(out, "| Metric | Value |").into_diagnostic()?;
            writeln!(out, "|--------|-------|").into_diagnostic()?;
            writeln!(out, "| Since | {} |", date(summary.since)).into_diagnostic()?;
            writeln!(out, "| Until | {} |", date(summary.until)).into_diagnostic()?;
            writeln!(out, "| Commits | {} |", summary.commits).into_diagnostic()?;
            writeln!(out, "| Authors | {} |", summary.authors).into_diagnostic()?;
            writeln!(out, "| Insertions | {} |", summary.insertions).into_diagnostic()?;
            writeln!(out, "| Deletions | {} |", summary.deletions).into_diagnostic()?;
            writeln!(
                out,
                "| Refactoring ratio | {:.2} |",
                summary.refactoring_ratio
            )
            .into_diagnostic()?;
        }
        OutputFormat::Text => {
            writeln!(
                out,
                "Period:     {} .. {}",
                date(summary.since),
                date(summary.until)
            )
            .into_diagnostic()?;
            writeln!(out, "Commits:    {}", summary.commits).into_diagnostic()?;
            writeln!(out, "Authors:    {}", summary.authors).into_diagnostic()?;
            if let Some(files) = summary.files {
                writeln!(out, "Files:      {files}").into_diagnostic()?;
            }
            writeln!(
                out,
                "Lines:      +{} -{} (net {})",
                summary.insertions, summary.deletions, summary.net_lines
            )
            .into_diagnostic()?;
            writeln!(out, "Refactoring ratio: {:.2}", summary.refactoring_ratio)
                .into_diagnostic()?;
            if !summary.top_authors.is_empty() {
                writeln!(out, "\nTop authors:").into_diagnostic()?;
                for share in summary.top_authors.iter().take(10) {
                    writeln!(out, "  {:>6}  {}", share.commits, share.author).into_diagnostic()?;
                }
            }
        }
    }
    Ok(())
}
