//! CLI entry point for `mailindex`.

use std::io::Read as _;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use mailindex::config::{self, Config};
use mailindex::ingest::{visit_folder, ingest_message};
use mailindex::store::MailStore;

#[derive(Parser)]
#[command(name = "mailindex", version, about = "Index MIME mail trees into a searchable store")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Database file (overrides configuration)
    #[arg(long, global = true, value_name = "FILE")]
    db: Option<PathBuf>,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Index a message file or a folder tree of message files
    Index {
        path: PathBuf,
        /// Abort on the first file that fails instead of skipping it
        #[arg(long)]
        stop_on_error: bool,
        /// Read the raw message from stdin; PATH is recorded as its source
        #[arg(long)]
        stdin: bool,
    },
    /// Search indexed messages
    Search {
        query: String,
        #[arg(long)]
        json: bool,
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Show store statistics
    Stats {
        #[arg(long)]
        json: bool,
    },
    /// Write a stored attachment's bytes out
    Attachment {
        id: i64,
        /// Output file (defaults to the stored file name)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = config::load_config();

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    let db = cli.db.unwrap_or_else(|| config::db_path(&config));

    match cli.command {
        Commands::Index {
            path,
            stop_on_error,
            stdin,
        } => cmd_index(&db, &config, &path, stop_on_error, stdin),
        Commands::Search { query, json, limit } => cmd_search(&db, &query, json, limit),
        Commands::Stats { json } => cmd_stats(&db, json),
        Commands::Attachment { id, output } => cmd_attachment(&db, id, output.as_deref()),
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = config::cache_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "mailindex.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

fn cmd_index(
    db: &Path,
    config: &Config,
    path: &Path,
    stop_on_error: bool,
    stdin: bool,
) -> anyhow::Result<()> {
    let mut store = MailStore::open(db)?;
    if let Some(bytes) = config.limits.max_record_bytes {
        store.set_record_size_limit(bytes);
    }

    if stdin {
        let mut raw = Vec::new();
        std::io::stdin().read_to_end(&mut raw)?;
        return report_single(ingest_message(
            &mut store,
            &raw,
            &path.to_string_lossy(),
            &config.limits,
        )?);
    }

    if !path.exists() {
        return Err(mailindex::IndexError::NotFound(path.to_path_buf()).into());
    }

    if path.is_file() {
        let raw = std::fs::read(path)?;
        return report_single(ingest_message(
            &mut store,
            &raw,
            &path.to_string_lossy(),
            &config.limits,
        )?);
    }

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {pos} files  {wide_msg}")
            .expect("valid template"),
    );
    let report = |p: &Path| {
        pb.inc(1);
        pb.set_message(p.display().to_string());
    };

    let start = Instant::now();
    let stats = visit_folder(&mut store, path, &config.limits, stop_on_error, Some(&report))?;
    pb.finish_and_clear();

    println!(
        "Created: {}, existing: {}, failed: {}",
        stats.created, stats.existing, stats.failed
    );
    println!("Elapsed: {:.2?}", start.elapsed());
    Ok(())
}

fn report_single(created: bool) -> anyhow::Result<()> {
    if created {
        println!("Created new entry");
    } else {
        println!("Entry already indexed");
    }
    Ok(())
}

fn cmd_search(db: &Path, query: &str, json: bool, limit: usize) -> anyhow::Result<()> {
    let store = MailStore::open(db)?;
    let hits = store.search(query, limit)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
        return Ok(());
    }

    println!();
    println!("  {} result(s)", hits.len());
    if hits.is_empty() {
        return Ok(());
    }
    println!();
    println!("  {:<8} {:<40} {:<50}", "Id", "Subject", "Path");
    println!("  {}", "-".repeat(98));
    for hit in &hits {
        let subject = hit.subject.as_deref().unwrap_or("(no subject)");
        let subj_trunc: String = subject.chars().take(39).collect();
        println!("  {:<8} {:<40} {:<50}", hit.id, subj_trunc, hit.original_path);
    }
    println!();
    Ok(())
}

fn cmd_stats(db: &Path, json: bool) -> anyhow::Result<()> {
    use humansize::{format_size, BINARY};

    let store = MailStore::open(db)?;
    let stats = store.stats()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!();
    println!("  {:<20} {}", "Database", store.path().display());
    println!("  {:<20} {}", "Messages", stats.messages);
    println!("  {:<20} {}", "Addresses", stats.addresses);
    println!("  {:<20} {}", "Headers", stats.headers);
    println!("  {:<20} {}", "Attachments", stats.attachments);
    println!("  {:<20} {}", "Size", format_size(stats.db_bytes, BINARY));
    println!();
    Ok(())
}

fn cmd_attachment(db: &Path, id: i64, output: Option<&Path>) -> anyhow::Result<()> {
    let store = MailStore::open(db)?;
    let att = store.attachment(id)?;

    let target = match output {
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(att.file_name.as_deref().unwrap_or("attachment.bin")),
    };
    std::fs::write(&target, &att.content)?;
    println!(
        "Wrote {} byte(s) to {}",
        att.content.len(),
        target.display()
    );
    Ok(())
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mailindex", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}
