use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use miette::{Context, IntoDiagnostic, Result};

use miner_core::{MinerConfig, OutputFormat};
use miner_forensics::audit::{AuditSettings, Auditor};
use miner_forensics::cache::CommitCache;
use miner_forensics::repo::GitRepoSource;

mod render;

const CONFIG_FILE: &str = ".origin-miner.toml";

#[derive(Parser)]
#[command(
    name = "origin-miner",
    version,
    about = "Forensic git auditor that flags commits that look machine-written",
    long_about = "Origin-Miner walks recent git history and scores each commit on how fast,\n\
                   how dense and how comment-heavy it was. Commits that look like a large\n\
                   paste rather than incremental human work are flagged as suspicious.\n\n\
                   Examples:\n  \
                     origin-miner audit                       Audit the last 50 commits here\n  \
                     origin-miner audit --author alice        Only commits by alice\n  \
                     origin-miner audit --export report.json  Also write a JSON report\n  \
                     origin-miner cache stats                 Inspect the feature cache"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (default: .origin-miner.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        global = true,
        default_value = "text",
        long_help = "Output format for command results.\n\n\
                       Formats:\n  \
                         text      Human-readable table (default)\n  \
                         json      Machine-readable JSON with camelCase keys\n  \
                         markdown  GitHub-flavored Markdown"
    )]
    format: OutputFormat,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    verbose: bool,

    /// When to use colors
    #[arg(long, global = true, default_value = "auto")]
    color: ColorChoice,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Audit recent commits for machine-written changes
    #[command(long_about = "Audit recent commits for machine-written changes.\n\n\
        Each commit is compared with its predecessor: lines changed, files touched,\n\
        time elapsed and the share of added lines that are comments. Three rules\n\
        (velocity, density, robotic) decide whether a commit is suspicious.\n\n\
        Examples:\n  origin-miner audit --path ../service\n  origin-miner audit --max-commits 200 --fail-on-suspicious")]
    Audit {
        /// Repository path (default: current directory)
        #[arg(long, default_value = ".")]
        path: PathBuf,

        /// Only audit commits by this author
        #[arg(long)]
        author: Option<String>,

        /// Number of recent commits to inspect (default from config: 50)
        #[arg(long)]
        max_commits: Option<usize>,

        /// Write the audit records as a JSON array to this file
        #[arg(long)]
        export: Option<PathBuf>,

        /// Skip the feature cache for this run
        #[arg(long)]
        no_cache: bool,

        /// Exit with status 1 if any commit is suspicious
        #[arg(long)]
        fail_on_suspicious: bool,
    },
    /// Inspect or clear the per-repository feature cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Create a default .origin-miner.toml configuration file
    #[command(long_about = "Create a default .origin-miner.toml configuration file.\n\n\
        Generates a commented template with all available options.\n\
        Fails if .origin-miner.toml already exists.")]
    Init,
    /// Generate shell completion scripts
    #[command(hide = true)]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Delete every cached commit
    Clear {
        /// Repository path (default: current directory)
        #[arg(long, default_value = ".")]
        path: PathBuf,
    },
    /// Show cache size and contents summary
    Stats {
        /// Repository path (default: current directory)
        #[arg(long, default_value = ".")]
        path: PathBuf,
    },
}

#[derive(Clone, PartialEq, Eq, ValueEnum)]
enum ColorChoice {
    /// Auto-detect based on terminal
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

fn print_welcome(use_color: bool) {
    let version = env!("CARGO_PKG_VERSION");

    if use_color {
        println!("\x1b[1morigin-miner\x1b[0m v{version} | forensic commit auditing\n");

        println!("Quick start:");
        println!("  \x1b[36morigin-miner init\x1b[0m             Create a .origin-miner.toml config file");
        println!("  \x1b[36morigin-miner audit\x1b[0m            Audit recent commits in this repository\n");

        println!("All commands:");
        println!("  \x1b[32maudit\x1b[0m     Flag commits that look machine-written");
        println!("  \x1b[32mcache\x1b[0m     Inspect or clear the feature cache");
        println!("  \x1b[32minit\x1b[0m      Create default configuration\n");
    } else {
        println!("origin-miner v{version} | forensic commit auditing\n");

        println!("Quick start:");
        println!("  origin-miner init             Create a .origin-miner.toml config file");
        println!("  origin-miner audit            Audit recent commits in this repository\n");

        println!("All commands:");
        println!("  audit     Flag commits that look machine-written");
        println!("  cache     Inspect or clear the feature cache");
        println!("  init      Create default configuration\n");
    }

    println!("Run 'origin-miner <command> --help' for details.");
}

const DEFAULT_CONFIG: &str = r#"# Origin-Miner Configuration

[audit]
# max_commits = 50
# author = "alice"

[workers]
# 0 uses one worker per available CPU
# max_workers = 0
# item_timeout_secs = 30
# dispatch_deadline_secs = 300

[cache]
# enabled = true
# path = ".origin-miner/cache.db"

[rules]
# velocity_max_seconds = 15
# velocity_min_lines = 50
# density_max = 150.0
# robotic_max_seconds = 10
# robotic_min_comment_ratio = 0.40
"#;

/// Working tree root of the repository containing `path`, if there is one.
fn discover_root(path: &Path) -> Option<PathBuf> {
    git2::Repository::discover(path)
        .ok()
        .and_then(|repo| repo.workdir().map(Path::to_path_buf))
}

/// Like [`discover_root`], falling back to `path` itself.
fn repo_root(path: &Path) -> PathBuf {
    discover_root(path).unwrap_or_else(|| path.to_path_buf())
}

fn load_config(explicit: Option<&Path>) -> Result<MinerConfig> {
    let config = match explicit {
        Some(path) => MinerConfig::from_file(path)?,
        None => {
            let default_path = Path::new(CONFIG_FILE);
            if default_path.exists() {
                MinerConfig::from_file(default_path)?
            } else {
                MinerConfig::default()
            }
        }
    };
    Ok(config)
}

fn spinner(enabled: bool, message: &str) -> Option<indicatif::ProgressBar> {
    if !enabled || !std::io::stderr().is_terminal() {
        return None;
    }
    let pb = indicatif::ProgressBar::new_spinner();
    let style = indicatif::ProgressStyle::with_template("{spinner:.cyan} {msg} ({elapsed})")
        .unwrap_or_else(|_| indicatif::ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    Some(pb)
}

struct AuditArgs {
    path: PathBuf,
    author: Option<String>,
    max_commits: Option<usize>,
    export: Option<PathBuf>,
    no_cache: bool,
    fail_on_suspicious: bool,
}

fn run_audit(config: &MinerConfig, args: AuditArgs, format: OutputFormat, use_color: bool) -> Result<()> {
    let discovered = discover_root(&args.path);
    let root = discovered.clone().unwrap_or_else(|| args.path.clone());

    let mut settings = AuditSettings::from_config(config);
    if let Some(max) = args.max_commits {
        settings.max_commits = max;
    }
    if args.author.is_some() {
        settings.author = args.author;
    }

    let mut auditor = Auditor::new(GitRepoSource::new(&root), settings);
    // No repository, no cache: the run only reports that it is unavailable.
    if discovered.is_some() && config.cache.enabled && !args.no_cache {
        let cache_path = config.cache.resolve(&root);
        match CommitCache::open(&cache_path) {
            Ok(cache) => auditor = auditor.with_cache(cache),
            Err(err) => {
                tracing::warn!(path = %cache_path.display(), error = %err, "cache unavailable, continuing without it");
            }
        }
    }

    tracing::info!(
        repo = %root.display(),
        max_commits = auditor.settings().max_commits,
        author = auditor.settings().author.as_deref().unwrap_or("*"),
        "starting audit"
    );

    // Timed-out diff workers keep their blocking threads, so the runtime is
    // shut down with a bound instead of being dropped.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .into_diagnostic()
        .wrap_err("starting async runtime")?;

    let pb = spinner(format == OutputFormat::Text, "Auditing commit history...");
    let outcome = runtime.block_on(auditor.run());
    runtime.shutdown_timeout(Duration::from_secs(1));
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    match format {
        OutputFormat::Json => {
            let json = render::json_document(&outcome);
            println!("{}", serde_json::to_string_pretty(&json).into_diagnostic()?);
        }
        OutputFormat::Markdown => {
            eprintln!("{}", outcome.message());
            if !outcome.records().is_empty() {
                print!("{}", render::markdown_table(outcome.records()));
            }
        }
        OutputFormat::Text => {
            if !outcome.records().is_empty() {
                print!("{}", render::text_table(outcome.records(), use_color));
            }
            eprintln!("{}", outcome.message());
        }
    }

    if let Some(export) = &args.export {
        if outcome.records().is_empty() {
            eprintln!("Nothing to export.");
        } else {
            let json = serde_json::to_string_pretty(outcome.records()).into_diagnostic()?;
            std::fs::write(export, json)
                .into_diagnostic()
                .wrap_err(format!("writing {}", export.display()))?;
            eprintln!("Report exported to {}", export.display());
        }
    }

    if args.fail_on_suspicious && outcome.suspicious_count() > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn run_cache(config: &MinerConfig, action: CacheAction, format: OutputFormat) -> Result<()> {
    match action {
        CacheAction::Clear { path } => {
            let cache_path = config.cache.resolve(&repo_root(&path));
            if !cache_path.exists() {
                println!("No cache at {}", cache_path.display());
                return Ok(());
            }
            let removed = CommitCache::open(&cache_path)?.clear()?;
            tracing::info!(removed, path = %cache_path.display(), "cache cleared");
            println!("Cleared {removed} cached commits from {}", cache_path.display());
        }
        CacheAction::Stats { path } => {
            let cache_path = config.cache.resolve(&repo_root(&path));
            let stats = if cache_path.exists() {
                CommitCache::open(&cache_path)?.stats()?
            } else {
                Default::default()
            };
            match format {
                OutputFormat::Json => {
                    let json = serde_json::json!({
                        "path": cache_path.display().to_string(),
                        "entries": stats.entries,
                        "suspicious": stats.suspicious,
                        "sizeBytes": stats.size_bytes,
                    });
                    println!("{}", serde_json::to_string_pretty(&json).into_diagnostic()?);
                }
                _ => print!("{}", render::cache_stats_text(&cache_path, &stats)),
            }
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))
    .into_diagnostic()?;
    human_panic::setup_panic!();

    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    miner_core::telemetry::init_tracing(cli.log_json, level);

    let config = load_config(cli.config.as_deref())?;

    let use_color = match cli.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => std::io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    };

    if cli.verbose {
        eprintln!("format: {}", cli.format);
        eprintln!(
            "rules: velocity <{}s/>{} lines, density >{}, robotic <{}s/>{:.0}% comments",
            config.rules.velocity_max_seconds,
            config.rules.velocity_min_lines,
            config.rules.density_max,
            config.rules.robotic_max_seconds,
            config.rules.robotic_min_comment_ratio * 100.0,
        );
    }

    match cli.command {
        None => print_welcome(use_color),
        Some(Command::Audit {
            path,
            author,
            max_commits,
            export,
            no_cache,
            fail_on_suspicious,
        }) => {
            let args = AuditArgs {
                path,
                author,
                max_commits,
                export,
                no_cache,
                fail_on_suspicious,
            };
            run_audit(&config, args, cli.format, use_color)?;
        }
        Some(Command::Cache { action }) => run_cache(&config, action, cli.format)?,
        Some(Command::Init) => {
            let path = Path::new(CONFIG_FILE);
            if path.exists() {
                miette::bail!("{CONFIG_FILE} already exists");
            }
            std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
            println!("Created {CONFIG_FILE} with default configuration");
        }
        Some(Command::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "origin-miner", &mut std::io::stdout());
        }
    }

    Ok(())
}
