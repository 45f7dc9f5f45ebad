use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use secrecy::ExposeSecret;
use std::path::{Path, PathBuf};

use sift::config::Config;
use sift::i18n::Messages;
use sift::rules::{RuleService, RuleType};
use sift::settings::{ConfigurationError, FileSettingsStore, Settings, SettingsStore};
use sift::ui::{self, DialogOutcome};

/// Get the config directory path (~/.config/sift/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("sift"))
}

/// Create the config directory if needed and restrict it to the owner.
fn prepare_config_dir(config_dir: &Path) -> Result<()> {
    if !config_dir.exists() {
        std::fs::create_dir_all(config_dir).context("Failed to create config directory")?;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        match std::fs::metadata(config_dir) {
            Ok(metadata) => {
                let mut perms = metadata.permissions();
                perms.set_mode(0o700);
                if let Err(e) = std::fs::set_permissions(config_dir, perms) {
                    tracing::warn!(
                        path = %config_dir.display(),
                        error = %e,
                        "Failed to set config directory permissions to 0700"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(
                    path = %config_dir.display(),
                    error = %e,
                    "Failed to read config directory metadata"
                );
            }
        }
    }
    Ok(())
}

#[derive(Parser, Debug)]
#[command(
    name = "sift",
    version,
    about = "Per-feed filter rules and backlog triage for Miniflux"
)]
struct Args {
    /// Message language (e.g. en, zh_CN). Defaults to config, then $LANG
    #[arg(long, global = true, value_name = "LANG")]
    lang: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show or change the Miniflux connection settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Manage feed filter rules
    Rule {
        #[command(subcommand)]
        action: RuleAction,
    },
    /// Browse unread entries and add rules from them
    Browse,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Save the API base URL and API key
    Set {
        /// Miniflux base URL, e.g. https://rss.example.com
        #[arg(long)]
        url: String,
        /// Miniflux API key
        #[arg(long)]
        key: String,
    },
    /// Print the current settings with the key masked
    Show,
}

#[derive(Subcommand, Debug)]
enum RuleAction {
    /// Add a rule to a feed and apply it to the feed's unread entries
    Add {
        /// Feed id
        feed_id: i64,
        /// Regular expression. Opens the rule dialog when omitted
        pattern: Option<String>,
        /// Add a keep rule instead of a block rule
        #[arg(long)]
        keep: bool,
    },
}

impl Command {
    /// Whether this command takes over the terminal.
    fn is_interactive(&self) -> bool {
        match self {
            Command::Browse => true,
            Command::Rule {
                action: RuleAction::Add { pattern, .. },
            } => pattern.is_none(),
            Command::Config { .. } => false,
        }
    }
}

/// Log to stderr, or to `sift.log` while the TUI owns the screen.
fn init_tracing(config_dir: &Path, interactive: bool) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env();
    if interactive {
        let log_path = config_dir.join("sift.log");
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("Failed to open log file '{}'", log_path.display()))?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(std::sync::Mutex::new(file))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}

/// `--lang`, then the config file, then `$LANG`, then English.
fn resolve_language(arg: Option<&str>, config: &Config) -> String {
    arg.map(str::to_string)
        .or_else(|| config.language.clone())
        .or_else(|| std::env::var("LANG").ok())
        .unwrap_or_else(|| "en".to_string())
}

/// Keep the last four characters of a key visible.
fn mask_key(key: &str) -> String {
    let count = key.chars().count();
    if count <= 8 {
        return "*".repeat(count);
    }
    let tail: String = key.chars().skip(count - 4).collect();
    format!("{}{}", "*".repeat(count - 4), tail)
}

fn config_set(store: &FileSettingsStore, messages: &Messages, url: &str, key: &str) -> Result<()> {
    let settings = match Settings::new(url, key) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{}", e.localized(messages));
            std::process::exit(1);
        }
    };
    if let Err(e) = store.set(&settings) {
        tracing::error!(error = %e, "Failed to save settings");
        eprintln!("{}", messages.format("settingsSaveError", &[&e.to_string()]));
        std::process::exit(1);
    }
    println!("{}", messages.get("settingsSaved"));
    Ok(())
}

fn config_show(store: &FileSettingsStore, messages: &Messages) -> Result<()> {
    println!("{}", messages.get("optionsTitle"));
    match store.get() {
        Ok(settings) => {
            println!("  {}: {}", messages.get("apiBaseUrlLabel"), settings.api_base_url());
            println!(
                "  {}: {}",
                messages.get("apiKeyLabel"),
                mask_key(settings.api_key().expose_secret())
            );
        }
        Err(ConfigurationError::NotConfigured) => {
            println!("  {}: {}", messages.get("apiBaseUrlLabel"), messages.get("notSet"));
            println!("  {}: {}", messages.get("apiKeyLabel"), messages.get("notSet"));
        }
        Err(e) => {
            eprintln!("{}", e.localized(messages));
            std::process::exit(1);
        }
    }
    Ok(())
}

async fn rule_add(
    service: &RuleService<FileSettingsStore>,
    messages: &Messages,
    feed_id: i64,
    pattern: Option<&str>,
    rule_type: RuleType,
) -> Result<()> {
    let Some(pattern) = pattern else {
        match ui::run_rule_dialog(service, messages, feed_id).await? {
            DialogOutcome::Saved { message } => println!("{message}"),
            DialogOutcome::Cancelled => println!("{}", messages.get("ruleCancelled")),
        }
        return Ok(());
    };

    match service.update_feed_rule(feed_id, pattern, rule_type).await {
        Ok(applied) => {
            println!("{}", applied.summary(messages));
            Ok(())
        }
        Err(e) if e.rule_persisted() => {
            eprintln!(
                "{}",
                messages.format("rulePersistedTriageFailed", &[&e.localized(messages)])
            );
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("{}", e.localized(messages));
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_dir = get_config_dir()?;
    prepare_config_dir(&config_dir)?;
    init_tracing(&config_dir, args.command.is_interactive())?;

    let config = Config::load(&config_dir.join("config.toml")).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load config, using defaults");
        eprintln!("Warning: {e}. Using defaults.");
        Config::default()
    });

    let language = resolve_language(args.lang.as_deref(), &config);
    let messages = Messages::load(&language, Some(&config_dir.join("locales")));
    tracing::debug!(requested = %language, loaded = %messages.language(), "Selected message catalog");

    let store = FileSettingsStore::new(config_dir.join("settings.toml"));

    match args.command {
        Command::Config { action } => match action {
            ConfigAction::Set { url, key } => config_set(&store, &messages, &url, &key),
            ConfigAction::Show => config_show(&store, &messages),
        },
        Command::Rule { action } => {
            let http = build_http_client()?;
            let service = RuleService::new(store, http).with_timeout(config.request_timeout());
            match action {
                RuleAction::Add {
                    feed_id,
                    pattern,
                    keep,
                } => {
                    let rule_type = if keep { RuleType::Keep } else { RuleType::Block };
                    rule_add(&service, &messages, feed_id, pattern.as_deref(), rule_type).await
                }
            }
        }
        Command::Browse => {
            let http = build_http_client()?;
            let service = RuleService::new(store, http).with_timeout(config.request_timeout());
            ui::run_browse(&service, &config, &messages).await
        }
    }
}

fn build_http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("sift/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")
}
