//! Command-line parsing, optional config file, and logger setup for
//! `drvshelld`.

use drvsh_proto::endpoint;
use serde_derive::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use tracing::Level;

#[derive(Debug)]
pub enum Error {
    Config(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Config(msg) => write!(f, "configuration error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

fn def_suffix() -> String {
    endpoint::DEFAULT_SUFFIX.to_owned()
}

/// The subset of settings that can live in `~/.drvshell.toml`. Anything
/// not present falls back to a built-in default; anything given on the
/// command line overrides the file.
#[derive(Deserialize, Default)]
struct FileConfig {
    base_dir: Option<String>,
    #[serde(default)]
    suffix: Option<String>,
}

/// Fully resolved settings the rest of `drvshelld` runs with.
#[derive(Debug, Clone)]
pub struct Config {
    pub base_dir: PathBuf,
    pub suffix: String,
    log_level: Level,
}

impl Config {
    pub fn get_log_level(&self) -> Level {
        self.log_level
    }
}

fn parse_config(contents: &str) -> Result<FileConfig> {
    toml::from_str(contents).map_err(|e| Error::Config(format!("{e}")))
}

async fn from_file(path: &Path) -> Option<Result<FileConfig>> {
    use tokio::fs;

    if let Ok(contents) = fs::read(path).await {
        let contents = String::from_utf8_lossy(&contents);

        Some(parse_config(&contents))
    } else {
        None
    }
}

/// Looks for `~/.drvshell.toml`. There's only one place a user's config
/// lives -- this isn't a system daemon with `/etc` deployment to worry
/// about.
async fn find_cfg() -> Result<FileConfig> {
    if let Ok(home) = env::var("HOME") {
        let path = PathBuf::from(home).join(".drvshell.toml");

        if let Some(cfg) = from_file(&path).await {
            return cfg;
        }
    }

    Ok(FileConfig::default())
}

fn from_cmdline(file_cfg: FileConfig) -> Config {
    use clap::{crate_version, Arg, ArgAction, Command};

    let matches = Command::new("drvshell")
        .version(crate_version!())
        .about("Interactive supervisor for driver endpoint sockets")
        .arg(
            Arg::new("base_dir")
                .value_name("DIR")
                .action(ArgAction::Set)
                .help("Directory to scan and watch for driver sockets"),
        )
        .arg(
            Arg::new("suffix")
                .long("suffix")
                .action(ArgAction::Set)
                .value_name("SUFFIX")
                .help("Socket file suffix to recognize (default: drv)"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .help("Increases log verbosity; can be used more than once"),
        )
        .get_matches();

    let base_dir = matches
        .get_one::<String>("base_dir")
        .cloned()
        .or(file_cfg.base_dir)
        .unwrap_or_else(|| String::from("."));

    let suffix = matches
        .get_one::<String>("suffix")
        .cloned()
        .or(file_cfg.suffix)
        .unwrap_or_else(def_suffix);

    let log_level = match matches.get_count("verbose") {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    Config {
        base_dir: PathBuf::from(base_dir),
        suffix,
        log_level,
    }
}

/// Resolves the final configuration from `~/.drvshell.toml` and the
/// command line, command line taking precedence.
#[tracing::instrument(name = "loading config")]
pub async fn get() -> Config {
    let file_cfg = find_cfg().await.unwrap_or_else(|e| {
        eprintln!("{e}");
        FileConfig::default()
    });

    from_cmdline(file_cfg)
}

/// Installs a global `tracing` subscriber at the given level. Call once,
/// as early as possible in `main`.
pub fn init_logging(level: Level) {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("unable to set global default subscriber");
}
