use crate::config::DEFAULT_MAX_UPLOAD_BYTES;
use clap::Parser;
use std::path::PathBuf;

/// CLI arguments for the mirror server (mutation applier)
#[derive(Parser, Debug)]
#[clap(name = "treemirror-server")]
#[clap(about = "Replays filesystem changes into a destination directory", long_about = None)]
pub struct ServerArgs {
    /// Destination directory changes are applied to (must be readable and writable)
    #[clap(short, long, value_name = "DIR", env = "TREEMIRROR_DEST")]
    pub path: PathBuf,

    /// Port to listen on
    #[clap(long, default_value = "8000")]
    pub port: u16,

    /// Host to bind to
    #[clap(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Maximum accepted upload body size in bytes
    #[clap(long, default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    pub max_upload_bytes: usize,
}

/// CLI arguments for the watching client (relay)
#[derive(Parser, Debug)]
#[clap(name = "treemirror-client")]
#[clap(about = "Watches a directory and relays every change to a treemirror server", long_about = None)]
pub struct ClientArgs {
    /// Directory to watch (must be readable and writable)
    #[clap(short, long, value_name = "DIR", env = "TREEMIRROR_SOURCE")]
    pub path: PathBuf,

    /// Server base URL (default http://localhost:8000)
    #[clap(short, long, value_name = "URL", env = "TREEMIRROR_SERVER")]
    pub server: Option<String>,

    /// Files at or above this many bytes are staged to a scratch copy before upload (default 10000)
    #[clap(long, value_name = "BYTES")]
    pub threshold: Option<u64>,

    /// Glob patterns to ignore, matched against the root-relative path (repeatable)
    #[clap(long, value_name = "GLOB")]
    pub ignore: Vec<String>,

    /// Do not apply the built-in editor swap/backup/temp ignore list
    #[clap(long)]
    pub no_default_ignores: bool,

    /// JSON config file with `server`, `threshold`, `ignore`, `default_ignores`
    #[clap(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}
