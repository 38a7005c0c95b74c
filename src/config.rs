use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,

    /// Where uploads are staged until their job terminates
    pub upload_dir: PathBuf,

    /// Where produced artifacts live until retention expires
    pub output_dir: PathBuf,

    pub log_dir: PathBuf,

    /// FFmpeg binary used as the transcoding engine
    pub ffmpeg_bin: PathBuf,

    /// Maximum accepted upload size (in bytes)
    /// Default: 500MB (500 * 1024 * 1024)
    pub max_upload_size: u64,

    /// How long a produced artifact stays downloadable
    pub retention: Duration,

    /// How long a terminal job's progress record stays pollable
    pub record_expiry: Duration,

    /// Settle time between engine completion and output verification
    pub verify_delay: Duration,

    /// Grace period for in-flight requests (and their jobs) on shutdown
    pub shutdown_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3000,
            upload_dir: PathBuf::from("uploads"),
            output_dir: PathBuf::from("compressed"),
            log_dir: PathBuf::from("logs"),
            ffmpeg_bin: PathBuf::from("ffmpeg"),
            max_upload_size: 500 * 1024 * 1024,
            retention: Duration::from_secs(7 * 24 * 60 * 60),
            record_expiry: Duration::from_secs(5),
            verify_delay: Duration::from_millis(1000),
            shutdown_timeout: Duration::from_secs(60 * 60),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// All variables are optional:
    /// - HOST, PORT: listen address (default: localhost:3000)
    /// - UPLOAD_DIR, OUTPUT_DIR, LOG_DIR: working directories
    /// - FFMPEG_BIN: engine binary (default: ffmpeg on PATH)
    /// - MAX_UPLOAD_SIZE: upload ceiling in bytes (default: 524288000 = 500MB)
    /// - RETENTION_SECS: artifact retention (default: 604800 = 7 days)
    /// - RECORD_EXPIRY_SECS: progress record lifetime after completion (default: 5)
    /// - VERIFY_DELAY_MS: wait before output verification (default: 1000)
    /// - SHUTDOWN_TIMEOUT_SECS: graceful shutdown window (default: 3600)
    pub fn from_env() -> Result<Self, String> {
        // Load .env file if it exists
        dotenv::dotenv().ok();

        let defaults = Config::default();

        Ok(Config {
            host: env::var("HOST").unwrap_or(defaults.host),
            port: parse_var("PORT")?.unwrap_or(defaults.port),
            upload_dir: env::var("UPLOAD_DIR").map(PathBuf::from).unwrap_or(defaults.upload_dir),
            output_dir: env::var("OUTPUT_DIR").map(PathBuf::from).unwrap_or(defaults.output_dir),
            log_dir: env::var("LOG_DIR").map(PathBuf::from).unwrap_or(defaults.log_dir),
            ffmpeg_bin: env::var("FFMPEG_BIN").map(PathBuf::from).unwrap_or(defaults.ffmpeg_bin),
            max_upload_size: parse_var("MAX_UPLOAD_SIZE")?.unwrap_or(defaults.max_upload_size),
            retention: parse_var("RETENTION_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.retention),
            record_expiry: parse_var("RECORD_EXPIRY_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.record_expiry),
            verify_delay: parse_var("VERIFY_DELAY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.verify_delay),
            shutdown_timeout: parse_var("SHUTDOWN_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_timeout),
        })
    }
}

fn parse_var<T: FromStr>(key: &str) -> Result<Option<T>, String> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| format!("{} has an invalid value: {}", key, raw)),
        Err(_) => Ok(None),
    }
}
