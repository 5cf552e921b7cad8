use std::{env, fs::File, io, path::PathBuf, sync::Mutex, time::Duration};

use anyhow::{Context as _, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::event_loop::{Config, RestartPolicy, Transport};

/// File name of the backend looked up in the working directory when `--backend` is not given.
const DEFAULT_BACKEND: &str = "music-info-service";

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Which producers feed the display.
    #[clap(long, short, value_enum, default_value_t = Transport::Both)]
    pub transport: Transport,
    /// Backend executable. Defaults to `music-info-service` inside the working directory.
    #[clap(long, short)]
    pub backend: Option<PathBuf>,
    /// Working directory of the backend. Defaults to the directory containing this executable.
    #[clap(long, short)]
    pub working_dir: Option<PathBuf>,
    /// Well-known bus name of the MusicInfoService object.
    #[clap(long, default_value = "org.amazzy24128.MusicInfoService")]
    pub bus_name: String,
    /// Object path of the MusicInfoService object.
    #[clap(long, default_value = "/org/amazzy24128/MusicInfoService/Player")]
    pub bus_path: String,
    /// Seconds to wait before restarting a lost backend.
    #[clap(long, default_value_t = 2.0)]
    pub restart_delay: f64,
    /// How many times a lost backend is restarted. 0 leaves it stopped.
    #[clap(long, default_value_t = 0)]
    pub max_restarts: u32,
    /// Warn when a playing state has not been refreshed for this many seconds.
    #[clap(long, default_value_t = 30.0)]
    pub stale_after: f64,
    /// Maximum number of characters shown in the bar.
    #[clap(long, short, default_value_t = 60)]
    pub max_length: usize,
    /// File to write the log to. If not specified, logs will be written to stderr.
    #[clap(long, short)]
    log_file: Option<String>,
}

impl Args {
    /// Build the tracing subscriber using parameters from the command line arguments
    ///
    /// # Errors
    ///
    /// Returns an error if the log file cannot be created.
    pub fn init_tracing_subscriber(&self) -> Result<()> {
        let builder = tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(EnvFilter::from_default_env());

        match self.log_file.as_ref() {
            None => builder.with_writer(io::stderr).init(),
            Some(f) => builder
                .with_writer(Mutex::new(
                    File::create(f).with_context(|| format!("Failed to create log file {f}"))?,
                ))
                .init(),
        }
        Ok(())
    }

    /// Resolve defaults that depend on the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a duration is negative or not finite, or if the location of the
    /// running executable cannot be determined.
    pub fn config(&self) -> Result<Config> {
        let working_dir = match &self.working_dir {
            Some(dir) => dir.clone(),
            None => install_dir()?,
        };
        let backend = self
            .backend
            .clone()
            .unwrap_or_else(|| working_dir.join(DEFAULT_BACKEND));

        Ok(Config {
            transport: self.transport,
            backend,
            working_dir,
            bus_name: self.bus_name.clone(),
            bus_path: self.bus_path.clone(),
            restart: RestartPolicy {
                max_restarts: self.max_restarts,
                delay: seconds("--restart-delay", self.restart_delay)?,
            },
            stale_after: seconds("--stale-after", self.stale_after)?,
        })
    }
}

fn install_dir() -> Result<PathBuf> {
    let exe = env::current_exe().context("Failed to locate the running executable")?;
    exe.parent()
        .map(PathBuf::from)
        .with_context(|| format!("{} has no parent directory", exe.display()))
}

fn seconds(flag: &str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value).with_context(|| format!("Invalid {flag} {value}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("lyricwatch").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults() {
        let config = parse(&["--working-dir", "/opt/lyricwatch"]).config().unwrap();
        assert_eq!(config.transport, Transport::Both);
        assert_eq!(
            config.backend,
            PathBuf::from("/opt/lyricwatch/music-info-service")
        );
        assert_eq!(config.working_dir, PathBuf::from("/opt/lyricwatch"));
        assert_eq!(config.bus_name, "org.amazzy24128.MusicInfoService");
        assert_eq!(config.bus_path, "/org/amazzy24128/MusicInfoService/Player");
        assert_eq!(config.restart.max_restarts, 0);
        assert_eq!(config.restart.delay, Duration::from_secs(2));
        assert_eq!(config.stale_after, Duration::from_secs(30));
    }

    #[test]
    fn working_dir_defaults_to_install_dir() {
        let config = parse(&[]).config().unwrap();
        let exe = env::current_exe().unwrap();
        assert_eq!(config.working_dir, exe.parent().unwrap());
    }

    #[test]
    fn explicit_backend() {
        let config = parse(&[
            "--transport",
            "pipe",
            "--backend",
            "/usr/libexec/lyric-backend",
            "--max-restarts",
            "3",
            "--restart-delay",
            "0.5",
        ])
        .config()
        .unwrap();
        assert_eq!(config.transport, Transport::Pipe);
        assert_eq!(config.backend, PathBuf::from("/usr/libexec/lyric-backend"));
        assert_eq!(config.restart.max_restarts, 3);
        assert_eq!(config.restart.delay, Duration::from_millis(500));
    }

    #[test]
    fn negative_durations_are_rejected() {
        assert!(parse(&["--stale-after=-1"]).config().is_err());
    }
}
