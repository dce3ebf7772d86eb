// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use redqueue_app::{AppConfig, tasks::TaskConfig};
use redqueue_common_storage_queue::{
    DEFAULT_ROTATE_THRESHOLD, DurabilityMode, JournalFile, QueueConfig, RotationPolicy,
    path::scan_journal_dir, recovery,
};
use redqueue_common_telemetry::{LogFormat, LoggingOptions};
use redqueue_server::MemcacheServerConfig;
use snafu::{ResultExt, Whatever, ensure_whatever};

mod build_info;

#[derive(Debug, Parser)]
#[clap(
name = "redqueue",
about = "A message queue broker speaking the memcache text protocol",
author = build_info::AUTHOR,
version = build_info::FULL_VERSION,
long_version = build_info::LONG_VERSION)]
struct Cli {
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Server(ServerArgs),
    Inspect(InspectArgs),
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Starts the redqueue broker.
Examples:

redqueue server --port 11211 --jdir /var/lib/redqueue
redqueue server --reliable sync --logdir /var/log/redqueue

")]
struct ServerArgs {
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host:             String,
    /// Port to bind
    #[arg(long, default_value_t = 11211)]
    port:             u16,
    /// Journal directory, must exist
    #[arg(long, default_value = "journal")]
    jdir:             PathBuf,
    /// Journal durability: no/none, yes/buffered or sync
    #[arg(long, default_value = "yes")]
    reliable:         DurabilityMode,
    /// Journal size in bytes after which an idle queue rotates
    #[arg(long, default_value_t = DEFAULT_ROTATE_THRESHOLD)]
    rotate_threshold: u64,
    /// Delete rotated journals instead of archiving them
    #[arg(long)]
    no_archive:       bool,
    /// Directory for rolling log files, stdout only when empty
    #[arg(long, default_value = "")]
    logdir:           String,
    /// Log filter such as `info` or `redqueue_server=debug`, defaults to
    /// RUST_LOG then `info`
    #[arg(long)]
    log_level:        Option<String>,
    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format:       LogFormat,
    /// Do not run the background task runner
    #[arg(long)]
    no_tasks:         bool,
}

impl ServerArgs {
    fn config(&self) -> AppConfig {
        AppConfig::builder()
            .memcache(
                MemcacheServerConfig::builder()
                    .bind_address(format!("{}:{}", self.host, self.port))
                    .build(),
            )
            .queue(QueueConfig {
                journal_dir: self.jdir.clone(),
                durability: self.reliable,
                rotation: RotationPolicy {
                    threshold: self.rotate_threshold,
                    archive:   !self.no_archive,
                },
                ..QueueConfig::default()
            })
            .logging(
                LoggingOptions::builder()
                    .dir(self.logdir.clone())
                    .maybe_level(self.log_level.clone())
                    .log_format(self.log_format)
                    .build(),
            )
            .tasks(TaskConfig::builder().enabled(!self.no_tasks).build())
            .build()
    }

    async fn run(&self) -> Result<(), Whatever> { self.config().open().run().await }
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Replays every live journal without modifying it and prints one line per
queue: key, ready entries, borrows that would be returned, file size.
Examples:

redqueue inspect --jdir /var/lib/redqueue

")]
struct InspectArgs {
    /// Journal directory
    #[arg(long, default_value = "journal")]
    jdir: PathBuf,
}

impl InspectArgs {
    #[allow(clippy::print_stdout)]
    fn run(&self) -> Result<(), Whatever> {
        ensure_whatever!(
            self.jdir.is_dir(),
            "Journal directory {} does not exist",
            self.jdir.display()
        );
        let files = scan_journal_dir(&self.jdir)
            .with_whatever_context(|_| format!("Failed to scan {}", self.jdir.display()))?;

        println!("{:<40} {:>10} {:>10} {:>12}", "KEY", "READY", "ORPHANED", "BYTES");
        for (kind, path) in files {
            let JournalFile::Live { key } = kind else {
                continue;
            };
            let info = recovery::replay(&path)
                .with_whatever_context(|_| format!("Failed to replay {}", path.display()))?;
            let size = std::fs::metadata(&path)
                .with_whatever_context(|_| format!("Failed to stat {}", path.display()))?
                .len();
            let torn = if info.truncated { " (torn tail)" } else { "" };
            println!(
                "{key:<40} {:>10} {:>10} {size:>12}{torn}",
                info.ready.len(),
                info.orphaned
            );
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Whatever> {
    human_panic::setup_panic!();

    let cli = Cli::parse();
    match cli.commands {
        Commands::Server(args) => args.run().await,
        Commands::Inspect(args) => args.run(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_args(argv: &[&str]) -> ServerArgs {
        let cli = Cli::try_parse_from(["redqueue", "server"].iter().chain(argv)).unwrap();
        match cli.commands {
            Commands::Server(args) => args,
            Commands::Inspect(_) => panic!("expected server arguments"),
        }
    }

    #[test]
    fn test_server_defaults() {
        let config = server_args(&[]).config();
        assert_eq!(config.memcache.bind_address, "0.0.0.0:11211");
        assert_eq!(config.queue.journal_dir, PathBuf::from("journal"));
        assert_eq!(config.queue.durability, DurabilityMode::Buffered);
        assert!(config.queue.rotation.archive);
        assert!(config.tasks.enabled);
        assert_eq!(config.logging.log_format, LogFormat::Text);
        assert!(config.logging.dir.is_empty());
    }

    #[test]
    fn test_server_flags() {
        let config = server_args(&[
            "--host",
            "127.0.0.1",
            "--port",
            "22122",
            "--reliable",
            "no",
            "--rotate-threshold",
            "4096",
            "--no-archive",
            "--log-format",
            "json",
            "--log-level",
            "debug",
            "--no-tasks",
        ])
        .config();
        assert_eq!(config.memcache.bind_address, "127.0.0.1:22122");
        assert_eq!(config.queue.durability, DurabilityMode::None);
        assert_eq!(config.queue.rotation.threshold, 4096);
        assert!(!config.queue.rotation.archive);
        assert_eq!(config.logging.log_format, LogFormat::Json);
        assert_eq!(config.logging.level.as_deref(), Some("debug"));
        assert!(!config.tasks.enabled);
    }

    #[test]
    fn test_rejects_unknown_durability() {
        assert!(Cli::try_parse_from(["redqueue", "server", "--reliable", "maybe"]).is_err());
    }
}
