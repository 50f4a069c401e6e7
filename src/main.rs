//! # drive-mirror CLI
//!
//! Command-line interface for the drive-mirror library.
//! Mirrors a Google Drive folder tree into an S3 bucket or a local directory.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use drive_mirror::{CollisionPolicy, Credential, MirrorConfig, RunOutcome};
use log::error;

mod cli;

const TOKEN_ENV: &str = "DRIVE_ACCESS_TOKEN";

/// Command-line interface for drive-mirror
#[derive(Parser, Debug)]
#[command(name = "drive-mirror")]
#[command(about = "Mirror a Google Drive folder tree into an S3 bucket")]
#[command(long_about = "Mirrors every file under a Drive folder into S3, keyed by its path:
  drive-mirror <folder-id> --bucket my-backup                 # Mirror into S3
  drive-mirror <folder-id> --local-dir ./backup               # Mirror into a directory
  drive-mirror <folder-id> --dry-run                          # List keys only

The access token is read from --token-file or the DRIVE_ACCESS_TOKEN variable.

Exit status:
  0  every file mirrored
  1  some files failed or were skipped
  2  the run aborted (expired credential, unreadable root, bad arguments)")]
#[command(version = env!("DRIVE_MIRROR_VERSION"))]
struct Cli {
    /// Drive id of the folder (or single file) to mirror
    root: Option<String>,

    /// Destination S3 bucket
    #[arg(long)]
    bucket: Option<String>,

    /// Region of the destination bucket
    #[arg(long)]
    region: Option<String>,

    /// AWS profile used to resolve destination credentials
    #[arg(long)]
    profile: Option<String>,

    /// Maximum number of files transferring at once
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,

    /// Attempts per file before a transient failure is final
    #[arg(long)]
    retry_bound: Option<u32>,

    /// Mirror into a local directory instead of S3
    #[arg(long)]
    local_dir: Option<PathBuf>,

    /// What to do when two nodes map to the same key
    #[arg(long)]
    collision_policy: Option<CollisionPolicy>,

    /// JSON configuration file; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// OAuth token JSON file holding an `access_token` field
    #[arg(long)]
    token_file: Option<PathBuf>,

    /// Override the Drive API base URL
    #[arg(long, hide = true)]
    drive_api_url: Option<String>,

    /// Walk the tree and report keys without transferring anything
    #[arg(long)]
    dry_run: bool,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// Layer command-line flags over the (optional) configuration file
    fn into_config(self) -> anyhow::Result<MirrorConfig> {
        let mut config = match self.config {
            Some(ref path) => MirrorConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => MirrorConfig::default(),
        };

        if let Some(root) = self.root {
            config.root_node_id = root;
        }
        if let Some(bucket) = self.bucket {
            config.destination_bucket = bucket;
        }
        if let Some(region) = self.region {
            config.destination_region = region;
        }
        if self.profile.is_some() {
            config.access_profile = self.profile;
        }
        if let Some(limit) = self.concurrency {
            config.concurrency_limit = limit;
        }
        if let Some(bound) = self.retry_bound {
            config.retry_bound = bound;
        }
        if self.local_dir.is_some() {
            config.local_destination = self.local_dir;
        }
        if let Some(policy) = self.collision_policy {
            config.collision_policy = policy;
        }
        if let Some(url) = self.drive_api_url {
            config.drive_api_url = url;
        }
        config.dry_run |= self.dry_run;

        config.validate()?;
        Ok(config)
    }
}

fn load_credential(token_file: Option<&PathBuf>) -> anyhow::Result<Credential> {
    let credential = match token_file {
        Some(path) => Credential::from_token_file(path)
            .with_context(|| format!("reading token file {}", path.display()))?,
        None => Credential::from_env(TOKEN_ENV)
            .with_context(|| format!("no --token-file given and {TOKEN_ENV} is unusable"))?,
    };
    Ok(credential)
}

#[tokio::main]
async fn main() {
    let code = match run().await {
        Ok(outcome) => outcome.exit_code(),
        Err(e) => {
            error!("❌ Error: {e:#}");
            RunOutcome::TotalFailure.exit_code()
        }
    };
    std::process::exit(code);
}

async fn run() -> anyhow::Result<RunOutcome> {
    let cli = Cli::parse();

    // Initialize logging to stderr
    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .target(env_logger::Target::Stderr)
        .init();

    if cli.verbose {
        eprintln!("📦 drive-mirror v{} starting...", env!("DRIVE_MIRROR_VERSION"));
    }

    let json = cli.json;
    let credential = load_credential(cli.token_file.as_ref())?;
    let config = cli.into_config()?;

    let destination = match config.local_destination {
        Some(ref dir) => dir.display().to_string(),
        None if config.dry_run && config.destination_bucket.is_empty() => "(dry run)".to_string(),
        None => format!("s3://{}", config.destination_bucket),
    };
    let progress = cli::ProgressManager::new(
        &format!("🌐 Mirroring {} into {destination}", config.root_node_id),
        json,
    );

    let summary =
        drive_mirror::mirror_with_progress(&config, credential, Some(progress.callback())).await?;

    progress.finish(match summary.outcome {
        RunOutcome::AllSucceeded => "✅ Mirror completed!",
        RunOutcome::PartialFailure => "⚠️  Mirror completed with failures",
        RunOutcome::TotalFailure => "❌ Mirror aborted",
    });

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print!("{summary}");
    }

    Ok(summary.outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("drive-mirror").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_flags_build_config() {
        let config = parse(&["root123", "--bucket", "backup", "-j", "3", "--retry-bound", "5"])
            .into_config()
            .unwrap();

        assert_eq!(config.root_node_id, "root123");
        assert_eq!(config.destination_bucket, "backup");
        assert_eq!(config.concurrency_limit, 3);
        assert_eq!(config.retry_bound, 5);
        assert_eq!(config.destination_region, "us-east-1");
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mirror.json");
        std::fs::write(
            &path,
            r#"{"root_node_id": "from-file", "destination_bucket": "file-bucket", "collision_policy": "abort"}"#,
        )
        .unwrap();

        let config = parse(&["--config", path.to_str().unwrap(), "--bucket", "flag-bucket"])
            .into_config()
            .unwrap();

        assert_eq!(config.root_node_id, "from-file");
        assert_eq!(config.destination_bucket, "flag-bucket");
        assert_eq!(config.collision_policy, CollisionPolicy::Abort);
    }

    #[test]
    fn test_missing_destination_rejected() {
        assert!(parse(&["root123"]).into_config().is_err());
        assert!(parse(&["root123", "--dry-run"]).into_config().is_ok());
        assert!(parse(&["root123", "--local-dir", "/tmp/out"]).into_config().is_ok());
    }

    #[test]
    fn test_missing_root_rejected() {
        assert!(parse(&["--bucket", "backup"]).into_config().is_err());
    }

    #[test]
    fn test_token_file_credential() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, r#"{"access_token": "ya29.test", "expires_in": 3599}"#).unwrap();

        assert!(load_credential(Some(&path)).is_ok());
        assert!(load_credential(Some(&dir.path().join("missing.json"))).is_err());
    }
}
