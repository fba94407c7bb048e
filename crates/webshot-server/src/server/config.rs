use anyhow::bail;
use clap::{Parser, ValueEnum};
use core::num::NonZeroUsize;
use core::time::Duration;
use std::path::PathBuf;
use webshot_core::Printer;

/// Default capacity of the per-requester settings cache.
pub const DEFAULT_SETTINGS_CAPACITY: NonZeroUsize = NonZeroUsize::new(8).unwrap();

/// Default number of requests that may wait in the worker queue.
pub const DEFAULT_QUEUE_CAPACITY: NonZeroUsize = NonZeroUsize::new(64).unwrap();

/// Default number of renders the worker runs at the same time.
pub const DEFAULT_MAX_CONCURRENT_RENDERS: NonZeroUsize = NonZeroUsize::new(1).unwrap();

/// How to treat a new request from a requester whose lock is still live.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AdmissionPolicy {
    /// Accept the request and replace the live lock with a fresh one.
    #[default]
    Overwrite,
    /// Refuse the request with `Error::DuplicateRequest`.
    Reject,
}

/// Runtime configuration for the `webshot-server` binary.
///
/// All values are parsed from CLI arguments or environment variables (a `.env`
/// file is loaded first), with defaults matching the hosted bot.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "webshot-server",
    version,
    about = "Admission and dispatch service for website screenshots"
)]
pub struct CliArgs {
    /// Seconds a requester stays locked after a scrolling render is admitted.
    ///
    /// Environment variable: `REQUEST_TIMEOUT`
    #[arg(long, env = "REQUEST_TIMEOUT", default_value_t = 30)]
    pub request_timeout: u64,

    /// Seconds a requester stays locked after a non-scrolling render is
    /// admitted.
    ///
    /// Environment variable: `QUICK_RELEASE_TIMEOUT`
    #[arg(long, env = "QUICK_RELEASE_TIMEOUT", default_value_t = 2)]
    pub quick_release_timeout: u64,

    /// Number of requesters whose preferences are remembered.
    ///
    /// Environment variable: `SETTINGS_CACHE_SIZE`
    #[arg(long, env = "SETTINGS_CACHE_SIZE", default_value_t = 8)]
    pub settings_cache_size: usize,

    /// Requests allowed to wait for the worker before new ones are rejected.
    ///
    /// Environment variable: `QUEUE_CAPACITY`
    #[arg(long, env = "QUEUE_CAPACITY", default_value_t = 64)]
    pub queue_capacity: usize,

    /// Renders executed concurrently by the worker.
    ///
    /// Environment variable: `MAX_CONCURRENT_RENDERS`
    #[arg(long, env = "MAX_CONCURRENT_RENDERS", default_value_t = 1)]
    pub max_concurrent_renders: usize,

    /// What to do when a requester submits again while still locked.
    ///
    /// Environment variable: `ADMISSION_POLICY`
    #[arg(long, env = "ADMISSION_POLICY", value_enum, default_value_t = AdmissionPolicy::Overwrite)]
    pub admission_policy: AdmissionPolicy,

    /// Destination the log file is archived to on shutdown. Archival is
    /// skipped when unset.
    ///
    /// Environment variable: `LOG_GROUP`
    #[arg(long, env = "LOG_GROUP")]
    pub log_group: Option<String>,

    /// Log file written during the run and archived on shutdown.
    ///
    /// Environment variable: `LOG_FILE`
    #[arg(long, env = "LOG_FILE", default_value = "debug.log")]
    pub log_file: PathBuf,

    /// Scratch directory for render artifacts, removed on shutdown.
    ///
    /// Environment variable: `WORK_DIR`
    #[arg(long, env = "WORK_DIR", default_value = "./FILES")]
    pub work_dir: PathBuf,

    /// Program invoked once per render.
    ///
    /// Environment variable: `RENDER_COMMAND`
    #[arg(long, env = "RENDER_COMMAND", default_value = "webshot-render")]
    pub render_command: String,

    /// Seconds a single render may run before it is killed.
    ///
    /// Environment variable: `RENDER_TIMEOUT`
    #[arg(long, env = "RENDER_TIMEOUT", default_value_t = 60)]
    pub render_timeout: u64,
}

/// Validated settings for the admission core.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub request_timeout: Duration,
    pub quick_release_timeout: Duration,
    pub settings_capacity: NonZeroUsize,
    pub queue_capacity: NonZeroUsize,
    pub max_concurrent_renders: NonZeroUsize,
    pub admission_policy: AdmissionPolicy,
    pub log_group: Option<String>,
    pub log_file: PathBuf,
    pub work_dir: PathBuf,
}

impl SupervisorConfig {
    /// How long a requester stays locked after `printer` is admitted.
    ///
    /// Scrolling renders legitimately take long, so they hold the lock for the
    /// full request timeout; everything else frees the slot quickly.
    pub fn release_after(&self, printer: &Printer) -> Duration {
        if printer.scroll_control() {
            self.request_timeout
        } else {
            self.quick_release_timeout
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            quick_release_timeout: Duration::from_secs(2),
            settings_capacity: DEFAULT_SETTINGS_CAPACITY,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_concurrent_renders: DEFAULT_MAX_CONCURRENT_RENDERS,
            admission_policy: AdmissionPolicy::default(),
            log_group: None,
            log_file: PathBuf::from("debug.log"),
            work_dir: PathBuf::from("./FILES"),
        }
    }
}

/// Settings for [`CommandRenderer`](crate::server::engine::CommandRenderer).
#[derive(Debug, Clone)]
pub struct RendererConfig {
    pub program: String,
    pub work_dir: PathBuf,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub supervisor: SupervisorConfig,
    pub renderer: RendererConfig,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let Some(settings_capacity) = NonZeroUsize::new(args.settings_cache_size) else {
            bail!("SETTINGS_CACHE_SIZE must be greater than 0");
        };
        let Some(queue_capacity) = NonZeroUsize::new(args.queue_capacity) else {
            bail!("QUEUE_CAPACITY must be greater than 0");
        };
        let Some(max_concurrent_renders) = NonZeroUsize::new(args.max_concurrent_renders) else {
            bail!("MAX_CONCURRENT_RENDERS must be greater than 0");
        };

        if args.request_timeout == 0 {
            bail!("REQUEST_TIMEOUT must be greater than 0");
        }

        if args.render_timeout == 0 {
            bail!("RENDER_TIMEOUT must be greater than 0");
        }

        if args.render_command.trim().is_empty() {
            bail!("RENDER_COMMAND must not be empty");
        }

        let log_group = args.log_group.filter(|group| !group.trim().is_empty());

        Ok(Self {
            supervisor: SupervisorConfig {
                request_timeout: Duration::from_secs(args.request_timeout),
                quick_release_timeout: Duration::from_secs(args.quick_release_timeout),
                settings_capacity,
                queue_capacity,
                max_concurrent_renders,
                admission_policy: args.admission_policy,
                log_group,
                log_file: args.log_file,
                work_dir: args.work_dir.clone(),
            },
            renderer: RendererConfig {
                program: args.render_command,
                work_dir: args.work_dir,
                timeout: Duration::from_secs(args.render_timeout),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> anyhow::Result<ServerConfig> {
        let argv = core::iter::once("webshot-server").chain(extra.iter().copied());
        ServerConfig::try_from(CliArgs::try_parse_from(argv)?)
    }

    #[test]
    fn defaults_match_hosted_bot() {
        let config = parse(&[]).unwrap();
        let sup = config.supervisor;
        assert_eq!(sup.request_timeout, Duration::from_secs(30));
        assert_eq!(sup.quick_release_timeout, Duration::from_secs(2));
        assert_eq!(sup.settings_capacity.get(), 8);
        assert_eq!(sup.admission_policy, AdmissionPolicy::Overwrite);
        assert_eq!(sup.log_file, PathBuf::from("debug.log"));
        assert_eq!(config.renderer.work_dir, sup.work_dir);
    }

    #[test]
    fn zero_sizes_are_rejected() {
        assert!(parse(&["--settings-cache-size", "0"]).is_err());
        assert!(parse(&["--queue-capacity", "0"]).is_err());
        assert!(parse(&["--max-concurrent-renders", "0"]).is_err());
        assert!(parse(&["--request-timeout", "0"]).is_err());
    }

    #[test]
    fn blank_log_group_disables_archival() {
        let config = parse(&["--log-group", "  "]).unwrap();
        assert_eq!(config.supervisor.log_group, None);

        let config = parse(&["--log-group", "/var/log/webshot", "--admission-policy", "reject"])
            .unwrap();
        assert_eq!(
            config.supervisor.log_group.as_deref(),
            Some("/var/log/webshot")
        );
        assert_eq!(config.supervisor.admission_policy, AdmissionPolicy::Reject);
    }

    #[test]
    fn scroll_control_selects_the_full_timeout() {
        let config = SupervisorConfig {
            request_timeout: Duration::from_secs(45),
            ..SupervisorConfig::default()
        };
        let quick = Printer::new("example.com");
        let scroll = Printer::new("example.com").with_scroll_control(true);
        assert_eq!(config.release_after(&quick), Duration::from_secs(2));
        assert_eq!(config.release_after(&scroll), Duration::from_secs(45));
    }
}
