use std::path::PathBuf;

use anyhow::{Context, Result};
use argh::FromArgs;
use uploadbench_storage::{AzureBlobStorage, BoxedStorage};

use crate::config::{Config, Overrides};
use crate::{benchmark, observability};

/// Measure the latency of concurrent uploads to an Azure Blob storage account.
///
/// All options can also be set in the configuration file or via `UB__` environment variables.
/// Flags take precedence over both.
#[derive(Debug, FromArgs)]
struct Args {
    /// path to the YAML configuration file
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// name of the storage account
    #[argh(option)]
    account_name: Option<String>,

    /// base64 encoded access key of the storage account
    #[argh(option)]
    access_key: Option<String>,

    /// base address of the storage service, e.g. core.windows.net
    #[argh(option)]
    base_service_url: Option<String>,

    /// storage REST API version [default: 2015-04-05]
    #[argh(option)]
    api_version: Option<String>,

    /// prefix of the container and object names [default: bench]
    #[argh(option)]
    name_prefix: Option<String>,

    /// number of concurrent uploads [default: 10]
    #[argh(option)]
    worker_count: Option<usize>,

    /// payload size in KiB, at most 262144 [default: 10]
    #[argh(option)]
    payload_kib: Option<u64>,

    /// explicit blob endpoint, e.g. of a local emulator
    #[argh(option)]
    endpoint: Option<String>,

    /// seed for generating names and the payload
    #[argh(option)]
    seed: Option<u64>,

    /// print the version and exit
    #[argh(switch)]
    version: bool,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            account_name: self.account_name.clone(),
            access_key: self.access_key.clone(),
            base_service_url: self.base_service_url.clone(),
            api_version: self.api_version.clone(),
            name_prefix: self.name_prefix.clone(),
            worker_count: self.worker_count,
            payload_kib: self.payload_kib,
            endpoint: self.endpoint.clone(),
            seed: self.seed,
        }
    }
}

/// Bootstrap the runtime and run the benchmark.
///
/// Returns an error if the run was aborted. A failed cleanup is part of the printed report and
/// does not fail the command.
pub fn execute() -> Result<()> {
    let args: Args = argh::from_env();

    if args.version {
        println!("uploadbench {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = Config::load(args.config.as_deref(), args.overrides())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("bench-rt")
        .enable_all()
        .worker_threads(config.runtime.worker_threads.max(1))
        .build()?;
    let _runtime_guard = runtime.enter();

    observability::init_tracing(&config);
    tracing::debug!(?config);

    let settings = config.benchmark_settings();
    let storage_config = config.storage_config();
    let connect = move || -> uploadbench_storage::StorageResult<BoxedStorage> {
        let storage = AzureBlobStorage::connect(storage_config)?;
        tracing::info!(endpoint = %storage.endpoint(), "Using blob endpoint");
        Ok(Box::new(storage))
    };

    let report = runtime
        .block_on(benchmark::run(&settings, connect))
        .context("benchmark aborted")?;

    println!("{report}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_become_overrides() {
        let args = Args::from_args(
            &["uploadbench"],
            &[
                "--account-name",
                "benchaccount",
                "--worker-count",
                "50",
                "--payload-kib",
                "1024",
                "-c",
                "bench.yml",
            ],
        )
        .unwrap();

        let overrides = args.overrides();
        assert_eq!(args.config, Some(PathBuf::from("bench.yml")));
        assert_eq!(overrides.account_name.as_deref(), Some("benchaccount"));
        assert_eq!(overrides.worker_count, Some(50));
        assert_eq!(overrides.payload_kib, Some(1024));
        assert_eq!(overrides.access_key, None);
        assert_eq!(overrides.seed, None);
    }

    #[test]
    fn rejects_invalid_numbers() {
        assert!(Args::from_args(&["uploadbench"], &["--worker-count", "many"]).is_err());
    }
}
