//! Human readable rendering of a [`BenchmarkReport`].

use std::fmt;

use bytesize::ByteSize;
use uploadbench_storage::ContainerStatus;
use yansi::Paint;

use crate::benchmark::{BenchmarkReport, Cleanup};

impl fmt::Display for BenchmarkReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self.container_status {
            ContainerStatus::Created => "created",
            ContainerStatus::AlreadyExists => "reused",
        };
        writeln!(
            f,
            "{} {} workers, {} payload, container {} ({status})",
            "UPLOAD:".bold().green(),
            self.worker_count.bold(),
            ByteSize::b(self.payload_size),
            self.container,
        )?;

        let snapshot = &self.snapshot;
        let failed = format!("{} failed", snapshot.failed);
        write!(f, "  {} successful, ", snapshot.successful.bold())?;
        if snapshot.failed > 0 {
            writeln!(f, "{}", failed.bold().red())?;
        } else {
            writeln!(f, "{failed}")?;
        }

        match snapshot.average() {
            Some(avg) => {
                write!(f, "  avg: {:.2?}", avg.bold())?;
                let percentiles = (snapshot.p50, snapshot.p90, snapshot.p99);
                if let (Some(p50), Some(p90), Some(p99)) = percentiles {
                    write!(f, "; p50: {p50:.2?}; p90: {p90:.2?}; p99: {p99:.2?}")?;
                }
                writeln!(f)?;
            }
            None => writeln!(f, "  avg: {}", "undefined".bold().yellow())?,
        }

        write!(f, "  wall time: {:.2?}", self.wall_time)?;
        if let Some(throughput) = self.throughput() {
            write!(f, ", {}/s", ByteSize::b(throughput as u64).bold())?;
        }
        writeln!(f)?;

        match &self.cleanup {
            Cleanup::Deleted => write!(f, "{} container deleted", "CLEANUP:".bold().green()),
            Cleanup::Failed(error) => write!(
                f,
                "{} {}",
                "CLEANUP:".bold().red(),
                format!("container not deleted: {error}").red()
            ),
        }
    }
}
