use std::sync::Arc;
use std::time::Duration;

use beacon_core::Manifest;
use reqwest::Client;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::MonitorError;
use crate::probe::{CheckResult, Probe};
use crate::report::Report;

/// Upper bound for `MonitorOptions::parallel`.
pub const MAX_PARALLEL: usize = 4096;

/// Configuration for a monitor run
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorOptions {
    /// Number of workers, and so the number of requests in flight
    pub parallel: usize,
    /// Budget for each request, body included
    pub timeout: Duration,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            parallel: 16,
            timeout: Duration::from_millis(750),
        }
    }
}

/// Checks every endpoint of a manifest with a fixed pool of workers.
pub struct Monitor {
    options: MonitorOptions,
    client: Client,
}

impl Monitor {
    pub fn new(options: MonitorOptions) -> Result<Self, MonitorError> {
        if options.parallel == 0 || options.parallel > MAX_PARALLEL {
            return Err(MonitorError::Parallelism(options.parallel));
        }
        let client = Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(MonitorError::Client)?;

        Ok(Self { options, client })
    }

    /// Runs one check per endpoint and returns the ordered report.
    ///
    /// Endpoints are fed through a queue of twice the worker count; the
    /// feeder waits while it is full. Check failures never stop the run.
    /// The first fatal error aborts every worker and is returned.
    pub async fn run(&self, manifest: &Manifest) -> Result<Report, MonitorError> {
        let probes = manifest
            .endpoints()
            .iter()
            .map(Probe::new)
            .collect::<Result<Vec<_>, _>>()?;

        // No more workers than there are endpoints to check
        let parallel = self.options.parallel.min(probes.len()).max(1);
        info!(
            endpoints = probes.len(),
            parallel,
            timeout_ms = self.options.timeout.as_millis() as u64,
            "checking endpoints"
        );

        let (work_tx, work_rx) = mpsc::channel::<Probe>(parallel.saturating_mul(2));
        let (result_tx, mut result_rx) = mpsc::channel::<CheckResult>(parallel.saturating_mul(2));
        let work_rx = Arc::new(Mutex::new(work_rx));

        let collector = tokio::spawn(async move {
            let mut results = Vec::new();
            while let Some(result) = result_rx.recv().await {
                results.push(result);
            }
            results
        });

        let mut workers = JoinSet::new();
        for id in 0..parallel {
            workers.spawn(worker(id, self.client.clone(), work_rx.clone(), result_tx.clone()));
        }
        // The collector finishes once every worker has dropped its sender
        drop(result_tx);

        let feeder = tokio::spawn(async move {
            for probe in probes {
                if work_tx.send(probe).await.is_err() {
                    break;
                }
            }
        });

        while let Some(joined) = workers.join_next().await {
            let outcome = joined.map_err(MonitorError::from).and_then(|done| done);
            if let Err(e) = outcome {
                workers.abort_all();
                feeder.abort();
                collector.abort();
                return Err(e);
            }
        }

        feeder.await?;
        let report = Report::new(collector.await?);
        info!(
            checked = report.results().len(),
            failed = report.failures(),
            "checks complete"
        );
        Ok(report)
    }
}

async fn worker(
    id: usize,
    client: Client,
    queue: Arc<Mutex<mpsc::Receiver<Probe>>>,
    results: mpsc::Sender<CheckResult>,
) -> Result<(), MonitorError> {
    loop {
        let next = queue.lock().await.recv().await;
        let Some(probe) = next else {
            break;
        };

        let result = probe.check(&client).await?;
        debug!(worker = id, pass = result.pass, "{result}");
        if results.send(result).await.is_err() {
            break;
        }
    }
    Ok(())
}
