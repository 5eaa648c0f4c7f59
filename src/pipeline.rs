//! Discovery run: scanner task → bounded channel → enricher → result sink.

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::api::{Channel, GroupApi};
use crate::cancel::CancelToken;
use crate::enrich::Enricher;
use crate::result_sink::{ResultSink, SinkTarget};
use crate::scanner::{ScanParams, ScanReport, Scanner};

#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    pub scan: ScanParams,
    pub channel_capacity: usize,
    pub fetch_messages: bool,
}

#[derive(Debug)]
pub struct DiscoverySummary {
    pub scan: ScanReport,
    pub records: usize,
    pub target: SinkTarget,
}

/// Scan and enrich, returning every record gathered.
///
/// The channel is drained until the scanner drops its sender, so candidates
/// already buffered when a cancellation lands still make it into the sink.
pub async fn collect(
    api: Arc<dyn GroupApi>,
    channel: Channel,
    options: DiscoveryOptions,
    cancel: CancelToken,
) -> Result<(ResultSink, ScanReport)> {
    let (tx, mut rx) = mpsc::channel(options.channel_capacity.max(1));
    let start_cursor = options.scan.start_cursor();

    let scanner = Scanner::new(Arc::clone(&api), channel.clone(), options.scan);
    let scan_handle = tokio::spawn(scanner.run(tx, cancel));

    let enricher = Enricher::new(api, channel, options.fetch_messages);
    let mut sink = ResultSink::new();
    while let Some(candidate) = rx.recv().await {
        sink.push(enricher.enrich(candidate).await);
    }
    debug!("Candidate channel closed after {} records", sink.len());

    // Records already drained are kept even if the scanner died
    let report = match scan_handle.await {
        Ok(report) => report,
        Err(e) => {
            error!(
                "Scanner task failed, keeping the {} records gathered so far: {}",
                sink.len(),
                e
            );
            ScanReport::task_failed(start_cursor, sink.len(), e.to_string())
        }
    };
    Ok((sink, report))
}

/// Full discovery run writing the sorted table to `output`
pub async fn run_discovery(
    api: Arc<dyn GroupApi>,
    channel: Channel,
    options: DiscoveryOptions,
    output: &Path,
    cancel: CancelToken,
) -> Result<DiscoverySummary> {
    let (sink, scan) = collect(api, channel, options, cancel).await?;
    let records = sink.len();
    info!("Found {} users, sorting by join date", records);

    let target = sink.finish(output)?;
    Ok(DiscoverySummary {
        scan,
        records,
        target,
    })
}
