use crate::config::CleanupConfig;
use crate::error::ApiResult;
use crate::pin::{self, PinConflict};
use crate::transport::{command_with_arg, ApiTransport};
use crate::verify::VerifyStream;
use tracing::{info, warn};

/// How the removal of one orphaned block ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemovalStatus {
    Removed,
    GivenUp(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovalOutcome {
    pub cid: String,
    pub status: RemovalStatus,
    /// Pins removed while unwinding, in order.
    pub unpinned: Vec<String>,
    pub unpin_failures: u32,
}

impl RemovalOutcome {
    pub fn is_removed(&self) -> bool {
        self.status == RemovalStatus::Removed
    }
}

/// Totals for one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub records_seen: u64,
    pub orphans_found: u64,
    pub blocks_removed: u64,
    pub blocks_given_up: u64,
    pub pins_removed: u64,
    pub pin_removals_failed: u64,
    pub decode_failures: u64,
    /// Set when the verify stream broke before the node closed it.
    pub interrupted: Option<String>,
}

impl SweepReport {
    fn record(&mut self, outcome: &RemovalOutcome) {
        match outcome.status {
            RemovalStatus::Removed => self.blocks_removed += 1,
            RemovalStatus::GivenUp(_) => self.blocks_given_up += 1,
        }
        self.pins_removed += outcome.unpinned.len() as u64;
        self.pin_removals_failed += u64::from(outcome.unpin_failures);
    }
}

enum RemovalState {
    Attempt,
    UnpinAndRetry(String),
    Done,
    GivenUp(String),
}

/// Walks the verify stream once and removes every block whose backing file
/// is gone.
pub struct Sweeper<'a, T: ApiTransport + ?Sized> {
    transport: &'a T,
    config: &'a CleanupConfig,
}

impl<'a, T: ApiTransport + ?Sized> Sweeper<'a, T> {
    pub fn new(transport: &'a T, config: &'a CleanupConfig) -> Self {
        Self { transport, config }
    }

    /// Runs one full sweep. Only failing to open the verify stream is an
    /// error; per-block failures are logged and counted.
    pub async fn run(&self) -> ApiResult<SweepReport> {
        if self.config.verbose {
            info!("Removing blocks that point to a file that doesn't exist from filestore...");
        }

        let mut stream = VerifyStream::open(self.transport).await?;
        let mut report = SweepReport::default();

        loop {
            let record = match stream.next_record().await {
                Ok(Some(record)) => record,
                Ok(None) => break,
                Err(e) => {
                    warn!("filestore/verify stream broke off: {}", e);
                    report.interrupted = Some(e.to_string());
                    break;
                }
            };
            report.records_seen += 1;

            if !record.is_orphaned() {
                continue;
            }
            report.orphans_found += 1;

            if self.config.verbose && !record.file_path.is_empty() {
                info!("{} references missing file {}", record.cid(), record.file_path);
            }
            let outcome = self.remove_orphan(record.cid()).await;
            report.record(&outcome);
        }

        report.decode_failures = stream.decode_failures();
        if self.config.verbose {
            info!(
                "Sweep finished: {} entries checked, {} orphaned, {} removed",
                report.records_seen, report.orphans_found, report.blocks_removed
            );
        }
        Ok(report)
    }

    /// Removes one block, unpinning it first whenever the node refuses
    /// because of a pin.
    pub async fn remove_orphan(&self, cid: &str) -> RemovalOutcome {
        info!("Removing reference from filestore: {}", cid);

        let block_rm = command_with_arg("block/rm", cid);
        let limit = self.config.unpin_limit();
        let mut rounds = 0u32;
        let mut unpinned = Vec::new();
        let mut unpin_failures = 0u32;
        let mut state = RemovalState::Attempt;

        loop {
            state = match state {
                RemovalState::Attempt => {
                    match self.transport.request(self.config.call_timeout(), &block_rm).await {
                        Ok(_) => RemovalState::Done,
                        Err(e) => match e.api_message().map(pin::parse_conflict) {
                            Some(PinConflict::Pinned(pin)) => RemovalState::UnpinAndRetry(pin),
                            Some(PinConflict::Unparsable) => RemovalState::GivenUp(format!(
                                "pinned, but no pin could be read from \"{}\"",
                                e
                            )),
                            Some(PinConflict::None) | None => RemovalState::GivenUp(e.to_string()),
                        },
                    }
                }
                RemovalState::UnpinAndRetry(pin) => match limit {
                    Some(limit) if rounds >= limit => RemovalState::GivenUp(format!(
                        "still pinned by {} after {} unpin attempts",
                        pin, rounds
                    )),
                    _ => {
                        rounds += 1;
                        info!("Affected block is pinned, removing pin: {}", pin);
                        let pin_rm = command_with_arg("pin/rm", &pin);
                        match self.transport.request(None, &pin_rm).await {
                            Ok(_) => unpinned.push(pin),
                            Err(e) => {
                                warn!("Error removing pin {}: {}", pin, e);
                                unpin_failures += 1;
                            }
                        }
                        RemovalState::Attempt
                    }
                },
                RemovalState::Done => {
                    if self.config.verbose {
                        info!("Removed block {}", cid);
                    }
                    return RemovalOutcome {
                        cid: cid.to_string(),
                        status: RemovalStatus::Removed,
                        unpinned,
                        unpin_failures,
                    };
                }
                RemovalState::GivenUp(reason) => {
                    warn!("Error removing bad block {}: {}", cid, reason);
                    return RemovalOutcome {
                        cid: cid.to_string(),
                        status: RemovalStatus::GivenUp(reason),
                        unpinned,
                        unpin_failures,
                    };
                }
            };
        }
    }
}
