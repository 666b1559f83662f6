// Periodic snapshot archiver: writes account state to a CSV file on an
// interval so there's a durable record for offline analysis. Writes go
// through a tmp file plus rename so a reader never observes a partial
// file.

use crate::broker::PaperBroker;
use crate::trader::PositionTracker;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub struct Exporter {
    dir: PathBuf,
    broker: Arc<PaperBroker>,
    position_tracker: Arc<PositionTracker>,
}

impl Exporter {
    pub fn new(dir: PathBuf, broker: Arc<PaperBroker>, position_tracker: Arc<PositionTracker>) -> Self {
        Self {
            dir,
            broker,
            position_tracker,
        }
    }

    pub async fn run(self: Arc<Self>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.write_snapshot() {
                        tracing::warn!(error = %e, "exporter snapshot write failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    fn write_snapshot(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join("account_snapshot.csv");
        let tmp = path.with_extension("csv.tmp");
        let mut writer = csv::Writer::from_path(&tmp)?;
        writer.write_record(["cash_balance", "position", "avg_price"])?;
        writer.write_record([
            self.broker.cash_balance().to_string(),
            self.broker.position().to_string(),
            self.position_tracker.avg_price().to_string(),
        ])?;
        writer.flush()?;
        drop(writer);
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigSnapshot, ConfigStore};
    use crate::events::EventBus;
    use crate::trader::OrderTracker;

    #[test]
    fn write_snapshot_creates_the_archive_file() {
        let dir = std::env::temp_dir().join(format!("aurora-autotrade-export-{}", uuid::Uuid::new_v4()));
        let events = Arc::new(EventBus::new());
        let broker = Arc::new(PaperBroker::new("BTC-USD", 10_000.0, events));
        let config = Arc::new(ConfigStore::new("unused.json", ConfigSnapshot::default()));
        let position_tracker = Arc::new(PositionTracker::new(
            10_000.0,
            1.0,
            Arc::new(OrderTracker::new()),
            config,
        ));
        let exporter = Exporter::new(dir.clone(), broker, position_tracker);
        exporter.write_snapshot().unwrap();
        assert!(dir.join("account_snapshot.csv").exists());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
