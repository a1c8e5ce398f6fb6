//! Pass-through stage with its own staleness rule.
//!
//! The gate remembers, through a [`ClockStore`], when its pipeline last
//! committed. It reports dirty when it has never run or when any file input
//! was modified after that time, independent of what storage holds.

use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

use crate::artifact::ArtifactSet;
use crate::clock::ClockStore;
use crate::error::Result;
use crate::fingerprint::StageFingerprint;

use super::{StageContext, Transform};

/// Clock-gated pass-through stage.
#[derive(Debug)]
pub struct WatchGate {
    watcher_id: String,
    clock: Box<dyn ClockStore>,
}

impl WatchGate {
    /// Create a gate recording under `watcher_id` in `clock`.
    pub fn new(watcher_id: impl Into<String>, clock: Box<dyn ClockStore>) -> Self {
        Self { watcher_id: watcher_id.into(), clock }
    }

    /// Key used in the clock store.
    pub fn watcher_id(&self) -> &str {
        &self.watcher_id
    }
}

fn modified(path: &std::path::Path) -> Option<SystemTime> {
    std::fs::metadata(path).ok()?.modified().ok()
}

impl Transform for WatchGate {
    fn kind(&self) -> &str {
        "watch"
    }

    fn fingerprint(&self) -> String {
        StageFingerprint::new("Watch").arg(&self.watcher_id).finish()
    }

    fn predict(&self, _ctx: &StageContext<'_>, names: Vec<String>) -> Result<Vec<String>> {
        Ok(names)
    }

    fn execute(&self, _ctx: &StageContext<'_>, artifacts: ArtifactSet) -> Result<ArtifactSet> {
        Ok(artifacts)
    }

    fn is_dirty(&self, ctx: &StageContext<'_>) -> Result<bool> {
        let Some(last_run) = self.clock.get(&self.watcher_id)? else {
            debug!(watcher = %self.watcher_id, "no recorded run");
            return Ok(true);
        };

        for input in ctx.inputs.iter().filter(|i| i.is_file()) {
            let path = input.resolve(ctx.root);
            // A vanished input is a change too; execute will report it.
            let changed = modified(&path).map_or(true, |m| m > last_run);
            if changed {
                debug!(
                    watcher = %self.watcher_id,
                    input = input.name(),
                    last_run = last_run.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0),
                    "input changed since last run"
                );
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn on_commit(&mut self, ctx: &StageContext<'_>) -> Result<()> {
        self.clock.set(&self.watcher_id, ctx.started)?;
        Ok(())
    }
}
