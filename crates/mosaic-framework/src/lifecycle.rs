//! Concurrent fan-out of the asynchronous lifecycle hooks.
//!
//! One tokio task is spawned per module and the caller waits for all of them
//! (`join_all`) before moving on, which gives the tier barrier. A failing or
//! panicking task never cancels its siblings; every failure is returned as a
//! [`ModuleFault`]. Dropping the fan-out future aborts the tasks still in
//! flight, and their modules keep the state they had before the hook.

use std::sync::Arc;

use futures::future;
use mosaic_core::{BoxError, LifecyclePhase, ModuleFault, ModuleState, ServiceScope};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{Instrument, debug, error, warn};

use crate::plugin_set::ModuleRecord;

/// The asynchronous hooks driven by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncPhase {
    Start,
    Run,
    Stop,
}

impl AsyncPhase {
    pub fn lifecycle(self) -> LifecyclePhase {
        match self {
            AsyncPhase::Start => LifecyclePhase::Start,
            AsyncPhase::Run => LifecyclePhase::Run,
            AsyncPhase::Stop => LifecyclePhase::Stop,
        }
    }

    /// State a module reaches when the hook succeeds.
    fn reached(self) -> ModuleState {
        match self {
            AsyncPhase::Start => ModuleState::Started,
            AsyncPhase::Run => ModuleState::Running,
            AsyncPhase::Stop => ModuleState::Stopped,
        }
    }

    /// State a module is left in when the hook fails. A failed run keeps the
    /// module started so it is still stopped later.
    fn failed(self) -> Option<ModuleState> {
        match self {
            AsyncPhase::Start | AsyncPhase::Stop => Some(ModuleState::Faulted),
            AsyncPhase::Run => None,
        }
    }
}

/// Aborts the wrapped tasks when dropped. Aborting a finished task is a no-op.
struct AbortOnDrop(Vec<AbortHandle>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

/// Runs `phase` on every record concurrently and waits for all of them.
pub async fn fan_out(records: &[ModuleRecord], phase: AsyncPhase, scope: Arc<ServiceScope>) -> Vec<ModuleFault> {
    let handles: Vec<JoinHandle<Result<(), BoxError>>> = records
        .iter()
        .map(|record| {
            let module = Arc::clone(&record.module);
            let ctx = Arc::clone(&record.ctx);
            let scope = Arc::clone(&scope);
            let span = record.ctx.span().clone();
            tokio::spawn(
                async move {
                    match phase {
                        AsyncPhase::Start => module.start(&ctx, &scope).await,
                        AsyncPhase::Run => module.run(&ctx, &scope).await,
                        AsyncPhase::Stop => module.stop(&ctx, &scope).await,
                    }
                }
                .instrument(span),
            )
        })
        .collect();
    let _abort = AbortOnDrop(handles.iter().map(JoinHandle::abort_handle).collect());
    let results = future::join_all(handles).await;

    let mut faults = Vec::new();
    for (record, joined) in records.iter().zip(results) {
        let outcome: Result<(), BoxError> = match joined {
            Ok(result) => result,
            Err(join_error) => Err(Box::new(join_error)),
        };
        let _entered = record.ctx.span().enter();
        match outcome {
            Ok(()) => {
                if let Err(e) = record.ctx.advance(phase.reached()) {
                    warn!(error = %e, "Unexpected module state after hook");
                }
                debug!(phase = %phase.lifecycle(), "Module hook completed");
            }
            Err(e) => {
                error!(phase = %phase.lifecycle(), error = %e, "Module hook failed");
                if let Some(state) = phase.failed() {
                    let _ = record.ctx.advance(state);
                }
                faults.push(ModuleFault {
                    plugin: record.plugin.clone(),
                    module: record.name.to_string(),
                    phase: phase.lifecycle(),
                    error: e,
                });
            }
        }
    }
    faults
}
