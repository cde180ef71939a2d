//! Two-phase synchronous barrier: every module is initialized before any
//! module is configured.
//!
//! The barrier is a typestate. `configure_all` only exists on a barrier that
//! has passed `initialize_all`, so the ordering cannot be bypassed:
//!
//! ```rust,ignore
//! PhaseBarrier::new(&records).initialize_all()?.configure_all()?;
//! ```

use std::marker::PhantomData;

use mosaic_core::{BoxError, CompositeError, CompositeResult, ErrorCode, LifecyclePhase, ModuleState};
use tracing::{debug, error};

use crate::plugin_set::ModuleRecord;

/// Barrier state before any hook ran.
#[derive(Debug)]
pub struct Pending;

/// Barrier state after every module was initialized.
#[derive(Debug)]
pub struct Initialized;

/// Barrier state after every module was configured.
#[derive(Debug)]
pub struct Configured;

/// Drives the synchronous initialize and configure hooks across all modules.
#[derive(Debug)]
pub struct PhaseBarrier<'a, S> {
    records: &'a [ModuleRecord],
    _state: PhantomData<S>,
}

impl<'a> PhaseBarrier<'a, Pending> {
    /// Creates a barrier over `records`, which must already be in tier order.
    pub fn new(records: &'a [ModuleRecord]) -> Self {
        Self {
            records,
            _state: PhantomData,
        }
    }

    /// Runs `initialize` on every module, Core → App → Host.
    pub fn initialize_all(self) -> CompositeResult<PhaseBarrier<'a, Initialized>> {
        run_phase(
            self.records,
            LifecyclePhase::Initialize,
            ModuleState::Initialized,
            ErrorCode::ModuleInitializeFailed,
            |record| record.module.initialize(&record.ctx),
        )?;
        Ok(PhaseBarrier {
            records: self.records,
            _state: PhantomData,
        })
    }
}

impl<'a> PhaseBarrier<'a, Initialized> {
    /// Runs `configure` on every module, Core → App → Host.
    pub fn configure_all(self) -> CompositeResult<PhaseBarrier<'a, Configured>> {
        run_phase(
            self.records,
            LifecyclePhase::Configure,
            ModuleState::Configured,
            ErrorCode::ModuleConfigureFailed,
            |record| record.module.configure(&record.ctx),
        )?;
        Ok(PhaseBarrier {
            records: self.records,
            _state: PhantomData,
        })
    }
}

impl PhaseBarrier<'_, Configured> {
    /// Number of modules that passed both phases.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn run_phase(
    records: &[ModuleRecord],
    phase: LifecyclePhase,
    reached: ModuleState,
    code: ErrorCode,
    hook: impl Fn(&ModuleRecord) -> Result<(), BoxError>,
) -> CompositeResult<()> {
    for record in records {
        let _entered = record.ctx.span().enter();
        if let Err(e) = hook(record) {
            error!(phase = %phase, error = %e, "Module hook failed");
            let _ = record.ctx.advance(ModuleState::Faulted);
            return Err(CompositeError::composition(
                code,
                format!(
                    "module '{}' of plugin '{}' failed to {phase}",
                    record.name, record.plugin
                ),
            )
            .with_details(vec![record.plugin.to_string(), record.name.to_string()])
            .with_source(e));
        }
        record.ctx.advance(reached)?;
        debug!(phase = %phase, "Module hook completed");
    }
    Ok(())
}
