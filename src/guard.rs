use log::warn;
use serde::{Deserialize, Serialize};

use crate::data::model::LoadMode;
use crate::error::LoadError;

/// Whether the process runs under a hard memory ceiling (hosted deployment)
/// or somewhere a whole-table load is affordable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionContext {
    #[default]
    Constrained,
    Relaxed,
}

/// Policy consulted before a load runs. Built once at startup and never
/// changed afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvironmentGuard {
    context: ExecutionContext,
}

impl EnvironmentGuard {
    pub fn new(context: ExecutionContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> ExecutionContext {
        self.context
    }

    /// `full` is refused under a memory ceiling; the projected modes always pass.
    pub fn check(&self, mode: LoadMode) -> Result<(), LoadError> {
        match (mode, self.context) {
            (LoadMode::Full, ExecutionContext::Constrained) => {
                warn!("refusing full load in a memory-constrained context");
                Err(LoadError::ModeDisallowed {
                    mode,
                    reason: "execution context is memory-constrained; use essential or neighborhood mode"
                        .into(),
                })
            }
            _ => Ok(()),
        }
    }
}

impl Default for EnvironmentGuard {
    fn default() -> Self {
        Self::new(ExecutionContext::default())
    }
}
