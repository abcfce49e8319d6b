//! Per-tool store of runout compensations.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::model::RunoutCompensation;
use super::RecalibrationTrigger;
use crate::config::ConfigError;
use crate::geometry::Pose;

/// Runout compensation per nozzle, keyed by [`Movable::id`](crate::machine::Movable::id).
///
/// A missing entry means "uncalibrated". The table is an owned value: the
/// motion layer reads snapshots, calibrations write through `&mut`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompensationTable {
    models: BTreeMap<String, RunoutCompensation>,
}

impl CompensationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tool: &str) -> Option<&RunoutCompensation> {
        self.models.get(tool)
    }

    /// Store `model` for `tool`, returning the one it replaces.
    pub fn insert(
        &mut self,
        tool: impl Into<String>,
        model: RunoutCompensation,
    ) -> Option<RunoutCompensation> {
        self.models.insert(tool.into(), model)
    }

    /// Forget the calibration of one tool.
    pub fn reset(&mut self, tool: &str) -> Option<RunoutCompensation> {
        let removed = self.models.remove(tool);
        if removed.is_some() {
            tracing::debug!(tool, "runout calibration reset");
        }
        removed
    }

    /// Forget every calibration. Call on any machine geometry change.
    pub fn reset_all(&mut self) {
        if !self.models.is_empty() {
            tracing::info!(count = self.models.len(), "all runout calibrations reset");
        }
        self.models.clear();
    }

    /// Tip unloaded from `tool`; drops its calibration when the policy asks
    /// for recalibration on tip change. Returns whether an entry was dropped.
    pub fn on_tool_unloaded(&mut self, tool: &str, trigger: RecalibrationTrigger) -> bool {
        trigger == RecalibrationTrigger::NozzleTipChange && self.reset(tool).is_some()
    }

    /// Machine homed; drops everything when the policy asks for
    /// recalibration after homing.
    pub fn on_machine_homed(&mut self, trigger: RecalibrationTrigger) {
        if trigger == RecalibrationTrigger::MachineHome {
            self.reset_all();
        }
    }

    /// Compensation offset for `tool` at rotation `angle`, `None` when
    /// uncalibrated.
    pub fn offset(&self, tool: &str, angle: f64) -> Option<Pose> {
        self.get(tool).map(|m| m.offset(angle))
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RunoutCompensation)> {
        self.models.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn from_json_str(data: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(data)?)
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load a table saved with [`CompensationTable::save_json_file`].
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    pub fn save_json_file(&self, path: &Path) -> Result<(), ConfigError> {
        std::fs::write(path, self.to_json_string()?)?;
        Ok(())
    }
}
