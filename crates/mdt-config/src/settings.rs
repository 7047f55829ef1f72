//! Typed view of resolved optimization settings
//!
//! These are the sub-keys the optimization driver reads. Keys missing from
//! the resolved mapping fall back to the defaults below; keys the driver
//! does not know are ignored.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::document::Mapping;
use crate::error::Result;

fn default_load_balancer_name() -> String {
    "PreferGPU".to_string()
}

fn default_run_in_batches() -> bool {
    true
}

fn default_single_batch_length() -> f64 {
    2.0e6
}

/// One entry of the `optimizers` list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerSpec {
    /// Optimizer routine name, e.g. "Powell" or "NMSimplex"
    pub name: String,

    /// Patience of the routine; `None` leaves it to the optimizer default
    #[serde(default)]
    pub patience: Option<u32>,

    /// Any further routine specific options, passed through untouched
    #[serde(flatten)]
    pub options: BTreeMap<String, serde_json::Value>,
}

/// The `load_balancer` mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadBalancerSettings {
    #[serde(default = "default_load_balancer_name")]
    pub name: String,

    #[serde(default = "default_run_in_batches")]
    pub run_in_batches: bool,

    /// Work items per batch when running in batches
    #[serde(default = "default_single_batch_length")]
    pub single_batch_length: f64,
}

impl Default for LoadBalancerSettings {
    fn default() -> Self {
        Self {
            name: default_load_balancer_name(),
            run_in_batches: default_run_in_batches(),
            single_batch_length: default_single_batch_length(),
        }
    }
}

/// One entry of the `smoothing_routines` list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmoothingRoutine {
    pub name: String,

    #[serde(flatten)]
    pub options: BTreeMap<String, serde_json::Value>,
}

/// Settings handed to the optimization driver for one model
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OptimizationSettings {
    #[serde(default)]
    pub optimizers: Vec<OptimizerSpec>,

    #[serde(default)]
    pub load_balancer: LoadBalancerSettings,

    #[serde(default)]
    pub smoothing_routines: Vec<SmoothingRoutine>,

    /// Device indices to run on; empty means every device
    #[serde(default)]
    pub cl_devices: Vec<usize>,

    #[serde(default)]
    pub enable_grid_search: bool,

    #[serde(default)]
    pub extra_optim_runs: u32,

    #[serde(default)]
    pub extra_optim_runs_apply_smoothing: bool,

    #[serde(default)]
    pub extra_optim_runs_use_perturbation: bool,
}

impl OptimizationSettings {
    pub fn from_mapping(mapping: &Mapping) -> Result<Self> {
        Ok(serde_json::from_value(serde_json::Value::from(mapping))?)
    }

    /// The optimizer the driver should run.
    ///
    /// `optimizers` accumulates across overrides, so the last entry is the
    /// one contributed by the most specific layer.
    pub fn effective_optimizer(&self) -> Option<&OptimizerSpec> {
        self.optimizers.last()
    }

    pub fn uses_all_devices(&self) -> bool {
        self.cl_devices.is_empty()
    }

    /// True when both extra run modes are switched on.
    ///
    /// The modes are documented as mutually exclusive but nothing in the
    /// document structure enforces it; deciding what to do about it is up to
    /// the driver.
    pub fn extra_run_modes_conflict(&self) -> bool {
        self.extra_optim_runs_apply_smoothing && self.extra_optim_runs_use_perturbation
    }
}

/// A resolved `processing_strategies.<type>` section: the strategy to
/// process voxels with and its options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingStrategy {
    pub name: String,

    #[serde(default)]
    pub options: BTreeMap<String, serde_json::Value>,
}

impl ProcessingStrategy {
    pub fn from_mapping(mapping: &Mapping) -> Result<Self> {
        Ok(serde_json::from_value(serde_json::Value::from(mapping))?)
    }
}
