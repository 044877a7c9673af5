//! Runtime configuration of the forward problem.
use crate::error::Error;
use crate::flow_law::IsothermalGlen;
use crate::parameterization::DesignParameterization;
use eyre::WrapErr;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearSolverSettings {
    pub rtol: f64,
    pub atol: f64,
    pub dtol: f64,
    pub max_iterations: usize,
}

impl Default for LinearSolverSettings {
    fn default() -> Self {
        Self {
            rtol: 1e-12,
            atol: 1e-50,
            dtol: 1e5,
            max_iterations: 10000,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NonlinearSolverSettings {
    pub rtol: f64,
    pub atol: f64,
    pub max_iterations: usize,
}

impl Default for NonlinearSolverSettings {
    fn default() -> Self {
        Self {
            rtol: 1e-10,
            atol: 1e-12,
            max_iterations: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SsaConfig {
    pub flow_law: IsothermalGlen,
    /// Ice thinner than this (in m) carries no viscous stress.
    pub min_thickness: f64,
    /// Diagonal entry of constrained rows in the state Jacobian.
    pub dirichlet_scale: f64,
    pub design_parameterization: DesignParameterization,
    pub linear_solver: LinearSolverSettings,
    pub nonlinear_solver: NonlinearSolverSettings,
}

impl Default for SsaConfig {
    fn default() -> Self {
        Self {
            flow_law: IsothermalGlen::default(),
            min_thickness: 50.0,
            dirichlet_scale: 1.0,
            design_parameterization: DesignParameterization::default(),
            linear_solver: LinearSolverSettings::default(),
            nonlinear_solver: NonlinearSolverSettings::default(),
        }
    }
}

impl SsaConfig {
    pub fn from_json_str(json: &str) -> eyre::Result<Self> {
        let config: Self = serde_json::from_str(json).wrap_err("failed to parse SSA configuration")?;
        config.validate().wrap_err("invalid SSA configuration")?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read SSA configuration from {}", path.display()))?;
        Self::from_json_str(&json).wrap_err_with(|| format!("in configuration file {}", path.display()))
    }

    pub fn to_json_string(&self) -> eyre::Result<String> {
        serde_json::to_string_pretty(self).wrap_err("failed to serialize SSA configuration")
    }

    pub fn validate(&self) -> Result<(), Error> {
        let invalid = |msg: String| Err(Error::InvalidParameter(msg));
        if !(self.flow_law.exponent >= 1.0) {
            return invalid(format!("Glen exponent must be at least 1, got {}", self.flow_law.exponent));
        }
        if !(self.flow_law.regularization >= 0.0) {
            return invalid(format!(
                "strain rate regularization must be non-negative, got {}",
                self.flow_law.regularization
            ));
        }
        // The viscosity of a shear-thinning law is unbounded at zero strain rate
        if self.flow_law.exponent > 1.0 && self.flow_law.regularization == 0.0 {
            return invalid(format!(
                "strain rate regularization must be positive for Glen exponent {}",
                self.flow_law.exponent
            ));
        }
        if !(self.min_thickness >= 0.0) {
            return invalid(format!("minimum thickness must be non-negative, got {}", self.min_thickness));
        }
        if !(self.dirichlet_scale > 0.0) {
            return invalid(format!("Dirichlet scale must be positive, got {}", self.dirichlet_scale));
        }
        let linear = &self.linear_solver;
        if !(linear.rtol >= 0.0 && linear.atol >= 0.0 && linear.dtol > 0.0) {
            return invalid(format!("invalid linear solver tolerances {:?}", linear));
        }
        let nonlinear = &self.nonlinear_solver;
        if !(nonlinear.rtol >= 0.0 && nonlinear.atol >= 0.0) {
            return invalid(format!("invalid nonlinear solver tolerances {:?}", nonlinear));
        }
        self.design_parameterization.validate()
    }
}
