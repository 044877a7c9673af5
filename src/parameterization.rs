//! Maps from the design variable `zeta` to the ice hardness `B`.
use crate::error::Error;
use crate::field::Field;
use serde::{Deserialize, Serialize};

/// A monotone parameterization `B = phi(zeta)` of the hardness.
///
/// Every variant carries a `scale` with the units of hardness, so that `zeta` is
/// dimensionless.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DesignParameterization {
    /// `B = s zeta`
    Identity { scale: f64 },
    /// `B = s zeta^2`
    Square { scale: f64 },
    /// `B = s exp(zeta)`
    Exp { scale: f64 },
    /// `B = s (zeta + sqrt(zeta^2 + 4 d0^2)) / 2`, a smooth version of `max(s zeta, 0)`
    TruncatedIdentity { scale: f64, d0: f64 },
}

impl Default for DesignParameterization {
    fn default() -> Self {
        Self::Identity { scale: 1.0 }
    }
}

impl DesignParameterization {
    pub fn scale(&self) -> f64 {
        match *self {
            Self::Identity { scale }
            | Self::Square { scale }
            | Self::Exp { scale }
            | Self::TruncatedIdentity { scale, .. } => scale,
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        let scale = self.scale();
        if !(scale > 0.0 && scale.is_finite()) {
            return Err(Error::InvalidParameter(format!(
                "design parameterization scale must be positive, got {}",
                scale
            )));
        }
        if let Self::TruncatedIdentity { d0, .. } = *self {
            if !(d0 > 0.0 && d0.is_finite()) {
                return Err(Error::InvalidParameter(format!(
                    "truncated identity parameter d0 must be positive, got {}",
                    d0
                )));
            }
        }
        Ok(())
    }

    /// Returns `B = phi(zeta)` and `dB/dzeta = phi'(zeta)`.
    pub fn to_hardness(&self, zeta: f64) -> (f64, f64) {
        match *self {
            Self::Identity { scale } => (scale * zeta, scale),
            Self::Square { scale } => (scale * zeta * zeta, 2.0 * scale * zeta),
            Self::Exp { scale } => {
                let b = scale * zeta.exp();
                (b, b)
            }
            Self::TruncatedIdentity { scale, d0 } => {
                let alpha = (zeta * zeta + 4.0 * d0 * d0).sqrt();
                (scale * (zeta + alpha) / 2.0, scale * (1.0 + zeta / alpha) / 2.0)
            }
        }
    }

    /// Returns `zeta = phi^{-1}(B)`.
    ///
    /// Fails if `B` is outside the range of the parameterization. The square map is inverted
    /// on its non-negative branch.
    pub fn from_hardness(&self, hardness: f64) -> Result<f64, Error> {
        let out_of_range = || {
            Error::InvalidParameter(format!(
                "hardness {} is outside the range of the {:?} parameterization",
                hardness, self
            ))
        };
        match *self {
            Self::Identity { scale } => Ok(hardness / scale),
            Self::Square { scale } => {
                if hardness < 0.0 {
                    Err(out_of_range())
                } else {
                    Ok((hardness / scale).sqrt())
                }
            }
            Self::Exp { scale } => {
                if hardness <= 0.0 {
                    Err(out_of_range())
                } else {
                    Ok((hardness / scale).ln())
                }
            }
            Self::TruncatedIdentity { scale, d0 } => {
                if hardness <= 0.0 {
                    Err(out_of_range())
                } else {
                    let b = hardness / scale;
                    Ok(b - d0 * d0 / b)
                }
            }
        }
    }

    /// Evaluates `phi` and `phi'` at every node of `zeta`, ghosts included.
    pub fn to_hardness_fields(&self, zeta: &Field<f64>) -> (Field<f64>, Field<f64>) {
        let w = zeta.stencil_width();
        let hardness = Field::from_fn(zeta.grid(), w, |i, j| self.to_hardness(zeta.get(i, j)).0);
        let derivative = Field::from_fn(zeta.grid(), w, |i, j| self.to_hardness(zeta.get(i, j)).1);
        (hardness, derivative)
    }

    /// Inverts the parameterization at every node of `hardness`.
    pub fn from_hardness_field(&self, hardness: &Field<f64>) -> Result<Field<f64>, Error> {
        let mut zeta = Field::new(hardness.grid(), hardness.stencil_width());
        {
            let mut guard = zeta.write();
            for (i, j) in hardness.grid().nodes() {
                guard.set(i, j, self.from_hardness(hardness.get(i, j))?);
            }
        }
        Ok(zeta)
    }
}
