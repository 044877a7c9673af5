use matrixcompare::assert_scalar_eq;
use nalgebra::Vector2;
use ssafem::flow_law::{secondinvariant_2d, strain_rate, FlowLaw, IsothermalGlen, SECONDS_PER_YEAR};

#[test]
fn strain_rate_of_simple_shear() {
    // u = (y, 0)
    let d = strain_rate(&Vector2::new(0.0, 0.0), &Vector2::new(1.0, 0.0));
    assert_eq!(d, [0.0, 0.0, 0.5]);
    assert_eq!(secondinvariant_2d(&d), 0.25);
}

#[test]
fn default_regularization_is_one_meter_per_year_over_1000_km() {
    let law = IsothermalGlen::default();
    assert_eq!(law.exponent, 3.0);
    let rate = 1.0 / SECONDS_PER_YEAR / 1.0e6;
    assert_scalar_eq!(law.regularization, rate * rate, comp = float);
}

#[test]
fn viscosity_is_linear_in_hardness() {
    let law = IsothermalGlen {
        exponent: 3.0,
        regularization: 1e-2,
    };
    let (nu1, dnu1) = law.effective_viscosity(1.0, 0.7);
    let (nu3, dnu3) = law.effective_viscosity(3.0, 0.7);
    assert_scalar_eq!(nu3, 3.0 * nu1, comp = float);
    assert_scalar_eq!(dnu3, 3.0 * dnu1, comp = float);
}

#[test]
fn viscosity_derivative_matches_finite_differences() {
    let law = IsothermalGlen {
        exponent: 3.0,
        regularization: 1e-2,
    };
    let h = 1e-6;
    for gamma in [0.0, 0.1, 2.0, 30.0] {
        let (_, dnu) = law.effective_viscosity(2.0, gamma + h);
        let (nu_plus, _) = law.effective_viscosity(2.0, gamma + 2.0 * h);
        let (nu_minus, _) = law.effective_viscosity(2.0, gamma);
        let dnu_fd = (nu_plus - nu_minus) / (2.0 * h);
        assert_scalar_eq!(dnu, dnu_fd, comp = abs, tol = 1e-6 * dnu.abs().max(1.0));
        assert!(dnu < 0.0);
    }
}

#[test]
fn newtonian_viscosity_is_constant() {
    let law = IsothermalGlen {
        exponent: 1.0,
        regularization: 0.0,
    };
    assert_eq!(law.effective_viscosity(4.0, 0.0), (2.0, 0.0));
    assert_eq!(law.effective_viscosity(4.0, 10.0), (2.0, 0.0));
}
