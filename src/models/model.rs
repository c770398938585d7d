//! SED model evaluation for the power-law and blackbody variants.
//!
//! The fitter relies on two primitive operations per model kind:
//! - evaluate the flux density at a rest-frame wavelength (for residuals)
//! - the box bounds of the free parameters (for constrained optimization)
//!
//! Parameters are laid out as `[scale, shape]`, where `shape` is the
//! spectral index (power law) or the temperature in K (blackbody).

use crate::domain::ModelKind;

/// Speed of light (cm s⁻¹).
pub const SPEED_OF_LIGHT: f64 = 2.99792458e10;
/// Planck constant (erg s).
pub const PLANCK_H: f64 = 6.62607015e-27;
/// Boltzmann constant (erg K⁻¹).
pub const BOLTZMANN_K: f64 = 1.380649e-16;

const CM_PER_ANGSTROM: f64 = 1e-8;

/// Temperature bounds (K) for the blackbody fit.
const TEMPERATURE_BOUNDS: (f64, f64) = (100.0, 1.0e6);
/// Spectral index bounds for the power-law fit.
const ALPHA_BOUNDS: (f64, f64) = (-10.0, 10.0);

/// Evaluate the model flux density at a rest-frame wavelength (Å).
///
/// Output units follow the data: erg s⁻¹ cm⁻² Hz⁻¹, with the distance and
/// emitting-area factors absorbed into `scale`.
pub fn evaluate(model: ModelKind, wavelength: f64, params: &[f64]) -> f64 {
    match model {
        ModelKind::Powerlaw => params[0] * wavelength.powf(-params[1]),
        ModelKind::Blackbody => params[0] * planck_nu(wavelength, params[1]),
    }
}

/// Planck spectral radiance `B_ν` at the frequency matching `wavelength` (Å),
/// per unit frequency, in cgs.
pub fn planck_nu(wavelength: f64, temperature: f64) -> f64 {
    let nu = SPEED_OF_LIGHT / (wavelength * CM_PER_ANGSTROM);
    let x = PLANCK_H * nu / (BOLTZMANN_K * temperature);
    // Far on the Wien tail the flux is numerically zero; guard exp overflow.
    if x > 700.0 {
        return 0.0;
    }
    let prefactor = 2.0 * PLANCK_H * nu.powi(3) / (SPEED_OF_LIGHT * SPEED_OF_LIGHT);
    // exp_m1 keeps the Rayleigh-Jeans limit (x → 0) accurate.
    prefactor / x.exp_m1()
}

/// Box bounds on the free parameters, `[scale, shape]` order.
pub fn param_bounds(model: ModelKind) -> [(f64, f64); 2] {
    let scale = (f64::MIN_POSITIVE, f64::INFINITY);
    match model {
        ModelKind::Powerlaw => [scale, ALPHA_BOUNDS],
        ModelKind::Blackbody => [scale, TEMPERATURE_BOUNDS],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn powerlaw_follows_its_closed_form() {
        let params = [2.0e-20, 1.5];
        let wl: f64 = 5000.0;
        let expected = 2.0e-20 * wl.powf(-1.5);
        assert!((evaluate(ModelKind::Powerlaw, wl, &params) - expected).abs() < 1e-30);
    }

    #[test]
    fn planck_peaks_between_tails() {
        // For T = 10_000 K the ν-space peak sits near 1700 Å; both far tails
        // must fall below the peak region.
        let t = 10_000.0;
        let peak = planck_nu(1700.0, t);
        assert!(peak > planck_nu(200.0, t));
        assert!(peak > planck_nu(100_000.0, t));
    }

    #[test]
    fn planck_wien_tail_underflows_to_zero() {
        assert_eq!(planck_nu(100.0, 500.0), 0.0);
    }

    #[test]
    fn hotter_blackbody_is_brighter_everywhere() {
        for &wl in &[1500.0, 4500.0, 9000.0] {
            assert!(planck_nu(wl, 20_000.0) > planck_nu(wl, 8_000.0));
        }
    }

    #[test]
    fn bounds_contain_physical_values() {
        let [scale, alpha] = param_bounds(ModelKind::Powerlaw);
        assert!(scale.0 > 0.0 && alpha.0 < 0.0 && alpha.1 > 0.0);
        let [_, temperature] = param_bounds(ModelKind::Blackbody);
        assert!(temperature.0 <= 5000.0 && temperature.1 >= 50_000.0);
    }
}
