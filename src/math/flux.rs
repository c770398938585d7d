//! AB magnitude to flux density conversion.
//!
//! All photometry enters the pipeline as AB magnitudes and is converted to
//! monochromatic flux densities `f_ν` (erg s⁻¹ cm⁻² Hz⁻¹) before fitting:
//!
//! ```text
//! f_ν = 10^(-(m + 48.60) / 2.5)
//! ```
//!
//! Uncertainties propagate to first order, `σ_f = f · ln(10)/2.5 · σ_m`.

/// AB magnitude zero point: `m = -2.5 log10(f_ν) - 48.60`.
pub const AB_ZERO_POINT: f64 = 48.60;

/// Convert an AB magnitude to flux density (erg s⁻¹ cm⁻² Hz⁻¹).
pub fn abmag_to_flux(mag: f64) -> f64 {
    10f64.powf(-(mag + AB_ZERO_POINT) / 2.5)
}

/// Propagate a magnitude uncertainty to a flux density uncertainty.
pub fn abmag_err_to_flux_err(mag: f64, mag_err: f64) -> f64 {
    abmag_to_flux(mag) * (std::f64::consts::LN_10 / 2.5) * mag_err.abs()
}

/// Convert a flux density (erg s⁻¹ cm⁻² Hz⁻¹) back to an AB magnitude.
pub fn flux_to_abmag(flux: f64) -> f64 {
    -2.5 * flux.log10() - AB_ZERO_POINT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mag_flux_round_trip() {
        for &mag in &[12.0, 17.5, 21.3] {
            let flux = abmag_to_flux(mag);
            assert!(flux > 0.0);
            assert!((flux_to_abmag(flux) - mag).abs() < 1e-12);
        }
    }

    #[test]
    fn zero_point_magnitude_gives_unit_exponent() {
        // m = -48.60 corresponds to f_ν = 1 by definition of the zero point.
        assert!((abmag_to_flux(-AB_ZERO_POINT) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn error_propagation_matches_finite_difference() {
        let mag = 18.0;
        let mag_err = 0.05;
        let analytic = abmag_err_to_flux_err(mag, mag_err);
        let numeric = (abmag_to_flux(mag - mag_err) - abmag_to_flux(mag + mag_err)) / 2.0;
        assert!(
            (analytic - numeric).abs() / numeric < 1e-3,
            "analytic {analytic} vs numeric {numeric}"
        );
    }

    #[test]
    fn brighter_magnitude_means_more_flux() {
        assert!(abmag_to_flux(15.0) > abmag_to_flux(16.0));
    }
}
