//! Relativistic kinematics for reconstructed objects.

use super::{Column, EventTable};
use crate::error::{AnalysisError, Result};
use nalgebra::SVector;

/// Relativistic 4-momentum (px, py, pz, E)
pub type Momentum = SVector<f64, 4>;

/// Convenience const for accessing the X coordinate of a 4-vector
pub const X: usize = 0;

/// Convenience const for accessing the E coordinate of a 4-vector
pub const E: usize = 3;

/// Name of the derived dimuon mass field
pub const DIMUON_MASS_FIELD: &str = "DiMuon_mass";

/// Placeholder mass for events without a muon pair
pub const INVALID_MASS: f64 = -999.0;

/// Build a 4-momentum from collider coordinates (pt, η, φ, m).
pub fn from_pt_eta_phi_m(pt: f64, eta: f64, phi: f64, mass: f64) -> Momentum {
    let px = pt * phi.cos();
    let py = pt * phi.sin();
    let pz = pt * eta.sinh();
    let energy = (px * px + py * py + pz * pz + mass * mass).sqrt();
    Momentum::new(px, py, pz, energy)
}

/// Invariant mass of a 4-momentum. Slightly space-like vectors from rounding
/// are clamped to zero mass.
pub fn invariant_mass(p: &Momentum) -> f64 {
    let p2 = p.fixed_rows::<3>(X).norm_squared();
    (p[E] * p[E] - p2).max(0.0).sqrt()
}

/// Invariant mass of a pair of objects given as (pt, η, φ, m).
pub fn pair_mass(a: [f64; 4], b: [f64; 4]) -> f64 {
    let p = from_pt_eta_phi_m(a[0], a[1], a[2], a[3]) + from_pt_eta_phi_m(b[0], b[1], b[2], b[3]);
    invariant_mass(&p)
}

/// Dimuon invariant mass from the two leading muons of every event,
/// [`INVALID_MASS`] when an event has fewer than two muons.
pub fn dimuon_mass(events: &EventTable) -> Result<Column> {
    let field = |name: &str| {
        events
            .column(name)
            .filter(|c| c.is_jagged())
            .ok_or_else(|| {
                AnalysisError::eval(DIMUON_MASS_FIELD, format!("needs muon collection '{}'", name))
            })
    };
    let (pt, eta, phi, mass) = (
        field("Muon_pt")?,
        field("Muon_eta")?,
        field("Muon_phi")?,
        field("Muon_mass")?,
    );

    let mut out = Vec::with_capacity(events.len());
    for row in 0..events.len() {
        let muon = |i: usize| -> Option<[f64; 4]> {
            Some([
                *pt.list(row)?.get(i)?,
                *eta.list(row)?.get(i)?,
                *phi.list(row)?.get(i)?,
                *mass.list(row)?.get(i)?,
            ])
        };
        let m = match (muon(0), muon(1)) {
            (Some(mu1), Some(mu2)) => pair_mass(mu1, mu2),
            _ => INVALID_MASS,
        };
        out.push(m);
    }
    Ok(Column::Scalar(out))
}
