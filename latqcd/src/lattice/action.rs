// SPDX-License-Identifier: AGPL-3.0-only

//! Gauge actions compiled into loop tables.
//!
//! Every action is a weighted sum of closed Wilson loops,
//!
//! ```text
//! S = −(β/3) Σ_x Σ_terms w_term · Re Tr L_term(x)
//! ```
//!
//! | Action | Terms |
//! |--------|-------|
//! | Wilson plaquette | `P_μν` (μ < ν), w = a_μν / u^P_μν |
//! | Rectangle improved | `5/3 P_μν`, `−1/12 R_μν` (μ ≠ ν), w = a_μν / u^R_μν |
//! | Twisted-rectangle improved | `P_μν`, `−1/12 T_μν` (μ ≠ ν), w = a_μν / u^T_μν |
//!
//! where `a_μν` is the anisotropy weight and `u` the tadpole factor for the
//! plane. [`ActionTerms`] precomputes, per link direction, the staple
//! recipes (every loop through the link with that link cut out), the local
//! loops (every loop containing the link, deduplicated), and the
//! same-direction link offsets an update of that link reads. The twisted
//! rectangle traverses one link twice, so it has loops but no staples.
//!
//! # References
//!
//! - Lüscher & Weisz, Commun. Math. Phys. 97, 59 (1985)
//! - Lepage, "Lattice QCD for novices", hep-lat/9607076
//! - Morningstar & Peardon, Phys. Rev. D 56, 4043 (1997)

use serde::Serialize;

use super::constants::N_DIM;
use super::gauge::{
    path_product, plaquette_path, rectangle_path, shift, twisted_rectangle_path, Coord,
    GaugeField, LinkSource, Step,
};
use super::selector::deserialize_via_selector;
use super::su3::Su3Matrix;

/// Gauge action selector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GaugeAction {
    /// Wilson plaquette action.
    #[default]
    WilsonPlaquette,
    /// Tree-level Symanzik action with 2×1 rectangles.
    RectangleImproved,
    /// Plaquette plus twisted rectangles.
    TwistedRectangleImproved,
}

impl GaugeAction {
    /// Decode an integer selector (0, 1, 2). Unknown codes fall back to
    /// the Wilson plaquette action with a warning.
    #[must_use]
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::WilsonPlaquette,
            1 => Self::RectangleImproved,
            2 => Self::TwistedRectangleImproved,
            other => {
                log::warn!("unknown gauge action code {other}, using Wilson plaquette action");
                Self::WilsonPlaquette
            }
        }
    }

    /// Decode a selector name. Unknown names fall back to the Wilson
    /// plaquette action with a warning.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "wilson" | "wilson_plaquette" => Self::WilsonPlaquette,
            "rectangle_improved" => Self::RectangleImproved,
            "twisted_rectangle_improved" => Self::TwistedRectangleImproved,
            other => {
                log::warn!("unknown gauge action {other:?}, using Wilson plaquette action");
                Self::WilsonPlaquette
            }
        }
    }

    /// Whether the action's dependence on a single link is linear, so it
    /// can be written as `Re Tr(U · staple)`.
    #[must_use]
    pub const fn has_staples(self) -> bool {
        !matches!(self, Self::TwistedRectangleImproved)
    }
}

deserialize_via_selector!(GaugeAction);

/// Anisotropy and tadpole coefficients, indexed `[μ][ν]` with direction 0
/// as time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Couplings {
    /// χ in temporal planes, 1/χ in spatial planes.
    pub anisotropy: [[f64; N_DIM]; N_DIM],
    /// Plaquette tadpole factor.
    pub plaquette: [[f64; N_DIM]; N_DIM],
    /// Rectangle tadpole factor (long side μ).
    pub rectangle: [[f64; N_DIM]; N_DIM],
    /// Twisted-rectangle tadpole factor.
    pub twisted: [[f64; N_DIM]; N_DIM],
}

impl Couplings {
    /// Coefficient tables for anisotropy `chi` and tadpoles `ut`, `us`.
    #[must_use]
    pub fn new(chi: f64, ut: f64, us: f64) -> Self {
        let mut c = Self {
            anisotropy: [[1.0; N_DIM]; N_DIM],
            plaquette: [[1.0; N_DIM]; N_DIM],
            rectangle: [[1.0; N_DIM]; N_DIM],
            twisted: [[1.0; N_DIM]; N_DIM],
        };
        for mu in 0..N_DIM {
            for nu in 0..N_DIM {
                if mu == nu {
                    continue;
                }
                if mu == 0 || nu == 0 {
                    c.anisotropy[mu][nu] = chi;
                    c.plaquette[mu][nu] = us.powi(2) * ut.powi(2);
                    c.rectangle[mu][nu] = if mu == 0 {
                        us.powi(2) * ut.powi(4)
                    } else {
                        us.powi(4) * ut.powi(2)
                    };
                    c.twisted[mu][nu] = us.powi(4) * ut.powi(4);
                } else {
                    c.anisotropy[mu][nu] = 1.0 / chi;
                    c.plaquette[mu][nu] = us.powi(4);
                    c.rectangle[mu][nu] = us.powi(6);
                    c.twisted[mu][nu] = us.powi(8);
                }
            }
        }
        c
    }
}

impl Default for Couplings {
    fn default() -> Self {
        Self::new(1.0, 1.0, 1.0)
    }
}

#[derive(Clone, Debug)]
struct LoopTerm {
    steps: Vec<Step>,
    weight: f64,
}

/// One loop through a link with the link removed.
#[derive(Clone, Debug)]
struct StapleRecipe {
    /// Path starts at x+μ (forward traversal) or at x (backward).
    from_ahead: bool,
    steps: Vec<Step>,
    weight: f64,
    /// Backward traversals contribute the adjoint of the path.
    dagger: bool,
}

/// One loop containing a link: term index and start offset from the link.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct LocalLoop {
    term: usize,
    offset: [isize; N_DIM],
}

/// A gauge action compiled into per-direction loop tables.
#[derive(Clone, Debug)]
pub struct ActionTerms {
    action: GaugeAction,
    beta: f64,
    terms: Vec<LoopTerm>,
    staples: [Vec<StapleRecipe>; N_DIM],
    local_loops: [Vec<LocalLoop>; N_DIM],
    dependencies: [Vec<[isize; N_DIM]>; N_DIM],
}

fn displacement(steps: &[Step]) -> [isize; N_DIM] {
    let mut d = [0; N_DIM];
    for s in steps {
        d[s.dir] += s.sign();
    }
    d
}

fn unit(dir: usize) -> [isize; N_DIM] {
    let mut d = [0; N_DIM];
    d[dir] = 1;
    d
}

fn add(a: [isize; N_DIM], b: [isize; N_DIM]) -> [isize; N_DIM] {
    let mut r = a;
    for k in 0..N_DIM {
        r[k] += b[k];
    }
    r
}

fn sub(a: [isize; N_DIM], b: [isize; N_DIM]) -> [isize; N_DIM] {
    let mut r = a;
    for k in 0..N_DIM {
        r[k] -= b[k];
    }
    r
}

fn offset_site(shape: &Coord, site: &Coord, offset: &[isize; N_DIM]) -> Coord {
    let mut x = *site;
    for (mu, &d) in offset.iter().enumerate() {
        if d != 0 {
            x = shift(shape, &x, mu, d);
        }
    }
    x
}

impl ActionTerms {
    /// Compile `action` at coupling `beta` with the given coefficients.
    #[must_use]
    pub fn new(action: GaugeAction, beta: f64, couplings: &Couplings) -> Self {
        let terms = build_terms(action, couplings);
        let mut staples: [Vec<StapleRecipe>; N_DIM] = Default::default();
        let mut local_loops: [Vec<LocalLoop>; N_DIM] = Default::default();
        let mut dependencies: [Vec<[isize; N_DIM]>; N_DIM] = Default::default();

        for lambda in 0..N_DIM {
            for (t, term) in terms.iter().enumerate() {
                let n = term.steps.len();
                for k in (0..n).filter(|&k| term.steps[k].dir == lambda) {
                    let before = displacement(&term.steps[..k]);
                    let rotated: Vec<Step> = term.steps[k + 1..]
                        .iter()
                        .chain(&term.steps[..k])
                        .copied()
                        .collect();
                    let forward = term.steps[k].forward;
                    let offset = if forward {
                        sub([0; N_DIM], before)
                    } else {
                        sub(unit(lambda), before)
                    };
                    let local = LocalLoop { term: t, offset };
                    if !local_loops[lambda].contains(&local) {
                        local_loops[lambda].push(local);
                    }
                    if action.has_staples() {
                        staples[lambda].push(StapleRecipe {
                            from_ahead: forward,
                            steps: rotated,
                            weight: term.weight,
                            dagger: !forward,
                        });
                    }
                }
            }

            for local in &local_loops[lambda] {
                let steps = &terms[local.term].steps;
                for j in (0..steps.len()).filter(|&j| steps[j].dir == lambda) {
                    let before = add(local.offset, displacement(&steps[..j]));
                    let link = if steps[j].forward {
                        before
                    } else {
                        sub(before, unit(lambda))
                    };
                    if link != [0; N_DIM] && !dependencies[lambda].contains(&link) {
                        dependencies[lambda].push(link);
                    }
                }
            }
        }

        Self {
            action,
            beta,
            terms,
            staples,
            local_loops,
            dependencies,
        }
    }

    /// The compiled action.
    #[must_use]
    pub const fn action(&self) -> GaugeAction {
        self.action
    }

    /// Inverse coupling β.
    #[must_use]
    pub const fn beta(&self) -> f64 {
        self.beta
    }

    /// Weighted staple sum `A` with `S_local = −(β/3) Re Tr(U_μ(x) A)`.
    ///
    /// Zero for actions without a staple form.
    pub fn staple<S: LinkSource + ?Sized>(&self, src: &S, site: &Coord, mu: usize) -> Su3Matrix {
        let shape = src.shape();
        let ahead = shift(&shape, site, mu, 1);
        let mut sum = Su3Matrix::ZERO;
        for recipe in &self.staples[mu] {
            let start = if recipe.from_ahead { &ahead } else { site };
            let p = path_product(src, start, &recipe.steps);
            let p = if recipe.dagger { p.adjoint() } else { p };
            sum += p.scale(recipe.weight);
        }
        sum
    }

    /// Local action of `U_μ(x)` from its staple.
    pub fn local_action_from_staple(&self, link: &Su3Matrix, staple: &Su3Matrix) -> f64 {
        -self.beta / 3.0 * link.re_trace_mul(staple)
    }

    /// Local action of `U_μ(x)`: every loop containing the link, evaluated
    /// explicitly.
    pub fn local_action<S: LinkSource + ?Sized>(&self, src: &S, site: &Coord, mu: usize) -> f64 {
        let shape = src.shape();
        let mut sum = 0.0;
        for local in &self.local_loops[mu] {
            let term = &self.terms[local.term];
            let start = offset_site(&shape, site, &local.offset);
            sum += term.weight * path_product(src, &start, &term.steps).re_trace();
        }
        -self.beta / 3.0 * sum
    }

    /// Total action of a configuration.
    #[must_use]
    pub fn total_action(&self, field: &GaugeField) -> f64 {
        let mut sum = 0.0;
        for index in 0..field.volume() {
            let site = field.layout().site_coords(index);
            for term in &self.terms {
                sum += term.weight * path_product(field, &site, &term.steps).re_trace();
            }
        }
        -self.beta / 3.0 * sum
    }

    /// Offsets of the same-direction links read when updating a link along
    /// `mu`.
    #[must_use]
    pub fn dependencies(&self, mu: usize) -> &[[isize; N_DIM]] {
        &self.dependencies[mu]
    }

    /// Number of staple paths per link along `mu`.
    #[must_use]
    pub fn staple_count(&self, mu: usize) -> usize {
        self.staples[mu].len()
    }
}

fn build_terms(action: GaugeAction, c: &Couplings) -> Vec<LoopTerm> {
    let mut terms = Vec::new();
    let plaquette_scale = match action {
        GaugeAction::RectangleImproved => 5.0 / 3.0,
        GaugeAction::WilsonPlaquette | GaugeAction::TwistedRectangleImproved => 1.0,
    };
    for mu in 0..N_DIM {
        for nu in (mu + 1)..N_DIM {
            terms.push(LoopTerm {
                steps: plaquette_path(mu, nu).to_vec(),
                weight: plaquette_scale * c.anisotropy[mu][nu] / c.plaquette[mu][nu],
            });
        }
    }
    for mu in 0..N_DIM {
        for nu in (0..N_DIM).filter(|&nu| nu != mu) {
            match action {
                GaugeAction::WilsonPlaquette => {}
                GaugeAction::RectangleImproved => terms.push(LoopTerm {
                    steps: rectangle_path(mu, nu).to_vec(),
                    weight: -c.anisotropy[mu][nu] / (12.0 * c.rectangle[mu][nu]),
                }),
                GaugeAction::TwistedRectangleImproved => terms.push(LoopTerm {
                    steps: twisted_rectangle_path(mu, nu).to_vec(),
                    weight: -c.anisotropy[mu][nu] / (12.0 * c.twisted[mu][nu]),
                }),
            }
        }
    }
    terms
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::gauge::GaugeField;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn hot_field(seed: u64) -> GaugeField {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        GaugeField::hot_start(&[4, 4, 4, 4], &[2, 2, 2, 2], &mut rng).unwrap()
    }

    #[test]
    fn coefficient_tables() {
        let c = Couplings::new(2.0, 0.8, 0.9);
        assert!((c.anisotropy[0][1] - 2.0).abs() < 1e-15);
        assert!((c.anisotropy[2][0] - 2.0).abs() < 1e-15);
        assert!((c.anisotropy[1][3] - 0.5).abs() < 1e-15);
        assert!((c.anisotropy[2][2] - 1.0).abs() < 1e-15);
        assert!((c.plaquette[0][3] - 0.81 * 0.64).abs() < 1e-14);
        assert!((c.rectangle[0][1] - 0.81 * 0.8_f64.powi(4)).abs() < 1e-14);
        assert!((c.rectangle[1][0] - 0.9_f64.powi(4) * 0.64).abs() < 1e-14);
        assert!((c.twisted[3][2] - 0.9_f64.powi(8)).abs() < 1e-14);
    }

    #[test]
    fn selector_fallbacks() {
        assert_eq!(GaugeAction::from_code(1), GaugeAction::RectangleImproved);
        assert_eq!(GaugeAction::from_code(17), GaugeAction::WilsonPlaquette);
        assert_eq!(
            GaugeAction::from_name("twisted_rectangle_improved"),
            GaugeAction::TwistedRectangleImproved
        );
        assert_eq!(GaugeAction::from_name("bogus"), GaugeAction::WilsonPlaquette);
    }

    #[test]
    fn staple_counts() {
        let c = Couplings::default();
        let wilson = ActionTerms::new(GaugeAction::WilsonPlaquette, 5.5, &c);
        let rect = ActionTerms::new(GaugeAction::RectangleImproved, 5.5, &c);
        let twist = ActionTerms::new(GaugeAction::TwistedRectangleImproved, 5.5, &c);
        for mu in 0..N_DIM {
            assert_eq!(wilson.staple_count(mu), 6);
            assert_eq!(rect.staple_count(mu), 6 + 18);
            assert_eq!(twist.staple_count(mu), 0);
        }
    }

    #[test]
    fn staple_and_loop_local_actions_agree() {
        let field = hot_field(17);
        let c = Couplings::new(1.3, 0.9, 0.85);
        for action in [GaugeAction::WilsonPlaquette, GaugeAction::RectangleImproved] {
            let terms = ActionTerms::new(action, 5.5, &c);
            for (site, mu) in [([0, 0, 0, 0], 0), ([1, 3, 2, 0], 2), ([3, 1, 0, 2], 3)] {
                let staple = terms.staple(&field, &site, mu);
                let from_staple = terms.local_action_from_staple(&field.link(&site, mu), &staple);
                let from_loops = terms.local_action(&field, &site, mu);
                assert!(
                    (from_staple - from_loops).abs() < 1e-10,
                    "{action:?}: staple {from_staple} vs loops {from_loops}"
                );
            }
        }
    }

    #[test]
    fn local_action_captures_total_action_change() {
        let mut field = hot_field(23);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        for action in [
            GaugeAction::WilsonPlaquette,
            GaugeAction::RectangleImproved,
            GaugeAction::TwistedRectangleImproved,
        ] {
            let terms = ActionTerms::new(action, 6.0, &Couplings::default());
            let site = [2, 1, 3, 0];
            let mu = 1;
            let before_total = terms.total_action(&field);
            let before_local = terms.local_action(&field, &site, mu);
            let proposal = Su3Matrix::random_near_identity(&mut rng, 0.3) * field.link(&site, mu);
            field.set_link(&site, mu, proposal);
            let after_total = terms.total_action(&field);
            let after_local = terms.local_action(&field, &site, mu);
            assert!(
                ((after_total - before_total) - (after_local - before_local)).abs() < 1e-9,
                "{action:?}"
            );
        }
    }

    #[test]
    fn wilson_dependencies_are_transverse_neighbours() {
        let terms = ActionTerms::new(GaugeAction::WilsonPlaquette, 5.5, &Couplings::default());
        let deps = terms.dependencies(0);
        assert_eq!(deps.len(), 6);
        for d in deps {
            assert_eq!(d[0], 0);
            assert_eq!(d.iter().map(|v| v.abs()).sum::<isize>(), 1);
        }
    }

    #[test]
    fn rectangle_dependencies_reach_diagonals() {
        let terms = ActionTerms::new(GaugeAction::RectangleImproved, 5.5, &Couplings::default());
        let deps = terms.dependencies(2);
        assert!(deps.contains(&[0, 0, 1, 1]));
        assert!(deps.contains(&[0, 0, 0, 2]));
        assert!(deps.contains(&[0, 0, -1, 0]));
    }

    #[test]
    fn cold_field_local_action_is_minimal() {
        let field = GaugeField::cold_start(&[4, 4, 4, 4], &[2, 2, 2, 2]).unwrap();
        let terms = ActionTerms::new(GaugeAction::WilsonPlaquette, 6.0, &Couplings::default());
        let staple = terms.staple(&field, &[0, 0, 0, 0], 0);
        assert!((staple.re_trace() - 18.0).abs() < 1e-12);
        assert!((terms.local_action(&field, &[0, 0, 0, 0], 0) + 6.0 / 3.0 * 18.0).abs() < 1e-10);
    }
}
