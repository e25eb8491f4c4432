// SPDX-License-Identifier: AGPL-3.0-only

//! Markov-chain Monte Carlo for pure SU(3) gauge fields.
//!
//! Three update rules act on one link at a time:
//!
//! - **Heatbath**: Cabibbo-Marinari pseudo-heatbath over the three SU(2)
//!   subgroups. Each SU(2) element is drawn from
//!   `√(1−x0²) exp(α x0)`, `α = 2βk/3`, with the Kennedy-Pendleton sampler
//!   for large α and the Creutz sampler for small α.
//! - **Staple Metropolis**: proposals `R·U` with `R` from a fixed pool of
//!   near-identity matrices, `ΔS = −(β/3) Re Tr((RU − U) A)`.
//! - **Metropolis**: the same proposals with `ΔS` from explicit evaluation
//!   of every loop containing the link. Works for any action.
//!
//! A sweep visits every link once. For each direction μ the chunks of
//! colour 0 are updated concurrently, then colour 1 (see
//! [`super::schedule`]). Each chunk task draws from its own
//! `ChaCha8Rng` stream keyed by (seed, sweep, μ, chunk), so a seeded run
//! gives the same configuration whatever the thread count.
//!
//! # References
//!
//! - Cabibbo & Marinari, Phys. Lett. B 119, 387 (1982)
//! - Kennedy & Pendleton, Phys. Lett. B 156, 393 (1985)
//! - Creutz, Phys. Rev. D 21, 2308 (1980)

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::action::{ActionTerms, Couplings, GaugeAction};
use super::constants::{
    stream_seed, DEFAULT_METROPOLIS_HITS, HEATBATH_HAAR_THRESHOLD, HEATBATH_KP_THRESHOLD,
    HEATBATH_MAX_TRIALS, LATTICE_DIVISION_GUARD, MIN_DEFAULT_BLOCK_EDGE, N_DIM,
    PROPOSAL_POOL_SIZE, PROPOSAL_SPREAD,
};
use super::gauge::{Coord, GaugeField, LinkSource};
use super::schedule::Schedule;
use super::selector::deserialize_via_selector;
use super::su3::{gaussian, Su3Matrix, SU2_SUBGROUPS};
use crate::error::LatticeError;

/// Link update method selector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateMethod {
    /// Cabibbo-Marinari pseudo-heatbath.
    #[default]
    Heatbath,
    /// Metropolis with the staple-linearized action change.
    StapleMetropolis,
    /// Metropolis with explicit local-loop evaluation.
    Metropolis,
}

impl UpdateMethod {
    /// Decode an integer selector (0, 1, 2). Unknown codes fall back to
    /// heatbath with a warning.
    #[must_use]
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Heatbath,
            1 => Self::StapleMetropolis,
            2 => Self::Metropolis,
            other => {
                log::warn!("unknown update method code {other}, using heatbath");
                Self::Heatbath
            }
        }
    }

    /// Decode a selector name. Unknown names fall back to heatbath with a
    /// warning.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "heatbath" => Self::Heatbath,
            "staple_metropolis" => Self::StapleMetropolis,
            "metropolis" => Self::Metropolis,
            other => {
                log::warn!("unknown update method {other:?}, using heatbath");
                Self::Heatbath
            }
        }
    }
}

deserialize_via_selector!(UpdateMethod);

/// Engine configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GaugeConfig {
    /// Spatial extent L.
    pub lattice_size: usize,
    /// Temporal extent T.
    pub time_extent: usize,
    /// Inverse coupling β.
    pub beta: f64,
    /// Temporal tadpole factor.
    pub ut: f64,
    /// Spatial tadpole factor.
    pub us: f64,
    /// Bare anisotropy χ.
    pub chi: f64,
    /// Gauge action.
    pub action: GaugeAction,
    /// Link update method.
    pub update_method: UpdateMethod,
    /// Sweeps between configurations returned by `next_config`.
    pub measurement_spacing: usize,
    /// Update same-coloured chunks concurrently.
    pub parallel: bool,
    /// Chunk edge for the update schedule.
    pub chunk_size: usize,
    /// Storage block shape; `None` picks the smallest edge ≥ 3 dividing
    /// each extent.
    pub block_shape: Option<[usize; N_DIM]>,
    /// RNG seed; `None` draws one from system entropy.
    pub seed: Option<u64>,
    /// Metropolis proposals per link visit.
    pub hits: usize,
    /// Start from Haar-random links instead of the identity.
    pub hot_start: bool,
}

impl Default for GaugeConfig {
    fn default() -> Self {
        Self {
            lattice_size: 4,
            time_extent: 4,
            beta: 5.5,
            ut: 1.0,
            us: 1.0,
            chi: 1.0,
            action: GaugeAction::WilsonPlaquette,
            update_method: UpdateMethod::Heatbath,
            measurement_spacing: 1,
            parallel: true,
            chunk_size: 2,
            block_shape: None,
            seed: None,
            hits: DEFAULT_METROPOLIS_HITS,
            hot_start: false,
        }
    }
}

/// Smallest edge ≥ 3 dividing `extent`, or `extent` itself.
#[must_use]
pub fn default_block_edge(extent: usize) -> usize {
    (MIN_DEFAULT_BLOCK_EDGE..=extent)
        .find(|e| extent % e == 0)
        .unwrap_or(extent)
}

impl GaugeConfig {
    /// Parse a JSON document; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// [`LatticeError::Config`] on malformed JSON.
    pub fn from_json(json: &str) -> Result<Self, LatticeError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Lattice extents `(T, L, L, L)`.
    #[must_use]
    pub const fn shape(&self) -> Coord {
        [
            self.time_extent,
            self.lattice_size,
            self.lattice_size,
            self.lattice_size,
        ]
    }

    /// Storage block shape, explicit or default.
    #[must_use]
    pub fn block_shape(&self) -> Coord {
        self.block_shape
            .unwrap_or_else(|| self.shape().map(default_block_edge))
    }

    /// Check extents and couplings.
    ///
    /// # Errors
    ///
    /// [`LatticeError::InvalidParameter`] naming the offending field.
    pub fn validate(&self) -> Result<(), LatticeError> {
        if self.lattice_size == 0 || self.time_extent == 0 {
            return Err(LatticeError::InvalidParameter(
                "lattice extents must be positive".into(),
            ));
        }
        if !self.beta.is_finite() || self.beta < 0.0 {
            return Err(LatticeError::InvalidParameter(format!(
                "beta must be finite and non-negative, got {}",
                self.beta
            )));
        }
        for (name, v) in [("ut", self.ut), ("us", self.us), ("chi", self.chi)] {
            if !v.is_finite() || v <= 0.0 {
                return Err(LatticeError::InvalidParameter(format!(
                    "{name} must be positive, got {v}"
                )));
            }
        }
        if self.measurement_spacing == 0 || self.hits == 0 {
            return Err(LatticeError::InvalidParameter(
                "measurement_spacing and hits must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Update rule resolved from (action, method).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateRule {
    /// SU(2)-subgroup heatbath from the staple.
    Heatbath,
    /// Pool proposals accepted on the staple-linearized ΔS.
    StapleMetropolis {
        /// Proposals per link visit.
        hits: usize,
    },
    /// Pool proposals accepted on explicitly evaluated ΔS.
    Metropolis {
        /// Proposals per link visit.
        hits: usize,
    },
}

impl UpdateRule {
    /// Pick the rule, falling back to loop-evaluated Metropolis for actions
    /// without a staple form.
    #[must_use]
    pub fn resolve(action: GaugeAction, method: UpdateMethod, hits: usize) -> Self {
        match method {
            UpdateMethod::Metropolis => Self::Metropolis { hits },
            _ if !action.has_staples() => {
                log::warn!("{method:?} needs staples, {action:?} has none: using Metropolis");
                Self::Metropolis { hits }
            }
            UpdateMethod::Heatbath => Self::Heatbath,
            UpdateMethod::StapleMetropolis => Self::StapleMetropolis { hits },
        }
    }
}

/// Fixed set of near-identity SU(3) proposals and their adjoints.
#[derive(Clone, Debug)]
pub struct ProposalPool {
    matrices: Vec<Su3Matrix>,
}

impl ProposalPool {
    /// Draw the pool from `rng`.
    pub fn new<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut matrices = Vec::with_capacity(2 * PROPOSAL_POOL_SIZE);
        for _ in 0..PROPOSAL_POOL_SIZE {
            let r = Su3Matrix::random_near_identity(rng, PROPOSAL_SPREAD);
            matrices.push(r);
            matrices.push(r.adjoint());
        }
        Self { matrices }
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.matrices.len()
    }

    /// Whether the pool is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.matrices.is_empty()
    }

    /// Uniformly chosen entry.
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> Su3Matrix {
        self.matrices[rng.random_range(0..self.matrices.len())]
    }
}

/// Field view with one chunk's μ-links replaced by a private copy.
struct ChunkView<'a> {
    base: &'a GaugeField,
    schedule: &'a Schedule,
    mu: usize,
    chunk: usize,
    links: Vec<Su3Matrix>,
}

impl<'a> ChunkView<'a> {
    fn new(base: &'a GaugeField, schedule: &'a Schedule, mu: usize, chunk: usize) -> Self {
        let links = schedule
            .chunk_sites(chunk)
            .map(|site| base.link(&site, mu))
            .collect();
        Self {
            base,
            schedule,
            mu,
            chunk,
            links,
        }
    }

    fn set(&mut self, site: &Coord, u: Su3Matrix) {
        let local = self.schedule.local_index(site);
        self.links[local] = u;
    }
}

impl LinkSource for ChunkView<'_> {
    fn shape(&self) -> Coord {
        self.base.shape()
    }

    fn link(&self, site: &Coord, mu: usize) -> Su3Matrix {
        if mu == self.mu && self.schedule.chunk_of(site) == self.chunk {
            self.links[self.schedule.local_index(site)]
        } else {
            self.base.link(site, mu)
        }
    }
}

/// A link source with one link replaced.
struct Substituted<'a, S: ?Sized> {
    inner: &'a S,
    site: Coord,
    mu: usize,
    link: Su3Matrix,
}

impl<S: LinkSource + ?Sized> LinkSource for Substituted<'_, S> {
    fn shape(&self) -> Coord {
        self.inner.shape()
    }

    fn link(&self, site: &Coord, mu: usize) -> Su3Matrix {
        if mu == self.mu && *site == self.site {
            self.link
        } else {
            self.inner.link(site, mu)
        }
    }
}

/// Outcome of updating one chunk.
struct ChunkUpdate {
    chunk: usize,
    links: Vec<Su3Matrix>,
    accepted: u64,
    proposed: u64,
}

/// Read-only state shared by all chunk tasks of a sweep.
struct SweepContext<'a> {
    terms: &'a ActionTerms,
    rule: UpdateRule,
    pool: &'a ProposalPool,
    schedule: &'a Schedule,
    seed: u64,
    sweep: u64,
}

impl SweepContext<'_> {
    fn update_chunk(&self, field: &GaugeField, mu: usize, chunk: usize) -> ChunkUpdate {
        let mut rng = ChaCha8Rng::seed_from_u64(stream_seed(self.seed, self.sweep, mu, chunk));
        let mut view = ChunkView::new(field, self.schedule, mu, chunk);
        let mut accepted = 0;
        let mut proposed = 0;
        let sites: Vec<Coord> = self.schedule.chunk_sites(chunk).collect();
        for site in &sites {
            let u = view.link(site, mu);
            let beta = self.terms.beta();
            let new = match self.rule {
                UpdateRule::Heatbath => {
                    let staple = self.terms.staple(&view, site, mu);
                    heatbath_link(u, &staple, beta, &mut rng)
                }
                UpdateRule::StapleMetropolis { hits } => {
                    let staple = self.terms.staple(&view, site, mu);
                    let mut current = u;
                    let mut s_old = self.terms.local_action_from_staple(&current, &staple);
                    for _ in 0..hits {
                        let candidate = self.pool.draw(&mut rng) * current;
                        let s_new = self.terms.local_action_from_staple(&candidate, &staple);
                        proposed += 1;
                        if metropolis_accept(s_new - s_old, &mut rng) {
                            current = candidate;
                            s_old = s_new;
                            accepted += 1;
                        }
                    }
                    current.reunitarize()
                }
                UpdateRule::Metropolis { hits } => {
                    let mut current = u;
                    let mut s_old = self.terms.local_action(&view, site, mu);
                    for _ in 0..hits {
                        let candidate = self.pool.draw(&mut rng) * current;
                        let trial = Substituted {
                            inner: &view,
                            site: *site,
                            mu,
                            link: candidate,
                        };
                        let s_new = self.terms.local_action(&trial, site, mu);
                        proposed += 1;
                        if metropolis_accept(s_new - s_old, &mut rng) {
                            current = candidate;
                            s_old = s_new;
                            accepted += 1;
                        }
                    }
                    current.reunitarize()
                }
            };
            view.set(site, new);
        }
        ChunkUpdate {
            chunk,
            links: view.links,
            accepted,
            proposed,
        }
    }
}

fn metropolis_accept<R: Rng + ?Sized>(delta_s: f64, rng: &mut R) -> bool {
    delta_s <= 0.0 || rng.random::<f64>() < (-delta_s).exp()
}

/// Quaternion product of SU(2) elements written as `a0 + i a·σ`.
#[must_use]
pub fn su2_mul(a: [f64; 4], b: [f64; 4]) -> [f64; 4] {
    [
        a[0] * b[0] - a[1] * b[1] - a[2] * b[2] - a[3] * b[3],
        a[0] * b[1] + b[0] * a[1] - (a[2] * b[3] - a[3] * b[2]),
        a[0] * b[2] + b[0] * a[2] - (a[3] * b[1] - a[1] * b[3]),
        a[0] * b[3] + b[0] * a[3] - (a[1] * b[2] - a[2] * b[1]),
    ]
}

fn open_unit<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    1.0 - rng.random::<f64>()
}

/// Draw `x0 ∈ [−1, 1]` with density `√(1−x0²) exp(α x0)`.
///
/// Returns `None` when the accept/reject loop exhausts its trials.
pub fn sample_su2_x0<R: Rng + ?Sized>(alpha: f64, rng: &mut R) -> Option<f64> {
    if alpha < HEATBATH_HAAR_THRESHOLD {
        let v = [gaussian(rng), gaussian(rng), gaussian(rng), gaussian(rng)];
        let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
        return Some(v[0] / norm.max(LATTICE_DIVISION_GUARD));
    }
    if alpha > HEATBATH_KP_THRESHOLD {
        for _ in 0..HEATBATH_MAX_TRIALS {
            let r1 = open_unit(rng);
            let r2 = open_unit(rng);
            let r3 = open_unit(rng);
            let r4 = open_unit(rng);
            let c = (std::f64::consts::TAU * r2).cos();
            let lambda_sq = -(r1.ln() + c * c * r3.ln()) / (2.0 * alpha);
            if r4 * r4 <= 1.0 - lambda_sq {
                return Some(1.0 - 2.0 * lambda_sq);
            }
        }
    } else {
        let floor = (-2.0 * alpha).exp();
        for _ in 0..HEATBATH_MAX_TRIALS {
            let r = open_unit(rng);
            let x0 = (1.0 + (r * (1.0 - floor) + floor).ln() / alpha).clamp(-1.0, 1.0);
            if rng.random::<f64>() <= (1.0 - x0 * x0).sqrt() {
                return Some(x0);
            }
        }
    }
    None
}

/// SU(2) element with the given `x0` and a uniformly random axis.
fn su2_with_x0<R: Rng + ?Sized>(x0: f64, rng: &mut R) -> [f64; 4] {
    let radius = (1.0 - x0 * x0).max(0.0).sqrt();
    let cos_theta = 2.0 * rng.random::<f64>() - 1.0;
    let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
    let phi = std::f64::consts::TAU * rng.random::<f64>();
    [
        x0,
        radius * sin_theta * phi.cos(),
        radius * sin_theta * phi.sin(),
        radius * cos_theta,
    ]
}

/// Cabibbo-Marinari heatbath update of one link with staple `a`.
pub fn heatbath_link<R: Rng + ?Sized>(
    u: Su3Matrix,
    staple: &Su3Matrix,
    beta: f64,
    rng: &mut R,
) -> Su3Matrix {
    let mut u = u;
    for &subgroup in &SU2_SUBGROUPS {
        let w = u * *staple;
        let a = w.su2_projection(subgroup);
        let k = a.iter().map(|v| v * v).sum::<f64>().sqrt();
        let alpha = 2.0 * beta * k / 3.0;
        let Some(x0) = sample_su2_x0(alpha, rng) else {
            log::warn!("heatbath sampler exhausted at alpha = {alpha:.3e}, keeping link");
            continue;
        };
        let x = su2_with_x0(x0, rng);
        let v_dagger = if k > LATTICE_DIVISION_GUARD {
            [a[0] / k, -a[1] / k, -a[2] / k, -a[3] / k]
        } else {
            [1.0, 0.0, 0.0, 0.0]
        };
        let r = su2_mul(x, v_dagger);
        u = Su3Matrix::embed_su2(subgroup, r) * u;
    }
    u.reunitarize()
}

/// Pure-gauge Monte Carlo engine.
#[derive(Debug)]
pub struct MonteCarloEngine {
    config: GaugeConfig,
    field: GaugeField,
    terms: ActionTerms,
    rule: UpdateRule,
    schedule: Schedule,
    parallel: bool,
    pool: ProposalPool,
    seed: u64,
    sweeps: u64,
    accepted: u64,
    proposed: u64,
}

impl MonteCarloEngine {
    /// Build an engine with a cold or hot start per `config.hot_start`.
    ///
    /// # Errors
    ///
    /// [`LatticeError`] for invalid parameters or shapes.
    pub fn new(config: GaugeConfig) -> Result<Self, LatticeError> {
        config.validate()?;
        let seed = config.seed.unwrap_or_else(|| rand::rng().random());
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let field = if config.hot_start {
            GaugeField::hot_start(&config.shape(), &config.block_shape(), &mut rng)?
        } else {
            GaugeField::cold_start(&config.shape(), &config.block_shape())?
        };
        Self::assemble(config, field, seed, &mut rng)
    }

    /// Build an engine that continues from an existing field.
    ///
    /// # Errors
    ///
    /// [`LatticeError::InvalidShape`] if the field does not match the
    /// configured extents.
    pub fn with_field(config: GaugeConfig, field: GaugeField) -> Result<Self, LatticeError> {
        config.validate()?;
        if field.shape() != config.shape() {
            return Err(LatticeError::InvalidShape(format!(
                "field {:?} does not match configuration {:?}",
                field.shape(),
                config.shape()
            )));
        }
        let seed = config.seed.unwrap_or_else(|| rand::rng().random());
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        Self::assemble(config, field, seed, &mut rng)
    }

    fn assemble(
        config: GaugeConfig,
        field: GaugeField,
        seed: u64,
        rng: &mut ChaCha8Rng,
    ) -> Result<Self, LatticeError> {
        let couplings = Couplings::new(config.chi, config.ut, config.us);
        let terms = ActionTerms::new(config.action, config.beta, &couplings);
        let rule = UpdateRule::resolve(config.action, config.update_method, config.hits);
        let shape = config.shape();
        let (schedule, chunked) = match Schedule::new(shape, config.chunk_size) {
            Ok(schedule) => (schedule, true),
            Err(e) => {
                if config.parallel {
                    log::warn!("{e}; updating serially");
                }
                (Schedule::single(shape), false)
            }
        };
        let conflict_free = chunked && schedule.is_conflict_free(&terms);
        if config.parallel && chunked && !conflict_free {
            log::warn!(
                "chunk size {} is not conflict-free for {:?}; updating serially",
                config.chunk_size,
                config.action
            );
        }
        let parallel = config.parallel && conflict_free;
        let pool = ProposalPool::new(rng);
        log::info!(
            "gauge engine: {:?} β={} {:?} {} chunks ({})",
            config.action,
            config.beta,
            rule,
            schedule.num_chunks(),
            if parallel { "parallel" } else { "serial" }
        );
        Ok(Self {
            config,
            field,
            terms,
            rule,
            schedule,
            parallel,
            pool,
            seed,
            sweeps: 0,
            accepted: 0,
            proposed: 0,
        })
    }

    /// Current configuration.
    #[must_use]
    pub const fn field(&self) -> &GaugeField {
        &self.field
    }

    /// Consume the engine, keeping the field.
    #[must_use]
    pub fn into_field(self) -> GaugeField {
        self.field
    }

    /// Engine configuration.
    #[must_use]
    pub const fn config(&self) -> &GaugeConfig {
        &self.config
    }

    /// Resolved update rule.
    #[must_use]
    pub const fn rule(&self) -> UpdateRule {
        self.rule
    }

    /// Whether sweeps run chunks concurrently.
    #[must_use]
    pub const fn is_parallel(&self) -> bool {
        self.parallel
    }

    /// Seed actually in use.
    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    /// Sweeps performed so far.
    #[must_use]
    pub const fn update_count(&self) -> u64 {
        self.sweeps
    }

    /// Metropolis acceptance rate since construction, if any proposals were
    /// made.
    #[must_use]
    pub fn acceptance_rate(&self) -> Option<f64> {
        #[allow(clippy::cast_precision_loss)]
        (self.proposed > 0).then(|| self.accepted as f64 / self.proposed as f64)
    }

    /// One sweep over every link.
    pub fn update(&mut self) {
        let ctx = SweepContext {
            terms: &self.terms,
            rule: self.rule,
            pool: &self.pool,
            schedule: &self.schedule,
            seed: self.seed,
            sweep: self.sweeps,
        };
        for mu in 0..N_DIM {
            for color in 0..2 {
                let chunks = ctx.schedule.chunks(color);
                if self.parallel {
                    let field = &self.field;
                    let results: Vec<ChunkUpdate> = chunks
                        .par_iter()
                        .map(|&chunk| ctx.update_chunk(field, mu, chunk))
                        .collect();
                    for result in results {
                        merge(&mut self.field, ctx.schedule, mu, &result);
                        self.accepted += result.accepted;
                        self.proposed += result.proposed;
                    }
                } else {
                    for &chunk in chunks {
                        let result = ctx.update_chunk(&self.field, mu, chunk);
                        merge(&mut self.field, ctx.schedule, mu, &result);
                        self.accepted += result.accepted;
                        self.proposed += result.proposed;
                    }
                }
            }
        }
        self.sweeps += 1;
        if log::log_enabled!(log::Level::Debug) {
            log::debug!(
                "sweep {}: plaquette = {:.8}",
                self.sweeps,
                self.field.average_plaquette()
            );
        }
    }

    /// `n` sweeps.
    pub fn sweep(&mut self, n: usize) {
        for _ in 0..n {
            self.update();
        }
    }

    /// `n` sweeps discarded for equilibration.
    pub fn thermalize(&mut self, n: usize) {
        self.sweep(n);
        log::info!(
            "thermalized {n} sweeps: plaquette = {:.8}",
            self.field.average_plaquette()
        );
    }

    /// Advance by the measurement spacing and return the new configuration.
    pub fn next_config(&mut self) -> &GaugeField {
        self.sweep(self.config.measurement_spacing);
        &self.field
    }
}

fn merge(field: &mut GaugeField, schedule: &Schedule, mu: usize, result: &ChunkUpdate) {
    for (site, u) in schedule.chunk_sites(result.chunk).zip(&result.links) {
        field.set_link(&site, mu, *u);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(action: GaugeAction, method: UpdateMethod) -> GaugeConfig {
        GaugeConfig {
            action,
            update_method: method,
            seed: Some(7),
            ..GaugeConfig::default()
        }
    }

    #[test]
    fn default_block_edges() {
        assert_eq!(default_block_edge(4), 4);
        assert_eq!(default_block_edge(6), 3);
        assert_eq!(default_block_edge(8), 4);
        assert_eq!(default_block_edge(2), 2);
        assert_eq!(default_block_edge(10), 5);
    }

    #[test]
    fn config_from_partial_json() {
        let c = GaugeConfig::from_json(
            r#"{"lattice_size": 6, "beta": 6.0, "update_method": "staple_metropolis"}"#,
        )
        .unwrap();
        assert_eq!(c.lattice_size, 6);
        assert_eq!(c.time_extent, 4);
        assert_eq!(c.update_method, UpdateMethod::StapleMetropolis);
        assert_eq!(c.block_shape(), [4, 3, 3, 3]);
        assert!(GaugeConfig::from_json("{not json").is_err());
    }

    #[test]
    fn unknown_selectors_fall_back_to_defaults() {
        let c = GaugeConfig::from_json(r#"{"update_method": "overrelaxation", "action": "bogus"}"#)
            .unwrap();
        assert_eq!(c.update_method, UpdateMethod::Heatbath);
        assert_eq!(c.action, GaugeAction::WilsonPlaquette);

        let c = GaugeConfig::from_json(r#"{"update_method": 2, "action": 7}"#).unwrap();
        assert_eq!(c.update_method, UpdateMethod::Metropolis);
        assert_eq!(c.action, GaugeAction::WilsonPlaquette);

        let c = GaugeConfig::from_json(
            r#"{"action": "twisted_rectangle_improved", "update_method": "overrelaxation"}"#,
        )
        .unwrap();
        assert_eq!(c.update_method, UpdateMethod::Heatbath);
        let engine = MonteCarloEngine::new(GaugeConfig {
            seed: Some(1),
            ..c
        })
        .unwrap();
        assert!(matches!(engine.rule(), UpdateRule::Metropolis { .. }));

        let round_trip: GaugeConfig =
            serde_json::from_str(&serde_json::to_string(&GaugeConfig::default()).unwrap()).unwrap();
        assert_eq!(round_trip, GaugeConfig::default());
    }

    #[test]
    fn invalid_config_rejected() {
        let c = GaugeConfig {
            beta: -1.0,
            ..GaugeConfig::default()
        };
        assert!(MonteCarloEngine::new(c).is_err());
        let c = GaugeConfig {
            us: 0.0,
            ..GaugeConfig::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn twisted_action_falls_back_to_metropolis() {
        let rule = UpdateRule::resolve(
            GaugeAction::TwistedRectangleImproved,
            UpdateMethod::Heatbath,
            10,
        );
        assert_eq!(rule, UpdateRule::Metropolis { hits: 10 });
        assert_eq!(
            UpdateRule::resolve(GaugeAction::RectangleImproved, UpdateMethod::Heatbath, 10),
            UpdateRule::Heatbath
        );
    }

    #[test]
    fn selector_fallbacks() {
        assert_eq!(UpdateMethod::from_code(2), UpdateMethod::Metropolis);
        assert_eq!(UpdateMethod::from_code(-3), UpdateMethod::Heatbath);
        assert_eq!(UpdateMethod::from_name("nope"), UpdateMethod::Heatbath);
    }

    #[test]
    fn pool_holds_adjoint_pairs() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let pool = ProposalPool::new(&mut rng);
        assert_eq!(pool.len(), 2 * PROPOSAL_POOL_SIZE);
        let product = pool.matrices[0] * pool.matrices[1];
        assert!((product - Su3Matrix::IDENTITY).norm_sq() < 1e-20);
    }

    #[test]
    fn quaternion_product_matches_embedding() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let a = su2_with_x0(0.3, &mut rng);
        let b = su2_with_x0(-0.6, &mut rng);
        let sub = (0, 2);
        let lhs = Su3Matrix::embed_su2(sub, su2_mul(a, b));
        let rhs = Su3Matrix::embed_su2(sub, a) * Su3Matrix::embed_su2(sub, b);
        assert!((lhs - rhs).norm_sq() < 1e-24);
    }

    #[test]
    fn heatbath_sampler_mean_matches_density() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        for alpha in [0.5, 4.0] {
            let n = 20_000;
            let mean: f64 = (0..n)
                .map(|_| sample_su2_x0(alpha, &mut rng).unwrap())
                .sum::<f64>()
                / f64::from(n);
            let (mut num, mut den) = (0.0, 0.0);
            let steps = 20_000;
            for i in 0..steps {
                let x = -1.0 + 2.0 * (f64::from(i) + 0.5) / f64::from(steps);
                let w = (1.0 - x * x).sqrt() * (alpha * x).exp();
                num += x * w;
                den += w;
            }
            let expected = num / den;
            assert!((mean - expected).abs() < 0.02, "alpha {alpha}: {mean} vs {expected}");
        }
    }

    #[test]
    fn heatbath_keeps_links_in_su3() {
        let mut engine = MonteCarloEngine::new(config(
            GaugeAction::WilsonPlaquette,
            UpdateMethod::Heatbath,
        ))
        .unwrap();
        engine.sweep(3);
        assert!(engine.field().max_su3_deviation() < 1e-10);
        assert_eq!(engine.update_count(), 3);
        let p = engine.field().average_plaquette();
        assert!(p < 1.0 && p > 0.2, "plaquette {p}");
    }

    #[test]
    fn parallel_matches_serial_for_every_chunk_size() {
        for chunk_size in [1, 2, 4] {
            let mut results = Vec::new();
            for parallel in [true, false] {
                let c = GaugeConfig {
                    parallel,
                    chunk_size,
                    hot_start: true,
                    ..config(GaugeAction::WilsonPlaquette, UpdateMethod::Heatbath)
                };
                let mut engine = MonteCarloEngine::new(c).unwrap();
                assert_eq!(engine.is_parallel(), parallel);
                engine.sweep(2);
                results.push(engine.into_field());
            }
            for site in 0..results[0].volume() {
                assert_eq!(
                    results[0].site_links(site),
                    results[1].site_links(site),
                    "chunk size {chunk_size}"
                );
            }
        }
    }

    #[test]
    fn conflicting_schedule_runs_serially() {
        let c = GaugeConfig {
            chunk_size: 1,
            ..config(GaugeAction::RectangleImproved, UpdateMethod::Heatbath)
        };
        let engine = MonteCarloEngine::new(c).unwrap();
        assert!(!engine.is_parallel());
        let c = GaugeConfig {
            chunk_size: 3,
            ..config(GaugeAction::WilsonPlaquette, UpdateMethod::Heatbath)
        };
        assert!(!MonteCarloEngine::new(c).unwrap().is_parallel());
    }

    #[test]
    fn indivisible_chunk_size_falls_back_to_serial_and_matches_it() {
        let base = GaugeConfig {
            chunk_size: 3,
            hot_start: true,
            ..config(GaugeAction::WilsonPlaquette, UpdateMethod::Heatbath)
        };
        let mut requested = MonteCarloEngine::new(GaugeConfig {
            parallel: true,
            ..base.clone()
        })
        .unwrap();
        assert!(!requested.is_parallel());
        assert_eq!(requested.schedule.num_chunks(), 1);
        let mut serial = MonteCarloEngine::new(GaugeConfig {
            parallel: false,
            ..base
        })
        .unwrap();
        requested.sweep(1);
        serial.sweep(1);
        assert_eq!(
            requested.field().average_plaquette(),
            serial.field().average_plaquette()
        );
    }

    #[test]
    fn metropolis_variants_reduce_plaquette_from_cold() {
        for method in [UpdateMethod::StapleMetropolis, UpdateMethod::Metropolis] {
            let mut engine =
                MonteCarloEngine::new(config(GaugeAction::WilsonPlaquette, method)).unwrap();
            engine.sweep(2);
            let rate = engine.acceptance_rate().unwrap();
            assert!(rate > 0.05 && rate < 0.95, "{method:?} acceptance {rate}");
            assert!(engine.field().average_plaquette() < 1.0);
            assert!(engine.field().max_su3_deviation() < 1e-10);
        }
    }

    #[test]
    fn twisted_action_updates() {
        let mut engine = MonteCarloEngine::new(config(
            GaugeAction::TwistedRectangleImproved,
            UpdateMethod::Heatbath,
        ))
        .unwrap();
        assert_eq!(engine.rule(), UpdateRule::Metropolis { hits: 10 });
        let first = engine.next_config().average_plaquette();
        assert!(first < 1.0);
    }
}
