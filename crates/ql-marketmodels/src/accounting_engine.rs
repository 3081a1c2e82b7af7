//! Path valuation of products (translates
//! `ql/models/marketmodels/accountingengine.hpp`).
//!
//! # Overview
//!
//! * [`AccountingEngine`]: values a [`MultiProduct`] path by path on one
//!   evolver
//! * [`ParallelConfig`]: when and how to split paths across rayon workers
//! * [`parallel_path_values`]: path-parallel valuation, one evolver and one
//!   product copy per chunk, statistics merged at the end

use crate::{
    discounter::MarketModelDiscounter,
    evolution_description::check_compatibility,
    evolvers::{EvolverStatus, MarketModelEvolver},
    products::{cash_flow_buffers, CashFlow, MultiProduct},
};
use ql_core::{ensure, errors::Result, Real, Size};
use ql_math::SequenceStatistics;
use rayon::prelude::*;
use tracing::{debug, info};

// ─── AccountingEngine ─────────────────────────────────────────────────────────

/// Values the cash flows of a product along simulated paths.
///
/// Every cash flow is converted into units of the step numeraire through a
/// [`MarketModelDiscounter`], divided by the numeraire rebasing accumulated
/// so far on the path, summed, and finally multiplied by the time-zero
/// value of the initial numeraire bond.
///
/// Corresponds to `QuantLib::AccountingEngine`.
pub struct AccountingEngine {
    evolver: Box<dyn MarketModelEvolver>,
    product: Box<dyn MultiProduct>,
    initial_numeraire_value: Real,
    discounters: Vec<MarketModelDiscounter>,
    cash_flows: Vec<Vec<CashFlow>>,
    numeraires_held: Vec<Real>,
}

impl AccountingEngine {
    /// Engine valuing `product` on paths of `evolver`.
    ///
    /// `initial_numeraire_value` is today's price of the numeraire bond of
    /// the first step.
    pub fn new(
        evolver: Box<dyn MarketModelEvolver>,
        product: Box<dyn MultiProduct>,
        initial_numeraire_value: Real,
    ) -> Result<Self> {
        check_compatibility(evolver.evolution(), product.evolution())?;
        ensure!(
            evolver.current_step() == 0,
            "accounting requires paths starting at step 0, evolver starts at {}",
            evolver.current_step()
        );
        let rate_times = product.evolution().rate_times();
        let discounters = product
            .possible_cash_flow_times()
            .iter()
            .map(|&t| MarketModelDiscounter::new(t, rate_times))
            .collect::<Result<Vec<_>>>()?;
        let cash_flows = cash_flow_buffers(product.as_ref());
        let numeraires_held = vec![0.0; product.number_of_products()];
        Ok(Self {
            evolver,
            product,
            initial_numeraire_value,
            discounters,
            cash_flows,
            numeraires_held,
        })
    }

    /// Number of values produced per path.
    pub fn number_of_products(&self) -> Size {
        self.numeraires_held.len()
    }

    /// Simulate one path and return the value of every product on it.
    pub fn single_path_values(&mut self) -> Result<&[Real]> {
        self.numeraires_held.fill(0.0);
        self.product.reset();
        self.evolver.start_new_path()?;

        loop {
            let step = self.evolver.current_step();
            self.evolver.advance_step()?;
            let principal = self.evolver.numeraire_rebasing();
            let state = self.evolver.current_state();
            let done = self.product.next_time_step(state, &mut self.cash_flows)?;
            let numeraire = self.evolver.numeraires()[step];

            for (held, flows) in self.numeraires_held.iter_mut().zip(&self.cash_flows) {
                for cf in flows {
                    let bonds = self.discounters[cf.time_index].numeraire_bonds(state, numeraire)?;
                    *held += cf.amount * bonds / principal;
                }
            }

            if done || self.evolver.status() == EvolverStatus::Done {
                break;
            }
        }

        for held in &mut self.numeraires_held {
            *held *= self.initial_numeraire_value;
        }
        Ok(&self.numeraires_held)
    }

    /// Simulate `paths` paths, adding each path's values to `stats`.
    pub fn multiple_path_values(&mut self, stats: &mut SequenceStatistics, paths: Size) -> Result<()> {
        ensure!(
            stats.size() == self.number_of_products(),
            "statistics of dimension {} for {} products",
            stats.size(),
            self.number_of_products()
        );
        for _ in 0..paths {
            let values = self.single_path_values()?;
            stats.add(values)?;
        }
        debug!(paths, samples = stats.samples(), "accounting engine paths simulated");
        Ok(())
    }
}

// ─── Path-level parallelism ───────────────────────────────────────────────────

/// Configuration of path-parallel valuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParallelConfig {
    /// Minimum paths per thread before parallelisation kicks in.
    pub min_paths_per_thread: usize,
    /// Paths per chunk, each chunk owning one evolver (0 = one chunk per
    /// thread).
    pub chunk_size: usize,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            min_paths_per_thread: 100,
            chunk_size: 0,
        }
    }
}

impl ParallelConfig {
    /// Configuration with the given minimum paths per thread.
    pub fn with_min_paths(min_paths_per_thread: usize) -> Self {
        Self {
            min_paths_per_thread,
            ..Default::default()
        }
    }

    /// Set the chunk size.
    ///
    /// Results only depend on the chunk size, not on the number of threads,
    /// so a fixed chunk size gives reproducible estimates.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Whether `paths` are worth spreading over the rayon pool.
    pub fn should_parallelise(&self, paths: usize) -> bool {
        paths >= self
            .min_paths_per_thread
            .saturating_mul(rayon::current_num_threads())
    }

    /// Paths per chunk for `paths` paths.
    pub fn effective_chunk_size(&self, paths: usize) -> usize {
        if self.chunk_size > 0 {
            self.chunk_size
        } else {
            paths.div_ceil(rayon::current_num_threads()).max(1)
        }
    }
}

/// Value `product` over `paths` paths split into chunks.
///
/// `make_evolver(chunk)` must return a fresh evolver whose Brownian
/// generator is independent for each chunk index (e.g. built from
/// [`MtBrownianGeneratorFactory::for_stream`]).  Every chunk values its own
/// copy of the product; chunk statistics are merged in chunk order.
///
/// [`MtBrownianGeneratorFactory::for_stream`]: crate::brownian_generators::MtBrownianGeneratorFactory::for_stream
pub fn parallel_path_values<F>(
    make_evolver: F,
    product: &dyn MultiProduct,
    initial_numeraire_value: Real,
    paths: Size,
    config: &ParallelConfig,
) -> Result<SequenceStatistics>
where
    F: Fn(Size) -> Result<Box<dyn MarketModelEvolver>> + Sync,
{
    let chunk_size = config.effective_chunk_size(paths);
    let chunks = paths.div_ceil(chunk_size);
    let dimension = product.number_of_products();

    let run_chunk = |chunk: Size| -> Result<SequenceStatistics> {
        let chunk_paths = chunk_size.min(paths - chunk * chunk_size);
        let mut engine =
            AccountingEngine::new(make_evolver(chunk)?, product.clone_box(), initial_numeraire_value)?;
        let mut stats = SequenceStatistics::new(dimension);
        engine.multiple_path_values(&mut stats, chunk_paths)?;
        Ok(stats)
    };

    let parallel = config.should_parallelise(paths);
    let partials = if parallel {
        (0..chunks)
            .into_par_iter()
            .map(run_chunk)
            .collect::<Result<Vec<_>>>()?
    } else {
        (0..chunks).map(run_chunk).collect::<Result<Vec<_>>>()?
    };

    let mut total = SequenceStatistics::new(dimension);
    for partial in &partials {
        total.merge(partial)?;
    }
    info!(
        paths,
        chunks,
        parallel,
        mean = ?total.mean(),
        "path-parallel valuation finished"
    );
    Ok(total)
}
