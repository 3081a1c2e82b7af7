//! Products priced by simulation (translates
//! `ql/models/marketmodels/multiproduct.hpp` and
//! `ql/models/marketmodels/products/`).
//!
//! A product is driven step by step by the accounting engine: after every
//! evolution step it inspects the current [`CurveState`] and emits cash
//! flows.  Each cash flow names a payment time through an index into the
//! product's own [`possible_cash_flow_times`](MultiProduct::possible_cash_flow_times),
//! which need not coincide with the evolution times.

mod call_specified;
mod composite;
mod exercise_adapter;
mod multistep;
mod path_dependent;

pub use call_specified::CallSpecifiedMultiProduct;
pub use composite::{Aggregation, CompositeBuilder, MultiProductComposite, SingleProductComposite};
pub use exercise_adapter::ExerciseAdapter;
pub use multistep::{MultiStepCaplets, MultiStepForwards, MultiStepNothing, MultiStepSwap};
pub use path_dependent::{ObservationFn, PathDependentProduct, PathObservations, PaymentFn};

use crate::{curve_state::CurveState, evolution_description::EvolutionDescription};
use ql_core::{clone_trait_object, ensure, errors::Result, Real, Size, Time};

/// One payment emitted by a product.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CashFlow {
    /// Index into the product's possible cash-flow times.
    pub time_index: Size,
    /// Amount paid (in currency units at the payment time).
    pub amount: Real,
}

impl CashFlow {
    /// A cash flow of `amount` paid at possible cash-flow time `time_index`.
    pub fn new(time_index: Size, amount: Real) -> Self {
        Self { time_index, amount }
    }
}

/// A bundle of products sharing one evolution.
///
/// `reset` rewinds the product; then `next_time_step` is called once per
/// evolution step until it reports that no further cash flow can occur.
///
/// Corresponds to `QuantLib::MarketModelMultiProduct`.
pub trait MultiProduct: Send + Sync {
    /// Rate times, evolution times and relevant rates.
    fn evolution(&self) -> &EvolutionDescription;

    /// Payment times referenced by the emitted cash flows.
    fn possible_cash_flow_times(&self) -> &[Time];

    /// Number of products (legs) valued together.
    fn number_of_products(&self) -> Size;

    /// Upper bound on the cash flows any product emits in one step.
    fn max_number_of_cash_flows_per_product_per_step(&self) -> Size;

    /// Rewind to the first evolution step.
    fn reset(&mut self);

    /// Consume the state after the next evolution step.
    ///
    /// `cash_flows` holds one buffer per product; each is cleared and
    /// refilled.  Returns `true` once no further cash flow can occur.
    fn next_time_step(
        &mut self,
        state: &dyn CurveState,
        cash_flows: &mut [Vec<CashFlow>],
    ) -> Result<bool>;

    /// Deep copy, including the position within the current path.
    fn clone_box(&self) -> Box<dyn MultiProduct>;
}

clone_trait_object!(MultiProduct);

/// Empty per-product cash-flow buffers sized for `product`.
pub fn cash_flow_buffers(product: &dyn MultiProduct) -> Vec<Vec<CashFlow>> {
    let capacity = product.max_number_of_cash_flows_per_product_per_step();
    (0..product.number_of_products())
        .map(|_| Vec::with_capacity(capacity))
        .collect()
}

// Shared shape checks for the per-rate products: one accrual and one
// payment time per rate.
fn check_per_rate_inputs(
    rate_times: &[Time],
    accruals: &[Time],
    payment_times: &[Time],
    what: &str,
) -> Result<()> {
    let n = rate_times.len().saturating_sub(1);
    ensure!(
        accruals.len() == n,
        "{what}: {} accruals given for {n} rates",
        accruals.len()
    );
    ensure!(
        payment_times.len() == n,
        "{what}: {} payment times given for {n} rates",
        payment_times.len()
    );
    for (i, (&payment, &reset)) in payment_times.iter().zip(rate_times).enumerate() {
        ensure!(
            payment >= reset,
            "{what}: payment time {payment} of rate {i} precedes its reset {reset}"
        );
    }
    Ok(())
}

// Evolution at the reset time of every rate, each step relevant to its own
// rate only.
fn reset_time_evolution(rate_times: &[Time]) -> Result<EvolutionDescription> {
    let n = rate_times.len().saturating_sub(1);
    ensure!(n > 0, "at least two rate times required");
    let evolution_times = rate_times[..n].to_vec();
    let relevance = (0..n).map(|i| (i, i + 1)).collect();
    EvolutionDescription::new(rate_times.to_vec(), evolution_times, None, Some(relevance))
}
