//! Linear combinations of products (translates
//! `ql/models/marketmodels/products/compositeproduct.hpp`,
//! `multiproductcomposite.hpp` and `singleproductcomposite.hpp`).
//!
//! Components are collected in a [`CompositeBuilder`] and frozen by
//! `finalize`, which merges the evolution times and the cash-flow times of
//! all components.  A builder cannot be simulated and a finalized composite
//! cannot grow, so the add-then-finalize protocol is checked by the type
//! system.

use super::{CashFlow, MultiProduct};
use crate::{
    curve_state::CurveState, evolution_description::EvolutionDescription, utilities::merge_times,
};
use ql_core::{ensure, errors::Result, Real, Size, Time};
use tracing::debug;

/// How the legs of the components are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    /// Every leg of every component is a product of its own.
    PerLeg,
    /// All legs of all components are summed into one product.
    Summed,
}

#[derive(Clone)]
struct Component {
    product: Box<dyn MultiProduct>,
    multiplier: Real,
    done: bool,
    buffers: Vec<Vec<CashFlow>>,
    // local cash-flow time index -> composite index
    time_indices: Vec<Size>,
    // per composite step
    is_relevant: Vec<bool>,
    leg_offset: Size,
}

/// Collects the components of a composite product.
#[derive(Clone, Default)]
pub struct CompositeBuilder {
    components: Vec<(Box<dyn MultiProduct>, Real)>,
}

impl CompositeBuilder {
    /// An empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `product` scaled by `multiplier`.
    ///
    /// Every component must share the rate times of the first one.
    pub fn add(&mut self, product: Box<dyn MultiProduct>, multiplier: Real) -> Result<&mut Self> {
        if let Some((first, _)) = self.components.first() {
            ensure!(
                first.evolution().rate_times() == product.evolution().rate_times(),
                "component {} has different rate times",
                self.components.len()
            );
        }
        self.components.push((product, multiplier));
        Ok(self)
    }

    /// Add `product` scaled by `-multiplier`.
    pub fn subtract(&mut self, product: Box<dyn MultiProduct>, multiplier: Real) -> Result<&mut Self> {
        self.add(product, -multiplier)
    }

    /// Number of components added so far.
    pub fn len(&self) -> Size {
        self.components.len()
    }

    /// Whether no component has been added.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    fn finalize(self, aggregation: Aggregation) -> Result<CompositeCore> {
        ensure!(!self.components.is_empty(), "no product added to the composite");
        let rate_times = self.components[0].0.evolution().rate_times().to_vec();

        let evolution_grids: Vec<&[Time]> = self
            .components
            .iter()
            .map(|(p, _)| p.evolution().evolution_times())
            .collect();
        let (evolution_times, relevance_masks) = merge_times(&evolution_grids);

        // rates relevant at a composite step: the hull of the components'
        let relevance = (0..evolution_times.len())
            .map(|step| {
                let mut window: Option<(Size, Size)> = None;
                for ((product, _), mask) in self.components.iter().zip(&relevance_masks) {
                    if !mask[step] {
                        continue;
                    }
                    let local = mask[..step].iter().filter(|&&b| b).count();
                    let (first, last) = product.evolution().relevance_rates()[local];
                    window = Some(match window {
                        Some((f, l)) => (f.min(first), l.max(last)),
                        None => (first, last),
                    });
                }
                window.unwrap_or((0, 0))
            })
            .collect();
        let evolution =
            EvolutionDescription::new(rate_times, evolution_times, None, Some(relevance))?;

        let mut cash_flow_times: Vec<Time> = self
            .components
            .iter()
            .flat_map(|(p, _)| p.possible_cash_flow_times().iter().copied())
            .collect();
        cash_flow_times.sort_by(|a, b| a.total_cmp(b));
        cash_flow_times.dedup();

        let mut leg_offset = 0;
        let mut max_cash_flows = 0;
        let mut components = Vec::with_capacity(self.components.len());
        for ((product, multiplier), is_relevant) in self.components.into_iter().zip(relevance_masks) {
            let legs = product.number_of_products();
            let per_step = product.max_number_of_cash_flows_per_product_per_step();
            max_cash_flows = match aggregation {
                Aggregation::PerLeg => max_cash_flows.max(per_step),
                Aggregation::Summed => max_cash_flows + legs * per_step,
            };
            let time_indices = product
                .possible_cash_flow_times()
                .iter()
                .map(|&t| cash_flow_times.partition_point(|&x| x < t))
                .collect();
            let buffers = super::cash_flow_buffers(product.as_ref());
            components.push(Component {
                product,
                multiplier,
                done: false,
                buffers,
                time_indices,
                is_relevant,
                leg_offset,
            });
            if aggregation == Aggregation::PerLeg {
                leg_offset += legs;
            }
        }
        let number_of_products = match aggregation {
            Aggregation::PerLeg => leg_offset,
            Aggregation::Summed => 1,
        };
        debug!(
            components = components.len(),
            steps = evolution.number_of_steps(),
            cash_flow_times = cash_flow_times.len(),
            "composite product finalized"
        );

        Ok(CompositeCore {
            aggregation,
            components,
            evolution,
            cash_flow_times,
            number_of_products,
            max_cash_flows,
            current_index: 0,
        })
    }
}

#[derive(Clone)]
struct CompositeCore {
    aggregation: Aggregation,
    components: Vec<Component>,
    evolution: EvolutionDescription,
    cash_flow_times: Vec<Time>,
    number_of_products: Size,
    max_cash_flows: Size,
    current_index: Size,
}

impl CompositeCore {
    fn reset(&mut self) {
        for component in &mut self.components {
            component.product.reset();
            component.done = false;
        }
        self.current_index = 0;
    }

    fn next_time_step(
        &mut self,
        state: &dyn CurveState,
        cash_flows: &mut [Vec<CashFlow>],
    ) -> Result<bool> {
        cash_flows.iter_mut().for_each(Vec::clear);
        let step = self.current_index;
        for component in &mut self.components {
            if component.done || !component.is_relevant[step] {
                continue;
            }
            component.done = component
                .product
                .next_time_step(state, &mut component.buffers)?;
            for (leg, flows) in component.buffers.iter().enumerate() {
                let target = match self.aggregation {
                    Aggregation::PerLeg => component.leg_offset + leg,
                    Aggregation::Summed => 0,
                };
                cash_flows[target].extend(flows.iter().map(|cf| {
                    CashFlow::new(
                        component.time_indices[cf.time_index],
                        cf.amount * component.multiplier,
                    )
                }));
            }
        }
        self.current_index += 1;
        Ok(self.components.iter().all(|c| c.done)
            || self.current_index == self.evolution.number_of_steps())
    }
}

macro_rules! composite_product {
    ($name:ident, $aggregation:expr) => {
        impl $name {
            /// Freeze the components collected in `builder`.
            pub fn finalize(builder: CompositeBuilder) -> Result<Self> {
                Ok(Self(builder.finalize($aggregation)?))
            }

            /// Number of components.
            pub fn number_of_components(&self) -> Size {
                self.0.components.len()
            }
        }

        impl MultiProduct for $name {
            fn evolution(&self) -> &EvolutionDescription {
                &self.0.evolution
            }

            fn possible_cash_flow_times(&self) -> &[Time] {
                &self.0.cash_flow_times
            }

            fn number_of_products(&self) -> Size {
                self.0.number_of_products
            }

            fn max_number_of_cash_flows_per_product_per_step(&self) -> Size {
                self.0.max_cash_flows
            }

            fn reset(&mut self) {
                self.0.reset();
            }

            fn next_time_step(
                &mut self,
                state: &dyn CurveState,
                cash_flows: &mut [Vec<CashFlow>],
            ) -> Result<bool> {
                self.0.next_time_step(state, cash_flows)
            }

            fn clone_box(&self) -> Box<dyn MultiProduct> {
                Box::new(self.clone())
            }
        }
    };
}

/// Composite keeping every leg of every component as a separate product.
///
/// Corresponds to `QuantLib::MultiProductComposite`.
#[derive(Clone)]
pub struct MultiProductComposite(CompositeCore);

/// Composite summing all legs of all components into one product.
///
/// Corresponds to `QuantLib::SingleProductComposite`.
#[derive(Clone)]
pub struct SingleProductComposite(CompositeCore);

composite_product!(MultiProductComposite, Aggregation::PerLeg);
composite_product!(SingleProductComposite, Aggregation::Summed);
