//! Re-expressing a forward-rate model in the coterminal-swap basis
//! (translates `ql/models/marketmodels/models/fwdtocotswapadapter.hpp`).

use crate::{
    curve_state::{CurveState, LmmCurveState},
    evolution_description::EvolutionDescription,
    market_model::MarketModel,
    swap_forward_mappings::coterminal_swap_zed_matrix,
};
use ql_core::{ensure, ensure_index, errors::Result, Rate, Size, Spread};
use ql_math::Matrix;
use std::sync::Arc;

/// Coterminal-swap-rate market model obtained from a forward-rate one.
///
/// The pseudo-roots are the forward-rate pseudo-roots premultiplied by the
/// zed matrix frozen at the initial curve; rows of expired swap rates are
/// zeroed.  Only constant displacements are supported, so that the swap
/// rates carry the same displacement as the forwards.
///
/// Corresponds to `QuantLib::FwdToCotSwapAdapter`.
#[derive(Clone)]
pub struct FwdToCotSwapAdapter {
    forward_model: Arc<dyn MarketModel>,
    initial_rates: Vec<Rate>,
    displacements: Vec<Spread>,
    pseudo_roots: Vec<Matrix>,
}

impl FwdToCotSwapAdapter {
    /// Wrap `forward_model`.
    pub fn new(forward_model: Arc<dyn MarketModel>) -> Result<Self> {
        let displacements = forward_model.displacements().to_vec();
        let d = displacements.first().copied().unwrap_or(0.0);
        ensure!(
            displacements.iter().all(|&x| x == d),
            "non-constant displacements are not supported"
        );

        let evolution = forward_model.evolution();
        let mut cs = LmmCurveState::new(evolution.rate_times())?;
        cs.set_on_forward_rates(forward_model.initial_rates(), 0)?;
        let n = cs.number_of_rates();
        let initial_rates = (0..n)
            .map(|i| cs.coterminal_swap_rate(i))
            .collect::<Result<Vec<_>>>()?;
        let zed = coterminal_swap_zed_matrix(&cs, &displacements)?;

        let mut pseudo_roots = Vec::with_capacity(forward_model.number_of_steps());
        for step in 0..forward_model.number_of_steps() {
            let mut root = &zed * forward_model.pseudo_root(step)?;
            for i in 0..evolution.first_alive_rate()[step] {
                root.zero_row(i);
            }
            pseudo_roots.push(root);
        }

        Ok(Self {
            forward_model,
            initial_rates,
            displacements,
            pseudo_roots,
        })
    }
}

impl MarketModel for FwdToCotSwapAdapter {
    fn initial_rates(&self) -> &[Rate] {
        &self.initial_rates
    }

    fn displacements(&self) -> &[Spread] {
        &self.displacements
    }

    fn evolution(&self) -> &EvolutionDescription {
        self.forward_model.evolution()
    }

    fn number_of_factors(&self) -> Size {
        self.forward_model.number_of_factors()
    }

    fn pseudo_root(&self, step: Size) -> Result<&Matrix> {
        ensure_index!(step, self.pseudo_roots.len());
        Ok(&self.pseudo_roots[step])
    }
}
