//! Layered folding engine.
//!
//! # Model
//!
//! The spatial geometry is treated as a stack of layers (trunk, branch,
//! twig). Each layer consumes a [`Binding`] describing where data lives
//! (`srcs`) and where it is needed (`dsts`), and performs one evaluation
//! step:
//!
//! 1. **Fold**: charge the crease cost of collapsing one geometric
//!    dimension onto the trunk, and project the destinations along the
//!    fold onto a representative per datum.
//! 2. **Multicast**: charge the cost of distributing each datum to its
//!    folded destinations.
//! 3. **Collapse**: rebase sources and destinations into the next layer's
//!    binding space and subtract what this layer satisfied, leaving the
//!    missing requests as the next layer's destinations.
//!
//! A layer chain is finite and ordered; [`evaluate_chain`] runs the
//! layers top down and accumulates their costs. A layer is immutable
//! after construction and `evaluate` is pure, so layers can be reused
//! across problems within one context.

use crate::algebra::{
    self, dump_map, ensure_nonneg, sum_to_scalar, AlgebraError, Result,
};
use crate::qpolynomial::{self, PwQpolynomial};
use isl_rs::{Context, DimType, Map};
use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Where data currently lives and where it is needed, both relations out
/// of a shared binding-id space into the same data space.
pub struct Binding {
    srcs: Map,
    dsts: Map,
}

impl Binding {
    /// Builds a binding, checking that both relations target the same
    /// data space.
    ///
    /// # Errors
    /// `SpaceMismatch` when the range spaces differ.
    pub fn new(srcs: Map, dsts: Map) -> Result<Binding> {
        let src_data = srcs.get_space().range();
        let dst_data = dsts.get_space().range();
        if !src_data.is_equal(&dst_data) {
            return Err(AlgebraError::SpaceMismatch {
                op: "binding",
                lhs: src_data.to_str(),
                rhs: dst_data.to_str(),
            });
        }
        Ok(Binding { srcs, dsts })
    }

    /// Parses a binding from relation strings.
    pub fn from_strs(ctx: &Arc<Context>, srcs: &str, dsts: &str) -> Result<Binding> {
        let srcs = algebra::parse_map(ctx, srcs)?;
        let dsts = algebra::parse_map(ctx, dsts)?;
        Binding::new(srcs, dsts)
    }

    pub fn srcs(&self) -> &Map {
        &self.srcs
    }

    pub fn dsts(&self) -> &Map {
        &self.dsts
    }

    /// The source relation in its string form, for handing to the next
    /// consumer or a log.
    pub fn srcs_str(&self) -> String {
        self.srcs.to_str()
    }

    /// The destination relation in its string form.
    pub fn dsts_str(&self) -> String {
        self.dsts.to_str()
    }

    /// True when nothing is requested anymore.
    pub fn is_satisfied(&self) -> bool {
        self.dsts.is_empty()
    }
}

/// String-encoded description of one layer, the form layer chains are
/// stored and shipped in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerSpec {
    /// Piecewise quasi-polynomial over the destination space: cost per
    /// datum of creasing a destination onto the trunk.
    pub crease_cost: String,
    /// Relation projecting the pre-fold destination space onto the
    /// post-fold space.
    pub fold: String,
    /// Piecewise quasi-polynomial over the post-fold space: cost per
    /// datum of casting to a folded destination.
    pub multicast_cost: String,
    /// Relation from the next layer's binding-id space to this layer's
    /// source space.
    pub src_collapser: String,
    /// Relation from the next layer's binding-id space to this layer's
    /// destination space.
    pub dst_collapser: String,
    /// Post-fold axis along which dominated destinations are discarded;
    /// the largest coordinate per datum survives as the representative.
    pub trunk_axis: u32,
}

/// The scalar outcome of the folding step together with the folded
/// relation handed to multicast costing.
pub struct FoldResult {
    /// Total crease cost of this layer.
    pub cost: i64,
    /// `data -> post-fold point`, one representative per datum per fold
    /// class.
    pub folded: Map,
}

/// Per-layer evaluation outcome.
pub struct LayerOutcome {
    /// Crease plus multicast cost of this layer.
    pub cost: i64,
    /// Crease component of `cost`.
    pub crease_cost: i64,
    /// Multicast component of `cost`.
    pub multicast_cost: i64,
    /// The residual problem for the next layer.
    pub next: Binding,
}

/// One step of the folding pipeline, with its cost formulas parsed.
pub struct Layer {
    crease_cost: PwQpolynomial,
    fold: Map,
    multicast_cost: PwQpolynomial,
    src_collapser: Map,
    dst_collapser: Map,
    trunk_axis: u32,
}

impl Layer {
    /// Parses a layer from its string spec.
    ///
    /// # Errors
    /// `Parse` when any of the five formulas is rejected.
    pub fn from_spec(ctx: &Arc<Context>, spec: &LayerSpec) -> Result<Layer> {
        Ok(Layer {
            crease_cost: algebra::parse_pw_qpolynomial(ctx, &spec.crease_cost)?,
            fold: algebra::parse_map(ctx, &spec.fold)?,
            multicast_cost: algebra::parse_pw_qpolynomial(ctx, &spec.multicast_cost)?,
            src_collapser: algebra::parse_map(ctx, &spec.src_collapser)?,
            dst_collapser: algebra::parse_map(ctx, &spec.dst_collapser)?,
            trunk_axis: spec.trunk_axis,
        })
    }

    /// Runs one evaluation step on a binding.
    ///
    /// Pure: the binding is only read, and the layer is unchanged, so the
    /// same layer may evaluate many bindings.
    pub fn evaluate(&self, binding: &Binding) -> Result<LayerOutcome> {
        let fold_result = self.fold(binding.dsts())?;
        debug!("crease cost: {}", fold_result.cost);
        debug!("folded: {}", fold_result.folded.to_str());

        let multicast_cost = self.multicast(&fold_result.folded)?;
        debug!("multicast cost: {}", multicast_cost);

        let next = self.collapse(binding.srcs(), binding.dsts())?;

        Ok(LayerOutcome {
            cost: fold_result.cost + multicast_cost,
            crease_cost: fold_result.cost,
            multicast_cost,
            next,
        })
    }

    /// Folds the destinations onto their trunk.
    ///
    /// The crease cost is `sum(card(dsts) * crease_cost)`: every datum at
    /// every destination is charged the crease formula at that
    /// destination. The formula must be non-negative on the destination
    /// points, or the fold fails with `Domain`. The folded relation maps
    /// each datum to its post-fold representative, keeping only the
    /// largest `trunk_axis` coordinate per datum per fold class.
    pub fn fold(&self, dsts: &Map) -> Result<FoldResult> {
        // Number of data held per destination point.
        let card = qpolynomial::map_card(dsts.copy());

        // The crease formula must live on the destination space.
        let card_space = card.domain_space();
        let cost_space = self.crease_cost.domain_space();
        if !card_space.is_equal(&cost_space) {
            return Err(AlgebraError::SpaceMismatch {
                op: "fold",
                lhs: card_space.to_str(),
                rhs: cost_space.to_str(),
            });
        }

        // The crease formula must be non-negative on the destinations it
        // is charged at; a signed formula could cancel out in the sum.
        let charged = self.crease_cost.clone().intersect_domain(dsts.copy().domain());
        algebra::ensure_nonneg_qp("fold", charged)?;

        let cost_at_dst = card.mul(self.crease_cost.clone());
        let crease = sum_to_scalar("fold", cost_at_dst)?;
        let crease = ensure_nonneg("fold", crease)?;

        // Project the destinations along the fold: data -> post-fold.
        let data_to_dsts = dsts.copy().reverse();
        let folded = algebra::apply_range(data_to_dsts, self.fold.copy())?;
        let folded = folded.reverse();
        dump_map("folded", &folded);

        // Discard dominated points: a post-fold point loses a datum to
        // any point strictly later on the trunk axis that also holds it.
        let all_after = self.all_after(&folded)?;
        dump_map("all_after", &all_after);
        let dominated = algebra::apply_range(all_after, folded.copy())?;
        let condensed = folded.subtract(dominated);
        dump_map("condensed", &condensed);

        Ok(FoldResult {
            cost: crease,
            folded: condensed.reverse(),
        })
    }

    /// The strict-successor relation on the post-fold space: every point
    /// related to the points agreeing on all coordinates except the trunk
    /// axis, where they are strictly larger.
    fn all_after(&self, folded: &Map) -> Result<Map> {
        let post_space = folded.get_space().domain();
        let n = post_space.dim(DimType::Set);
        if (self.trunk_axis as i32) >= n {
            return Err(AlgebraError::Domain {
                op: "fold",
                reason: format!(
                    "trunk axis {} out of range for {} post-fold dims",
                    self.trunk_axis, n
                ),
            });
        }

        let mut after = Map::universe(post_space.map_from_set());
        for i in 0..n {
            if i != self.trunk_axis as i32 {
                after = after.equate(DimType::In, i, DimType::Out, i);
            }
        }
        Ok(after.order_lt(
            DimType::In,
            self.trunk_axis as i32,
            DimType::Out,
            self.trunk_axis as i32,
        ))
    }

    /// Charges the multicast formula at every folded destination of every
    /// datum and sums.
    ///
    /// The formula must be non-negative on the folded points, or the
    /// step fails with `Domain`.
    pub fn multicast(&self, folded: &Map) -> Result<i64> {
        let folded_range = folded.get_space().range();
        let cost_space = self.multicast_cost.domain_space();
        if !folded_range.is_equal(&cost_space) {
            return Err(AlgebraError::SpaceMismatch {
                op: "multicast",
                lhs: folded_range.to_str(),
                rhs: cost_space.to_str(),
            });
        }

        // Screen the formula on the trunk points it is charged at before
        // the per-datum application can sum a negative piece away.
        let charged = self
            .multicast_cost
            .clone()
            .intersect_domain(folded.copy().range());
        algebra::ensure_nonneg_qp("multicast", charged)?;

        let applied =
            qpolynomial::map_apply_pw_qpolynomial(folded.copy(), self.multicast_cost.clone());
        let cost = sum_to_scalar("multicast", applied)?;
        ensure_nonneg("multicast", cost)
    }

    /// Rebases the binding into the next layer's id space and computes
    /// the requests this layer leaves unsatisfied.
    ///
    /// The next binding keeps the collapsed sources as its sources; an
    /// alternative would be to pass only what this layer can deliver to
    /// the next trunk, which would need a delivery model the engine does
    /// not have.
    pub fn collapse(&self, srcs: &Map, dsts: &Map) -> Result<Binding> {
        let collapsed_srcs = algebra::apply_range(self.src_collapser.copy(), srcs.copy())?;
        dump_map("collapsed_srcs", &collapsed_srcs);
        let collapsed_dsts = algebra::apply_range(self.dst_collapser.copy(), dsts.copy())?;
        dump_map("collapsed_dsts", &collapsed_dsts);

        let missing = collapsed_dsts.subtract(collapsed_srcs.copy());
        dump_map("missing", &missing);

        Binding::new(collapsed_srcs, missing)
    }
}

/// String-encoded description of a whole layer chain, trunk first.
///
/// The serializable form analysis configurations are stored in; building
/// it parses every layer against one context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainSpec {
    pub layers: Vec<LayerSpec>,
}

impl ChainSpec {
    /// Parses every layer of the chain.
    ///
    /// # Errors
    /// `Parse` on the first malformed formula, naming the layer position
    /// through the offending string.
    pub fn build(&self, ctx: &Arc<Context>) -> Result<Vec<Layer>> {
        self.layers
            .iter()
            .map(|spec| Layer::from_spec(ctx, spec))
            .collect()
    }
}

/// The outcome of driving a binding through a full layer chain.
pub struct ChainResult {
    /// Sum of all per-layer costs.
    pub total_cost: i64,
    /// Cost of each layer, in evaluation order.
    pub layer_costs: Vec<i64>,
    /// Whatever the last layer left unsatisfied.
    pub residual: Binding,
}

/// Evaluates a binding through an ordered chain of layers, accumulating
/// cost and threading the residual binding downward.
pub fn evaluate_chain(layers: &[Layer], binding: Binding) -> Result<ChainResult> {
    let mut current = binding;
    let mut layer_costs = Vec::with_capacity(layers.len());
    let mut total_cost = 0i64;

    for (index, layer) in layers.iter().enumerate() {
        let outcome = layer.evaluate(&current)?;
        debug!(
            "layer {}: crease {} + multicast {} = {}",
            index, outcome.crease_cost, outcome.multicast_cost, outcome.cost
        );
        total_cost += outcome.cost;
        layer_costs.push(outcome.cost);
        current = outcome.next;
    }

    Ok(ChainResult {
        total_cost,
        layer_costs,
        residual: current,
    })
}
