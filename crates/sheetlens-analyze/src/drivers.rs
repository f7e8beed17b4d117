//! Cost-driver ranking: betweenness centrality combined with transitive
//! dependent counts.
//!
//! Both measures degrade gracefully on large graphs: Brandes switches to a
//! seeded sample of source nodes above [`BRANDES_SAMPLING_THRESHOLD`]
//! nodes, descendant counting above [`DESCENDANT_SAMPLING_THRESHOLD`].
//! Sampling uses the options seed only, so equal inputs rank identically.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use std::collections::VecDeque;

use sheetlens_common::CellAddress;

use crate::cancel::{CancelToken, POLL_INTERVAL};
use crate::cells::{CellTable, NodeId};
use crate::error::EngineError;
use crate::graph::DependencyGraph;
use crate::options::AnalyzeOptions;

pub const BRANDES_SAMPLING_THRESHOLD: usize = 5_000;
pub const DESCENDANT_SAMPLING_THRESHOLD: usize = 20_000;
const SAMPLE_MAX: usize = 500;
const BRANDES_CHUNK: usize = 64;

/// One ranked driver.
#[derive(Debug, Clone, PartialEq)]
pub struct CostDriver {
    pub address: CellAddress,
    pub centrality_score: f64,
    pub impact_score: f64,
    pub dependent_count: u64,
    pub description: String,
}

/// Rank the top-K cost drivers of a frozen graph.
pub fn rank_cost_drivers(
    graph: &DependencyGraph,
    cells: &CellTable,
    options: &AnalyzeOptions,
    cancel: &CancelToken,
) -> Result<Vec<CostDriver>, EngineError> {
    let n = cells.len();
    if n == 0 {
        return Ok(Vec::new());
    }

    let centrality = betweenness(graph, n, options, cancel)?;
    let (dependents, sheet_counts) = dependent_counts(graph, cells, options, cancel)?;

    let mut drivers: Vec<CostDriver> = Vec::new();
    for (id, info) in cells.iter() {
        let dependent_count = dependents[id as usize];
        // Plain literals nobody depends on carry no cost.
        if !info.has_formula() && dependent_count == 0 {
            continue;
        }
        let centrality_score = centrality[id as usize].clamp(0.0, 1.0);
        let reach = if n > 1 {
            dependent_count as f64 / (n as f64 - 1.0)
        } else {
            0.0
        };
        let impact_score = (0.6 * centrality_score + 0.4 * reach).clamp(0.0, 1.0);
        let sheets = sheet_counts[id as usize].max(if dependent_count > 0 { 1 } else { 0 });
        drivers.push(CostDriver {
            address: info.address.clone(),
            centrality_score,
            impact_score,
            dependent_count,
            description: format!(
                "Affects {dependent_count} cells across {sheets} sheet(s)"
            ),
        });
    }

    drivers.sort_by(|a, b| {
        b.impact_score
            .total_cmp(&a.impact_score)
            .then_with(|| b.dependent_count.cmp(&a.dependent_count))
            .then_with(|| a.address.cmp(&b.address))
    });
    drivers.truncate(options.clamped_top_drivers());
    Ok(drivers)
}

/// Approximate betweenness, normalised by `(N-1)(N-2)/2` and clamped.
fn betweenness(
    graph: &DependencyGraph,
    n: usize,
    options: &AnalyzeOptions,
    cancel: &CancelToken,
) -> Result<Vec<f64>, EngineError> {
    if n < 3 {
        return Ok(vec![0.0; n]);
    }

    let (sources, scale) = if n > BRANDES_SAMPLING_THRESHOLD {
        let k = SAMPLE_MAX.min(n / 4);
        let sources = sample_nodes(n, k, options.sample_seed);
        (sources, n as f64 / k as f64)
    } else {
        ((0..n as NodeId).collect::<Vec<_>>(), 1.0)
    };

    // Per-chunk partial accumulators, merged in chunk order so float
    // summation stays deterministic.
    let partials: Result<Vec<Vec<f64>>, EngineError> = sources
        .par_chunks(BRANDES_CHUNK)
        .map(|chunk| {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            let mut acc = vec![0.0f64; n];
            for &s in chunk {
                accumulate_source(graph, n, s, &mut acc, cancel)?;
            }
            Ok(acc)
        })
        .collect();

    let mut centrality = vec![0.0f64; n];
    for partial in partials? {
        for (c, p) in centrality.iter_mut().zip(partial) {
            *c += p;
        }
    }

    let normalizer = (n as f64 - 1.0) * (n as f64 - 2.0) / 2.0;
    for c in centrality.iter_mut() {
        *c = (*c * scale / normalizer).clamp(0.0, 1.0);
    }
    Ok(centrality)
}

/// One Brandes source iteration: BFS shortest-path counting, then the
/// dependency back-propagation over the visit stack.
fn accumulate_source(
    graph: &DependencyGraph,
    n: usize,
    s: NodeId,
    acc: &mut [f64],
    cancel: &CancelToken,
) -> Result<(), EngineError> {
    let mut sigma = vec![0.0f64; n];
    let mut dist = vec![i32::MAX; n];
    let mut preds: Vec<Vec<NodeId>> = vec![Vec::new(); n];
    let mut stack: Vec<NodeId> = Vec::with_capacity(n);
    let mut queue: VecDeque<NodeId> = VecDeque::new();

    sigma[s as usize] = 1.0;
    dist[s as usize] = 0;
    queue.push_back(s);

    let mut iterations = 0usize;
    while let Some(v) = queue.pop_front() {
        iterations += 1;
        if iterations % POLL_INTERVAL == 0 && cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        stack.push(v);
        for &w in graph.targets_of(v) {
            let (vi, wi) = (v as usize, w as usize);
            if dist[wi] == i32::MAX {
                dist[wi] = dist[vi] + 1;
                queue.push_back(w);
            }
            if dist[wi] == dist[vi] + 1 {
                sigma[wi] += sigma[vi];
                preds[wi].push(v);
            }
        }
    }

    let mut delta = vec![0.0f64; n];
    for &w in stack.iter().rev() {
        let wi = w as usize;
        for &v in &preds[wi] {
            let vi = v as usize;
            delta[vi] += sigma[vi] / sigma[wi] * (1.0 + delta[wi]);
        }
        if w != s {
            acc[wi] += delta[wi];
        }
    }
    Ok(())
}

/// Exact (bitset DP) or sampled transitive dependent counts, plus the
/// number of distinct sheets among each node's dependents.
fn dependent_counts(
    graph: &DependencyGraph,
    cells: &CellTable,
    options: &AnalyzeOptions,
    cancel: &CancelToken,
) -> Result<(Vec<u64>, Vec<u32>), EngineError> {
    let n = cells.len();
    let sheet_bits = sheet_bit_assignment(cells);

    if n > DESCENDANT_SAMPLING_THRESHOLD {
        sampled_dependents(graph, cells, &sheet_bits, options, cancel)
    } else {
        exact_dependents(graph, cells, &sheet_bits, cancel)
    }
}

/// Sheet → bit position, first-seen order, saturating at bit 63. Distinct
/// counts are exact up to 64 sheets.
fn sheet_bit_assignment(cells: &CellTable) -> Vec<u64> {
    let mut ids: FxHashMap<&str, u32> = FxHashMap::default();
    let mut bits = Vec::with_capacity(cells.len());
    for (_, info) in cells.iter() {
        let next = ids.len() as u32;
        let id = *ids.entry(info.address.sheet.as_str()).or_insert(next);
        bits.push(1u64 << id.min(63));
    }
    bits
}

/// Reverse-topological DP over the condensation with one descendant bitset
/// per component. Components with ids above a node's own are exactly its
/// potential dependents, because Tarjan emits dependencies first.
fn exact_dependents(
    graph: &DependencyGraph,
    cells: &CellTable,
    sheet_bits: &[u64],
    cancel: &CancelToken,
) -> Result<(Vec<u64>, Vec<u32>), EngineError> {
    let comps = &graph.scc.comps;
    let comp_of = &graph.scc.comp_of;
    let m = comps.len();
    let n = cells.len();
    if m == 0 {
        return Ok((vec![0; n], vec![0; n]));
    }

    let stride = m.div_ceil(64);
    let mut dep_bits = vec![0u64; m * stride];
    let mut dep_sheets = vec![0u64; m];
    let mut comp_sheets = vec![0u64; m];
    let mut comp_weight = vec![0u64; m];
    for (c, members) in comps.iter().enumerate() {
        comp_weight[c] = members.len() as u64;
        for &v in members {
            comp_sheets[c] |= sheet_bits[v as usize];
        }
    }

    // Distinct successor components per component (dependency direction).
    let mut iterations = 0usize;
    for d in (0..m).rev() {
        // Push this component's closure into every component it reads.
        let mut targets: Vec<usize> = Vec::new();
        for &v in &comps[d] {
            for &w in graph.targets_of(v) {
                iterations += 1;
                if iterations % POLL_INTERVAL == 0 && cancel.is_cancelled() {
                    return Err(EngineError::Cancelled);
                }
                let c = comp_of[w as usize] as usize;
                if c != d {
                    targets.push(c);
                }
            }
        }
        targets.sort_unstable();
        targets.dedup();
        if targets.is_empty() {
            continue;
        }
        let src_row = dep_bits[d * stride..(d + 1) * stride].to_vec();
        let src_sheets = dep_sheets[d] | comp_sheets[d];
        for c in targets {
            let row = &mut dep_bits[c * stride..(c + 1) * stride];
            for (slot, word) in row.iter_mut().zip(&src_row) {
                *slot |= word;
            }
            row[d / 64] |= 1u64 << (d % 64);
            dep_sheets[c] |= src_sheets;
        }
    }

    let mut counts = vec![0u64; n];
    let mut sheets = vec![0u32; n];
    for (c, members) in comps.iter().enumerate() {
        let row = &dep_bits[c * stride..(c + 1) * stride];
        let mut external = 0u64;
        for (word_idx, &word) in row.iter().enumerate() {
            let mut bits = word;
            while bits != 0 {
                let b = bits.trailing_zeros() as usize;
                external += comp_weight[word_idx * 64 + b];
                bits &= bits - 1;
            }
        }
        let internal = comp_weight[c] - 1;
        let mut mask = dep_sheets[c];
        if comp_weight[c] > 1 {
            mask |= comp_sheets[c];
        }
        for &v in members {
            counts[v as usize] = external + internal;
            sheets[v as usize] = mask.count_ones();
        }
    }
    Ok((counts, sheets))
}

/// Sampled estimation for very large graphs: forward reachability from K
/// seeded sources, scaled by `N / K` and clamped to the `N - 1` bound.
fn sampled_dependents(
    graph: &DependencyGraph,
    cells: &CellTable,
    sheet_bits: &[u64],
    options: &AnalyzeOptions,
    cancel: &CancelToken,
) -> Result<(Vec<u64>, Vec<u32>), EngineError> {
    let n = cells.len();
    let k = SAMPLE_MAX.min(n / 4).max(1);
    let sources = sample_nodes(n, k, options.sample_seed);
    let scale = n as f64 / k as f64;

    let mut hits = vec![0u64; n];
    let mut masks = vec![0u64; n];
    let mut seen = vec![u32::MAX; n];
    let mut queue: VecDeque<NodeId> = VecDeque::new();
    let mut iterations = 0usize;

    for (round, &s) in sources.iter().enumerate() {
        let round = round as u32;
        seen[s as usize] = round;
        queue.push_back(s);
        while let Some(v) = queue.pop_front() {
            iterations += 1;
            if iterations % POLL_INTERVAL == 0 && cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            for &w in graph.targets_of(v) {
                let wi = w as usize;
                if seen[wi] != round {
                    seen[wi] = round;
                    queue.push_back(w);
                    hits[wi] += 1;
                    masks[wi] |= sheet_bits[s as usize];
                }
            }
        }
    }

    let cap = (n as u64).saturating_sub(1);
    let counts = hits
        .iter()
        .map(|&h| (((h as f64) * scale).round() as u64).min(cap))
        .collect();
    let sheets = masks.iter().map(|m| m.count_ones()).collect();
    Ok((counts, sheets))
}

/// Deterministic partial Fisher-Yates draw of `k` distinct node ids.
fn sample_nodes(n: usize, k: usize, seed: u64) -> Vec<NodeId> {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut pool: Vec<NodeId> = (0..n as NodeId).collect();
    let k = k.min(n);
    for i in 0..k {
        let j = rng.gen_range(i..n);
        pool.swap(i, j);
    }
    pool.truncate(k);
    pool
}
