// Directed dependency network between fields
//
// Edges come from a Granger-style F-test per ordered field pair: does the
// source's past improve a lagged autoregression of the target? For each pair
// the lag (1..=max_lag) with the smallest p-value is kept; an edge exists when
// that p-value is below alpha. Edge weight is the share of the restricted
// model's residual sum of squares explained by the source terms.
//
// The graph keeps the DFS cycle check of the span graph it was modelled on,
// and adds elementary cycle listing (capped), Kahn topological order and
// degree summaries.

use super::{align, daily_means};
use crate::dist::f_sf;
use crate::error::{ImpactError, Result};
use crate::window::TimedValue;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Residual sums below this are treated as a perfect fit
const RSS_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NetworkOptions {
    pub max_lag: usize,
    pub alpha: f64,
    /// Shared days a pair needs before it is tested
    pub min_observations: usize,
    /// Upper bound on cycles listed
    pub max_cycles: usize,
}

impl Default for NetworkOptions {
    fn default() -> Self {
        Self {
            max_lag: 3,
            alpha: 0.05,
            min_observations: 10,
            max_cycles: 64,
        }
    }
}

impl NetworkOptions {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.max_lag == 0 {
            return Err("max_lag must be at least 1".to_string());
        }
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(format!("alpha must be within (0, 1), got {}", self.alpha));
        }
        if self.min_observations < 2 * self.max_lag + 2 {
            return Err(format!(
                "min_observations must be at least {} for max_lag {}",
                2 * self.max_lag + 2,
                self.max_lag
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeSign {
    Positive,
    Negative,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GrangerResult {
    pub lag: usize,
    pub f_statistic: f64,
    pub p_value: f64,
    /// (RSS_restricted - RSS_unrestricted) / RSS_restricted, in [0, 1]
    pub strength: f64,
    /// Sign of the summed source coefficients
    pub sign: EdgeSign,
    pub observations: usize,
}

/// Solve the least-squares normal equations; `None` when singular
fn least_squares(rows: &[Vec<f64>], y: &[f64]) -> Option<Vec<f64>> {
    let k = rows.first()?.len();
    let mut a = vec![vec![0.0; k + 1]; k];
    for (row, &target) in rows.iter().zip(y) {
        for i in 0..k {
            for j in 0..k {
                a[i][j] += row[i] * row[j];
            }
            a[i][k] += row[i] * target;
        }
    }

    // Gaussian elimination with partial pivoting on the augmented matrix
    for col in 0..k {
        let pivot = (col..k).max_by(|&r, &s| a[r][col].abs().total_cmp(&a[s][col].abs()))?;
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        for r in (col + 1)..k {
            let factor = a[r][col] / a[col][col];
            for c in col..=k {
                a[r][c] -= factor * a[col][c];
            }
        }
    }
    let mut beta = vec![0.0; k];
    for i in (0..k).rev() {
        let tail: f64 = ((i + 1)..k).map(|j| a[i][j] * beta[j]).sum();
        beta[i] = (a[i][k] - tail) / a[i][i];
    }
    Some(beta)
}

fn residual_sum_of_squares(rows: &[Vec<f64>], y: &[f64], beta: &[f64]) -> f64 {
    rows.iter()
        .zip(y)
        .map(|(row, target)| {
            let fitted: f64 = row.iter().zip(beta).map(|(x, b)| x * b).sum();
            (target - fitted).powi(2)
        })
        .sum()
}

/// Does `source` Granger-cause `target` at `lag`?
///
/// Restricted model: target on its own `lag` past values. Unrestricted: the
/// same plus `lag` past values of the source. `None` when there are too few
/// observations, the design is singular, or the target is already perfectly
/// explained by its own past.
pub fn granger_test(source: &[f64], target: &[f64], lag: usize) -> Option<GrangerResult> {
    let n = source.len().min(target.len());
    if lag == 0 || n <= lag {
        return None;
    }
    let observations = n - lag;
    let params = 1 + 2 * lag;
    if observations <= params {
        return None;
    }

    let y: Vec<f64> = target[lag..n].to_vec();
    let restricted: Vec<Vec<f64>> = (lag..n)
        .map(|t| {
            let mut row = vec![1.0];
            row.extend((1..=lag).map(|l| target[t - l]));
            row
        })
        .collect();
    let unrestricted: Vec<Vec<f64>> = restricted
        .iter()
        .zip(lag..n)
        .map(|(base, t)| {
            let mut row = base.clone();
            row.extend((1..=lag).map(|l| source[t - l]));
            row
        })
        .collect();

    let beta_r = least_squares(&restricted, &y)?;
    let beta_u = least_squares(&unrestricted, &y)?;
    let rss_r = residual_sum_of_squares(&restricted, &y, &beta_r);
    let rss_u = residual_sum_of_squares(&unrestricted, &y, &beta_u).max(0.0);
    if rss_r <= RSS_EPSILON {
        return None;
    }

    let df1 = lag as f64;
    let df2 = (observations - params) as f64;
    let gain = (rss_r - rss_u).max(0.0);
    let f_statistic = if rss_u <= RSS_EPSILON {
        f64::INFINITY
    } else {
        (gain / df1) / (rss_u / df2)
    };
    let source_effect: f64 = beta_u[1 + lag..].iter().sum();

    Some(GrangerResult {
        lag,
        f_statistic,
        p_value: f_sf(f_statistic, df1, df2),
        strength: (gain / rss_r).clamp(0.0, 1.0),
        sign: if source_effect >= 0.0 {
            EdgeSign::Positive
        } else {
            EdgeSign::Negative
        },
        observations,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub from: String,
    pub to: String,
    pub lag: usize,
    pub f_statistic: f64,
    pub p_value: f64,
    pub weight: f64,
    pub sign: EdgeSign,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyNode {
    pub field: String,
    pub in_degree: usize,
    pub out_degree: usize,
    pub outgoing_weight: f64,
    pub incoming_weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyNetwork {
    pub fields: Vec<String>,
    pub nodes: Vec<DependencyNode>,
    pub edges: Vec<DependencyEdge>,
    /// Elementary cycles, each starting at its lowest-ordered field
    pub cycles: Vec<Vec<String>>,
    pub cycles_truncated: bool,
    pub is_dag: bool,
    /// Present only for acyclic networks
    pub topological_order: Option<Vec<String>>,
    pub strongest_driver: Option<String>,
    pub most_influenced: Option<String>,
    pub warnings: Vec<String>,
}

impl DependencyNetwork {
    /// Assemble a network and derive its structure from explicit edges.
    /// Edges naming unknown fields are ignored.
    pub fn from_edges(fields: Vec<String>, edges: Vec<DependencyEdge>, max_cycles: usize) -> Self {
        let index: BTreeMap<&str, usize> = fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.as_str(), i))
            .collect();
        let edges: Vec<DependencyEdge> = edges
            .into_iter()
            .filter(|e| index.contains_key(e.from.as_str()) && index.contains_key(e.to.as_str()))
            .collect();

        let mut adjacency = vec![Vec::new(); fields.len()];
        let mut nodes: Vec<DependencyNode> = fields
            .iter()
            .map(|field| DependencyNode {
                field: field.clone(),
                in_degree: 0,
                out_degree: 0,
                outgoing_weight: 0.0,
                incoming_weight: 0.0,
            })
            .collect();
        for edge in &edges {
            let (from, to) = (index[edge.from.as_str()], index[edge.to.as_str()]);
            adjacency[from].push(to);
            nodes[from].out_degree += 1;
            nodes[from].outgoing_weight += edge.weight;
            nodes[to].in_degree += 1;
            nodes[to].incoming_weight += edge.weight;
        }

        let is_dag = is_acyclic(&adjacency);
        let (cycle_ids, cycles_truncated) = elementary_cycles(&adjacency, max_cycles);
        let name = |i: usize| fields[i].clone();
        let cycles = cycle_ids
            .into_iter()
            .map(|c| c.into_iter().map(name).collect())
            .collect();
        let topological_order = if is_dag {
            Some(kahn_order(&adjacency).into_iter().map(name).collect())
        } else {
            None
        };

        let heaviest = |weight: fn(&DependencyNode) -> f64| {
            nodes
                .iter()
                .filter(|n| weight(n) > 0.0)
                .fold(None::<&DependencyNode>, |best, n| match best {
                    Some(b) if weight(b) >= weight(n) => Some(b),
                    _ => Some(n),
                })
                .map(|n| n.field.clone())
        };
        let strongest_driver = heaviest(|n| n.outgoing_weight);
        let most_influenced = heaviest(|n| n.incoming_weight);

        Self {
            fields,
            nodes,
            edges,
            cycles,
            cycles_truncated,
            is_dag,
            topological_order,
            strongest_driver,
            most_influenced,
            warnings: Vec::new(),
        }
    }

    pub fn node_count(&self) -> usize {
        self.fields.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn node(&self, field: &str) -> Option<&DependencyNode> {
        self.nodes.iter().find(|n| n.field == field)
    }

    pub fn edge(&self, from: &str, to: &str) -> Option<&DependencyEdge> {
        self.edges.iter().find(|e| e.from == from && e.to == to)
    }

    pub fn edges_from<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a DependencyEdge> {
        self.edges.iter().filter(move |e| e.from == field)
    }

    pub fn has_cycles(&self) -> bool {
        !self.is_dag
    }

    /// Every field reachable from `field`, including itself
    pub fn descendants(&self, field: &str) -> Vec<String> {
        let mut visited: Vec<&str> = Vec::new();
        let mut stack = vec![field];
        while let Some(node) = stack.pop() {
            if visited.contains(&node) {
                continue;
            }
            visited.push(node);
            for edge in self.edges_from(node) {
                if !visited.contains(&edge.to.as_str()) {
                    stack.push(edge.to.as_str());
                }
            }
        }
        visited.into_iter().map(str::to_string).collect()
    }
}

fn is_acyclic(adjacency: &[Vec<usize>]) -> bool {
    let mut visited = HashSet::new();
    let mut rec_stack = HashSet::new();
    for start in 0..adjacency.len() {
        if !visited.contains(&start) && has_cycle_dfs(adjacency, start, &mut visited, &mut rec_stack)
        {
            return false;
        }
    }
    true
}

fn has_cycle_dfs(
    adjacency: &[Vec<usize>],
    node: usize,
    visited: &mut HashSet<usize>,
    rec_stack: &mut HashSet<usize>,
) -> bool {
    visited.insert(node);
    rec_stack.insert(node);
    for &next in &adjacency[node] {
        if !visited.contains(&next) {
            if has_cycle_dfs(adjacency, next, visited, rec_stack) {
                return true;
            }
        } else if rec_stack.contains(&next) {
            // Back edge
            return true;
        }
    }
    rec_stack.remove(&node);
    false
}

/// Cycles through `start` using only nodes ordered after it, so each
/// elementary cycle is found once
fn elementary_cycles(adjacency: &[Vec<usize>], cap: usize) -> (Vec<Vec<usize>>, bool) {
    fn walk(
        adjacency: &[Vec<usize>],
        start: usize,
        node: usize,
        path: &mut Vec<usize>,
        out: &mut Vec<Vec<usize>>,
        cap: usize,
    ) -> bool {
        for &next in &adjacency[node] {
            if next == start {
                if out.len() >= cap {
                    return true;
                }
                out.push(path.clone());
            } else if next > start && !path.contains(&next) {
                path.push(next);
                let truncated = walk(adjacency, start, next, path, out, cap);
                path.pop();
                if truncated {
                    return true;
                }
            }
        }
        false
    }

    let mut out = Vec::new();
    for start in 0..adjacency.len() {
        let mut path = vec![start];
        if walk(adjacency, start, start, &mut path, &mut out, cap) {
            return (out, true);
        }
    }
    (out, false)
}

/// Kahn's algorithm; ready nodes leave in field order
fn kahn_order(adjacency: &[Vec<usize>]) -> Vec<usize> {
    let mut in_degree = vec![0usize; adjacency.len()];
    for targets in adjacency {
        for &t in targets {
            in_degree[t] += 1;
        }
    }
    let mut ready: BTreeSet<usize> = (0..adjacency.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(adjacency.len());
    while let Some(node) = ready.pop_first() {
        order.push(node);
        for &t in &adjacency[node] {
            in_degree[t] -= 1;
            if in_degree[t] == 0 {
                ready.insert(t);
            }
        }
    }
    order
}

/// Test every ordered field pair and assemble the network
pub fn build_dependency_network(
    series_by_field: &BTreeMap<String, Vec<TimedValue>>,
    options: &NetworkOptions,
) -> Result<DependencyNetwork> {
    options.validate().map_err(ImpactError::Validation)?;
    if series_by_field.len() < 2 {
        return Err(ImpactError::Validation(format!(
            "dependency network needs at least two fields, got {}",
            series_by_field.len()
        )));
    }

    let origin = series_by_field
        .values()
        .flatten()
        .map(|p| p.timestamp)
        .min()
        .ok_or(ImpactError::InsufficientData {
            required: options.min_observations,
            actual: 0,
        })?;

    let fields: Vec<String> = series_by_field.keys().cloned().collect();
    let daily: Vec<BTreeMap<i64, f64>> = series_by_field
        .values()
        .map(|series| daily_means(series, origin))
        .collect();

    let mut edges = Vec::new();
    let mut warnings = Vec::new();
    for (i, source) in daily.iter().enumerate() {
        for (j, target) in daily.iter().enumerate() {
            if i == j {
                continue;
            }
            let rows = align(source, target);
            if rows.len() < options.min_observations {
                if i < j {
                    warnings.push(format!(
                        "Fields '{}' and '{}' share only {} days; dependency not tested",
                        fields[i],
                        fields[j],
                        rows.len()
                    ));
                }
                continue;
            }
            let (xs, ys): (Vec<f64>, Vec<f64>) = rows.iter().map(|&(_, x, y)| (x, y)).unzip();

            let best = (1..=options.max_lag)
                .filter_map(|lag| granger_test(&xs, &ys, lag))
                .fold(None::<GrangerResult>, |best, r| match best {
                    Some(b) if b.p_value <= r.p_value => Some(b),
                    _ => Some(r),
                });
            let Some(best) = best else { continue };
            if best.p_value < options.alpha {
                tracing::debug!(
                    from = %fields[i],
                    to = %fields[j],
                    lag = best.lag,
                    p_value = best.p_value,
                    "dependency edge"
                );
                edges.push(DependencyEdge {
                    from: fields[i].clone(),
                    to: fields[j].clone(),
                    lag: best.lag,
                    f_statistic: best.f_statistic,
                    p_value: best.p_value,
                    weight: best.strength,
                    sign: best.sign,
                });
            }
        }
    }

    let mut network = DependencyNetwork::from_edges(fields, edges, options.max_cycles);
    if network.cycles_truncated {
        warnings.push(format!(
            "Cycle listing stopped after {} cycles",
            options.max_cycles
        ));
    }
    if !network.cycles.is_empty() {
        tracing::warn!(cycles = network.cycles.len(), "circular dependencies detected");
    }
    network.warnings = warnings;
    Ok(network)
}
