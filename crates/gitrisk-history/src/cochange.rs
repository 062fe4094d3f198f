//! Co-change network construction.
//!
//! Files modified in the same commit are linked by an undirected edge
//! whose weight is the number of commits they share. Only the strongest
//! relationships are kept: the threshold is picked so that roughly the
//! top `rank` edges survive, and when ties still leave too many edges the
//! threshold is escalated in a bounded loop until the graph is small
//! enough to lay out.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

use gitrisk_core::GitriskError;
use petgraph::dot::Dot;
use petgraph::graph::{EdgeReference, NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};

use crate::table::FileChangeTable;

/// Default number of strongest relationships to aim for.
pub const DEFAULT_RANK: usize = 70;

/// Default edge count above which the threshold is escalated.
pub const DEFAULT_EDGE_LIMIT: usize = 400;

/// Default cap on escalation rounds after the first build.
pub const DEFAULT_MAX_RETRIES: u32 = 8;

/// Whether an oversized graph triggers threshold escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetryPolicy {
    /// Raise the threshold until the edge count is within bounds.
    #[default]
    Escalate,
    /// Return the first build unconditionally.
    SinglePass,
}

impl RetryPolicy {
    /// Map a CLI-style `--stop-retry` flag onto a policy.
    pub fn from_stop_retry(stop_retry: bool) -> Self {
        if stop_retry {
            Self::SinglePass
        } else {
            Self::Escalate
        }
    }
}

/// Options for [`build_with`].
///
/// # Examples
///
/// ```
/// use gitrisk_history::cochange::{GraphOptions, RetryPolicy};
///
/// let opts = GraphOptions::default();
/// assert_eq!(opts.rank, 70);
/// assert_eq!(opts.retry, RetryPolicy::Escalate);
/// assert!(opts.cancel.is_none());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct GraphOptions<'a> {
    /// Target number of strongest edges (values below 1 act as 1).
    pub rank: usize,
    /// Escalation behavior.
    pub retry: RetryPolicy,
    /// Edge count that triggers escalation.
    pub edge_limit: usize,
    /// Maximum escalation rounds.
    pub max_retries: u32,
    /// Checked between escalation rounds; when set, the last complete
    /// graph is returned.
    pub cancel: Option<&'a AtomicBool>,
}

impl Default for GraphOptions<'_> {
    fn default() -> Self {
        Self {
            rank: DEFAULT_RANK,
            retry: RetryPolicy::Escalate,
            edge_limit: DEFAULT_EDGE_LIMIT,
            max_retries: DEFAULT_MAX_RETRIES,
            cancel: None,
        }
    }
}

/// A weighted relationship between two files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoChangeEdge {
    /// Lexicographically smaller path.
    pub file_a: String,
    /// Lexicographically larger path.
    pub file_b: String,
    /// Commits touching both files.
    pub weight: u32,
}

/// A thresholded, undirected co-change graph.
///
/// Only edges with `weight >= threshold` are present, and only files with
/// at least one such edge are nodes.
#[derive(Debug, Clone)]
pub struct CoChangeGraph {
    graph: UnGraph<String, u32>,
    index: HashMap<String, NodeIndex>,
    threshold: u32,
    rank: usize,
    escalations: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GraphView<'a> {
    threshold: u32,
    rank: usize,
    escalations: u32,
    nodes: Vec<&'a str>,
    edges: Vec<CoChangeEdge>,
}

impl CoChangeGraph {
    /// Minimum edge weight kept.
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Rank in effect for the returned graph.
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Escalation rounds performed after the first build.
    pub fn escalations(&self) -> u32 {
        self.escalations
    }

    /// Number of files in the graph.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of relationships in the graph.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// File names, sorted.
    pub fn nodes(&self) -> Vec<&str> {
        let mut nodes: Vec<&str> = self.graph.node_weights().map(String::as_str).collect();
        nodes.sort_unstable();
        nodes
    }

    /// Edges sorted by weight descending, then by file pair.
    pub fn edges(&self) -> Vec<CoChangeEdge> {
        let mut edges: Vec<CoChangeEdge> = self
            .graph
            .edge_references()
            .map(|e| {
                let (a, b) = ordered(&self.graph[e.source()], &self.graph[e.target()]);
                CoChangeEdge {
                    file_a: a.to_string(),
                    file_b: b.to_string(),
                    weight: *e.weight(),
                }
            })
            .collect();
        edges.sort_by(|x, y| {
            y.weight
                .cmp(&x.weight)
                .then_with(|| x.file_a.cmp(&y.file_a))
                .then_with(|| x.file_b.cmp(&y.file_b))
        });
        edges
    }

    /// Weight of the edge between two files, in either order.
    pub fn weight(&self, x: &str, y: &str) -> Option<u32> {
        let a = *self.index.get(x)?;
        let b = *self.index.get(y)?;
        self.graph
            .find_edge(a, b)
            .and_then(|e| self.graph.edge_weight(e).copied())
    }

    /// Render as Graphviz DOT; pen width grows with edge weight.
    pub fn to_dot(&self) -> String {
        let edge_attrs = |_: &UnGraph<String, u32>, edge: EdgeReference<'_, u32>| {
            format!("penwidth = {}", pen_width(*edge.weight()))
        };
        let node_attrs =
            |_: &UnGraph<String, u32>, _: (NodeIndex, &String)| String::from("shape = box");
        let dot = Dot::with_attr_getters(&self.graph, &[], &edge_attrs, &node_attrs);
        format!("{dot}")
    }

    /// Write edges as CSV (`file_a,file_b,weight`).
    ///
    /// # Errors
    ///
    /// Returns [`GitriskError::Csv`] on write failure.
    pub fn write_edges_csv<W: Write>(&self, writer: W) -> Result<(), GitriskError> {
        let mut out = csv::Writer::from_writer(writer);
        out.write_record(["file_a", "file_b", "weight"])?;
        for edge in self.edges() {
            out.write_record([edge.file_a, edge.file_b, edge.weight.to_string()])?;
        }
        out.flush()?;
        Ok(())
    }
}

impl Serialize for CoChangeGraph {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        GraphView {
            threshold: self.threshold,
            rank: self.rank,
            escalations: self.escalations,
            nodes: self.nodes(),
            edges: self.edges(),
        }
        .serialize(serializer)
    }
}

fn pen_width(weight: u32) -> u32 {
    weight.clamp(1, 10)
}

fn ordered<'s>(x: &'s str, y: &'s str) -> (&'s str, &'s str) {
    if x <= y {
        (x, y)
    } else {
        (y, x)
    }
}

/// Count shared commits for every unordered file pair.
///
/// Keys are normalized so the smaller path comes first.
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use gitrisk_history::cochange::co_change_weights;
/// use gitrisk_history::table::{FileChangeRecord, FileChangeTable};
///
/// let ev = |h: &str, f: &str| FileChangeRecord {
///     hash: h.into(),
///     author: "alice".into(),
///     timestamp: Utc::now(),
///     file_name: f.into(),
/// };
/// let table = FileChangeTable::from_records(vec![
///     ev("c1", "b.rs"), ev("c1", "a.rs"),
///     ev("c2", "a.rs"), ev("c2", "b.rs"),
/// ]);
/// let weights = co_change_weights(&table);
/// assert_eq!(weights[&("a.rs".to_string(), "b.rs".to_string())], 2);
/// ```
pub fn co_change_weights(table: &FileChangeTable) -> BTreeMap<(String, String), u32> {
    let mut commits: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for row in table.rows() {
        commits
            .entry(row.hash.as_str())
            .or_default()
            .insert(row.file_name.as_str());
    }

    let mut weights: BTreeMap<(String, String), u32> = BTreeMap::new();
    for files in commits.values() {
        let files: Vec<&str> = files.iter().copied().collect();
        for (i, a) in files.iter().enumerate() {
            for b in &files[i + 1..] {
                // BTreeSet iteration is sorted, so (a, b) is already ordered.
                *weights.entry((a.to_string(), b.to_string())).or_default() += 1;
            }
        }
    }
    weights
}

/// Build a co-change graph keeping about the top `rank` relationships.
///
/// With `stop_retry` false, an oversized graph is escalated up to
/// [`DEFAULT_MAX_RETRIES`] times against [`DEFAULT_EDGE_LIMIT`].
///
/// # Errors
///
/// Returns [`GitriskError::EmptyGraph`] if `table` is empty.
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use gitrisk_history::cochange::build;
/// use gitrisk_history::table::{FileChangeRecord, FileChangeTable};
///
/// let ev = |h: &str, f: &str| FileChangeRecord {
///     hash: h.into(),
///     author: "alice".into(),
///     timestamp: Utc::now(),
///     file_name: f.into(),
/// };
/// let table = FileChangeTable::from_records(vec![
///     ev("c1", "a.rs"), ev("c1", "b.rs"), ev("c2", "c.rs"),
/// ]);
/// let graph = build(&table, 10, false).unwrap();
/// assert_eq!(graph.nodes(), vec!["a.rs", "b.rs"]);
/// assert_eq!(graph.weight("b.rs", "a.rs"), Some(1));
/// ```
pub fn build(
    table: &FileChangeTable,
    rank: usize,
    stop_retry: bool,
) -> Result<CoChangeGraph, GitriskError> {
    build_with(
        table,
        &GraphOptions {
            rank,
            retry: RetryPolicy::from_stop_retry(stop_retry),
            ..GraphOptions::default()
        },
    )
}

/// Build a co-change graph with explicit options.
///
/// Each escalation round halves the rank and raises the threshold to at
/// least the next distinct weight, so the threshold strictly increases and
/// the loop ends after at most `max_retries` rounds.
///
/// # Errors
///
/// Returns [`GitriskError::EmptyGraph`] if `table` is empty.
pub fn build_with(
    table: &FileChangeTable,
    options: &GraphOptions<'_>,
) -> Result<CoChangeGraph, GitriskError> {
    if table.is_empty() {
        return Err(GitriskError::EmptyGraph);
    }

    let weights = co_change_weights(table);
    let mut ranked: Vec<u32> = weights.values().copied().collect();
    ranked.sort_unstable_by(|a, b| b.cmp(a));

    let mut rank = options.rank.max(1);
    let mut threshold = threshold_at(&ranked, rank);
    let mut graph = assemble(&weights, threshold, rank, 0);
    tracing::debug!(
        pairs = weights.len(),
        rank,
        threshold,
        edges = graph.edge_count(),
        "built co-change graph"
    );

    if options.retry == RetryPolicy::SinglePass {
        return Ok(graph);
    }

    while graph.edge_count() > options.edge_limit && graph.escalations < options.max_retries {
        if options.cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
            tracing::debug!("co-change escalation cancelled");
            break;
        }
        rank = (rank / 2).max(1);
        threshold = threshold_at(&ranked, rank).max(next_weight_above(&ranked, threshold));
        graph = assemble(&weights, threshold, rank, graph.escalations + 1);
        tracing::debug!(
            round = graph.escalations,
            rank,
            threshold,
            edges = graph.edge_count(),
            "escalated co-change threshold"
        );
    }

    if graph.edge_count() > options.edge_limit {
        tracing::warn!(
            edges = graph.edge_count(),
            limit = options.edge_limit,
            "co-change graph still exceeds edge limit after escalation"
        );
    }
    Ok(graph)
}

/// Weight at position `rank` (1-based) of the descending weight list,
/// clamped to the last position. `1` when there are no pairs.
fn threshold_at(ranked: &[u32], rank: usize) -> u32 {
    match ranked.len() {
        0 => 1,
        len => ranked[rank.min(len) - 1],
    }
}

/// Smallest weight strictly above `threshold`, or `threshold + 1` when
/// none exists (which empties the graph).
fn next_weight_above(ranked: &[u32], threshold: u32) -> u32 {
    ranked
        .iter()
        .rev()
        .copied()
        .find(|w| *w > threshold)
        .unwrap_or_else(|| threshold.saturating_add(1))
}

fn assemble(
    weights: &BTreeMap<(String, String), u32>,
    threshold: u32,
    rank: usize,
    escalations: u32,
) -> CoChangeGraph {
    let mut graph = UnGraph::new_undirected();
    let mut index: HashMap<String, NodeIndex> = HashMap::new();

    let kept: Vec<(&(String, String), &u32)> =
        weights.iter().filter(|(_, w)| **w >= threshold).collect();

    let names: BTreeSet<&str> = kept
        .iter()
        .flat_map(|((a, b), _)| [a.as_str(), b.as_str()])
        .collect();
    for name in names {
        let idx = graph.add_node(name.to_string());
        index.insert(name.to_string(), idx);
    }
    for ((a, b), w) in kept {
        graph.add_edge(index[a], index[b], *w);
    }

    CoChangeGraph {
        graph,
        index,
        threshold,
        rank,
        escalations,
    }
}
