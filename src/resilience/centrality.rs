//! Graph centrality over the faculty coverage network
//!
//! Builds a bipartite graph of faculty connected to the blocks they cover and
//! the services they can staff, then derives degree, PageRank, betweenness
//! (Brandes) and eigenvector (power iteration) centrality per faculty node.

use petgraph::graph::{NodeIndex, UnGraph};
use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

/// Per-faculty graph metrics, each normalized to [0, 1]
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphMetrics {
    pub betweenness: f64,
    pub degree: f64,
    pub eigenvector: f64,
    pub pagerank: f64,
}

/// Node identity within the coverage graph
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CoverageNode {
    Faculty(Uuid),
    Block(Uuid),
    Service(Uuid),
}

/// Compute centrality metrics for every faculty id.
///
/// `coverage_edges` are (faculty_id, block_id) pairs from assignments;
/// `services` maps service ids to the faculty able to staff them.
pub fn faculty_centrality(
    faculty_ids: &[Uuid],
    coverage_edges: &[(Uuid, Uuid)],
    services: &HashMap<Uuid, Vec<Uuid>>,
) -> HashMap<Uuid, GraphMetrics> {
    let mut graph: UnGraph<CoverageNode, ()> = UnGraph::new_undirected();
    let mut indices: HashMap<CoverageNode, NodeIndex> = HashMap::new();

    let mut node = |graph: &mut UnGraph<CoverageNode, ()>,
                    indices: &mut HashMap<CoverageNode, NodeIndex>,
                    key: CoverageNode| {
        *indices
            .entry(key.clone())
            .or_insert_with(|| graph.add_node(key))
    };

    for faculty_id in faculty_ids {
        node(&mut graph, &mut indices, CoverageNode::Faculty(*faculty_id));
    }
    for (faculty_id, block_id) in coverage_edges {
        let f = node(&mut graph, &mut indices, CoverageNode::Faculty(*faculty_id));
        let b = node(&mut graph, &mut indices, CoverageNode::Block(*block_id));
        if graph.find_edge(f, b).is_none() {
            graph.add_edge(f, b, ());
        }
    }
    for (service_id, staff) in services {
        let s = node(&mut graph, &mut indices, CoverageNode::Service(*service_id));
        for faculty_id in staff {
            let f = node(&mut graph, &mut indices, CoverageNode::Faculty(*faculty_id));
            if graph.find_edge(f, s).is_none() {
                graph.add_edge(f, s, ());
            }
        }
    }

    let n = graph.node_count();
    if n == 0 {
        return HashMap::new();
    }

    let degree = degree_centrality(&graph);
    let pagerank = petgraph::algo::page_rank(&graph, 0.85_f64, 50);
    let betweenness = brandes_betweenness(&graph);
    let eigenvector = eigenvector_centrality(&graph, 1000, 1e-6);

    let mut metrics = HashMap::new();
    for faculty_id in faculty_ids {
        let Some(&index) = indices.get(&CoverageNode::Faculty(*faculty_id)) else {
            continue;
        };
        let i = index.index();
        metrics.insert(
            *faculty_id,
            GraphMetrics {
                betweenness: betweenness[i],
                degree: degree[i],
                eigenvector: eigenvector[i],
                pagerank: pagerank[i],
            },
        );
    }
    metrics
}

/// Degree centrality: neighbor count over (n - 1)
fn degree_centrality(graph: &UnGraph<CoverageNode, ()>) -> Vec<f64> {
    let n = graph.node_count();
    let denom = if n > 1 { (n - 1) as f64 } else { 1.0 };
    graph
        .node_indices()
        .map(|index| graph.neighbors(index).count() as f64 / denom)
        .collect()
}

/// Brandes' algorithm for unweighted betweenness, normalized for an
/// undirected graph
fn brandes_betweenness(graph: &UnGraph<CoverageNode, ()>) -> Vec<f64> {
    let n = graph.node_count();
    let mut centrality = vec![0.0f64; n];
    if n < 3 {
        return centrality;
    }

    for source in graph.node_indices() {
        let s = source.index();
        let mut stack: Vec<usize> = Vec::new();
        let mut predecessors: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut sigma = vec![0.0f64; n];
        let mut distance = vec![-1i64; n];
        sigma[s] = 1.0;
        distance[s] = 0;

        let mut queue = VecDeque::new();
        queue.push_back(s);
        while let Some(v) = queue.pop_front() {
            stack.push(v);
            for neighbor in graph.neighbors(NodeIndex::new(v)) {
                let w = neighbor.index();
                if distance[w] < 0 {
                    distance[w] = distance[v] + 1;
                    queue.push_back(w);
                }
                if distance[w] == distance[v] + 1 {
                    sigma[w] += sigma[v];
                    predecessors[w].push(v);
                }
            }
        }

        let mut delta = vec![0.0f64; n];
        while let Some(w) = stack.pop() {
            for &v in &predecessors[w] {
                delta[v] += (sigma[v] / sigma[w]) * (1.0 + delta[w]);
            }
            if w != s {
                centrality[w] += delta[w];
            }
        }
    }

    // Undirected: each pair counted twice; normalize by pair count
    let scale = 1.0 / ((n - 1) as f64 * (n - 2) as f64);
    for value in &mut centrality {
        *value *= scale;
    }
    centrality
}

/// Eigenvector centrality by power iteration; zeros on non-convergence
fn eigenvector_centrality(
    graph: &UnGraph<CoverageNode, ()>,
    max_iterations: usize,
    tolerance: f64,
) -> Vec<f64> {
    let n = graph.node_count();
    if n == 0 {
        return Vec::new();
    }
    let mut current = vec![1.0 / n as f64; n];

    for _ in 0..max_iterations {
        let mut next = vec![0.0f64; n];
        for index in graph.node_indices() {
            let i = index.index();
            for neighbor in graph.neighbors(index) {
                next[i] += current[neighbor.index()];
            }
        }
        let norm = next.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm == 0.0 {
            return vec![0.0; n];
        }
        for value in &mut next {
            *value /= norm;
        }
        let shift: f64 = next
            .iter()
            .zip(&current)
            .map(|(a, b)| (a - b).abs())
            .sum();
        current = next;
        if shift < tolerance {
            return current;
        }
    }
    vec![0.0; n]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_graph() {
        let metrics = faculty_centrality(&[], &[], &HashMap::new());
        assert!(metrics.is_empty());
    }

    #[test]
    fn test_hub_faculty_scores_highest() {
        let hub = Uuid::new_v4();
        let spoke = Uuid::new_v4();
        let blocks: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();

        // Hub covers all five blocks, spoke covers one
        let mut edges: Vec<(Uuid, Uuid)> = blocks.iter().map(|b| (hub, *b)).collect();
        edges.push((spoke, blocks[0]));

        let metrics = faculty_centrality(&[hub, spoke], &edges, &HashMap::new());
        let hub_metrics = metrics[&hub];
        let spoke_metrics = metrics[&spoke];
        assert!(hub_metrics.degree > spoke_metrics.degree);
        assert!(hub_metrics.pagerank > spoke_metrics.pagerank);
        assert!(hub_metrics.betweenness >= spoke_metrics.betweenness);
        assert!(hub_metrics.eigenvector > spoke_metrics.eigenvector);
    }

    #[test]
    fn test_service_edges_contribute() {
        let faculty = Uuid::new_v4();
        let service = Uuid::new_v4();
        let mut services = HashMap::new();
        services.insert(service, vec![faculty]);
        let metrics = faculty_centrality(&[faculty], &[], &services);
        assert!(metrics[&faculty].degree > 0.0);
    }
}
