//! Dinic max-flow over a pixel graph with terminal links
//!
//! Pixel nodes are `0..n`; the source and sink are implicit extra nodes.
//! After [`FlowGraph::max_flow`], [`FlowGraph::in_source_segment`] reports
//! which side of the minimum cut a pixel ended on.

#![allow(clippy::indexing_slicing)]

use std::collections::VecDeque;

const EPS: f64 = 1e-9;
const NONE: usize = usize::MAX;

#[derive(Debug)]
pub struct FlowGraph {
    source: usize,
    sink: usize,
    head: Vec<usize>,
    next: Vec<usize>,
    to: Vec<usize>,
    cap: Vec<f64>,
    level: Vec<i32>,
    current: Vec<usize>,
    reachable: Vec<bool>,
}

impl FlowGraph {
    /// Create a graph with `pixels` nodes and room for `edge_hint` edge pairs
    #[must_use]
    pub fn new(pixels: usize, edge_hint: usize) -> Self {
        let nodes = pixels + 2;
        Self {
            source: pixels,
            sink: pixels + 1,
            head: vec![NONE; nodes],
            next: Vec::with_capacity(edge_hint * 2),
            to: Vec::with_capacity(edge_hint * 2),
            cap: Vec::with_capacity(edge_hint * 2),
            level: vec![-1; nodes],
            current: vec![NONE; nodes],
            reachable: Vec::new(),
        }
    }

    fn push_arc(&mut self, from: usize, to: usize, cap: f64) {
        self.to.push(to);
        self.cap.push(cap);
        self.next.push(self.head[from]);
        self.head[from] = self.to.len() - 1;
    }

    /// Add a pair of arcs `a -> b` and `b -> a` with the given capacities
    fn add_pair(&mut self, a: usize, b: usize, cap_ab: f64, cap_ba: f64) {
        self.push_arc(a, b, cap_ab);
        self.push_arc(b, a, cap_ba);
    }

    /// Terminal links of a pixel: capacity from the source and to the sink
    ///
    /// The common part of both capacities is cut either way and is dropped.
    pub fn add_terminal_weights(&mut self, node: usize, source_cap: f64, sink_cap: f64) {
        let shared = source_cap.min(sink_cap);
        let s = source_cap - shared;
        let t = sink_cap - shared;
        if s > EPS {
            self.add_pair(self.source, node, s, 0.0);
        }
        if t > EPS {
            self.add_pair(node, self.sink, t, 0.0);
        }
    }

    /// Undirected neighbourhood link between two pixels
    pub fn add_edge(&mut self, a: usize, b: usize, weight: f64) {
        if weight > EPS {
            self.add_pair(a, b, weight, weight);
        }
    }

    fn build_levels(&mut self) -> bool {
        self.level.fill(-1);
        self.level[self.source] = 0;
        let mut queue = VecDeque::from([self.source]);
        while let Some(u) = queue.pop_front() {
            let mut e = self.head[u];
            while e != NONE {
                let v = self.to[e];
                if self.cap[e] > EPS && self.level[v] < 0 {
                    self.level[v] = self.level[u] + 1;
                    queue.push_back(v);
                }
                e = self.next[e];
            }
        }
        self.level[self.sink] >= 0
    }

    /// Push blocking flow along the level graph with an explicit path stack
    fn blocking_flow(&mut self) -> f64 {
        self.current.copy_from_slice(&self.head);
        let mut total = 0.0;
        let mut path: Vec<usize> = Vec::new();
        let mut u = self.source;

        loop {
            if u == self.sink {
                let flow = path
                    .iter()
                    .map(|&e| self.cap[e])
                    .fold(f64::INFINITY, f64::min);
                for &e in &path {
                    self.cap[e] -= flow;
                    self.cap[e ^ 1] += flow;
                }
                total += flow;

                // Resume from the tail of the first saturated arc.
                let saturated = path.iter().position(|&e| self.cap[e] <= EPS).unwrap_or(0);
                path.truncate(saturated);
                u = path.last().map_or(self.source, |&e| self.to[e]);
                continue;
            }

            let mut advanced = false;
            while self.current[u] != NONE {
                let e = self.current[u];
                let v = self.to[e];
                if self.cap[e] > EPS && self.level[v] == self.level[u] + 1 {
                    path.push(e);
                    u = v;
                    advanced = true;
                    break;
                }
                self.current[u] = self.next[e];
            }

            if !advanced {
                if u == self.source {
                    break;
                }
                // Dead end: drop the node from the level graph and retreat.
                self.level[u] = -1;
                let Some(e) = path.pop() else { break };
                u = self.to[e ^ 1];
                self.current[u] = self.next[e];
            }
        }
        total
    }

    /// Compute the maximum flow and record the source side of the minimum cut
    pub fn max_flow(&mut self) -> f64 {
        let mut flow = 0.0;
        while self.build_levels() {
            flow += self.blocking_flow();
        }

        self.reachable = vec![false; self.head.len()];
        self.reachable[self.source] = true;
        let mut queue = VecDeque::from([self.source]);
        while let Some(u) = queue.pop_front() {
            let mut e = self.head[u];
            while e != NONE {
                let v = self.to[e];
                if self.cap[e] > EPS && !self.reachable[v] {
                    self.reachable[v] = true;
                    queue.push_back(v);
                }
                e = self.next[e];
            }
        }
        flow
    }

    /// Whether a pixel lies on the source side of the minimum cut
    #[must_use]
    pub fn in_source_segment(&self, node: usize) -> bool {
        self.reachable.get(node).copied().unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_chain() {
        // source -5-> 0 -3-> 1 -4-> sink: bottleneck 3 between the pixels
        let mut g = FlowGraph::new(2, 4);
        g.add_terminal_weights(0, 5.0, 0.0);
        g.add_terminal_weights(1, 0.0, 4.0);
        g.add_edge(0, 1, 3.0);
        let flow = g.max_flow();
        assert!((flow - 3.0).abs() < 1e-9);
        assert!(g.in_source_segment(0));
        assert!(!g.in_source_segment(1));
    }

    #[test]
    fn test_shared_terminal_capacity_cancels() {
        let mut g = FlowGraph::new(1, 2);
        g.add_terminal_weights(0, 7.0, 2.0);
        let flow = g.max_flow();
        assert!(flow.abs() < 1e-9);
        assert!(g.in_source_segment(0));
    }

    #[test]
    fn test_diamond_graph() {
        // Two parallel routes of 2 and 3 units.
        let mut g = FlowGraph::new(4, 8);
        g.add_terminal_weights(0, 10.0, 0.0);
        g.add_edge(0, 1, 2.0);
        g.add_edge(0, 2, 3.0);
        g.add_edge(1, 3, 10.0);
        g.add_edge(2, 3, 10.0);
        g.add_terminal_weights(3, 0.0, 10.0);
        let flow = g.max_flow();
        assert!((flow - 5.0).abs() < 1e-9);
        assert!(g.in_source_segment(0));
        assert!(!g.in_source_segment(3));
    }
}
