use alloc::collections::BTreeSet;
use alloc::vec::Vec;
use core::fmt::Debug;
use core::hash::Hash;

use hashbrown::HashMap;

use super::rel::Rel;

/// Directed graph with relation-labeled edges, backed by an adjacency map.
///
/// Each vertex of type `T` maps to its outgoing neighbors, and each neighbor
/// to the set of relations the edge carries. An edge is a
/// `(source, target, rel)` triple; linking the same triple twice is a no-op,
/// while linking the same pair under another relation adds a label.
///
/// Vertices are added implicitly when they appear in an edge, or explicitly
/// via [`add_vertex`](Self::add_vertex).
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct DiGraph<T>
where
    T: Hash + Eq + Clone + Debug,
{
    /// Maps each vertex to its neighbors and the relations of each edge.
    pub adj_map: HashMap<T, HashMap<T, BTreeSet<Rel>>>,
}

impl<T> DiGraph<T>
where
    T: Hash + Eq + Clone + Debug,
{
    /// Inserts the edge `source -> target` labeled `rel`.
    ///
    /// Both vertices are added to the graph if not already present. Returns
    /// `true` if the triple was new.
    pub fn link(&mut self, source: T, target: T, rel: Rel) -> bool {
        let added = self
            .adj_map
            .entry(source)
            .or_default()
            .entry(target.clone())
            .or_default()
            .insert(rel);
        self.adj_map.entry(target).or_default();
        added
    }

    /// Adds a vertex with no outgoing edges (if not already present).
    pub fn add_vertex(&mut self, source: T) {
        self.adj_map.entry(source).or_default();
    }

    /// Returns `true` if an edge from `source` to `target` exists under any
    /// relation.
    pub fn has_edge(&self, source: &T, target: &T) -> bool {
        self.adj_map
            .get(source)
            .is_some_and(|neighbors| neighbors.contains_key(target))
    }

    /// Returns `true` if the edge `source -> target` carries `rel`.
    pub fn has_rel(&self, source: &T, target: &T, rel: Rel) -> bool {
        self.rels(source, target)
            .is_some_and(|rels| rels.contains(&rel))
    }

    /// Relations labeling the edge `source -> target`, if any.
    pub fn rels(&self, source: &T, target: &T) -> Option<&BTreeSet<Rel>> {
        self.adj_map.get(source)?.get(target)
    }

    /// Outgoing `(target, rel)` pairs of `source`. An absent vertex has none.
    pub fn outs<'a>(&'a self, source: &T) -> impl Iterator<Item = (&'a T, Rel)> + 'a {
        self.adj_map
            .get(source)
            .into_iter()
            .flat_map(|neighbors| {
                neighbors
                    .iter()
                    .flat_map(|(target, rels)| rels.iter().map(move |&rel| (target, rel)))
            })
    }

    /// Merges all edges from `other` into this graph.
    ///
    /// Returns `true` if any new edge was added.
    pub fn union(&mut self, other: &Self) -> bool {
        let mut change = false;
        for (source, other_neighbors) in &other.adj_map {
            let neighbors = self.adj_map.entry(source.clone()).or_default();
            for (target, other_rels) in other_neighbors {
                let rels = neighbors.entry(target.clone()).or_default();
                let old_size = rels.len();
                rels.extend(other_rels.iter().copied());
                change |= rels.len() != old_size;
            }
        }
        change
    }

    /// The subgraph of edges labeled with one of `rels`. Every vertex is kept.
    #[must_use]
    pub fn project(&self, rels: &[Rel]) -> Self {
        let adj_map = self
            .adj_map
            .iter()
            .map(|(source, neighbors)| {
                let kept = neighbors
                    .iter()
                    .filter_map(|(target, labels)| {
                        let labels: BTreeSet<Rel> = labels
                            .iter()
                            .filter(|rel| rels.contains(rel))
                            .copied()
                            .collect();
                        (!labels.is_empty()).then(|| (target.clone(), labels))
                    })
                    .collect();
                (source.clone(), kept)
            })
            .collect();
        Self { adj_map }
    }

    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.adj_map.len()
    }

    /// Number of `(source, target, rel)` triples.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.adj_map
            .values()
            .flat_map(HashMap::values)
            .map(BTreeSet::len)
            .sum()
    }

    /// Returns all edges as `(source, target, rel)` triples.
    #[must_use]
    pub fn to_edge_list(&self) -> Vec<(T, T, Rel)> {
        let mut edges = Vec::new();
        for (src, dsts) in &self.adj_map {
            for (dst, rels) in dsts {
                for &rel in rels {
                    edges.push((src.clone(), dst.clone(), rel));
                }
            }
        }
        edges
    }
}

impl<T> DiGraph<T>
where
    T: Hash + Eq + Clone + Debug + Ord,
{
    /// Strongly connected components that contain a cycle: components of
    /// more than one vertex, and single vertices with a self-loop.
    ///
    /// Uses an iterative Tarjan over dense vertex ids assigned in sorted
    /// order, so the result is deterministic: each component is sorted, and
    /// components are sorted by their smallest vertex.
    /// Time complexity: O(V log V + E).
    #[must_use]
    pub fn strongly_connected_components(&self) -> Vec<Vec<T>> {
        const UNVISITED: usize = usize::MAX;

        let mut vertices: Vec<&T> = self.adj_map.keys().collect();
        vertices.sort();
        let ids: HashMap<&T, usize> = vertices
            .iter()
            .enumerate()
            .map(|(id, vertex)| (*vertex, id))
            .collect();
        let successors: Vec<Vec<usize>> = vertices
            .iter()
            .map(|vertex| {
                let mut targets: Vec<usize> = self
                    .adj_map
                    .get(*vertex)
                    .into_iter()
                    .flat_map(HashMap::keys)
                    .filter_map(|target| ids.get(target).copied())
                    .collect();
                targets.sort_unstable();
                targets
            })
            .collect();

        let count = vertices.len();
        let mut index = alloc::vec![UNVISITED; count];
        let mut low = alloc::vec![0; count];
        let mut on_stack = alloc::vec![false; count];
        let mut stack: Vec<usize> = Vec::new();
        let mut next_index = 0;
        let mut components: Vec<Vec<T>> = Vec::new();
        // (vertex, position of the next successor to visit)
        let mut frames: Vec<(usize, usize)> = Vec::new();

        for root in 0..count {
            if index[root] != UNVISITED {
                continue;
            }
            index[root] = next_index;
            low[root] = next_index;
            next_index += 1;
            stack.push(root);
            on_stack[root] = true;
            frames.push((root, 0));

            while let Some(frame) = frames.last_mut() {
                let vertex = frame.0;
                if let Some(&target) = successors[vertex].get(frame.1) {
                    frame.1 += 1;
                    if index[target] == UNVISITED {
                        index[target] = next_index;
                        low[target] = next_index;
                        next_index += 1;
                        stack.push(target);
                        on_stack[target] = true;
                        frames.push((target, 0));
                    } else if on_stack[target] {
                        low[vertex] = low[vertex].min(index[target]);
                    }
                    continue;
                }

                frames.pop();
                if let Some(&(parent, _)) = frames.last() {
                    low[parent] = low[parent].min(low[vertex]);
                }
                if low[vertex] != index[vertex] {
                    continue;
                }
                let mut members = Vec::new();
                while let Some(member) = stack.pop() {
                    on_stack[member] = false;
                    members.push(member);
                    if member == vertex {
                        break;
                    }
                }
                if members.len() > 1 || successors[vertex].binary_search(&vertex).is_ok() {
                    let mut component: Vec<T> =
                        members.iter().map(|&id| vertices[id].clone()).collect();
                    component.sort();
                    components.push(component);
                }
            }
        }

        components.sort();
        components
    }

    /// Returns `true` if the graph contains a cycle.
    #[must_use]
    pub fn has_cycle(&self) -> bool {
        !self.strongly_connected_components().is_empty()
    }

    /// Outgoing `(target, rel)` pairs of `source`, sorted by target, then
    /// relation.
    #[must_use]
    pub fn sorted_outs(&self, source: &T) -> Vec<(T, Rel)> {
        let mut outs: Vec<(T, Rel)> = self
            .outs(source)
            .map(|(target, rel)| (target.clone(), rel))
            .collect();
        outs.sort();
        outs
    }
}
