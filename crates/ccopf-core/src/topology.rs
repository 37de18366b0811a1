//! Validated radial feeder topology.
//!
//! [`Topology::new`] turns a flat list of buses and lines into an indexed tree:
//! bus order is preserved (it defines matrix indices), the root is located, and
//! the ancestor relation is checked to be a single tree spanning every bus.
//!
//! Matrices derived here use the **non-root ordering**: the bus order with the
//! root removed. Position `k` in that ordering is simultaneously the row of the
//! line feeding that bus and the column of the bus itself.

use std::collections::HashMap;

use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Bfs;

use crate::{Bus, BusId, FeederError, FeederResult, Line};

#[derive(Debug, Clone)]
pub struct Topology {
    buses: Vec<Bus>,
    /// Line feeding each bus, indexed like `buses` (`None` for the root)
    lines: Vec<Option<Line>>,
    index: HashMap<BusId, usize>,
    root: usize,
    ancestors: Vec<Option<usize>>,
    children: Vec<Vec<usize>>,
    /// Bus indices in non-root ordering
    non_root: Vec<usize>,
    /// Inverse of `non_root`
    position: Vec<Option<usize>>,
}

impl Topology {
    /// Validate and index a feeder.
    ///
    /// # Errors
    ///
    /// - [`FeederError::Validation`] for malformed bus/line data
    /// - [`FeederError::Topology`] unless there is exactly one root, one line per
    ///   non-root bus, and the ancestor relation forms a tree reaching every bus
    /// - [`FeederError::UnknownBus`] for ancestors or lines naming missing buses
    pub fn new(buses: Vec<Bus>, lines: Vec<Line>) -> FeederResult<Self> {
        if buses.is_empty() {
            return Err(FeederError::Topology(
                "feeder has no buses; at least the substation bus is required".into(),
            ));
        }

        let mut index = HashMap::with_capacity(buses.len());
        for (i, bus) in buses.iter().enumerate() {
            validate_bus(bus)?;
            if index.insert(bus.id, i).is_some() {
                return Err(FeederError::Validation(format!(
                    "duplicate bus id {}",
                    bus.id
                )));
            }
        }

        let roots: Vec<usize> = buses
            .iter()
            .enumerate()
            .filter(|(_, b)| b.is_root())
            .map(|(i, _)| i)
            .collect();
        let root = match roots.as_slice() {
            [single] => *single,
            [] => {
                return Err(FeederError::Topology(
                    "no root bus: every bus names an ancestor".into(),
                ))
            }
            many => {
                let names: Vec<String> = many.iter().map(|&i| buses[i].id.to_string()).collect();
                return Err(FeederError::Topology(format!(
                    "expected exactly one root bus, found {} ({})",
                    many.len(),
                    names.join(", ")
                )));
            }
        };

        let mut ancestors = vec![None; buses.len()];
        let mut children = vec![Vec::new(); buses.len()];
        for (i, bus) in buses.iter().enumerate() {
            if let Some(anc) = bus.ancestor {
                let a = *index.get(&anc).ok_or(FeederError::UnknownBus(anc))?;
                if a == i {
                    return Err(FeederError::Topology(format!(
                        "{} names itself as ancestor",
                        bus.id
                    )));
                }
                ancestors[i] = Some(a);
                children[a].push(i);
            }
        }

        // Tree check: the ancestor graph must be acyclic and every bus reachable
        // from the root. Together with "one ancestor per bus" this is a tree.
        let mut graph: DiGraph<BusId, ()> = DiGraph::with_capacity(buses.len(), buses.len());
        let nodes: Vec<NodeIndex> = buses.iter().map(|b| graph.add_node(b.id)).collect();
        for (i, anc) in ancestors.iter().enumerate() {
            if let Some(a) = anc {
                graph.add_edge(nodes[*a], nodes[i], ());
            }
        }
        if is_cyclic_directed(&graph) {
            return Err(FeederError::Topology(
                "ancestor relation contains a cycle".into(),
            ));
        }
        let mut reached = 0;
        let mut bfs = Bfs::new(&graph, nodes[root]);
        while bfs.next(&graph).is_some() {
            reached += 1;
        }
        if reached != buses.len() {
            return Err(FeederError::Topology(format!(
                "{} of {} buses are not connected to the root {}",
                buses.len() - reached,
                buses.len(),
                buses[root].id
            )));
        }

        let mut line_slots: Vec<Option<Line>> = vec![None; buses.len()];
        for line in lines {
            validate_line(&line)?;
            let i = *index
                .get(&line.bus)
                .ok_or(FeederError::UnknownBus(line.bus))?;
            if i == root {
                return Err(FeederError::Topology(format!(
                    "root {} cannot have an incoming line",
                    line.bus
                )));
            }
            if line_slots[i].is_some() {
                return Err(FeederError::Topology(format!(
                    "more than one line feeds {}",
                    line.bus
                )));
            }
            line_slots[i] = Some(line);
        }
        if let Some(i) = (0..buses.len()).find(|&i| i != root && line_slots[i].is_none()) {
            return Err(FeederError::Topology(format!(
                "no line connects {} to its ancestor",
                buses[i].id
            )));
        }

        let non_root: Vec<usize> = (0..buses.len()).filter(|&i| i != root).collect();
        let mut position = vec![None; buses.len()];
        for (k, &i) in non_root.iter().enumerate() {
            position[i] = Some(k);
        }

        Ok(Self {
            buses,
            lines: line_slots,
            index,
            root,
            ancestors,
            children,
            non_root,
            position,
        })
    }

    #[inline]
    pub fn n_buses(&self) -> usize {
        self.buses.len()
    }

    pub fn buses(&self) -> &[Bus] {
        &self.buses
    }

    #[inline]
    pub fn bus(&self, i: usize) -> &Bus {
        &self.buses[i]
    }

    pub fn root(&self) -> &Bus {
        &self.buses[self.root]
    }

    #[inline]
    pub fn root_index(&self) -> usize {
        self.root
    }

    pub fn index_of(&self, id: BusId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    pub fn ancestor(&self, i: usize) -> Option<usize> {
        self.ancestors[i]
    }

    /// Immediate descendants of bus `i`, in input order.
    pub fn children(&self, i: usize) -> &[usize] {
        &self.children[i]
    }

    /// Line feeding bus `i` (`None` for the root).
    pub fn line(&self, i: usize) -> Option<&Line> {
        self.lines[i].as_ref()
    }

    /// Bus indices without the root, in bus order.
    pub fn non_root(&self) -> &[usize] {
        &self.non_root
    }

    /// Position of bus `i` in the non-root ordering.
    pub fn position(&self, i: usize) -> Option<usize> {
        self.position[i]
    }

    /// Ancestry matrix `A` (lines × buses, non-root ordering).
    ///
    /// `A[l][b] = 1` when line `l` lies on the path from the root to bus `b`.
    /// Its inverse is the (signed) line–bus incidence matrix.
    pub fn path_matrix(&self) -> Vec<Vec<f64>> {
        let n = self.non_root.len();
        let mut a = vec![vec![0.0; n]; n];
        for (col, &bus) in self.non_root.iter().enumerate() {
            let mut cursor = Some(bus);
            while let Some(i) = cursor {
                if let Some(row) = self.position[i] {
                    a[row][col] = 1.0;
                }
                cursor = self.ancestors[i];
            }
        }
        a
    }

    /// Diagonal line-resistance matrix `R_d` (non-root ordering).
    pub fn resistance_matrix(&self) -> Vec<Vec<f64>> {
        let n = self.non_root.len();
        let mut r = vec![vec![0.0; n]; n];
        for (k, &i) in self.non_root.iter().enumerate() {
            r[k][k] = self.lines[i].as_ref().map(|l| l.resistance).unwrap_or(0.0);
        }
        r
    }

    pub fn total_demand(&self) -> (f64, f64) {
        self.buses
            .iter()
            .fold((0.0, 0.0), |(p, q), b| (p + b.p_demand, q + b.q_demand))
    }

    /// Copy of this feeder with every demand multiplied by `factor`.
    pub fn with_load_factor(&self, factor: f64) -> FeederResult<Self> {
        if !factor.is_finite() || factor < 0.0 {
            return Err(FeederError::Validation(format!(
                "load factor must be finite and non-negative, got {}",
                factor
            )));
        }
        let mut scaled = self.clone();
        for bus in &mut scaled.buses {
            bus.p_demand *= factor;
            bus.q_demand *= factor;
        }
        Ok(scaled)
    }
}

fn validate_bus(bus: &Bus) -> FeederResult<()> {
    if !bus.p_demand.is_finite() || !bus.q_demand.is_finite() {
        return Err(FeederError::Validation(format!(
            "{} has non-finite demand",
            bus.id
        )));
    }
    if !(bus.v_min > 0.0 && bus.v_min <= bus.v_max && bus.v_max.is_finite()) {
        return Err(FeederError::Validation(format!(
            "{} has invalid voltage limits [{}, {}]",
            bus.id, bus.v_min, bus.v_max
        )));
    }
    if let Some(gen) = &bus.generator {
        if !(gen.p_max >= 0.0 && gen.q_max >= 0.0 && gen.p_max.is_finite() && gen.q_max.is_finite())
        {
            return Err(FeederError::Validation(format!(
                "generator {} at {} has invalid limits (p_max={}, q_max={})",
                gen.name, bus.id, gen.p_max, gen.q_max
            )));
        }
        if !gen.cost_linear.is_finite() || !gen.cost_quadratic.is_finite() {
            return Err(FeederError::Validation(format!(
                "generator {} at {} has non-finite cost coefficients",
                gen.name, bus.id
            )));
        }
    }
    Ok(())
}

fn validate_line(line: &Line) -> FeederResult<()> {
    if !(line.resistance.is_finite() && line.resistance >= 0.0 && line.reactance.is_finite()) {
        return Err(FeederError::Validation(format!(
            "line feeding {} has invalid impedance (r={}, x={})",
            line.bus, line.resistance, line.reactance
        )));
    }
    if let Some(s_max) = line.s_max {
        if !(s_max > 0.0) {
            return Err(FeederError::Validation(format!(
                "line feeding {} has non-positive thermal limit {}",
                line.bus, s_max
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Generator;

    /// root(0) - 1 - 2, with 3 branching off 1
    fn branching_feeder() -> (Vec<Bus>, Vec<Line>) {
        let buses = vec![
            Bus::new(BusId::new(0), "sub").with_generator(Generator::new("grid", 5.0, 5.0)),
            Bus::new(BusId::new(1), "b1").with_ancestor(BusId::new(0)),
            Bus::new(BusId::new(2), "b2")
                .with_ancestor(BusId::new(1))
                .with_demand(0.4, 0.1),
            Bus::new(BusId::new(3), "b3")
                .with_ancestor(BusId::new(1))
                .with_demand(0.2, 0.05),
        ];
        let lines = vec![
            Line::new(BusId::new(1), 0.01, 0.02),
            Line::new(BusId::new(2), 0.02, 0.03),
            Line::new(BusId::new(3), 0.03, 0.04),
        ];
        (buses, lines)
    }

    #[test]
    fn test_tree_indexing() {
        let (buses, lines) = branching_feeder();
        let topo = Topology::new(buses, lines).unwrap();

        assert_eq!(topo.n_buses(), 4);
        assert_eq!(topo.root_index(), 0);
        assert_eq!(topo.children(1), &[2, 3]);
        assert_eq!(topo.ancestor(3), Some(1));
        assert_eq!(topo.non_root(), &[1, 2, 3]);
        assert_eq!(topo.position(2), Some(1));
        assert!(topo.line(0).is_none());
        assert_eq!(topo.line(3).map(|l| l.resistance), Some(0.03));
    }

    #[test]
    fn test_path_matrix_and_resistance() {
        let (buses, lines) = branching_feeder();
        let topo = Topology::new(buses, lines).unwrap();

        let a = topo.path_matrix();
        // line into 1 is on every path; lines into 2 and 3 only on their own
        assert_eq!(a[0], vec![1.0, 1.0, 1.0]);
        assert_eq!(a[1], vec![0.0, 1.0, 0.0]);
        assert_eq!(a[2], vec![0.0, 0.0, 1.0]);

        let rd = topo.resistance_matrix();
        assert_eq!(rd[1][1], 0.02);
        assert_eq!(rd[0][1], 0.0);
    }

    #[test]
    fn test_rejects_two_roots() {
        let (mut buses, lines) = branching_feeder();
        buses[3].ancestor = None;
        let err = Topology::new(buses, lines).unwrap_err();
        assert!(matches!(err, FeederError::Topology(_)));
    }

    #[test]
    fn test_rejects_cycle() {
        let (mut buses, lines) = branching_feeder();
        // 1 -> 2 -> 1 cycle disconnected from root
        buses[1].ancestor = Some(BusId::new(2));
        let err = Topology::new(buses, lines).unwrap_err();
        assert!(matches!(err, FeederError::Topology(_)));
    }

    #[test]
    fn test_rejects_unknown_ancestor() {
        let (mut buses, lines) = branching_feeder();
        buses[2].ancestor = Some(BusId::new(42));
        let err = Topology::new(buses, lines).unwrap_err();
        assert_eq!(err, FeederError::UnknownBus(BusId::new(42)));
    }

    #[test]
    fn test_rejects_missing_line() {
        let (buses, mut lines) = branching_feeder();
        lines.pop();
        let err = Topology::new(buses, lines).unwrap_err();
        assert!(err.to_string().contains("no line connects"));
    }

    #[test]
    fn test_rejects_line_into_root() {
        let (buses, mut lines) = branching_feeder();
        lines.push(Line::new(BusId::new(0), 0.01, 0.01));
        assert!(Topology::new(buses, lines).is_err());
    }

    #[test]
    fn test_load_factor_scales_demand_only() {
        let (buses, lines) = branching_feeder();
        let topo = Topology::new(buses, lines).unwrap();
        let scaled = topo.with_load_factor(1.5).unwrap();

        let (p, q) = scaled.total_demand();
        assert!((p - 0.9).abs() < 1e-12);
        assert!((q - 0.225).abs() < 1e-12);
        assert_eq!(scaled.children(1), topo.children(1));
        assert!(topo.with_load_factor(-1.0).is_err());
    }

    #[test]
    fn test_bus_serde_roundtrip_keeps_ids_transparent() {
        let bus = Bus::new(BusId::new(3), "b3").with_ancestor(BusId::new(1));
        let json = serde_json::to_value(&bus).unwrap();
        assert_eq!(json["id"], 3);
        assert_eq!(json["ancestor"], 1);
    }
}
