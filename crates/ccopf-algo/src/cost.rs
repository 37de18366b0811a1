//! Generation cost model.
//!
//! Per bus `i` the scheduled generation cost is `c1ᵢ·gpᵢ + c2ᵢ·gpᵢ²`, with
//! both coefficients zero at buses without a generator. The quadratic part is
//! carried by the conic objective through `F = C^{1/2}`, where
//! `C = qcfac · diag(c2)`.

use ccopf_core::Topology;

use crate::OpfError;

#[derive(Debug, Clone, PartialEq)]
pub struct CostModel {
    /// c1 per bus
    pub linear: Vec<f64>,
    /// qcfac · c2 per bus
    pub quadratic: Vec<f64>,
    /// Diagonal of `F = C^{1/2}`
    pub f_diag: Vec<f64>,
}

impl CostModel {
    pub fn assemble(topology: &Topology, qcfac: f64) -> Result<Self, OpfError> {
        let n = topology.n_buses();
        let mut linear = Vec::with_capacity(n);
        let mut quadratic = Vec::with_capacity(n);

        for bus in topology.buses() {
            let (c1, c2) = bus
                .generator
                .as_ref()
                .map(|g| (g.cost_linear, g.cost_quadratic))
                .unwrap_or((0.0, 0.0));
            let c2 = qcfac * c2;
            if c2 < 0.0 {
                return Err(OpfError::NumericalIssue(format!(
                    "quadratic cost at {} is negative ({}); C^(1/2) is undefined",
                    bus.id, c2
                )));
            }
            linear.push(c1);
            quadratic.push(c2);
        }

        let f_diag = quadratic.iter().map(|c| c.sqrt()).collect();
        Ok(Self {
            linear,
            quadratic,
            f_diag,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccopf_core::{Bus, BusId, Generator, Line};

    fn feeder(c2: f64) -> Topology {
        let buses = vec![
            Bus::new(BusId::new(0), "sub")
                .with_generator(Generator::new("grid", 10.0, 10.0).with_cost(20.0, 1.0)),
            Bus::new(BusId::new(1), "b1")
                .with_ancestor(BusId::new(0))
                .with_generator(Generator::new("pv", 1.0, 0.5).with_cost(5.0, c2)),
            Bus::new(BusId::new(2), "b2").with_ancestor(BusId::new(1)),
        ];
        let lines = vec![
            Line::new(BusId::new(1), 0.01, 0.01),
            Line::new(BusId::new(2), 0.01, 0.01),
        ];
        Topology::new(buses, lines).unwrap()
    }

    #[test]
    fn test_costs_per_bus() {
        let costs = CostModel::assemble(&feeder(4.0), 2.0).unwrap();
        assert_eq!(costs.linear, vec![20.0, 5.0, 0.0]);
        assert_eq!(costs.quadratic, vec![2.0, 8.0, 0.0]);
        assert!((costs.f_diag[1] - 8.0_f64.sqrt()).abs() < 1e-12);
        assert_eq!(costs.f_diag[2], 0.0);
    }

    #[test]
    fn test_negative_quadratic_cost_rejected() {
        assert!(matches!(
            CostModel::assemble(&feeder(-1.0), 1.0),
            Err(OpfError::NumericalIssue(_))
        ));
    }
}
