//! Routing compiled programs onto a coupling map.
//!
//! Qubits start on the trivial layout (logical `i` on physical `i`). Before
//! each multi-qubit gate whose qubits are not connected, operands are moved
//! next to the gate's target with SWAPs, each emitted as three `cx`. The
//! layout permutation is carried forward, so later gates and measurements
//! address wherever their qubits ended up.

use std::collections::VecDeque;

use tracing::debug;

use crate::capability::{Topology, TopologyKind};
use crate::circuit::{CompiledProgram, Instruction};
use crate::error::{CalcError, CalcResult};

/// Logical/physical qubit permutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    physical: Vec<u32>,
    logical: Vec<u32>,
}

impl Layout {
    /// Logical `i` on physical `i`.
    pub fn trivial(num_qubits: u32) -> Self {
        let identity: Vec<u32> = (0..num_qubits).collect();
        Self {
            physical: identity.clone(),
            logical: identity,
        }
    }

    /// Physical position of logical qubit `q`.
    pub fn physical(&self, q: u32) -> CalcResult<u32> {
        self.physical.get(q as usize).copied().ok_or_else(|| {
            CalcError::RegisterSizeError(format!("logical qubit {q} has no physical position"))
        })
    }

    /// Exchange whatever sits on physical `a` and `b`.
    fn swap(&mut self, a: u32, b: u32) {
        let (la, lb) = (self.logical[a as usize], self.logical[b as usize]);
        self.logical.swap(a as usize, b as usize);
        self.physical[la as usize] = b;
        self.physical[lb as usize] = a;
    }
}

/// Route `program` so every multi-qubit gate is connected in `topology`.
///
/// A fully connected topology returns the program unchanged.
pub fn route(program: &CompiledProgram, topology: &Topology) -> CalcResult<CompiledProgram> {
    if topology.kind == TopologyKind::FullyConnected {
        return Ok(program.clone());
    }
    let n = program.num_qubits;
    let mut layout = Layout::trivial(n);
    let mut instructions = Vec::with_capacity(program.instructions.len());
    let mut swaps = 0_usize;

    for inst in &program.instructions {
        let routable = inst.name != "barrier";
        if let Some((&target, controls)) = inst.qubits.split_last().filter(|_| routable) {
            let placed = inst
                .qubits
                .iter()
                .map(|&q| layout.physical(q))
                .collect::<CalcResult<Vec<_>>>()?;
            if placed.len() > 1 && !topology.spans(&placed) {
                let mut cluster = vec![layout.physical(target)?];
                for &control in controls {
                    let from = layout.physical(control)?;
                    let path = find_path(topology, n, from, &cluster)?;
                    for step in path.windows(2) {
                        let (a, b) = (step[0], step[1]);
                        instructions.extend(swap(a, b));
                        layout.swap(a, b);
                        swaps += 1;
                    }
                    cluster.push(layout.physical(control)?);
                }
            }
        }
        instructions.push(Instruction {
            name: inst.name.clone(),
            qubits: inst
                .qubits
                .iter()
                .map(|&q| layout.physical(q))
                .collect::<CalcResult<Vec<_>>>()?,
            clbit: inst.clbit,
        });
    }

    debug!(swaps, backend = %program.backend_id, "routed program");
    Ok(CompiledProgram {
        instructions,
        ..program.clone()
    })
}

fn swap(a: u32, b: u32) -> [Instruction; 3] {
    let cx = |c: u32, t: u32| Instruction {
        name: "cx".into(),
        qubits: vec![c, t],
        clbit: None,
    };
    [cx(a, b), cx(b, a), cx(a, b)]
}

/// Shortest path from `from` to a qubit coupled to `cluster`, never passing
/// through `cluster` itself. A `from` already coupled yields `[from]`.
fn find_path(topology: &Topology, n: u32, from: u32, cluster: &[u32]) -> CalcResult<Vec<u32>> {
    let touches = |q: u32| cluster.iter().any(|&c| topology.is_connected(q, c));
    let mut previous: Vec<Option<u32>> = vec![None; n as usize];
    let mut seen = vec![false; n as usize];
    let mut queue = VecDeque::from([from]);
    if let Some(slot) = seen.get_mut(from as usize) {
        *slot = true;
    }

    while let Some(current) = queue.pop_front() {
        if touches(current) {
            let mut path = vec![current];
            let mut node = current;
            while let Some(prev) = previous[node as usize] {
                path.push(prev);
                node = prev;
            }
            path.reverse();
            return Ok(path);
        }
        for next in topology.neighbors(current) {
            if next >= n || seen[next as usize] || cluster.contains(&next) {
                continue;
            }
            seen[next as usize] = true;
            previous[next as usize] = Some(current);
            queue.push_back(next);
        }
    }

    Err(CalcError::CircuitError(format!(
        "cannot route q[{from}] next to {cluster:?} on the coupling map"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use crate::sim::BasisState;

    fn inst(name: &str, qubits: &[u32], clbit: Option<u32>) -> Instruction {
        Instruction {
            name: name.into(),
            qubits: qubits.to_vec(),
            clbit,
        }
    }

    fn program(num_qubits: u32, instructions: Vec<Instruction>) -> CompiledProgram {
        CompiledProgram {
            backend_id: "local_linear".into(),
            num_qubits,
            num_clbits: 2,
            shots: 1,
            seed: 1,
            instructions,
        }
    }

    fn run(program: &CompiledProgram) -> String {
        let mut rng = StdRng::seed_from_u64(0);
        let mut state = BasisState::new(program.num_qubits, program.num_clbits);
        for inst in &program.instructions {
            state.apply(inst, &mut rng).unwrap();
        }
        state.bitstring()
    }

    #[test]
    fn test_layout_swap() {
        let mut layout = Layout::trivial(3);
        layout.swap(0, 2);
        assert_eq!(layout.physical(0).unwrap(), 2);
        assert_eq!(layout.physical(2).unwrap(), 0);
        assert_eq!(layout.physical(1).unwrap(), 1);
        assert!(layout.physical(3).is_err());
    }

    #[test]
    fn test_full_topology_is_untouched() {
        let p = program(4, vec![inst("cx", &[0, 3], None)]);
        assert_eq!(route(&p, &Topology::full(4)).unwrap(), p);
    }

    #[test]
    fn test_routes_distant_cx() {
        let topo = Topology::linear(4);
        let p = program(
            4,
            vec![
                inst("x", &[0], None),
                inst("cx", &[0, 3], None),
                inst("measure", &[3], Some(0)),
                inst("measure", &[0], Some(1)),
            ],
        );
        let routed = route(&p, &topo).unwrap();
        assert!(routed.instructions.len() > p.instructions.len());
        assert!(
            routed
                .instructions
                .iter()
                .all(|i| i.qubits.len() < 2 || topo.spans(&i.qubits))
        );
        assert_eq!(run(&routed), run(&p));
        assert_eq!(run(&routed), "11");
    }

    #[test]
    fn test_routes_toffoli_on_line() {
        let topo = Topology::linear(6);
        let p = program(
            6,
            vec![
                inst("x", &[0], None),
                inst("x", &[5], None),
                inst("ccx", &[0, 5, 2], None),
                inst("measure", &[2], Some(0)),
                inst("measure", &[5], Some(1)),
            ],
        );
        let routed = route(&p, &topo).unwrap();
        assert_eq!(run(&routed), "11");
    }

    #[test]
    fn test_disconnected_topology_fails() {
        let topo = Topology::custom(vec![(0, 1), (2, 3)]);
        let p = program(4, vec![inst("cx", &[0, 3], None)]);
        let err = route(&p, &topo).unwrap_err();
        assert!(matches!(err, CalcError::CircuitError(_)));
    }
}
