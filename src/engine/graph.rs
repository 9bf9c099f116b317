use {
    crate::ProvisionError,
    log::trace,
    std::collections::{BTreeSet, HashMap},
};

/// A dependency graph over resource addresses.
///
/// Ordering is deterministic: among nodes whose dependencies are satisfied, the one declared first goes first.
#[derive(Clone, Debug)]
pub struct TaskGraph {
    nodes: Vec<String>,
    dependencies: Vec<Vec<usize>>,
}

impl TaskGraph {
    /// Build a graph from `(address, dependencies)` pairs. Every dependency must itself be a node.
    pub fn new<I, D>(nodes: I) -> Result<Self, ProvisionError>
    where
        I: IntoIterator<Item = (String, D)>,
        D: IntoIterator<Item = String>,
    {
        let mut names = Vec::new();
        let mut raw_deps = Vec::new();
        let mut index = HashMap::new();

        for (address, deps) in nodes {
            if index.insert(address.clone(), names.len()).is_some() {
                return Err(ProvisionError::DuplicateAddress(address));
            }
            names.push(address);
            raw_deps.push(deps.into_iter().collect::<Vec<_>>());
        }

        let mut dependencies = Vec::with_capacity(names.len());
        for (i, deps) in raw_deps.into_iter().enumerate() {
            let mut resolved = Vec::with_capacity(deps.len());
            for dep in deps {
                match index.get(&dep) {
                    Some(&j) => resolved.push(j),
                    None => return Err(ProvisionError::UnknownDependency(names[i].clone(), dep)),
                }
            }
            dependencies.push(resolved);
        }

        Ok(Self {
            nodes: names,
            dependencies,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Addresses ordered so every node comes after the nodes it depends on.
    pub fn order(&self) -> Result<Vec<String>, ProvisionError> {
        let n = self.nodes.len();
        let mut remaining_deps: Vec<usize> = self.dependencies.iter().map(Vec::len).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (i, deps) in self.dependencies.iter().enumerate() {
            for &d in deps {
                dependents[d].push(i);
            }
        }

        let mut ready: BTreeSet<usize> = (0..n).filter(|&i| remaining_deps[i] == 0).collect();
        let mut result = Vec::with_capacity(n);
        let mut done = vec![false; n];

        while let Some(i) = ready.iter().next().copied() {
            ready.remove(&i);
            done[i] = true;
            result.push(self.nodes[i].clone());
            for &dependent in &dependents[i] {
                remaining_deps[dependent] -= 1;
                if remaining_deps[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        if result.len() != n {
            return Err(ProvisionError::DependencyCycle(self.find_cycle(&done)));
        }

        trace!("order: {:?}", result);
        Ok(result)
    }

    /// Addresses ordered so every node comes before the nodes it depends on; the order resources are torn down in.
    pub fn reverse_order(&self) -> Result<Vec<String>, ProvisionError> {
        let mut order = self.order()?;
        order.reverse();
        Ok(order)
    }

    // Every unfinished node still has an unfinished dependency, so following those must eventually revisit a node.
    fn find_cycle(&self, done: &[bool]) -> Vec<String> {
        let start = match done.iter().position(|d| !d) {
            Some(start) => start,
            None => return Vec::new(),
        };

        let mut path = vec![start];
        let mut current = start;
        loop {
            let next = match self.dependencies[current].iter().copied().find(|&d| !done[d]) {
                Some(next) => next,
                None => return path.iter().map(|&i| self.nodes[i].clone()).collect(),
            };

            if let Some(pos) = path.iter().position(|&p| p == next) {
                let mut cycle: Vec<String> = path[pos..].iter().map(|&i| self.nodes[i].clone()).collect();
                cycle.push(self.nodes[next].clone());
                return cycle;
            }

            path.push(next);
            current = next;
        }
    }
}
