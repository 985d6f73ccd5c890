use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context};
use serde::Deserialize;
use tracing::{debug, info};

use crate::common::{Agent, OrderInstance, PickItem};
use crate::graph::{Graph, StorageSlot};

#[derive(Debug, Deserialize)]
pub struct StorageYaml {
    pub item: usize,
    pub at: [usize; 2],
    pub side: usize,
    pub height: usize,
    pub pick_time: usize,
}

#[derive(Debug, Deserialize)]
pub struct OrderYaml {
    pub start: [usize; 2],
    pub target: [usize; 2],
    /// Item ids, one class per entry.
    #[serde(default)]
    pub items: Vec<usize>,
}

#[derive(Debug, Deserialize)]
pub struct AgentYaml {
    pub orders: Vec<OrderYaml>,
}

#[derive(Debug, Deserialize)]
pub struct InstanceYaml {
    /// Grid map path, relative to the instance file.
    pub map: String,
    #[serde(default)]
    pub staging: Vec<[usize; 2]>,
    #[serde(default)]
    pub storage: Vec<StorageYaml>,
    pub agents: Vec<AgentYaml>,
}

/// A warehouse graph with its pickers, caches initialized.
#[derive(Debug, Clone)]
pub struct Instance {
    pub graph: Graph,
    pub agents: Vec<Agent>,
}

impl Instance {
    pub fn load_from_file(path: &str) -> anyhow::Result<Self> {
        let content =
            fs::read_to_string(path).with_context(|| format!("cannot read instance file {path}"))?;
        let base = Path::new(path).parent().unwrap_or_else(|| Path::new(""));
        let yaml: InstanceYaml = serde_yaml::from_str(&content)
            .with_context(|| format!("malformed instance file {path}"))?;
        let map_path = base.join(&yaml.map);
        let map_path = map_path
            .to_str()
            .ok_or_else(|| anyhow!("map path {map_path:?} is not valid UTF-8"))?;
        let graph = Graph::from_file(map_path)?;
        Self::build(graph, &yaml).with_context(|| format!("invalid instance {path}"))
    }

    /// Applies staging areas and storage slots to `graph`, resolves the
    /// agents' orders and initializes the graph caches.
    pub fn build(mut graph: Graph, yaml: &InstanceYaml) -> anyhow::Result<Self> {
        let vertex = |graph: &Graph, [x, y]: [usize; 2]| {
            graph
                .vertex_at((x, y))
                .ok_or_else(|| anyhow!("({x}, {y}) is not a free cell"))
        };

        for &coord in &yaml.staging {
            let v = vertex(&graph, coord)?;
            graph.set_staging(v);
        }

        let mut shelves: Vec<(usize, usize, &StorageYaml)> = Vec::with_capacity(yaml.storage.len());
        for entry in &yaml.storage {
            let v = vertex(&graph, entry.at)?;
            graph.add_storage_slot(
                v,
                StorageSlot {
                    item: entry.item,
                    side: entry.side,
                    height: entry.height,
                    pick_time: entry.pick_time,
                },
            );
            shelves.push((entry.item, v, entry));
        }

        let mut order_id = 0;
        let mut agents = Vec::with_capacity(yaml.agents.len());
        for (agent_id, agent) in yaml.agents.iter().enumerate() {
            let mut orders = Vec::with_capacity(agent.orders.len());
            for order in &agent.orders {
                let mut items = Vec::new();
                for (class, &item) in order.items.iter().enumerate() {
                    let before = items.len();
                    for &(_, v, entry) in shelves.iter().filter(|(id, _, _)| *id == item) {
                        let pick_time = graph
                            .get_pick_time(v, entry.side, entry.height)
                            .ok_or_else(|| anyhow!("no slot for item {item} at vertex {v}"))?;
                        items.push(PickItem {
                            vertex: v,
                            class,
                            pick_time,
                        });
                    }
                    if items.len() == before {
                        return Err(anyhow!("item {item} is not stored anywhere"));
                    }
                }
                orders.push(OrderInstance::new(
                    order_id,
                    vertex(&graph, order.start)?,
                    vertex(&graph, order.target)?,
                    items,
                )?);
                order_id += 1;
            }
            agents.push(Agent::new(agent_id, orders)?);
        }

        graph.initialize(&agents);
        info!(
            "instance: {} vertices, {} agents, {} orders",
            graph.len(),
            agents.len(),
            order_id
        );
        debug!("agents: {agents:?}");
        Ok(Instance { graph, agents })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_warehouse_instance() {
        let instance = Instance::load_from_file("map_file/test/warehouse.yaml").unwrap();
        assert!(instance.graph.is_initialized());
        assert_eq!(instance.agents.len(), 2);

        let depot = instance.graph.vertex_at((0, 0)).unwrap();
        assert!(instance.graph.is_staging(depot));

        let first = &instance.agents[0];
        assert_eq!(first.orders.len(), 2);
        assert_eq!(first.orders[0].start, depot);
        assert_eq!(first.orders[0].classes(), 2);
        // Item 1 is stored on two shelves.
        assert_eq!(
            first.orders[0]
                .items
                .iter()
                .filter(|item| item.class == 0)
                .count(),
            2
        );
        assert_eq!(first.orders[1].start, first.orders[0].target);
    }

    #[test]
    fn test_rejects_unknown_item_and_blocked_cell() {
        let graph = Graph::from_grid_str("type octile\nheight 1\nwidth 3\nmap\n.@.\n").unwrap();
        let missing: InstanceYaml = serde_yaml::from_str(
            "map: unused\nagents:\n  - orders:\n      - { start: [0, 0], target: [0, 2], items: [7] }\n",
        )
        .unwrap();
        assert!(Instance::build(graph.clone(), &missing).is_err());

        let blocked: InstanceYaml = serde_yaml::from_str(
            "map: unused\nagents:\n  - orders:\n      - { start: [0, 1], target: [0, 2] }\n",
        )
        .unwrap();
        assert!(Instance::build(graph, &blocked).is_err());
    }
}
