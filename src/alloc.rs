//! Resource identity allocation: stable IDs for nodes, buses, and buffers
//! from disjoint allocator domains (`spec.md` §4.3).

use crate::bus::{Bus, BusGroup, CalculationRate};
use crate::buffer::Buffer;
use crate::error::{CompileError, CompileResult};
use crate::node::NodeId;
use std::collections::HashMap;

/// A first-fit free-list over integer ranges. Only allocation is used
/// during compilation (no runtime frees happen mid-compile).
pub struct BlockAllocator {
    heap_minimum: u32,
    /// Sorted `(start, length)` free ranges, disjoint and non-adjacent.
    free_ranges: Vec<(u32, u32)>,
}

impl BlockAllocator {
    pub fn new(heap_minimum: u32) -> Self {
        BlockAllocator {
            heap_minimum,
            free_ranges: vec![(heap_minimum, u32::MAX - heap_minimum)],
        }
    }

    pub fn allocate(&mut self, count: u32) -> CompileResult<u32> {
        let index = self
            .free_ranges
            .iter()
            .position(|&(_, len)| len >= count)
            .ok_or_else(|| {
                tracing::warn!(requested = count, "block allocator exhausted");
                CompileError::AllocatorExhausted {
                    requested: count as usize,
                }
            })?;
        let (start, len) = self.free_ranges[index];
        if len == count {
            self.free_ranges.remove(index);
        } else {
            self.free_ranges[index] = (start + count, len - count);
        }
        Ok(start)
    }

    pub fn free(&mut self, start: u32, count: u32) {
        self.free_ranges.push((start, count));
        self.free_ranges.sort_by_key(|&(s, _)| s);
        let mut merged: Vec<(u32, u32)> = Vec::new();
        for (s, l) in self.free_ranges.drain(..) {
            if let Some(last) = merged.last_mut() {
                if last.0 + last.1 == s {
                    last.1 += l;
                    continue;
                }
            }
            merged.push((s, l));
        }
        self.free_ranges = merged;
    }

    pub fn heap_minimum(&self) -> u32 {
        self.heap_minimum
    }
}

/// The compile-time assignment of numeric IDs to every entity the wire
/// protocol will reference.
#[derive(Default)]
pub struct IdMapper {
    pub node_ids: HashMap<NodeId, u32>,
    pub bus_ids: HashMap<u32, u32>,
    pub buffer_ids: HashMap<u32, u32>,
}

impl IdMapper {
    /// Root maps to `0`; every other node uses its own `session_id`,
    /// assigned monotonically from 1000 at node-creation time (the stable
    /// semantics `spec.md` §9 resolves its open question to).
    pub fn build_for_nodes(root: NodeId, nodes: impl IntoIterator<Item = NodeId>) -> Self {
        let mut node_ids = HashMap::new();
        node_ids.insert(root, 0);
        for node in nodes {
            if node != root {
                node_ids.insert(node, node.0);
            }
        }
        IdMapper {
            node_ids,
            ..Default::default()
        }
    }

    /// Grouped and ungrouped buffers alike use their own `session_id` as
    /// the wire id — `add_buffer_group` already assigns each member a
    /// distinct, contiguous `session_id` starting at the lead, so the
    /// mapper only needs to pass it through.
    pub fn assign_buffers(&mut self, buffers: &[Buffer]) {
        for buffer in buffers {
            self.buffer_ids.insert(buffer.session_id, buffer.session_id);
        }
    }

    /// Output buses get `0..O`, input buses `O..O+I`; everything else
    /// comes from two independent block allocators (audio heap starts at
    /// `O+I` so private buses never collide with hardware channels;
    /// control heap starts at `0`). BusGroups reserve a contiguous block.
    pub fn assign_buses(
        &mut self,
        output_channel_count: u32,
        input_channel_count: u32,
        buses: &[Bus],
        bus_groups: &[BusGroup],
    ) -> CompileResult<()> {
        let mut audio_alloc = BlockAllocator::new(output_channel_count + input_channel_count);
        let mut control_alloc = BlockAllocator::new(0);

        // Output bus indices 0..O and input bus indices O..O+I are fixed
        // hardware channels, not entries allocated from a heap; they are
        // addressed directly by index and never appear in `buses`.
        //
        // `buses`/`bus_groups` come from a HashMap, so their incoming order
        // is unspecified; the block allocator is first-fit and thus
        // order-sensitive, so both are sorted by creation order first to
        // keep ID assignment deterministic across compiles.
        let mut bus_groups: Vec<&BusGroup> = bus_groups.iter().collect();
        bus_groups.sort_by_key(|g| g.lead_session_id);
        let mut buses: Vec<&Bus> = buses.iter().collect();
        buses.sort_by_key(|b| b.session_id);

        let mut grouped_leads: HashMap<u32, u32> = HashMap::new();
        for group in bus_groups {
            let allocator = match group.calculation_rate {
                CalculationRate::Audio => &mut audio_alloc,
                CalculationRate::Control => &mut control_alloc,
            };
            let block_start = allocator.allocate(group.bus_session_ids.len() as u32)?;
            for (offset, &session_id) in group.bus_session_ids.iter().enumerate() {
                self.bus_ids.insert(session_id, block_start + offset as u32);
            }
            grouped_leads.insert(group.lead_session_id, block_start);
        }

        for bus in buses {
            if self.bus_ids.contains_key(&bus.session_id) {
                continue;
            }
            if let Some(lead) = bus.bus_group_lead {
                if let Some(&block_start) = grouped_leads.get(&lead) {
                    let offset_in_group = bus.session_id.wrapping_sub(lead);
                    self.bus_ids
                        .insert(bus.session_id, block_start + offset_in_group);
                    continue;
                }
            }
            let allocator = match bus.calculation_rate {
                CalculationRate::Audio => &mut audio_alloc,
                CalculationRate::Control => &mut control_alloc,
            };
            let id = allocator.allocate(1)?;
            self.bus_ids.insert(bus.session_id, id);
        }
        Ok(())
    }

    pub fn node_id(&self, node: NodeId) -> Option<u32> {
        self.node_ids.get(&node).copied()
    }

    pub fn bus_id(&self, session_id: u32) -> Option<u32> {
        self.bus_ids.get(&session_id).copied()
    }

    pub fn buffer_id(&self, session_id: u32) -> Option<u32> {
        self.buffer_ids.get(&session_id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocator_first_fit_and_merge() {
        let mut alloc = BlockAllocator::new(10);
        let a = alloc.allocate(4).unwrap();
        let b = alloc.allocate(4).unwrap();
        assert_eq!(a, 10);
        assert_eq!(b, 14);
        alloc.free(a, 4);
        let c = alloc.allocate(4).unwrap();
        assert_eq!(c, 10);
    }

    #[test]
    fn node_ids_come_from_session_id() {
        let root = NodeId(0);
        let mapper = IdMapper::build_for_nodes(root, vec![NodeId(1000), NodeId(1001)]);
        assert_eq!(mapper.node_id(root), Some(0));
        assert_eq!(mapper.node_id(NodeId(1000)), Some(1000));
        assert_eq!(mapper.node_id(NodeId(1001)), Some(1001));
    }

    #[test]
    fn private_buses_allocate_above_hardware_channels() {
        let mut mapper = IdMapper::default();
        let buses = vec![Bus::new(5, CalculationRate::Control), Bus::new(6, CalculationRate::Audio)];
        mapper.assign_buses(2, 1, &buses, &[]).unwrap();
        assert_eq!(mapper.bus_id(5), Some(0)); // control heap starts at 0
        assert_eq!(mapper.bus_id(6), Some(3)); // audio heap starts at output+input = 3
    }
}
