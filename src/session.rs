//! The public `Session` API: a builder for nodes, buffers, and buses plus
//! the top-level `to_bundles`/`to_datagram` compile entry points
//! (`spec.md` §3, §4.5, §6).

use crate::alloc::IdMapper;
use crate::buffer::{Buffer, BufferEventPayload, BufferId};
use crate::bus::{Bus, BusGroup, BusId, CalculationRate, CalculationRateTag, BusRef};
use crate::error::{CompileError, CompileResult};
use crate::node::{AddAction, ControlValue, Node, NodeId, NodeKind};
use crate::offset::Offset;
use crate::planner;
use crate::propagation::{self, DoNotPropagate};
use crate::request::Request;
use crate::settings::BufferOpenTracker;
use crate::state::Transition;
use crate::synthdef::SynthDef;
use crate::timeline::TimelineStore;
use std::collections::{HashMap, HashSet};

/// A timestamped batch of wire requests emitted at a single offset.
#[derive(Debug, Clone)]
pub struct Bundle {
    pub offset: Offset,
    pub requests: Vec<Request>,
}

impl Bundle {
    /// Encodes this bundle as an OSC `#bundle` packet. The terminator
    /// request has no valid OSC address (`spec.md` §6 gives it the
    /// literal address `0`), so it is appended as a raw zero-length
    /// entry after every real message rather than routed through `rosc`.
    pub fn to_osc_bytes(&self) -> CompileResult<Vec<u8>> {
        let timetag = offset_to_osc_time(self.offset);
        let mut content = Vec::new();
        let mut has_terminator = false;
        for request in &self.requests {
            if matches!(request, Request::Terminator) {
                has_terminator = true;
                continue;
            }
            content.push(rosc::OscPacket::Message(request.to_message(true)));
        }
        let bundle = rosc::OscBundle { timetag, content };
        let mut bytes = rosc::encoder::encode(&rosc::OscPacket::Bundle(bundle))
            .map_err(|e| CompileError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())))?;
        if has_terminator {
            bytes.extend_from_slice(&0u32.to_be_bytes());
        }
        Ok(bytes)
    }
}

fn offset_to_osc_time(offset: Offset) -> rosc::OscTime {
    let seconds = offset.seconds().max(0.0);
    let whole = seconds.trunc() as u32;
    let fraction = (seconds.fract() * u32::MAX as f64) as u32;
    rosc::OscTime::from((whole, fraction))
}

pub struct Session {
    root: NodeId,
    timeline: TimelineStore,
    nodes: HashMap<NodeId, Node>,
    buffers: HashMap<u32, Buffer>,
    buses: HashMap<u32, Bus>,
    bus_groups: Vec<BusGroup>,
    synthdefs: HashMap<String, Box<dyn SynthDef>>,
    next_node_id: u32,
    next_buffer_id: u32,
    next_bus_id: u32,
    guard: DoNotPropagate,
    output_channel_count: u32,
    input_channel_count: u32,
}

impl Session {
    pub fn new(output_channel_count: u32, input_channel_count: u32) -> Self {
        let root = NodeId(0);
        let mut nodes = HashMap::new();
        nodes.insert(root, Node::root(root, Offset::NEGATIVE_INFINITY));
        Session {
            root,
            timeline: TimelineStore::new(root),
            nodes,
            buffers: HashMap::new(),
            buses: HashMap::new(),
            bus_groups: Vec::new(),
            synthdefs: HashMap::new(),
            next_node_id: 1000,
            next_buffer_id: 0,
            next_bus_id: 0,
            guard: DoNotPropagate::new(),
            output_channel_count,
            input_channel_count,
        }
    }

    pub fn register_synthdef(&mut self, def: impl SynthDef + 'static) -> String {
        let name = def.anonymous_name().to_string();
        self.synthdefs.insert(name.clone(), Box::new(def));
        name
    }

    fn allocate_node(&mut self) -> NodeId {
        let id = NodeId(self.next_node_id);
        self.next_node_id += 1;
        id
    }

    fn register_transition(&mut self, offset: Offset, node: NodeId, transition: Transition) -> CompileResult<()> {
        self.timeline.find_at(offset, true);
        self.timeline.get_mut(offset).unwrap().transitions.insert(node, transition);
        propagation::apply_transitions(&mut self.timeline, [offset], &self.guard)
    }

    pub fn add_group(&mut self, offset: f64, action: AddAction) -> CompileResult<NodeId> {
        let offset = Offset::new(offset);
        let id = self.allocate_node();
        self.nodes.insert(id, Node::root(id, offset));
        if let Some(node) = self.nodes.get_mut(&id) {
            node.kind = NodeKind::Group;
        }
        self.register_transition(offset, id, Transition::Add(action))?;
        Ok(id)
    }

    pub fn add_synth(
        &mut self,
        offset: f64,
        action: AddAction,
        synthdef_name: &str,
        duration: Option<f64>,
        parameters: Vec<(String, ControlValue)>,
    ) -> CompileResult<NodeId> {
        let offset = Offset::new(offset);
        let id = self.allocate_node();
        let mut node = Node {
            id,
            kind: NodeKind::Synth,
            synthdef_name: Some(synthdef_name.to_string()),
            start_offset: offset,
            duration,
            parameter_events: Default::default(),
        };
        for (name, value) in parameters {
            node.parameter_events.entry(name).or_default().push((offset, value));
        }
        self.nodes.insert(id, node);
        self.register_transition(offset, id, Transition::Add(action))?;
        Ok(id)
    }

    pub fn move_node(&mut self, node: NodeId, offset: f64, action: AddAction) -> CompileResult<()> {
        self.register_transition(Offset::new(offset), node, Transition::Add(action))
    }

    pub fn set_control(&mut self, node: NodeId, offset: f64, name: &str, value: ControlValue) -> CompileResult<()> {
        let offset = Offset::new(offset);
        let node = self.nodes.get_mut(&node).ok_or(CompileError::UnknownNode(node))?;
        node.parameter_events.entry(name.to_string()).or_default().push((offset, value));
        Ok(())
    }

    pub fn add_bus(&mut self, calculation_rate: CalculationRate) -> BusId {
        let id = self.next_bus_id;
        self.next_bus_id += 1;
        self.buses.insert(id, Bus::new(id, calculation_rate));
        BusId(id)
    }

    pub fn add_bus_group(&mut self, calculation_rate: CalculationRate, count: u32) -> Vec<BusId> {
        let lead = self.next_bus_id;
        let mut ids = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let id = self.next_bus_id;
            self.next_bus_id += 1;
            let mut bus = Bus::new(id, calculation_rate);
            bus.bus_group_lead = Some(lead);
            self.buses.insert(id, bus);
            ids.push(BusId(id));
        }
        self.bus_groups.push(BusGroup {
            lead_session_id: lead,
            calculation_rate,
            bus_session_ids: ids.iter().map(|b| b.0).collect(),
        });
        ids
    }

    pub fn write_bus(&mut self, bus: BusId, offset: f64, value: f32) -> CompileResult<()> {
        let entry = self.buses.get_mut(&bus.0).ok_or_else(|| CompileError::UnknownEntity(format!("{bus:?}")))?;
        entry.write(Offset::new(offset), value);
        Ok(())
    }

    pub fn bus_ref(&self, bus: BusId) -> Option<BusRef> {
        let entry = self.buses.get(&bus.0)?;
        Some(BusRef { id: bus, calculation_rate: CalculationRateTag::from(entry.calculation_rate) })
    }

    pub fn add_buffer(
        &mut self,
        offset: f64,
        channel_count: u32,
        frame_count: u32,
        duration: Option<f64>,
        cue: Option<(String, i32, bool)>,
    ) -> BufferId {
        let offset = Offset::new(offset);
        let id = self.next_buffer_id;
        self.next_buffer_id += 1;
        let mut buffer = Buffer {
            session_id: id,
            channel_count,
            frame_count,
            file_path: None,
            starting_frame: 0,
            start_offset: offset,
            duration,
            buffer_group_lead: None,
            events: Vec::new(),
        };
        if let Some((path, starting_frame, leave_open)) = cue {
            buffer.file_path = Some(path.clone());
            buffer.starting_frame = starting_frame;
            buffer.push_event(
                offset,
                BufferEventPayload::Read { path, starting_frame, frame_count: frame_count as i32, leave_open },
            );
        }
        self.buffers.insert(id, buffer);
        BufferId(id)
    }

    pub fn add_buffer_group(
        &mut self,
        offset: f64,
        count: u32,
        channel_count: u32,
        frame_count: u32,
        duration: Option<f64>,
    ) -> Vec<BufferId> {
        let lead = self.next_buffer_id;
        let mut ids = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let id = self.add_buffer(offset, channel_count, frame_count, duration, None);
            self.buffers.get_mut(&id.0).unwrap().buffer_group_lead = Some(lead);
            ids.push(id);
        }
        ids
    }

    pub fn read_buffer(
        &mut self,
        buffer: BufferId,
        offset: f64,
        path: String,
        starting_frame: i32,
        frame_count: i32,
        leave_open: bool,
    ) -> CompileResult<()> {
        let entry = self.buffers.get_mut(&buffer.0).ok_or_else(|| CompileError::UnknownEntity(format!("{buffer:?}")))?;
        let offset = Offset::new(offset);
        if !entry.is_live_at(offset) {
            return Err(CompileError::BufferNotLive { offset, buffer });
        }
        entry.push_event(offset, BufferEventPayload::Read { path, starting_frame, frame_count, leave_open });
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn write_buffer(
        &mut self,
        buffer: BufferId,
        offset: f64,
        path: String,
        header_format: String,
        sample_format: String,
        frame_count: i32,
        starting_frame: i32,
        leave_open: bool,
    ) -> CompileResult<()> {
        let entry = self.buffers.get_mut(&buffer.0).ok_or_else(|| CompileError::UnknownEntity(format!("{buffer:?}")))?;
        let offset = Offset::new(offset);
        if !entry.is_live_at(offset) {
            return Err(CompileError::BufferNotLive { offset, buffer });
        }
        entry.push_event(
            offset,
            BufferEventPayload::Write { path, header_format, sample_format, frame_count, starting_frame, leave_open },
        );
        Ok(())
    }

    /// Sets a buffer's explicit stop offset, deriving its `duration` from
    /// the gap to its `start_offset`.
    pub fn free_buffer(&mut self, buffer: BufferId, offset: f64) -> CompileResult<()> {
        let entry = self.buffers.get_mut(&buffer.0).ok_or_else(|| CompileError::UnknownEntity(format!("{buffer:?}")))?;
        entry.duration = Some(offset - entry.start_offset.seconds());
        Ok(())
    }

    /// The session's intrinsic duration: the latest finite stop offset
    /// across every node and buffer, or `None` if any entity is
    /// unbounded (`spec.md` §4.6).
    pub fn intrinsic_duration(&self) -> Option<f64> {
        let mut latest = 0.0_f64;
        for node in self.nodes.values() {
            if node.id == self.root {
                continue;
            }
            match node.stop_offset() {
                Some(stop) => latest = latest.max(stop.seconds()),
                None => return None,
            }
        }
        for buffer in self.buffers.values() {
            match buffer.stop_offset() {
                Some(stop) => latest = latest.max(stop.seconds()),
                None => return None,
            }
        }
        Some(latest)
    }

    /// Compiles the session into an ordered bundle stream (`spec.md` §4.5).
    #[tracing::instrument(skip(self), fields(nodes = self.nodes.len(), buffers = self.buffers.len(), buses = self.buses.len()))]
    pub fn to_bundles(&mut self, duration: Option<f64>) -> CompileResult<Vec<Bundle>> {
        let duration = duration.or_else(|| self.intrinsic_duration()).ok_or(CompileError::UnboundedSession)?;
        if !duration.is_finite() || duration <= 0.0 {
            return Err(CompileError::InvalidDuration(duration));
        }
        let session_duration = Offset::new(duration);

        self.finalize_node_lifetimes(session_duration)?;

        let mut id_mapper = IdMapper::build_for_nodes(self.root, self.nodes.keys().copied());
        id_mapper.assign_buffers(&self.buffers.values().cloned().collect::<Vec<_>>());
        id_mapper.assign_buses(self.output_channel_count, self.input_channel_count, &self.buses.values().cloned().collect::<Vec<_>>(), &self.bus_groups)?;

        let mut offsets: Vec<Offset> = self.timeline.offsets().iter().copied().filter(|o| o.is_finite()).collect();
        for node in self.nodes.values() {
            for events in node.parameter_events.values() {
                offsets.extend(events.iter().map(|(offset, _)| *offset));
            }
        }
        for bus in self.buses.values() {
            offsets.extend(bus.events.iter().map(|(offset, _)| *offset));
        }
        for buffer in self.buffers.values() {
            offsets.push(buffer.start_offset);
            offsets.extend(buffer.events.iter().map(|(offset, _)| *offset));
            if let Some(stop) = buffer.stop_offset() {
                offsets.push(stop);
            }
        }
        offsets.push(session_duration);
        offsets.retain(|o| o.seconds() <= duration);
        offsets.sort();
        offsets.dedup();

        let mut received_synthdefs = HashSet::new();
        let mut open_tracker = BufferOpenTracker::default();
        let mut bundles = Vec::with_capacity(offsets.len());

        for (index, &offset) in offsets.iter().enumerate() {
            let is_last = index == offsets.len() - 1;
            let empty_transitions;
            let transitions = match self.timeline.get(offset) {
                Some(state) => &state.transitions,
                None => {
                    empty_transitions = crate::state::TransitionMap::new();
                    &empty_transitions
                }
            };
            let tree = match self.timeline.get(offset).and_then(|s| s.tree.resolved()) {
                Some(tree) => tree.clone(),
                None => self
                    .timeline
                    .find_before(offset, true)
                    .and_then(|s| s.tree.resolved())
                    .cloned()
                    .unwrap_or_else(|| crate::state::ResolvedTree::root(self.root)),
            };

            let mut requests = planner::collect_requests_at_offset(
                offset,
                is_last,
                duration,
                transitions,
                &tree,
                self.root,
                &self.nodes,
                &self.buffers,
                &self.buses,
                &self.synthdefs,
                &mut received_synthdefs,
                &id_mapper,
                &mut open_tracker,
            );
            if is_last {
                requests.push(Request::Terminator);
            }
            bundles.push(Bundle { offset, requests });
        }

        tracing::debug!(bundle_count = bundles.len(), duration, "compiled bundle stream");
        Ok(bundles)
    }

    /// Registers every node's and buffer's natural expiry as a
    /// `stop_nodes` entry at its stop offset, then reruns propagation so
    /// the resolved trees reflect it (`spec.md` §4.5.2).
    fn finalize_node_lifetimes(&mut self, session_duration: Offset) -> CompileResult<()> {
        let mut touched = Vec::new();
        let stops: Vec<(NodeId, Offset)> = self
            .nodes
            .values()
            .filter(|n| n.id != self.root)
            .filter_map(|n| n.stop_offset().map(|stop| (n.id, stop)))
            .filter(|(_, stop)| stop.seconds() <= session_duration.seconds())
            .collect();

        for (node, stop) in stops {
            self.timeline.find_at(stop, true);
            self.timeline.get_mut(stop).unwrap().stop_nodes.insert(node);
            touched.push(stop);
        }

        if !touched.is_empty() {
            touched.sort();
            touched.dedup();
            propagation::apply_transitions(&mut self.timeline, touched, &self.guard)?;
        }
        Ok(())
    }

    /// Concatenates `(size: u32 BE) ++ bundle_bytes` for every compiled
    /// bundle, in timestamp order (`spec.md` §6's bundle-file layout).
    #[tracing::instrument(skip(self))]
    pub fn to_datagram(&mut self, duration: Option<f64>) -> CompileResult<Vec<u8>> {
        let bundles = self.to_bundles(duration)?;
        let mut out = Vec::new();
        for bundle in &bundles {
            let bytes = bundle.to_osc_bytes()?;
            out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
            out.extend_from_slice(&bytes);
        }
        Ok(out)
    }
}
