//! The request planner (C5): turns one offset's structural transitions
//! and decoded settings into an ordered batch of wire requests
//! (`spec.md` §4.5.1).

use crate::alloc::IdMapper;
use crate::buffer::Buffer;
use crate::bus::Bus;
use crate::node::{AddAction, ControlValue, Node, NodeId};
use crate::offset::Offset;
use crate::request::Request;
use crate::settings::{self, BufferOpenTracker};
use crate::state::{ResolvedTree, Transition, TransitionMap};
use crate::synthdef::SynthDef;
use std::collections::{BTreeMap, HashMap, HashSet};

fn add_action_code(action: AddAction) -> i32 {
    match action {
        AddAction::AddToHead(_) => 0,
        AddAction::AddToTail(_) => 1,
        AddAction::AddBefore(_) => 2,
        AddAction::AddAfter(_) => 3,
        AddAction::ReplaceNode(_) => 4,
    }
}

fn resolved(id_mapper: &IdMapper, node: NodeId) -> u32 {
    id_mapper.node_id(node).unwrap_or(node.0)
}

/// Step 1: synthdef-receive requests for synthdefs first referenced by
/// nodes starting at `offset`, sorted by anonymous name, deduplicated
/// against `received` (mutated in place).
pub fn synthdef_receive_requests(
    nodes: &HashMap<NodeId, Node>,
    offset: Offset,
    synthdefs: &HashMap<String, Box<dyn SynthDef>>,
    received: &mut HashSet<String>,
) -> Vec<Request> {
    let mut names: Vec<&String> = nodes
        .values()
        .filter(|n| n.start_offset == offset)
        .filter_map(|n| n.synthdef_name.as_ref())
        .filter(|name| !received.contains(*name))
        .collect();
    names.sort();
    names.dedup();
    let mut out = Vec::new();
    for name in names {
        if let Some(def) = synthdefs.get(name) {
            out.push(Request::SynthDefReceive { bytecode: def.compile() });
            received.insert(name.clone());
        }
    }
    out
}

/// Step 2: buffer allocate requests for buffers starting at `offset`.
pub fn buffer_allocate_requests(buffers: &HashMap<u32, Buffer>, offset: Offset, id_mapper: &IdMapper) -> Vec<Request> {
    let mut starting: Vec<&Buffer> = buffers.values().filter(|b| b.start_offset == offset).collect();
    starting.sort_by_key(|b| b.session_id);
    starting
        .into_iter()
        .map(|buffer| {
            let id = id_mapper.buffer_id(buffer.session_id).unwrap_or(buffer.session_id);
            match &buffer.file_path {
                Some(path) => Request::BufferAllocateRead {
                    id,
                    path: path.clone(),
                    starting_frame: buffer.starting_frame,
                    frame_count: buffer.frame_count as i32,
                },
                None => Request::BufferAllocate {
                    id,
                    frame_count: buffer.frame_count as i32,
                    channel_count: buffer.channel_count as i32,
                },
            }
        })
        .collect()
}

/// Step 4: node creation / reordering requests for every transition
/// registered at `offset`, in insertion order.
pub fn node_structural_requests(
    transitions: &TransitionMap,
    nodes: &HashMap<NodeId, Node>,
    offset: Offset,
    id_mapper: &IdMapper,
) -> Vec<Request> {
    let mut out = Vec::new();
    for (node_id, transition) in transitions.iter() {
        let Transition::Add(action) = transition else { continue };
        let Some(node) = nodes.get(&node_id) else { continue };
        let id = resolved(id_mapper, node_id);
        let target = resolved(id_mapper, action.anchor());

        if node.start_offset == offset {
            match node.kind {
                crate::node::NodeKind::Group => {
                    out.push(Request::GroupNew { id, add_action: add_action_code(action), target });
                }
                crate::node::NodeKind::Synth => {
                    let controls: Vec<(String, f32)> = node
                        .initial_settings()
                        .into_iter()
                        .filter_map(|(name, value)| match value {
                            ControlValue::Scalar(v) => Some((name, v)),
                            _ => None,
                        })
                        .collect();
                    out.push(Request::SynthNew {
                        name: node.synthdef_name.clone().unwrap_or_default(),
                        id,
                        add_action: add_action_code(action),
                        target,
                        controls,
                    });
                }
            }
        } else {
            out.push(match action {
                AddAction::AddToHead(_) => Request::GroupHead { id, target },
                AddAction::AddToTail(_) => Request::GroupTail { id, target },
                AddAction::AddBefore(_) => Request::NodeBefore { id, target },
                AddAction::AddAfter(_) => Request::NodeAfter { id, target },
                // No dedicated wire opcode exists for repositioning via
                // replacement; splice the node in ahead of the vacated slot.
                AddAction::ReplaceNode(_) => Request::NodeBefore { id, target },
            });
        }
    }
    out
}

/// Appends the `duration` synth parameter
/// (`min(node_stop, session_duration) - node_start`) to a freshly built
/// `SynthNew`'s controls, when the synthdef declares one.
pub fn inject_duration_param(request: &mut Request, node: &Node, session_duration: f64, def: &dyn SynthDef) {
    if let Request::SynthNew { controls, .. } = request {
        if def.has_parameter("duration") {
            let stop = node
                .stop_offset()
                .map(|o| o.seconds())
                .unwrap_or(session_duration)
                .min(session_duration);
            let duration = stop - node.start_offset.seconds();
            controls.push(("duration".to_string(), duration as f32));
        }
    }
}

/// Step 6: node parameter updates in DFS order, skipping scalar values
/// whose event lands exactly on the node's own creation offset (those are
/// folded into `SynthNew`'s inline controls instead).
pub fn node_parameter_updates(
    tree: &ResolvedTree,
    root: NodeId,
    nodes: &HashMap<NodeId, Node>,
    offset: Offset,
    id_mapper: &IdMapper,
) -> Vec<Request> {
    let mut out = Vec::new();
    for node_id in tree.iter_depth_first(root) {
        if node_id == root {
            continue;
        }
        let Some(node) = nodes.get(&node_id) else { continue };
        let is_creation_offset = node.start_offset == offset;
        let settings = node.settings_at(offset);
        if settings.is_empty() {
            continue;
        }
        let id = resolved(id_mapper, node_id);

        let mut set_pairs = Vec::new();
        let mut audio_pairs = Vec::new();
        let mut control_pairs: Vec<(String, i32)> = Vec::new();
        for (name, value) in sorted(&settings) {
            match value {
                ControlValue::Scalar(v) => {
                    if !is_creation_offset {
                        set_pairs.push((name, v));
                    }
                }
                ControlValue::Bus(bus_ref) => match bus_ref.calculation_rate {
                    crate::bus::CalculationRateTag::Audio => {
                        audio_pairs.push((name, id_mapper.bus_id(bus_ref.id.0).unwrap_or(bus_ref.id.0)));
                    }
                    crate::bus::CalculationRateTag::Control => {
                        control_pairs.push((name, id_mapper.bus_id(bus_ref.id.0).unwrap_or(bus_ref.id.0) as i32));
                    }
                },
                ControlValue::Unmapped => {}
            }
        }
        if !set_pairs.is_empty() {
            out.push(Request::NodeSet { id, pairs: set_pairs });
        }
        if !audio_pairs.is_empty() {
            out.push(Request::NodeMapToAudioBus { id, pairs: audio_pairs });
        }
        if !control_pairs.is_empty() {
            out.push(Request::NodeMapToControlBus { id, pairs: control_pairs });
        }
    }
    out
}

fn sorted(settings: &BTreeMap<String, ControlValue>) -> Vec<(String, ControlValue)> {
    settings.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
}

/// Step 7: free requests for nodes stopping at `offset` (or, on the final
/// offset, any node still alive past the session boundary).
pub fn node_free_requests(
    nodes: &HashMap<NodeId, Node>,
    root: NodeId,
    offset: Offset,
    session_duration: f64,
    is_last_offset: bool,
    synthdefs: &HashMap<String, Box<dyn SynthDef>>,
    id_mapper: &IdMapper,
) -> Vec<Request> {
    let stopping: Vec<&Node> = nodes
        .values()
        .filter(|n| n.id != root)
        .filter(|n| match n.stop_offset() {
            Some(stop) => stop == offset,
            None => is_last_offset && n.start_offset.seconds() <= session_duration,
        })
        .collect();

    let mut gated: Vec<u32> = Vec::new();
    let mut freed: Vec<u32> = Vec::new();
    for node in stopping {
        let id = resolved(id_mapper, node.id);
        let gate_declared = node
            .synthdef_name
            .as_ref()
            .and_then(|name| synthdefs.get(name))
            .map(|def| def.has_parameter("gate"))
            .unwrap_or(false);
        if gate_declared {
            gated.push(id);
        } else {
            freed.push(id);
        }
    }
    gated.sort();
    freed.sort();

    let mut out = Vec::new();
    for id in gated {
        out.push(Request::NodeSet { id, pairs: vec![("gate".to_string(), 0.0)] });
    }
    if !freed.is_empty() {
        out.push(Request::NodeFree { ids: freed });
    }
    out
}

/// Step 9: buffer free requests for buffers stopping at `offset`, closing
/// first if still open.
#[allow(clippy::too_many_arguments)]
pub fn buffer_free_requests(
    buffers: &HashMap<u32, Buffer>,
    offset: Offset,
    session_duration: f64,
    is_last_offset: bool,
    open: &mut BufferOpenTracker,
    id_mapper: &IdMapper,
) -> Vec<Request> {
    let mut stopping: Vec<&Buffer> = buffers
        .values()
        .filter(|b| match b.stop_offset() {
            Some(stop) => stop == offset,
            None => is_last_offset && b.start_offset.seconds() <= session_duration,
        })
        .collect();
    stopping.sort_by_key(|b| b.session_id);

    let mut out = Vec::new();
    for buffer in stopping {
        let id = id_mapper.buffer_id(buffer.session_id).unwrap_or(buffer.session_id);
        if open.is_open(buffer.session_id) {
            out.push(Request::BufferClose { id });
            open.set_open(buffer.session_id, false);
        }
        out.push(Request::BufferFree { id });
    }
    out
}

/// Assembles the complete, ordered request batch for one offset
/// (`spec.md` §4.5.1 items 1-9).
#[allow(clippy::too_many_arguments)]
pub fn collect_requests_at_offset(
    offset: Offset,
    is_last_offset: bool,
    session_duration: f64,
    transitions: &TransitionMap,
    tree: &ResolvedTree,
    root: NodeId,
    nodes: &HashMap<NodeId, Node>,
    buffers: &HashMap<u32, Buffer>,
    buses: &HashMap<u32, Bus>,
    synthdefs: &HashMap<String, Box<dyn SynthDef>>,
    received_synthdefs: &mut HashSet<String>,
    id_mapper: &IdMapper,
    open: &mut BufferOpenTracker,
) -> Vec<Request> {
    let mut out = Vec::new();

    out.extend(synthdef_receive_requests(nodes, offset, synthdefs, received_synthdefs));
    out.extend(buffer_allocate_requests(buffers, offset, id_mapper));

    let all_buffers: Vec<&Buffer> = buffers.values().collect();
    out.extend(settings::buffer_post_alloc_requests(&all_buffers, offset, id_mapper, open));

    let mut structural = node_structural_requests(transitions, nodes, offset, id_mapper);
    for (i, (node_id, transition)) in transitions.iter().enumerate() {
        let Transition::Add(_) = transition else { continue };
        let Some(node) = nodes.get(&node_id) else { continue };
        if node.start_offset != offset || node.kind != crate::node::NodeKind::Synth {
            continue;
        }
        if let Some(def) = node.synthdef_name.as_ref().and_then(|name| synthdefs.get(name)) {
            if let Some(request) = structural.get_mut(i) {
                inject_duration_param(request, node, session_duration, def.as_ref());
            }
        }
    }
    out.extend(structural);

    let all_buses: Vec<&Bus> = buses.values().collect();
    if let Some(request) = settings::control_bus_writes(&all_buses, offset, id_mapper) {
        out.push(request);
    }

    out.extend(node_parameter_updates(tree, root, nodes, offset, id_mapper));
    out.extend(node_free_requests(
        nodes,
        root,
        offset,
        session_duration,
        is_last_offset,
        synthdefs,
        id_mapper,
    ));
    out.extend(settings::buffer_pre_free_write_requests(&all_buffers, offset, id_mapper, open));
    out.extend(buffer_free_requests(
        buffers,
        offset,
        session_duration,
        is_last_offset,
        open,
        id_mapper,
    ));

    out
}
