//! Node identity and the per-node parameter-event stream.

use crate::bus::BusRef;
use std::collections::BTreeMap;

/// Stable, dense-per-session node identity (the value the wire protocol
/// ultimately sees, modulo the root node which is always mapped to `0`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u32);

/// Where a control's bound value comes from, determining which request
/// kind the settings collector emits for it (`NodeSet`, `NodeMapToAudioBus`,
/// `NodeMapToControlBus`).
#[derive(Debug, Clone, PartialEq)]
pub enum ControlValue {
    Scalar(f32),
    Bus(BusRef),
    Unmapped,
}

/// A node's declared add-action target, used both as a pending transition
/// and (after propagation) as part of the resolved tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddAction {
    AddToHead(NodeId),
    AddToTail(NodeId),
    AddBefore(NodeId),
    AddAfter(NodeId),
    ReplaceNode(NodeId),
}

impl AddAction {
    /// The node this action is positioned relative to (target or ref).
    pub fn anchor(self) -> NodeId {
        match self {
            AddAction::AddToHead(n)
            | AddAction::AddToTail(n)
            | AddAction::AddBefore(n)
            | AddAction::AddAfter(n)
            | AddAction::ReplaceNode(n) => n,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Group,
    Synth,
}

/// A persistent node identity: a group or a synth, with a lifetime and
/// (for synths) a parameter-event stream.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub synthdef_name: Option<String>,
    pub start_offset: crate::offset::Offset,
    /// `None` means infinite duration.
    pub duration: Option<f64>,
    /// Parameter name -> ordered (offset, value) events. The initial
    /// values passed to `add_synth` are recorded as an event at
    /// `start_offset`.
    pub parameter_events: BTreeMap<String, Vec<(crate::offset::Offset, ControlValue)>>,
}

impl Node {
    pub fn root(id: NodeId, start_offset: crate::offset::Offset) -> Self {
        Node {
            id,
            kind: NodeKind::Group,
            synthdef_name: None,
            start_offset,
            duration: None,
            parameter_events: BTreeMap::new(),
        }
    }

    pub fn stop_offset(&self) -> Option<crate::offset::Offset> {
        self.duration
            .map(|d| crate::offset::Offset::new(self.start_offset.seconds() + d))
    }

    /// Collects every parameter's value in effect at `offset`: the most
    /// recent event at or before `offset`, if any.
    pub fn settings_at(&self, offset: crate::offset::Offset) -> BTreeMap<String, ControlValue> {
        let mut result = BTreeMap::new();
        for (name, events) in &self.parameter_events {
            if let Some((_, value)) = events.iter().rfind(|(event_offset, _)| *event_offset == offset) {
                result.insert(name.clone(), value.clone());
            }
        }
        result
    }

    pub fn initial_settings(&self) -> BTreeMap<String, ControlValue> {
        self.settings_at(self.start_offset)
    }
}
