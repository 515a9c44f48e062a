//! Per-offset settings collection: decodes buffer event streams, bus
//! writes, and node parameter events into concrete [`Request`]s
//! (`spec.md` §4.5.1 items 3, 5, 6).

use crate::alloc::IdMapper;
use crate::buffer::{Buffer, BufferEventKind, BufferEventPayload};
use crate::bus::Bus;
use crate::offset::Offset;
use crate::request::Request;
use std::collections::HashMap;

/// Tracks each buffer's open/closed state across the whole compile
/// (`spec.md` §4.5.2's buffer state machine).
#[derive(Default)]
pub struct BufferOpenTracker(HashMap<u32, bool>);

impl BufferOpenTracker {
    pub fn is_open(&self, session_id: u32) -> bool {
        self.0.get(&session_id).copied().unwrap_or(false)
    }

    pub fn set_open(&mut self, session_id: u32, open: bool) {
        self.0.insert(session_id, open);
    }
}

const POST_ALLOC_KIND_ORDER: [BufferEventKind; 9] = [
    BufferEventKind::Read,
    BufferEventKind::ReadChannel,
    BufferEventKind::Zero,
    BufferEventKind::Fill,
    BufferEventKind::Generate,
    BufferEventKind::Set,
    BufferEventKind::SetContiguous,
    BufferEventKind::Normalize,
    BufferEventKind::Copy,
];

fn payload_request(id: u32, payload: &BufferEventPayload) -> Request {
    match payload {
        BufferEventPayload::Read { path, starting_frame, frame_count, leave_open } => Request::BufferRead {
            id,
            path: path.clone(),
            starting_frame: *starting_frame,
            frame_count: *frame_count,
            buffer_starting_frame: 0,
            leave_open: *leave_open,
        },
        BufferEventPayload::ReadChannel { path, starting_frame, frame_count, channel_indices, leave_open } => {
            Request::BufferReadChannel {
                id,
                path: path.clone(),
                starting_frame: *starting_frame,
                frame_count: *frame_count,
                buffer_starting_frame: 0,
                channel_indices: channel_indices.clone(),
                leave_open: *leave_open,
            }
        }
        BufferEventPayload::Zero => Request::BufferZero { id },
        BufferEventPayload::Fill { fills } => Request::BufferFill { id, fills: fills.clone() },
        BufferEventPayload::Generate { command, args } => {
            Request::BufferGenerate { id, command: command.clone(), args: args.clone() }
        }
        BufferEventPayload::Set { pairs } => Request::BufferSet { id, pairs: pairs.clone() },
        BufferEventPayload::SetContiguous { blocks } => Request::BufferSetContiguous { id, blocks: blocks.clone() },
        BufferEventPayload::Normalize { new_max } => Request::BufferNormalize { id, new_max: *new_max },
        BufferEventPayload::Copy { source, source_start, dest_start, frame_count } => Request::BufferCopy {
            id,
            source_id: source.0,
            dest_start: *dest_start,
            source_start: *source_start,
            frame_count: *frame_count,
        },
        BufferEventPayload::Write { path, header_format, sample_format, frame_count, starting_frame, leave_open } => {
            Request::BufferWrite {
                id,
                path: path.clone(),
                header_format: header_format.clone(),
                sample_format: sample_format.clone(),
                frame_count: *frame_count,
                starting_frame: *starting_frame,
                leave_open: *leave_open,
            }
        }
    }
}

/// Ordered post-allocation buffer requests at `offset`, in the fixed kind
/// order, with implicit `Close` insertion when an already-open buffer
/// receives a `Read`/`ReadChannel`.
pub fn buffer_post_alloc_requests(
    buffers: &[&Buffer],
    offset: Offset,
    id_mapper: &IdMapper,
    open: &mut BufferOpenTracker,
) -> Vec<Request> {
    let mut sorted: Vec<&&Buffer> = buffers.iter().collect();
    sorted.sort_by_key(|b| b.session_id);

    let mut out = Vec::new();
    for kind in POST_ALLOC_KIND_ORDER {
        for buffer in &sorted {
            for (event_offset, payload) in &buffer.events {
                if *event_offset != offset || payload.kind() != kind {
                    continue;
                }
                let id = id_mapper.buffer_id(buffer.session_id).unwrap_or(buffer.session_id);
                if matches!(kind, BufferEventKind::Read | BufferEventKind::ReadChannel) && open.is_open(buffer.session_id) {
                    out.push(Request::BufferClose { id });
                }
                out.push(payload_request(id, payload));
                if let Some(leave_open) = payload.leave_open() {
                    open.set_open(buffer.session_id, leave_open);
                }
            }
        }
    }
    out
}

/// Ordered pre-free `Write` requests at `offset`.
pub fn buffer_pre_free_write_requests(
    buffers: &[&Buffer],
    offset: Offset,
    id_mapper: &IdMapper,
    open: &mut BufferOpenTracker,
) -> Vec<Request> {
    let mut sorted: Vec<&&Buffer> = buffers.iter().collect();
    sorted.sort_by_key(|b| b.session_id);

    let mut out = Vec::new();
    for buffer in &sorted {
        for (event_offset, payload) in &buffer.events {
            if *event_offset != offset || payload.kind() != BufferEventKind::Write {
                continue;
            }
            let id = id_mapper.buffer_id(buffer.session_id).unwrap_or(buffer.session_id);
            if open.is_open(buffer.session_id) {
                out.push(Request::BufferClose { id });
            }
            out.push(payload_request(id, payload));
            if let Some(leave_open) = payload.leave_open() {
                open.set_open(buffer.session_id, leave_open);
            }
        }
    }
    out
}

/// The single `ControlBusSet` request for bus writes landing exactly at
/// `offset`, with pairs sorted by resolved bus id (`spec.md` §4.5.1 item 5).
pub fn control_bus_writes(buses: &[&Bus], offset: Offset, id_mapper: &IdMapper) -> Option<Request> {
    let mut pairs: Vec<(u32, f32)> = Vec::new();
    for bus in buses {
        for (event_offset, value) in &bus.events {
            if *event_offset == offset {
                let id = id_mapper.bus_id(bus.session_id).unwrap_or(bus.session_id);
                pairs.push((id, *value));
            }
        }
    }
    if pairs.is_empty() {
        return None;
    }
    pairs.sort_by_key(|&(id, _)| id);
    Some(Request::ControlBusSet { pairs })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::CalculationRate;

    #[test]
    fn control_bus_writes_sort_by_resolved_id() {
        let mut a = Bus::new(5, CalculationRate::Control);
        a.write(Offset::new(1.0), 0.5);
        let mut b = Bus::new(6, CalculationRate::Control);
        b.write(Offset::new(1.0), 1.0);
        let mut mapper = IdMapper::default();
        mapper.bus_ids.insert(5, 2);
        mapper.bus_ids.insert(6, 0);

        let request = control_bus_writes(&[&a, &b], Offset::new(1.0), &mapper).unwrap();
        match request {
            Request::ControlBusSet { pairs } => {
                assert_eq!(pairs, vec![(0, 1.0), (2, 0.5)]);
            }
            _ => panic!("expected ControlBusSet"),
        }
    }

    #[test]
    fn post_alloc_closes_before_reopening_read() {
        let mut buffer = Buffer {
            session_id: 0,
            channel_count: 1,
            frame_count: 100,
            file_path: None,
            starting_frame: 0,
            start_offset: Offset::ZERO,
            duration: None,
            buffer_group_lead: None,
            events: Vec::new(),
        };
        buffer.push_event(
            Offset::new(4.0),
            BufferEventPayload::Read {
                path: "/f.aiff".into(),
                starting_frame: 0,
                frame_count: 100,
                leave_open: false,
            },
        );
        let mapper = IdMapper::default();
        let mut open = BufferOpenTracker::default();
        open.set_open(0, true);
        let requests = buffer_post_alloc_requests(&[&buffer], Offset::new(4.0), &mapper, &mut open);
        assert!(matches!(requests[0], Request::BufferClose { id: 0 }));
        assert!(matches!(requests[1], Request::BufferRead { id: 0, .. }));
        assert!(!open.is_open(0));
    }
}
