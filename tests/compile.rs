//! Reproduces the concrete scenarios from `spec.md` §8 against the real
//! `Session` / `Bundle` / `Request` API.

use notate::bus::CalculationRate;
use notate::error::CompileError;
use notate::node::{AddAction, NodeId};
use notate::request::Request;
use notate::session::Session;
use notate::synthdef::OpaqueSynthDef;

fn offsets(session: &mut Session, duration: f64) -> Vec<f64> {
    session
        .to_bundles(Some(duration))
        .unwrap()
        .iter()
        .map(|b| b.offset.seconds())
        .collect()
}

#[test]
fn two_parallel_synths_one_overlapping() {
    let mut session = Session::new(2, 0);
    let def = session.register_synthdef(OpaqueSynthDef::new(vec![1, 2, 3], vec![]));
    let root = NodeId(0);

    let synth_a = session.add_synth(0.0, AddAction::AddToHead(root), &def, Some(10.0), vec![]).unwrap();
    let synth_b = session.add_synth(0.0, AddAction::AddToHead(root), &def, Some(15.0), vec![]).unwrap();
    let synth_c = session.add_synth(5.0, AddAction::AddToHead(root), &def, Some(10.0), vec![]).unwrap();

    assert_eq!(offsets(&mut session, 20.0), vec![0.0, 5.0, 10.0, 15.0, 20.0]);

    let bundles = session.to_bundles(Some(20.0)).unwrap();

    let requests0 = &bundles[0].requests;
    assert!(matches!(requests0[0], Request::SynthDefReceive { .. }));
    assert!(matches!(
        &requests0[1],
        Request::SynthNew { id, add_action: 0, target: 0, .. } if *id == synth_a.0
    ));
    assert!(matches!(
        &requests0[2],
        Request::SynthNew { id, add_action: 0, target: 0, .. } if *id == synth_b.0
    ));
    assert_eq!(requests0.len(), 3);

    let requests5 = &bundles[1].requests;
    assert!(matches!(
        &requests5[0],
        Request::SynthNew { id, add_action: 0, target: 0, .. } if *id == synth_c.0
    ));
    assert_eq!(requests5.len(), 1);

    assert!(matches!(&bundles[2].requests[..], [Request::NodeFree { ids }] if *ids == vec![synth_a.0]));

    let mut expected_15 = vec![synth_b.0, synth_c.0];
    expected_15.sort();
    assert!(matches!(&bundles[3].requests[..], [Request::NodeFree { ids }] if *ids == expected_15));

    assert!(matches!(&bundles[4].requests[..], [Request::Terminator]));
}

#[test]
fn buffer_allocate_read_write_free() {
    let mut session = Session::new(2, 0);
    let buffer = session.add_buffer(0.0, 2, 32768, None, Some(("/f.aiff".to_string(), 0, true)));
    session
        .write_buffer(buffer, 4.0, "/out.aiff".to_string(), "aiff".to_string(), "int16".to_string(), 32768, 0, false)
        .unwrap();
    session.free_buffer(buffer, 8.0).unwrap();

    let bundles = session.to_bundles(Some(8.0)).unwrap();
    assert_eq!(offsets(&mut session, 8.0), vec![0.0, 4.0, 8.0]);

    assert!(matches!(
        &bundles[0].requests[..],
        [Request::BufferAllocateRead { id: 0, starting_frame: 0, frame_count: 32768, .. }, Request::BufferRead { id: 0, leave_open: true, .. }]
    ));

    assert!(matches!(
        &bundles[1].requests[..],
        [Request::BufferClose { id: 0 }, Request::BufferWrite { id: 0, leave_open: false, .. }]
    ));

    assert!(matches!(
        &bundles[2].requests[..],
        [Request::BufferFree { id: 0 }, Request::Terminator]
    ));
}

#[test]
fn gated_synth_is_set_not_freed() {
    let mut session = Session::new(2, 0);
    let def = session.register_synthdef(OpaqueSynthDef::new(vec![4, 5, 6], vec!["gate".to_string()]));
    let root = NodeId(0);
    let synth = session.add_synth(0.0, AddAction::AddToHead(root), &def, Some(10.0), vec![]).unwrap();

    let bundles = session.to_bundles(Some(10.0)).unwrap();
    let last = bundles.last().unwrap();
    assert!(last.requests.iter().any(|r| matches!(
        r,
        Request::NodeSet { id, pairs } if *id == synth.0 && pairs == &vec![("gate".to_string(), 0.0f32)]
    )));
    assert!(!last.requests.iter().any(|r| matches!(r, Request::NodeFree { .. })));
}

#[test]
fn node_reparenting_via_add_before() {
    let mut session = Session::new(2, 0);
    let def = session.register_synthdef(OpaqueSynthDef::new(vec![7, 8, 9], vec![]));
    let root = NodeId(0);
    let group = session.add_group(0.0, AddAction::AddToHead(root)).unwrap();
    let s1 = session.add_synth(0.0, AddAction::AddToTail(group), &def, Some(20.0), vec![]).unwrap();
    let s2 = session.add_synth(0.0, AddAction::AddToTail(group), &def, Some(20.0), vec![]).unwrap();
    session.move_node(s2, 5.0, AddAction::AddBefore(s1)).unwrap();

    let bundles = session.to_bundles(Some(20.0)).unwrap();
    let at_5 = bundles.iter().find(|b| b.offset.seconds() == 5.0).unwrap();
    assert!(matches!(
        &at_5.requests[..],
        [Request::NodeBefore { id, target }] if *id == s2.0 && *target == s1.0
    ));
}

#[test]
fn control_bus_writes_are_sorted_by_resolved_id() {
    let mut session = Session::new(0, 0);
    let bus0 = session.add_bus(CalculationRate::Control);
    let _unused = session.add_bus(CalculationRate::Control);
    let bus2 = session.add_bus(CalculationRate::Control);

    // Written in reverse id order; the compiled `/c_set` must come out sorted.
    session.write_bus(bus2, 1.0, 1.0).unwrap();
    session.write_bus(bus0, 1.0, 0.5).unwrap();

    let bundles = session.to_bundles(Some(2.0)).unwrap();
    let at_1 = bundles.iter().find(|b| b.offset.seconds() == 1.0).unwrap();
    assert!(matches!(
        &at_1.requests[..],
        [Request::ControlBusSet { pairs }] if *pairs == vec![(0, 0.5), (2, 1.0)]
    ));
}

#[test]
fn infinite_duration_synth_freed_at_score_boundary() {
    let mut session = Session::new(2, 0);
    let def = session.register_synthdef(OpaqueSynthDef::new(vec![1], vec![]));
    let root = NodeId(0);
    let synth = session.add_synth(0.0, AddAction::AddToHead(root), &def, None, vec![]).unwrap();

    let bundles = session.to_bundles(Some(7.0)).unwrap();
    let last = bundles.last().unwrap();
    assert_eq!(last.offset.seconds(), 7.0);
    assert!(matches!(&last.requests[..], [Request::NodeFree { ids }, Request::Terminator] if *ids == vec![synth.0]));
}

#[test]
fn buffer_group_members_get_contiguous_ids_and_survive_to_wire() {
    let mut session = Session::new(2, 0);
    let members = session.add_buffer_group(0.0, 3, 1, 1024, Some(4.0));
    assert_eq!(members.len(), 3);
    let mut ids: Vec<u32> = members.iter().map(|b| b.0).collect();
    ids.sort();
    assert_eq!(ids[1], ids[0] + 1);
    assert_eq!(ids[2], ids[0] + 2);
    ids.dedup();
    assert_eq!(ids.len(), 3, "buffer group members collided onto one wire id");

    let bundles = session.to_bundles(Some(4.0)).unwrap();
    let mut alloc_ids: Vec<u32> = bundles[0]
        .requests
        .iter()
        .filter_map(|r| match r {
            Request::BufferAllocate { id, .. } => Some(*id),
            _ => None,
        })
        .collect();
    alloc_ids.sort();
    assert_eq!(alloc_ids, vec![members[0].0, members[1].0, members[2].0]);
}

#[test]
fn buffer_event_before_start_offset_is_rejected() {
    let mut session = Session::new(2, 0);
    let buffer = session.add_buffer(4.0, 2, 1024, None, None);
    let err = session
        .read_buffer(buffer, 1.0, "/f.aiff".to_string(), 0, 1024, false)
        .unwrap_err();
    assert!(matches!(err, CompileError::BufferNotLive { buffer: b, .. } if b == buffer));
}

#[test]
fn buffer_event_after_stop_offset_is_rejected() {
    let mut session = Session::new(2, 0);
    let buffer = session.add_buffer(0.0, 2, 1024, None, None);
    session.free_buffer(buffer, 4.0).unwrap();
    let err = session
        .write_buffer(buffer, 5.0, "/out.aiff".to_string(), "aiff".to_string(), "int16".to_string(), 1024, 0, false)
        .unwrap_err();
    assert!(matches!(err, CompileError::BufferNotLive { buffer: b, .. } if b == buffer));
}

#[test]
fn buffer_starting_after_session_duration_is_never_freed() {
    let mut session = Session::new(2, 0);
    let _late_buffer = session.add_buffer(50.0, 2, 1024, None, None);
    let bundles = session.to_bundles(Some(10.0)).unwrap();
    assert!(!bundles.iter().any(|b| b.requests.iter().any(|r| matches!(r, Request::BufferFree { .. }))));
}
