//! Wire-protocol request kinds and their OSC address/argument mapping
//! (`spec.md` §6's canonical request table), built on `rosc`'s
//! `OscMessage`/`OscType`.

use rosc::{OscMessage, OscType};

#[derive(Debug, Clone)]
pub enum Request {
    SynthDefReceive { bytecode: Vec<u8> },

    BufferAllocate { id: u32, frame_count: i32, channel_count: i32 },
    BufferAllocateRead { id: u32, path: String, starting_frame: i32, frame_count: i32 },
    BufferAllocateReadChannel { id: u32, path: String, starting_frame: i32, frame_count: i32, channel_indices: Vec<i32> },

    BufferRead { id: u32, path: String, starting_frame: i32, frame_count: i32, buffer_starting_frame: i32, leave_open: bool },
    BufferReadChannel { id: u32, path: String, starting_frame: i32, frame_count: i32, buffer_starting_frame: i32, channel_indices: Vec<i32>, leave_open: bool },
    BufferWrite { id: u32, path: String, header_format: String, sample_format: String, frame_count: i32, starting_frame: i32, leave_open: bool },
    BufferClose { id: u32 },
    BufferFree { id: u32 },
    BufferZero { id: u32 },
    BufferFill { id: u32, fills: Vec<(i32, i32, f32)> },
    BufferGenerate { id: u32, command: String, args: Vec<f32> },
    BufferSet { id: u32, pairs: Vec<(i32, f32)> },
    BufferSetContiguous { id: u32, blocks: Vec<(i32, Vec<f32>)> },
    BufferNormalize { id: u32, new_max: f32 },
    BufferCopy { id: u32, source_id: u32, dest_start: i32, source_start: i32, frame_count: i32 },

    SynthNew { name: String, id: u32, add_action: i32, target: u32, controls: Vec<(String, f32)> },
    GroupNew { id: u32, add_action: i32, target: u32 },
    GroupHead { id: u32, target: u32 },
    GroupTail { id: u32, target: u32 },
    NodeBefore { id: u32, target: u32 },
    NodeAfter { id: u32, target: u32 },
    NodeFree { ids: Vec<u32> },
    NodeSet { id: u32, pairs: Vec<(String, f32)> },
    NodeMapToAudioBus { id: u32, pairs: Vec<(String, u32)> },
    NodeMapToControlBus { id: u32, pairs: Vec<(String, i32)> },

    ControlBusSet { pairs: Vec<(u32, f32)> },

    Terminator,
}

impl Request {
    /// Builds the wire message for this request. `include_types` is kept
    /// to mirror the external encoder's `to_osc_message(with_types)`
    /// boundary (`spec.md` §6); `rosc` always carries explicit type tags,
    /// so both modes currently produce the same typed message.
    pub fn to_message(&self, _include_types: bool) -> OscMessage {
        match self {
            Request::SynthDefReceive { bytecode } => msg("/d_recv", vec![OscType::Blob(bytecode.clone())]),

            Request::BufferAllocate { id, frame_count, channel_count } => msg(
                "/b_alloc",
                vec![OscType::Int(*id as i32), OscType::Int(*frame_count), OscType::Int(*channel_count)],
            ),
            Request::BufferAllocateRead { id, path, starting_frame, frame_count } => msg(
                "/b_allocRead",
                vec![
                    OscType::Int(*id as i32),
                    OscType::String(path.clone()),
                    OscType::Int(*starting_frame),
                    OscType::Int(*frame_count),
                ],
            ),
            Request::BufferAllocateReadChannel { id, path, starting_frame, frame_count, channel_indices } => {
                let mut args = vec![
                    OscType::Int(*id as i32),
                    OscType::String(path.clone()),
                    OscType::Int(*starting_frame),
                    OscType::Int(*frame_count),
                ];
                args.extend(channel_indices.iter().map(|&c| OscType::Int(c)));
                msg("/b_allocReadChannel", args)
            }

            Request::BufferRead { id, path, starting_frame, frame_count, buffer_starting_frame, leave_open } => msg(
                "/b_read",
                vec![
                    OscType::Int(*id as i32),
                    OscType::String(path.clone()),
                    OscType::Int(*starting_frame),
                    OscType::Int(*frame_count),
                    OscType::Int(*buffer_starting_frame),
                    OscType::Int(*leave_open as i32),
                ],
            ),
            Request::BufferReadChannel { id, path, starting_frame, frame_count, buffer_starting_frame, channel_indices, leave_open } => {
                let mut args = vec![
                    OscType::Int(*id as i32),
                    OscType::String(path.clone()),
                    OscType::Int(*starting_frame),
                    OscType::Int(*frame_count),
                    OscType::Int(*buffer_starting_frame),
                    OscType::Int(*leave_open as i32),
                ];
                args.extend(channel_indices.iter().map(|&c| OscType::Int(c)));
                msg("/b_readChannel", args)
            }
            Request::BufferWrite { id, path, header_format, sample_format, frame_count, starting_frame, leave_open } => msg(
                "/b_write",
                vec![
                    OscType::Int(*id as i32),
                    OscType::String(path.clone()),
                    OscType::String(header_format.clone()),
                    OscType::String(sample_format.clone()),
                    OscType::Int(*frame_count),
                    OscType::Int(*starting_frame),
                    OscType::Int(*leave_open as i32),
                ],
            ),
            Request::BufferClose { id } => msg("/b_close", vec![OscType::Int(*id as i32)]),
            Request::BufferFree { id } => msg("/b_free", vec![OscType::Int(*id as i32)]),
            Request::BufferZero { id } => msg("/b_zero", vec![OscType::Int(*id as i32)]),
            Request::BufferFill { id, fills } => {
                let mut args = vec![OscType::Int(*id as i32)];
                for (start, count, value) in fills {
                    args.push(OscType::Int(*start));
                    args.push(OscType::Int(*count));
                    args.push(OscType::Float(*value));
                }
                msg("/b_fill", args)
            }
            Request::BufferGenerate { id, command, args: gen_args } => {
                let mut args = vec![OscType::Int(*id as i32), OscType::String(command.clone())];
                args.extend(gen_args.iter().map(|&a| OscType::Float(a)));
                msg("/b_gen", args)
            }
            Request::BufferSet { id, pairs } => {
                let mut args = vec![OscType::Int(*id as i32)];
                for (index, value) in pairs {
                    args.push(OscType::Int(*index));
                    args.push(OscType::Float(*value));
                }
                msg("/b_set", args)
            }
            Request::BufferSetContiguous { id, blocks } => {
                let mut args = vec![OscType::Int(*id as i32)];
                for (start, values) in blocks {
                    args.push(OscType::Int(*start));
                    args.push(OscType::Int(values.len() as i32));
                    args.extend(values.iter().map(|&v| OscType::Float(v)));
                }
                msg("/b_setn", args)
            }
            Request::BufferNormalize { id, new_max } => msg(
                "/b_gen",
                vec![OscType::Int(*id as i32), OscType::String("normalize".into()), OscType::Float(*new_max)],
            ),
            Request::BufferCopy { id, source_id, dest_start, source_start, frame_count } => msg(
                "/b_copy",
                vec![
                    OscType::Int(*id as i32),
                    OscType::Int(*source_id as i32),
                    OscType::Int(*dest_start),
                    OscType::Int(*source_start),
                    OscType::Int(*frame_count),
                ],
            ),

            Request::SynthNew { name, id, add_action, target, controls } => {
                let mut args = vec![
                    OscType::String(name.clone()),
                    OscType::Int(*id as i32),
                    OscType::Int(*add_action),
                    OscType::Int(*target as i32),
                ];
                for (key, value) in controls {
                    args.push(OscType::String(key.clone()));
                    args.push(OscType::Float(*value));
                }
                msg("/s_new", args)
            }
            Request::GroupNew { id, add_action, target } => msg(
                "/g_new",
                vec![OscType::Int(*id as i32), OscType::Int(*add_action), OscType::Int(*target as i32)],
            ),
            Request::GroupHead { id, target } => msg("/g_head", vec![OscType::Int(*id as i32), OscType::Int(*target as i32)]),
            Request::GroupTail { id, target } => msg("/g_tail", vec![OscType::Int(*id as i32), OscType::Int(*target as i32)]),
            Request::NodeBefore { id, target } => msg("/n_before", vec![OscType::Int(*id as i32), OscType::Int(*target as i32)]),
            Request::NodeAfter { id, target } => msg("/n_after", vec![OscType::Int(*id as i32), OscType::Int(*target as i32)]),
            Request::NodeFree { ids } => msg("/n_free", ids.iter().map(|&id| OscType::Int(id as i32)).collect()),
            Request::NodeSet { id, pairs } => {
                let mut args = vec![OscType::Int(*id as i32)];
                for (key, value) in pairs {
                    args.push(OscType::String(key.clone()));
                    args.push(OscType::Float(*value));
                }
                msg("/n_set", args)
            }
            Request::NodeMapToAudioBus { id, pairs } => {
                let mut args = vec![OscType::Int(*id as i32)];
                for (key, bus) in pairs {
                    args.push(OscType::String(key.clone()));
                    args.push(OscType::Int(*bus as i32));
                }
                msg("/n_mapa", args)
            }
            Request::NodeMapToControlBus { id, pairs } => {
                let mut args = vec![OscType::Int(*id as i32)];
                for (key, bus) in pairs {
                    args.push(OscType::String(key.clone()));
                    args.push(OscType::Int(*bus));
                }
                msg("/n_map", args)
            }

            Request::ControlBusSet { pairs } => {
                let mut args = Vec::with_capacity(pairs.len() * 2);
                for (index, value) in pairs {
                    args.push(OscType::Int(*index as i32));
                    args.push(OscType::Float(*value));
                }
                msg("/c_set", args)
            }

            // The terminator's address is the literal integer 0, per
            // `spec.md` §6; `rosc` requires a string address, so this is
            // special-cased in the bundle builder instead of here.
            Request::Terminator => msg("\0", vec![]),
        }
    }
}

fn msg(address: &str, args: Vec<OscType>) -> OscMessage {
    OscMessage { addr: address.to_string(), args }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synth_new_message_order() {
        let request = Request::SynthNew {
            name: "sine".into(),
            id: 1000,
            add_action: 0,
            target: 0,
            controls: vec![("freq".into(), 440.0)],
        };
        let message = request.to_message(true);
        assert_eq!(message.addr, "/s_new");
        assert_eq!(
            message.args,
            vec![
                OscType::String("sine".into()),
                OscType::Int(1000),
                OscType::Int(0),
                OscType::Int(0),
                OscType::String("freq".into()),
                OscType::Float(440.0),
            ]
        );
    }

    #[test]
    fn control_bus_set_interleaves_index_value() {
        let request = Request::ControlBusSet { pairs: vec![(0, 0.5), (2, 1.0)] };
        let message = request.to_message(true);
        assert_eq!(
            message.args,
            vec![OscType::Int(0), OscType::Float(0.5), OscType::Int(2), OscType::Float(1.0)]
        );
    }
}
