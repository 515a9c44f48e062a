//! Audio buffers and their event streams.

use crate::offset::Offset;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BufferId(pub u32);

/// Which post-allocation / pre-free buffer request an event decodes to.
/// Order here matches the fixed kind order of `spec.md` §4.5.1 item 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BufferEventKind {
    Read,
    ReadChannel,
    Zero,
    Fill,
    Generate,
    Set,
    SetContiguous,
    Normalize,
    Copy,
    Write,
}

#[derive(Debug, Clone)]
pub enum BufferEventPayload {
    Read {
        path: String,
        starting_frame: i32,
        frame_count: i32,
        leave_open: bool,
    },
    ReadChannel {
        path: String,
        starting_frame: i32,
        frame_count: i32,
        channel_indices: Vec<i32>,
        leave_open: bool,
    },
    Zero,
    Fill {
        fills: Vec<(i32, i32, f32)>,
    },
    Generate {
        command: String,
        args: Vec<f32>,
    },
    Set {
        pairs: Vec<(i32, f32)>,
    },
    SetContiguous {
        blocks: Vec<(i32, Vec<f32>)>,
    },
    Normalize {
        new_max: f32,
    },
    Copy {
        source: BufferId,
        source_start: i32,
        dest_start: i32,
        frame_count: i32,
    },
    Write {
        path: String,
        header_format: String,
        sample_format: String,
        frame_count: i32,
        starting_frame: i32,
        leave_open: bool,
    },
}

impl BufferEventPayload {
    pub fn kind(&self) -> BufferEventKind {
        match self {
            BufferEventPayload::Read { .. } => BufferEventKind::Read,
            BufferEventPayload::ReadChannel { .. } => BufferEventKind::ReadChannel,
            BufferEventPayload::Zero => BufferEventKind::Zero,
            BufferEventPayload::Fill { .. } => BufferEventKind::Fill,
            BufferEventPayload::Generate { .. } => BufferEventKind::Generate,
            BufferEventPayload::Set { .. } => BufferEventKind::Set,
            BufferEventPayload::SetContiguous { .. } => BufferEventKind::SetContiguous,
            BufferEventPayload::Normalize { .. } => BufferEventKind::Normalize,
            BufferEventPayload::Copy { .. } => BufferEventKind::Copy,
            BufferEventPayload::Write { .. } => BufferEventKind::Write,
        }
    }

    pub fn leave_open(&self) -> Option<bool> {
        match self {
            BufferEventPayload::Read { leave_open, .. } => Some(*leave_open),
            BufferEventPayload::ReadChannel { leave_open, .. } => Some(*leave_open),
            BufferEventPayload::Write { leave_open, .. } => Some(*leave_open),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Buffer {
    pub session_id: u32,
    pub channel_count: u32,
    pub frame_count: u32,
    pub file_path: Option<String>,
    pub starting_frame: i32,
    pub start_offset: Offset,
    /// `None` means infinite duration.
    pub duration: Option<f64>,
    pub buffer_group_lead: Option<u32>,
    pub events: Vec<(Offset, BufferEventPayload)>,
}

impl Buffer {
    pub fn stop_offset(&self) -> Option<Offset> {
        self.duration
            .map(|d| Offset::new(self.start_offset.seconds() + d))
    }

    pub fn push_event(&mut self, offset: Offset, payload: BufferEventPayload) {
        self.events.push((offset, payload));
    }

    /// Whether the buffer is allocated at `offset`: on or after its
    /// `start_offset`, and before its `stop_offset` (if any).
    pub fn is_live_at(&self, offset: Offset) -> bool {
        if offset < self.start_offset {
            return false;
        }
        match self.stop_offset() {
            Some(stop) => offset < stop,
            None => true,
        }
    }
}
