//! Error kinds surfaced by the compiler's top-level operations.
//!
//! No error is swallowed: every fallible public entry point (`to_bundles`,
//! `to_datagram`, `render`) returns `Result<_, CompileError>` and aborts on
//! the first failure rather than returning a partial artifact.

use crate::node::NodeId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("session duration is unbounded and no override duration was supplied")]
    UnboundedSession,

    #[error("duration must be positive and finite, got {0}")]
    InvalidDuration(f64),

    #[error("transition or event references unknown node {0:?}")]
    UnknownNode(NodeId),

    #[error("transition or event references unknown entity: {0}")]
    UnknownEntity(String),

    #[error("attempted to remove a non-sparse state at offset {0}")]
    StateNotSparse(crate::offset::Offset),

    #[error("attempted to read an unresolved node tree at offset {0}")]
    TreeUnresolved(crate::offset::Offset),

    #[error("bus allocator exhausted: could not fit a block of {requested} ids")]
    AllocatorExhausted { requested: usize },

    #[error("buffer event at offset {offset} targets buffer {buffer:?}, which is not live at that offset")]
    BufferNotLive {
        offset: crate::offset::Offset,
        buffer: crate::buffer::BufferId,
    },

    #[error("renderer binary '{0}' not found on $PATH")]
    RendererNotFound(String),

    #[error("renderer process exited with status {0}")]
    RendererFailed(std::process::ExitStatus),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type CompileResult<T> = Result<T, CompileError>;
