//! A non-realtime session compiler: builds a sparse, offset-keyed timeline
//! of node/bus/buffer transitions and compiles it into an ordered stream
//! of OSC bundles for an external offline audio renderer.
//!
//! ```
//! use notate::node::{AddAction, ControlValue};
//! use notate::session::Session;
//! use notate::synthdef::OpaqueSynthDef;
//!
//! let mut session = Session::new(2, 0);
//! let name = session.register_synthdef(OpaqueSynthDef::new(vec![0, 1, 2], vec!["freq".into()]));
//! session
//!     .add_synth(0.0, AddAction::AddToHead(notate::node::NodeId(0)), &name, Some(1.0), vec![
//!         ("freq".to_string(), ControlValue::Scalar(440.0)),
//!     ])
//!     .unwrap();
//! let bundles = session.to_bundles(Some(1.0)).unwrap();
//! assert_eq!(bundles.len(), 2);
//! ```

pub mod alloc;
pub mod buffer;
pub mod bus;
pub mod error;
pub mod node;
pub mod offset;
pub mod planner;
pub mod propagation;
pub mod render;
pub mod request;
pub mod session;
pub mod settings;
pub mod state;
pub mod synthdef;
pub mod timeline;

pub use error::{CompileError, CompileResult};
pub use session::Session;
