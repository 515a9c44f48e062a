//! The trait boundary to the external unit-generator graph language and
//! synthdef binary encoder. `spec.md` §1 treats the compiler and encoder
//! as external collaborators; the planner needs only compiled bytecode,
//! a content-addressed name, and whether `duration`/`gate` are declared.

use sha2::{Digest, Sha256};

pub trait SynthDef {
    /// Content-addressed name, used as the sort key for `/d_recv` ordering
    /// (`spec.md` §4.5.1 item 1) and as dedup identity across nodes.
    fn anonymous_name(&self) -> &str;
    fn compile(&self) -> Vec<u8>;
    fn parameter_names(&self) -> &[String];

    fn has_parameter(&self, name: &str) -> bool {
        self.parameter_names().iter().any(|p| p == name)
    }
}

/// A synthdef whose bytecode is opaque to this crate (produced by the
/// external UGen graph compiler) and whose anonymous name is derived from
/// the bytecode's content hash, exactly as the original system's
/// `anonymous_name` derives from the compiled synthdef bytes.
#[derive(Debug, Clone)]
pub struct OpaqueSynthDef {
    anonymous_name: String,
    bytecode: Vec<u8>,
    parameter_names: Vec<String>,
}

impl OpaqueSynthDef {
    pub fn new(bytecode: Vec<u8>, parameter_names: Vec<String>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(&bytecode);
        let anonymous_name = format!("{:x}", hasher.finalize());
        OpaqueSynthDef {
            anonymous_name,
            bytecode,
            parameter_names,
        }
    }
}

impl SynthDef for OpaqueSynthDef {
    fn anonymous_name(&self) -> &str {
        &self.anonymous_name
    }

    fn compile(&self) -> Vec<u8> {
        self.bytecode.clone()
    }

    fn parameter_names(&self) -> &[String] {
        &self.parameter_names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_is_deterministic_and_content_addressed() {
        let a = OpaqueSynthDef::new(vec![1, 2, 3], vec!["freq".into()]);
        let b = OpaqueSynthDef::new(vec![1, 2, 3], vec!["freq".into()]);
        let c = OpaqueSynthDef::new(vec![1, 2, 4], vec!["freq".into()]);
        assert_eq!(a.anonymous_name(), b.anonymous_name());
        assert_ne!(a.anonymous_name(), c.anonymous_name());
    }

    #[test]
    fn detects_gate_and_duration_parameters() {
        let def = OpaqueSynthDef::new(vec![], vec!["gate".into(), "freq".into()]);
        assert!(def.has_parameter("gate"));
        assert!(!def.has_parameter("duration"));
    }
}
