use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{error::Error, module::Op};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallKind {
    Direct,
    Virtual,
}

impl CallKind {
    pub fn op(self) -> Op {
        match self {
            CallKind::Direct => Op::Call,
            CallKind::Virtual => Op::Callvirt,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallSignature {
    pub declaring_type: String,
    pub method: String,
    pub kind: CallKind,
}

impl Default for CallSignature {
    fn default() -> Self {
        Self {
            declaring_type: "UnityEngine.Application".to_string(),
            method: "RegisterLogCallback".to_string(),
            kind: CallKind::Direct,
        }
    }
}

/// Which call to replace, and where the shared field and combinator live.
///
/// The template itself is fixed: `field = (FieldType) combinator(argument, field)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchRule {
    pub target: CallSignature,
    pub bridge_module: String,
    pub bridge_type: String,
    pub bridge_field: String,
    pub runtime_module: String,
    pub combinator_type: String,
    pub combinator: String,
    /// Module files whose name contains any of these are neither scanned nor patched.
    pub exclude_files: Vec<String>,
}

impl Default for PatchRule {
    fn default() -> Self {
        Self {
            target: CallSignature::default(),
            bridge_module: "SyntaxTree.VisualStudio.Unity.Bridge".to_string(),
            bridge_type: "SyntaxTree.VisualStudio.Unity.Bridge.VisualStudioIntegration"
                .to_string(),
            bridge_field: "LogCallback".to_string(),
            runtime_module: "mscorlib".to_string(),
            combinator_type: "System.Delegate".to_string(),
            combinator: "Combine".to_string(),
            exclude_files: vec!["SyntaxTree.VisualStudio.Unity".to_string()],
        }
    }
}

impl PatchRule {
    pub fn from_ron(source: &str) -> Result<Self, Error> {
        Ok(ron::from_str(source)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        Self::from_ron(&fs::read_to_string(path)?)
    }
}
