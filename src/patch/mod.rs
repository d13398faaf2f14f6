//! Patch subsystem: a QPK variant whose manifest carries diff metadata plus
//! pre/post Merkle roots (§4.L), and the state machine that applies one to a
//! loaded bundle (§4.M).

pub mod apply;
pub mod reader;
pub mod writer;

pub use apply::{apply_patch, BundleState};
pub use reader::PatchReader;
pub use writer::PatchWriter;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    Add,
    Modify,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Op {
    pub kind: OpKind,
    pub path: String,
    pub locale: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchMeta {
    pub from_version: String,
    pub to_version: String,
    pub from_merkle_root: String,
    pub to_merkle_root: String,
    pub operations: Vec<Op>,
}
