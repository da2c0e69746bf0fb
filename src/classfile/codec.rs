//! Parser/writer seam between jar entries and [`ClassNode`]s.

use super::ClassNode;
use crate::error::{ForgeError, Result};

/// Turns class entry bytes into a structural node and back.
///
/// Implementations come from outside this crate (a full bytecode library);
/// errors are reported through `anyhow` and wrapped by the callers.
pub trait ClassCodec: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> anyhow::Result<ClassNode>;

    fn encode(&self, node: &ClassNode) -> anyhow::Result<Vec<u8>>;
}

/// Codec storing class nodes as JSON documents.
///
/// Used for interchange and for test jars built in-process.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonClassCodec;

impl ClassCodec for JsonClassCodec {
    fn decode(&self, bytes: &[u8]) -> anyhow::Result<ClassNode> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn encode(&self, node: &ClassNode) -> anyhow::Result<Vec<u8>> {
        Ok(serde_json::to_vec(node)?)
    }
}

impl<T: ClassCodec + ?Sized> ClassCodec for std::sync::Arc<T> {
    fn decode(&self, bytes: &[u8]) -> anyhow::Result<ClassNode> {
        (**self).decode(bytes)
    }

    fn encode(&self, node: &ClassNode) -> anyhow::Result<Vec<u8>> {
        (**self).encode(node)
    }
}

/// Decode `bytes` for entry `entry`, wrapping codec failures
pub fn decode_class(codec: &dyn ClassCodec, entry: &str, bytes: &[u8]) -> Result<ClassNode> {
    codec.decode(bytes).map_err(|e| ForgeError::class_format(entry, format!("{e:#}")))
}

pub fn encode_class(codec: &dyn ClassCodec, node: &ClassNode) -> Result<Vec<u8>> {
    codec.encode(node).map_err(|e| ForgeError::class_format(&node.name, format!("{e:#}")))
}
