use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

use crate::types::{BackendName, ToolDescriptor};

/// A tool name claimed by more than one backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadowedTool {
    pub tool: String,
    /// Backend whose definition is hidden
    pub hidden: BackendName,
    /// Backend whose definition is served
    pub winner: BackendName,
}

/// Immutable aggregated view of every healthy backend's tools.
///
/// Never mutated after construction; a refresh builds a new one.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tools: BTreeMap<String, ToolDescriptor>,
    shadowed: Vec<ShadowedTool>,
}

impl Catalog {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Merge per-backend tool lists given in registration order.
    /// When a name repeats, the later backend wins.
    pub fn build<I>(contributions: I) -> Self
    where
        I: IntoIterator<Item = (BackendName, Vec<ToolDescriptor>)>,
    {
        let mut tools: BTreeMap<String, ToolDescriptor> = BTreeMap::new();
        let mut shadowed = Vec::new();

        for (backend, descriptors) in contributions {
            for descriptor in descriptors {
                if let Some(previous) = tools.get(&descriptor.name) {
                    warn!(
                        tool = %descriptor.name,
                        hidden = %previous.backend,
                        winner = %backend,
                        "Tool name provided by several backends, later registration wins"
                    );
                    shadowed.push(ShadowedTool {
                        tool: descriptor.name.clone(),
                        hidden: previous.backend.clone(),
                        winner: backend.clone(),
                    });
                }
                tools.insert(descriptor.name.clone(), descriptor);
            }
        }

        Self { tools, shadowed }
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name)
    }

    /// Every served tool, ordered by name
    pub fn tools(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.tools.values()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn shadowed(&self) -> &[ShadowedTool] {
        &self.shadowed
    }

    /// Number of served tools owned by `backend`
    pub fn count_for(&self, backend: &BackendName) -> usize {
        self.tools.values().filter(|t| &t.backend == backend).count()
    }
}
