//! Memory tags used to attribute allocations for diagnostics.

use std::fmt;

/// What an allocation is used for.
///
/// Tags cost nothing at the allocator level; they only feed
/// [`MemoryStats`](super::MemoryStats).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum MemoryTag {
    /// Not classified. Using it logs a warning.
    Unknown,
    /// Fixed-size arrays.
    Array,
    /// Dynamic arrays.
    DArray,
    /// Hash tables.
    Hashtable,
    /// Dictionaries.
    Dict,
    /// Ring queues.
    RingQueue,
    /// Binary search trees.
    Bst,
    /// Strings.
    String,
    /// Application state.
    Application,
    /// Job system.
    Job,
    /// Textures.
    Texture,
    /// Material instances.
    MaterialInstance,
    /// Renderer.
    Renderer,
    /// Game code.
    Game,
    /// Transforms.
    Transform,
    /// Entities.
    Entity,
    /// Entity graph nodes.
    EntityNode,
    /// Loaded resources.
    Resource,
    /// Scenes.
    Scene,
}

impl MemoryTag {
    /// Number of tags.
    pub const COUNT: usize = 19;

    /// Every tag, in declaration order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::Unknown,
        Self::Array,
        Self::DArray,
        Self::Hashtable,
        Self::Dict,
        Self::RingQueue,
        Self::Bst,
        Self::String,
        Self::Application,
        Self::Job,
        Self::Texture,
        Self::MaterialInstance,
        Self::Renderer,
        Self::Game,
        Self::Transform,
        Self::Entity,
        Self::EntityNode,
        Self::Resource,
        Self::Scene,
    ];

    /// Position of the tag in [`MemoryTag::ALL`].
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Display name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Array => "Array",
            Self::DArray => "DArray",
            Self::Hashtable => "Hashtable",
            Self::Dict => "Dict",
            Self::RingQueue => "RingQueue",
            Self::Bst => "BST",
            Self::String => "String",
            Self::Application => "Application",
            Self::Job => "Job",
            Self::Texture => "Texture",
            Self::MaterialInstance => "MaterialInstance",
            Self::Renderer => "Renderer",
            Self::Game => "Game",
            Self::Transform => "Transform",
            Self::Entity => "Entity",
            Self::EntityNode => "EntityNode",
            Self::Resource => "Resource",
            Self::Scene => "Scene",
        }
    }
}

impl fmt::Display for MemoryTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
