#![forbid(unsafe_code)]

//! Node kinds, per-node state flags, and attribute-change kinds.
//!
//! Sources report a raw [`TypeTag`] per node. The engine never inspects the
//! external node to learn what it is; it resolves the tag through a
//! [`KindRegistry`] into the closed [`NodeKind`] enum.

use std::collections::HashMap;

use bitflags::bitflags;

/// Raw type discriminator reported by a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct TypeTag(pub u32);

impl TypeTag {
    /// First tag reserved for application-defined node types.
    pub const USER_TYPE: u32 = 65536;

    pub const BASIC: Self = Self(0);
    pub const GEOMETRY: Self = Self(1);
    pub const TRANSFORM: Self = Self(2);
    pub const CLIP: Self = Self(3);
    pub const OPACITY: Self = Self(4);
    pub const ROOT: Self = Self(5);
    pub const RENDER: Self = Self(6);
    pub const ITEM: Self = Self(7);
}

/// Known kinds of mirrored nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Plain grouping node.
    Basic,
    /// Node carrying geometry and a material.
    Geometry,
    /// Node applying a transform to its subtree.
    Transform,
    /// Node clipping its subtree.
    Clip,
    /// Node applying opacity to its subtree.
    Opacity,
    /// Scene root node.
    Root,
    /// Node rendered by custom code.
    Render,
    /// Visual item of an item hierarchy.
    Item,
    /// Tag with no registered kind.
    Unknown(u32),
}

impl NodeKind {
    /// Default display name.
    #[must_use]
    pub fn name(self) -> String {
        match self {
            Self::Basic => "Node".to_string(),
            Self::Geometry => "Geometry Node".to_string(),
            Self::Transform => "Transform Node".to_string(),
            Self::Clip => "Clip Node".to_string(),
            Self::Opacity => "Opacity Node".to_string(),
            Self::Root => "Root Node".to_string(),
            Self::Render => "Render Node".to_string(),
            Self::Item => "Item".to_string(),
            Self::Unknown(tag) if tag == TypeTag::USER_TYPE => "UserType".to_string(),
            Self::Unknown(tag) if tag > TypeTag::USER_TYPE => {
                format!("UserType + {}", tag - TypeTag::USER_TYPE)
            }
            Self::Unknown(tag) => tag.to_string(),
        }
    }
}

/// Capability table resolving raw tags to kinds and display names.
#[derive(Debug, Clone)]
pub struct KindRegistry {
    kinds: HashMap<TypeTag, (NodeKind, String)>,
}

impl Default for KindRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        for (tag, kind) in [
            (TypeTag::BASIC, NodeKind::Basic),
            (TypeTag::GEOMETRY, NodeKind::Geometry),
            (TypeTag::TRANSFORM, NodeKind::Transform),
            (TypeTag::CLIP, NodeKind::Clip),
            (TypeTag::OPACITY, NodeKind::Opacity),
            (TypeTag::ROOT, NodeKind::Root),
            (TypeTag::RENDER, NodeKind::Render),
            (TypeTag::ITEM, NodeKind::Item),
        ] {
            registry.register(tag, kind, kind.name());
        }
        registry
    }
}

impl KindRegistry {
    /// Registry with no entries; every tag resolves to `Unknown`.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            kinds: HashMap::new(),
        }
    }

    /// Register (or replace) the kind and display name for a tag.
    pub fn register(&mut self, tag: TypeTag, kind: NodeKind, name: impl Into<String>) {
        self.kinds.insert(tag, (kind, name.into()));
    }

    /// Builder-style [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, tag: TypeTag, kind: NodeKind, name: impl Into<String>) -> Self {
        self.register(tag, kind, name);
        self
    }

    /// Resolve a tag to its kind.
    #[must_use]
    pub fn resolve(&self, tag: TypeTag) -> NodeKind {
        self.kinds
            .get(&tag)
            .map(|(kind, _)| *kind)
            .unwrap_or(NodeKind::Unknown(tag.0))
    }

    /// Display name for a tag.
    #[must_use]
    pub fn type_name(&self, tag: TypeTag) -> String {
        match self.kinds.get(&tag) {
            Some((_, name)) => name.clone(),
            None => NodeKind::Unknown(tag.0).name(),
        }
    }
}

bitflags! {
    /// State flags a source reports for a node.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct NodeFlags: u8 {
        const INVISIBLE           = 0b0000_0001;
        const ZERO_SIZE           = 0b0000_0010;
        const OUT_OF_VIEW         = 0b0000_0100;
        const HAS_FOCUS           = 0b0000_1000;
        const HAS_ACTIVE_FOCUS    = 0b0001_0000;
        const JUST_RECEIVED_EVENT = 0b0010_0000;
    }
}

impl NodeFlags {
    /// Whether a consumer should render the node as greyed out.
    #[must_use]
    pub fn is_dimmed(self) -> bool {
        self.intersects(Self::INVISIBLE | Self::ZERO_SIZE)
    }
}

bitflags! {
    /// Kinds of non-structural attribute changes batched by the coalescer.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AttributeKinds: u16 {
        const VISIBILITY = 1 << 0;
        const SIZE       = 1 << 1;
        const POSITION   = 1 << 2;
        const FOCUS      = 1 << 3;
        const OPACITY    = 1 << 4;
        const EVENT      = 1 << 5;
        const LABEL      = 1 << 6;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_resolves_builtin_tags() {
        let registry = KindRegistry::default();
        assert_eq!(registry.resolve(TypeTag::GEOMETRY), NodeKind::Geometry);
        assert_eq!(registry.type_name(TypeTag::TRANSFORM), "Transform Node");
        assert_eq!(registry.resolve(TypeTag::ITEM), NodeKind::Item);
    }

    #[test]
    fn unregistered_tags_are_unknown() {
        let registry = KindRegistry::default();
        assert_eq!(registry.resolve(TypeTag(42)), NodeKind::Unknown(42));
        assert_eq!(registry.type_name(TypeTag(42)), "42");
        assert_eq!(
            registry.type_name(TypeTag(TypeTag::USER_TYPE)),
            "UserType"
        );
        assert_eq!(
            registry.type_name(TypeTag(TypeTag::USER_TYPE + 3)),
            "UserType + 3"
        );
    }

    #[test]
    fn custom_registration_overrides_name() {
        let registry = KindRegistry::empty().with(TypeTag(900), NodeKind::Item, "Rectangle");
        assert_eq!(registry.resolve(TypeTag(900)), NodeKind::Item);
        assert_eq!(registry.type_name(TypeTag(900)), "Rectangle");
        assert_eq!(registry.resolve(TypeTag::BASIC), NodeKind::Unknown(0));
    }

    #[test]
    fn dimmed_flags() {
        assert!(NodeFlags::INVISIBLE.is_dimmed());
        assert!((NodeFlags::ZERO_SIZE | NodeFlags::HAS_FOCUS).is_dimmed());
        assert!(!NodeFlags::OUT_OF_VIEW.is_dimmed());
    }
}
