use std::any::Any;
use std::sync::Arc;

use indexmap::IndexMap;
use once_cell::sync::OnceCell;
use parser::Pos;
use value::{ConstValue, Name};

use crate::response::PathSegment;

/// The field a path node was created for.
#[derive(Debug)]
pub struct FieldInfo {
    pub alias: Name,
    pub name: Name,
    /// The object type that declares the field.
    pub object: &'static str,
    /// `false` for fields served directly from the parent value.
    pub is_resolver: bool,
    pub arguments: IndexMap<Name, ConstValue>,
    pub pos: Pos,
}

#[derive(Debug)]
pub enum Segment {
    Field(FieldInfo),
    Index(usize),
}

/// A node in the parent-linked chain describing where a value lives in the
/// response.
///
/// Nodes are immutable once linked; many children may share one parent.
pub struct PathNode {
    parent: Option<Arc<PathNode>>,
    segment: Segment,
    result: OnceCell<Arc<dyn Any + Send + Sync>>,
}

impl PathNode {
    pub fn field(parent: Option<Arc<PathNode>>, info: FieldInfo) -> Arc<Self> {
        Arc::new(Self {
            parent,
            segment: Segment::Field(info),
            result: OnceCell::new(),
        })
    }

    pub fn index(parent: Option<Arc<PathNode>>, idx: usize) -> Arc<Self> {
        Arc::new(Self {
            parent,
            segment: Segment::Index(idx),
            result: OnceCell::new(),
        })
    }

    pub fn parent(&self) -> Option<&Arc<PathNode>> {
        self.parent.as_ref()
    }

    pub fn segment(&self) -> &Segment {
        &self.segment
    }

    /// The nearest field at or above this node.
    pub fn field_info(&self) -> Option<&FieldInfo> {
        let mut node = Some(self);
        while let Some(current) = node {
            if let Segment::Field(info) = &current.segment {
                return Some(info);
            }
            node = current.parent.as_deref();
        }
        None
    }

    pub fn path(&self) -> Vec<PathSegment> {
        let mut segments = Vec::new();
        let mut node = Some(self);
        while let Some(current) = node {
            segments.push(match &current.segment {
                Segment::Field(info) => PathSegment::Field(info.alias.clone()),
                Segment::Index(idx) => PathSegment::Index(*idx),
            });
            node = current.parent.as_deref();
        }
        segments.reverse();
        segments
    }

    /// Store the resolver's raw result. Only the first call has an effect.
    pub fn set_result<T: Any + Send + Sync>(&self, result: T) -> bool {
        self.result.set(Arc::new(result)).is_ok()
    }

    pub fn result<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.result.get().and_then(|result| result.downcast_ref::<T>())
    }
}
