//! # Object Type Registry
//!
//! Object types form a single-inheritance tree keyed by path
//! (`/obj/item/sword`). Each type declares variables with defaults; children
//! inherit their parent's layout and may override defaults.
//!
//! ## Finalization
//!
//! ```text
//! register(...)   register(...)   ...
//!        \              |            /
//!                  finalize()
//!   1. every declared parent exists
//!   2. no parent chain loops (DFS with recursion stack)
//!   3. layouts computed root-first:
//!        [ builtins 0..10 | parent vars | own new vars ]
//! ```
//!
//! After `finalize` the registry is read-only and layouts are shared `Arc`s.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::value::Value;
use crate::error::{CoreError, CoreResult};

/// Hot variables with fixed indices in every layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BuiltinVar {
    /// Tile x.
    X = 0,
    /// Tile y.
    Y = 1,
    /// Z level.
    Z = 2,
    /// Icon reference.
    Icon = 3,
    /// Facing direction.
    Dir = 4,
    /// Draw layer.
    Layer = 5,
    /// Opacity, 0..=255.
    Alpha = 6,
    /// Tint color.
    Color = 7,
    /// Horizontal pixel offset.
    PixelX = 8,
    /// Vertical pixel offset.
    PixelY = 9,
}

impl BuiltinVar {
    /// Every built-in, in index order.
    pub const ALL: [Self; 10] = [
        Self::X,
        Self::Y,
        Self::Z,
        Self::Icon,
        Self::Dir,
        Self::Layer,
        Self::Alpha,
        Self::Color,
        Self::PixelX,
        Self::PixelY,
    ];

    /// Number of built-ins; the first non-builtin index.
    pub const COUNT: usize = Self::ALL.len();

    /// Fixed variable index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Script-visible name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::X => "x",
            Self::Y => "y",
            Self::Z => "z",
            Self::Icon => "icon",
            Self::Dir => "dir",
            Self::Layer => "layer",
            Self::Alpha => "alpha",
            Self::Color => "color",
            Self::PixelX => "pixel_x",
            Self::PixelY => "pixel_y",
        }
    }

    /// Looks a built-in up by name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.name() == name)
    }

    fn default_value(self) -> Value {
        match self {
            Self::Dir => Value::Num(2.0),
            Self::Alpha => Value::Num(255.0),
            Self::Icon | Self::Color => Value::Null,
            _ => Value::Num(0.0),
        }
    }
}

/// Registration input for one type.
#[derive(Clone, Debug)]
pub struct TypeDef {
    path: String,
    parent: Option<String>,
    vars: Vec<(String, Value)>,
}

impl TypeDef {
    /// A root type.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            parent: None,
            vars: Vec::new(),
        }
    }

    /// Sets the parent type path.
    #[must_use]
    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Declares a variable, or overrides an inherited default.
    #[must_use]
    pub fn var(mut self, name: impl Into<String>, default: impl Into<Value>) -> Self {
        self.vars.push((name.into(), default.into()));
        self
    }
}

/// Finalized variable layout for one type.
#[derive(Debug)]
pub struct ObjectType {
    path: String,
    parent: Option<String>,
    ancestors: Vec<String>,
    indices: HashMap<String, usize>,
    defaults: Arc<[Value]>,
}

impl ObjectType {
    /// Type path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Direct parent path.
    #[must_use]
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// Index of a variable in this layout.
    #[inline]
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.indices.get(name).copied()
    }

    /// Default values in index order.
    #[must_use]
    pub fn defaults(&self) -> &Arc<[Value]> {
        &self.defaults
    }

    /// Number of declared variables, built-ins included.
    #[must_use]
    pub fn var_count(&self) -> usize {
        self.defaults.len()
    }

    /// Whether this type is `path` or inherits from it.
    #[must_use]
    pub fn is_subtype_of(&self, path: &str) -> bool {
        self.path == path || self.ancestors.iter().any(|a| a == path)
    }
}

/// Registry of object types.
#[derive(Debug, Default)]
pub struct ObjectTypeRegistry {
    pending: HashMap<String, TypeDef>,
    finalized: Option<HashMap<String, Arc<ObjectType>>>,
}

impl ObjectTypeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a type definition.
    ///
    /// # Errors
    ///
    /// `AlreadyFinalized`, `DuplicateType`, or `DuplicateVariable` when the
    /// definition lists the same name twice.
    pub fn register(&mut self, def: TypeDef) -> CoreResult<()> {
        if self.finalized.is_some() {
            return Err(CoreError::AlreadyFinalized);
        }
        if self.pending.contains_key(&def.path) {
            return Err(CoreError::DuplicateType(def.path));
        }

        let mut seen = HashSet::new();
        for (name, _) in &def.vars {
            if !seen.insert(name.as_str()) {
                return Err(CoreError::DuplicateVariable {
                    path: def.path.clone(),
                    name: name.clone(),
                });
            }
        }

        self.pending.insert(def.path.clone(), def);
        Ok(())
    }

    /// Number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Checks if no types are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Whether [`finalize`](Self::finalize) has succeeded.
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.finalized.is_some()
    }

    /// Resolves parents and computes every layout.
    ///
    /// # Errors
    ///
    /// `UnknownParentType` for dangling parents, `CircularTypeParent` for
    /// loops. Both leave the registry unfinalized.
    pub fn finalize(&mut self) -> CoreResult<()> {
        if self.finalized.is_some() {
            return Err(CoreError::AlreadyFinalized);
        }

        let mut paths: Vec<&String> = self.pending.keys().collect();
        paths.sort();

        for path in &paths {
            if let Some(parent) = &self.pending[*path].parent {
                if !self.pending.contains_key(parent) {
                    return Err(CoreError::UnknownParentType {
                        path: (*path).clone(),
                        parent: parent.clone(),
                    });
                }
            }
        }

        if let Some(chain) = self.find_cycle(&paths) {
            tracing::error!(chain = %chain.join(" -> "), "circular type parent chain");
            return Err(CoreError::CircularTypeParent { chain });
        }

        let mut built: HashMap<String, Arc<ObjectType>> = HashMap::with_capacity(paths.len());
        for path in &paths {
            self.build(path, &mut built);
        }

        tracing::info!(types = built.len(), "object types finalized");
        self.finalized = Some(built);
        Ok(())
    }

    /// Walks each parent chain; every node has at most one outgoing edge, so
    /// the DFS degenerates to following `parent` links.
    fn find_cycle(&self, paths: &[&String]) -> Option<Vec<String>> {
        let mut done: HashSet<&str> = HashSet::new();

        for start in paths {
            let mut stack: Vec<&str> = Vec::new();
            let mut on_stack: HashSet<&str> = HashSet::new();
            let mut current = Some(start.as_str());

            while let Some(path) = current {
                if done.contains(path) {
                    break;
                }
                if !on_stack.insert(path) {
                    let begin = stack.iter().position(|p| *p == path).unwrap_or(0);
                    let mut chain: Vec<String> = stack[begin..].iter().map(|p| (*p).to_owned()).collect();
                    chain.push(path.to_owned());
                    return Some(chain);
                }
                stack.push(path);
                current = self.pending[path].parent.as_deref();
            }

            done.extend(stack);
        }
        None
    }

    fn build(&self, path: &str, built: &mut HashMap<String, Arc<ObjectType>>) -> Arc<ObjectType> {
        if let Some(ty) = built.get(path) {
            return Arc::clone(ty);
        }

        let def = &self.pending[path];
        let (mut names, mut defaults, ancestors) = match &def.parent {
            Some(parent) => {
                let parent_ty = self.build(parent, built);
                let mut ancestors = vec![parent.clone()];
                ancestors.extend(parent_ty.ancestors.iter().cloned());
                (parent_ty.indices.clone(), parent_ty.defaults.to_vec(), ancestors)
            }
            None => {
                let names = BuiltinVar::ALL
                    .iter()
                    .map(|b| (b.name().to_owned(), b.index()))
                    .collect();
                let defaults = BuiltinVar::ALL.iter().map(|b| b.default_value()).collect();
                (names, defaults, Vec::new())
            }
        };

        for (name, default) in &def.vars {
            if let Some(&index) = names.get(name) {
                defaults[index] = default.clone();
            } else {
                names.insert(name.clone(), defaults.len());
                defaults.push(default.clone());
            }
        }

        let ty = Arc::new(ObjectType {
            path: def.path.clone(),
            parent: def.parent.clone(),
            ancestors,
            indices: names,
            defaults: defaults.into(),
        });
        built.insert(def.path.clone(), Arc::clone(&ty));
        ty
    }

    /// Finalized layout of `path`.
    ///
    /// # Errors
    ///
    /// `NotFinalized` before [`finalize`](Self::finalize); `UnknownType` for
    /// unregistered paths.
    pub fn get(&self, path: &str) -> CoreResult<Arc<ObjectType>> {
        let types = self.finalized.as_ref().ok_or(CoreError::NotFinalized)?;
        types
            .get(path)
            .cloned()
            .ok_or_else(|| CoreError::UnknownType(path.to_owned()))
    }
}
