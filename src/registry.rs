//! Function registries and hydration entry points
//!
//! A [`Registry`] owns every named transform, terminal constructor and
//! type-directed constructor an annotation can refer to, plus a cache of
//! compiled plans. Registration needs `&mut Registry` and hydration `&Registry`,
//! so a registry cannot change while a hydration run is using it.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::io::Read;
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;
use scraper::Html;

use crate::builtins;
use crate::document::{parse_document, Selection};
use crate::error::{BoxError, CompileError, Error};
use crate::hydrate::{Hydrate, Kind};
use crate::plan::{compile, Plan};

/// String to string transform: `(text, arg) -> text`.
pub type TransformFn = Arc<dyn Fn(&str, &str) -> Result<String, BoxError> + Send + Sync>;

/// Named constructor ending a pipeline: `(context, text, arg) -> value`.
pub type TerminalFn =
    Arc<dyn Fn(&Selection<'_>, &str, &str) -> Result<Box<dyn Any>, BoxError> + Send + Sync>;

/// Constructor selected by the declared type of a field: `(context, text) -> value`.
pub type TypeConstructorFn =
    Arc<dyn Fn(&Selection<'_>, &str) -> Result<Box<dyn Any>, BoxError> + Send + Sync>;

type CachedPlan = Result<Option<Arc<Plan>>, CompileError>;

static BUILTINS: Lazy<Registry> = Lazy::new(Registry::new);

#[derive(Clone)]
pub(crate) struct TypeConstructor {
    pub(crate) type_name: &'static str,
    pub(crate) func: TypeConstructorFn,
}

pub struct Registry {
    transforms: HashMap<String, TransformFn>,
    terminals: HashMap<String, TerminalFn>,
    constructors: HashMap<TypeId, TypeConstructor>,
    plans: RwLock<HashMap<String, CachedPlan>>,
}

impl Registry {
    /// Registry holding the built-in transforms, terminals and type constructors.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        builtins::register(&mut registry);
        registry
    }

    /// Registry with nothing registered.
    pub fn empty() -> Self {
        Self {
            transforms: HashMap::new(),
            terminals: HashMap::new(),
            constructors: HashMap::new(),
            plans: RwLock::new(HashMap::new()),
        }
    }

    /// The shared registry of built-ins used by [`crate::scrape`].
    pub fn builtin() -> &'static Registry {
        &BUILTINS
    }

    /// Register (or replace) a transform usable as `name` or `name(arg)`.
    pub fn register_transform<F, E>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&str, &str) -> Result<String, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        let name = name.into();
        tracing::debug!(name = %name, "registering transform");
        let func: TransformFn = Arc::new(move |text: &str, arg: &str| {
            f(text, arg).map_err(Into::<BoxError>::into)
        });
        self.transforms.insert(name, func);
        self.invalidate();
        self
    }

    /// Register (or replace) a terminal constructor producing `T`.
    pub fn register_terminal<T, F, E>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        T: 'static,
        F: Fn(&Selection<'_>, &str, &str) -> Result<T, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        let name = name.into();
        tracing::debug!(name = %name, output = std::any::type_name::<T>(), "registering terminal");
        let func: TerminalFn = Arc::new(move |sel: &Selection<'_>, text: &str, arg: &str| {
            f(sel, text, arg)
                .map(|value| Box::new(value) as Box<dyn Any>)
                .map_err(Into::<BoxError>::into)
        });
        self.terminals.insert(name, func);
        self.invalidate();
        self
    }

    /// Register (or replace) the constructor used for every field declared as `T`.
    pub fn register_type<T, F, E>(&mut self, f: F) -> &mut Self
    where
        T: 'static,
        F: Fn(&Selection<'_>, &str) -> Result<T, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        let type_name = std::any::type_name::<T>();
        tracing::debug!(type_name, "registering type constructor");
        let func: TypeConstructorFn = Arc::new(move |sel: &Selection<'_>, text: &str| {
            f(sel, text)
                .map(|value| Box::new(value) as Box<dyn Any>)
                .map_err(Into::<BoxError>::into)
        });
        self.constructors
            .insert(TypeId::of::<T>(), TypeConstructor { type_name, func });
        self
    }

    pub fn transform(&self, name: &str) -> Option<&TransformFn> {
        self.transforms.get(name)
    }

    pub fn terminal(&self, name: &str) -> Option<&TerminalFn> {
        self.terminals.get(name)
    }

    pub(crate) fn type_constructor<T: 'static>(&self) -> Option<&TypeConstructor> {
        self.constructors.get(&TypeId::of::<T>())
    }

    /// Compiled plan for `annotation`, cached per registry.
    pub fn plan(&self, annotation: &str) -> CachedPlan {
        if let Ok(cache) = self.plans.read() {
            if let Some(cached) = cache.get(annotation) {
                return cached.clone();
            }
        }

        let compiled = compile(annotation, self).map(|plan| plan.map(Arc::new));
        if let Ok(mut cache) = self.plans.write() {
            cache.insert(annotation.to_string(), compiled.clone());
        }
        compiled
    }

    fn invalidate(&mut self) {
        match self.plans.get_mut() {
            Ok(plans) => plans.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }

    /// Read a document from `reader` and hydrate `target` from it.
    ///
    /// `target` must be a composite schema; anything else yields a single
    /// `InvalidTarget` error without touching the reader.
    pub fn scrape<T: Hydrate, R: Read>(&self, target: &mut T, reader: R) -> Vec<Error> {
        if let Some(err) = check_target::<T>() {
            return vec![err];
        }

        let document = match parse_document(reader) {
            Ok(document) => document,
            Err(err) => return vec![Error::Read(err)],
        };

        self.hydrate(target, &document)
    }

    /// Hydrate `target` from an already parsed document.
    pub fn hydrate<T: Hydrate>(&self, target: &mut T, document: &Html) -> Vec<Error> {
        if let Some(err) = check_target::<T>() {
            return vec![err];
        }

        let type_name = std::any::type_name::<T>();
        tracing::debug!(type_name, "hydrating");

        let errors = target.hydrate(&Selection::root(document), None, self);

        tracing::debug!(type_name, errors = errors.len(), "hydrated");
        errors
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut transforms: Vec<_> = self.transforms.keys().collect();
        transforms.sort();
        let mut terminals: Vec<_> = self.terminals.keys().collect();
        terminals.sort();
        let mut types: Vec<_> = self.constructors.values().map(|c| c.type_name).collect();
        types.sort();

        f.debug_struct("Registry")
            .field("transforms", &transforms)
            .field("terminals", &terminals)
            .field("types", &types)
            .finish()
    }
}

fn check_target<T: Hydrate>() -> Option<Error> {
    (T::kind() != Kind::Composite).then(|| Error::InvalidTarget {
        type_name: std::any::type_name::<T>(),
    })
}

/// Hydrate `target` from `reader` using the built-in registry.
pub fn scrape<T: Hydrate, R: Read>(target: &mut T, reader: R) -> Vec<Error> {
    Registry::builtin().scrape(target, reader)
}
