//! Model registry: name and id to category and constructor.

use crate::{Element, RegistryError};
use gridkernel_types::{Category, ModelId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Constructor for fresh element instances.
pub type ElementFactory = Arc<dyn Fn() -> Box<dyn Element> + Send + Sync>;

/// A registered model.
#[derive(Clone)]
pub struct ModelEntry {
    id: ModelId,
    name: String,
    category: Category,
    factory: ElementFactory,
}

impl ModelEntry {
    pub fn id(&self) -> ModelId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> Category {
        self.category
    }

    /// Construct a new instance with the model's defaults.
    pub fn instantiate(&self) -> Box<dyn Element> {
        (self.factory)()
    }
}

impl fmt::Debug for ModelEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelEntry")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("category", &self.category)
            .finish_non_exhaustive()
    }
}

/// Models known to a registry, in registration order.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    by_name: HashMap<String, ModelId>,
    entries: Vec<ModelEntry>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model built by `factory`. Ids are handed out in order from 0.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        category: Category,
        factory: impl Fn() -> Box<dyn Element> + Send + Sync + 'static,
    ) -> Result<ModelId, RegistryError> {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return Err(RegistryError::DuplicateModel(name));
        }
        let id = ModelId(self.entries.len() as u32);
        self.by_name.insert(name.clone(), id);
        self.entries.push(ModelEntry {
            id,
            name,
            category,
            factory: Arc::new(factory),
        });
        Ok(id)
    }

    /// Register a model whose instances are copies of `prototype`.
    pub fn register_prototype<E>(
        &mut self,
        name: impl Into<String>,
        category: Category,
        prototype: E,
    ) -> Result<ModelId, RegistryError>
    where
        E: Element + Clone,
    {
        self.register(name, category, move || -> Box<dyn Element> {
            Box::new(prototype.clone())
        })
    }

    pub fn lookup(&self, name: &str) -> Result<ModelId, RegistryError> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| RegistryError::UnknownModel(name.to_string()))
    }

    pub fn get(&self, id: ModelId) -> Result<&ModelEntry, RegistryError> {
        self.entries
            .get(id.0 as usize)
            .ok_or(RegistryError::UnknownModelId(id))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelEntry> {
        self.entries.iter()
    }
}
