//! Type catalogue for structured object materialization.
//!
//! Rules refer to target types by name. A type becomes available by
//! implementing [`Structured`] and being registered in a [`TypeCatalogue`],
//! either under its automatic snake-case name or under an explicit one.
//! Construction goes through serde, and post-construction calls go through
//! the type's [`MethodTable`], so no reflection is involved.

use std::collections::HashMap;
use std::fmt;

use convert_case::{Case, Casing};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use serde_reflection::{Tracer, TracerConfig};

use crate::error::{CatalogueError, ConvertError};
use crate::record::Record;

/// A named mutator: receives the instance and one mapping of arguments.
pub type Mutator<T> = fn(&mut T, Record) -> Result<(), String>;

/// Named mutators a structured type supports.
pub struct MethodTable<T> {
    methods: IndexMap<&'static str, Mutator<T>>,
}

impl<T> MethodTable<T> {
    pub fn new() -> Self {
        Self {
            methods: IndexMap::new(),
        }
    }

    /// Add a mutator under `name`.
    pub fn with(mut self, name: &'static str, mutator: Mutator<T>) -> Self {
        self.methods.insert(name, mutator);
        self
    }

    pub fn get(&self, name: &str) -> Option<Mutator<T>> {
        self.methods.get(name).copied()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.methods.keys().copied().collect()
    }
}

impl<T> Default for MethodTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Core trait for types that rules can materialize.
///
/// The type is built by deserializing the mapping produced by the
/// constructor rules (keys the type does not know are ignored) and is
/// flattened back by serializing it, which must give a mapping.
///
/// # Example
///
/// ```
/// use recast::{MethodTable, Record, Structured};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Product {
///     name: String,
///     #[serde(default)]
///     tags: Vec<String>,
/// }
///
/// fn add_tag(product: &mut Product, args: Record) -> Result<(), String> {
///     let tag = args.get("tag").and_then(|v| v.as_str()).ok_or("missing 'tag'")?;
///     product.tags.push(tag.to_string());
///     Ok(())
/// }
///
/// impl Structured for Product {
///     const NAME: &'static str = "Product";
///
///     fn methods() -> MethodTable<Self> {
///         MethodTable::new().with("add_tag", add_tag)
///     }
/// }
/// ```
pub trait Structured: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The name of this type; its snake-case form is the default catalogue key
    const NAME: &'static str;

    /// Mutators callable from `methods` rules
    fn methods() -> MethodTable<Self> {
        MethodTable::new()
    }
}

/// A constructed instance with its type erased.
pub trait Instance {
    /// Call mutator `method` with one argument mapping.
    fn invoke(&mut self, method: &str, arguments: Record) -> Result<(), ConvertError>;

    /// Serialize the instance back into an ordered mapping.
    fn flatten(&self) -> Result<Record, ConvertError>;
}

struct TypedInstance<T> {
    value: T,
    methods: MethodTable<T>,
}

impl<T: Structured> Instance for TypedInstance<T> {
    fn invoke(&mut self, method: &str, arguments: Record) -> Result<(), ConvertError> {
        let mutator = self.methods.get(method).ok_or_else(|| ConvertError::UnknownMethod {
            type_name: T::NAME.to_string(),
            method: method.to_string(),
        })?;

        mutator(&mut self.value, arguments).map_err(|reason| ConvertError::Invocation {
            type_name: T::NAME.to_string(),
            method: method.to_string(),
            reason,
        })
    }

    fn flatten(&self) -> Result<Record, ConvertError> {
        match serde_json::to_value(&self.value) {
            Ok(Value::Object(map)) => Ok(map),
            _ => Err(ConvertError::NotStructured {
                type_name: T::NAME.to_string(),
            }),
        }
    }
}

fn construct<T: Structured>(arguments: Record) -> Result<Box<dyn Instance>, ConvertError> {
    let value: T = serde_json::from_value(Value::Object(arguments)).map_err(|e| {
        ConvertError::Construction {
            type_name: T::NAME.to_string(),
            reason: e.to_string(),
        }
    })?;

    Ok(Box::new(TypedInstance {
        value,
        methods: T::methods(),
    }))
}

/// Check that `T` flattens to a mapping.
///
/// Sample values are traced from `T`'s `Deserialize` impl and serialized
/// back. Types the tracer cannot sample (e.g. ones holding untyped
/// `Value`s) are accepted and checked again when flattened.
fn check_structured<T: Structured>() -> Result<(), CatalogueError> {
    let mut tracer = Tracer::new(TracerConfig::default());
    let samples: Vec<T> = match tracer.trace_simple_type::<T>() {
        Ok((_, samples)) => samples,
        Err(e) => {
            tracing::debug!("Could not trace '{}' at registration: {}", T::NAME, e);
            return Ok(());
        }
    };

    let flattens = samples
        .iter()
        .all(|sample| matches!(serde_json::to_value(sample), Ok(Value::Object(_))));

    if flattens {
        Ok(())
    } else {
        Err(CatalogueError::NotStructured {
            type_name: T::NAME.to_string(),
        })
    }
}

/// Factory and capability table for one registered type.
#[derive(Clone)]
pub struct TypeDescriptor {
    type_name: &'static str,
    default_name: String,
    factory: fn(Record) -> Result<Box<dyn Instance>, ConvertError>,
    shape_check: fn() -> Result<(), CatalogueError>,
    method_names: Vec<&'static str>,
}

impl TypeDescriptor {
    /// Describe a structured type.
    pub fn of<T: Structured>() -> Self {
        Self {
            type_name: T::NAME,
            default_name: T::NAME.to_case(Case::Snake),
            factory: construct::<T>,
            shape_check: check_structured::<T>,
            method_names: T::methods().names(),
        }
    }

    /// The type's own name
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Catalogue key used by [`TypeCatalogue::register`]
    pub fn default_name(&self) -> &str {
        &self.default_name
    }

    pub fn method_names(&self) -> &[&'static str] {
        &self.method_names
    }

    /// Build an instance from constructor arguments.
    pub fn construct(&self, arguments: Record) -> Result<Box<dyn Instance>, ConvertError> {
        (self.factory)(arguments)
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("type_name", &self.type_name)
            .field("methods", &self.method_names)
            .finish()
    }
}

/// Registry of types available to object rules, keyed by name.
///
/// Fill it once at start-up, then share it read-only (e.g. in an `Arc`)
/// between engines.
#[derive(Debug, Default)]
pub struct TypeCatalogue {
    types: HashMap<String, TypeDescriptor>,
}

impl TypeCatalogue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` under the snake-case form of [`Structured::NAME`].
    ///
    /// # Errors
    /// [`CatalogueError::NotStructured`] when `T` does not flatten to a mapping.
    pub fn register<T: Structured>(&mut self) -> Result<(), CatalogueError> {
        let descriptor = TypeDescriptor::of::<T>();
        let name = descriptor.default_name.clone();
        self.insert(name, descriptor)
    }

    /// Register `T` under an explicit name.
    pub fn register_as<T: Structured>(
        &mut self,
        name: impl Into<String>,
    ) -> Result<(), CatalogueError> {
        self.insert(name.into(), TypeDescriptor::of::<T>())
    }

    /// Register several descriptors under their default names.
    pub fn register_many<I>(&mut self, descriptors: I) -> Result<(), CatalogueError>
    where
        I: IntoIterator<Item = TypeDescriptor>,
    {
        for descriptor in descriptors {
            let name = descriptor.default_name.clone();
            self.insert(name, descriptor)?;
        }
        Ok(())
    }

    /// Register several descriptors under explicit names.
    pub fn register_named<I, S>(&mut self, entries: I) -> Result<(), CatalogueError>
    where
        I: IntoIterator<Item = (S, TypeDescriptor)>,
        S: Into<String>,
    {
        for (name, descriptor) in entries {
            self.insert(name.into(), descriptor)?;
        }
        Ok(())
    }

    fn insert(&mut self, name: String, descriptor: TypeDescriptor) -> Result<(), CatalogueError> {
        if !is_valid_type_name(&name) {
            return Err(CatalogueError::InvalidTypeName { type_name: name });
        }
        (descriptor.shape_check)()?;

        if let Some(previous) = self.types.get(&name) {
            tracing::warn!(
                "Type name '{}' already registered for {}, replacing with {}",
                name,
                previous.type_name,
                descriptor.type_name
            );
        }

        tracing::debug!("Registered type '{}' as '{}'", descriptor.type_name, name);
        self.types.insert(name, descriptor);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&TypeDescriptor> {
        self.types.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.types.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Identifier-like: letters, digits and `_`, not starting with a digit.
fn is_valid_type_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' => {
            chars.all(|c| c.is_alphanumeric() || c == '_')
        }
        _ => false,
    }
}
