//! Type Registry
//!
//! Process-wide table binding record kind names to their schemas and type
//! descriptors to handlers. The table is append-only and lazily populated;
//! primitive handlers are installed when it is first created. Resolution is
//! memoized per descriptor.

use crate::codec::attribute::AttributeHandler;
use crate::codec::collection;
use crate::codec::record::{OptionalHandler, RecordHandler};
use crate::codec::ArrayHandler;
use crate::error::{Result, StoreError};
use crate::store::Node;
use crate::types::{RecordValue, TypeDescriptor, TypeKind, Value};
use parking_lot::RwLock;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// Codec bound to one type descriptor
pub trait Handler: Send + Sync {
    fn descriptor(&self) -> &TypeDescriptor;
    fn kind(&self) -> TypeKind;
    fn write(&self, node: &Node, key: &str, value: &Value) -> Result<()>;
    fn read(&self, node: &Node, key: &str) -> Result<Value>;
    /// Whether anything is stored for `key` under `node`
    fn exists(&self, node: &Node, key: &str) -> Result<bool>;
}

pub type HandlerFactory = Arc<dyn Fn(&TypeDescriptor) -> Result<Arc<dyn Handler>> + Send + Sync>;

/// What an absent field reads back as
#[derive(Debug, Clone, PartialEq)]
pub enum FieldDefault {
    /// The descriptor's zero value
    Zero,
    Value(Value),
    /// No default; absence is an error
    Required,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    /// Attribute or child name the field is stored under
    pub storage_key: String,
    pub ty: TypeDescriptor,
    pub default: FieldDefault,
}

/// Field table for one record kind
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSchema {
    pub kind: String,
    pub parent: Option<String>,
    fields: Vec<FieldSpec>,
}

impl RecordSchema {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            parent: None,
            fields: Vec::new(),
        }
    }

    /// Declare this kind a subtype of `parent`; the parent's fields come first
    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Add a field. Nested records are required, optionals default to absent,
    /// everything else defaults to its zero value.
    pub fn field(self, name: &str, ty: TypeDescriptor) -> Self {
        let default = match ty {
            TypeDescriptor::Record(_) => FieldDefault::Required,
            TypeDescriptor::Optional(_) => FieldDefault::Value(Value::Absent),
            _ => FieldDefault::Zero,
        };
        self.push(name, name, ty, default)
    }

    pub fn field_with_default(self, name: &str, ty: TypeDescriptor, default: impl Into<Value>) -> Self {
        self.push(name, name, ty, FieldDefault::Value(default.into()))
    }

    pub fn required(self, name: &str, ty: TypeDescriptor) -> Self {
        self.push(name, name, ty, FieldDefault::Required)
    }

    /// Store the most recently added field under a different key
    pub fn stored_as(mut self, storage_key: &str) -> Self {
        if let Some(last) = self.fields.last_mut() {
            last.storage_key = storage_key.to_string();
        }
        self
    }

    fn push(mut self, name: &str, key: &str, ty: TypeDescriptor, default: FieldDefault) -> Self {
        self.fields.push(FieldSpec {
            name: name.to_string(),
            storage_key: key.to_string(),
            ty,
            default,
        });
        self
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field_spec(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A typed struct persisted as a record of kind `KIND`
pub trait Record: Sized + 'static {
    const KIND: &'static str;

    fn schema() -> RecordSchema;

    fn to_record(&self) -> RecordValue;

    fn from_record(record: RecordValue) -> Result<Self>;

    /// Register parent and nested record kinds this kind refers to
    fn register_dependencies() -> Result<()> {
        Ok(())
    }

    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::record(Self::KIND)
    }
}

pub struct TypeRegistry {
    /// Flattened schemas (inherited fields included), by kind name
    schemas: HashMap<String, Arc<RecordSchema>>,
    /// Declared (unflattened) schemas, for idempotent re-registration
    declared: HashMap<String, RecordSchema>,
    rust_types: HashMap<TypeId, String>,
    kinds_to_types: HashMap<String, TypeId>,
    factories: HashMap<TypeDescriptor, HandlerFactory>,
    cache: HashMap<TypeDescriptor, Arc<dyn Handler>>,
}

impl TypeRegistry {
    fn with_primitives() -> Self {
        let mut registry = Self {
            schemas: HashMap::new(),
            declared: HashMap::new(),
            rust_types: HashMap::new(),
            kinds_to_types: HashMap::new(),
            factories: HashMap::new(),
            cache: HashMap::new(),
        };
        for ty in [
            TypeDescriptor::Bool,
            TypeDescriptor::Int,
            TypeDescriptor::Float,
            TypeDescriptor::Str,
            TypeDescriptor::Bytes,
            TypeDescriptor::DateTime,
            TypeDescriptor::Duration,
        ] {
            registry
                .cache
                .insert(ty.clone(), Arc::new(AttributeHandler::new(ty)));
        }
        registry
    }

    fn register_schema(&mut self, schema: RecordSchema) -> Result<()> {
        if let Some(existing) = self.declared.get(&schema.kind) {
            if *existing == schema {
                return Ok(());
            }
            return Err(StoreError::DuplicateType(format!(
                "record kind '{}' already registered with a different schema",
                schema.kind
            )));
        }

        let mut flattened = match &schema.parent {
            Some(parent) => {
                let parent_schema = self.schemas.get(parent).ok_or_else(|| {
                    StoreError::UnregisteredType(format!(
                        "parent kind '{}' of '{}'",
                        parent, schema.kind
                    ))
                })?;
                parent_schema.fields.clone()
            }
            None => Vec::new(),
        };
        for field in schema.fields() {
            match flattened.iter_mut().find(|f| f.name == field.name) {
                Some(inherited) => *inherited = field.clone(),
                None => flattened.push(field.clone()),
            }
        }

        let mut keys = std::collections::HashSet::new();
        for field in &flattened {
            if field.storage_key == crate::codec::record::TYPE_ATTR || !keys.insert(&field.storage_key) {
                return Err(StoreError::DuplicateType(format!(
                    "storage key '{}' used twice in record kind '{}'",
                    field.storage_key, schema.kind
                )));
            }
        }

        tracing::debug!(kind = %schema.kind, fields = flattened.len(), "registered record kind");
        self.schemas.insert(
            schema.kind.clone(),
            Arc::new(RecordSchema {
                kind: schema.kind.clone(),
                parent: schema.parent.clone(),
                fields: flattened,
            }),
        );
        self.declared.insert(schema.kind.clone(), schema);
        Ok(())
    }

    /// Fails when either side of the `type_id` / `kind` pair is bound elsewhere
    fn check_rust_type(&self, type_id: TypeId, type_name: &str, kind: &str) -> Result<()> {
        match (self.rust_types.get(&type_id), self.kinds_to_types.get(kind)) {
            (Some(bound), _) if bound != kind => Err(StoreError::DuplicateType(format!(
                "{} is already registered as '{}'",
                type_name, bound
            ))),
            (_, Some(bound)) if *bound != type_id => Err(StoreError::DuplicateType(format!(
                "kind '{}' is already bound to another Rust type",
                kind
            ))),
            _ => Ok(()),
        }
    }

    fn bind_rust_type(&mut self, type_id: TypeId, kind: &str) {
        self.rust_types.insert(type_id, kind.to_string());
        self.kinds_to_types.insert(kind.to_string(), type_id);
    }
}

fn global() -> &'static RwLock<TypeRegistry> {
    static REGISTRY: OnceLock<RwLock<TypeRegistry>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(TypeRegistry::with_primitives()))
}

/// Register a typed record. Re-registering the same type and schema is a no-op.
pub fn register<T: Record>() -> Result<()> {
    let schema = T::schema();
    if schema.kind != T::KIND {
        return Err(StoreError::DuplicateType(format!(
            "{} declares kind '{}' but its schema names '{}'",
            std::any::type_name::<T>(),
            T::KIND,
            schema.kind
        )));
    }
    T::register_dependencies()?;
    let mut registry = global().write();
    registry.check_rust_type(TypeId::of::<T>(), std::any::type_name::<T>(), T::KIND)?;
    registry.register_schema(schema)?;
    registry.bind_rust_type(TypeId::of::<T>(), T::KIND);
    Ok(())
}

/// Register a schema that has no Rust type behind it (dynamic records)
pub fn register_schema(schema: RecordSchema) -> Result<()> {
    global().write().register_schema(schema)
}

/// Bind a custom handler factory to an exact descriptor
pub fn register_handler(descriptor: TypeDescriptor, factory: HandlerFactory) -> Result<()> {
    let mut registry = global().write();
    if registry.factories.contains_key(&descriptor) || registry.cache.contains_key(&descriptor) {
        return Err(StoreError::DuplicateType(format!(
            "a handler for '{}' is already registered",
            descriptor
        )));
    }
    registry.factories.insert(descriptor, factory);
    Ok(())
}

pub fn record_schema(kind: &str) -> Result<Arc<RecordSchema>> {
    global()
        .read()
        .schemas
        .get(kind)
        .cloned()
        .ok_or_else(|| StoreError::UnregisteredType(format!("record kind '{}'", kind)))
}

pub fn is_registered(kind: &str) -> bool {
    global().read().schemas.contains_key(kind)
}

/// Whether `kind` is `ancestor` or (transitively) extends it
pub fn is_subkind(kind: &str, ancestor: &str) -> bool {
    let registry = global().read();
    let mut current = Some(kind.to_string());
    while let Some(name) = current {
        if name == ancestor {
            return true;
        }
        current = registry.schemas.get(&name).and_then(|s| s.parent.clone());
    }
    false
}

/// Resolve the handler for a descriptor, building and caching it on first use
pub fn resolve(descriptor: &TypeDescriptor) -> Result<Arc<dyn Handler>> {
    let factory = {
        let registry = global().read();
        if let Some(handler) = registry.cache.get(descriptor) {
            return Ok(handler.clone());
        }
        registry.factories.get(descriptor).cloned()
    };

    let handler = match factory {
        Some(factory) => factory(descriptor)?,
        None => build_handler(descriptor)?,
    };

    let mut registry = global().write();
    Ok(registry
        .cache
        .entry(descriptor.clone())
        .or_insert(handler)
        .clone())
}

fn build_handler(descriptor: &TypeDescriptor) -> Result<Arc<dyn Handler>> {
    let handler: Arc<dyn Handler> = match descriptor {
        TypeDescriptor::Array(elem) => Arc::new(ArrayHandler::new(*elem)),
        TypeDescriptor::Record(kind) => {
            if !is_registered(kind) {
                return Err(StoreError::UnregisteredType(format!("record kind '{}'", kind)));
            }
            Arc::new(RecordHandler::new(kind.clone()))
        }
        TypeDescriptor::Optional(inner) => Arc::new(OptionalHandler::new(resolve(inner)?)),
        TypeDescriptor::List(_) | TypeDescriptor::Map(_, _) => collection::select(descriptor)?,
        primitive => {
            return Err(StoreError::UnregisteredType(format!(
                "no handler for '{}'",
                primitive
            )))
        }
    };
    Ok(handler)
}
