//! Process-wide registry of Portable class definitions.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::class_definition::UNSET_VERSION;
use super::{
    ClassDefinition, ClassDefinitionBuilder, ClassDefinitionWriter, FieldDefinition, FieldType,
    Portable, PortableFactory,
};
use crate::error::{Result, SerializationError};
use crate::serialization::{ByteOrder, DataInput, ObjectDataInput};

type ClassKey = (i32, i32, i32);

/// Deepest chain of nested portables that will be read or derived.
pub const MAX_PORTABLE_DEPTH: usize = 64;

/// Registry of class definitions keyed by (factory ID, class ID, version).
///
/// Safe to share between threads. Registration is insert-if-absent: a second
/// registration for a key succeeds only if it is structurally identical to
/// the first.
pub struct PortableContext {
    class_definitions: DashMap<ClassKey, Arc<ClassDefinition>>,
    factories: HashMap<i32, Arc<dyn PortableFactory>>,
    version: i32,
    byte_order: ByteOrder,
}

impl fmt::Debug for PortableContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut factory_ids: Vec<_> = self.factories.keys().collect();
        factory_ids.sort();
        f.debug_struct("PortableContext")
            .field("class_definitions", &self.class_definitions)
            .field("factory_ids", &factory_ids)
            .field("version", &self.version)
            .field("byte_order", &self.byte_order)
            .finish()
    }
}

impl PortableContext {
    /// Creates an empty registry.
    ///
    /// `version` is stamped on definitions registered without one and used
    /// for objects that do not declare a class version.
    pub fn new(version: i32, byte_order: ByteOrder) -> Self {
        Self {
            class_definitions: DashMap::new(),
            factories: HashMap::new(),
            version,
            byte_order,
        }
    }

    /// Adds factories. A later factory with the same ID replaces an earlier one.
    pub(crate) fn with_factories(
        mut self,
        factories: impl IntoIterator<Item = Arc<dyn PortableFactory>>,
    ) -> Self {
        self.factories.extend(
            factories
                .into_iter()
                .map(|factory| (factory.factory_id(), factory)),
        );
        self
    }

    /// Returns true if a factory is registered for `factory_id`.
    pub fn has_factory(&self, factory_id: i32) -> bool {
        self.factories.contains_key(&factory_id)
    }

    /// Creates an empty instance of (factory ID, class ID).
    pub(crate) fn create_instance(&self, factory_id: i32, class_id: i32) -> Result<Box<dyn Portable>> {
        let unknown = || SerializationError::UnknownFactory {
            factory_id,
            class_id,
        };
        let factory = self.factories.get(&factory_id).ok_or_else(unknown)?;
        let instance = factory.create(class_id).ok_or_else(unknown)?;
        if instance.factory_id() != factory_id || instance.class_id() != class_id {
            return Err(SerializationError::Serialization(format!(
                "factory {} created factory_id={}, class_id={} for class_id={}",
                factory_id,
                instance.factory_id(),
                instance.class_id(),
                class_id
            )));
        }
        Ok(instance)
    }

    /// Returns the version objects of (factory ID, class ID) are written with.
    ///
    /// Falls back to the default version when no factory can create the class.
    pub fn class_version(&self, factory_id: i32, class_id: i32) -> i32 {
        self.factories
            .get(&factory_id)
            .and_then(|factory| factory.create(class_id))
            .and_then(|instance| instance.class_version())
            .unwrap_or(self.version)
    }

    /// Returns the default portable version.
    pub fn version(&self) -> i32 {
        self.version
    }

    /// Returns the byte order of portable payloads.
    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    /// Returns the number of registered definitions.
    pub fn len(&self) -> usize {
        self.class_definitions.len()
    }

    /// Returns true if no definitions are registered.
    pub fn is_empty(&self) -> bool {
        self.class_definitions.is_empty()
    }

    /// Registers a class definition, stamping the default version if it has none.
    ///
    /// Returns the registered instance. Fails with
    /// [`SerializationError::ClassDefinitionConflict`] if a structurally
    /// different definition already holds the key.
    pub fn register_class_definition(
        &self,
        mut class_def: ClassDefinition,
    ) -> Result<Arc<ClassDefinition>> {
        class_def.set_version_if_not_set(self.version);
        let key = class_def.key();

        match self.class_definitions.entry(key) {
            Entry::Occupied(entry) => {
                if **entry.get() == class_def {
                    Ok(Arc::clone(entry.get()))
                } else {
                    Err(SerializationError::ClassDefinitionConflict {
                        factory_id: key.0,
                        class_id: key.1,
                        version: key.2,
                    })
                }
            }
            Entry::Vacant(entry) => {
                tracing::debug!(
                    factory_id = key.0,
                    class_id = key.1,
                    version = key.2,
                    fields = class_def.field_count(),
                    "registered class definition"
                );
                let class_def = Arc::new(class_def);
                entry.insert(Arc::clone(&class_def));
                Ok(class_def)
            }
        }
    }

    /// Looks up a registered class definition.
    pub fn lookup_class_definition(
        &self,
        factory_id: i32,
        class_id: i32,
        version: i32,
    ) -> Option<Arc<ClassDefinition>> {
        self.class_definitions
            .get(&(factory_id, class_id, version))
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Looks up a registered class definition, failing if it is missing.
    pub fn require_class_definition(
        &self,
        factory_id: i32,
        class_id: i32,
        version: i32,
    ) -> Result<Arc<ClassDefinition>> {
        self.lookup_class_definition(factory_id, class_id, version)
            .ok_or(SerializationError::UnknownClassDefinition {
                factory_id,
                class_id,
                version,
            })
    }

    /// Returns the definition used to write `portable`.
    ///
    /// When none is registered for the object's version, one is inferred by
    /// a dry-run of [`Portable::write_portable`] and registered.
    pub fn lookup_or_register_class_definition(
        &self,
        portable: &dyn Portable,
    ) -> Result<Arc<ClassDefinition>> {
        let factory_id = portable.factory_id();
        let class_id = portable.class_id();
        let version = portable.class_version().unwrap_or(self.version);

        if let Some(class_def) = self.lookup_class_definition(factory_id, class_id, version) {
            return Ok(class_def);
        }

        let mut writer = ClassDefinitionWriter::new(self, factory_id, class_id, version);
        portable.write_portable(&mut writer)?;
        self.register_class_definition(writer.build()?)
    }

    /// Returns the definition of a portable body read from a stream.
    ///
    /// A definition that was never registered is derived from the field
    /// headers embedded in the body. Derived definitions are registered unless
    /// they contain a null nested portable or an empty portable array, whose
    /// nested class version cannot be known.
    pub fn read_class_definition(
        &self,
        body: &[u8],
        factory_id: i32,
        class_id: i32,
        version: i32,
    ) -> Result<Arc<ClassDefinition>> {
        self.read_class_definition_at(body, factory_id, class_id, version, 0)
    }

    /// Same as [`read_class_definition`](Self::read_class_definition) for a
    /// body found `depth` portables deep.
    pub(crate) fn read_class_definition_at(
        &self,
        body: &[u8],
        factory_id: i32,
        class_id: i32,
        version: i32,
        depth: usize,
    ) -> Result<Arc<ClassDefinition>> {
        self.resolve_stream_definition(body, factory_id, class_id, version, depth)
            .map(|(class_def, _)| class_def)
    }

    fn resolve_stream_definition(
        &self,
        body: &[u8],
        factory_id: i32,
        class_id: i32,
        version: i32,
        depth: usize,
    ) -> Result<(Arc<ClassDefinition>, bool)> {
        if let Some(class_def) = self.lookup_class_definition(factory_id, class_id, version) {
            return Ok((class_def, true));
        }
        check_depth(depth)?;

        let (class_def, nested, mut complete) = self
            .parse_class_definition(body, factory_id, class_id, version)
            .map_err(|e| {
                tracing::debug!(
                    factory_id,
                    class_id,
                    version,
                    error = %e,
                    "cannot derive class definition from stream"
                );
                SerializationError::UnknownClassDefinition {
                    factory_id,
                    class_id,
                    version,
                }
            })?;

        for body in nested {
            let (_, nested_complete) = self.resolve_stream_definition(
                body.body,
                body.factory_id,
                body.class_id,
                body.version,
                depth + 1,
            )?;
            complete &= nested_complete;
        }

        tracing::debug!(
            factory_id,
            class_id,
            version,
            fields = class_def.field_count(),
            complete,
            "derived class definition from stream"
        );

        if complete {
            Ok((self.register_class_definition(class_def)?, true))
        } else {
            Ok((Arc::new(class_def), false))
        }
    }

    /// Reads the field headers of one body. Nested bodies are returned for
    /// the caller to resolve.
    fn parse_class_definition<'b>(
        &self,
        body: &'b [u8],
        factory_id: i32,
        class_id: i32,
        version: i32,
    ) -> Result<(ClassDefinition, Vec<NestedBody<'b>>, bool)> {
        let input = ObjectDataInput::with_byte_order(body, self.byte_order);
        let field_count = input.read_int_at(0)?;
        if field_count < 0 {
            return Err(SerializationError::Serialization(format!(
                "negative field count: {}",
                field_count
            )));
        }

        let mut builder = ClassDefinitionBuilder::with_version(factory_id, class_id, version);
        let mut nested = Vec::new();
        let mut complete = true;

        for index in 0..field_count as usize {
            let offset = input.read_int_at(offset_slot(index))?;
            let mut cursor = input.clone();
            cursor.seek(offset)?;
            let (name, field_type) = read_field_header(&mut cursor)?;

            let field = match field_type {
                FieldType::Portable | FieldType::PortableArray => {
                    let present = if field_type == FieldType::Portable {
                        !cursor.read_bool()?
                    } else {
                        cursor.read_int()? > 0
                    };
                    let nested_factory = cursor.read_int()?;
                    let nested_class = cursor.read_int()?;
                    let nested_version = if present {
                        let (nested_version, nested_body) = read_versioned_body(&mut cursor)?;
                        nested.push(NestedBody {
                            factory_id: nested_factory,
                            class_id: nested_class,
                            version: nested_version,
                            body: nested_body,
                        });
                        nested_version
                    } else {
                        complete = false;
                        UNSET_VERSION
                    };
                    FieldDefinition::new_nested(
                        index,
                        name,
                        field_type,
                        nested_factory,
                        nested_class,
                        nested_version,
                    )
                }
                _ => FieldDefinition::new(index, name, field_type),
            };
            builder = builder.add_field_definition(field);
        }

        Ok((builder.build()?, nested, complete))
    }
}

struct NestedBody<'b> {
    factory_id: i32,
    class_id: i32,
    version: i32,
    body: &'b [u8],
}

/// Fails once `depth` nested portables exceed [`MAX_PORTABLE_DEPTH`].
pub(crate) fn check_depth(depth: usize) -> Result<()> {
    if depth > MAX_PORTABLE_DEPTH {
        return Err(SerializationError::Serialization(format!(
            "portable nesting exceeds {} levels",
            MAX_PORTABLE_DEPTH
        )));
    }
    Ok(())
}

/// Position of the offset-table slot for field `index` within a body.
pub(crate) fn offset_slot(index: usize) -> usize {
    4 + index * 4
}

/// Reads a `[nameLength:i16][name][typeId:i8]` field header.
pub(crate) fn read_field_header(input: &mut ObjectDataInput<'_>) -> Result<(String, FieldType)> {
    let name_len = input.read_short()?;
    let name_len = usize::try_from(name_len).map_err(|_| {
        SerializationError::Serialization(format!("negative field name length: {}", name_len))
    })?;
    let name = std::str::from_utf8(input.read_slice(name_len)?)
        .map_err(|e| SerializationError::Serialization(format!("invalid field name: {}", e)))?
        .to_string();
    let field_type = FieldType::from_id(input.read_byte()?)?;
    Ok((name, field_type))
}

/// Reads a `[version:i32][length:i32][body]` nested portable and borrows its body.
pub(crate) fn read_versioned_body<'a>(input: &mut ObjectDataInput<'a>) -> Result<(i32, &'a [u8])> {
    let version = input.read_int()?;
    let len = input.read_int()?;
    let len = usize::try_from(len).map_err(|_| {
        SerializationError::Serialization(format!("negative portable length: {}", len))
    })?;
    Ok((version, input.read_slice(len)?))
}
