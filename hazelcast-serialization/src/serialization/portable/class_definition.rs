//! Class definitions: the schema of one Portable (factory, class, version).

use std::collections::HashMap;

use super::FieldType;
use crate::error::{Result, SerializationError};

/// Version of a class definition that has not been stamped yet.
pub(crate) const UNSET_VERSION: i32 = -1;

/// Definition of a single field within a Portable class.
///
/// For `Portable` and `PortableArray` fields the factory ID, class ID and
/// version identify the nested class; for every other type they are zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDefinition {
    index: usize,
    name: String,
    field_type: FieldType,
    factory_id: i32,
    class_id: i32,
    version: i32,
}

impl FieldDefinition {
    /// Creates a field definition for a primitive, string or primitive array field.
    pub fn new(index: usize, name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            index,
            name: name.into(),
            field_type,
            factory_id: 0,
            class_id: 0,
            version: 0,
        }
    }

    /// Creates a field definition referencing a nested Portable class.
    pub fn new_nested(
        index: usize,
        name: impl Into<String>,
        field_type: FieldType,
        factory_id: i32,
        class_id: i32,
        version: i32,
    ) -> Self {
        Self {
            index,
            name: name.into(),
            field_type,
            factory_id,
            class_id,
            version,
        }
    }

    /// Returns the field's position in declaration order.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns the field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the field type.
    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    /// Returns the factory ID of a nested Portable field.
    pub fn factory_id(&self) -> i32 {
        self.factory_id
    }

    /// Returns the class ID of a nested Portable field.
    pub fn class_id(&self) -> i32 {
        self.class_id
    }

    /// Returns the class version of a nested Portable field.
    pub fn version(&self) -> i32 {
        self.version
    }
}

/// Definition of a Portable class schema.
///
/// Built through [`ClassDefinitionBuilder`] and immutable afterwards, apart
/// from the one-time version stamp applied on registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDefinition {
    factory_id: i32,
    class_id: i32,
    version: i32,
    fields: Vec<FieldDefinition>,
    field_indices: HashMap<String, usize>,
}

impl ClassDefinition {
    /// Returns the factory ID.
    pub fn factory_id(&self) -> i32 {
        self.factory_id
    }

    /// Returns the class ID.
    pub fn class_id(&self) -> i32 {
        self.class_id
    }

    /// Returns the schema version, or -1 if it has not been set.
    pub fn version(&self) -> i32 {
        self.version
    }

    /// Returns true once a version has been assigned.
    pub fn has_version(&self) -> bool {
        self.version != UNSET_VERSION
    }

    /// Assigns `version` unless a version is already present.
    ///
    /// Nested Portable fields without a version are stamped too.
    pub fn set_version_if_not_set(&mut self, version: i32) {
        if self.version == UNSET_VERSION {
            self.version = version;
        }
        for field in &mut self.fields {
            if field.field_type.is_portable() && field.version == UNSET_VERSION {
                field.version = version;
            }
        }
    }

    /// Returns the number of fields.
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Returns all field definitions in declaration order.
    pub fn fields(&self) -> &[FieldDefinition] {
        &self.fields
    }

    /// Looks up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.field_indices.get(name).map(|&i| &self.fields[i])
    }

    /// Looks up a field by declaration index.
    pub fn field_at(&self, index: usize) -> Option<&FieldDefinition> {
        self.fields.get(index)
    }

    /// Returns true if a field with the given name exists.
    pub fn has_field(&self, name: &str) -> bool {
        self.field_indices.contains_key(name)
    }

    /// Returns the type of the named field.
    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.field(name).map(FieldDefinition::field_type)
    }

    /// Returns the field names in declaration order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(FieldDefinition::name)
    }

    /// Returns the (factory, class, version) registry key.
    pub(crate) fn key(&self) -> (i32, i32, i32) {
        (self.factory_id, self.class_id, self.version)
    }
}

/// Accumulates fields and produces a [`ClassDefinition`].
///
/// Field indices follow the order of the `add_*` calls.
#[derive(Debug, Clone)]
pub struct ClassDefinitionBuilder {
    factory_id: i32,
    class_id: i32,
    version: i32,
    fields: Vec<FieldDefinition>,
}

macro_rules! field_adders {
    ($($method:ident => $field_type:ident),* $(,)?) => {
        $(
            #[doc = concat!("Adds a `", stringify!($field_type), "` field.")]
            pub fn $method(self, name: impl Into<String>) -> Self {
                self.push(name.into(), FieldType::$field_type)
            }
        )*
    };
}

impl ClassDefinitionBuilder {
    /// Starts a definition whose version is stamped on registration.
    pub fn new(factory_id: i32, class_id: i32) -> Self {
        Self::with_version(factory_id, class_id, UNSET_VERSION)
    }

    /// Starts a definition with an explicit version.
    pub fn with_version(factory_id: i32, class_id: i32, version: i32) -> Self {
        Self {
            factory_id,
            class_id,
            version,
            fields: Vec::new(),
        }
    }

    field_adders! {
        add_byte_field => Byte,
        add_bool_field => Bool,
        add_char_field => Char,
        add_short_field => Short,
        add_int_field => Int,
        add_long_field => Long,
        add_float_field => Float,
        add_double_field => Double,
        add_string_field => Utf,
        add_byte_array_field => ByteArray,
        add_bool_array_field => BoolArray,
        add_char_array_field => CharArray,
        add_short_array_field => ShortArray,
        add_int_array_field => IntArray,
        add_long_array_field => LongArray,
        add_float_array_field => FloatArray,
        add_double_array_field => DoubleArray,
        add_string_array_field => UtfArray,
    }

    /// Adds a nested Portable field of the class described by `nested`.
    pub fn add_portable_field(self, name: impl Into<String>, nested: &ClassDefinition) -> Self {
        self.push_nested(name.into(), FieldType::Portable, nested)
    }

    /// Adds a Portable array field whose elements are of the class described by `nested`.
    pub fn add_portable_array_field(
        self,
        name: impl Into<String>,
        nested: &ClassDefinition,
    ) -> Self {
        self.push_nested(name.into(), FieldType::PortableArray, nested)
    }

    /// Appends a fully described field, reindexed to the next position.
    pub(crate) fn add_field_definition(mut self, field: FieldDefinition) -> Self {
        let index = self.fields.len();
        self.fields.push(FieldDefinition { index, ..field });
        self
    }

    /// Returns the number of fields added so far.
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Finalizes the definition.
    ///
    /// Fails with [`SerializationError::Schema`] on a repeated field name or a
    /// nested reference to class ID 0.
    pub fn build(self) -> Result<ClassDefinition> {
        let mut field_indices = HashMap::with_capacity(self.fields.len());
        for field in &self.fields {
            if field.field_type.is_portable() && field.class_id == 0 {
                return Err(SerializationError::Schema(format!(
                    "field '{}' of factory_id={}, class_id={} references an invalid nested class definition",
                    field.name, self.factory_id, self.class_id
                )));
            }
            if field_indices.insert(field.name.clone(), field.index).is_some() {
                return Err(SerializationError::Schema(format!(
                    "duplicate field name '{}' in factory_id={}, class_id={}",
                    field.name, self.factory_id, self.class_id
                )));
            }
        }

        Ok(ClassDefinition {
            factory_id: self.factory_id,
            class_id: self.class_id,
            version: self.version,
            fields: self.fields,
            field_indices,
        })
    }

    fn push(self, name: String, field_type: FieldType) -> Self {
        let index = self.fields.len();
        self.add_field_definition(FieldDefinition::new(index, name, field_type))
    }

    fn push_nested(self, name: String, field_type: FieldType, nested: &ClassDefinition) -> Self {
        let index = self.fields.len();
        self.add_field_definition(FieldDefinition::new_nested(
            index,
            name,
            field_type,
            nested.factory_id(),
            nested.class_id(),
            nested.version(),
        ))
    }
}
