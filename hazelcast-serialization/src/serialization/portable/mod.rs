//! Portable serialization framework for cross-language compatibility.
//!
//! A portable object is written as a versioned field-offset table followed by
//! the field data, so any field can be read without parsing the ones before
//! it and readers built against a different class version can still read it.
//!
//! Payload layout, after `[factoryId:i32][classId:i32]`:
//!
//! ```text
//! [version:i32][bodyLength:i32]
//! body: [fieldCount:i32][offset:i32 × (fieldCount + 1)][fields…][raw bytes…]
//! field: [nameLength:i16][name:utf8][typeId:i8][value]
//! ```
//!
//! Offsets are relative to the start of the body; the last slot points at the
//! raw data section.

mod class_definition;
mod context;
mod morphing;
mod reader;
mod serializer;
mod writer;

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{Result, SerializationError};
use crate::serialization::{DataInput, DataOutput};

pub use class_definition::{ClassDefinition, ClassDefinitionBuilder, FieldDefinition};
pub use context::{PortableContext, MAX_PORTABLE_DEPTH};
pub use morphing::MorphingPortableReader;
pub use reader::DefaultPortableReader;
pub use serializer::{PortableSerializer, PORTABLE_TYPE_ID};
pub use writer::{ClassDefinitionWriter, DefaultPortableWriter};

/// Supported field types in Portable serialization.
///
/// Discriminants are the wire type ids shared with the Java and .NET clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i8)]
pub enum FieldType {
    /// Nested Portable object.
    Portable = 0,
    /// Signed 8-bit integer.
    Byte = 1,
    /// Boolean value.
    Bool = 2,
    /// UTF-16 code unit.
    Char = 3,
    /// Signed 16-bit integer.
    Short = 4,
    /// Signed 32-bit integer.
    Int = 5,
    /// Signed 64-bit integer.
    Long = 6,
    /// 32-bit floating point.
    Float = 7,
    /// 64-bit floating point.
    Double = 8,
    /// UTF-8 string.
    Utf = 9,
    /// Array of Portable objects.
    PortableArray = 10,
    /// Array of bytes.
    ByteArray = 11,
    /// Array of booleans.
    BoolArray = 12,
    /// Array of chars.
    CharArray = 13,
    /// Array of shorts.
    ShortArray = 14,
    /// Array of ints.
    IntArray = 15,
    /// Array of longs.
    LongArray = 16,
    /// Array of floats.
    FloatArray = 17,
    /// Array of doubles.
    DoubleArray = 18,
    /// Array of strings.
    UtfArray = 19,
}

impl FieldType {
    /// Creates a FieldType from its wire representation.
    pub fn from_id(id: i8) -> Result<Self> {
        match id {
            0 => Ok(Self::Portable),
            1 => Ok(Self::Byte),
            2 => Ok(Self::Bool),
            3 => Ok(Self::Char),
            4 => Ok(Self::Short),
            5 => Ok(Self::Int),
            6 => Ok(Self::Long),
            7 => Ok(Self::Float),
            8 => Ok(Self::Double),
            9 => Ok(Self::Utf),
            10 => Ok(Self::PortableArray),
            11 => Ok(Self::ByteArray),
            12 => Ok(Self::BoolArray),
            13 => Ok(Self::CharArray),
            14 => Ok(Self::ShortArray),
            15 => Ok(Self::IntArray),
            16 => Ok(Self::LongArray),
            17 => Ok(Self::FloatArray),
            18 => Ok(Self::DoubleArray),
            19 => Ok(Self::UtfArray),
            _ => Err(SerializationError::Serialization(format!(
                "unknown field type id: {}",
                id
            ))),
        }
    }

    /// Returns the wire representation of this field type.
    pub fn id(self) -> i8 {
        self as i8
    }

    /// Returns true if this is an array type.
    pub fn is_array(self) -> bool {
        matches!(
            self,
            Self::PortableArray
                | Self::ByteArray
                | Self::BoolArray
                | Self::CharArray
                | Self::ShortArray
                | Self::IntArray
                | Self::LongArray
                | Self::FloatArray
                | Self::DoubleArray
                | Self::UtfArray
        )
    }

    /// Returns true for fields that reference other class definitions.
    pub fn is_portable(self) -> bool {
        matches!(self, Self::Portable | Self::PortableArray)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Upcasts to [`Any`] so deserialized portables can be downcast.
///
/// Implemented for every `'static` type; never implement it by hand.
pub trait AsAny: Any {
    /// Returns `self` as `&dyn Any`.
    fn as_any(&self) -> &dyn Any;

    /// Converts a boxed value into `Box<dyn Any>`.
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// Trait for types that can be serialized using Portable serialization.
pub trait Portable: AsAny + Send + Sync {
    /// Returns the factory ID for this type.
    fn factory_id(&self) -> i32;

    /// Returns the class ID for this type.
    fn class_id(&self) -> i32;

    /// Returns the class version of this type.
    ///
    /// `None` uses the portable version configured on the serializer.
    fn class_version(&self) -> Option<i32> {
        None
    }

    /// Writes this object's fields to the given writer.
    fn write_portable(&self, writer: &mut dyn PortableWriter) -> Result<()>;

    /// Reads this object's fields from the given reader.
    fn read_portable(&mut self, reader: &mut dyn PortableReader) -> Result<()>;
}

/// Downcasts a deserialized portable to its concrete type.
pub fn downcast_portable<P: Portable>(portable: Box<dyn Portable>) -> Result<P> {
    let factory_id = portable.factory_id();
    let class_id = portable.class_id();
    <dyn Portable as AsAny>::into_any(portable)
        .downcast::<P>()
        .map(|p| *p)
        .map_err(|_| {
            SerializationError::Serialization(format!(
                "portable factory_id={}, class_id={} is not a {}",
                factory_id,
                class_id,
                std::any::type_name::<P>()
            ))
        })
}

/// Factory for creating Portable instances.
pub trait PortableFactory: Send + Sync {
    /// Returns the factory ID this factory handles.
    fn factory_id(&self) -> i32;

    /// Creates a new instance for the given class ID.
    fn create(&self, class_id: i32) -> Option<Box<dyn Portable>>;
}

type Constructor = Box<dyn Fn() -> Box<dyn Portable> + Send + Sync>;

/// Builds a [`PortableFactory`] from per-class constructors.
///
/// ```ignore
/// let factory = PortableFactoryBuilder::new(1)
///     .register::<Person>(PERSON_CLASS_ID)
///     .register_with(ADDRESS_CLASS_ID, || Box::new(Address::default()))
///     .build();
/// ```
pub struct PortableFactoryBuilder {
    factory_id: i32,
    constructors: HashMap<i32, Constructor>,
}

impl PortableFactoryBuilder {
    /// Starts a factory for `factory_id`.
    pub fn new(factory_id: i32) -> Self {
        Self {
            factory_id,
            constructors: HashMap::new(),
        }
    }

    /// Registers `P::default()` as the constructor for `class_id`.
    pub fn register<P: Portable + Default>(self, class_id: i32) -> Self {
        self.register_with(class_id, || Box::new(P::default()))
    }

    /// Registers a constructor closure for `class_id`.
    pub fn register_with<F>(mut self, class_id: i32, constructor: F) -> Self
    where
        F: Fn() -> Box<dyn Portable> + Send + Sync + 'static,
    {
        self.constructors.insert(class_id, Box::new(constructor));
        self
    }

    /// Finishes the factory.
    pub fn build(self) -> Arc<dyn PortableFactory> {
        Arc::new(FnPortableFactory {
            factory_id: self.factory_id,
            constructors: self.constructors,
        })
    }
}

struct FnPortableFactory {
    factory_id: i32,
    constructors: HashMap<i32, Constructor>,
}

impl PortableFactory for FnPortableFactory {
    fn factory_id(&self) -> i32 {
        self.factory_id
    }

    fn create(&self, class_id: i32) -> Option<Box<dyn Portable>> {
        self.constructors.get(&class_id).map(|constructor| constructor())
    }
}

/// Trait for reading Portable fields during deserialization.
///
/// Reading a field the data does not contain returns the type's default
/// (zero, `false`, or `None`). Reading a field through an accessor its
/// declared type does not support fails with
/// [`SerializationError::IncompatibleField`].
pub trait PortableReader {
    /// Returns the class version of the data being read.
    fn version(&self) -> i32;

    /// Returns true if the data contains a field with the given name.
    fn has_field(&self, name: &str) -> bool;

    /// Returns the names of the fields in the data, in declaration order.
    fn field_names(&self) -> Vec<String>;

    /// Returns the declared type of a field in the data.
    fn field_type(&self, name: &str) -> Option<FieldType>;

    /// Reads a byte field.
    fn read_byte(&mut self, name: &str) -> Result<i8>;

    /// Reads a boolean field.
    fn read_bool(&mut self, name: &str) -> Result<bool>;

    /// Reads a char field as a UTF-16 code unit.
    fn read_char(&mut self, name: &str) -> Result<u16>;

    /// Reads a short field.
    fn read_short(&mut self, name: &str) -> Result<i16>;

    /// Reads an int field.
    fn read_int(&mut self, name: &str) -> Result<i32>;

    /// Reads a long field.
    fn read_long(&mut self, name: &str) -> Result<i64>;

    /// Reads a float field.
    fn read_float(&mut self, name: &str) -> Result<f32>;

    /// Reads a double field.
    fn read_double(&mut self, name: &str) -> Result<f64>;

    /// Reads a string field.
    fn read_string(&mut self, name: &str) -> Result<Option<String>>;

    /// Reads a nested Portable field.
    fn read_portable(&mut self, name: &str) -> Result<Option<Box<dyn Portable>>>;

    /// Reads a byte array field.
    fn read_byte_array(&mut self, name: &str) -> Result<Option<Vec<i8>>>;

    /// Reads a boolean array field.
    fn read_bool_array(&mut self, name: &str) -> Result<Option<Vec<bool>>>;

    /// Reads a char array field.
    fn read_char_array(&mut self, name: &str) -> Result<Option<Vec<u16>>>;

    /// Reads a short array field.
    fn read_short_array(&mut self, name: &str) -> Result<Option<Vec<i16>>>;

    /// Reads an int array field.
    fn read_int_array(&mut self, name: &str) -> Result<Option<Vec<i32>>>;

    /// Reads a long array field.
    fn read_long_array(&mut self, name: &str) -> Result<Option<Vec<i64>>>;

    /// Reads a float array field.
    fn read_float_array(&mut self, name: &str) -> Result<Option<Vec<f32>>>;

    /// Reads a double array field.
    fn read_double_array(&mut self, name: &str) -> Result<Option<Vec<f64>>>;

    /// Reads a string array field.
    fn read_string_array(&mut self, name: &str) -> Result<Option<Vec<Option<String>>>>;

    /// Reads a Portable array field.
    fn read_portable_array(&mut self, name: &str) -> Result<Option<Vec<Box<dyn Portable>>>>;

    /// Positions the input at the raw data section and returns it.
    ///
    /// May be called once, after every field read. Field reads fail afterwards.
    fn raw_data_input(&mut self) -> Result<&mut dyn DataInput>;
}

impl<'r> dyn PortableReader + 'r {
    /// Reads a nested Portable field as a concrete type.
    pub fn read_portable_as<P: Portable>(&mut self, name: &str) -> Result<Option<P>> {
        self.read_portable(name)?.map(downcast_portable).transpose()
    }

    /// Reads a Portable array field as a vector of a concrete type.
    pub fn read_portable_array_as<P: Portable>(&mut self, name: &str) -> Result<Option<Vec<P>>> {
        match self.read_portable_array(name)? {
            Some(items) => items
                .into_iter()
                .map(downcast_portable)
                .collect::<Result<Vec<P>>>()
                .map(Some),
            None => Ok(None),
        }
    }
}

/// Trait for writing Portable fields during serialization.
///
/// Every field written must be declared by the class definition in use, with
/// the same type. Raw data may only follow the declared fields.
pub trait PortableWriter {
    /// Returns the class version being written.
    fn version(&self) -> i32;

    /// Writes a byte field.
    fn write_byte(&mut self, name: &str, value: i8) -> Result<()>;

    /// Writes a boolean field.
    fn write_bool(&mut self, name: &str, value: bool) -> Result<()>;

    /// Writes a char field as a UTF-16 code unit.
    fn write_char(&mut self, name: &str, value: u16) -> Result<()>;

    /// Writes a short field.
    fn write_short(&mut self, name: &str, value: i16) -> Result<()>;

    /// Writes an int field.
    fn write_int(&mut self, name: &str, value: i32) -> Result<()>;

    /// Writes a long field.
    fn write_long(&mut self, name: &str, value: i64) -> Result<()>;

    /// Writes a float field.
    fn write_float(&mut self, name: &str, value: f32) -> Result<()>;

    /// Writes a double field.
    fn write_double(&mut self, name: &str, value: f64) -> Result<()>;

    /// Writes a string field.
    fn write_string(&mut self, name: &str, value: Option<&str>) -> Result<()>;

    /// Writes a nested Portable field.
    fn write_portable(&mut self, name: &str, value: Option<&dyn Portable>) -> Result<()>;

    /// Writes a null nested Portable field of a known class.
    ///
    /// Needed when the class definition is inferred from this write, since a
    /// `None` value carries no factory or class ID.
    fn write_null_portable(&mut self, name: &str, factory_id: i32, class_id: i32) -> Result<()>;

    /// Writes a byte array field.
    fn write_byte_array(&mut self, name: &str, value: Option<&[i8]>) -> Result<()>;

    /// Writes a boolean array field.
    fn write_bool_array(&mut self, name: &str, value: Option<&[bool]>) -> Result<()>;

    /// Writes a char array field.
    fn write_char_array(&mut self, name: &str, value: Option<&[u16]>) -> Result<()>;

    /// Writes a short array field.
    fn write_short_array(&mut self, name: &str, value: Option<&[i16]>) -> Result<()>;

    /// Writes an int array field.
    fn write_int_array(&mut self, name: &str, value: Option<&[i32]>) -> Result<()>;

    /// Writes a long array field.
    fn write_long_array(&mut self, name: &str, value: Option<&[i64]>) -> Result<()>;

    /// Writes a float array field.
    fn write_float_array(&mut self, name: &str, value: Option<&[f32]>) -> Result<()>;

    /// Writes a double array field.
    fn write_double_array(&mut self, name: &str, value: Option<&[f64]>) -> Result<()>;

    /// Writes a string array field.
    fn write_string_array(&mut self, name: &str, value: Option<&[Option<String>]>) -> Result<()>;

    /// Writes a Portable array field. All elements must share the field's
    /// factory and class ID.
    fn write_portable_array(&mut self, name: &str, value: Option<&[&dyn Portable]>) -> Result<()>;

    /// Returns the output for the raw data section.
    ///
    /// Fails unless every declared field has been written; declared fields
    /// cannot be written afterwards.
    fn raw_data_output(&mut self) -> Result<&mut dyn DataOutput>;
}

impl<'w> dyn PortableWriter + 'w {
    /// Writes a Portable array field from a slice of a concrete type.
    pub fn write_portable_slice<P: Portable>(&mut self, name: &str, value: Option<&[P]>) -> Result<()> {
        match value {
            Some(items) => {
                let refs: Vec<&dyn Portable> = items.iter().map(|p| p as &dyn Portable).collect();
                self.write_portable_array(name, Some(&refs))
            }
            None => self.write_portable_array(name, None),
        }
    }
}
