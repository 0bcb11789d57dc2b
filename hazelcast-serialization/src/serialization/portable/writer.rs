//! Portable writers: the offset-table writer and the schema-inferring dry run.

use std::sync::Arc;

use super::context::offset_slot;
use super::{
    ClassDefinition, ClassDefinitionBuilder, FieldDefinition, FieldType, Portable, PortableContext,
    PortableWriter,
};
use crate::error::{Result, SerializationError};
use crate::serialization::data_output::{wire_length, NULL_ARRAY_LENGTH};
use crate::serialization::{DataOutput, ObjectDataOutput};

/// Writes `portable` as `[version][length][body]` using `class_def`.
pub(crate) fn write_versioned(
    context: &PortableContext,
    out: &mut ObjectDataOutput,
    portable: &dyn Portable,
    class_def: Arc<ClassDefinition>,
) -> Result<()> {
    out.write_int(class_def.version())?;
    let mut writer = DefaultPortableWriter::new(context, out, class_def)?;
    portable.write_portable(&mut writer)?;
    writer.end()
}

/// Writes the fields of one Portable object against its class definition.
///
/// Construction reserves the length slot and the offset table; each field
/// write patches its table slot before appending the field. [`end`](Self::end)
/// patches the raw-data slot and the length.
pub struct DefaultPortableWriter<'a> {
    context: &'a PortableContext,
    out: &'a mut ObjectDataOutput,
    class_def: Arc<ClassDefinition>,
    length_position: usize,
    body_start: usize,
    written: Vec<bool>,
    raw: bool,
}

impl<'a> DefaultPortableWriter<'a> {
    /// Starts a body at the current position of `out`.
    pub fn new(
        context: &'a PortableContext,
        out: &'a mut ObjectDataOutput,
        class_def: Arc<ClassDefinition>,
    ) -> Result<Self> {
        let field_count = class_def.field_count();
        let length_position = out.position();
        out.write_int(0)?;
        let body_start = out.position();
        out.write_int(wire_length(field_count)?)?;
        out.write_zero_bytes((field_count + 1) * 4)?;

        Ok(Self {
            context,
            out,
            class_def,
            length_position,
            body_start,
            written: vec![false; field_count],
            raw: false,
        })
    }

    /// Returns the class definition being written.
    pub fn class_definition(&self) -> &ClassDefinition {
        &self.class_def
    }

    /// Finishes the body.
    ///
    /// Fails with [`SerializationError::Protocol`] if a declared field was
    /// never written.
    pub fn end(mut self) -> Result<()> {
        self.ensure_all_written("finishing")?;
        if !self.raw {
            self.patch_raw_offset()?;
        }
        let length = wire_length(self.out.position() - self.body_start)?;
        self.out.write_int_at(self.length_position, length)
    }

    fn ensure_all_written(&self, action: &str) -> Result<()> {
        match self.written.iter().position(|w| !w) {
            Some(index) => {
                let name = self
                    .class_def
                    .field_at(index)
                    .map(FieldDefinition::name)
                    .unwrap_or_default();
                Err(SerializationError::Protocol(format!(
                    "field '{}' of factory_id={}, class_id={} was not written before {}",
                    name,
                    self.class_def.factory_id(),
                    self.class_def.class_id(),
                    action
                )))
            }
            None => Ok(()),
        }
    }

    fn patch_raw_offset(&mut self) -> Result<()> {
        let slot = self.body_start + offset_slot(self.written.len());
        let offset = wire_length(self.out.position() - self.body_start)?;
        self.out.write_int_at(slot, offset)
    }

    /// Validates the field, patches its offset slot and writes its header.
    ///
    /// Returns the nested factory and class IDs recorded for the field.
    fn begin_field(&mut self, name: &str, field_type: FieldType) -> Result<(i32, i32)> {
        if self.raw {
            return Err(SerializationError::Protocol(format!(
                "cannot write field '{}' after raw data",
                name
            )));
        }
        let field = self.class_def.field(name).ok_or_else(|| {
            SerializationError::Protocol(format!(
                "field '{}' is not declared by factory_id={}, class_id={}, version={}",
                name,
                self.class_def.factory_id(),
                self.class_def.class_id(),
                self.class_def.version()
            ))
        })?;
        if field.field_type() != field_type {
            return Err(SerializationError::incompatible(
                name,
                field.field_type(),
                field_type,
            ));
        }
        let index = field.index();
        let nested = (field.factory_id(), field.class_id());
        if self.written[index] {
            return Err(SerializationError::Protocol(format!(
                "field '{}' has already been written",
                name
            )));
        }

        let offset = wire_length(self.out.position() - self.body_start)?;
        self.out
            .write_int_at(self.body_start + offset_slot(index), offset)?;
        write_field_header(self.out, name, field_type)?;
        self.written[index] = true;
        Ok(nested)
    }

    fn write_nested(&mut self, portable: &dyn Portable) -> Result<()> {
        let class_def = self.context.lookup_or_register_class_definition(portable)?;
        write_versioned(self.context, self.out, portable, class_def)
    }
}

/// Fails unless `portable` is of the class a field declares.
fn check_nested_class(name: &str, factory_id: i32, class_id: i32, portable: &dyn Portable) -> Result<()> {
    if portable.factory_id() != factory_id || portable.class_id() != class_id {
        return Err(SerializationError::Schema(format!(
            "field '{}' expects factory_id={}, class_id={} but got factory_id={}, class_id={}",
            name,
            factory_id,
            class_id,
            portable.factory_id(),
            portable.class_id()
        )));
    }
    Ok(())
}

fn write_field_header(out: &mut ObjectDataOutput, name: &str, field_type: FieldType) -> Result<()> {
    let name_len = i16::try_from(name.len()).map_err(|_| {
        SerializationError::Serialization(format!("field name too long: {} bytes", name.len()))
    })?;
    out.write_short(name_len)?;
    out.write_bytes(name.as_bytes())?;
    out.write_byte(field_type.id())
}

macro_rules! field_writers {
    ($($method:ident($ty:ty) => $field_type:ident),* $(,)?) => {
        $(
            fn $method(&mut self, name: &str, value: $ty) -> Result<()> {
                self.begin_field(name, FieldType::$field_type)?;
                self.out.$method(value)
            }
        )*
    };
}

impl PortableWriter for DefaultPortableWriter<'_> {
    fn version(&self) -> i32 {
        self.class_def.version()
    }

    field_writers! {
        write_byte(i8) => Byte,
        write_bool(bool) => Bool,
        write_char(u16) => Char,
        write_short(i16) => Short,
        write_int(i32) => Int,
        write_long(i64) => Long,
        write_float(f32) => Float,
        write_double(f64) => Double,
        write_string(Option<&str>) => Utf,
        write_byte_array(Option<&[i8]>) => ByteArray,
        write_bool_array(Option<&[bool]>) => BoolArray,
        write_char_array(Option<&[u16]>) => CharArray,
        write_short_array(Option<&[i16]>) => ShortArray,
        write_int_array(Option<&[i32]>) => IntArray,
        write_long_array(Option<&[i64]>) => LongArray,
        write_float_array(Option<&[f32]>) => FloatArray,
        write_double_array(Option<&[f64]>) => DoubleArray,
        write_string_array(Option<&[Option<String>]>) => UtfArray,
    }

    fn write_portable(&mut self, name: &str, value: Option<&dyn Portable>) -> Result<()> {
        let (factory_id, class_id) = self.begin_field(name, FieldType::Portable)?;
        if let Some(portable) = value {
            check_nested_class(name, factory_id, class_id, portable)?;
        }
        self.out.write_bool(value.is_none())?;
        self.out.write_int(factory_id)?;
        self.out.write_int(class_id)?;
        match value {
            Some(portable) => self.write_nested(portable),
            None => Ok(()),
        }
    }

    fn write_null_portable(&mut self, name: &str, factory_id: i32, class_id: i32) -> Result<()> {
        let declared = self
            .class_def
            .field(name)
            .map(|f| (f.factory_id(), f.class_id()));
        if let Some(declared) = declared {
            if declared != (factory_id, class_id) {
                return Err(SerializationError::Schema(format!(
                    "field '{}' expects factory_id={}, class_id={} but got factory_id={}, class_id={}",
                    name, declared.0, declared.1, factory_id, class_id
                )));
            }
        }
        self.write_portable(name, None)
    }

    fn write_portable_array(&mut self, name: &str, value: Option<&[&dyn Portable]>) -> Result<()> {
        let (factory_id, class_id) = self.begin_field(name, FieldType::PortableArray)?;
        let Some(items) = value else {
            self.out.write_int(NULL_ARRAY_LENGTH)?;
            self.out.write_int(factory_id)?;
            return self.out.write_int(class_id);
        };

        for portable in items {
            check_nested_class(name, factory_id, class_id, *portable)?;
        }
        self.out.write_int(wire_length(items.len())?)?;
        self.out.write_int(factory_id)?;
        self.out.write_int(class_id)?;
        for portable in items {
            self.write_nested(*portable)?;
        }
        Ok(())
    }

    fn raw_data_output(&mut self) -> Result<&mut dyn DataOutput> {
        if !self.raw {
            self.ensure_all_written("raw data")?;
            self.patch_raw_offset()?;
            self.raw = true;
        }
        Ok(&mut *self.out)
    }
}

/// Infers a class definition by recording the fields a Portable writes.
///
/// Used as a dry run of [`Portable::write_portable`]; no bytes are produced
/// except into a scratch raw-data buffer that is discarded.
pub struct ClassDefinitionWriter<'a> {
    context: &'a PortableContext,
    builder: ClassDefinitionBuilder,
    version: i32,
    raw: ObjectDataOutput,
}

impl<'a> ClassDefinitionWriter<'a> {
    /// Starts inferring the definition of (factory ID, class ID, version).
    pub fn new(context: &'a PortableContext, factory_id: i32, class_id: i32, version: i32) -> Self {
        Self {
            context,
            builder: ClassDefinitionBuilder::with_version(factory_id, class_id, version),
            version,
            raw: ObjectDataOutput::with_capacity(0),
        }
    }

    /// Builds the inferred definition.
    pub fn build(self) -> Result<ClassDefinition> {
        self.builder.build()
    }

    fn add(&mut self, name: &str, field_type: FieldType) {
        let index = self.builder.field_count();
        self.add_field(FieldDefinition::new(index, name, field_type));
    }

    fn add_field(&mut self, field: FieldDefinition) {
        let builder = std::mem::replace(&mut self.builder, ClassDefinitionBuilder::new(0, 0));
        self.builder = builder.add_field_definition(field);
    }

    fn add_nested(&mut self, name: &str, field_type: FieldType, portable: &dyn Portable) -> Result<()> {
        let nested = self.context.lookup_or_register_class_definition(portable)?;
        let index = self.builder.field_count();
        self.add_field(FieldDefinition::new_nested(
            index,
            name,
            field_type,
            nested.factory_id(),
            nested.class_id(),
            nested.version(),
        ));
        Ok(())
    }
}

macro_rules! field_recorders {
    ($($method:ident($ty:ty) => $field_type:ident),* $(,)?) => {
        $(
            fn $method(&mut self, name: &str, _value: $ty) -> Result<()> {
                self.add(name, FieldType::$field_type);
                Ok(())
            }
        )*
    };
}

impl PortableWriter for ClassDefinitionWriter<'_> {
    fn version(&self) -> i32 {
        self.version
    }

    field_recorders! {
        write_byte(i8) => Byte,
        write_bool(bool) => Bool,
        write_char(u16) => Char,
        write_short(i16) => Short,
        write_int(i32) => Int,
        write_long(i64) => Long,
        write_float(f32) => Float,
        write_double(f64) => Double,
        write_string(Option<&str>) => Utf,
        write_byte_array(Option<&[i8]>) => ByteArray,
        write_bool_array(Option<&[bool]>) => BoolArray,
        write_char_array(Option<&[u16]>) => CharArray,
        write_short_array(Option<&[i16]>) => ShortArray,
        write_int_array(Option<&[i32]>) => IntArray,
        write_long_array(Option<&[i64]>) => LongArray,
        write_float_array(Option<&[f32]>) => FloatArray,
        write_double_array(Option<&[f64]>) => DoubleArray,
        write_string_array(Option<&[Option<String>]>) => UtfArray,
    }

    fn write_portable(&mut self, name: &str, value: Option<&dyn Portable>) -> Result<()> {
        match value {
            Some(portable) => self.add_nested(name, FieldType::Portable, portable),
            None => Err(SerializationError::Schema(format!(
                "cannot infer the class of null portable field '{}'; use write_null_portable",
                name
            ))),
        }
    }

    fn write_null_portable(&mut self, name: &str, factory_id: i32, class_id: i32) -> Result<()> {
        let version = self.context.class_version(factory_id, class_id);
        let index = self.builder.field_count();
        self.add_field(FieldDefinition::new_nested(
            index,
            name,
            FieldType::Portable,
            factory_id,
            class_id,
            version,
        ));
        Ok(())
    }

    fn write_portable_array(&mut self, name: &str, value: Option<&[&dyn Portable]>) -> Result<()> {
        let items = match value {
            Some(items) if !items.is_empty() => items,
            _ => {
                return Err(SerializationError::Schema(format!(
                    "cannot infer the class of null or empty portable array field '{}'",
                    name
                )))
            }
        };
        let first = items[0];
        for portable in &items[1..] {
            check_nested_class(name, first.factory_id(), first.class_id(), *portable)?;
        }
        self.add_nested(name, FieldType::PortableArray, first)
    }

    fn raw_data_output(&mut self) -> Result<&mut dyn DataOutput> {
        self.raw.clear();
        Ok(&mut self.raw)
    }
}
