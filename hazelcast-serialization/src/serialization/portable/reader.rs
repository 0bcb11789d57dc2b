//! The exact Portable reader: offset-table random access with strict types.

use std::sync::Arc;

use super::context::{offset_slot, read_field_header, read_versioned_body};
use super::{ClassDefinition, FieldType, Portable, PortableReader, PortableSerializer};
use crate::error::{Result, SerializationError};
use crate::serialization::data_output::NULL_ARRAY_LENGTH;
use crate::serialization::{DataInput, ObjectDataInput};

/// Reads the fields of one Portable body using the class definition it was
/// written with.
///
/// Fields may be read in any order. A field the definition does not contain
/// reads as its default; a field read through the wrong accessor fails.
pub struct DefaultPortableReader<'a> {
    serializer: &'a PortableSerializer,
    input: ObjectDataInput<'a>,
    class_def: Arc<ClassDefinition>,
    raw: bool,
    depth: usize,
}

impl<'a> DefaultPortableReader<'a> {
    /// Creates a reader over `body`, the bytes after the version and length.
    ///
    /// Fails if the body's field count disagrees with `class_def`.
    pub fn new(
        serializer: &'a PortableSerializer,
        body: &'a [u8],
        class_def: Arc<ClassDefinition>,
    ) -> Result<Self> {
        Self::at_depth(serializer, body, class_def, 0)
    }

    /// Creates a reader over a body nested `depth` portables deep.
    pub(crate) fn at_depth(
        serializer: &'a PortableSerializer,
        body: &'a [u8],
        class_def: Arc<ClassDefinition>,
        depth: usize,
    ) -> Result<Self> {
        let input = ObjectDataInput::with_byte_order(body, serializer.context().byte_order());
        let field_count = input.read_int_at(0)?;
        if usize::try_from(field_count).ok() != Some(class_def.field_count()) {
            return Err(SerializationError::Serialization(format!(
                "factory_id={}, class_id={}, version={} declares {} fields but the data has {}",
                class_def.factory_id(),
                class_def.class_id(),
                class_def.version(),
                class_def.field_count(),
                field_count
            )));
        }

        Ok(Self {
            serializer,
            input,
            class_def,
            raw: false,
            depth,
        })
    }

    /// Returns the class definition of the data.
    pub fn class_definition(&self) -> &ClassDefinition {
        &self.class_def
    }

    pub(crate) fn ensure_fields_readable(&self, name: &str) -> Result<()> {
        if self.raw {
            return Err(SerializationError::Protocol(format!(
                "cannot read field '{}' after raw data",
                name
            )));
        }
        Ok(())
    }

    /// Positions the input at the value of `name`.
    ///
    /// Returns `None` if the data has no such field, otherwise the nested
    /// factory and class IDs recorded for it.
    fn seek_field(&mut self, name: &str, requested: FieldType) -> Result<Option<(i32, i32)>> {
        self.ensure_fields_readable(name)?;
        let Some(field) = self.class_def.field(name) else {
            return Ok(None);
        };
        if field.field_type() != requested {
            return Err(SerializationError::incompatible(
                name,
                field.field_type(),
                requested,
            ));
        }
        let nested = (field.factory_id(), field.class_id());

        let offset = self.input.read_int_at(offset_slot(field.index()))?;
        self.input.seek(offset)?;
        let (header_name, header_type) = read_field_header(&mut self.input)?;
        if header_name != name || header_type != requested {
            return Err(SerializationError::Serialization(format!(
                "corrupt field header: expected '{}' ({}), found '{}' ({})",
                name, requested, header_name, header_type
            )));
        }
        Ok(Some(nested))
    }

    fn read_nested_ids(&mut self, name: &str, expected: (i32, i32)) -> Result<()> {
        let factory_id = self.input.read_int()?;
        let class_id = self.input.read_int()?;
        if (factory_id, class_id) != expected {
            return Err(SerializationError::Serialization(format!(
                "field '{}' expects factory_id={}, class_id={} but the data has factory_id={}, class_id={}",
                name, expected.0, expected.1, factory_id, class_id
            )));
        }
        Ok(())
    }

    fn read_nested(&mut self, (factory_id, class_id): (i32, i32)) -> Result<Box<dyn Portable>> {
        let (version, body) = read_versioned_body(&mut self.input)?;
        self.serializer
            .read_body(factory_id, class_id, version, body, self.depth + 1)
    }
}

macro_rules! field_readers {
    ($($method:ident -> $ty:ty => $field_type:ident),* $(,)?) => {
        $(
            fn $method(&mut self, name: &str) -> Result<$ty> {
                match self.seek_field(name, FieldType::$field_type)? {
                    Some(_) => self.input.$method(),
                    None => Ok(Default::default()),
                }
            }
        )*
    };
}

impl PortableReader for DefaultPortableReader<'_> {
    fn version(&self) -> i32 {
        self.class_def.version()
    }

    fn has_field(&self, name: &str) -> bool {
        self.class_def.has_field(name)
    }

    fn field_names(&self) -> Vec<String> {
        self.class_def.field_names().map(str::to_string).collect()
    }

    fn field_type(&self, name: &str) -> Option<FieldType> {
        self.class_def.field_type(name)
    }

    field_readers! {
        read_byte -> i8 => Byte,
        read_bool -> bool => Bool,
        read_char -> u16 => Char,
        read_short -> i16 => Short,
        read_int -> i32 => Int,
        read_long -> i64 => Long,
        read_float -> f32 => Float,
        read_double -> f64 => Double,
        read_string -> Option<String> => Utf,
        read_byte_array -> Option<Vec<i8>> => ByteArray,
        read_bool_array -> Option<Vec<bool>> => BoolArray,
        read_char_array -> Option<Vec<u16>> => CharArray,
        read_short_array -> Option<Vec<i16>> => ShortArray,
        read_int_array -> Option<Vec<i32>> => IntArray,
        read_long_array -> Option<Vec<i64>> => LongArray,
        read_float_array -> Option<Vec<f32>> => FloatArray,
        read_double_array -> Option<Vec<f64>> => DoubleArray,
        read_string_array -> Option<Vec<Option<String>>> => UtfArray,
    }

    fn read_portable(&mut self, name: &str) -> Result<Option<Box<dyn Portable>>> {
        let Some(ids) = self.seek_field(name, FieldType::Portable)? else {
            return Ok(None);
        };
        let is_null = self.input.read_bool()?;
        self.read_nested_ids(name, ids)?;
        if is_null {
            return Ok(None);
        }
        self.read_nested(ids).map(Some)
    }

    fn read_portable_array(&mut self, name: &str) -> Result<Option<Vec<Box<dyn Portable>>>> {
        let Some(ids) = self.seek_field(name, FieldType::PortableArray)? else {
            return Ok(None);
        };
        let len = self.input.read_int()?;
        self.read_nested_ids(name, ids)?;
        if len == NULL_ARRAY_LENGTH {
            return Ok(None);
        }
        let len = usize::try_from(len).map_err(|_| {
            SerializationError::Serialization(format!("invalid portable array length: {}", len))
        })?;

        let mut items = Vec::new();
        for _ in 0..len {
            items.push(self.read_nested(ids)?);
        }
        Ok(Some(items))
    }

    fn raw_data_input(&mut self) -> Result<&mut dyn DataInput> {
        if self.raw {
            return Err(SerializationError::Protocol(
                "raw data has already been read".to_string(),
            ));
        }
        let raw_offset = self
            .input
            .read_int_at(offset_slot(self.class_def.field_count()))?;
        self.input.seek(raw_offset)?;
        self.raw = true;
        Ok(&mut self.input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialization::portable::{ClassDefinitionBuilder, PortableContext, PortableWriter};
    use crate::serialization::{ByteOrder, DataOutput, ObjectDataOutput};

    #[derive(Default)]
    struct Sample {
        flag: bool,
        count: i32,
        label: Option<String>,
        scores: Option<Vec<f64>>,
        trailer: i64,
    }

    impl Portable for Sample {
        fn factory_id(&self) -> i32 {
            3
        }

        fn class_id(&self) -> i32 {
            1
        }

        fn write_portable(&self, writer: &mut dyn PortableWriter) -> Result<()> {
            writer.write_bool("flag", self.flag)?;
            writer.write_int("count", self.count)?;
            writer.write_string("label", self.label.as_deref())?;
            writer.write_double_array("scores", self.scores.as_deref())?;
            writer.raw_data_output()?.write_long(self.trailer)
        }

        fn read_portable(&mut self, reader: &mut dyn PortableReader) -> Result<()> {
            self.flag = reader.read_bool("flag")?;
            self.count = reader.read_int("count")?;
            self.label = reader.read_string("label")?;
            self.scores = reader.read_double_array("scores")?;
            self.trailer = reader.raw_data_input()?.read_long()?;
            Ok(())
        }
    }

    fn serializer() -> PortableSerializer {
        PortableSerializer::new(PortableContext::new(0, ByteOrder::BigEndian), Vec::new())
    }

    fn sample() -> Sample {
        Sample {
            flag: true,
            count: -5,
            label: Some("héllo".to_string()),
            scores: Some(vec![1.5, -2.25]),
            trailer: 99,
        }
    }

    /// Writes `sample()` and returns the body plus its class definition.
    fn written(serializer: &PortableSerializer) -> (Vec<u8>, Arc<ClassDefinition>) {
        let value = sample();
        let class_def = serializer
            .context()
            .lookup_or_register_class_definition(&value)
            .unwrap();
        let mut out = ObjectDataOutput::new();
        super::super::writer::write_versioned(
            serializer.context(),
            &mut out,
            &value,
            Arc::clone(&class_def),
        )
        .unwrap();
        (out.into_bytes()[8..].to_vec(), class_def)
    }

    #[test]
    fn test_reverse_order_reads() {
        let serializer = serializer();
        let (body, class_def) = written(&serializer);
        let mut reader = DefaultPortableReader::new(&serializer, &body, class_def).unwrap();

        assert_eq!(reader.read_double_array("scores").unwrap(), Some(vec![1.5, -2.25]));
        assert_eq!(reader.read_string("label").unwrap().as_deref(), Some("héllo"));
        assert_eq!(reader.read_int("count").unwrap(), -5);
        assert!(reader.read_bool("flag").unwrap());
        assert_eq!(reader.read_int("count").unwrap(), -5);
    }

    #[test]
    fn test_missing_field_reads_default() {
        let serializer = serializer();
        let (body, class_def) = written(&serializer);
        let mut reader = DefaultPortableReader::new(&serializer, &body, class_def).unwrap();

        assert_eq!(reader.read_long("absent").unwrap(), 0);
        assert_eq!(reader.read_string("absent").unwrap(), None);
        assert!(reader.read_portable("absent").unwrap().is_none());
        assert!(!reader.has_field("absent"));
    }

    #[test]
    fn test_wrong_accessor_fails() {
        let serializer = serializer();
        let (body, class_def) = written(&serializer);
        let mut reader = DefaultPortableReader::new(&serializer, &body, class_def).unwrap();

        let err = reader.read_int("label").unwrap_err();
        assert!(matches!(
            err,
            SerializationError::IncompatibleField {
                declared: FieldType::Utf,
                requested: FieldType::Int,
                ..
            }
        ));
        assert!(reader.read_long("count").is_err());
    }

    #[test]
    fn test_raw_data_read_once() {
        let serializer = serializer();
        let (body, class_def) = written(&serializer);
        let mut reader = DefaultPortableReader::new(&serializer, &body, class_def).unwrap();

        assert_eq!(reader.raw_data_input().unwrap().read_long().unwrap(), 99);
        assert!(matches!(
            reader.raw_data_input(),
            Err(SerializationError::Protocol(_))
        ));
        assert!(matches!(
            reader.read_int("count"),
            Err(SerializationError::Protocol(_))
        ));
    }

    #[test]
    fn test_field_count_mismatch() {
        let serializer = serializer();
        let (body, _) = written(&serializer);
        let other = Arc::new(
            ClassDefinitionBuilder::with_version(3, 1, 0)
                .add_int_field("count")
                .build()
                .unwrap(),
        );
        assert!(DefaultPortableReader::new(&serializer, &body, other).is_err());
    }

    #[test]
    fn test_corrupt_offset_is_detected() {
        let serializer = serializer();
        let (mut body, class_def) = written(&serializer);
        // Point "flag" at the "count" field.
        let count_offset = body[8..12].to_vec();
        body[4..8].copy_from_slice(&count_offset);
        let mut reader = DefaultPortableReader::new(&serializer, &body, class_def).unwrap();
        assert!(matches!(
            reader.read_bool("flag"),
            Err(SerializationError::IncompatibleField { .. }) | Err(SerializationError::Serialization(_))
        ));
    }

    #[test]
    fn test_reads_through_trait_object() {
        let serializer = serializer();
        let (body, class_def) = written(&serializer);
        let mut reader = DefaultPortableReader::new(&serializer, &body, class_def).unwrap();
        let mut value = Sample::default();
        value.read_portable(&mut reader).unwrap();
        assert_eq!(value.count, -5);
        assert_eq!(value.trailer, 99);
    }
}
