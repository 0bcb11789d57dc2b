//! Version-tolerant Portable reader.

use std::sync::Arc;

use super::{ClassDefinition, DefaultPortableReader, FieldType, Portable, PortableReader};
use crate::error::Result;
use crate::serialization::DataInput;

/// Reads data written with a different class version than the local one.
///
/// A field missing from either the data or the local definition reads as its
/// default. Numeric fields widen to larger accessors:
///
/// | accessor | accepted field types                     |
/// |----------|------------------------------------------|
/// | short    | byte, short                              |
/// | int      | byte, char, short, int                   |
/// | long     | byte, char, short, int, long             |
/// | float    | byte, char, short, int, float            |
/// | double   | byte, char, short, int, long, float, double |
///
/// Every other accessor requires the exact field type.
pub struct MorphingPortableReader<'a> {
    inner: DefaultPortableReader<'a>,
    current: Option<Arc<ClassDefinition>>,
}

impl<'a> MorphingPortableReader<'a> {
    /// Wraps an exact reader over the data.
    ///
    /// `current` is the local definition, if one is registered.
    pub fn new(inner: DefaultPortableReader<'a>, current: Option<Arc<ClassDefinition>>) -> Self {
        Self { inner, current }
    }

    /// Returns the stream type of `name` if both shapes declare it.
    fn shared_field_type(&self, name: &str) -> Result<Option<FieldType>> {
        self.inner.ensure_fields_readable(name)?;
        let Some(field_type) = self.inner.field_type(name) else {
            return Ok(None);
        };
        if let Some(current) = &self.current {
            if !current.has_field(name) {
                return Ok(None);
            }
        }
        Ok(Some(field_type))
    }
}

macro_rules! exact_readers {
    ($($method:ident -> $ty:ty),* $(,)?) => {
        $(
            fn $method(&mut self, name: &str) -> Result<$ty> {
                match self.shared_field_type(name)? {
                    Some(_) => self.inner.$method(name),
                    None => Ok(Default::default()),
                }
            }
        )*
    };
}

impl PortableReader for MorphingPortableReader<'_> {
    fn version(&self) -> i32 {
        self.inner.version()
    }

    fn has_field(&self, name: &str) -> bool {
        self.inner.has_field(name)
    }

    fn field_names(&self) -> Vec<String> {
        self.inner.field_names()
    }

    fn field_type(&self, name: &str) -> Option<FieldType> {
        self.inner.field_type(name)
    }

    exact_readers! {
        read_byte -> i8,
        read_bool -> bool,
        read_char -> u16,
        read_string -> Option<String>,
        read_portable -> Option<Box<dyn Portable>>,
        read_byte_array -> Option<Vec<i8>>,
        read_bool_array -> Option<Vec<bool>>,
        read_char_array -> Option<Vec<u16>>,
        read_short_array -> Option<Vec<i16>>,
        read_int_array -> Option<Vec<i32>>,
        read_long_array -> Option<Vec<i64>>,
        read_float_array -> Option<Vec<f32>>,
        read_double_array -> Option<Vec<f64>>,
        read_string_array -> Option<Vec<Option<String>>>,
        read_portable_array -> Option<Vec<Box<dyn Portable>>>,
    }

    fn read_short(&mut self, name: &str) -> Result<i16> {
        match self.shared_field_type(name)? {
            None => Ok(0),
            Some(FieldType::Byte) => self.inner.read_byte(name).map(i16::from),
            Some(_) => self.inner.read_short(name),
        }
    }

    fn read_int(&mut self, name: &str) -> Result<i32> {
        match self.shared_field_type(name)? {
            None => Ok(0),
            Some(FieldType::Byte) => self.inner.read_byte(name).map(i32::from),
            Some(FieldType::Char) => self.inner.read_char(name).map(i32::from),
            Some(FieldType::Short) => self.inner.read_short(name).map(i32::from),
            Some(_) => self.inner.read_int(name),
        }
    }

    fn read_long(&mut self, name: &str) -> Result<i64> {
        match self.shared_field_type(name)? {
            None => Ok(0),
            Some(FieldType::Byte) => self.inner.read_byte(name).map(i64::from),
            Some(FieldType::Char) => self.inner.read_char(name).map(i64::from),
            Some(FieldType::Short) => self.inner.read_short(name).map(i64::from),
            Some(FieldType::Int) => self.inner.read_int(name).map(i64::from),
            Some(_) => self.inner.read_long(name),
        }
    }

    fn read_float(&mut self, name: &str) -> Result<f32> {
        match self.shared_field_type(name)? {
            None => Ok(0.0),
            Some(FieldType::Byte) => self.inner.read_byte(name).map(f32::from),
            Some(FieldType::Char) => self.inner.read_char(name).map(f32::from),
            Some(FieldType::Short) => self.inner.read_short(name).map(f32::from),
            Some(FieldType::Int) => self.inner.read_int(name).map(|v| v as f32),
            Some(_) => self.inner.read_float(name),
        }
    }

    fn read_double(&mut self, name: &str) -> Result<f64> {
        match self.shared_field_type(name)? {
            None => Ok(0.0),
            Some(FieldType::Byte) => self.inner.read_byte(name).map(f64::from),
            Some(FieldType::Char) => self.inner.read_char(name).map(f64::from),
            Some(FieldType::Short) => self.inner.read_short(name).map(f64::from),
            Some(FieldType::Int) => self.inner.read_int(name).map(f64::from),
            Some(FieldType::Long) => self.inner.read_long(name).map(|v| v as f64),
            Some(FieldType::Float) => self.inner.read_float(name).map(f64::from),
            Some(_) => self.inner.read_double(name),
        }
    }

    fn raw_data_input(&mut self) -> Result<&mut dyn DataInput> {
        self.inner.raw_data_input()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SerializationError;
    use crate::serialization::portable::{
        ClassDefinitionBuilder, PortableContext, PortableSerializer, PortableWriter,
    };
    use crate::serialization::{ByteOrder, ObjectDataOutput};

    struct Numbers;

    impl Portable for Numbers {
        fn factory_id(&self) -> i32 {
            4
        }

        fn class_id(&self) -> i32 {
            1
        }

        fn class_version(&self) -> Option<i32> {
            Some(1)
        }

        fn write_portable(&self, writer: &mut dyn PortableWriter) -> Result<()> {
            writer.write_byte("b", -3)?;
            writer.write_char("c", 65)?;
            writer.write_short("s", -300)?;
            writer.write_int("i", 70_000)?;
            writer.write_long("l", 1 << 40)?;
            writer.write_float("f", 1.5)?;
            writer.write_string("text", Some("13"))?;
            writer.write_bool("flag", true)
        }

        fn read_portable(&mut self, _reader: &mut dyn PortableReader) -> Result<()> {
            Ok(())
        }
    }

    fn body(serializer: &PortableSerializer) -> (Vec<u8>, Arc<ClassDefinition>) {
        let class_def = serializer
            .context()
            .lookup_or_register_class_definition(&Numbers)
            .unwrap();
        let mut out = ObjectDataOutput::new();
        crate::serialization::portable::writer::write_versioned(
            serializer.context(),
            &mut out,
            &Numbers,
            Arc::clone(&class_def),
        )
        .unwrap();
        (out.into_bytes()[8..].to_vec(), class_def)
    }

    fn serializer() -> PortableSerializer {
        PortableSerializer::new(PortableContext::new(0, ByteOrder::BigEndian), Vec::new())
    }

    #[test]
    fn test_widening_reads() {
        let serializer = serializer();
        let (bytes, class_def) = body(&serializer);
        let inner = DefaultPortableReader::new(&serializer, &bytes, class_def).unwrap();
        let mut reader = MorphingPortableReader::new(inner, None);

        assert_eq!(reader.read_short("b").unwrap(), -3);
        assert_eq!(reader.read_int("c").unwrap(), 65);
        assert_eq!(reader.read_int("s").unwrap(), -300);
        assert_eq!(reader.read_long("i").unwrap(), 70_000);
        assert_eq!(reader.read_float("i").unwrap(), 70_000.0);
        assert_eq!(reader.read_double("i").unwrap(), 70_000.0);
        assert_eq!(reader.read_double("l").unwrap(), (1u64 << 40) as f64);
        assert_eq!(reader.read_double("f").unwrap(), 1.5);
        assert_eq!(reader.read_long("l").unwrap(), 1 << 40);
    }

    #[test]
    fn test_narrowing_and_punning_fail() {
        let serializer = serializer();
        let (bytes, class_def) = body(&serializer);
        let inner = DefaultPortableReader::new(&serializer, &bytes, class_def).unwrap();
        let mut reader = MorphingPortableReader::new(inner, None);

        assert!(matches!(
            reader.read_int("text"),
            Err(SerializationError::IncompatibleField {
                declared: FieldType::Utf,
                requested: FieldType::Int,
                ..
            })
        ));
        assert!(reader.read_double("text").is_err());
        assert!(reader.read_short("i").is_err());
        assert!(reader.read_float("l").is_err());
        assert!(reader.read_char("b").is_err());
        assert!(reader.read_int("flag").is_err());
        assert!(reader.read_string("i").is_err());
    }

    #[test]
    fn test_fields_missing_locally_read_default() {
        let serializer = serializer();
        let (bytes, class_def) = body(&serializer);
        let current = Arc::new(
            ClassDefinitionBuilder::with_version(4, 1, 2)
                .add_int_field("i")
                .add_long_field("added")
                .build()
                .unwrap(),
        );
        let inner = DefaultPortableReader::new(&serializer, &bytes, class_def).unwrap();
        let mut reader = MorphingPortableReader::new(inner, Some(current));

        assert_eq!(reader.read_int("i").unwrap(), 70_000);
        assert_eq!(reader.read_long("added").unwrap(), 0);
        assert_eq!(reader.read_string("text").unwrap(), None);
        assert_eq!(reader.read_short("s").unwrap(), 0);
        assert!(!reader.read_bool("flag").unwrap());
    }
}
