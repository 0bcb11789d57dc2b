#![no_main]

use libfuzzer_sys::fuzz_target;

use hazelcast_serialization::serialization::portable::{
    ClassDefinitionBuilder, Portable, PortableFactoryBuilder, PortableReader, PortableWriter,
};
use hazelcast_serialization::{Data, Result, SerializationConfig, SerializationService};

#[derive(Debug, Default)]
struct FuzzPortable {
    byte_val: i8,
    bool_val: bool,
    short_val: i16,
    int_val: i32,
    long_val: i64,
    double_val: f64,
    string_val: Option<String>,
    ints: Option<Vec<i32>>,
    nested: Option<Box<FuzzPortable>>,
}

impl Portable for FuzzPortable {
    fn factory_id(&self) -> i32 {
        1
    }

    fn class_id(&self) -> i32 {
        1
    }

    fn write_portable(&self, writer: &mut dyn PortableWriter) -> Result<()> {
        writer.write_byte("byte", self.byte_val)?;
        writer.write_bool("bool", self.bool_val)?;
        writer.write_short("short", self.short_val)?;
        writer.write_int("int", self.int_val)?;
        writer.write_long("long", self.long_val)?;
        writer.write_double("double", self.double_val)?;
        writer.write_string("string", self.string_val.as_deref())?;
        writer.write_int_array("ints", self.ints.as_deref())?;
        match &self.nested {
            Some(nested) => writer.write_portable("nested", Some(nested.as_ref())),
            None => writer.write_null_portable("nested", 1, 1),
        }
    }

    fn read_portable(&mut self, reader: &mut dyn PortableReader) -> Result<()> {
        self.byte_val = reader.read_byte("byte")?;
        self.bool_val = reader.read_bool("bool")?;
        self.short_val = reader.read_short("short")?;
        self.int_val = reader.read_int("int")?;
        self.long_val = reader.read_long("long")?;
        self.double_val = reader.read_double("double")?;
        self.string_val = reader.read_string("string")?;
        self.ints = reader.read_int_array("ints")?;
        self.nested = reader.read_portable_as::<FuzzPortable>("nested")?.map(Box::new);
        let _ = reader.raw_data_input()?.read_long();
        Ok(())
    }
}

fn service() -> Option<SerializationService> {
    let class_def = ClassDefinitionBuilder::new(1, 1)
        .add_byte_field("byte")
        .add_bool_field("bool")
        .add_short_field("short")
        .add_int_field("int")
        .add_long_field("long")
        .add_double_field("double")
        .add_string_field("string")
        .add_int_array_field("ints")
        .build()
        .ok()?;
    let config = SerializationConfig::builder()
        .add_portable_factory(PortableFactoryBuilder::new(1).register::<FuzzPortable>(1).build())
        .add_class_definition(class_def)
        .build()
        .ok()?;
    SerializationService::new(config).ok()
}

fuzz_target!(|data: &[u8]| {
    let Some(service) = service() else {
        return;
    };
    let Ok(data) = Data::new(data.to_vec()) else {
        return;
    };

    let _ = data.partition_hash();
    let _ = service.to_object(&data);
    let _ = service.to_object_as::<FuzzPortable>(&data);

    if let Ok(mut reader) = service.create_portable_reader(&data) {
        for name in reader.field_names() {
            let _ = reader.read_long(&name);
            let _ = reader.read_string(&name);
            let _ = reader.read_portable(&name);
        }
        let _ = reader.raw_data_input();
    }
});
