//! Shared Portable models and service setup for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use hazelcast_serialization::serialization::portable::{
    ClassDefinition, ClassDefinitionBuilder, Portable, PortableFactory, PortableFactoryBuilder,
    PortableReader, PortableWriter,
};
use hazelcast_serialization::{ByteOrder, Result, SerializationConfig, SerializationService};

pub const FACTORY_ID: i32 = 1;
pub const PERSON_CLASS_ID: i32 = 1;
pub const ADDRESS_CLASS_ID: i32 = 2;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Address {
    pub street: String,
    pub no: i32,
}

impl Portable for Address {
    fn factory_id(&self) -> i32 {
        FACTORY_ID
    }

    fn class_id(&self) -> i32 {
        ADDRESS_CLASS_ID
    }

    fn write_portable(&self, writer: &mut dyn PortableWriter) -> Result<()> {
        writer.write_string("street", Some(self.street.as_str()))?;
        writer.write_int("no", self.no)
    }

    fn read_portable(&mut self, reader: &mut dyn PortableReader) -> Result<()> {
        self.street = reader.read_string("street")?.unwrap_or_default();
        self.no = reader.read_int("no")?;
        Ok(())
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Person {
    pub name: String,
    pub age: i32,
    pub address: Option<Address>,
}

impl Portable for Person {
    fn factory_id(&self) -> i32 {
        FACTORY_ID
    }

    fn class_id(&self) -> i32 {
        PERSON_CLASS_ID
    }

    fn write_portable(&self, writer: &mut dyn PortableWriter) -> Result<()> {
        writer.write_string("name", Some(self.name.as_str()))?;
        writer.write_int("age", self.age)?;
        match &self.address {
            Some(address) => writer.write_portable("address", Some(address)),
            None => writer.write_null_portable("address", FACTORY_ID, ADDRESS_CLASS_ID),
        }
    }

    fn read_portable(&mut self, reader: &mut dyn PortableReader) -> Result<()> {
        self.name = reader.read_string("name")?.unwrap_or_default();
        self.age = reader.read_int("age")?;
        self.address = reader.read_portable_as::<Address>("address")?;
        Ok(())
    }
}

pub fn mehmet() -> Person {
    Person {
        name: "mehmet".to_string(),
        age: 13,
        address: Some(Address {
            street: "here".to_string(),
            no: 13131,
        }),
    }
}

pub fn person_factory() -> Arc<dyn PortableFactory> {
    PortableFactoryBuilder::new(FACTORY_ID)
        .register::<Person>(PERSON_CLASS_ID)
        .register::<Address>(ADDRESS_CLASS_ID)
        .build()
}

/// Class definitions matching `Person` and `Address`, built by hand.
pub fn person_class_definitions() -> (ClassDefinition, ClassDefinition) {
    let address = ClassDefinitionBuilder::new(FACTORY_ID, ADDRESS_CLASS_ID)
        .add_string_field("street")
        .add_int_field("no")
        .build()
        .unwrap();
    let person = ClassDefinitionBuilder::new(FACTORY_ID, PERSON_CLASS_ID)
        .add_string_field("name")
        .add_int_field("age")
        .add_portable_field("address", &address)
        .build()
        .unwrap();
    (person, address)
}

pub fn service_with(factories: Vec<Arc<dyn PortableFactory>>) -> SerializationService {
    service_with_order(factories, ByteOrder::BigEndian)
}

pub fn service_with_order(
    factories: Vec<Arc<dyn PortableFactory>>,
    byte_order: ByteOrder,
) -> SerializationService {
    let builder = factories
        .into_iter()
        .fold(SerializationConfig::builder(), |builder, factory| {
            builder.add_portable_factory(factory)
        });
    SerializationService::new(builder.byte_order(byte_order).build().unwrap()).unwrap()
}
