//! Portable binary serialization for Hazelcast clients.
//!
//! The crate provides byte buffers with selectable byte order, a bounded
//! buffer pool, a registry of class definitions, and the Portable writer and
//! readers that turn objects into the versioned, field-addressable wire format
//! shared by every Hazelcast client.
//!
//! Most users only touch [`SerializationService`]:
//!
//! ```
//! use hazelcast_serialization::serialization::portable::{
//!     Portable, PortableFactoryBuilder, PortableReader, PortableWriter,
//! };
//! use hazelcast_serialization::{Result, SerializationConfig, SerializationService};
//!
//! #[derive(Debug, Default, PartialEq)]
//! struct Greeting {
//!     text: Option<String>,
//! }
//!
//! impl Portable for Greeting {
//!     fn factory_id(&self) -> i32 {
//!         1
//!     }
//!
//!     fn class_id(&self) -> i32 {
//!         1
//!     }
//!
//!     fn write_portable(&self, writer: &mut dyn PortableWriter) -> Result<()> {
//!         writer.write_string("text", self.text.as_deref())
//!     }
//!
//!     fn read_portable(&mut self, reader: &mut dyn PortableReader) -> Result<()> {
//!         self.text = reader.read_string("text")?;
//!         Ok(())
//!     }
//! }
//!
//! # fn main() -> Result<()> {
//! let config = SerializationConfig::builder()
//!     .add_portable_factory(PortableFactoryBuilder::new(1).register::<Greeting>(1).build())
//!     .build()?;
//! let service = SerializationService::new(config)?;
//!
//! let greeting = Greeting { text: Some("merhaba".to_string()) };
//! let data = service.to_data(&greeting)?;
//! assert_eq!(service.to_object_as::<Greeting>(&data)?, greeting);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod serialization;

pub use config::{BufferSettings, ConfigError, SerializationConfig, SerializationConfigBuilder};
pub use error::{Result, SerializationError};
pub use serialization::{
    ByteOrder, ClassDefinition, ClassDefinitionBuilder, Data, DataInput, DataOutput,
    ObjectDataInput, ObjectDataOutput, Portable, PortableFactory, PortableReader,
    PortableWriter, SerializationService,
};
