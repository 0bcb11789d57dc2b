//! Serialization framework for Hazelcast's Portable binary format.

mod buffer_pool;
mod byte_order;
mod data;
mod data_input;
mod data_output;
pub mod portable;
mod service;

pub use buffer_pool::{BufferPool, PooledOutput, DEFAULT_MAX_POOLED_ITEMS};
pub use byte_order::ByteOrder;
pub use data::{Data, DATA_OFFSET};
pub use data_input::{DataInput, ObjectDataInput};
pub use data_output::{DataOutput, ObjectDataOutput, DEFAULT_INITIAL_SIZE, NULL_ARRAY_LENGTH};
pub use portable::{
    ClassDefinition, ClassDefinitionBuilder, DefaultPortableReader, DefaultPortableWriter,
    FieldDefinition, FieldType, MorphingPortableReader, Portable, PortableContext,
    PortableFactory, PortableFactoryBuilder, PortableReader, PortableSerializer, PortableWriter,
    PORTABLE_TYPE_ID,
};
pub use service::SerializationService;
