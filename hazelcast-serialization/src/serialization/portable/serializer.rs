//! Portable serialization framework integration.

use std::sync::Arc;

use super::context::{check_depth, read_versioned_body};
use super::writer::write_versioned;
use super::{
    DefaultPortableReader, MorphingPortableReader, Portable, PortableContext, PortableFactory,
};
use crate::error::Result;
use crate::serialization::{DataInput, DataOutput, ObjectDataInput, ObjectDataOutput};

/// Type identifier for Portable serialization.
pub const PORTABLE_TYPE_ID: i32 = -1;

/// Serializer for Portable objects.
///
/// Writes `[factoryId][classId][version][length][body]` and reads it back,
/// creating instances through the registered factories.
#[derive(Debug)]
pub struct PortableSerializer {
    context: PortableContext,
}

impl PortableSerializer {
    /// Creates a serializer over `context` with the given factories.
    ///
    /// A later factory with the same ID replaces an earlier one.
    pub fn new(
        context: PortableContext,
        factories: impl IntoIterator<Item = Arc<dyn PortableFactory>>,
    ) -> Self {
        Self {
            context: context.with_factories(factories),
        }
    }

    /// Returns the class definition registry.
    pub fn context(&self) -> &PortableContext {
        &self.context
    }

    /// Returns true if a factory is registered for `factory_id`.
    pub fn has_factory(&self, factory_id: i32) -> bool {
        self.context.has_factory(factory_id)
    }

    /// Writes a Portable object at the current position of `out`.
    pub fn write(&self, out: &mut ObjectDataOutput, portable: &dyn Portable) -> Result<()> {
        let class_def = self.context.lookup_or_register_class_definition(portable)?;
        out.write_int(portable.factory_id())?;
        out.write_int(portable.class_id())?;
        write_versioned(&self.context, out, portable, class_def)
    }

    /// Reads a Portable object from the current position of `input`.
    pub fn read(&self, input: &mut ObjectDataInput<'_>) -> Result<Box<dyn Portable>> {
        let factory_id = input.read_int()?;
        let class_id = input.read_int()?;
        let (version, body) = read_versioned_body(input)?;
        self.read_body(factory_id, class_id, version, body, 0)
    }

    /// Reads a Portable object and downcasts it to `P`.
    pub fn read_as<P: Portable>(&self, input: &mut ObjectDataInput<'_>) -> Result<P> {
        super::downcast_portable(self.read(input)?)
    }

    /// Creates an exact reader over the Portable at the current position of
    /// `input` without instantiating it.
    pub fn create_reader<'a>(
        &'a self,
        input: &mut ObjectDataInput<'a>,
    ) -> Result<DefaultPortableReader<'a>> {
        let factory_id = input.read_int()?;
        let class_id = input.read_int()?;
        let (version, body) = read_versioned_body(input)?;
        let class_def = self
            .context
            .read_class_definition(body, factory_id, class_id, version)?;
        DefaultPortableReader::new(self, body, class_def)
    }

    /// Instantiates and populates a Portable from a body found `depth`
    /// portables deep.
    ///
    /// Uses the exact reader when the local class version matches the data's
    /// version and the morphing reader otherwise.
    pub(crate) fn read_body(
        &self,
        factory_id: i32,
        class_id: i32,
        version: i32,
        body: &[u8],
        depth: usize,
    ) -> Result<Box<dyn Portable>> {
        check_depth(depth)?;
        let class_def = self
            .context
            .read_class_definition_at(body, factory_id, class_id, version, depth)?;
        let mut instance = self.context.create_instance(factory_id, class_id)?;
        let local_version = instance.class_version().unwrap_or(self.context.version());

        let reader = DefaultPortableReader::at_depth(self, body, class_def, depth)?;
        if local_version == version {
            let mut reader = reader;
            instance.read_portable(&mut reader)?;
        } else {
            tracing::trace!(
                factory_id,
                class_id,
                data_version = version,
                local_version,
                "reading portable with morphing reader"
            );
            let current = self
                .context
                .lookup_class_definition(factory_id, class_id, local_version);
            let mut reader = MorphingPortableReader::new(reader, current);
            instance.read_portable(&mut reader)?;
        }
        Ok(instance)
    }
}
