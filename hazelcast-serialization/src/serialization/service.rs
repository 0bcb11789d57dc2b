//! The serialization service: configuration, pooled buffers and the `Data` envelope.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use super::portable::{
    downcast_portable, DefaultPortableReader, Portable, PortableContext, PortableSerializer,
    PORTABLE_TYPE_ID,
};
use super::{BufferPool, ByteOrder, Data, DataOutput, ObjectDataInput, ObjectDataOutput};
use crate::config::SerializationConfig;
use crate::error::{Result, SerializationError};

static NEXT_SERVICE_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static BUFFER_POOLS: RefCell<HashMap<u64, ThreadPool>> = RefCell::new(HashMap::new());
}

/// A thread's pool for one service, dropped once that service closes.
struct ThreadPool {
    pool: BufferPool,
    closed: Arc<AtomicBool>,
}

/// Converts Portable objects to and from [`Data`].
///
/// The service is `Send + Sync`. Output buffers come from a pool owned by the
/// calling thread, so concurrent calls never share a buffer.
#[derive(Debug)]
pub struct SerializationService {
    id: u64,
    portable: PortableSerializer,
    byte_order: ByteOrder,
    initial_output_buffer_size: usize,
    buffer_pool_max_items: usize,
    closed: Arc<AtomicBool>,
}

impl SerializationService {
    /// Creates a service from `config`.
    ///
    /// Registers the configured class definitions. With
    /// `check_class_def_errors`, fails with
    /// [`SerializationError::UnknownClassDefinition`] if a configured definition
    /// has a nested field whose class is not configured as well.
    pub fn new(config: SerializationConfig) -> Result<Self> {
        let context = PortableContext::new(config.portable_version(), config.byte_order());
        let registered = config
            .class_definitions()
            .iter()
            .map(|class_def| context.register_class_definition(class_def.clone()))
            .collect::<Result<Vec<_>>>()?;

        if config.check_class_def_errors() {
            for class_def in &registered {
                for field in class_def.fields() {
                    if field.field_type().is_portable()
                        && context
                            .lookup_class_definition(field.factory_id(), field.class_id(), field.version())
                            .is_none()
                    {
                        tracing::debug!(
                            factory_id = class_def.factory_id(),
                            class_id = class_def.class_id(),
                            field = field.name(),
                            "configured class definition references an unregistered class"
                        );
                        return Err(SerializationError::UnknownClassDefinition {
                            factory_id: field.factory_id(),
                            class_id: field.class_id(),
                            version: field.version(),
                        });
                    }
                }
            }
        }

        let buffers = config.buffers();
        Ok(Self {
            id: NEXT_SERVICE_ID.fetch_add(1, Ordering::Relaxed),
            portable: PortableSerializer::new(context, config.portable_factories().iter().cloned()),
            byte_order: buffers.byte_order,
            initial_output_buffer_size: buffers.initial_output_buffer_size,
            buffer_pool_max_items: buffers.buffer_pool_max_items,
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Returns the Portable serializer.
    pub fn portable_serializer(&self) -> &PortableSerializer {
        &self.portable
    }

    /// Returns the class definition registry.
    pub fn portable_context(&self) -> &PortableContext {
        self.portable.context()
    }

    /// Returns the default byte order.
    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    /// Serializes a Portable object.
    pub fn to_data(&self, portable: &dyn Portable) -> Result<Data> {
        self.ensure_running()?;
        self.with_output(|out| {
            out.write_int_with(0, ByteOrder::BigEndian)?;
            out.write_int_with(PORTABLE_TYPE_ID, ByteOrder::BigEndian)?;
            self.portable.write(out, portable)?;
            Data::new(out.to_bytes())
        })
    }

    /// Deserializes a Portable object through the registered factories.
    pub fn to_object(&self, data: &Data) -> Result<Box<dyn Portable>> {
        let mut input = self.portable_input(data)?;
        self.portable.read(&mut input)
    }

    /// Deserializes a Portable object and downcasts it to `P`.
    pub fn to_object_as<P: Portable>(&self, data: &Data) -> Result<P> {
        downcast_portable(self.to_object(data)?)
    }

    /// Creates a reader over the fields of a serialized Portable without
    /// instantiating it. No factory is needed.
    pub fn create_portable_reader<'a>(&'a self, data: &'a Data) -> Result<DefaultPortableReader<'a>> {
        let mut input = self.portable_input(data)?;
        self.portable.create_reader(&mut input)
    }

    /// Creates an input over `bytes` using the service's byte order.
    pub fn create_object_data_input<'a>(&self, bytes: &'a [u8]) -> ObjectDataInput<'a> {
        ObjectDataInput::with_byte_order(bytes, self.byte_order)
    }

    /// Creates an unpooled output using the service's byte order and initial size.
    pub fn create_object_data_output(&self) -> ObjectDataOutput {
        ObjectDataOutput::with_byte_order(self.initial_output_buffer_size, self.byte_order)
    }

    /// Shuts the service down.
    ///
    /// The calling thread's buffer pool is disposed at once. Pools held by
    /// other threads are dropped the next time those threads serialize with
    /// any service. Every later call fails with
    /// [`SerializationError::Unavailable`].
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::debug!(service_id = self.id, "serialization service shut down");
        self.release_thread_pool();
    }

    /// Returns true once [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_shut_down() {
            return Err(SerializationError::Unavailable(
                "serialization service has been shut down".to_string(),
            ));
        }
        Ok(())
    }

    fn portable_input<'a>(&self, data: &'a Data) -> Result<ObjectDataInput<'a>> {
        self.ensure_running()?;
        if data.type_id() != PORTABLE_TYPE_ID {
            return Err(SerializationError::Serialization(format!(
                "no serializer for type id {}",
                data.type_id()
            )));
        }
        Ok(self.create_object_data_input(data.payload()))
    }

    /// Runs `f` with an output leased from the calling thread's pool.
    ///
    /// Pools of closed services are dropped first. Falls back to a fresh
    /// buffer when the pool is already in use further up the stack or the
    /// thread is shutting down.
    fn with_output<R>(&self, f: impl FnOnce(&mut ObjectDataOutput) -> Result<R>) -> Result<R> {
        let mut f = Some(f);
        let pooled = BUFFER_POOLS.try_with(|pools| {
            let Ok(mut pools) = pools.try_borrow_mut() else {
                return None;
            };
            pools.retain(|_, entry| !entry.closed.load(Ordering::Acquire));
            if self.is_shut_down() {
                return Some(Err(SerializationError::Unavailable(
                    "buffer pool has been disposed".to_string(),
                )));
            }
            let entry = pools.entry(self.id).or_insert_with(|| ThreadPool {
                pool: BufferPool::new(
                    self.buffer_pool_max_items,
                    self.initial_output_buffer_size,
                    self.byte_order,
                ),
                closed: Arc::clone(&self.closed),
            });
            let run = f.take()?;
            Some(
                entry
                    .pool
                    .lease(self.initial_output_buffer_size)
                    .and_then(|mut lease| run(&mut *lease)),
            )
        });

        match (pooled, f) {
            (Ok(Some(result)), _) => result,
            (_, Some(f)) => f(&mut self.create_object_data_output()),
            (_, None) => Err(SerializationError::Unavailable(
                "buffer pool is not available".to_string(),
            )),
        }
    }

    fn release_thread_pool(&self) {
        // The thread-local is gone once this thread has started exiting.
        BUFFER_POOLS
            .try_with(|pools| {
                if let Ok(mut pools) = pools.try_borrow_mut() {
                    if let Some(mut entry) = pools.remove(&self.id) {
                        entry.pool.dispose();
                    }
                }
            })
            .ok();
    }
}

impl Drop for SerializationService {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::Release);
        self.release_thread_pool();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialization::portable::{PortableFactoryBuilder, PortableReader, PortableWriter};

    #[derive(Debug, Default, PartialEq)]
    struct Counter {
        value: i64,
    }

    impl Portable for Counter {
        fn factory_id(&self) -> i32 {
            8
        }

        fn class_id(&self) -> i32 {
            1
        }

        fn write_portable(&self, writer: &mut dyn PortableWriter) -> Result<()> {
            writer.write_long("value", self.value)
        }

        fn read_portable(&mut self, reader: &mut dyn PortableReader) -> Result<()> {
            self.value = reader.read_long("value")?;
            Ok(())
        }
    }

    fn service() -> SerializationService {
        let config = SerializationConfig::builder()
            .add_portable_factory(PortableFactoryBuilder::new(8).register::<Counter>(1).build())
            .build()
            .unwrap();
        SerializationService::new(config).unwrap()
    }

    fn pooled_buffers(service: &SerializationService) -> usize {
        BUFFER_POOLS.with(|pools| {
            pools
                .borrow()
                .get(&service.id)
                .map_or(0, |entry| entry.pool.len())
        })
    }

    fn thread_pools() -> usize {
        BUFFER_POOLS.with(|pools| pools.borrow().len())
    }

    #[test]
    fn test_round_trip() {
        let service = service();
        let data = service.to_data(&Counter { value: 17 }).unwrap();
        assert_eq!(data.type_id(), PORTABLE_TYPE_ID);
        assert!(!data.has_partition_hash());
        assert_eq!(service.to_object_as::<Counter>(&data).unwrap(), Counter { value: 17 });
    }

    #[test]
    fn test_buffer_returns_to_thread_pool() {
        let service = service();
        service.to_data(&Counter { value: 1 }).unwrap();
        service.to_data(&Counter { value: 2 }).unwrap();
        assert_eq!(pooled_buffers(&service), 1);
    }

    #[test]
    fn test_buffer_returns_on_error() {
        struct Broken;

        impl Portable for Broken {
            fn factory_id(&self) -> i32 {
                8
            }

            fn class_id(&self) -> i32 {
                2
            }

            fn write_portable(&self, writer: &mut dyn PortableWriter) -> Result<()> {
                writer.write_int("a", 1)?;
                writer.write_int("a", 2)
            }

            fn read_portable(&mut self, _reader: &mut dyn PortableReader) -> Result<()> {
                Ok(())
            }
        }

        let service = service();
        assert!(service.to_data(&Broken).is_err());
        assert_eq!(pooled_buffers(&service), 1);
    }

    #[test]
    fn test_shutdown_rejects_calls() {
        let service = service();
        let data = service.to_data(&Counter { value: 1 }).unwrap();
        service.shutdown();

        assert!(service.is_shut_down());
        assert_eq!(pooled_buffers(&service), 0);
        assert!(matches!(
            service.to_data(&Counter { value: 1 }),
            Err(SerializationError::Unavailable(_))
        ));
        assert!(matches!(
            service.to_object(&data),
            Err(SerializationError::Unavailable(_))
        ));
    }

    #[test]
    fn test_rejects_other_type_ids() {
        let service = service();
        let data = Data::from_payload(-2, &[]);
        assert!(matches!(
            service.to_object(&data),
            Err(SerializationError::Serialization(_))
        ));
    }

    #[test]
    fn test_services_have_separate_pools() {
        let a = service();
        let b = service();
        a.to_data(&Counter { value: 1 }).unwrap();
        assert_eq!(pooled_buffers(&a), 1);
        assert_eq!(pooled_buffers(&b), 0);
    }

    #[test]
    fn test_configured_nested_class_must_be_configured() {
        use crate::serialization::portable::ClassDefinitionBuilder;

        let address = ClassDefinitionBuilder::new(8, 3)
            .add_int_field("zip")
            .build()
            .unwrap();
        let person = ClassDefinitionBuilder::new(8, 2)
            .add_string_field("name")
            .add_portable_field("address", &address)
            .build()
            .unwrap();

        let config = SerializationConfig::builder()
            .add_class_definition(person.clone())
            .build()
            .unwrap();
        assert!(matches!(
            SerializationService::new(config),
            Err(SerializationError::UnknownClassDefinition {
                factory_id: 8,
                class_id: 3,
                version: 0
            })
        ));

        let unchecked = SerializationConfig::builder()
            .add_class_definition(person.clone())
            .check_class_def_errors(false)
            .build()
            .unwrap();
        assert!(SerializationService::new(unchecked).is_ok());

        let complete = SerializationConfig::builder()
            .add_class_definition(person)
            .add_class_definition(address)
            .build()
            .unwrap();
        let service = SerializationService::new(complete).unwrap();
        assert!(service.portable_context().lookup_class_definition(8, 3, 0).is_some());
    }

    #[test]
    fn test_worker_drops_pools_of_closed_services() {
        let worker = std::thread::spawn(|| {
            let (tx, rx) = std::sync::mpsc::channel::<SerializationService>();
            let dropper = std::thread::spawn(move || {
                for service in rx {
                    drop(service);
                }
            });

            for _ in 0..100 {
                let service = service();
                service.to_data(&Counter { value: 1 }).unwrap();
                tx.send(service).unwrap();
            }
            drop(tx);
            dropper.join().unwrap();
            assert_eq!(thread_pools(), 100);

            let live = service();
            live.to_data(&Counter { value: 2 }).unwrap();
            assert_eq!(thread_pools(), 1);

            let other = Arc::new(service());
            other.to_data(&Counter { value: 3 }).unwrap();
            let remote = Arc::clone(&other);
            std::thread::spawn(move || remote.shutdown()).join().unwrap();
            live.to_data(&Counter { value: 4 }).unwrap();
            assert_eq!(thread_pools(), 1);
            assert!(matches!(
                other.to_data(&Counter { value: 5 }),
                Err(SerializationError::Unavailable(_))
            ));
        });
        worker.join().unwrap();
    }

    #[test]
    fn test_service_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SerializationService>();
    }
}
