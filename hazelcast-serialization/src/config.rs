//! Serialization service configuration types and builders.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::error::SerializationError;
use crate::serialization::portable::{ClassDefinition, PortableFactory};
use crate::serialization::ByteOrder;

/// Default size of a freshly allocated output buffer.
const DEFAULT_INITIAL_OUTPUT_BUFFER_SIZE: usize = 4 * 1024;
/// Default number of buffers retained per thread.
const DEFAULT_BUFFER_POOL_MAX_ITEMS: usize = 3;
/// Default portable version.
const DEFAULT_PORTABLE_VERSION: i32 = 0;

/// Configuration error returned when validation fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    message: String,
}

impl ConfigError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the validation message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "configuration error: {}", self.message)
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for SerializationError {
    fn from(err: ConfigError) -> Self {
        SerializationError::Configuration(err.message)
    }
}

/// Buffer settings of a serialization service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct BufferSettings {
    /// Default byte order of portable payloads.
    pub byte_order: ByteOrder,
    /// Size of a freshly allocated output buffer.
    pub initial_output_buffer_size: usize,
    /// Number of buffers each thread's pool retains.
    pub buffer_pool_max_items: usize,
}

impl Default for BufferSettings {
    fn default() -> Self {
        Self {
            byte_order: ByteOrder::BigEndian,
            initial_output_buffer_size: DEFAULT_INITIAL_OUTPUT_BUFFER_SIZE,
            buffer_pool_max_items: DEFAULT_BUFFER_POOL_MAX_ITEMS,
        }
    }
}

/// Configuration of a [`SerializationService`](crate::SerializationService).
#[derive(Clone)]
pub struct SerializationConfig {
    buffers: BufferSettings,
    portable_version: i32,
    class_definitions: Vec<ClassDefinition>,
    portable_factories: Vec<Arc<dyn PortableFactory>>,
    check_class_def_errors: bool,
}

impl SerializationConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> SerializationConfigBuilder {
        SerializationConfigBuilder::new()
    }

    /// Returns the buffer settings.
    pub fn buffers(&self) -> &BufferSettings {
        &self.buffers
    }

    /// Returns the default byte order.
    pub fn byte_order(&self) -> ByteOrder {
        self.buffers.byte_order
    }

    /// Returns the default portable version.
    pub fn portable_version(&self) -> i32 {
        self.portable_version
    }

    /// Returns the explicitly configured class definitions.
    pub fn class_definitions(&self) -> &[ClassDefinition] {
        &self.class_definitions
    }

    /// Returns the configured portable factories.
    pub fn portable_factories(&self) -> &[Arc<dyn PortableFactory>] {
        &self.portable_factories
    }

    /// Returns whether nested references of configured class definitions are
    /// verified when the service starts.
    pub fn check_class_def_errors(&self) -> bool {
        self.check_class_def_errors
    }
}

impl Default for SerializationConfig {
    fn default() -> Self {
        Self {
            buffers: BufferSettings::default(),
            portable_version: DEFAULT_PORTABLE_VERSION,
            class_definitions: Vec::new(),
            portable_factories: Vec::new(),
            check_class_def_errors: true,
        }
    }
}

impl fmt::Debug for SerializationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let factory_ids: Vec<i32> = self
            .portable_factories
            .iter()
            .map(|factory| factory.factory_id())
            .collect();
        f.debug_struct("SerializationConfig")
            .field("buffers", &self.buffers)
            .field("portable_version", &self.portable_version)
            .field("class_definitions", &self.class_definitions.len())
            .field("portable_factories", &factory_ids)
            .field("check_class_def_errors", &self.check_class_def_errors)
            .finish()
    }
}

/// Builder for `SerializationConfig`.
#[derive(Default)]
pub struct SerializationConfigBuilder {
    buffers: Option<BufferSettings>,
    byte_order: Option<ByteOrder>,
    portable_version: Option<i32>,
    initial_output_buffer_size: Option<usize>,
    buffer_pool_max_items: Option<usize>,
    class_definitions: Vec<ClassDefinition>,
    portable_factories: Vec<Arc<dyn PortableFactory>>,
    check_class_def_errors: Option<bool>,
}

impl SerializationConfigBuilder {
    /// Creates a new serialization configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from a deserialized settings block; individual setters still win.
    pub fn buffers(mut self, buffers: BufferSettings) -> Self {
        self.buffers = Some(buffers);
        self
    }

    /// Sets the default byte order.
    pub fn byte_order(mut self, byte_order: ByteOrder) -> Self {
        self.byte_order = Some(byte_order);
        self
    }

    /// Sets the portable version used for objects without their own.
    pub fn portable_version(mut self, version: i32) -> Self {
        self.portable_version = Some(version);
        self
    }

    /// Sets the initial size of output buffers.
    pub fn initial_output_buffer_size(mut self, size: usize) -> Self {
        self.initial_output_buffer_size = Some(size);
        self
    }

    /// Sets how many buffers each thread's pool retains.
    pub fn buffer_pool_max_items(mut self, max_items: usize) -> Self {
        self.buffer_pool_max_items = Some(max_items);
        self
    }

    /// Adds an explicit class definition.
    pub fn add_class_definition(mut self, class_def: ClassDefinition) -> Self {
        self.class_definitions.push(class_def);
        self
    }

    /// Adds a portable factory.
    pub fn add_portable_factory(mut self, factory: Arc<dyn PortableFactory>) -> Self {
        self.portable_factories.push(factory);
        self
    }

    /// Sets whether nested references of configured definitions are verified.
    pub fn check_class_def_errors(mut self, check: bool) -> Self {
        self.check_class_def_errors = Some(check);
        self
    }

    /// Builds the serialization configuration, returning an error if validation fails.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - `portable_version` is negative
    /// - `initial_output_buffer_size` or `buffer_pool_max_items` is zero
    /// - two portable factories share a factory ID
    pub fn build(self) -> Result<SerializationConfig, ConfigError> {
        let base = self.buffers.unwrap_or_default();
        let buffers = BufferSettings {
            byte_order: self.byte_order.unwrap_or(base.byte_order),
            initial_output_buffer_size: self
                .initial_output_buffer_size
                .unwrap_or(base.initial_output_buffer_size),
            buffer_pool_max_items: self
                .buffer_pool_max_items
                .unwrap_or(base.buffer_pool_max_items),
        };
        let portable_version = self.portable_version.unwrap_or(DEFAULT_PORTABLE_VERSION);

        if portable_version < 0 {
            return Err(ConfigError::new(format!(
                "portable_version must not be negative, got {}",
                portable_version
            )));
        }

        if buffers.initial_output_buffer_size == 0 {
            return Err(ConfigError::new(
                "initial_output_buffer_size must be greater than zero",
            ));
        }

        if buffers.buffer_pool_max_items == 0 {
            return Err(ConfigError::new(
                "buffer_pool_max_items must be greater than zero",
            ));
        }

        let mut factory_ids = HashSet::new();
        for factory in &self.portable_factories {
            if !factory_ids.insert(factory.factory_id()) {
                return Err(ConfigError::new(format!(
                    "duplicate portable factory id {}",
                    factory.factory_id()
                )));
            }
        }

        Ok(SerializationConfig {
            buffers,
            portable_version,
            class_definitions: self.class_definitions,
            portable_factories: self.portable_factories,
            check_class_def_errors: self.check_class_def_errors.unwrap_or(true),
        })
    }
}
