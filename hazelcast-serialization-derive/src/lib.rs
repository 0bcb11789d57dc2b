//! Derive macro for Hazelcast Portable serialization.
//!
//! # Example
//!
//! ```ignore
//! use hazelcast_serialization_derive::HazelcastPortable;
//!
//! #[derive(Default, HazelcastPortable)]
//! #[hazelcast(factory_id = 1, class_id = 2, version = 1)]
//! struct Person {
//!     name: String,
//!     age: i32,
//!     #[hazelcast(field_name = "emailAddress")]
//!     email: Option<String>,
//!     #[hazelcast(skip)]
//!     cached_display_name: String,
//! }
//! ```

extern crate proc_macro;

mod portable;

use proc_macro::TokenStream;

/// Derives the `Portable` trait for a struct.
///
/// Fields are written in declaration order.
///
/// # Attributes
///
/// ## Struct-level
/// - `#[hazelcast(factory_id = N)]` (required): the portable factory ID.
/// - `#[hazelcast(class_id = N)]` (required): the portable class ID.
/// - `#[hazelcast(version = N)]`: the class version. Without it the service's
///   configured portable version applies.
///
/// ## Field-level
/// - `#[hazelcast(field_name = "...")]`: overrides the wire field name.
/// - `#[hazelcast(skip)]`: leaves the field out; reads keep its current value.
///
/// # Supported Field Types
///
/// `bool`, `i8`, `u16` (char), `i16`, `i32`, `i64`, `f32`, `f64`, `String`,
/// `Option<String>`, `Vec<T>` and `Option<Vec<T>>` of those primitives,
/// `Vec<String>`, `Vec<Option<String>>` and `Option<Vec<Option<String>>>`.
/// A null string or array read into a non-`Option` field becomes empty.
#[proc_macro_derive(HazelcastPortable, attributes(hazelcast))]
pub fn derive_portable(input: TokenStream) -> TokenStream {
    portable::derive_portable_impl(input)
}
