//! Tests for `#[derive(HazelcastPortable)]`.

use hazelcast_serialization::serialization::portable::{FieldType, Portable, PortableFactoryBuilder};
use hazelcast_serialization::{PortableReader, SerializationConfig, SerializationService};
use hazelcast_serialization_derive::HazelcastPortable;

#[derive(Debug, Default, Clone, PartialEq, HazelcastPortable)]
#[hazelcast(factory_id = 20, class_id = 1)]
struct Customer {
    name: String,
    age: i32,
    vip: bool,
    initial: u16,
    balance: f64,
    #[hazelcast(field_name = "emailAddress")]
    email: Option<String>,
    scores: Vec<i64>,
    ratios: Option<Vec<f32>>,
    tags: Vec<String>,
    aliases: Option<Vec<Option<String>>>,
    #[hazelcast(skip)]
    session_token: String,
}

#[derive(Debug, Default, PartialEq, HazelcastPortable)]
#[hazelcast(factory_id = 20, class_id = 2, version = 3)]
struct Versioned {
    id: i64,
}

fn service() -> SerializationService {
    let factory = PortableFactoryBuilder::new(20)
        .register::<Customer>(1)
        .register::<Versioned>(2)
        .build();
    let config = SerializationConfig::builder()
        .add_portable_factory(factory)
        .build()
        .unwrap();
    SerializationService::new(config).unwrap()
}

fn customer() -> Customer {
    Customer {
        name: "Elif".to_string(),
        age: 28,
        vip: true,
        initial: u16::from(b'E'),
        balance: 1250.75,
        email: Some("elif@example.com".to_string()),
        scores: vec![10, -20, 30],
        ratios: None,
        tags: vec!["gold".to_string(), String::new()],
        aliases: Some(vec![None, Some("ef".to_string())]),
        session_token: "secret".to_string(),
    }
}

#[test]
fn test_derived_round_trip_skips_fields() {
    let service = service();
    let data = service.to_data(&customer()).unwrap();
    let decoded = service.to_object_as::<Customer>(&data).unwrap();

    let expected = Customer {
        session_token: String::new(),
        ..customer()
    };
    assert_eq!(decoded, expected);
}

#[test]
fn test_derived_field_names_and_types() {
    let service = service();
    let data = service.to_data(&customer()).unwrap();
    let reader = service.create_portable_reader(&data).unwrap();

    assert_eq!(reader.field_type("emailAddress"), Some(FieldType::Utf));
    assert_eq!(reader.field_type("initial"), Some(FieldType::Char));
    assert_eq!(reader.field_type("scores"), Some(FieldType::LongArray));
    assert_eq!(reader.field_type("tags"), Some(FieldType::UtfArray));
    assert!(!reader.has_field("email"));
    assert!(!reader.has_field("session_token"));
    assert_eq!(reader.field_names().len(), 10);
}

#[test]
fn test_derived_version() {
    assert_eq!(Versioned::default().class_version(), Some(3));
    assert_eq!(customer().class_version(), None);
    assert_eq!(customer().factory_id(), 20);
    assert_eq!(customer().class_id(), 1);

    let service = service();
    let data = service.to_data(&Versioned { id: 7 }).unwrap();
    let reader = service.create_portable_reader(&data).unwrap();
    assert_eq!(reader.version(), 3);
    assert_eq!(service.to_object_as::<Versioned>(&data).unwrap(), Versioned { id: 7 });
}
