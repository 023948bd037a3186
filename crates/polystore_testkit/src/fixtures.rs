//! Test fixtures and datastore helpers.
//!
//! Provides the entities and records the scenario tests share, plus
//! convenience functions for setting up datastores and sessions.

use polystore_core::{Datastore, DatastoreConfig, Properties, Session};
use polystore_memory::{MapBackend, MemoryDatastore};
use polystore_model::{
    Entity, EntityMapping, Identifier, PersistentProperty, PropertyType, Record, Registration,
    Value,
};
use serde::Deserialize;

/// Entity name the key-value scenarios store person records under.
pub const PERSONS: &str = "persons";

/// A typed person with optimistic versioning.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Person {
    /// Assigned on first persist.
    pub id: Option<i64>,
    /// First name.
    pub firstname: String,
    /// Last name, indexed.
    pub lastname: String,
    /// Age in years.
    pub age: i32,
    /// Version maintained by the persister.
    pub version: i64,
}

impl Person {
    /// Creates an unsaved person.
    pub fn new(firstname: &str, lastname: &str, age: i32) -> Self {
        Self {
            firstname: firstname.to_string(),
            lastname: lastname.to_string(),
            age,
            ..Self::default()
        }
    }

    /// The assigned identifier.
    pub fn identifier(&self) -> Option<Identifier> {
        self.id.map(Identifier::Long)
    }
}

impl Entity for Person {
    fn mapping() -> EntityMapping<Self> {
        EntityMapping::<Self>::new(
            "person",
            "id",
            PropertyType::I64,
            |p| p.id.map(Identifier::Long),
            |p, id| p.id = id.as_long(),
        )
        .property(
            PersistentProperty::new("firstname", PropertyType::String),
            |p| Value::from(p.firstname.as_str()),
            |p, v| p.firstname = v.as_text().unwrap_or_default().to_string(),
        )
        .property(
            PersistentProperty::new("lastname", PropertyType::String).indexed(),
            |p| Value::from(p.lastname.as_str()),
            |p, v| p.lastname = v.as_text().unwrap_or_default().to_string(),
        )
        .property(
            PersistentProperty::new("age", PropertyType::I32),
            |p| Value::Int(p.age),
            |p, v| p.age = v.as_long().and_then(|n| i32::try_from(n).ok()).unwrap_or_default(),
        )
        .property(
            PersistentProperty::new("version", PropertyType::I64),
            |p| Value::Long(p.version),
            |p, v| p.version = v.as_long().unwrap_or_default(),
        )
        .version("version")
    }
}

/// A typed pet referencing its owner.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Pet {
    /// Assigned on first persist.
    pub id: Option<i64>,
    /// Name of the pet.
    pub name: String,
    /// Identifier of the owning [`Person`].
    pub owner: Option<i64>,
}

impl Entity for Pet {
    fn mapping() -> EntityMapping<Self> {
        EntityMapping::<Self>::new(
            "pet",
            "id",
            PropertyType::I64,
            |p| p.id.map(Identifier::Long),
            |p, id| p.id = id.as_long(),
        )
        .property(
            PersistentProperty::new("name", PropertyType::String),
            |p| Value::from(p.name.as_str()),
            |p, v| p.name = v.as_text().unwrap_or_default().to_string(),
        )
        .property(
            PersistentProperty::new("owner", PropertyType::Reference("person".into())),
            |p| Value::from(p.owner.map(Identifier::Long)),
            |p, v| p.owner = v.as_identifier().and_then(Identifier::as_long),
        )
    }
}

/// Registrations for every typed fixture entity.
pub fn entities() -> Vec<Registration> {
    vec![Registration::of::<Person>(), Registration::of::<Pet>()]
}

/// The first person record of the key-value scenarios.
pub fn person_one() -> Record {
    Record::new()
        .with("firstname", "Guillaume")
        .with("lastname", "Laforge")
}

/// The second person record of the key-value scenarios.
pub fn person_two() -> Record {
    Record::new()
        .with("firstname", "Jar Jar")
        .with("lastname", "Binks")
}

/// A set of records in JSON fixture form.
#[derive(Debug, Deserialize)]
pub struct FixtureSet {
    /// Entity the records belong to.
    pub entity: String,
    /// Records as flat JSON objects.
    pub records: Vec<serde_json::Map<String, serde_json::Value>>,
}

impl FixtureSet {
    /// Parses a fixture set from JSON.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// The records as [`Record`]s.
    pub fn to_records(&self) -> Vec<Record> {
        self.records
            .iter()
            .map(|fields| {
                fields
                    .iter()
                    .map(|(name, value)| (name.clone(), json_value(value)))
                    .collect()
            })
            .collect()
    }

    /// Stores every record through `session`, returning their identifiers.
    pub fn load(&self, session: &mut Session<MapBackend>) -> Vec<Identifier> {
        self.to_records()
            .into_iter()
            .map(|mut record| {
                session
                    .store(&self.entity, &mut record)
                    .expect("Failed to store fixture record")
            })
            .collect()
    }
}

fn json_value(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Long(i),
            None => n.as_f64().map_or(Value::Null, Value::Double),
        },
        serde_json::Value::String(s) => Value::Text(s.clone()),
        other => Value::Text(other.to_string()),
    }
}

/// A memory datastore with the fixture entities registered.
pub struct TestDatastore {
    /// The datastore instance.
    pub datastore: MemoryDatastore,
}

impl TestDatastore {
    /// Creates a datastore with default configuration.
    pub fn memory() -> Self {
        Self::with_config(DatastoreConfig::default())
    }

    /// Creates a datastore with the given configuration.
    pub fn with_config(config: DatastoreConfig) -> Self {
        Self {
            datastore: MemoryDatastore::new(config, &entities())
                .expect("Failed to create memory datastore"),
        }
    }

    /// Creates a datastore configured from properties.
    pub fn with_properties(properties: &Properties) -> Self {
        Self {
            datastore: MemoryDatastore::with_properties(
                DatastoreConfig::default(),
                &entities(),
                properties,
            )
            .expect("Failed to create memory datastore"),
        }
    }

    /// Opens a session.
    pub fn session(&self) -> Session<MapBackend> {
        self.datastore.connect(None).expect("Failed to open session")
    }
}

impl std::ops::Deref for TestDatastore {
    type Target = MemoryDatastore;

    fn deref(&self) -> &Self::Target {
        &self.datastore
    }
}

/// Runs a test with a fresh memory datastore.
pub fn with_datastore<F, R>(f: F) -> R
where
    F: FnOnce(&MemoryDatastore) -> R,
{
    let test = TestDatastore::memory();
    f(&test.datastore)
}

/// Runs a test with a session over a fresh memory datastore.
///
/// # Example
///
/// ```rust
/// use polystore_testkit::{person_one, with_session, PERSONS};
///
/// with_session(|session| {
///     let id = session.store(PERSONS, &mut person_one()).unwrap();
///     assert!(session.retrieve(PERSONS, &id).unwrap().is_some());
/// });
/// ```
pub fn with_session<F, R>(f: F) -> R
where
    F: FnOnce(&mut Session<MapBackend>) -> R,
{
    let test = TestDatastore::memory();
    let mut session = test.session();
    f(&mut session)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// A datastore holding the two person records. Returns their
    /// identifiers in store order.
    pub fn persons_datastore() -> (TestDatastore, Vec<Identifier>) {
        let test = TestDatastore::memory();
        let mut session = test.session();
        let ids = vec![
            session
                .store(PERSONS, &mut person_one())
                .expect("Failed to store person"),
            session
                .store(PERSONS, &mut person_two())
                .expect("Failed to store person"),
        ];
        drop(session);
        (test, ids)
    }

    /// A datastore holding `count` typed people.
    pub fn populated_datastore(count: usize) -> (TestDatastore, Vec<Identifier>) {
        let test = TestDatastore::memory();
        let mut session = test.session();
        let ids = (0..count)
            .map(|i| {
                let mut person = Person::new(&format!("first{i}"), &format!("last{}", i % 10), 20);
                session.persist(&mut person).expect("Failed to persist person")
            })
            .collect();
        drop(session);
        (test, ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{
        "entity": "persons",
        "records": [
            {"firstname": "Guillaume", "lastname": "Laforge", "age": 45},
            {"firstname": "Jar Jar", "lastname": "Binks", "height": 1.96, "jedi": false}
        ]
    }"#;

    #[test]
    fn fixture_set_parses_and_loads() {
        let set = FixtureSet::from_json(FIXTURE).unwrap();
        let records = set.to_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("age"), Some(&Value::Long(45)));
        assert_eq!(records[1].get("height"), Some(&Value::Double(1.96)));
        assert_eq!(records[1].get("jedi"), Some(&Value::Bool(false)));

        with_session(|session| {
            let ids = set.load(session);
            assert_eq!(session.list(PERSONS, None).unwrap().len(), 2);
            let second = session.retrieve(PERSONS, &ids[1]).unwrap().unwrap();
            assert_eq!(second.get("firstname"), Some(&Value::from("Jar Jar")));
        });
    }

    #[test]
    fn test_datastore_registers_fixture_entities() {
        let test = TestDatastore::memory();
        assert!(test.mapping_context().contains("person"));
        assert!(test.mapping_context().contains("pet"));
    }

    #[test]
    fn persons_scenario() {
        let (test, ids) = scenarios::persons_datastore();
        let mut session = test.session();
        let found = session.retrieve_all(PERSONS, &ids).unwrap();
        assert!(found.iter().all(Option::is_some));
    }

    #[test]
    fn populated_scenario() {
        let (test, ids) = scenarios::populated_datastore(25);
        assert_eq!(ids.len(), 25);
        assert_eq!(test.backing_store("DEFAULT").unwrap().len("person"), 25);
    }
}
