//! Benchmark utilities.

use polystore_model::Record;
use polystore_testkit::Person;
use rand::distributions::Alphanumeric;
use rand::Rng;

/// Generate a random alphanumeric string of the specified length.
pub fn random_text(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Generate a schemaless record with `fields` text fields of `size` bytes.
pub fn random_record(fields: usize, size: usize) -> Record {
    (0..fields)
        .map(|i| (format!("field_{i}"), random_text(size).into()))
        .collect()
}

/// Generate unsaved people whose last names cycle through `distinct`
/// values.
pub fn generate_people(count: usize, distinct: usize) -> Vec<Person> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|i| {
            Person::new(
                &random_text(8),
                &format!("last_{}", i % distinct.max(1)),
                rng.gen_range(0..100),
            )
        })
        .collect()
}
