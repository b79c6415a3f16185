use chrono::{Datelike, NaiveDate, Utc};

/// Maps the current moment to the name prefix of the blobs to write.
///
/// The blob name is the prefix followed by a decimal sequence number.
pub trait NamingStrategy: Send + Sync {
    fn name_prefix(&self) -> String;
}

/// `<instance>/<partition>/<yyyy>/<MM>/<dd>/`, dated in UTC.
#[derive(Debug, Clone)]
pub struct PartitionAndDateNamingStrategy {
    partition_id: String,
    instance: String,
}

impl PartitionAndDateNamingStrategy {
    pub fn new(partition_id: impl Into<String>, instance: impl Into<String>) -> Self {
        Self {
            partition_id: partition_id.into(),
            instance: instance.into(),
        }
    }

    pub fn name_prefix_for(&self, date: NaiveDate) -> String {
        format!(
            "{}/{}/{:04}/{:02}/{:02}/",
            self.instance,
            self.partition_id,
            date.year(),
            date.month(),
            date.day()
        )
    }
}

impl NamingStrategy for PartitionAndDateNamingStrategy {
    fn name_prefix(&self) -> String {
        self.name_prefix_for(Utc::now().date_naive())
    }
}

/// Always the same prefix.
#[derive(Debug, Clone)]
pub struct FixedNamingStrategy(pub String);

impl NamingStrategy for FixedNamingStrategy {
    fn name_prefix(&self) -> String {
        self.0.clone()
    }
}
