//! Value objects for the customer domain.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Identity data of a customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub id_card: String,
    pub id_number: String,
}

impl Person {
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        date_of_birth: NaiveDate,
        id_card: impl Into<String>,
        id_number: impl Into<String>,
    ) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            date_of_birth,
            id_card: id_card.into(),
            id_number: id_number.into(),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub email: String,
    pub phone: String,
}

impl Contact {
    pub fn new(email: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            phone: phone.into(),
        }
    }
}

/// Postal address. `state` is the region, not the lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub street: String,
    pub house_number: String,
    pub zip: String,
    pub city: String,
    pub state: String,
}

impl Address {
    pub fn new(
        street: impl Into<String>,
        house_number: impl Into<String>,
        zip: impl Into<String>,
        city: impl Into<String>,
        state: impl Into<String>,
    ) -> Self {
        Self {
            street: street.into(),
            house_number: house_number.into(),
            zip: zip.into(),
            city: city.into(),
            state: state.into(),
        }
    }
}

/// Lifecycle of a customer. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LifecycleState {
    #[default]
    Open,
    Closed,
}

impl LifecycleState {
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "Open",
            Self::Closed => "Closed",
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_of_birth_serializes_as_iso_date() {
        let person = Person::new(
            "Ada",
            "Lovelace",
            NaiveDate::from_ymd_opt(1815, 12, 10).unwrap(),
            "X1",
            "N1",
        );
        let json = serde_json::to_value(&person).unwrap();
        assert_eq!(json["date_of_birth"], "1815-12-10");
        assert_eq!(person.full_name(), "Ada Lovelace");
    }

    #[test]
    fn lifecycle_defaults_to_open() {
        assert_eq!(LifecycleState::default(), LifecycleState::Open);
        assert!(LifecycleState::Closed.is_closed());
        assert_eq!(
            serde_json::to_value(LifecycleState::Closed).unwrap(),
            serde_json::json!("Closed")
        );
    }
}
