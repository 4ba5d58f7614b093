//! Collected caller fields

use serde::{Deserialize, Serialize};
use std::fmt;

/// A caller-supplied field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    CustomerName,
    ServiceAddress,
    ZipCode,
    ProblemDescription,
    PreferredTime,
    SiteContactName,
    SiteContactPhone,
}

impl Field {
    pub const ALL: [Field; 7] = [
        Field::CustomerName,
        Field::ServiceAddress,
        Field::ZipCode,
        Field::ProblemDescription,
        Field::PreferredTime,
        Field::SiteContactName,
        Field::SiteContactPhone,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::CustomerName => "customer_name",
            Field::ServiceAddress => "service_address",
            Field::ZipCode => "zip_code",
            Field::ProblemDescription => "problem_description",
            Field::PreferredTime => "preferred_time",
            Field::SiteContactName => "site_contact_name",
            Field::SiteContactPhone => "site_contact_phone",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == name)
    }

    /// Spoken label used in read-backs
    pub fn label(&self) -> &'static str {
        match self {
            Field::CustomerName => "name",
            Field::ServiceAddress => "service address",
            Field::ZipCode => "ZIP code",
            Field::ProblemDescription => "issue",
            Field::PreferredTime => "preferred time",
            Field::SiteContactName => "on-site contact",
            Field::SiteContactPhone => "on-site contact number",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional value per field. Empty strings are never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub problem_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_contact_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_contact_phone: Option<String>,
}

impl FieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, field: Field) -> &Option<String> {
        match field {
            Field::CustomerName => &self.customer_name,
            Field::ServiceAddress => &self.service_address,
            Field::ZipCode => &self.zip_code,
            Field::ProblemDescription => &self.problem_description,
            Field::PreferredTime => &self.preferred_time,
            Field::SiteContactName => &self.site_contact_name,
            Field::SiteContactPhone => &self.site_contact_phone,
        }
    }

    fn slot_mut(&mut self, field: Field) -> &mut Option<String> {
        match field {
            Field::CustomerName => &mut self.customer_name,
            Field::ServiceAddress => &mut self.service_address,
            Field::ZipCode => &mut self.zip_code,
            Field::ProblemDescription => &mut self.problem_description,
            Field::PreferredTime => &mut self.preferred_time,
            Field::SiteContactName => &mut self.site_contact_name,
            Field::SiteContactPhone => &mut self.site_contact_phone,
        }
    }

    pub fn get(&self, field: Field) -> Option<&str> {
        self.slot(field).as_deref()
    }

    pub fn is_set(&self, field: Field) -> bool {
        self.get(field).is_some()
    }

    /// Store a value. Blank values are ignored and leave the field unchanged.
    pub fn set(&mut self, field: Field, value: impl Into<String>) -> bool {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return false;
        }
        *self.slot_mut(field) = Some(trimmed.to_string());
        true
    }

    /// Store a value only when the field is currently empty
    pub fn fill_empty(&mut self, field: Field, value: impl Into<String>) -> bool {
        if self.is_set(field) {
            return false;
        }
        self.set(field, value)
    }

    pub fn clear(&mut self, field: Field) {
        *self.slot_mut(field) = None;
    }

    /// Set fields in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (Field, &str)> {
        Field::ALL
            .into_iter()
            .filter_map(move |f| self.get(f).map(|v| (f, v)))
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_ignores_blank_values() {
        let mut fields = FieldSet::new();
        assert!(fields.set(Field::CustomerName, "  Dana  "));
        assert!(!fields.set(Field::CustomerName, "   "));
        assert_eq!(fields.get(Field::CustomerName), Some("Dana"));
    }

    #[test]
    fn test_fill_empty_never_overwrites() {
        let mut fields = FieldSet::new();
        fields.set(Field::ZipCode, "78745");
        assert!(!fields.fill_empty(Field::ZipCode, "78701"));
        assert!(fields.fill_empty(Field::ServiceAddress, "12 Oak St"));
        assert_eq!(fields.get(Field::ZipCode), Some("78745"));
        assert_eq!(fields.iter().count(), 2);
    }

    #[test]
    fn test_field_parse_round_trips_names() {
        for field in Field::ALL {
            assert_eq!(Field::parse(field.as_str()), Some(field));
        }
        assert_eq!(Field::parse("email"), None);
    }
}
