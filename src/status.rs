//! Fixed status vocabularies.
//!
//! Validation is membership only: any value in the vocabulary may replace any other, there is no
//! ordering between them.

use std::{fmt, str::FromStr};

use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid {field}")]
pub struct InvalidValue {
    pub field: &'static str,
    pub value: String,
}

impl From<InvalidValue> for AppError {
    fn from(value: InvalidValue) -> Self {
        AppError::bad_request(value.to_string())
    }
}

macro_rules! vocabulary {
    ($(#[$meta:meta])* $name:ident, $field:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub const fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = InvalidValue;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($text => Ok($name::$variant),)+
                    other => Err(InvalidValue {
                        field: $field,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }
    };
}

vocabulary! {
    /// Where a tracked applicant stands.
    ApplicantStatus, "status" {
        Pending => "pending",
        Interviewed => "interviewed",
        Hired => "hired",
    }
}

vocabulary! {
    /// Lifecycle of an application against a job posting.
    ApplicationStatus, "status" {
        Applied => "Applied",
        Reviewed => "Reviewed",
        InterviewScheduled => "Interview Scheduled",
        OfferExtended => "Offer Extended",
        Hired => "Hired",
        Rejected => "Rejected",
    }
}

vocabulary! {
    TaskStatus, "status" {
        Pending => "pending",
        InProgress => "in_progress",
        Completed => "completed",
        OnHold => "on_hold",
        Cancelled => "cancelled",
    }
}

vocabulary! {
    TaskPriority, "priority" {
        Low => "low",
        Medium => "medium",
        High => "high",
        Urgent => "urgent",
    }
}

impl Default for ApplicantStatus {
    fn default() -> Self {
        ApplicantStatus::Pending
    }
}

impl Default for ApplicationStatus {
    fn default() -> Self {
        ApplicationStatus::Applied
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        TaskStatus::Pending
    }
}

impl Default for TaskPriority {
    fn default() -> Self {
        TaskPriority::Medium
    }
}

/// Parses an optional raw status, treating a missing value as invalid.
pub fn require<T>(raw: Option<&str>, field: &'static str) -> Result<T, InvalidValue>
where
    T: FromStr<Err = InvalidValue>,
{
    match raw {
        Some(value) => value.parse(),
        None => Err(InvalidValue {
            field,
            value: String::new(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applicant_vocabulary_is_exact() {
        assert_eq!(
            "interviewed".parse::<ApplicantStatus>().unwrap(),
            ApplicantStatus::Interviewed
        );
        for bad in ["approved", "Pending", "HIRED", "", " hired"] {
            let err = bad.parse::<ApplicantStatus>().unwrap_err();
            assert_eq!(err.to_string(), "Invalid status");
        }
    }

    #[test]
    fn application_vocabulary_accepts_spaced_values() {
        assert_eq!(
            "Interview Scheduled".parse::<ApplicationStatus>().unwrap(),
            ApplicationStatus::InterviewScheduled
        );
        assert_eq!(
            "Offer Extended".parse::<ApplicationStatus>().unwrap(),
            ApplicationStatus::OfferExtended
        );
        assert!("interview scheduled".parse::<ApplicationStatus>().is_err());
        assert!("Withdrawn".parse::<ApplicationStatus>().is_err());
        assert_eq!(ApplicationStatus::ALL.len(), 6);
    }

    #[test]
    fn missing_value_is_rejected() {
        let err = require::<ApplicantStatus>(None, "status").unwrap_err();
        assert_eq!(err.to_string(), "Invalid status");
        let err = "later".parse::<TaskPriority>().unwrap_err();
        assert_eq!(err.to_string(), "Invalid priority");
    }

    #[test]
    fn serializes_as_wire_text() {
        let json = serde_json::to_string(&ApplicationStatus::OfferExtended).unwrap();
        assert_eq!(json, "\"Offer Extended\"");
    }
}
