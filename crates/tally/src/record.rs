// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Sentinel label for any attribute the source did not provide or we could not parse.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Closed label sets with an `Unknown` sentinel. Serialises to the label string and
/// deserialises leniently: unrecognised, null or missing values become `Unknown`.
macro_rules! labelled_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $label:literal $(| $alias:literal)*),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub enum $name {
            $($variant,)+
            #[default]
            Unknown,
        }

        impl $name {
            pub const KNOWN: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label,)+
                    $name::Unknown => UNKNOWN_LABEL,
                }
            }

            pub fn parse_lenient(raw: &str) -> Self {
                let trimmed = raw.trim();
                $(
                    if trimmed.eq_ignore_ascii_case($label) $(|| trimmed.eq_ignore_ascii_case($alias))* {
                        return $name::$variant;
                    }
                )+
                $name::Unknown
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

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = Value::deserialize(deserializer)?;
                Ok(match raw {
                    Value::String(s) => $name::parse_lenient(&s),
                    Value::Number(n) => $name::parse_lenient(&n.to_string()),
                    _ => $name::Unknown,
                })
            }
        }
    };
}

labelled_enum!(
    Category {
        WaterSupply => "Water Supply" | "water" | "water_supply",
        Roads => "Roads" | "road",
        WasteManagement => "Waste Management" | "waste",
        Safety => "Safety",
        Health => "Health",
        Electricity => "Electricity",
        Sanitation => "Sanitation",
        PublicTransport => "Public Transport" | "transport",
    }
);

labelled_enum!(
    /// Socio-economic tier of a ward.
    WardType {
        Elite => "Elite",
        Middle => "Middle",
        Poor => "Poor",
        Slum => "Slum",
    }
);

labelled_enum!(
    Gender {
        Male => "M" | "male",
        Female => "F" | "female",
        Other => "Other",
    }
);

labelled_enum!(
    Caste {
        General => "General",
        Obc => "OBC",
        Sc => "SC",
        St => "ST",
    }
);

labelled_enum!(
    IncomeBracket {
        UpTo3L => "0-3L",
        From3To6L => "3-6L",
        From6To10L => "6-10L",
        Above10L => "10L+",
    }
);

labelled_enum!(
    ResponseStatus {
        NoResponse => "NO_RESPONSE" | "no response",
        Responded => "RESPONDED",
        Resolved => "RESOLVED",
        Rejected => "REJECTED",
    }
);

impl WardType {
    /// Zone tier from the ward number: 1-10 Elite, 11-25 Middle, 26-40 Poor, 41+ Slum.
    pub fn from_ward(ward: &str) -> Self {
        let digits: String = ward.chars().filter(char::is_ascii_digit).collect();
        match digits.parse::<u32>() {
            Ok(0) | Err(_) => WardType::Unknown,
            Ok(1..=10) => WardType::Elite,
            Ok(11..=25) => WardType::Middle,
            Ok(26..=40) => WardType::Poor,
            Ok(_) => WardType::Slum,
        }
    }
}

/// Days beyond which the score stops growing.
const SCORE_HORIZON_DAYS: f64 = 365.0;

/// Silence score in [0, 100], rounded to two decimals.
///
/// Unanswered complaints climb linearly to 100 over a year, rejected ones start at 70,
/// responded-but-open ones cap at 60, and resolved ones decay from 30 with resolution time.
/// An unknown status is scored as unanswered.
pub fn silence_score(status: ResponseStatus, days_in_system: u32) -> f64 {
    let days = f64::from(days_in_system);
    let horizon = days.min(SCORE_HORIZON_DAYS) / SCORE_HORIZON_DAYS;
    let raw = match status {
        ResponseStatus::NoResponse | ResponseStatus::Unknown => 100.0 * horizon,
        ResponseStatus::Rejected => 70.0 + 30.0 * horizon,
        ResponseStatus::Responded => 60.0 * horizon,
        ResponseStatus::Resolved => (30.0 - days / 30.0).max(0.0),
    };
    clamp_score((raw * 100.0).round() / 100.0)
}

fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 100.0)
    }
}

/// The fixed set of groupable fields, in detection priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Caste,
    Gender,
    IncomeBracket,
    Ward,
    Category,
    WardType,
    ResponseStatus,
}

impl Field {
    pub const ALL: [Field; 7] = [
        Field::Caste,
        Field::Gender,
        Field::IncomeBracket,
        Field::Ward,
        Field::Category,
        Field::WardType,
        Field::ResponseStatus,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Caste => "caste",
            Field::Gender => "gender",
            Field::IncomeBracket => "income_bracket",
            Field::Ward => "ward",
            Field::Category => "category",
            Field::WardType => "ward_type",
            Field::ResponseStatus => "response_status",
        }
    }

    /// Human label used in titles, e.g. `income_bracket` -> `Income Bracket`.
    pub fn label(&self) -> String {
        title_case(self.as_str())
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Field {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        Field::ALL
            .into_iter()
            .find(|field| field.as_str() == lowered)
            .ok_or_else(|| format!("unsupported field '{s}'"))
    }
}

/// `snake_case` -> `Title Case`.
pub fn title_case(raw: &str) -> String {
    raw.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// One civic complaint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RecordPayload")]
pub struct Record {
    pub id: u64,
    pub text: String,
    pub category: Category,
    pub ward: String,
    pub ward_type: WardType,
    pub gender: Gender,
    pub caste: Caste,
    pub income_bracket: IncomeBracket,
    pub response_status: ResponseStatus,
    pub days_in_system: u32,
    pub silence_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_submitted: Option<NaiveDate>,
}

/// Wire shape of a record as stored by the source; every field optional.
#[derive(Debug, Default, Deserialize)]
struct RecordPayload {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    category: Category,
    #[serde(default)]
    ward: Option<Value>,
    #[serde(default)]
    ward_type: WardType,
    #[serde(default)]
    gender: Gender,
    #[serde(default)]
    caste: Caste,
    #[serde(default)]
    income_bracket: IncomeBracket,
    #[serde(default)]
    response_status: ResponseStatus,
    #[serde(default)]
    days_in_system: Option<f64>,
    #[serde(default)]
    silence_score: Option<f64>,
    #[serde(default)]
    date_submitted: Option<String>,
}

impl From<RecordPayload> for Record {
    fn from(payload: RecordPayload) -> Self {
        let ward = match payload.ward {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            Some(Value::Number(n)) => format!("Ward {n}"),
            _ => UNKNOWN_LABEL.to_string(),
        };
        let days_in_system = payload
            .days_in_system
            .filter(|d| d.is_finite())
            .map(|d| d.max(0.0).min(f64::from(u32::MAX)) as u32)
            .unwrap_or(0);
        let ward_type = match payload.ward_type {
            WardType::Unknown => WardType::from_ward(&ward),
            known => known,
        };
        let silence_score = payload
            .silence_score
            .filter(|s| s.is_finite())
            .map(clamp_score)
            .unwrap_or_else(|| silence_score(payload.response_status, days_in_system));
        let date_submitted = payload
            .date_submitted
            .and_then(|raw| {
                NaiveDate::parse_from_str(raw.get(..10).unwrap_or(raw.as_str()), "%Y-%m-%d").ok()
            });

        Record {
            id: payload.id.unwrap_or(0),
            text: payload.text.unwrap_or_default(),
            category: payload.category,
            ward,
            ward_type,
            gender: payload.gender,
            caste: payload.caste,
            income_bracket: payload.income_bracket,
            response_status: payload.response_status,
            days_in_system,
            silence_score,
            date_submitted,
        }
    }
}

impl Record {
    /// Record with derived zone and score; demographics start as `Unknown`.
    pub fn new(
        id: u64,
        category: Category,
        ward: impl Into<String>,
        response_status: ResponseStatus,
        days_in_system: u32,
    ) -> Self {
        let ward = ward.into();
        Self {
            id,
            text: String::new(),
            category,
            ward_type: WardType::from_ward(&ward),
            ward,
            gender: Gender::Unknown,
            caste: Caste::Unknown,
            income_bracket: IncomeBracket::Unknown,
            response_status,
            days_in_system,
            silence_score: silence_score(response_status, days_in_system),
            date_submitted: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_demographics(mut self, gender: Gender, caste: Caste, income: IncomeBracket) -> Self {
        self.gender = gender;
        self.caste = caste;
        self.income_bracket = income;
        self
    }

    /// Overrides the derived score; clamped into [0, 100].
    pub fn with_score(mut self, score: f64) -> Self {
        self.silence_score = clamp_score(score);
        self
    }

    /// Stringified value of a groupable field.
    pub fn value(&self, field: Field) -> &str {
        match field {
            Field::Caste => self.caste.as_str(),
            Field::Gender => self.gender.as_str(),
            Field::IncomeBracket => self.income_bracket.as_str(),
            Field::Ward => &self.ward,
            Field::Category => self.category.as_str(),
            Field::WardType => self.ward_type.as_str(),
            Field::ResponseStatus => self.response_status.as_str(),
        }
    }

    /// Lookup by field name; `None` for names outside the field set.
    pub fn value_of(&self, field_name: &str) -> Option<&str> {
        field_name.parse::<Field>().ok().map(|field| self.value(field))
    }

    pub fn is_silenced(&self) -> bool {
        self.silence_score > crate::metrics::SILENCED_THRESHOLD
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn silence_score_follows_status_rules() {
        assert_eq!(silence_score(ResponseStatus::NoResponse, 365), 100.0);
        assert_eq!(silence_score(ResponseStatus::NoResponse, 800), 100.0);
        assert_eq!(silence_score(ResponseStatus::Rejected, 0), 70.0);
        assert_eq!(silence_score(ResponseStatus::Responded, 365), 60.0);
        assert_eq!(silence_score(ResponseStatus::Resolved, 30), 29.0);
        assert_eq!(silence_score(ResponseStatus::Resolved, 3650), 0.0);
        assert_eq!(silence_score(ResponseStatus::NoResponse, 73), 20.0);
    }

    #[test]
    fn ward_type_is_derived_from_ward_number() {
        assert_eq!(WardType::from_ward("Ward 3"), WardType::Elite);
        assert_eq!(WardType::from_ward("Ward 11"), WardType::Middle);
        assert_eq!(WardType::from_ward("Ward 40"), WardType::Poor);
        assert_eq!(WardType::from_ward("Ward 50"), WardType::Slum);
        assert_eq!(WardType::from_ward("Downtown"), WardType::Unknown);
    }

    #[test]
    fn payload_decoding_is_lenient() {
        let record: Record = serde_json::from_value(json!({
            "id": 7,
            "text": "No water for days",
            "category": "Water Supply",
            "ward": "Ward 45",
            "gender": null,
            "caste": "sc",
            "income_bracket": "9-99L",
            "response_status": "NO_RESPONSE",
            "days_in_system": -4,
            "date_submitted": "2024-03-01T00:00:00"
        }))
        .unwrap();
        assert_eq!(record.category, Category::WaterSupply);
        assert_eq!(record.ward_type, WardType::Slum);
        assert_eq!(record.gender, Gender::Unknown);
        assert_eq!(record.caste, Caste::Sc);
        assert_eq!(record.income_bracket, IncomeBracket::Unknown);
        assert_eq!(record.days_in_system, 0);
        assert_eq!(record.silence_score, 0.0);
        assert_eq!(
            record.date_submitted,
            NaiveDate::from_ymd_opt(2024, 3, 1)
        );
    }

    #[test]
    fn stored_scores_are_clamped() {
        let record: Record =
            serde_json::from_value(json!({"silence_score": 140.0, "ward": 12})).unwrap();
        assert_eq!(record.silence_score, 100.0);
        assert_eq!(record.ward, "Ward 12");
        assert_eq!(record.category, Category::Unknown);
        assert_eq!(record.value(Field::Category), UNKNOWN_LABEL);
    }

    #[test]
    fn serialises_labels_and_round_trips() {
        let record = Record::new(1, Category::PublicTransport, "Ward 2", ResponseStatus::Rejected, 0)
            .with_demographics(Gender::Female, Caste::Obc, IncomeBracket::Above10L);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["category"], "Public Transport");
        assert_eq!(value["income_bracket"], "10L+");
        assert_eq!(value["ward_type"], "Elite");
        let back: Record = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn field_names_resolve() {
        assert_eq!("income_bracket".parse::<Field>(), Ok(Field::IncomeBracket));
        assert!("district".parse::<Field>().is_err());
        assert_eq!(Field::WardType.label(), "Ward Type");
        let record = Record::new(1, Category::Roads, "Ward 9", ResponseStatus::Resolved, 10);
        assert_eq!(record.value_of("ward"), Some("Ward 9"));
        assert_eq!(record.value_of("district"), None);
    }
}
