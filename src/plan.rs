//! The booking plan: the shared workflow template plus per-session logins.
//!
//! The engine treats most of this as opaque data handed to the handlers.
//! Plans are stored as JSON.

use std::fmt;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{PlanError, TatkalError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingPlan {
    #[serde(flatten)]
    pub template: WorkflowTemplate,
    #[serde(default)]
    pub logins: Vec<Credentials>,
}

/// Everything every session of a fleet shares.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    pub train: TrainDetails,
    #[serde(default)]
    pub passengers: Vec<Passenger>,
    #[serde(default)]
    pub contact: Contact,
    #[serde(default)]
    pub preferences: Preferences,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainDetails {
    pub from_code: String,
    pub to_code: String,
    /// Journey date as `DDMMYYYY`.
    pub date: String,
    pub train_no: String,
    /// Display name with the class code in parentheses, e.g. `AC 3 Tier (3A)`.
    pub class: String,
    pub quota: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Passenger {
    pub name: String,
    pub age: String,
    pub sex: Sex,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub berth: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sex {
    Male,
    Female,
    Transgender,
}

impl Sex {
    /// The letter the booking form's gender dropdown shows.
    pub fn code(self) -> &'static str {
        match self {
            Sex::Male => "M",
            Sex::Female => "F",
            Sex::Transgender => "T",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Contact {
    #[serde(default)]
    pub phone: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PaymentMethod {
    #[default]
    #[serde(rename = "Pay through BHIM UPI")]
    Upi,
    #[serde(rename = "Pay through IRCTC Wallet")]
    Wallet,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub payment: PaymentMethod,
    #[serde(default)]
    pub upi_id: String,
    /// Wait for the booking window to open before searching.
    #[serde(default)]
    pub timed: bool,
    /// AC classes open an hour before the others.
    #[serde(default = "default_true")]
    pub ac: bool,
    #[serde(default)]
    pub headless: bool,
    #[serde(default = "default_browser_count")]
    pub browser_count: usize,
}

fn default_true() -> bool {
    true
}

fn default_browser_count() -> usize {
    1
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            payment: PaymentMethod::default(),
            upi_id: String::new(),
            timed: false,
            ac: true,
            headless: false,
            browser_count: default_browser_count(),
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl Credentials {
    pub fn is_complete(&self) -> bool {
        !self.username.trim().is_empty() && !self.password.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"********")
            .finish()
    }
}

/// What one session works from: its own login and the shared template.
#[derive(Debug, Clone)]
pub struct SessionPlan {
    pub instance_id: u32,
    pub credentials: Credentials,
    pub template: std::sync::Arc<WorkflowTemplate>,
}

impl BookingPlan {
    pub fn load(path: &Path) -> Result<Self, TatkalError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

impl TrainDetails {
    /// The code between the parentheses of the class name.
    pub fn class_code(&self) -> Result<&str, PlanError> {
        let open = self.class.rfind('(');
        let close = self.class.rfind(')');
        match (open, close) {
            (Some(open), Some(close)) if close > open + 1 => {
                let code = self.class[open + 1..close].trim();
                if code.is_empty() || code.contains(char::is_whitespace) {
                    Err(PlanError::ClassCode(self.class.clone()))
                } else {
                    Ok(code)
                }
            }
            _ => Err(PlanError::ClassCode(self.class.clone())),
        }
    }

    pub fn journey_date(&self) -> Result<NaiveDate, PlanError> {
        NaiveDate::parse_from_str(&self.date, "%d%m%Y")
            .map_err(|_| PlanError::JourneyDate(self.date.clone()))
    }

    /// Date as the search form expects it, `DD/MM/YYYY`.
    pub fn form_date(&self) -> Result<String, PlanError> {
        Ok(self.journey_date()?.format("%d/%m/%Y").to_string())
    }

    /// Id of the quota radio button on the results page.
    pub fn quota_id(&self) -> String {
        self.quota.trim().to_lowercase()
    }
}

impl WorkflowTemplate {
    pub fn max_passengers(&self) -> usize {
        match self.train.quota.trim().to_uppercase().as_str() {
            "TATKAL" | "PREMIUM TATKAL" => 4,
            _ => 6,
        }
    }

    /// Catch plan mistakes before any browser is launched.
    pub fn validate(&self) -> Result<(), PlanError> {
        self.train.class_code()?;
        self.train.journey_date()?;
        if self.passengers.is_empty() {
            return Err(PlanError::NoPassengers);
        }
        let max = self.max_passengers();
        if self.passengers.len() > max {
            return Err(PlanError::TooManyPassengers {
                quota: self.train.quota.clone(),
                max,
                count: self.passengers.len(),
            });
        }
        if let Some(index) = self.passengers.iter().position(|p| p.name.trim().is_empty()) {
            return Err(PlanError::PassengerName(index + 1));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "train": {
            "from_code": "NDLS",
            "to_code": "HWH",
            "date": "25122026",
            "train_no": "12302",
            "class": "AC 3 Tier (3A)",
            "quota": "TATKAL"
        },
        "passengers": [
            { "name": "Asha Rao", "age": "34", "sex": "Female", "berth": "Lower" },
            { "name": "Vikram Rao", "age": "36", "sex": "Male" }
        ],
        "contact": { "phone": "9876543210" },
        "preferences": { "payment": "Pay through BHIM UPI", "timed": true, "ac": true },
        "logins": [
            { "username": "asha01", "password": "pw1" },
            { "username": "", "password": "pw2" }
        ]
    }"#;

    fn sample() -> BookingPlan {
        serde_json::from_str(SAMPLE).unwrap()
    }

    #[test]
    fn parses_plan_shape() {
        let plan = sample();
        assert_eq!(plan.template.train.train_no, "12302");
        assert_eq!(plan.template.passengers.len(), 2);
        assert_eq!(plan.template.passengers[0].sex, Sex::Female);
        assert_eq!(plan.template.preferences.payment, PaymentMethod::Upi);
        assert_eq!(plan.template.preferences.browser_count, 1);
        assert_eq!(plan.logins.len(), 2);
    }

    #[test]
    fn class_code_is_extracted() {
        let plan = sample();
        assert_eq!(plan.template.train.class_code().unwrap(), "3A");

        let mut train = plan.template.train.clone();
        train.class = "GENERAL".into();
        assert_eq!(
            train.class_code().unwrap_err(),
            PlanError::ClassCode("GENERAL".into())
        );
    }

    #[test]
    fn form_date_is_slash_separated() {
        assert_eq!(sample().template.train.form_date().unwrap(), "25/12/2026");

        let mut train = sample().template.train;
        train.date = "2026-12-25".into();
        assert!(train.form_date().is_err());
    }

    #[test]
    fn quota_id_is_lowercase() {
        assert_eq!(sample().template.train.quota_id(), "tatkal");
    }

    #[test]
    fn tatkal_allows_four_passengers() {
        let mut template = sample().template;
        template.validate().unwrap();

        let extra = template.passengers[1].clone();
        template.passengers.extend(std::iter::repeat_n(extra, 3));
        assert_eq!(
            template.validate().unwrap_err(),
            PlanError::TooManyPassengers {
                quota: "TATKAL".into(),
                max: 4,
                count: 5
            }
        );

        template.train.quota = "GENERAL".into();
        template.validate().unwrap();
    }

    #[test]
    fn empty_passenger_list_is_rejected() {
        let mut template = sample().template;
        template.passengers.clear();
        assert_eq!(template.validate().unwrap_err(), PlanError::NoPassengers);
    }

    #[test]
    fn incomplete_credentials() {
        let plan = sample();
        assert!(plan.logins[0].is_complete());
        assert!(!plan.logins[1].is_complete());
    }

    #[test]
    fn credentials_debug_hides_password() {
        let creds = Credentials {
            username: "asha01".into(),
            password: "secret".into(),
        };
        let shown = format!("{creds:?}");
        assert!(shown.contains("asha01"));
        assert!(!shown.contains("secret"));
    }

    #[test]
    fn wallet_payment_name() {
        let p: Preferences =
            serde_json::from_str(r#"{ "payment": "Pay through IRCTC Wallet" }"#).unwrap();
        assert_eq!(p.payment, PaymentMethod::Wallet);
        assert!(p.ac);
    }
}
