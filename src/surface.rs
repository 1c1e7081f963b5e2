//! The automation surface the engine drives, and the landmarks it looks for.
//!
//! Implementations wrap a real browser session. The engine only ever talks
//! to them through [`AutomationSurface`], one handle per session.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SurfaceError;

/// How a surface finds an element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locator {
    Css(String),
    Xpath(String),
}

impl Locator {
    pub fn as_str(&self) -> &str {
        match self {
            Locator::Css(s) | Locator::Xpath(s) => s,
        }
    }

    fn map(&self, f: impl FnOnce(&str) -> String) -> Locator {
        match self {
            Locator::Css(s) => Locator::Css(f(s)),
            Locator::Xpath(s) => Locator::Xpath(f(s)),
        }
    }
}

/// A named, queryable UI signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Landmark {
    pub name: String,
    pub locator: Locator,
}

impl Landmark {
    pub fn new(name: impl Into<String>, locator: Locator) -> Self {
        Self {
            name: name.into(),
            locator,
        }
    }

    /// Fill a `{key}` placeholder in the locator, e.g. a passenger row index.
    pub fn with(&self, key: &str, value: impl std::fmt::Display) -> Landmark {
        let placeholder = format!("{{{key}}}");
        let value = value.to_string();
        Landmark {
            name: self.name.clone(),
            locator: self.locator.map(|s| s.replace(&placeholder, &value)),
        }
    }
}

/// Well-known landmark names the handlers and the default rule table use.
pub mod names {
    pub const LOGIN_BUTTON_HOME: &str = "login_button_home";
    pub const USERNAME_INPUT: &str = "username_input";
    pub const PASSWORD_INPUT: &str = "password_input";
    pub const LOGIN_CAPTCHA_IMAGE: &str = "login_captcha_image";
    pub const LOGIN_CAPTCHA_INPUT: &str = "login_captcha_input";
    pub const CAPTCHA_REFRESH: &str = "captcha_refresh";
    pub const SIGN_IN_BUTTON: &str = "sign_in_button";
    pub const LOGOUT_BUTTON: &str = "logout_button";
    pub const JOURNEY_FROM: &str = "journey_from";
    pub const JOURNEY_TO: &str = "journey_to";
    pub const AUTOCOMPLETE_OPTION: &str = "autocomplete_option";
    pub const JOURNEY_DATE: &str = "journey_date";
    pub const FIND_TRAINS: &str = "find_trains";
    pub const QUOTA_OPTION: &str = "quota_option";
    pub const TRAIN_LIST_ITEM: &str = "train_list_item";
    pub const CLASS_OPTION: &str = "class_option";
    pub const BOOK_NOW: &str = "book_now";
    pub const PASSENGER_FORM: &str = "passenger_form";
    pub const PASSENGER_NAME: &str = "passenger_name";
    pub const PASSENGER_AGE: &str = "passenger_age";
    pub const PASSENGER_GENDER: &str = "passenger_gender";
    pub const GENDER_OPTION: &str = "gender_option";
    pub const PASSENGER_BERTH: &str = "passenger_berth";
    pub const BERTH_OPTION: &str = "berth_option";
    pub const ADD_PASSENGER: &str = "add_passenger";
    pub const PASSENGER_MOBILE: &str = "passenger_mobile";
    pub const SUBMIT_PASSENGERS: &str = "submit_passengers";
    pub const REVIEW_CAPTCHA_IMAGE: &str = "review_captcha_image";
    pub const REVIEW_CAPTCHA_INPUT: &str = "review_captcha_input";
    pub const PROCEED_TO_PAY: &str = "proceed_to_pay";
    pub const UPI_OPTION: &str = "upi_option";
    pub const PAY_AND_BOOK: &str = "pay_and_book";
    pub const PNR_BANNER: &str = "pnr_banner";
    pub const AADHAAR_POPUP: &str = "aadhaar_popup";
    pub const DISHA_BANNER: &str = "disha_banner";
}

/// Name → locator table. Environment specific, so it lives in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LandmarkSet(BTreeMap<String, Locator>);

impl LandmarkSet {
    pub fn get(&self, name: &str) -> Option<Landmark> {
        self.0
            .get(name)
            .map(|locator| Landmark::new(name, locator.clone()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, locator: Locator) {
        self.0.insert(name.into(), locator);
    }

    /// Overlay `other` on top of this table.
    pub fn merge(&mut self, other: LandmarkSet) {
        self.0.extend(other.0);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for LandmarkSet {
    fn default() -> Self {
        use names::*;

        let css = |s: &str| Locator::Css(s.to_string());
        let xpath = |s: &str| Locator::Xpath(s.to_string());

        let table = [
            (LOGIN_BUTTON_HOME, css("a.loginText")),
            (USERNAME_INPUT, css("input[formcontrolname='userid']")),
            (PASSWORD_INPUT, css("input[formcontrolname='password']")),
            (LOGIN_CAPTCHA_IMAGE, css("app-login img.captcha-img")),
            (LOGIN_CAPTCHA_INPUT, css("app-login input#captcha")),
            (CAPTCHA_REFRESH, css("span.glyphicon-repeat")),
            (SIGN_IN_BUTTON, xpath("//button[text()='SIGN IN']")),
            (LOGOUT_BUTTON, css("a[href='/nget/logout']")),
            (JOURNEY_FROM, css("p-autocomplete[formcontrolname='origin'] input")),
            (JOURNEY_TO, css("p-autocomplete[formcontrolname='destination'] input")),
            (AUTOCOMPLETE_OPTION, css("li.ui-autocomplete-list-item")),
            (JOURNEY_DATE, css("p-calendar[formcontrolname='journeyDate'] input")),
            (FIND_TRAINS, css("button.search_btn.train_Search")),
            (QUOTA_OPTION, css("p-radiobutton[id='{quota}']")),
            (TRAIN_LIST_ITEM, css("app-train-avl-enq")),
            (CLASS_OPTION, xpath(".//td//strong[contains(text(), '({class_code})')]")),
            (BOOK_NOW, css("button.btnDefault.train_Search")),
            (PASSENGER_FORM, css("input[formcontrolname='passengerName']")),
            (
                PASSENGER_NAME,
                css("input[formcontrolname='passengerName'][id='psgn-name{index}']"),
            ),
            (
                PASSENGER_AGE,
                css("input[formcontrolname='passengerAge'][id='psgn-age{index}']"),
            ),
            (
                PASSENGER_GENDER,
                css("p-dropdown[formcontrolname='passengerGender'][id='psgn-gender{index}']"),
            ),
            (
                GENDER_OPTION,
                xpath("//p-dropdownitem/li/span[contains(text(), '{gender}')]"),
            ),
            (
                PASSENGER_BERTH,
                css("p-dropdown[formcontrolname='passengerBerthChoice'][id='psgn-berth-choice{index}']"),
            ),
            (
                BERTH_OPTION,
                xpath("//p-dropdownitem/li/span[contains(text(), '{berth}')]"),
            ),
            (ADD_PASSENGER, xpath("//span[contains(text(), '+ Add Passenger')]")),
            (PASSENGER_MOBILE, css("input#mobileNumber")),
            (SUBMIT_PASSENGERS, css("button.train_Search.btnDefault[type='submit']")),
            (REVIEW_CAPTCHA_IMAGE, css("app-review-booking img.captcha-img")),
            (REVIEW_CAPTCHA_INPUT, css("app-review-booking input#captcha")),
            (PROCEED_TO_PAY, css("app-review-booking button.train_Search")),
            (UPI_OPTION, xpath("//div[contains(text(), 'BHIM/ UPI')]")),
            (PAY_AND_BOOK, css("button.btn-primary.hidden-xs")),
            (PNR_BANNER, xpath("//*[contains(text(), 'PNR')]")),
            (
                AADHAAR_POPUP,
                css("button.btn-primary[aria-label*='Aadhaar authenticated users']"),
            ),
            (DISHA_BANNER, css("#disha-banner-close")),
        ];

        LandmarkSet(
            table
                .into_iter()
                .map(|(name, locator)| (name.to_string(), locator))
                .collect(),
        )
    }
}

/// The narrow contract the engine consumes from a browser session.
///
/// Every call is soft on "not found": visibility is `false`, clicks report
/// `false`, lookups return `None` or nothing. Only unexpected transport
/// faults are errors.
#[async_trait]
pub trait AutomationSurface: Send + Sync {
    async fn is_visible(&self, landmark: &Landmark, timeout: Duration) -> Result<bool, SurfaceError>;

    /// Click, retrying until `timeout`, falling back to a scripted click when
    /// the direct one is intercepted.
    async fn click(&self, landmark: &Landmark, timeout: Duration) -> Result<bool, SurfaceError>;

    /// Click `target` inside the `index`-th element matching `container`.
    async fn click_within(
        &self,
        container: &Landmark,
        index: usize,
        target: &Landmark,
        timeout: Duration,
    ) -> Result<bool, SurfaceError>;

    /// Clear the field, then type at a manual-entry pace.
    async fn type_into(&self, landmark: &Landmark, text: &str) -> Result<bool, SurfaceError>;

    /// Set a field's value directly, for widgets that ignore key events.
    async fn set_value(&self, landmark: &Landmark, value: &str) -> Result<bool, SurfaceError>;

    async fn attribute(&self, landmark: &Landmark, name: &str) -> Result<Option<String>, SurfaceError>;

    /// Text content of every element matching the landmark, in page order.
    async fn texts(&self, landmark: &Landmark) -> Result<Vec<String>, SurfaceError>;

    async fn navigate(&self, url: &str) -> Result<(), SurfaceError>;

    async fn current_url_contains(&self, needle: &str) -> Result<bool, SurfaceError>;

    /// Close the underlying browser session.
    async fn release(&self) -> Result<(), SurfaceError>;
}

/// Acquires one exclusive surface per session.
#[async_trait]
pub trait SurfaceLauncher: Send + Sync {
    async fn launch(&self, instance_id: u32, headless: bool) -> Result<Arc<dyn AutomationSurface>, SurfaceError>;
}
