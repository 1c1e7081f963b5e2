//! An in-memory booking site for demos and tests.
//!
//! [`SimulatedSite`] answers the [`AutomationSurface`] calls by landmark
//! name, walking a fixed page flow from the home page to the booking
//! confirmation. Captchas are served as base64 data URLs of their answer,
//! which [`SimulatedSolver`] simply decodes.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::captcha::{CaptchaImage, CaptchaSolver, SolverError};
use crate::error::SurfaceError;
use crate::state_machine::lock;
use crate::surface::{AutomationSurface, Landmark, SurfaceLauncher, names};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimPage {
    Blank,
    Home,
    LoginModal,
    Dashboard,
    TrainList,
    Passengers,
    Review,
    Payment,
    AwaitingApproval,
    Confirmed,
}

impl SimPage {
    fn shows(self, name: &str) -> bool {
        use names::*;

        let page: &[&str] = match self {
            SimPage::Blank => &[],
            SimPage::Home => &[LOGIN_BUTTON_HOME],
            SimPage::LoginModal => &[
                USERNAME_INPUT,
                PASSWORD_INPUT,
                LOGIN_CAPTCHA_IMAGE,
                LOGIN_CAPTCHA_INPUT,
                CAPTCHA_REFRESH,
                SIGN_IN_BUTTON,
            ],
            SimPage::Dashboard => &[
                LOGOUT_BUTTON,
                JOURNEY_FROM,
                JOURNEY_TO,
                AUTOCOMPLETE_OPTION,
                JOURNEY_DATE,
                FIND_TRAINS,
            ],
            SimPage::TrainList => &[LOGOUT_BUTTON, QUOTA_OPTION, TRAIN_LIST_ITEM, CLASS_OPTION, BOOK_NOW],
            SimPage::Passengers => &[
                LOGOUT_BUTTON,
                PASSENGER_FORM,
                PASSENGER_NAME,
                PASSENGER_AGE,
                PASSENGER_GENDER,
                GENDER_OPTION,
                PASSENGER_BERTH,
                BERTH_OPTION,
                ADD_PASSENGER,
                PASSENGER_MOBILE,
                SUBMIT_PASSENGERS,
            ],
            SimPage::Review => &[LOGOUT_BUTTON, REVIEW_CAPTCHA_IMAGE, REVIEW_CAPTCHA_INPUT, PROCEED_TO_PAY],
            SimPage::Payment => &[LOGOUT_BUTTON, UPI_OPTION, PAY_AND_BOOK],
            SimPage::AwaitingApproval => &[],
            SimPage::Confirmed => &[LOGOUT_BUTTON, PNR_BANNER],
        };
        page.contains(&name)
    }
}

/// Knobs for how the simulated site misbehaves.
#[derive(Debug, Clone)]
pub struct SimBehavior {
    /// Poll on which the PNR banner appears; `None` never approves.
    pub approval_after_polls: Option<u32>,
    /// Every keystroke fails with a transport error.
    pub broken: bool,
    /// The site logs the user out once, on the first train search.
    pub kick_out_once: bool,
    /// Rows on the train list page.
    pub trains: Vec<String>,
}

impl Default for SimBehavior {
    fn default() -> Self {
        Self {
            approval_after_polls: Some(2),
            broken: false,
            kick_out_once: false,
            trains: vec![
                "12301 HOWRAH RAJDHANI".to_string(),
                "12302 NEW DELHI RAJDHANI".to_string(),
                "12259 SEALDAH DURONTO".to_string(),
            ],
        }
    }
}

struct Page {
    current: SimPage,
    url: String,
    popup_open: bool,
    kicked_out: bool,
    login_captcha: String,
    review_captcha: String,
    captchas_issued: u32,
    class_selected: bool,
    approval_polls: u32,
    typed: HashMap<String, Vec<String>>,
}

pub struct SimulatedSite {
    instance_id: u32,
    behavior: SimBehavior,
    page: Mutex<Page>,
    refreshes: AtomicU32,
    releases: AtomicU32,
}

impl SimulatedSite {
    pub fn new(instance_id: u32, behavior: SimBehavior) -> Self {
        Self {
            instance_id,
            behavior,
            page: Mutex::new(Page {
                current: SimPage::Blank,
                url: String::new(),
                popup_open: false,
                kicked_out: false,
                login_captcha: String::new(),
                review_captcha: String::new(),
                captchas_issued: 0,
                class_selected: false,
                approval_polls: 0,
                typed: HashMap::new(),
            }),
            refreshes: AtomicU32::new(0),
            releases: AtomicU32::new(0),
        }
    }

    /// Jump straight to `page`, issuing whatever captcha it carries.
    pub fn show(&self, page: SimPage) {
        let mut state = lock(&self.page);
        self.enter(&mut state, page);
    }

    pub fn page(&self) -> SimPage {
        lock(&self.page).current
    }

    /// Last text typed into the landmark, if any.
    pub fn typed(&self, name: &str) -> Option<String> {
        lock(&self.page)
            .typed
            .get(name)
            .and_then(|texts| texts.last().cloned())
    }

    pub fn typed_count(&self, name: &str) -> usize {
        lock(&self.page).typed.get(name).map_or(0, Vec::len)
    }

    pub fn captcha_refreshes(&self) -> u32 {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn approval_polls(&self) -> u32 {
        lock(&self.page).approval_polls
    }

    pub fn releases(&self) -> u32 {
        self.releases.load(Ordering::SeqCst)
    }

    fn enter(&self, state: &mut Page, page: SimPage) {
        state.current = page;
        match page {
            SimPage::LoginModal => {
                state.login_captcha = self.next_captcha(state);
                state.typed.remove(names::LOGIN_CAPTCHA_INPUT);
            }
            SimPage::Review => {
                state.review_captcha = self.next_captcha(state);
                state.typed.remove(names::REVIEW_CAPTCHA_INPUT);
            }
            SimPage::Dashboard => state.popup_open = true,
            SimPage::TrainList => state.class_selected = false,
            _ => {}
        }
    }

    fn next_captcha(&self, state: &mut Page) -> String {
        state.captchas_issued += 1;
        format!("S{}q{}", self.instance_id, state.captchas_issued * 7 + 3)
    }

    fn last_typed(state: &Page, name: &str) -> String {
        state
            .typed
            .get(name)
            .and_then(|texts| texts.last().cloned())
            .unwrap_or_default()
    }

    fn visible(state: &Page, name: &str) -> bool {
        if name == names::AADHAAR_POPUP {
            return state.current == SimPage::Dashboard && state.popup_open;
        }
        state.current.shows(name)
    }

    fn check_open(&self) -> Result<(), SurfaceError> {
        if self.releases() > 0 {
            Err(SurfaceError::Closed)
        } else {
            Ok(())
        }
    }

    fn press(&self, state: &mut Page, name: &str) -> bool {
        if !Self::visible(state, name) {
            return false;
        }
        match (state.current, name) {
            (SimPage::Home, names::LOGIN_BUTTON_HOME) => self.enter(state, SimPage::LoginModal),
            (SimPage::LoginModal, names::CAPTCHA_REFRESH) => {
                self.refreshes.fetch_add(1, Ordering::SeqCst);
                self.enter(state, SimPage::LoginModal);
            }
            (SimPage::LoginModal, names::SIGN_IN_BUTTON) => {
                let accepted = !Self::last_typed(state, names::USERNAME_INPUT).is_empty()
                    && !Self::last_typed(state, names::PASSWORD_INPUT).is_empty()
                    && Self::last_typed(state, names::LOGIN_CAPTCHA_INPUT) == state.login_captcha;
                let next = if accepted { SimPage::Dashboard } else { SimPage::LoginModal };
                self.enter(state, next);
            }
            (SimPage::Dashboard, names::AADHAAR_POPUP) => state.popup_open = false,
            (SimPage::Dashboard, names::FIND_TRAINS) => {
                if self.behavior.kick_out_once && !state.kicked_out {
                    state.kicked_out = true;
                    state.typed.clear();
                    self.enter(state, SimPage::Home);
                } else {
                    self.enter(state, SimPage::TrainList);
                }
            }
            (SimPage::Passengers, names::SUBMIT_PASSENGERS) => self.enter(state, SimPage::Review),
            (SimPage::Review, names::PROCEED_TO_PAY) => {
                let next = if Self::last_typed(state, names::REVIEW_CAPTCHA_INPUT) == state.review_captcha {
                    SimPage::Payment
                } else {
                    SimPage::Review
                };
                self.enter(state, next);
            }
            (SimPage::Payment, names::PAY_AND_BOOK) => self.enter(state, SimPage::AwaitingApproval),
            _ => {}
        }
        true
    }

    fn record_text(&self, landmark: &Landmark, text: &str) -> Result<bool, SurfaceError> {
        self.check_open()?;
        if self.behavior.broken {
            return Err(SurfaceError::Transport(format!(
                "lost connection while typing into {}",
                landmark.name
            )));
        }
        let mut state = lock(&self.page);
        if !Self::visible(&state, &landmark.name) {
            return Ok(false);
        }
        state
            .typed
            .entry(landmark.name.clone())
            .or_default()
            .push(text.to_string());
        Ok(true)
    }
}

fn data_url(answer: &str) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(answer))
}

#[async_trait]
impl AutomationSurface for SimulatedSite {
    async fn is_visible(&self, landmark: &Landmark, _timeout: Duration) -> Result<bool, SurfaceError> {
        self.check_open()?;
        let mut state = lock(&self.page);
        if state.current == SimPage::AwaitingApproval && landmark.name == names::PNR_BANNER {
            state.approval_polls += 1;
            let approved = self
                .behavior
                .approval_after_polls
                .is_some_and(|after| state.approval_polls >= after);
            if approved {
                self.enter(&mut state, SimPage::Confirmed);
            }
            return Ok(approved);
        }
        Ok(Self::visible(&state, &landmark.name))
    }

    async fn click(&self, landmark: &Landmark, _timeout: Duration) -> Result<bool, SurfaceError> {
        self.check_open()?;
        let mut state = lock(&self.page);
        Ok(self.press(&mut state, &landmark.name))
    }

    async fn click_within(
        &self,
        container: &Landmark,
        index: usize,
        target: &Landmark,
        _timeout: Duration,
    ) -> Result<bool, SurfaceError> {
        self.check_open()?;
        let mut state = lock(&self.page);
        if container.name != names::TRAIN_LIST_ITEM
            || !Self::visible(&state, &container.name)
            || index >= self.behavior.trains.len()
            || !Self::visible(&state, &target.name)
        {
            return Ok(false);
        }
        match target.name.as_str() {
            names::CLASS_OPTION => {
                state.class_selected = true;
                Ok(true)
            }
            names::BOOK_NOW if state.class_selected => {
                self.enter(&mut state, SimPage::Passengers);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn type_into(&self, landmark: &Landmark, text: &str) -> Result<bool, SurfaceError> {
        self.record_text(landmark, text)
    }

    async fn set_value(&self, landmark: &Landmark, value: &str) -> Result<bool, SurfaceError> {
        self.record_text(landmark, value)
    }

    async fn attribute(&self, landmark: &Landmark, name: &str) -> Result<Option<String>, SurfaceError> {
        self.check_open()?;
        let state = lock(&self.page);
        if name != "src" || !Self::visible(&state, &landmark.name) {
            return Ok(None);
        }
        Ok(match landmark.name.as_str() {
            names::LOGIN_CAPTCHA_IMAGE => Some(data_url(&state.login_captcha)),
            names::REVIEW_CAPTCHA_IMAGE => Some(data_url(&state.review_captcha)),
            _ => None,
        })
    }

    async fn texts(&self, landmark: &Landmark) -> Result<Vec<String>, SurfaceError> {
        self.check_open()?;
        let state = lock(&self.page);
        if !Self::visible(&state, &landmark.name) {
            return Ok(Vec::new());
        }
        Ok(match landmark.name.as_str() {
            names::TRAIN_LIST_ITEM => self.behavior.trains.clone(),
            names::PNR_BANNER => vec![format!("PNR No: 24{:08}", u64::from(self.instance_id) * 1_234_567)],
            _ => Vec::new(),
        })
    }

    async fn navigate(&self, url: &str) -> Result<(), SurfaceError> {
        self.check_open()?;
        let mut state = lock(&self.page);
        state.url = url.to_string();
        self.enter(&mut state, SimPage::Home);
        Ok(())
    }

    async fn current_url_contains(&self, needle: &str) -> Result<bool, SurfaceError> {
        self.check_open()?;
        Ok(lock(&self.page).url.contains(needle))
    }

    async fn release(&self) -> Result<(), SurfaceError> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out one [`SimulatedSite`] per session.
#[derive(Default)]
pub struct SimulatedLauncher {
    default_behavior: SimBehavior,
    overrides: HashMap<u32, SimBehavior>,
    failing: HashSet<u32>,
    launched: Mutex<Vec<(u32, Arc<SimulatedSite>)>>,
}

impl SimulatedLauncher {
    pub fn new(default_behavior: SimBehavior) -> Self {
        Self {
            default_behavior,
            ..Self::default()
        }
    }

    /// Use `behavior` for one instance.
    pub fn with(mut self, instance_id: u32, behavior: SimBehavior) -> Self {
        self.overrides.insert(instance_id, behavior);
        self
    }

    /// Make launching `instance_id` fail.
    pub fn failing(mut self, instance_id: u32) -> Self {
        self.failing.insert(instance_id);
        self
    }

    pub fn site(&self, instance_id: u32) -> Option<Arc<SimulatedSite>> {
        lock(&self.launched)
            .iter()
            .find(|(id, _)| *id == instance_id)
            .map(|(_, site)| Arc::clone(site))
    }

    pub fn launched(&self) -> usize {
        lock(&self.launched).len()
    }
}

#[async_trait]
impl SurfaceLauncher for SimulatedLauncher {
    async fn launch(&self, instance_id: u32, _headless: bool) -> Result<Arc<dyn AutomationSurface>, SurfaceError> {
        if self.failing.contains(&instance_id) {
            return Err(SurfaceError::Launch(format!("no browser for instance {instance_id}")));
        }
        let behavior = self
            .overrides
            .get(&instance_id)
            .cloned()
            .unwrap_or_else(|| self.default_behavior.clone());
        let site = Arc::new(SimulatedSite::new(instance_id, behavior));
        lock(&self.launched).push((instance_id, Arc::clone(&site)));
        Ok(site)
    }
}

/// Reads the simulated captchas. A blind solver never can.
#[derive(Default)]
pub struct SimulatedSolver {
    blind: bool,
    solves: AtomicU32,
}

impl SimulatedSolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blind() -> Self {
        Self {
            blind: true,
            ..Self::default()
        }
    }

    pub fn solves(&self) -> u32 {
        self.solves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptchaSolver for SimulatedSolver {
    async fn solve(&self, image: &CaptchaImage) -> Result<String, SolverError> {
        self.solves.fetch_add(1, Ordering::SeqCst);
        if self.blind {
            return Ok(String::new());
        }
        Ok(match image {
            CaptchaImage::Inline(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            CaptchaImage::Remote(_) => String::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::LandmarkSet;

    const PROBE: Duration = Duration::from_millis(10);

    fn landmark(name: &str) -> Landmark {
        LandmarkSet::default().get(name).unwrap()
    }

    #[tokio::test]
    async fn navigation_lands_logged_out() {
        let site = SimulatedSite::new(1, SimBehavior::default());
        site.navigate("https://booking.test/search").await.unwrap();
        assert!(site.is_visible(&landmark(names::LOGIN_BUTTON_HOME), PROBE).await.unwrap());
        assert!(site.current_url_contains("booking.test").await.unwrap());
    }

    #[tokio::test]
    async fn captcha_source_decodes_to_answer() {
        let site = SimulatedSite::new(3, SimBehavior::default());
        site.show(SimPage::LoginModal);
        let src = site
            .attribute(&landmark(names::LOGIN_CAPTCHA_IMAGE), "src")
            .await
            .unwrap()
            .unwrap();
        let image = CaptchaImage::from_source(&src).unwrap();
        let text = SimulatedSolver::new().solve(&image).await.unwrap();
        assert_eq!(text, "S3q10");
    }

    #[tokio::test]
    async fn wrong_captcha_keeps_the_login_form() {
        let site = SimulatedSite::new(1, SimBehavior::default());
        site.show(SimPage::LoginModal);
        site.type_into(&landmark(names::USERNAME_INPUT), "u").await.unwrap();
        site.type_into(&landmark(names::PASSWORD_INPUT), "p").await.unwrap();
        site.type_into(&landmark(names::LOGIN_CAPTCHA_INPUT), "nope").await.unwrap();
        assert!(site.click(&landmark(names::SIGN_IN_BUTTON), PROBE).await.unwrap());
        assert_eq!(site.page(), SimPage::LoginModal);
    }

    #[tokio::test]
    async fn popup_closes_on_click() {
        let site = SimulatedSite::new(1, SimBehavior::default());
        site.show(SimPage::Dashboard);
        let popup = landmark(names::AADHAAR_POPUP);
        assert!(site.is_visible(&popup, PROBE).await.unwrap());
        assert!(site.click(&popup, PROBE).await.unwrap());
        assert!(!site.is_visible(&popup, PROBE).await.unwrap());
    }

    #[tokio::test]
    async fn broken_site_fails_typing() {
        let behavior = SimBehavior {
            broken: true,
            ..SimBehavior::default()
        };
        let site = SimulatedSite::new(2, behavior);
        site.show(SimPage::LoginModal);
        let err = site
            .type_into(&landmark(names::USERNAME_INPUT), "u")
            .await
            .unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn released_site_is_closed() {
        let site = SimulatedSite::new(1, SimBehavior::default());
        site.release().await.unwrap();
        assert_eq!(site.releases(), 1);
        let err = site.navigate("x").await.unwrap_err();
        assert_eq!(err, SurfaceError::Closed);
    }

    #[tokio::test]
    async fn launcher_applies_overrides_and_failures() {
        let launcher = SimulatedLauncher::new(SimBehavior::default())
            .with(2, SimBehavior {
                broken: true,
                ..SimBehavior::default()
            })
            .failing(3);
        launcher.launch(1, true).await.unwrap();
        launcher.launch(2, true).await.unwrap();
        assert!(matches!(launcher.launch(3, true).await, Err(SurfaceError::Launch(_))));
        assert_eq!(launcher.launched(), 2);
        assert!(launcher.site(2).is_some());
        assert!(launcher.site(3).is_none());
    }
}
