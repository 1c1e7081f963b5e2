use std::sync::Arc;
use std::time::Duration;

use crate::config::LandmarkRule;
use crate::error::SurfaceError;
use crate::surface::{AutomationSurface, LandmarkSet};

/// Answers "is this landmark visible right now?" with a short timeout.
pub struct SignalProbe {
    surface: Arc<dyn AutomationSurface>,
    landmarks: LandmarkSet,
    timeout: Duration,
}

impl SignalProbe {
    pub fn new(surface: Arc<dyn AutomationSurface>, landmarks: LandmarkSet, timeout: Duration) -> Self {
        Self {
            surface,
            landmarks,
            timeout,
        }
    }

    /// Unconfigured names are never visible.
    pub async fn visible(&self, name: &str) -> Result<bool, SurfaceError> {
        match self.landmarks.get(name) {
            Some(landmark) => self.surface.is_visible(&landmark, self.timeout).await,
            None => Ok(false),
        }
    }

    /// First rule, in order, whose landmark is visible.
    pub async fn first_match<'a>(&self, rules: &'a [LandmarkRule]) -> Result<Option<&'a LandmarkRule>, SurfaceError> {
        for rule in rules {
            if self.visible(&rule.landmark).await? {
                return Ok(Some(rule));
            }
        }
        Ok(None)
    }

    /// Click the landmark if it is showing. Failures are ignored.
    pub async fn dismiss(&self, name: &str) -> bool {
        let Some(landmark) = self.landmarks.get(name) else {
            return false;
        };
        match self.surface.is_visible(&landmark, self.timeout).await {
            Ok(true) => self
                .surface
                .click(&landmark, self.timeout)
                .await
                .unwrap_or(false),
            _ => false,
        }
    }
}
