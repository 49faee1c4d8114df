//! Key-date acceptance window
//!
//! Bounds replay exposure: an envelope sealed under a key date far from the
//! receiver's own UTC date is rejected before any key is derived. This is a
//! policy knob, not part of the wire protocol.

use enigma_core::config::ReceiverConfig;
use enigma_core::{EnigmaError, EnigmaResult, KeyDate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    /// `None` accepts any past date
    pub max_past_days: Option<u32>,
    /// `None` accepts any future date
    pub max_future_days: Option<u32>,
}

impl DateWindow {
    pub fn unbounded() -> Self {
        Self {
            max_past_days: None,
            max_future_days: None,
        }
    }

    pub fn new(max_past_days: u32, max_future_days: u32) -> Self {
        Self {
            max_past_days: Some(max_past_days),
            max_future_days: Some(max_future_days),
        }
    }

    pub fn from_config(config: &ReceiverConfig) -> Self {
        if config.enforce_date_window {
            Self::new(config.max_past_days, config.max_future_days)
        } else {
            Self::unbounded()
        }
    }

    pub fn check(&self, key_date: &KeyDate, today: &KeyDate) -> EnigmaResult<()> {
        let offset = key_date.days_since(today);
        let too_old = self
            .max_past_days
            .is_some_and(|max| offset < -i64::from(max));
        let too_new = self
            .max_future_days
            .is_some_and(|max| offset > i64::from(max));

        if too_old || too_new {
            return Err(EnigmaError::KeyDateOutOfWindow {
                key_date: key_date.to_string(),
            });
        }
        Ok(())
    }
}

impl Default for DateWindow {
    fn default() -> Self {
        Self::from_config(&ReceiverConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> KeyDate {
        KeyDate::parse(s).unwrap()
    }

    #[test]
    fn test_window_edges() {
        let window = DateWindow::new(7, 1);
        let today = d("2024-01-15");

        assert!(window.check(&d("2024-01-15"), &today).is_ok());
        assert!(window.check(&d("2024-01-08"), &today).is_ok());
        assert!(window.check(&d("2024-01-16"), &today).is_ok());

        assert!(matches!(
            window.check(&d("2024-01-07"), &today),
            Err(EnigmaError::KeyDateOutOfWindow { .. })
        ));
        assert!(matches!(
            window.check(&d("2024-01-17"), &today),
            Err(EnigmaError::KeyDateOutOfWindow { .. })
        ));
    }

    #[test]
    fn test_same_day_only() {
        let window = DateWindow::new(0, 0);
        let today = d("2024-03-01");
        assert!(window.check(&today, &today).is_ok());
        assert!(window.check(&d("2024-02-29"), &today).is_err());
        assert!(window.check(&d("2024-03-02"), &today).is_err());
    }

    #[test]
    fn test_unbounded() {
        let window = DateWindow::unbounded();
        assert!(window.check(&d("1999-12-31"), &d("2024-01-15")).is_ok());
        assert!(window.check(&d("2099-01-01"), &d("2024-01-15")).is_ok());
    }

    #[test]
    fn test_from_config() {
        let mut config = ReceiverConfig::default();
        assert_eq!(DateWindow::from_config(&config), DateWindow::new(7, 1));
        config.enforce_date_window = false;
        assert_eq!(DateWindow::from_config(&config), DateWindow::unbounded());
    }
}
