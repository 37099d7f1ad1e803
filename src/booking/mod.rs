//! Drives the appointment form from province selection to slot
//! confirmation.
//!
//! The flow is a fixed sequence of pages. Every step performs its actions
//! and waits for the next page before the stage advances, so a failed run
//! reports the last stage it completed.

pub mod captcha;
pub mod page;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};
use validator::Validate;

use crate::config::{AppConfig, BookingConfig};
use crate::utils::error::Result;

pub use captcha::{CaptchaResolver, CaptchaService};
pub use page::{BookingPage, ChromePage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BookingStage {
    Start,
    ProvinceSelected,
    ProcedureSelected,
    CaptchaResolved,
    FormFilled,
    SlotSelected,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingOutcome {
    Booked,
    NoSlots,
}

#[derive(Debug, Serialize)]
pub struct BookingReport {
    /// Last stage completed.
    pub stage: BookingStage,
    pub outcome: Option<BookingOutcome>,
    pub error: Option<String>,
    pub screenshot: Option<PathBuf>,
}

impl BookingReport {
    pub fn is_booked(&self) -> bool {
        self.outcome == Some(BookingOutcome::Booked)
    }
}

pub struct BookingDriver {
    booking: BookingConfig,
    url: String,
    captcha: CaptchaResolver,
    page_timeout: Duration,
}

impl BookingDriver {
    /// Fails before any browser work if a required field is missing.
    pub fn new(config: &AppConfig) -> Result<Self> {
        config.booking.validate()?;

        Ok(Self {
            booking: config.booking.clone(),
            url: config.booking_url().to_string(),
            captcha: CaptchaResolver::from_config(&config.booking.captcha)?,
            page_timeout: Duration::from_secs(config.booking.page_timeout_secs),
        })
    }

    /// Runs the whole flow on `page` and always closes it afterwards.
    pub async fn run(&self, page: &dyn BookingPage) -> BookingReport {
        let mut stage = BookingStage::Start;
        let result = self.drive(page, &mut stage).await;

        let mut report = BookingReport {
            stage,
            outcome: None,
            error: None,
            screenshot: None,
        };

        match result {
            Ok(outcome) => {
                info!("Booking run finished at {:?}: {:?}", stage, outcome);
                report.outcome = Some(outcome);
            }
            Err(e) => {
                error!("Booking run aborted after {:?}: {}", stage, e);
                report.error = Some(e.to_string());
                if let Some(dir) = &self.booking.screenshot_dir {
                    match page.screenshot(dir).await {
                        Ok(path) => report.screenshot = Some(path),
                        Err(e) => warn!("Could not capture failure screenshot: {}", e),
                    }
                }
            }
        }

        page.close().await;
        report
    }

    async fn drive(
        &self,
        page: &dyn BookingPage,
        stage: &mut BookingStage,
    ) -> Result<BookingOutcome> {
        let s = &self.booking.selectors;
        let applicant = &self.booking.applicant;

        page.open(&self.url).await?;
        page.wait_for(&s.province_select, self.page_timeout).await?;

        page.select_option(&s.province_select, &self.booking.province_code).await?;
        self.submit(page, &s.accept_button).await?;
        *stage = BookingStage::ProvinceSelected;
        info!("Province {} selected", self.booking.province_code);

        page.wait_for(&s.procedure_select, self.page_timeout).await?;
        page.select_option(&s.procedure_select, &self.booking.operation_code).await?;
        self.submit(page, &s.accept_button).await?;
        // Information page in front of the form.
        if page.count(&s.enter_button).await? > 0 {
            self.submit(page, &s.enter_button).await?;
        }
        *stage = BookingStage::ProcedureSelected;
        info!("Procedure {} selected", self.booking.operation_code);

        self.captcha.resolve(page, s).await?;
        *stage = BookingStage::CaptchaResolved;

        page.wait_for(&s.document_input, self.page_timeout).await?;
        page.fill(&s.document_input, &applicant.document_id).await?;
        page.fill(&s.name_input, &applicant.full_name).await?;
        page.fill(&s.birth_year_input, &applicant.birth_year).await?;
        page.select_option(&s.country_select, &applicant.country).await?;
        self.submit(page, &s.submit_button).await?;

        page.wait_for(&s.request_button, self.page_timeout).await?;
        self.submit(page, &s.request_button).await?;

        page.wait_for(&s.phone_input, self.page_timeout).await?;
        page.fill(&s.phone_input, &applicant.phone).await?;
        page.fill(&s.email_input, &applicant.email).await?;
        page.fill(&s.email_confirm_input, &applicant.email).await?;
        self.submit(page, &s.next_button).await?;
        *stage = BookingStage::FormFilled;
        info!("Applicant data submitted");

        let slots = page.count(&s.slot_option).await?;
        if slots == 0 {
            info!("No appointment slots offered");
            return Ok(BookingOutcome::NoSlots);
        }
        info!("{} slots offered, taking the first", slots);
        page.click(&s.slot_option).await?;
        *stage = BookingStage::SlotSelected;

        self.submit(page, &s.confirm_button).await?;
        *stage = BookingStage::Done;
        Ok(BookingOutcome::Booked)
    }

    async fn submit(&self, page: &dyn BookingPage, button: &str) -> Result<()> {
        page.click(button).await?;
        page.wait_for_load().await
    }
}

/// Validates the booking settings, launches Chrome and runs the flow once.
pub async fn run_booking(config: &AppConfig) -> Result<BookingReport> {
    let driver = BookingDriver::new(config)?;

    let mut scraper = config.scraper.clone();
    if !config.booking.captcha.automatic && scraper.headless {
        warn!("Manual captcha resolution needs a visible browser, disabling headless mode");
        scraper.headless = false;
    }

    let page = ChromePage::launch(scraper).await?;
    Ok(driver.run(&page).await)
}
